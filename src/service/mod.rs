//! Query Service
//!
//! Async front for nearest-neighbor queries. Scans run on tokio's blocking
//! pool so callers on the async runtime are never stalled; cancellation and
//! timeouts discard the scan's result when it eventually finishes.

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{EmbeddingError, Result};
use crate::metrics::Metrics;
use crate::vector::{EmbeddingStore, SimilarityRanker, SimilarityResult};

/// Shared async query front over one embedding store
#[derive(Debug, Clone)]
pub struct QueryService {
    store: EmbeddingStore,
    ranker: Arc<SimilarityRanker>,
    metrics: Arc<Metrics>,
    exclude_self: bool,
}

impl QueryService {
    pub fn new(store: EmbeddingStore, ranker: SimilarityRanker) -> Self {
        Self {
            store,
            ranker: Arc::new(ranker),
            metrics: Arc::new(Metrics::new()),
            exclude_self: false,
        }
    }

    /// Omit the query word from word queries
    pub fn with_exclude_self(mut self, exclude: bool) -> Self {
        self.exclude_self = exclude;
        self
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Nearest neighbors of a stored word
    pub async fn query(&self, word: &str, k: usize) -> Result<SimilarityResult> {
        let word = word.to_string();
        let exclude_self = self.exclude_self;
        self.run("word", move |ranker, store| {
            ranker.neighbors_of(store, &word, k, exclude_self)
        })
        .await
    }

    /// Nearest neighbors of an arbitrary vector
    pub async fn query_vector(&self, vector: Vec<f32>, k: usize) -> Result<SimilarityResult> {
        self.run("vector", move |ranker, store| ranker.nearest(store, &vector, k))
            .await
    }

    /// Run several word queries concurrently; results are in input order
    pub async fn query_batch<S: AsRef<str>>(&self, words: &[S], k: usize) -> Vec<Result<SimilarityResult>> {
        join_all(words.iter().map(|w| self.query(w.as_ref(), k))).await
    }

    /// Word query that gives up as soon as `cancel` fires
    pub async fn query_with_cancel(
        &self,
        word: &str,
        k: usize,
        cancel: CancellationToken,
    ) -> Result<SimilarityResult> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(word = word, "Query cancelled");
                self.metrics.record_failure();
                Err(EmbeddingError::Cancelled)
            }
            result = self.query(word, k) => result,
        }
    }

    /// Word query bounded by a deadline
    pub async fn query_with_timeout(
        &self,
        word: &str,
        k: usize,
        timeout: Duration,
    ) -> Result<SimilarityResult> {
        match tokio::time::timeout(timeout, self.query(word, k)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(word = word, ?timeout, "Query timed out");
                self.metrics.record_failure();
                Err(EmbeddingError::Timeout(timeout))
            }
        }
    }

    async fn run<F>(&self, kind: &'static str, f: F) -> Result<SimilarityResult>
    where
        F: FnOnce(&SimilarityRanker, &EmbeddingStore) -> Result<SimilarityResult> + Send + 'static,
    {
        let store = self.store.clone();
        let ranker = self.ranker.clone();
        let scanned = store.len();
        let start = Instant::now();

        let outcome = tokio::task::spawn_blocking(move || f(&ranker, &store))
            .await
            .map_err(|e| EmbeddingError::TaskFailed(e.to_string()))
            .and_then(|r| r);

        match outcome {
            Ok(result) => {
                self.metrics.record_query(kind, scanned, start.elapsed());
                Ok(result)
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e)
            }
        }
    }
}
