//! Similarity Ranker
//!
//! Exact top-k retrieval by cosine distance over an [`EmbeddingStore`].
//!
//! Every query is a full linear scan: O(N·D) distance work plus O(N log k)
//! selection through a bounded max-heap. Ties on distance are broken by
//! token order, so the same store and query always yield the same result.
//!
//! Large stores may be scanned in partitions on scoped threads. Each
//! partition keeps its own top-k and the partials are merged with the same
//! ordering, which makes the partitioned result identical to the sequential
//! one.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::debug;

use super::embedding_store::{EmbeddingEntry, EmbeddingStore};
use super::similarity::{cosine_distance_from_parts, dot_product, VectorOps};
use crate::error::{EmbeddingError, Result};

/// Distance reported for a zero-norm vector under [`ZeroVectorPolicy::MaxDistance`].
pub const MAX_COSINE_DISTANCE: f32 = 2.0;

/// How to rank a comparison involving a zero-norm vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroVectorPolicy {
    /// Treat the pair as maximally distant (2.0).
    #[default]
    MaxDistance,
    /// Fail the query with [`EmbeddingError::ZeroVector`].
    Reject,
}

/// Ranker configuration
#[derive(Debug, Clone)]
pub struct RankerConfig {
    /// Zero-norm handling
    pub zero_vector_policy: ZeroVectorPolicy,
    /// Store size from which a single query is scanned in partitions
    pub parallel_threshold: usize,
    /// Number of partitions for large scans (0 = auto-detect)
    pub partitions: usize,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            zero_vector_policy: ZeroVectorPolicy::MaxDistance,
            parallel_threshold: 50_000,
            partitions: 0, // Auto-detect (num_cpus)
        }
    }
}

impl RankerConfig {
    pub fn with_zero_vector_policy(mut self, policy: ZeroVectorPolicy) -> Self {
        self.zero_vector_policy = policy;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }
}

/// One ranked entry: a handle to the stored token and vector plus its distance
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub token: Arc<str>,
    pub vector: Arc<[f32]>,
    /// Cosine distance to the query, in [0, 2]
    pub distance: f32,
}

impl Neighbor {
    fn from_entry(entry: &EmbeddingEntry, distance: f32) -> Self {
        Self {
            token: entry.token.clone(),
            vector: entry.vector.clone(),
            distance,
        }
    }
}

/// Ordered neighbors, ascending by (distance, token)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimilarityResult {
    neighbors: Vec<Neighbor>,
}

impl SimilarityResult {
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Neighbor> {
        self.neighbors.iter()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> + '_ {
        self.neighbors.iter().map(|n| &*n.token)
    }

    pub fn into_vec(self) -> Vec<Neighbor> {
        self.neighbors
    }
}

impl IntoIterator for SimilarityResult {
    type Item = Neighbor;
    type IntoIter = std::vec::IntoIter<Neighbor>;

    fn into_iter(self) -> Self::IntoIter {
        self.neighbors.into_iter()
    }
}

impl<'a> IntoIterator for &'a SimilarityResult {
    type Item = &'a Neighbor;
    type IntoIter = std::slice::Iter<'a, Neighbor>;

    fn into_iter(self) -> Self::IntoIter {
        self.neighbors.iter()
    }
}

/// Heap candidate. Ordered by (distance, token) so the heap top is the
/// current worst of the kept k.
struct Candidate<'a> {
    distance: f32,
    entry: &'a EmbeddingEntry,
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.entry.token.cmp(&other.entry.token))
    }
}

/// Bounded top-k collector
struct TopK<'a> {
    k: usize,
    heap: BinaryHeap<Candidate<'a>>,
}

impl<'a> TopK<'a> {
    /// `k` must already be clamped to the number of candidates.
    fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1)),
        }
    }

    fn offer(&mut self, candidate: Candidate<'a>) {
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    fn merge(&mut self, other: TopK<'a>) {
        for candidate in other.heap {
            self.offer(candidate);
        }
    }

    fn into_sorted(self) -> Vec<Candidate<'a>> {
        self.heap.into_sorted_vec()
    }
}

/// Query vector with its cached squared norm
struct Query<'q> {
    vector: &'q [f32],
    norm_sq: f64,
}

/// Exact cosine-distance ranker
#[derive(Debug, Clone, Default)]
pub struct SimilarityRanker {
    config: RankerConfig,
}

impl SimilarityRanker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// The k entries closest to `query`, ascending by distance then token.
    ///
    /// `k = 0` yields an empty result; `k` larger than the store returns
    /// every entry. Queries against an empty store always return empty.
    pub fn nearest(&self, store: &EmbeddingStore, query: &[f32], k: usize) -> Result<SimilarityResult> {
        self.rank(store, query, k, None)
    }

    /// Like [`nearest`](Self::nearest) but never returns `exclude`.
    pub fn nearest_excluding(
        &self,
        store: &EmbeddingStore,
        query: &[f32],
        k: usize,
        exclude: &str,
    ) -> Result<SimilarityResult> {
        self.rank(store, query, k, Some(exclude))
    }

    /// Neighbors of a stored token, optionally omitting the token itself.
    pub fn neighbors_of(
        &self,
        store: &EmbeddingStore,
        token: &str,
        k: usize,
        exclude_self: bool,
    ) -> Result<SimilarityResult> {
        let query = store.get(token)?;
        let exclude = exclude_self.then_some(token);
        self.rank(store, query, k, exclude)
    }

    fn rank(
        &self,
        store: &EmbeddingStore,
        query: &[f32],
        k: usize,
        exclude: Option<&str>,
    ) -> Result<SimilarityResult> {
        let Some(dimension) = store.dimension() else {
            return Ok(SimilarityResult::default());
        };

        if query.len() != dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        if let Some(index) = query.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::InvalidValue {
                index,
                value: query[index],
            });
        }

        let query = Query {
            vector: query,
            norm_sq: query.squared_norm(),
        };

        if query.norm_sq == 0.0 && self.config.zero_vector_policy == ZeroVectorPolicy::Reject {
            return Err(EmbeddingError::ZeroVector("query".to_string()));
        }

        if k == 0 {
            return Ok(SimilarityResult::default());
        }

        let entries = store.entries();
        let k = k.min(entries.len());
        let partitions = self.partition_count(entries.len());

        let top = if partitions > 1 {
            self.scan_partitioned(entries, &query, k, exclude, partitions)?
        } else {
            self.scan(entries, &query, k, exclude)?
        };

        let neighbors: Vec<Neighbor> = top
            .into_sorted()
            .into_iter()
            .map(|c| Neighbor::from_entry(c.entry, c.distance))
            .collect();

        debug!(
            scanned = entries.len(),
            k = k,
            returned = neighbors.len(),
            partitions = partitions,
            "Ranked nearest neighbors"
        );

        Ok(SimilarityResult { neighbors })
    }

    fn partition_count(&self, len: usize) -> usize {
        if len < self.config.parallel_threshold.max(2) {
            return 1;
        }
        let wanted = if self.config.partitions == 0 {
            num_cpus::get()
        } else {
            self.config.partitions
        };
        wanted.clamp(1, len)
    }

    fn distance(&self, query: &Query<'_>, entry: &EmbeddingEntry) -> Result<f32> {
        let dot = dot_product(query.vector, &entry.vector);
        match cosine_distance_from_parts(dot, query.norm_sq, entry.norm_sq) {
            Some(distance) => Ok(distance),
            None => match self.config.zero_vector_policy {
                ZeroVectorPolicy::MaxDistance => Ok(MAX_COSINE_DISTANCE),
                ZeroVectorPolicy::Reject => Err(EmbeddingError::ZeroVector(entry.token.to_string())),
            },
        }
    }

    fn scan<'a>(
        &self,
        entries: &'a [EmbeddingEntry],
        query: &Query<'_>,
        k: usize,
        exclude: Option<&str>,
    ) -> Result<TopK<'a>> {
        let mut top = TopK::new(k.min(entries.len()));
        for entry in entries {
            if exclude == Some(&*entry.token) {
                continue;
            }
            let distance = self.distance(query, entry)?;
            top.offer(Candidate { distance, entry });
        }
        Ok(top)
    }

    fn scan_partitioned<'a>(
        &self,
        entries: &'a [EmbeddingEntry],
        query: &Query<'_>,
        k: usize,
        exclude: Option<&str>,
        partitions: usize,
    ) -> Result<TopK<'a>> {
        let chunk_size = entries.len().div_ceil(partitions);

        let partials = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = entries
                .chunks(chunk_size)
                .map(|chunk| s.spawn(move |_| self.scan(chunk, query, k, exclude)))
                .collect();

            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(EmbeddingError::TaskFailed("scan partition panicked".to_string())))
                })
                .collect::<Vec<_>>()
        })
        .map_err(|_| EmbeddingError::TaskFailed("scan partition panicked".to_string()))?;

        let mut top = TopK::new(k);
        for partial in partials {
            top.merge(partial?);
        }
        Ok(top)
    }
}

/// Rank with the default configuration
pub fn nearest(store: &EmbeddingStore, query: &[f32], k: usize) -> Result<SimilarityResult> {
    SimilarityRanker::default().nearest(store, query, k)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc_store() -> EmbeddingStore {
        EmbeddingStore::build(vec![
            ("a", vec![1.0, 0.0]),
            ("b", vec![0.0, 1.0]),
            ("c", vec![1.0, 1.0]),
        ])
        .unwrap()
    }

    fn line_store(n: usize) -> EmbeddingStore {
        EmbeddingStore::build((0..n).map(|i| {
            let angle = i as f32 * 0.01;
            (format!("w{:05}", i), vec![angle.cos(), angle.sin(), 0.5])
        }))
        .unwrap()
    }

    #[test]
    fn test_concrete_scenario() {
        let store = abc_store();
        let result = nearest(&store, &[1.0, 0.0], 2).unwrap();

        assert_eq!(result.len(), 2);
        let n = result.neighbors();
        assert_eq!(&*n[0].token, "a");
        assert_eq!(&*n[0].vector, &[1.0, 0.0]);
        assert_eq!(n[0].distance, 0.0);
        assert_eq!(&*n[1].token, "c");
        assert_eq!(&*n[1].vector, &[1.0, 1.0]);
        assert!((n[1].distance - 0.292_893).abs() < 1e-4);
    }

    #[test]
    fn test_k_zero() {
        let store = abc_store();
        assert!(nearest(&store, &[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_k_clamped_to_store_size() {
        let store = abc_store();
        let result = nearest(&store, &[1.0, 0.0], 100).unwrap();
        assert_eq!(result.tokens().collect::<Vec<_>>(), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_huge_k_is_clamped() {
        let store = abc_store();

        let result = nearest(&store, &[1.0, 0.0], usize::MAX).unwrap();
        assert_eq!(result.len(), store.len());

        let result = nearest(&store, &[1.0, 0.0], usize::MAX / 64).unwrap();
        assert_eq!(result.tokens().collect::<Vec<_>>(), vec!["a", "c", "b"]);

        let result = SimilarityRanker::default()
            .neighbors_of(&store, "a", usize::MAX, true)
            .unwrap();
        assert_eq!(result.len(), store.len() - 1);
    }

    #[test]
    fn test_huge_k_partitioned() {
        let store = line_store(200);
        let ranker = SimilarityRanker::new(
            RankerConfig::default()
                .with_parallel_threshold(10)
                .with_partitions(3),
        );
        let result = ranker.nearest(&store, &[1.0, 0.0, 0.5], usize::MAX).unwrap();
        assert_eq!(result.len(), 200);
    }

    #[test]
    fn test_dimension_mismatch() {
        let store = abc_store();
        let result = nearest(&store, &[1.0, 0.0, 0.0], 1);
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_dimension_checked_even_for_k_zero() {
        let store = abc_store();
        assert!(nearest(&store, &[1.0], 0).is_err());
    }

    #[test]
    fn test_empty_store_returns_empty() {
        let store = EmbeddingStore::default();
        assert!(nearest(&store, &[1.0, 2.0, 3.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_ties_broken_by_token() {
        let store = EmbeddingStore::build(vec![
            ("zeta", vec![2.0, 0.0]),
            ("alpha", vec![1.0, 0.0]),
            ("mid", vec![3.0, 0.0]),
            ("far", vec![0.0, 1.0]),
        ])
        .unwrap();

        let result = nearest(&store, &[1.0, 0.0], 3).unwrap();
        assert_eq!(result.tokens().collect::<Vec<_>>(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_self_identity_first() {
        let store = abc_store();
        let cat = store.get("c").unwrap().to_vec();
        let result = nearest(&store, &cat, 1).unwrap();
        assert_eq!(&*result.neighbors()[0].token, "c");
        assert_eq!(result.neighbors()[0].distance, 0.0);
    }

    #[test]
    fn test_exclusion_is_opt_in() {
        let store = abc_store();
        let ranker = SimilarityRanker::default();

        let with_self = ranker.neighbors_of(&store, "a", 2, false).unwrap();
        assert_eq!(with_self.tokens().collect::<Vec<_>>(), vec!["a", "c"]);

        let without_self = ranker.neighbors_of(&store, "a", 2, true).unwrap();
        assert_eq!(without_self.tokens().collect::<Vec<_>>(), vec!["c", "b"]);

        let excluded = ranker.nearest_excluding(&store, &[0.0, 1.0], 3, "b").unwrap();
        assert_eq!(excluded.tokens().collect::<Vec<_>>(), vec!["c", "a"]);
    }

    #[test]
    fn test_neighbors_of_unknown_token() {
        let store = abc_store();
        let result = SimilarityRanker::default().neighbors_of(&store, "nonexistent", 2, false);
        assert!(matches!(result, Err(EmbeddingError::UnknownToken(_))));
    }

    #[test]
    fn test_zero_vector_max_distance() {
        let store = EmbeddingStore::build(vec![
            ("zero", vec![0.0, 0.0]),
            ("opposite", vec![-1.0, 0.0]),
            ("same", vec![1.0, 0.0]),
        ])
        .unwrap();

        let result = nearest(&store, &[1.0, 0.0], 3).unwrap();
        let n = result.neighbors();
        assert_eq!(&*n[0].token, "same");
        // Both at 2.0, ordered by token
        assert_eq!(&*n[1].token, "opposite");
        assert_eq!(&*n[2].token, "zero");
        assert_eq!(n[2].distance, MAX_COSINE_DISTANCE);

        let result = nearest(&store, &[0.0, 0.0], 3).unwrap();
        assert!(result.iter().all(|n| n.distance == MAX_COSINE_DISTANCE));
        assert_eq!(result.tokens().collect::<Vec<_>>(), vec!["opposite", "same", "zero"]);
    }

    #[test]
    fn test_zero_vector_reject() {
        let store = EmbeddingStore::build(vec![("a", vec![1.0, 0.0]), ("zero", vec![0.0, 0.0])]).unwrap();
        let ranker = SimilarityRanker::new(RankerConfig::default().with_zero_vector_policy(ZeroVectorPolicy::Reject));

        let result = ranker.nearest(&store, &[0.0, 0.0], 1);
        assert!(matches!(result, Err(EmbeddingError::ZeroVector(ref s)) if s == "query"));

        let result = ranker.nearest(&store, &[1.0, 0.0], 1);
        assert!(matches!(result, Err(EmbeddingError::ZeroVector(ref s)) if s == "zero"));
    }

    #[test]
    fn test_non_finite_query() {
        let store = abc_store();
        let result = nearest(&store, &[f32::NAN, 0.0], 1);
        assert!(matches!(result, Err(EmbeddingError::InvalidValue { index: 0, .. })));
    }

    #[test]
    fn test_ordering_invariant() {
        let store = line_store(500);
        let result = nearest(&store, &[0.3, 0.9, 0.1], 500).unwrap();

        assert_eq!(result.len(), 500);
        for pair in result.neighbors().windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
            if pair[0].distance == pair[1].distance {
                assert!(pair[0].token < pair[1].token);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let store = line_store(300);
        let query = [0.7, -0.2, 0.4];
        let first = nearest(&store, &query, 25).unwrap();
        let second = nearest(&store, &query, 25).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_partitioned_scan_matches_sequential() {
        let store = line_store(1_000);
        let query = [0.1, 0.8, -0.3];

        let sequential = SimilarityRanker::default().nearest(&store, &query, 17).unwrap();
        let partitioned = SimilarityRanker::new(
            RankerConfig::default()
                .with_parallel_threshold(10)
                .with_partitions(7),
        )
        .nearest(&store, &query, 17)
        .unwrap();

        assert_eq!(sequential, partitioned);
    }

    #[test]
    fn test_partitioned_scan_propagates_errors() {
        let mut entries: Vec<(String, Vec<f32>)> =
            (0..100).map(|i| (format!("w{}", i), vec![1.0, i as f32])).collect();
        entries.push(("zero".to_string(), vec![0.0, 0.0]));
        let store = EmbeddingStore::build(entries).unwrap();

        let ranker = SimilarityRanker::new(
            RankerConfig::default()
                .with_zero_vector_policy(ZeroVectorPolicy::Reject)
                .with_parallel_threshold(10)
                .with_partitions(4),
        );
        assert!(matches!(
            ranker.nearest(&store, &[1.0, 0.0], 5),
            Err(EmbeddingError::ZeroVector(_))
        ));
    }

    #[test]
    fn test_results_share_store_vectors() {
        let store = abc_store();
        let result = nearest(&store, &[1.0, 0.0], 1).unwrap();
        assert!(std::ptr::eq(
            result.neighbors()[0].vector.as_ptr(),
            store.get("a").unwrap().as_ptr()
        ));
    }
}
