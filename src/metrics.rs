//! Query Metrics
//!
//! Query counters and latency tracking.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector
#[derive(Debug)]
pub struct Metrics {
    /// Total queries answered
    total_queries: AtomicU64,

    /// Queries that ended in an error
    failed_queries: AtomicU64,

    /// Store entries scanned across all queries
    entries_scanned: AtomicU64,

    /// Queries per operation name
    ops_by_kind: RwLock<HashMap<String, u64>>,

    latency_sum_us: AtomicU64,
    latency_count: AtomicU64,
    latency_min_us: AtomicU64,
    latency_max_us: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            total_queries: AtomicU64::new(0),
            failed_queries: AtomicU64::new(0),
            entries_scanned: AtomicU64::new(0),
            ops_by_kind: RwLock::new(HashMap::new()),
            latency_sum_us: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            latency_min_us: AtomicU64::new(u64::MAX),
            latency_max_us: AtomicU64::new(0),
        }
    }

    /// Record a completed query
    pub fn record_query(&self, kind: &str, scanned: usize, latency: Duration) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.entries_scanned
            .fetch_add(scanned as u64, Ordering::Relaxed);

        *self.ops_by_kind.write().entry(kind.to_string()).or_insert(0) += 1;

        let latency_us = latency.as_micros() as u64;
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_min_us.fetch_min(latency_us, Ordering::Relaxed);
        self.latency_max_us.fetch_max(latency_us, Ordering::Relaxed);
    }

    /// Record a failed query
    pub fn record_failure(&self) {
        self.failed_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_queries(&self) -> u64 {
        self.total_queries.load(Ordering::Relaxed)
    }

    pub fn failed_queries(&self) -> u64 {
        self.failed_queries.load(Ordering::Relaxed)
    }

    pub fn entries_scanned(&self) -> u64 {
        self.entries_scanned.load(Ordering::Relaxed)
    }

    /// Get queries by operation name
    pub fn ops_by_kind(&self) -> HashMap<String, u64> {
        self.ops_by_kind.read().clone()
    }

    /// Get average latency in microseconds
    pub fn avg_latency_us(&self) -> f64 {
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        sum as f64 / count as f64
    }

    /// Get min latency in microseconds
    pub fn min_latency_us(&self) -> u64 {
        let min = self.latency_min_us.load(Ordering::Relaxed);
        if min == u64::MAX {
            0
        } else {
            min
        }
    }

    /// Get max latency in microseconds
    pub fn max_latency_us(&self) -> u64 {
        self.latency_max_us.load(Ordering::Relaxed)
    }

    /// Get a summary of metrics
    pub fn summary(&self) -> String {
        format!(
            "Queries: {} (failed {}) | Scanned: {} | Latency (µs): avg={:.1}, min={}, max={}",
            self.total_queries(),
            self.failed_queries(),
            self.entries_scanned(),
            self.avg_latency_us(),
            self.min_latency_us(),
            self.max_latency_us()
        )
    }
}
