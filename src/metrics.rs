//! Lightweight in-process counters for the retrieval pipeline.
//!
//! Grounded on the teacher's `metrics.rs` (`CodeMetrics`, a plain struct
//! computed/read without an external metrics backend): this module keeps
//! the same "just a struct with atomics" shape rather than pulling in a
//! metrics crate, since the spec calls for counters observable in-process
//! (§8 S5, S6) rather than an exported metrics surface (out of scope).

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Process-wide counters for the pipeline's internal invariants.
///
/// All fields are independent monotonic counters; `snapshot` reads them
/// without locking (each field is a single atomic load).
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub nan_factors: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub stage_failures: AtomicU64,
    pub adaptive_updates: AtomicU64,
    pub adaptive_rollbacks: AtomicU64,
}

/// Point-in-time read of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub nan_factors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub stage_failures: u64,
    pub adaptive_updates: u64,
    pub adaptive_rollbacks: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_nan_factor(&self) {
        self.nan_factors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stage_failure(&self) {
        self.stage_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_adaptive_update(&self) {
        self.adaptive_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_adaptive_rollback(&self) {
        self.adaptive_rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            nan_factors: self.nan_factors.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            stage_failures: self.stage_failures.load(Ordering::Relaxed),
            adaptive_updates: self.adaptive_updates.load(Ordering::Relaxed),
            adaptive_rollbacks: self.adaptive_rollbacks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let metrics = PipelineMetrics::new();
        metrics.record_nan_factor();
        metrics.record_nan_factor();
        metrics.record_cache_hit();

        let snap = metrics.snapshot();
        assert_eq!(snap.nan_factors, 2);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_misses, 0);
    }
}
