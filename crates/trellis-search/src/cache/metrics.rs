//! Lock-free cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-cache counters, incremented with relaxed atomics on the hot path.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
    populate_micros: AtomicU64,
    populate_count: AtomicU64,
    hit_micros: AtomicU64,
    hit_count: AtomicU64,
}

/// Point-in-time export of [`CacheMetrics`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheMetricsSnapshot {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub errors: u64,
    pub hit_rate: f64,
    pub avg_populate_latency_ms: f64,
    pub avg_cached_hit_latency_ms: f64,
}

impl CacheMetrics {
    pub fn record_l1_hit(&self) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_hit(&self) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_populate_latency(&self, micros: u64) {
        self.populate_micros.fetch_add(micros, Ordering::Relaxed);
        self.populate_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit_latency(&self, micros: u64) {
        self.hit_micros.fetch_add(micros, Ordering::Relaxed);
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough snapshot for the metrics endpoint; counters are
    /// read independently, not atomically as a set.
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        let l1_hits = self.l1_hits.load(Ordering::Relaxed);
        let l2_hits = self.l2_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let hits = l1_hits + l2_hits;
        let total = hits + misses;

        let populate_count = self.populate_count.load(Ordering::Relaxed);
        let hit_count = self.hit_count.load(Ordering::Relaxed);

        CacheMetricsSnapshot {
            l1_hits,
            l2_hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            avg_populate_latency_ms: avg_ms(self.populate_micros.load(Ordering::Relaxed), populate_count),
            avg_cached_hit_latency_ms: avg_ms(self.hit_micros.load(Ordering::Relaxed), hit_count),
        }
    }
}

fn avg_ms(total_micros: u64, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    (total_micros as f64 / count as f64) / 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let metrics = CacheMetrics::default();
        metrics.record_l1_hit();
        metrics.record_l2_hit();
        metrics.record_miss();
        metrics.record_miss();

        let snap = metrics.snapshot();
        assert_eq!(snap.l1_hits, 1);
        assert_eq!(snap.l2_hits, 1);
        assert_eq!(snap.misses, 2);
        assert!((snap.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_snapshot_has_no_nan() {
        let snap = CacheMetrics::default().snapshot();
        assert_eq!(snap.hit_rate, 0.0);
        assert_eq!(snap.avg_populate_latency_ms, 0.0);
        assert_eq!(snap.avg_cached_hit_latency_ms, 0.0);
    }

    #[test]
    fn test_latency_average() {
        let metrics = CacheMetrics::default();
        metrics.record_populate_latency(2_000);
        metrics.record_populate_latency(4_000);
        let snap = metrics.snapshot();
        assert!((snap.avg_populate_latency_ms - 3.0).abs() < 1e-9);
    }
}
