use std::sync::atomic::{AtomicU64, Ordering};

/// Per-instance counters, shared by every connection task.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    cache_read_errors: AtomicU64,
    failures: AtomicU64,
    tunnels_rejected: AtomicU64,
    bytes_replayed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub cache_read_errors: u64,
    pub failures: u64,
    pub tunnels_rejected: u64,
    pub bytes_replayed: u64,
}

impl CacheMetrics {
    pub fn record_hit(&self, size: usize) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.bytes_replayed.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_read_error(&self) {
        self.cache_read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tunnel_rejected(&self) {
        self.tunnels_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            cache_read_errors: self.cache_read_errors.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            tunnels_rejected: self.tunnels_rejected.load(Ordering::Relaxed),
            bytes_replayed: self.bytes_replayed.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::CacheMetrics;

    #[test]
    fn hit_rate_is_zero_without_traffic() {
        assert_eq!(CacheMetrics::default().snapshot().hit_rate(), 0.0);
    }

    #[test]
    fn snapshot_reflects_recorded_events() {
        let metrics = CacheMetrics::default();
        metrics.record_miss();
        metrics.record_hit(10);
        metrics.record_hit(5);
        metrics.record_tunnel_rejected();

        let snap = metrics.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.bytes_replayed, 15);
        assert_eq!(snap.tunnels_rejected, 1);
        assert!((snap.hit_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }
}
