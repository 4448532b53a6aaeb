use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time cache counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    /// Background refreshes that replaced a value
    pub refreshes: u64,
    pub refresh_failures: u64,
    /// Entries dropped to stay under `max_entries`
    pub evictions: u64,
    pub approx_count: usize,
    /// Sum of entry weights
    pub approx_size: usize,
}

impl CacheStatistics {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    /// Field-wise sum, for reporting several engines as one
    pub fn merge(self, other: CacheStatistics) -> CacheStatistics {
        CacheStatistics {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            refreshes: self.refreshes + other.refreshes,
            refresh_failures: self.refresh_failures + other.refresh_failures,
            evictions: self.evictions + other.evictions,
            approx_count: self.approx_count + other.approx_count,
            approx_size: self.approx_size + other.approx_size,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub refreshes: AtomicU64,
    pub refresh_failures: AtomicU64,
    pub evictions: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, approx_count: usize, approx_size: usize) -> CacheStatistics {
        CacheStatistics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            approx_count,
            approx_size,
        }
    }
}
