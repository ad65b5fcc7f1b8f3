//! Cache statistics and metrics tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Statistics for HTTP response caching
#[derive(Debug)]
pub struct CacheStats {
    /// Responses served from a fresh entry
    pub hits: AtomicU64,
    /// Lookups that found no usable entry
    pub misses: AtomicU64,
    /// Conditional requests answered with 304
    pub validations: AtomicU64,
    /// Stale entries served because the origin failed
    pub stale_served: AtomicU64,
    /// Requests that bypassed the cache entirely
    pub passthroughs: AtomicU64,
    /// Storage errors the pipeline degraded around
    pub storage_failures: AtomicU64,
    /// Cache creation time
    pub created_at: Instant,
}

/// Point-in-time copy of `CacheStats`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub validations: u64,
    pub stale_served: u64,
    pub passthroughs: u64,
    pub storage_failures: u64,
}

impl CacheStats {
    /// Create new cache statistics
    #[must_use]
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            validations: AtomicU64::new(0),
            stale_served: AtomicU64::new(0),
            passthroughs: AtomicU64::new(0),
            storage_failures: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation(&self) {
        self.validations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_served(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_passthrough(&self) {
        self.passthroughs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_failure(&self) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get hit ratio over lookups that reached storage
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) + self.validations.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64) / (total as f64)
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            validations: self.validations.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            passthroughs: self.passthroughs.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
        }
    }

    /// Get cache age
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}
