//! RFC 7234 response caching
//!
//! This module provides the building blocks the orchestrator composes:
//! - `CacheKey`/`VariantKey` composite keys, with `Vary` handled as a sorted set of pairs
//! - `CacheEntry` with the timestamps needed for age computation
//! - Pure cacheability and validity policies
//! - `CacheStorage` with atomic compare-and-swap updates, plus a callback-based adaptor
//! - Invalidation on unsafe methods
//! - Atomic counters for statistics

pub mod cache_entry;
pub mod cache_key;
pub mod cache_stats;
pub mod invalidator;
pub mod policy;
pub mod storage;

// Re-export all public types
pub use cache_entry::CacheEntry;
pub use cache_key::{CacheKey, VariantKey};
pub use cache_stats::{CacheStats, CacheStatsSnapshot};
pub use invalidator::{AsyncCacheInvalidator, CacheInvalidator};
pub use policy::{CacheValidityPolicy, RequestCacheabilityPolicy, ResponseCacheabilityPolicy};
pub use storage::{
    AsyncCacheStorage, AsyncCacheStorageAdaptor, AsyncCacheStorageExt, CacheStorage,
    MemoryCacheStorage, Versioned,
};
