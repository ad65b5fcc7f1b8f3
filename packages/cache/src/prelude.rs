//! Quyc Cache Prelude
//!
//! The types needed to put a cache in front of a transport.

// Orchestration
pub use crate::exec::{AsyncCachingExec, AsyncCachingExecBuilder, CacheStatus, CachingExec, CachingExecBuilder};
pub use crate::transport::{AsyncTransport, Target, Transport};

// Storage
pub use crate::cache::{
    AsyncCacheStorage, AsyncCacheStorageAdaptor, AsyncCacheStorageExt, CacheEntry, CacheKey,
    CacheStats, CacheStatsSnapshot, CacheStorage, MemoryCacheStorage, VariantKey,
};

// Configuration and time
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::CacheConfig;

// Request / response aliases
pub use crate::http::{HttpRequest, HttpResponse};

// Error types
pub use crate::error::{Error, Kind};

// HTTP standard types from http crate
pub use ::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};

// URL handling
pub use url::Url;
