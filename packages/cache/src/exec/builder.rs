//! Builders for the caching execs

use std::sync::Arc;

use super::decision::ExecCore;
use super::{AsyncCachingExec, CachingExec};
use crate::cache::{
    AsyncCacheInvalidator, AsyncCacheStorage, AsyncCacheStorageAdaptor, CacheInvalidator,
    CacheStorage, MemoryCacheStorage,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheConfig, Validator};
use crate::error::{self, Result};
use crate::transport::{AsyncTransport, Transport};

fn validated(config: CacheConfig) -> Result<CacheConfig> {
    config.validate().map_err(error::config)?;
    Ok(config)
}

/// Builder for [`CachingExec`]
#[must_use = "builders do nothing unless you call build"]
pub struct CachingExecBuilder<T> {
    transport: T,
    config: CacheConfig,
    storage: Option<Arc<dyn CacheStorage>>,
    clock: Option<Arc<dyn Clock>>,
}

impl<T: Transport> CachingExecBuilder<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: CacheConfig::default(),
            storage: None,
            clock: None,
        }
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Storage backend; defaults to an unbounded `MemoryCacheStorage`.
    /// Updates through the exec use the configured `max_update_retries`,
    /// not the backend's own budget.
    pub fn storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Time source; defaults to `SystemClock`
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and assemble the exec
    ///
    /// # Errors
    ///
    /// Returns a `Config` error when the configuration is invalid.
    pub fn build(self) -> Result<CachingExec<T>> {
        let config = validated(self.config)?;
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryCacheStorage::from_config(&config)));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        tracing::debug!(
            target: "quyc_cache::exec",
            shared_cache = config.shared_cache,
            max_update_retries = storage.max_update_retries(),
            "Built caching exec"
        );

        Ok(CachingExec {
            core: ExecCore::new(config, clock),
            transport: self.transport,
            invalidator: CacheInvalidator::new(Arc::clone(&storage)),
            storage,
        })
    }
}

/// Builder for [`AsyncCachingExec`]
#[must_use = "builders do nothing unless you call build"]
pub struct AsyncCachingExecBuilder<T> {
    transport: T,
    config: CacheConfig,
    storage: Option<Arc<dyn AsyncCacheStorage>>,
    clock: Option<Arc<dyn Clock>>,
}

impl<T: AsyncTransport> AsyncCachingExecBuilder<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: CacheConfig::default(),
            storage: None,
            clock: None,
        }
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Storage backend; defaults to a `MemoryCacheStorage` behind an
    /// `AsyncCacheStorageAdaptor`
    pub fn storage(mut self, storage: Arc<dyn AsyncCacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// # Errors
    ///
    /// Returns a `Config` error when the configuration is invalid.
    pub fn build(self) -> Result<AsyncCachingExec<T>> {
        let config = validated(self.config)?;
        let storage = self.storage.unwrap_or_else(|| {
            Arc::new(AsyncCacheStorageAdaptor::new(MemoryCacheStorage::from_config(&config)))
        });
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        tracing::debug!(
            target: "quyc_cache::exec",
            shared_cache = config.shared_cache,
            request_timeout = ?config.request_timeout,
            "Built async caching exec"
        );

        Ok(AsyncCachingExec {
            core: ExecCore::new(config, clock),
            transport: self.transport,
            invalidator: AsyncCacheInvalidator::new(Arc::clone(&storage)),
            storage,
        })
    }
}
