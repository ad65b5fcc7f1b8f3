//! Cache storage abstraction with atomic compare-and-swap updates
//!
//! Backends implement versioned reads and conditional commits; the provided
//! `update_entry` builds the bounded read-apply-commit loop on top of them.
//!
//! - `memory`: `DashMap`-backed in-process storage
//! - `async_adaptor`: callback-based contract over any blocking storage

use std::sync::Arc;

use crossbeam_utils::Backoff;

use super::{cache_entry::CacheEntry, cache_key::CacheKey};
use crate::error::{self, Result};

pub mod async_adaptor;
pub mod memory;

pub use async_adaptor::{
    AsyncCacheStorage, AsyncCacheStorageAdaptor, AsyncCacheStorageExt, AsyncCasOperation,
    CacheCallback, Cancellable, NoopCancellable,
};
pub use memory::MemoryCacheStorage;

/// Pure transform from the current entry (or absence) to the next entry
/// (`None` deletes). May be invoked more than once when a commit races.
pub type CasOperation<'a> = &'a (dyn Fn(Option<&CacheEntry>) -> Option<CacheEntry> + Send + Sync);

/// An entry together with the version it was read at
#[derive(Debug, Clone)]
pub struct Versioned {
    pub version: u64,
    pub entry: Arc<CacheEntry>,
}

/// Blocking key/value persistence for cache entries
pub trait CacheStorage: Send + Sync {
    /// Unconditional overwrite; a failed put leaves any prior entry untouched
    fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()>;

    /// Read a whole entry
    fn get(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>>;

    /// Idempotent removal; removing an absent key succeeds
    fn remove(&self, key: &CacheKey) -> Result<()>;

    /// Read an entry along with its current version
    fn get_versioned(&self, key: &CacheKey) -> Result<Option<Versioned>>;

    /// Commit `new` (or delete on `None`) only if the stored version still
    /// equals `expected` (`None` meaning "absent"). Returns false on conflict.
    fn compare_and_swap(
        &self,
        key: &CacheKey,
        expected: Option<u64>,
        new: Option<CacheEntry>,
    ) -> Result<bool>;

    /// Retries after the first attempt before `update_entry` gives up
    fn max_update_retries(&self) -> u32;

    /// Atomically replace the entry at `key` with `operation(current)`,
    /// using this storage's own retry budget.
    ///
    /// # Errors
    ///
    /// Returns `StorageContention` once the retry budget is spent, or any
    /// backend error from the underlying reads and commits.
    fn update_entry(&self, key: &CacheKey, operation: CasOperation<'_>) -> Result<()> {
        self.update_entry_with_retries(key, operation, self.max_update_retries())
    }

    /// `update_entry` with a caller-supplied retry budget
    /// (attempts = `max_retries + 1`).
    ///
    /// # Errors
    ///
    /// Same as `update_entry`.
    fn update_entry_with_retries(
        &self,
        key: &CacheKey,
        operation: CasOperation<'_>,
        max_retries: u32,
    ) -> Result<()> {
        let attempts = max_retries.saturating_add(1);
        let backoff = Backoff::new();

        for attempt in 1..=attempts {
            let current = self.get_versioned(key)?;
            let expected = current.as_ref().map(|versioned| versioned.version);
            let next = operation(current.as_ref().map(|versioned| versioned.entry.as_ref()));

            if current.is_none() && next.is_none() {
                return Ok(());
            }

            if self.compare_and_swap(key, expected, next)? {
                return Ok(());
            }

            tracing::trace!(
                target: "quyc_cache::storage",
                key = %key,
                attempt,
                "Concurrent update detected, retrying"
            );
            backoff.snooze();
        }

        tracing::warn!(
            target: "quyc_cache::storage",
            key = %key,
            attempts,
            "Cache entry update abandoned after repeated conflicts"
        );
        Err(error::storage_contention(attempts).with_key(key))
    }
}

impl<S: CacheStorage + ?Sized> CacheStorage for Arc<S> {
    fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()> {
        (**self).put(key, entry)
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>> {
        (**self).get(key)
    }

    fn remove(&self, key: &CacheKey) -> Result<()> {
        (**self).remove(key)
    }

    fn get_versioned(&self, key: &CacheKey) -> Result<Option<Versioned>> {
        (**self).get_versioned(key)
    }

    fn compare_and_swap(
        &self,
        key: &CacheKey,
        expected: Option<u64>,
        new: Option<CacheEntry>,
    ) -> Result<bool> {
        (**self).compare_and_swap(key, expected, new)
    }

    fn max_update_retries(&self) -> u32 {
        (**self).max_update_retries()
    }

    fn update_entry(&self, key: &CacheKey, operation: CasOperation<'_>) -> Result<()> {
        (**self).update_entry(key, operation)
    }

    fn update_entry_with_retries(
        &self,
        key: &CacheKey,
        operation: CasOperation<'_>,
        max_retries: u32,
    ) -> Result<()> {
        (**self).update_entry_with_retries(key, operation, max_retries)
    }
}
