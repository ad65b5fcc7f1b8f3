//! In-memory cache storage backed by `DashMap`
//!
//! Entries are held as `Arc<CacheEntry>` so readers always observe a whole
//! entry. Every commit stamps a fresh version from a global counter, which
//! makes `compare_and_swap` immune to ABA. An optional entry bound evicts
//! the oldest entries by `entry_date`.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};

use super::{CacheStorage, Versioned};
use crate::cache::{cache_entry::CacheEntry, cache_key::CacheKey};
use crate::error::Result;

/// Default retry budget for CAS updates
pub const DEFAULT_MAX_UPDATE_RETRIES: u32 = 5;

/// Lock-sharded in-memory storage
#[derive(Debug)]
pub struct MemoryCacheStorage {
    entries: DashMap<CacheKey, Versioned>,
    next_version: AtomicU64,
    /// 0 means unbounded
    max_entries: usize,
    max_update_retries: u32,
    evictions: AtomicU64,
}

impl Default for MemoryCacheStorage {
    fn default() -> Self {
        Self::new(0, DEFAULT_MAX_UPDATE_RETRIES)
    }
}

impl MemoryCacheStorage {
    #[must_use]
    pub fn new(max_entries: usize, max_update_retries: u32) -> Self {
        Self {
            entries: DashMap::new(),
            next_version: AtomicU64::new(1),
            max_entries,
            max_update_retries,
            evictions: AtomicU64::new(0),
        }
    }

    /// Unbounded storage using the configured CAS retry budget
    #[must_use]
    pub fn from_config(config: &crate::config::CacheConfig) -> Self {
        Self::new(0, config.max_update_retries)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries dropped by the entry bound
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Clear all cached entries
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn versioned(&self, entry: CacheEntry) -> Versioned {
        Versioned {
            version: self.next_version.fetch_add(1, Ordering::Relaxed),
            entry: Arc::new(entry),
        }
    }

    /// Evict the oldest entries until the bound holds again.
    /// Returns the number of entries actually evicted.
    fn evict_oldest(&self) -> usize {
        if self.max_entries == 0 || self.entries.len() <= self.max_entries {
            return 0;
        }

        let mut candidates: Vec<(CacheKey, std::time::SystemTime)> = self
            .entries
            .iter()
            .map(|item| (item.key().clone(), item.value().entry.entry_date))
            .collect();
        candidates.sort_by_key(|(_, entry_date)| *entry_date);

        let excess = self.entries.len().saturating_sub(self.max_entries);
        let mut evicted = 0;
        for (key, _) in candidates.into_iter().take(excess) {
            if self.entries.remove(&key).is_some() {
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(
                target: "quyc_cache::storage",
                evicted_count = evicted,
                max_entries = self.max_entries,
                "Cache evicted entries due to count limit"
            );
        }
        evicted
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()> {
        let versioned = self.versioned(entry);
        self.entries.insert(key.clone(), versioned);
        self.evict_oldest();
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>> {
        Ok(self.entries.get(key).map(|item| Arc::clone(&item.value().entry)))
    }

    fn remove(&self, key: &CacheKey) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn get_versioned(&self, key: &CacheKey) -> Result<Option<Versioned>> {
        Ok(self.entries.get(key).map(|item| item.value().clone()))
    }

    fn compare_and_swap(
        &self,
        key: &CacheKey,
        expected: Option<u64>,
        new: Option<CacheEntry>,
    ) -> Result<bool> {
        // the shard guard must be released before eviction walks the map
        let committed = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if Some(occupied.get().version) != expected {
                    false
                } else {
                    match new {
                        Some(entry) => {
                            occupied.insert(self.versioned(entry));
                        }
                        None => {
                            occupied.remove();
                        }
                    }
                    true
                }
            }
            Entry::Vacant(vacant) => {
                if expected.is_some() {
                    false
                } else {
                    if let Some(entry) = new {
                        vacant.insert(self.versioned(entry));
                    }
                    true
                }
            }
        };

        if committed {
            self.evict_oldest();
        }
        Ok(committed)
    }

    fn max_update_retries(&self) -> u32 {
        self.max_update_retries
    }
}
