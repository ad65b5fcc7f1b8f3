//! Callback-based storage contract and its adaptor over blocking storage.
//!
//! `AsyncCacheStorageAdaptor` runs every operation to completion before
//! returning and invokes the callback inline. The returned handle is a
//! no-op: the work is already committed by the time it could be cancelled.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::oneshot;

use super::CacheStorage;
use crate::cache::{cache_entry::CacheEntry, cache_key::CacheKey};
use crate::error::{self, Result, StoragePanicked};

/// Completion callback receiving the outcome of a storage operation
pub type CacheCallback<T> = Box<dyn FnOnce(Result<T>) + Send>;

/// Owned CAS transform for callback-based updates
pub type AsyncCasOperation = Box<dyn Fn(Option<&CacheEntry>) -> Option<CacheEntry> + Send + Sync>;

/// Handle returned by every callback-based storage operation
pub trait Cancellable: Send {
    /// Attempt to cancel the operation. Returns true if it was cancelled.
    fn cancel(&self) -> bool;
}

/// Handle for operations that have already completed
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCancellable;

impl Cancellable for NoopCancellable {
    fn cancel(&self) -> bool {
        false
    }
}

/// Non-blocking storage contract: results are delivered through callbacks
pub trait AsyncCacheStorage: Send + Sync {
    fn put_entry(
        &self,
        key: CacheKey,
        entry: CacheEntry,
        callback: CacheCallback<()>,
    ) -> Box<dyn Cancellable>;

    fn get_entry(
        &self,
        key: CacheKey,
        callback: CacheCallback<Option<Arc<CacheEntry>>>,
    ) -> Box<dyn Cancellable>;

    fn remove_entry(&self, key: CacheKey, callback: CacheCallback<()>) -> Box<dyn Cancellable>;

    fn update_entry(
        &self,
        key: CacheKey,
        operation: AsyncCasOperation,
        callback: CacheCallback<()>,
    ) -> Box<dyn Cancellable>;

    /// `update_entry` under a caller-supplied CAS retry budget. Backends
    /// without a retry loop of their own (native conditional writes) keep
    /// the default, which ignores the budget.
    fn update_entry_with_retries(
        &self,
        key: CacheKey,
        operation: AsyncCasOperation,
        _max_retries: u32,
        callback: CacheCallback<()>,
    ) -> Box<dyn Cancellable> {
        self.update_entry(key, operation, callback)
    }
}

/// Exposes a blocking `CacheStorage` through the callback contract
#[derive(Debug, Clone, Default)]
pub struct AsyncCacheStorageAdaptor<S> {
    storage: S,
}

impl<S: CacheStorage> AsyncCacheStorageAdaptor<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_inner(self) -> S {
        self.storage
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `operation` now, route its outcome (panics included) to `callback`
fn complete_inline<T, F>(
    op_name: &'static str,
    key: &CacheKey,
    operation: F,
    callback: CacheCallback<T>,
) -> Box<dyn Cancellable>
where
    F: FnOnce() -> Result<T>,
{
    let result = match panic::catch_unwind(AssertUnwindSafe(operation)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                target: "quyc_cache::storage",
                key = %key,
                operation = op_name,
                panic = %message,
                "Cache storage panicked"
            );
            Err(error::storage_unavailable(StoragePanicked(message)).with_key(key))
        }
    };

    callback(result);
    Box::new(NoopCancellable)
}

impl<S: CacheStorage> AsyncCacheStorage for AsyncCacheStorageAdaptor<S> {
    fn put_entry(
        &self,
        key: CacheKey,
        entry: CacheEntry,
        callback: CacheCallback<()>,
    ) -> Box<dyn Cancellable> {
        complete_inline("put", &key, || self.storage.put(&key, entry), callback)
    }

    fn get_entry(
        &self,
        key: CacheKey,
        callback: CacheCallback<Option<Arc<CacheEntry>>>,
    ) -> Box<dyn Cancellable> {
        complete_inline("get", &key, || self.storage.get(&key), callback)
    }

    fn remove_entry(&self, key: CacheKey, callback: CacheCallback<()>) -> Box<dyn Cancellable> {
        complete_inline("remove", &key, || self.storage.remove(&key), callback)
    }

    fn update_entry(
        &self,
        key: CacheKey,
        operation: AsyncCasOperation,
        callback: CacheCallback<()>,
    ) -> Box<dyn Cancellable> {
        complete_inline(
            "update",
            &key,
            || self.storage.update_entry(&key, operation.as_ref()),
            callback,
        )
    }

    fn update_entry_with_retries(
        &self,
        key: CacheKey,
        operation: AsyncCasOperation,
        max_retries: u32,
        callback: CacheCallback<()>,
    ) -> Box<dyn Cancellable> {
        complete_inline(
            "update",
            &key,
            || {
                self.storage
                    .update_entry_with_retries(&key, operation.as_ref(), max_retries)
            },
            callback,
        )
    }
}

fn callback_dropped() -> error::Error {
    error::storage_unavailable("storage dropped the completion callback")
}

/// `async fn` wrappers over the callback contract
pub trait AsyncCacheStorageExt: AsyncCacheStorage {
    fn put(&self, key: CacheKey, entry: CacheEntry) -> impl Future<Output = Result<()>> + Send {
        let (tx, rx) = oneshot::channel();
        let _handle = self.put_entry(key, entry, Box::new(move |result| {
            let _ = tx.send(result);
        }));
        async move { rx.await.map_err(|_| callback_dropped())? }
    }

    fn get(&self, key: CacheKey) -> impl Future<Output = Result<Option<Arc<CacheEntry>>>> + Send {
        let (tx, rx) = oneshot::channel();
        let _handle = self.get_entry(key, Box::new(move |result| {
            let _ = tx.send(result);
        }));
        async move { rx.await.map_err(|_| callback_dropped())? }
    }

    fn remove(&self, key: CacheKey) -> impl Future<Output = Result<()>> + Send {
        let (tx, rx) = oneshot::channel();
        let _handle = self.remove_entry(key, Box::new(move |result| {
            let _ = tx.send(result);
        }));
        async move { rx.await.map_err(|_| callback_dropped())? }
    }

    fn update(
        &self,
        key: CacheKey,
        operation: AsyncCasOperation,
    ) -> impl Future<Output = Result<()>> + Send {
        let (tx, rx) = oneshot::channel();
        let _handle = self.update_entry(key, operation, Box::new(move |result| {
            let _ = tx.send(result);
        }));
        async move { rx.await.map_err(|_| callback_dropped())? }
    }

    fn update_with_retries(
        &self,
        key: CacheKey,
        operation: AsyncCasOperation,
        max_retries: u32,
    ) -> impl Future<Output = Result<()>> + Send {
        let (tx, rx) = oneshot::channel();
        let _handle = self.update_entry_with_retries(key, operation, max_retries, Box::new(move |result| {
            let _ = tx.send(result);
        }));
        async move { rx.await.map_err(|_| callback_dropped())? }
    }
}

impl<S: AsyncCacheStorage + ?Sized> AsyncCacheStorageExt for S {}
