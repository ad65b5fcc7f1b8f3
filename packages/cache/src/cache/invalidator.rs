//! Invalidation of stored entries by unsafe requests (RFC 7234 §4.4).
//!
//! Two phases: before the request reaches the transport its target URI is
//! flushed; once a non-error response arrives, same-origin `Location` and
//! `Content-Location` targets are flushed too. Storage failures are logged
//! and swallowed so they never block the request.

use std::sync::Arc;

use futures::future::join_all;
use http::header::{CONTENT_LOCATION, LOCATION};
use url::Url;

use super::cache_key::CacheKey;
use super::storage::{AsyncCacheStorage, AsyncCacheStorageExt, CacheStorage};
use crate::error::Result;
use crate::http::{
    HttpRequest, HttpResponse,
    headers::first_str,
    is_safe_method,
    url::{normalize_uri, resolve_reference, same_origin},
};

/// Normalized target of an unsafe request, if it has one
fn unsafe_target(request: &HttpRequest) -> Option<Url> {
    if is_safe_method(request.method()) {
        return None;
    }
    normalize_uri(request.uri())
}

/// Same-origin URIs named by `Location` / `Content-Location`
fn response_targets(request: &HttpRequest, response: &HttpResponse) -> Vec<Url> {
    let Some(request_url) = unsafe_target(request) else {
        return Vec::new();
    };
    if response.status().as_u16() >= 400 {
        return Vec::new();
    }

    let mut targets: Vec<Url> = Vec::with_capacity(2);
    for name in [LOCATION, CONTENT_LOCATION] {
        let Some(reference) = first_str(response.headers(), name) else {
            continue;
        };
        let Some(target) = resolve_reference(&request_url, reference) else {
            continue;
        };
        if !same_origin(&request_url, &target) {
            tracing::debug!(
                target: "quyc_cache::invalidator",
                uri = %request_url,
                location = %target,
                "Skipping cross-origin invalidation target"
            );
            continue;
        }
        if target != request_url && !targets.contains(&target) {
            targets.push(target);
        }
    }
    targets
}

/// Keep the first failure of a best-effort sequence of removals
fn keep_first(first: &mut Option<crate::Error>, result: Result<()>) {
    if let Err(err) = result {
        first.get_or_insert(err);
    }
}

fn finish_invalidation(uri: &Url, first: Option<crate::Error>) -> Result<()> {
    match first {
        Some(err) => Err(err),
        None => {
            tracing::debug!(target: "quyc_cache::invalidator", uri = %uri, "Invalidated cache entry");
            Ok(())
        }
    }
}

fn log_failure(uri: &Url, err: &crate::Error) {
    tracing::warn!(
        target: "quyc_cache::invalidator",
        uri = %uri,
        error = %err,
        "Cache invalidation failed, continuing"
    );
}

/// Blocking invalidator over a `CacheStorage`
#[derive(Clone)]
pub struct CacheInvalidator {
    storage: Arc<dyn CacheStorage>,
}

impl CacheInvalidator {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self { storage }
    }

    /// Pre-request phase; a no-op for safe methods
    pub fn on_request(&self, request: &HttpRequest) {
        if let Some(url) = unsafe_target(request) {
            if let Err(err) = self.invalidate_uri(&url) {
                log_failure(&url, &err);
            }
        }
    }

    /// Post-response phase
    pub fn on_response(&self, request: &HttpRequest, response: &HttpResponse) {
        for url in response_targets(request, response) {
            if let Err(err) = self.invalidate_uri(&url) {
                log_failure(&url, &err);
            }
        }
    }

    /// Remove the root entry for `uri` and every variant it lists.
    ///
    /// Every removal is attempted even when an earlier step fails; the root
    /// is removed even if its variant list cannot be read.
    ///
    /// # Errors
    ///
    /// Returns the first storage error encountered.
    pub fn invalidate_uri(&self, uri: &Url) -> Result<()> {
        let root = CacheKey::root(uri);
        let mut first = None;
        match self.storage.get(&root) {
            Ok(Some(entry)) => {
                for variant in &entry.variants {
                    keep_first(&mut first, self.storage.remove(&root.with_variant(variant.clone())));
                }
            }
            Ok(None) => {}
            Err(err) => keep_first(&mut first, Err(err)),
        }
        keep_first(&mut first, self.storage.remove(&root));
        finish_invalidation(uri, first)
    }
}

impl std::fmt::Debug for CacheInvalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInvalidator").finish_non_exhaustive()
    }
}

/// Invalidator over the callback-based storage contract
#[derive(Clone)]
pub struct AsyncCacheInvalidator {
    storage: Arc<dyn AsyncCacheStorage>,
}

impl AsyncCacheInvalidator {
    pub fn new(storage: Arc<dyn AsyncCacheStorage>) -> Self {
        Self { storage }
    }

    pub async fn on_request(&self, request: &HttpRequest) {
        if let Some(url) = unsafe_target(request) {
            if let Err(err) = self.invalidate_uri(&url).await {
                log_failure(&url, &err);
            }
        }
    }

    pub async fn on_response(&self, request: &HttpRequest, response: &HttpResponse) {
        for url in response_targets(request, response) {
            if let Err(err) = self.invalidate_uri(&url).await {
                log_failure(&url, &err);
            }
        }
    }

    /// # Errors
    ///
    /// Returns the first storage error encountered; the remaining removals
    /// still run.
    pub async fn invalidate_uri(&self, uri: &Url) -> Result<()> {
        let root = CacheKey::root(uri);
        let mut first = None;
        match self.storage.get(root.clone()).await {
            Ok(Some(entry)) => {
                let removals = entry
                    .variants
                    .iter()
                    .map(|variant| self.storage.remove(root.with_variant(variant.clone())));
                for result in join_all(removals).await {
                    keep_first(&mut first, result);
                }
            }
            Ok(None) => {}
            Err(err) => keep_first(&mut first, Err(err)),
        }
        keep_first(&mut first, self.storage.remove(root).await);
        finish_invalidation(uri, first)
    }
}

impl std::fmt::Debug for AsyncCacheInvalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncCacheInvalidator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::cache_entry::CacheEntry;
    use crate::cache::cache_key::VariantKey;
    use crate::cache::storage::{AsyncCacheStorageAdaptor, MemoryCacheStorage, Versioned};
    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};
    use std::collections::BTreeSet;
    use std::time::UNIX_EPOCH;

    fn url(path: &str) -> Url {
        Url::parse(&format!("https://example.com{path}")).unwrap()
    }

    fn seed(storage: &MemoryCacheStorage, path: &str) {
        let key = CacheKey::root(&url(path));
        let response = http::Response::new(Bytes::from_static(b"cached"));
        let entry = CacheEntry::from_response(&key, &response, UNIX_EPOCH, UNIX_EPOCH, UNIX_EPOCH);
        storage.put(&key, entry).unwrap();
    }

    fn request(method: Method, path: &str) -> HttpRequest {
        http::Request::builder()
            .method(method)
            .uri(format!("https://example.com{path}"))
            .body(Bytes::new())
            .unwrap()
    }

    fn response(status: StatusCode, headers: &[(http::HeaderName, &str)]) -> HttpResponse {
        let mut builder = http::Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(name, *value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    fn setup() -> (Arc<MemoryCacheStorage>, CacheInvalidator) {
        let storage = Arc::new(MemoryCacheStorage::default());
        let invalidator = CacheInvalidator::new(storage.clone());
        (storage, invalidator)
    }

    #[test]
    fn unsafe_request_flushes_target() {
        let (storage, invalidator) = setup();
        seed(&storage, "/resource");
        invalidator.on_request(&request(Method::POST, "/resource"));
        assert!(storage.get(&CacheKey::root(&url("/resource"))).unwrap().is_none());
    }

    #[test]
    fn safe_request_is_noop() {
        let (storage, invalidator) = setup();
        seed(&storage, "/resource");
        for method in [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE] {
            invalidator.on_request(&request(method, "/resource"));
        }
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn variants_are_flushed_with_root() {
        let (storage, invalidator) = setup();
        let root = CacheKey::root(&url("/doc"));
        let mut headers = HeaderMap::new();
        headers.insert("accept", "text/html".parse().unwrap());
        let variant = VariantKey::from_request(["accept"], &headers);

        let vary_response = http::Response::builder()
            .header("vary", "Accept")
            .body(Bytes::new())
            .unwrap();
        let variant_key = root.with_variant(variant.clone());
        let variant_entry = CacheEntry::from_response(
            &variant_key,
            &vary_response,
            UNIX_EPOCH,
            UNIX_EPOCH,
            UNIX_EPOCH,
        );
        let root_entry = variant_entry.as_root(BTreeSet::from([variant]));
        storage.put(&variant_key, variant_entry).unwrap();
        storage.put(&root, root_entry).unwrap();

        invalidator.on_request(&request(Method::DELETE, "/doc"));
        assert!(storage.is_empty());
    }

    #[test]
    fn location_targets_flushed_only_on_same_origin_success() {
        let (storage, invalidator) = setup();
        seed(&storage, "/created");
        seed(&storage, "/listing");

        let post = request(Method::POST, "/collection");
        invalidator.on_response(
            &post,
            &response(StatusCode::INTERNAL_SERVER_ERROR, &[(LOCATION, "/created")]),
        );
        assert_eq!(storage.len(), 2);

        invalidator.on_response(
            &post,
            &response(
                StatusCode::CREATED,
                &[
                    (LOCATION, "/created"),
                    (CONTENT_LOCATION, "https://other.example/listing"),
                ],
            ),
        );
        assert!(storage.get(&CacheKey::root(&url("/created"))).unwrap().is_none());
        assert!(storage.get(&CacheKey::root(&url("/listing"))).unwrap().is_some());
    }

    /// Reads always fail; removals reach the wrapped memory store
    struct UnreadableStorage(MemoryCacheStorage);

    impl CacheStorage for UnreadableStorage {
        fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()> {
            self.0.put(key, entry)
        }

        fn get(&self, _key: &CacheKey) -> Result<Option<Arc<CacheEntry>>> {
            Err(crate::error::storage_unavailable("read path down"))
        }

        fn remove(&self, key: &CacheKey) -> Result<()> {
            self.0.remove(key)
        }

        fn get_versioned(&self, _key: &CacheKey) -> Result<Option<Versioned>> {
            Err(crate::error::storage_unavailable("read path down"))
        }

        fn compare_and_swap(
            &self,
            key: &CacheKey,
            expected: Option<u64>,
            new: Option<CacheEntry>,
        ) -> Result<bool> {
            self.0.compare_and_swap(key, expected, new)
        }

        fn max_update_retries(&self) -> u32 {
            self.0.max_update_retries()
        }
    }

    #[test]
    fn failed_variant_lookup_still_removes_root() {
        let storage = Arc::new(UnreadableStorage(MemoryCacheStorage::default()));
        seed(&storage.0, "/doc");
        let invalidator = CacheInvalidator::new(storage.clone());

        let err = invalidator.invalidate_uri(&url("/doc")).unwrap_err();
        assert!(err.is_storage_unavailable());
        assert!(storage.0.is_empty());

        seed(&storage.0, "/doc");
        invalidator.on_request(&request(Method::POST, "/doc"));
        assert!(storage.0.is_empty());
    }

    #[tokio::test]
    async fn async_failed_variant_lookup_still_removes_root() {
        let adaptor = Arc::new(AsyncCacheStorageAdaptor::new(UnreadableStorage(
            MemoryCacheStorage::default(),
        )));
        seed(&adaptor.storage().0, "/doc");
        let invalidator = AsyncCacheInvalidator::new(adaptor.clone());
        invalidator.on_request(&request(Method::DELETE, "/doc")).await;
        assert!(adaptor.storage().0.is_empty());
    }

    #[tokio::test]
    async fn async_invalidator_flushes_target() {
        let adaptor = Arc::new(AsyncCacheStorageAdaptor::new(MemoryCacheStorage::default()));
        seed(adaptor.storage(), "/resource");
        let invalidator = AsyncCacheInvalidator::new(adaptor.clone());
        invalidator.on_request(&request(Method::PUT, "/resource")).await;
        assert!(adaptor.storage().is_empty());
    }
}
