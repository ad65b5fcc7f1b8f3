//! Request cacheability: whether a request may be satisfied from cache.

use http::{
    Method, Version,
    header::{CACHE_CONTROL, PRAGMA},
};

use crate::http::{HttpRequest, directives, headers::header_elements};

/// Pure predicate deciding whether a request may be served from cache
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestCacheabilityPolicy;

impl RequestCacheabilityPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// True when the request is an HTTP/1.1 GET without `Pragma` and without
    /// `no-store`/`no-cache` in any `Cache-Control` instance.
    #[must_use]
    pub fn is_servable(&self, request: &HttpRequest) -> bool {
        let rejection = if request.version() != Version::HTTP_11 {
            Some("protocol version is not HTTP/1.1")
        } else if request.method() != Method::GET {
            Some("method is not GET")
        } else if request.headers().contains_key(PRAGMA) {
            Some("Pragma header present")
        } else if header_elements(request.headers(), CACHE_CONTROL).any(|element| {
            let name = element.split('=').next().unwrap_or_default().trim();
            name.eq_ignore_ascii_case(directives::NO_STORE)
                || name.eq_ignore_ascii_case(directives::NO_CACHE)
        }) {
            Some("Cache-Control forbids cached response")
        } else {
            None
        };

        match rejection {
            Some(reason) => {
                tracing::debug!(
                    target: "quyc_cache::policy",
                    method = %request.method(),
                    uri = %request.uri(),
                    reason,
                    "Request was not servable from cache"
                );
                false
            }
            None => {
                tracing::trace!(
                    target: "quyc_cache::policy",
                    uri = %request.uri(),
                    "Request was servable from cache"
                );
                true
            }
        }
    }
}
