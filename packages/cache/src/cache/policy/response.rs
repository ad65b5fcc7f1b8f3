//! Response cacheability: whether an origin response may be stored.

use http::{
    StatusCode,
    header::{AUTHORIZATION, EXPIRES},
};

use super::RequestCacheabilityPolicy;
use crate::cache::cache_key::varies_on_everything;
use crate::config::CacheConfig;
use crate::http::{CacheControl, HttpRequest, HttpResponse};

/// Statuses storable without explicit freshness (RFC 7231 §6.1)
const HEURISTICALLY_CACHEABLE: [u16; 9] = [200, 203, 300, 301, 404, 405, 410, 414, 501];

/// Pure predicate deciding whether a response may be stored
#[derive(Debug, Clone)]
pub struct ResponseCacheabilityPolicy {
    shared_cache: bool,
    heuristic_caching_enabled: bool,
    max_object_size_bytes: u64,
    request_policy: RequestCacheabilityPolicy,
}

impl ResponseCacheabilityPolicy {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            shared_cache: config.shared_cache,
            heuristic_caching_enabled: config.heuristic_caching_enabled,
            max_object_size_bytes: config.max_object_size_bytes,
            request_policy: RequestCacheabilityPolicy::new(),
        }
    }

    /// Decide whether `response`, received for `request`, may be stored
    #[must_use]
    pub fn is_storable(&self, request: &HttpRequest, response: &HttpResponse) -> bool {
        match self.rejection(request, response) {
            Some(reason) => {
                tracing::debug!(
                    target: "quyc_cache::policy",
                    uri = %request.uri(),
                    status = response.status().as_u16(),
                    reason,
                    "Response was not cacheable"
                );
                false
            }
            None => true,
        }
    }

    fn rejection(&self, request: &HttpRequest, response: &HttpResponse) -> Option<&'static str> {
        if !self.request_policy.is_servable(request) {
            return Some("request is not servable from cache");
        }

        let request_cc = CacheControl::parse(request.headers());
        let response_cc = CacheControl::parse(response.headers());

        if request_cc.no_store() || response_cc.no_store() {
            return Some("no-store");
        }

        let status = response.status();
        if status.is_informational()
            || status == StatusCode::PARTIAL_CONTENT
            || status == StatusCode::NOT_MODIFIED
        {
            return Some("status is never stored");
        }

        let explicit_freshness = response_cc.max_age().is_some()
            || (self.shared_cache && response_cc.s_maxage().is_some())
            || response.headers().contains_key(EXPIRES);
        let heuristic_status = HEURISTICALLY_CACHEABLE.contains(&status.as_u16());

        if !heuristic_status && !explicit_freshness {
            return Some("status is only cacheable with explicit freshness");
        }

        if self.shared_cache && response_cc.private() {
            return Some("private response in shared cache");
        }

        if varies_on_everything(response.headers()) {
            return Some("Vary: *");
        }

        if self.shared_cache
            && request.headers().contains_key(AUTHORIZATION)
            && !(response_cc.public()
                || response_cc.s_maxage().is_some()
                || response_cc.must_revalidate())
        {
            return Some("authorized request without explicit shareability");
        }

        if response.body().len() as u64 > self.max_object_size_bytes {
            return Some("body exceeds max object size");
        }

        if !explicit_freshness && !self.heuristic_caching_enabled {
            return Some("no freshness information and heuristic caching disabled");
        }

        None
    }
}
