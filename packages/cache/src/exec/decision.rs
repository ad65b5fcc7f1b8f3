//! Decisions shared by the blocking and async orchestrators.
//!
//! Nothing here performs I/O: the execs fetch entries and call the
//! transport, this core tells them what to do with the results.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use bytes::Bytes;
use http::{
    HeaderValue, StatusCode,
    header::{AGE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, WARNING},
};

use super::{CacheState, CacheStatus};
use crate::cache::{
    CacheEntry, CacheKey, CacheStats, VariantKey,
    cache_key::vary_names,
    policy::{CacheValidityPolicy, RequestCacheabilityPolicy, ResponseCacheabilityPolicy},
    storage::AsyncCasOperation,
};
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::Error;
use crate::http::{CacheControl, HttpRequest, HttpResponse, is_safe_method, url::normalize_uri};

const WARNING_STALE: HeaderValue = HeaderValue::from_static("110 - \"Response is Stale\"");
const WARNING_REVALIDATION_FAILED: HeaderValue =
    HeaderValue::from_static("111 - \"Revalidation Failed\"");

/// How a request enters the pipeline
#[derive(Debug)]
pub(crate) enum Route {
    /// Not keyable or not servable from storage; forward untouched
    Passthrough,
    /// Unsafe method: invalidate around the transport call
    Invalidate,
    /// Client conditional request: forward as-is, a full response may be stored
    Forward(CacheKey),
    /// Look the resource up in storage
    Lookup(CacheKey),
}

/// What to do with a stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Serve from storage; `stale` when only a request `max-stale` allows it
    Serve { stale: bool },
    /// Issue a conditional request built from the entry's validators
    Revalidate,
    /// Stale without validators: fetch unconditionally
    Refetch,
    /// `only-if-cached` and nothing usable
    Unsatisfiable,
}

/// What to do with the origin's answer once the transport call returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Store the response when storable and return it as a miss
    Store,
    /// Serve the stale entry in place of the origin's answer
    ServeStale,
    /// Return the transport error to the caller
    Propagate,
    /// A 304 confirmed the entry: merge it and serve as validated
    Refresh,
    /// A 304 that cannot be applied to the entry: fetch unconditionally
    Refetch,
}

/// Writes needed to store one origin response
pub(crate) struct StorePlan {
    /// Variant entry to put before the root is updated
    pub variant: Option<(CacheKey, CacheEntry)>,
    pub root_key: CacheKey,
    pub root_update: AsyncCasOperation,
    pub displaced: Displaced,
}

/// Variants listed by the root entry a store replaced
#[derive(Clone, Default)]
pub(crate) struct Displaced(Arc<Mutex<BTreeSet<VariantKey>>>);

impl Displaced {
    fn record(&self, variants: BTreeSet<VariantKey>) {
        if let Ok(mut previous) = self.0.lock() {
            *previous = variants;
        }
    }

    /// Variant keys orphaned once the root update committed
    pub fn keys(&self, root_key: &CacheKey) -> Vec<CacheKey> {
        self.0
            .lock()
            .map(|variants| {
                variants
                    .iter()
                    .map(|variant| root_key.with_variant(variant.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub(crate) struct ExecCore {
    pub config: CacheConfig,
    request_policy: RequestCacheabilityPolicy,
    response_policy: ResponseCacheabilityPolicy,
    validity: CacheValidityPolicy,
    clock: Arc<dyn Clock>,
    stats: Arc<CacheStats>,
}

impl ExecCore {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            request_policy: RequestCacheabilityPolicy::new(),
            response_policy: ResponseCacheabilityPolicy::new(&config),
            validity: CacheValidityPolicy::new(&config),
            config,
            clock,
            stats: Arc::new(CacheStats::new()),
        }
    }

    #[inline]
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn transition(&self, state: CacheState, request: &HttpRequest) {
        tracing::trace!(
            target: "quyc_cache::exec",
            state = ?state,
            method = %request.method(),
            uri = %request.uri(),
            "Cache state transition"
        );
    }

    pub fn route(&self, request: &HttpRequest) -> Route {
        self.transition(CacheState::CheckRequestCacheable, request);

        let Some(url) = normalize_uri(request.uri()) else {
            return Route::Passthrough;
        };
        if !is_safe_method(request.method()) {
            return Route::Invalidate;
        }
        if !self.request_policy.is_servable(request) {
            return Route::Passthrough;
        }

        let key = CacheKey::root(&url);
        if is_conditional(request) {
            Route::Forward(key)
        } else {
            Route::Lookup(key)
        }
    }

    /// Variant of `root_key` selected by `request`, when the root carries `Vary`
    pub fn variant_key(
        &self,
        root_key: &CacheKey,
        root: &CacheEntry,
        request: &HttpRequest,
    ) -> Option<CacheKey> {
        if !root.has_variants() {
            return None;
        }
        let names = root.vary_names();
        let variant = VariantKey::from_request(names.iter().map(String::as_str), request.headers());
        Some(root_key.with_variant(variant))
    }

    /// Entries failing structural validation are treated as absent
    pub fn usable(&self, key: &CacheKey, entry: Arc<CacheEntry>) -> Option<Arc<CacheEntry>> {
        match entry.validate() {
            Ok(()) => Some(entry),
            Err(err) => {
                tracing::debug!(
                    target: "quyc_cache::exec",
                    key = %key,
                    error = %err,
                    "Ignoring malformed cache entry"
                );
                None
            }
        }
    }

    pub fn decide(&self, entry: &CacheEntry, request_cc: &CacheControl, now: SystemTime) -> Decision {
        if self.validity.is_fresh_for_request(entry, request_cc, now) {
            return Decision::Serve {
                stale: !self.validity.is_fresh(entry, now),
            };
        }
        if request_cc.only_if_cached() {
            return Decision::Unsatisfiable;
        }
        if entry.can_validate() {
            Decision::Revalidate
        } else {
            Decision::Refetch
        }
    }

    pub fn may_serve_stale(
        &self,
        entry: &CacheEntry,
        request_cc: &CacheControl,
        now: SystemTime,
    ) -> bool {
        self.validity.may_serve_stale_if_error(entry, request_cc, now)
    }

    /// Response synthesized from storage with a computed `Age`
    pub fn hit_response(&self, entry: &CacheEntry, now: SystemTime, stale: bool) -> HttpResponse {
        let mut response = entry.to_response();
        let age = self.validity.current_age(entry, now);
        response
            .headers_mut()
            .insert(AGE, CacheValidityPolicy::age_header_value(age));
        if stale {
            response.headers_mut().append(WARNING, WARNING_STALE);
        }
        response
    }

    /// Stale entry standing in for a failed origin
    pub fn stale_response(&self, entry: &CacheEntry, now: SystemTime) -> HttpResponse {
        let mut response = self.hit_response(entry, now, true);
        response
            .headers_mut()
            .append(WARNING, WARNING_REVALIDATION_FAILED);
        response
    }

    /// `504` for `only-if-cached` requests that storage cannot satisfy
    pub fn gateway_timeout(&self) -> HttpResponse {
        let mut response = http::Response::new(Bytes::new());
        *response.status_mut() = StatusCode::GATEWAY_TIMEOUT;
        response
    }

    /// Copy of `request` carrying the entry's validators
    pub fn conditional_request(&self, request: &HttpRequest, entry: &CacheEntry) -> HttpRequest {
        let mut conditional = clone_request(request);
        let headers = conditional.headers_mut();
        if let Some(etag) = entry.etag() {
            headers.insert(IF_NONE_MATCH, etag.clone());
        }
        if let Some(last_modified) = entry.last_modified_value() {
            headers.insert(IF_MODIFIED_SINCE, last_modified.clone());
        }
        conditional
    }

    /// Outcome of an unconditional fetch; `reply` is `None` when the
    /// transport failed. `stale` is the entry that may stand in for it.
    pub fn fetch_outcome(
        &self,
        stale: Option<&CacheEntry>,
        request_cc: &CacheControl,
        reply: Option<&HttpResponse>,
        now: SystemTime,
    ) -> Outcome {
        let stale_allowed = stale.is_some_and(|entry| self.may_serve_stale(entry, request_cc, now));
        match reply {
            None if stale_allowed => Outcome::ServeStale,
            None => Outcome::Propagate,
            Some(response) if response.status().is_server_error() && stale_allowed => {
                Outcome::ServeStale
            }
            Some(_) => Outcome::Store,
        }
    }

    /// Outcome of a conditional request issued for `entry`
    pub fn revalidation_outcome(
        &self,
        entry: &CacheEntry,
        request_cc: &CacheControl,
        reply: Option<&HttpResponse>,
        now: SystemTime,
    ) -> Outcome {
        let Some(response) = reply else {
            return self.fetch_outcome(Some(entry), request_cc, None, now);
        };
        if response.status() != StatusCode::NOT_MODIFIED {
            return self.fetch_outcome(Some(entry), request_cc, reply, now);
        }
        if !self.validator_matches(entry, response) {
            tracing::debug!(target: "quyc_cache::exec", uri = %entry.request_uri, "304 does not match stored validator, fetching unconditionally");
            return Outcome::Refetch;
        }
        if entry.is_predated_by(response) {
            tracing::debug!(target: "quyc_cache::exec", uri = %entry.request_uri, "304 older than stored response, fetching unconditionally");
            return Outcome::Refetch;
        }
        Outcome::Refresh
    }

    /// A 304 naming a different entity tag does not validate the entry
    pub fn validator_matches(&self, entry: &CacheEntry, not_modified: &HttpResponse) -> bool {
        match (entry.etag(), not_modified.headers().get(ETAG)) {
            (Some(stored), Some(received)) => weak_eq(stored, received),
            (None, Some(_)) => false,
            _ => true,
        }
    }

    /// CAS transform merging a 304 into whatever entry is current.
    /// An entry removed in the meantime stays removed.
    pub fn refresh_operation(
        &self,
        not_modified: &HttpResponse,
        request_date: SystemTime,
        response_date: SystemTime,
        entry_date: SystemTime,
    ) -> AsyncCasOperation {
        let mut template = http::Response::new(Bytes::new());
        *template.status_mut() = StatusCode::NOT_MODIFIED;
        *template.headers_mut() = not_modified.headers().clone();

        Box::new(move |current: Option<&CacheEntry>| {
            current.map(|entry| {
                entry.update_from_not_modified(&template, request_date, response_date, entry_date)
            })
        })
    }

    /// Writes for storing `response`, or `None` if it may not be stored
    pub fn plan_store(
        &self,
        root_key: &CacheKey,
        request: &HttpRequest,
        response: &HttpResponse,
        request_date: SystemTime,
        response_date: SystemTime,
    ) -> Option<StorePlan> {
        if !self.response_policy.is_storable(request, response) {
            return None;
        }
        self.transition(CacheState::Store, request);

        let entry_date = self.now();
        let names = vary_names(response.headers());
        let displaced = Displaced::default();

        if names.is_empty() {
            let entry =
                CacheEntry::from_response(root_key, response, request_date, response_date, entry_date);
            let sink = displaced.clone();
            let root_update: AsyncCasOperation = Box::new(move |current: Option<&CacheEntry>| {
                sink.record(current.map(|c| c.variants.clone()).unwrap_or_default());
                Some(entry.clone())
            });
            return Some(StorePlan {
                variant: None,
                root_key: root_key.clone(),
                root_update,
                displaced,
            });
        }

        let variant = VariantKey::from_request(names.iter().map(String::as_str), request.headers());
        let variant_key = root_key.with_variant(variant.clone());
        let entry =
            CacheEntry::from_response(&variant_key, response, request_date, response_date, entry_date);
        let template = entry.clone();
        let root_update: AsyncCasOperation = Box::new(move |current: Option<&CacheEntry>| {
            let mut variants = current
                .filter(|c| c.has_variants())
                .map(|c| c.variants.clone())
                .unwrap_or_default();
            variants.insert(variant.clone());
            Some(template.as_root(variants))
        });

        Some(StorePlan {
            variant: Some((variant_key, entry)),
            root_key: root_key.clone(),
            root_update,
            displaced,
        })
    }

    /// Degraded storage path: log and count, never fail the request
    pub fn storage_failed(&self, key: &CacheKey, operation: &'static str, err: &Error) {
        self.stats.record_storage_failure();
        tracing::warn!(
            target: "quyc_cache::exec",
            key = %key,
            operation,
            error = %err,
            "Cache storage failure, continuing without cache"
        );
    }

    /// Stamp the outcome on `response` and count it
    pub fn finish(&self, mut response: HttpResponse, status: CacheStatus) -> HttpResponse {
        match status {
            CacheStatus::Passthrough => self.stats.record_passthrough(),
            CacheStatus::Hit => self.stats.record_hit(),
            CacheStatus::Miss | CacheStatus::Failure => self.stats.record_miss(),
            CacheStatus::Validated => self.stats.record_validation(),
            CacheStatus::StaleServed => self.stats.record_stale_served(),
        }
        tracing::debug!(
            target: "quyc_cache::exec",
            state = ?CacheState::Respond,
            cache_status = %status,
            status = response.status().as_u16(),
            "Responding"
        );
        response.extensions_mut().insert(status);
        response
    }
}

fn is_conditional(request: &HttpRequest) -> bool {
    let headers = request.headers();
    headers.contains_key(IF_NONE_MATCH) || headers.contains_key(IF_MODIFIED_SINCE)
}

/// Weak comparison (RFC 7232 §2.3.2): opaque tags match ignoring `W/`
fn weak_eq(a: &HeaderValue, b: &HeaderValue) -> bool {
    fn opaque(value: &HeaderValue) -> &[u8] {
        let bytes = value.as_bytes();
        bytes.strip_prefix(b"W/").unwrap_or(bytes)
    }
    opaque(a) == opaque(b)
}

/// Copy of a request's method, URI, version, headers and body
pub(crate) fn clone_request(request: &HttpRequest) -> HttpRequest {
    let mut cloned = http::Request::new(request.body().clone());
    *cloned.method_mut() = request.method().clone();
    *cloned.uri_mut() = request.uri().clone();
    *cloned.version_mut() = request.version();
    *cloned.headers_mut() = request.headers().clone();
    cloned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use http::{Method, header::CACHE_CONTROL};
    use std::time::{Duration, UNIX_EPOCH};
    use url::Url;

    fn core() -> ExecCore {
        let clock = Arc::new(ManualClock::new(UNIX_EPOCH + Duration::from_secs(1_000)));
        ExecCore::new(CacheConfig::default(), clock)
    }

    fn get(headers: &[(&str, &str)]) -> HttpRequest {
        let mut builder = http::Request::get("https://example.com/doc");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    fn stored(headers: &[(&str, &str)]) -> CacheEntry {
        let key = CacheKey::root(&Url::parse("https://example.com/doc").unwrap());
        let mut builder = http::Response::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let response = builder.body(Bytes::from_static(b"body")).unwrap();
        let at = UNIX_EPOCH + Duration::from_secs(1_000);
        CacheEntry::from_response(&key, &response, at, at, at)
    }

    #[test]
    fn routes_by_method_and_conditionality() {
        let core = core();
        assert!(matches!(core.route(&get(&[])), Route::Lookup(_)));
        assert!(matches!(
            core.route(&get(&[("if-none-match", "\"v1\"")])),
            Route::Forward(_)
        ));
        assert!(matches!(
            core.route(&get(&[("cache-control", "no-cache")])),
            Route::Passthrough
        ));

        let post = http::Request::builder()
            .method(Method::POST)
            .uri("https://example.com/doc")
            .body(Bytes::new())
            .unwrap();
        assert!(matches!(core.route(&post), Route::Invalidate));

        let relative = http::Request::get("/doc").body(Bytes::new()).unwrap();
        assert!(matches!(core.route(&relative), Route::Passthrough));
    }

    #[test]
    fn stale_entry_without_validators_is_refetched() {
        let core = core();
        let now = UNIX_EPOCH + Duration::from_secs(2_000);
        let cc = CacheControl::default();

        let plain = stored(&[("cache-control", "max-age=10")]);
        assert_eq!(core.decide(&plain, &cc, now), Decision::Refetch);

        let tagged = stored(&[("cache-control", "max-age=10"), ("etag", "\"v1\"")]);
        assert_eq!(core.decide(&tagged, &cc, now), Decision::Revalidate);

        let only_cached = CacheControl::parse(get(&[("cache-control", "only-if-cached")]).headers());
        assert_eq!(core.decide(&tagged, &only_cached, now), Decision::Unsatisfiable);

        let max_stale = CacheControl::parse(get(&[("cache-control", "max-stale")]).headers());
        assert_eq!(core.decide(&tagged, &max_stale, now), Decision::Serve { stale: true });
    }

    #[test]
    fn conditional_request_carries_validators() {
        let core = core();
        let entry = stored(&[
            ("etag", "\"v1\""),
            ("last-modified", "Sun, 06 Nov 1994 08:49:37 GMT"),
        ]);
        let conditional = core.conditional_request(&get(&[("accept", "text/html")]), &entry);
        assert_eq!(conditional.headers()[IF_NONE_MATCH], "\"v1\"");
        assert_eq!(
            conditional.headers()[IF_MODIFIED_SINCE],
            "Sun, 06 Nov 1994 08:49:37 GMT"
        );
        assert_eq!(conditional.headers()["accept"], "text/html");
    }

    #[test]
    fn weak_validators_match_strong_ones() {
        let core = core();
        let entry = stored(&[("etag", "W/\"v1\"")]);
        let ok = http::Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(ETAG, "\"v1\"")
            .body(Bytes::new())
            .unwrap();
        let other = http::Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(ETAG, "\"v2\"")
            .body(Bytes::new())
            .unwrap();
        assert!(core.validator_matches(&entry, &ok));
        assert!(!core.validator_matches(&entry, &other));
    }

    fn reply(status: StatusCode, headers: &[(&str, &str)]) -> HttpResponse {
        let mut builder = http::Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[test]
    fn fetch_outcomes_follow_stale_permission() {
        let core = core();
        let now = UNIX_EPOCH + Duration::from_secs(1_060);
        let cc = CacheControl::default();
        let tolerant = stored(&[("cache-control", "max-age=1, stale-if-error=600")]);
        let strict = stored(&[("cache-control", "max-age=1")]);
        let unavailable = reply(StatusCode::SERVICE_UNAVAILABLE, &[]);
        let fine = reply(StatusCode::OK, &[]);

        assert_eq!(core.fetch_outcome(Some(&tolerant), &cc, None, now), Outcome::ServeStale);
        assert_eq!(core.fetch_outcome(Some(&strict), &cc, None, now), Outcome::Propagate);
        assert_eq!(core.fetch_outcome(None, &cc, None, now), Outcome::Propagate);
        assert_eq!(
            core.fetch_outcome(Some(&tolerant), &cc, Some(&unavailable), now),
            Outcome::ServeStale
        );
        assert_eq!(core.fetch_outcome(Some(&strict), &cc, Some(&unavailable), now), Outcome::Store);
        assert_eq!(core.fetch_outcome(Some(&tolerant), &cc, Some(&fine), now), Outcome::Store);
    }

    #[test]
    fn revalidation_outcomes() {
        let core = core();
        let now = UNIX_EPOCH + Duration::from_secs(1_060);
        let cc = CacheControl::default();
        let entry = stored(&[
            ("cache-control", "max-age=10"),
            ("etag", "\"v1\""),
            ("date", "Thu, 01 Jan 1970 00:16:40 GMT"),
        ]);

        let confirmed = reply(
            StatusCode::NOT_MODIFIED,
            &[("etag", "\"v1\""), ("date", "Thu, 01 Jan 1970 00:17:40 GMT")],
        );
        assert_eq!(core.revalidation_outcome(&entry, &cc, Some(&confirmed), now), Outcome::Refresh);

        let other_tag = reply(StatusCode::NOT_MODIFIED, &[("etag", "\"v2\"")]);
        assert_eq!(core.revalidation_outcome(&entry, &cc, Some(&other_tag), now), Outcome::Refetch);

        let out_of_order = reply(
            StatusCode::NOT_MODIFIED,
            &[("etag", "\"v1\""), ("date", "Thu, 01 Jan 1970 00:15:00 GMT")],
        );
        assert_eq!(
            core.revalidation_outcome(&entry, &cc, Some(&out_of_order), now),
            Outcome::Refetch
        );

        let replaced = reply(StatusCode::OK, &[("etag", "\"v2\"")]);
        assert_eq!(core.revalidation_outcome(&entry, &cc, Some(&replaced), now), Outcome::Store);
        assert_eq!(core.revalidation_outcome(&entry, &cc, None, now), Outcome::Propagate);
    }

    #[test]
    fn stale_response_is_flagged() {
        let core = core();
        let entry = stored(&[(CACHE_CONTROL.as_str(), "max-age=1")]);
        let response = core.stale_response(&entry, UNIX_EPOCH + Duration::from_secs(1_060));
        let warnings: Vec<_> = response.headers().get_all(WARNING).iter().collect();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].as_bytes().starts_with(b"110"));
        assert!(warnings[1].as_bytes().starts_with(b"111"));
        assert_eq!(response.headers()[AGE], "60");
    }

    #[test]
    fn finish_stamps_status() {
        let core = core();
        let response = core.finish(core.gateway_timeout(), CacheStatus::Failure);
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(CacheStatus::of(&response), Some(CacheStatus::Failure));
        assert_eq!(core.stats().snapshot().misses, 1);
    }
}
