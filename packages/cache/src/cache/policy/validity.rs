//! Freshness lifetime, current age and revalidation decisions (RFC 7234 §4.2).
//!
//! Every function is pure over a `CacheEntry` and the supplied `now`.

use std::time::{Duration, SystemTime};

use http::{
    HeaderValue,
    header::{AGE, EXPIRES},
};

use crate::cache::cache_entry::CacheEntry;
use crate::config::CacheConfig;
use crate::http::{
    CacheControl,
    directives::{DELTA_SECONDS_MAX, parse_delta_seconds},
    headers::first_str,
    http_date::parse_date_header,
};

#[inline]
fn since(later: SystemTime, earlier: SystemTime) -> Duration {
    later.duration_since(earlier).unwrap_or(Duration::ZERO)
}

/// Freshness and age computations for stored entries
#[derive(Debug, Clone)]
pub struct CacheValidityPolicy {
    shared_cache: bool,
    heuristic_caching_enabled: bool,
    heuristic_coefficient: f64,
    heuristic_default_lifetime: Duration,
    stale_if_error_enabled: bool,
}

impl CacheValidityPolicy {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            shared_cache: config.shared_cache,
            heuristic_caching_enabled: config.heuristic_caching_enabled,
            heuristic_coefficient: if config.heuristic_coefficient.is_finite() {
                config.heuristic_coefficient.clamp(0.0, 1.0)
            } else {
                0.0
            },
            heuristic_default_lifetime: config.heuristic_default_lifetime,
            stale_if_error_enabled: config.stale_if_error_enabled,
        }
    }

    /// `Date` of the stored response, or the receipt time when it is missing
    fn date_value(entry: &CacheEntry) -> SystemTime {
        entry.date().unwrap_or(entry.response_date)
    }

    /// How long the entry stays fresh after it was generated.
    ///
    /// `s-maxage` (shared caches) beats `max-age`, which beats `Expires`.
    /// Without explicit freshness the heuristic applies; zero means stale
    /// immediately.
    #[must_use]
    pub fn freshness_lifetime(&self, entry: &CacheEntry) -> Duration {
        let cc = entry.cache_control();

        if self.shared_cache {
            if let Some(s_maxage) = cc.s_maxage() {
                return Duration::from_secs(s_maxage);
            }
        }

        if let Some(max_age) = cc.max_age() {
            return Duration::from_secs(max_age);
        }

        if let Some(expires) = parse_date_header(&entry.headers, EXPIRES) {
            // an unparseable Expires means "already expired"
            return expires.map_or(Duration::ZERO, |expires| {
                since(expires, Self::date_value(entry))
            });
        }

        self.heuristic_lifetime(entry)
    }

    /// Fraction of the time since `Last-Modified`, or the configured fallback
    #[must_use]
    pub fn heuristic_lifetime(&self, entry: &CacheEntry) -> Duration {
        if !self.heuristic_caching_enabled {
            return Duration::ZERO;
        }
        match entry.last_modified() {
            Some(last_modified) => {
                since(Self::date_value(entry), last_modified).mul_f64(self.heuristic_coefficient)
            }
            None => self.heuristic_default_lifetime,
        }
    }

    /// Current age per RFC 7234 §4.2.3; never negative.
    #[must_use]
    pub fn current_age(&self, entry: &CacheEntry, now: SystemTime) -> Duration {
        let apparent_age = since(entry.response_date, Self::date_value(entry));
        let age_value = first_str(&entry.headers, AGE)
            .and_then(parse_delta_seconds)
            .map_or(Duration::ZERO, Duration::from_secs);
        let response_delay = since(entry.response_date, entry.request_date);
        let corrected_age_value = age_value + response_delay;
        let corrected_initial_age = apparent_age.max(corrected_age_value);
        let resident_time = since(now, entry.entry_date);
        corrected_initial_age + resident_time
    }

    /// `currentAge < freshnessLifetime`
    #[must_use]
    pub fn is_fresh(&self, entry: &CacheEntry, now: SystemTime) -> bool {
        self.current_age(entry, now) < self.freshness_lifetime(entry)
    }

    /// How far past its freshness lifetime the entry is
    #[must_use]
    pub fn staleness(&self, entry: &CacheEntry, now: SystemTime) -> Duration {
        self.current_age(entry, now)
            .saturating_sub(self.freshness_lifetime(entry))
    }

    /// Directives on the stored response that forbid serving it stale
    #[must_use]
    pub fn revalidation_required(&self, entry: &CacheEntry) -> bool {
        let cc = entry.cache_control();
        cc.must_revalidate()
            || cc.no_cache()
            || (self.shared_cache && (cc.proxy_revalidate() || cc.s_maxage().is_some()))
    }

    /// Whether the entry may answer a request carrying `request_cc` without
    /// contacting the origin. `max-age`/`min-fresh` narrow the window,
    /// `max-stale` widens it.
    #[must_use]
    pub fn is_fresh_for_request(
        &self,
        entry: &CacheEntry,
        request_cc: &CacheControl,
        now: SystemTime,
    ) -> bool {
        if entry.cache_control().no_cache() {
            return false;
        }

        let age = self.current_age(entry, now);
        let lifetime = self.freshness_lifetime(entry);

        if let Some(max_age) = request_cc.max_age() {
            if age > Duration::from_secs(max_age) {
                return false;
            }
        }

        if let Some(min_fresh) = request_cc.min_fresh() {
            if lifetime.saturating_sub(age) < Duration::from_secs(min_fresh) {
                return false;
            }
        }

        if age < lifetime {
            return true;
        }

        match request_cc.max_stale() {
            Some(limit) if !self.revalidation_required(entry) => {
                let staleness = age - lifetime;
                limit.is_none_or(|secs| staleness <= Duration::from_secs(secs))
            }
            _ => false,
        }
    }

    /// True if the response carried `must-revalidate`, or the entry is stale
    /// and no `max-stale` on the request covers it.
    #[must_use]
    pub fn must_revalidate(
        &self,
        entry: &CacheEntry,
        request_cc: &CacheControl,
        now: SystemTime,
    ) -> bool {
        entry.cache_control().must_revalidate()
            || !self.is_fresh_for_request(entry, request_cc, now)
    }

    /// Whether a stale entry may stand in for a failed origin request
    #[must_use]
    pub fn may_serve_stale_if_error(
        &self,
        entry: &CacheEntry,
        request_cc: &CacheControl,
        now: SystemTime,
    ) -> bool {
        if !self.stale_if_error_enabled || self.revalidation_required(entry) {
            return false;
        }
        let staleness = self.staleness(entry, now);
        [entry.cache_control().stale_if_error(), request_cc.stale_if_error()]
            .into_iter()
            .flatten()
            .any(|limit| staleness <= Duration::from_secs(limit))
    }

    /// `Age` header value: whole seconds, capped at 2^31
    #[must_use]
    pub fn age_header_value(age: Duration) -> HeaderValue {
        HeaderValue::from(age.as_secs().min(DELTA_SECONDS_MAX))
    }
}
