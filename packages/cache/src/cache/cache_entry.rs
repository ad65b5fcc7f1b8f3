//! Cache entry storing an origin response with the timestamps needed for
//! age computation and the validators needed for revalidation.

use std::collections::BTreeSet;
use std::time::SystemTime;

use bytes::Bytes;
use http::{
    HeaderMap, HeaderValue, Method, StatusCode, Version,
    header::{
        AGE, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE, DATE, ETAG, LAST_MODIFIED,
        TRANSFER_ENCODING, VARY, WARNING,
    },
};

use super::cache_key::{CacheKey, VariantKey, vary_names};
use crate::error::{self, Result};
use crate::http::{CacheControl, HttpResponse, http_date::parse_date_header};

/// Headers describing the stored body; a 304 never replaces them
const BODY_HEADERS: [http::HeaderName; 4] =
    [CONTENT_LENGTH, CONTENT_ENCODING, TRANSFER_ENCODING, CONTENT_RANGE];

/// Cached response entry with metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub request_method: Method,
    /// Normalized request URI
    pub request_uri: String,
    /// Set on variant entries of responses carrying `Vary`
    pub variant_key: Option<VariantKey>,
    pub status: StatusCode,
    pub version: Version,
    /// Response headers, duplicates preserved
    pub headers: HeaderMap,
    /// Cached body; empty for bodiless responses
    pub body: Bytes,
    /// When the request that produced this response was sent
    pub request_date: SystemTime,
    /// When the origin response was received
    pub response_date: SystemTime,
    /// When the entry was written into storage
    pub entry_date: SystemTime,
    /// Known variants of this URI (root entries only)
    pub variants: BTreeSet<VariantKey>,
}

impl CacheEntry {
    /// Create new cache entry from an origin response
    #[must_use]
    pub fn from_response(
        key: &CacheKey,
        response: &HttpResponse,
        request_date: SystemTime,
        response_date: SystemTime,
        entry_date: SystemTime,
    ) -> Self {
        Self {
            request_method: Method::GET,
            request_uri: key.uri().to_string(),
            variant_key: key.variant().cloned(),
            status: response.status(),
            version: response.version(),
            headers: response.headers().clone(),
            body: response.body().clone(),
            request_date,
            response_date,
            entry_date,
            variants: BTreeSet::new(),
        }
    }

    /// Structural validation applied to every entry read from storage
    ///
    /// # Errors
    ///
    /// Returns a `MalformedEntry` error describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.request_uri.is_empty() {
            return Err(error::malformed_entry("entry has no request URI"));
        }
        if self.response_date < self.request_date {
            return Err(error::malformed_entry("response received before request was sent")
                .with_key(&self.request_uri));
        }
        if self.entry_date < self.request_date {
            return Err(error::malformed_entry("entry written before request was sent")
                .with_key(&self.request_uri));
        }
        if self.variant_key.is_some() && !self.headers.contains_key(VARY) {
            return Err(error::malformed_entry("variant entry without Vary header")
                .with_key(&self.request_uri));
        }
        Ok(())
    }

    /// Parsed `Cache-Control` of the stored response
    #[must_use]
    pub fn cache_control(&self) -> CacheControl {
        CacheControl::parse(&self.headers)
    }

    /// `Date` header, if present and valid
    #[must_use]
    pub fn date(&self) -> Option<SystemTime> {
        parse_date_header(&self.headers, DATE).and_then(std::result::Result::ok)
    }

    /// `Last-Modified` header, if present and valid
    #[must_use]
    pub fn last_modified(&self) -> Option<SystemTime> {
        parse_date_header(&self.headers, LAST_MODIFIED).and_then(std::result::Result::ok)
    }

    #[must_use]
    pub fn etag(&self) -> Option<&HeaderValue> {
        self.headers.get(ETAG)
    }

    #[must_use]
    pub fn last_modified_value(&self) -> Option<&HeaderValue> {
        self.headers.get(LAST_MODIFIED)
    }

    /// Check if entry can be validated with conditional request
    #[must_use]
    pub fn can_validate(&self) -> bool {
        self.etag().is_some() || self.last_modified_value().is_some()
    }

    /// Header names from the stored `Vary`, lower-cased
    #[must_use]
    pub fn vary_names(&self) -> Vec<String> {
        vary_names(&self.headers)
    }

    #[must_use]
    pub fn has_variants(&self) -> bool {
        self.headers.contains_key(VARY)
    }

    /// Size estimate used for storage accounting
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        let header_bytes: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum();
        (self.body.len() + header_bytes) as u64
    }

    /// Root entry for a URI: this response plus the known variant keys
    #[must_use]
    pub fn as_root(&self, variants: BTreeSet<VariantKey>) -> Self {
        Self {
            variant_key: None,
            variants,
            ..self.clone()
        }
    }

    /// The reply carries a `Date` older than the stored response's
    #[must_use]
    pub fn is_predated_by(&self, reply: &HttpResponse) -> bool {
        let reply_date = parse_date_header(reply.headers(), DATE).and_then(|d| d.ok());
        matches!((self.date(), reply_date), (Some(stored), Some(reply)) if reply < stored)
    }

    /// Refresh this entry from a `304 Not Modified` reply.
    ///
    /// Headers present on the 304 replace every stored instance of the same
    /// name, except headers describing the stored body. A 304 dated before the
    /// stored response is out of order and leaves the entry unchanged.
    #[must_use]
    pub fn update_from_not_modified(
        &self,
        not_modified: &HttpResponse,
        request_date: SystemTime,
        response_date: SystemTime,
        entry_date: SystemTime,
    ) -> Self {
        if self.is_predated_by(not_modified) {
            tracing::debug!(
                target: "quyc_cache::entry",
                uri = %self.request_uri,
                "Ignoring out-of-order 304 response"
            );
            return self.clone();
        }

        let mut headers = self.headers.clone();
        headers.remove(AGE);
        drop_stale_warnings(&mut headers);

        for name in not_modified.headers().keys() {
            if BODY_HEADERS.contains(name) {
                continue;
            }
            headers.remove(name);
            for value in not_modified.headers().get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        Self {
            headers,
            request_date,
            response_date,
            entry_date,
            ..self.clone()
        }
    }

    /// Materialize the stored response
    #[must_use]
    pub fn to_response(&self) -> HttpResponse {
        let mut response = http::Response::new(self.body.clone());
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers.clone();
        response
    }
}

/// 1xx warn-codes describe freshness and must go once the entry is revalidated
fn drop_stale_warnings(headers: &mut HeaderMap) {
    let kept: Vec<HeaderValue> = headers
        .get_all(WARNING)
        .iter()
        .filter(|value| !value.as_bytes().starts_with(b"1"))
        .cloned()
        .collect();
    headers.remove(WARNING);
    for value in kept {
        headers.append(WARNING, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use url::Url;

    fn t(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn key() -> CacheKey {
        CacheKey::root(&Url::parse("https://example.com/doc").unwrap())
    }

    fn stored() -> CacheEntry {
        let response = http::Response::builder()
            .status(StatusCode::OK)
            .header(DATE, "Sun, 06 Nov 1994 08:49:37 GMT")
            .header(ETAG, "\"v1\"")
            .header(CONTENT_LENGTH, "5")
            .header("x-trace", "a")
            .header("x-trace", "b")
            .header(AGE, "30")
            .header(WARNING, "110 - \"Response is Stale\"")
            .header(WARNING, "214 - \"Transformation Applied\"")
            .body(Bytes::from_static(b"hello"))
            .unwrap();
        CacheEntry::from_response(&key(), &response, t(100), t(101), t(101))
    }

    #[test]
    fn fresh_entry_validates() {
        assert!(stored().validate().is_ok());
        assert!(stored().can_validate());
    }

    #[test]
    fn inverted_timestamps_are_malformed() {
        let mut entry = stored();
        entry.response_date = t(50);
        assert!(entry.validate().unwrap_err().is_malformed_entry());
    }

    #[test]
    fn variant_without_vary_is_malformed() {
        let mut entry = stored();
        entry.variant_key = Some(VariantKey::default());
        assert!(entry.validate().is_err());
    }

    #[test]
    fn not_modified_replaces_matching_headers_and_keeps_body() {
        let not_modified = http::Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(DATE, "Sun, 06 Nov 1994 09:49:37 GMT")
            .header(ETAG, "\"v1\"")
            .header("x-trace", "c")
            .header(CONTENT_LENGTH, "0")
            .body(Bytes::new())
            .unwrap();
        let updated = stored().update_from_not_modified(&not_modified, t(200), t(201), t(201));

        assert_eq!(updated.body, Bytes::from_static(b"hello"));
        assert_eq!(updated.status, StatusCode::OK);
        assert_eq!(updated.headers.get(CONTENT_LENGTH).unwrap(), "5");
        let traces: Vec<_> = updated.headers.get_all("x-trace").iter().collect();
        assert_eq!(traces, vec!["c"]);
        assert!(updated.headers.get(AGE).is_none());
        let warnings: Vec<_> = updated.headers.get_all(WARNING).iter().collect();
        assert_eq!(warnings, vec!["214 - \"Transformation Applied\""]);
        assert_eq!(updated.response_date, t(201));
        assert_eq!(updated.request_date, t(200));
    }

    #[test]
    fn out_of_order_not_modified_is_ignored() {
        let not_modified = http::Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(DATE, "Sat, 05 Nov 1994 08:49:37 GMT")
            .header("x-trace", "old")
            .body(Bytes::new())
            .unwrap();
        let original = stored();
        let updated = original.update_from_not_modified(&not_modified, t(200), t(201), t(201));
        assert_eq!(updated.response_date, original.response_date);
        assert_eq!(updated.headers.get_all("x-trace").iter().count(), 2);
    }

    #[test]
    fn to_response_round_trips_status_and_body() {
        let response = stored().to_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"hello");
    }
}
