//! HTTP vocabulary consumed by the cache: request/response aliases,
//! `Cache-Control` directives, HTTP dates, URI normalization.

use bytes::Bytes;

pub mod directives;
pub mod headers;
pub mod http_date;
pub mod url;

pub use directives::{CacheControl, Directive};
pub use http_date::{HttpDateParseError, fmt_http_date, parse_http_date};

/// Request as handed to the cache and forwarded to the transport
pub type HttpRequest = ::http::Request<Bytes>;

/// Fully materialized response
pub type HttpResponse = ::http::Response<Bytes>;

/// Methods that never invalidate stored entries (RFC 7231 §4.2.1)
#[inline]
#[must_use]
pub fn is_safe_method(method: &::http::Method) -> bool {
    matches!(
        *method,
        ::http::Method::GET | ::http::Method::HEAD | ::http::Method::OPTIONS | ::http::Method::TRACE
    )
}
