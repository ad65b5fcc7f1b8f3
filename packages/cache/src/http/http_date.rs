//! HTTP date parsing and formatting utilities
//!
//! Parses the three RFC 7231 §7.1.1.1 formats and formats IMF-fixdate.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ::http::{HeaderMap, header::AsHeaderName};
use chrono::{DateTime, NaiveDateTime, Utc};

/// HTTP date parsing error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpDateParseError {
    /// Date format was not recognized by any of the supported parsers
    #[error("Unrecognized HTTP date format: {0}")]
    UnrecognizedFormat(String),
    /// Date was parsed but represents a time before Unix epoch
    #[error("Invalid timestamp in HTTP date: {0}")]
    InvalidTimestamp(String),
}

/// Parse HTTP date string into `SystemTime`
///
/// # Errors
///
/// Returns `HttpDateParseError` when no supported format matches or the
/// date precedes the Unix epoch.
pub fn parse_http_date(date_str: &str) -> Result<SystemTime, HttpDateParseError> {
    let date_str = date_str.trim();

    // IMF-fixdate: "Sun, 06 Nov 1994 08:49:37 GMT"
    // RFC 850:     "Sunday, 06-Nov-94 08:49:37 GMT"
    // asctime:     "Sun Nov  6 08:49:37 1994"
    let parsed = NaiveDateTime::parse_from_str(date_str, "%a, %d %b %Y %H:%M:%S GMT")
        .or_else(|_| NaiveDateTime::parse_from_str(date_str, "%A, %d-%b-%y %H:%M:%S GMT"))
        .or_else(|_| NaiveDateTime::parse_from_str(date_str, "%a %b %e %H:%M:%S %Y"))
        .map(|naive| naive.and_utc().timestamp())
        .or_else(|_| DateTime::parse_from_rfc2822(date_str).map(|dt| dt.timestamp()));

    match parsed {
        Ok(timestamp) => u64::try_from(timestamp)
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
            .map_err(|_| HttpDateParseError::InvalidTimestamp(date_str.to_string())),
        Err(_) => Err(HttpDateParseError::UnrecognizedFormat(date_str.to_string())),
    }
}

/// Format `SystemTime` as HTTP date string in RFC 7231 IMF-fixdate format
#[must_use]
pub fn fmt_http_date(time: SystemTime) -> String {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let dt = i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_default();

    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse the first instance of a date-valued header
pub fn parse_date_header<K: AsHeaderName>(
    headers: &HeaderMap,
    name: K,
) -> Option<Result<SystemTime, HttpDateParseError>> {
    let value = headers.get(name)?;
    Some(match value.to_str() {
        Ok(text) => parse_http_date(text),
        Err(_) => Err(HttpDateParseError::UnrecognizedFormat(
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )),
    })
}
