//! Header helpers over `http::HeaderMap`

use ::http::{HeaderMap, HeaderValue, header::AsHeaderName};

/// Iterate every comma-separated element across all instances of a header.
///
/// Non-UTF-8 values are skipped. Elements are trimmed; empty elements dropped.
pub fn header_elements<'a, K: AsHeaderName>(
    headers: &'a HeaderMap,
    name: K,
) -> impl Iterator<Item = &'a str> + 'a {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|element| !element.is_empty())
}

/// All instances of a header joined with `", "`, as a single string
#[must_use]
pub fn joined_value<K: AsHeaderName>(headers: &HeaderMap, name: K) -> Option<String> {
    let mut values = headers
        .get_all(name)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()).trim().to_string())
        .peekable();
    values.peek()?;
    Some(values.collect::<Vec<_>>().join(", "))
}

/// First instance of a header as `&str`
#[inline]
#[must_use]
pub fn first_str<K: AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Build a header value from a formatted string, dropping invalid bytes
#[inline]
#[must_use]
pub fn value_from_string(value: String) -> Option<HeaderValue> {
    HeaderValue::from_str(&value).ok()
}
