//! URI normalization for cache keys and invalidation targets

use ::http::Uri;
use url::Url;

/// Normalize an absolute request URI.
///
/// Scheme and host are lowercased, the default port is dropped and an empty
/// path becomes `/`. Path and query keep their case and order. Returns `None`
/// for URIs without scheme or authority, which cannot be keyed.
#[inline]
#[must_use]
pub fn normalize_uri(uri: &Uri) -> Option<Url> {
    if uri.scheme().is_none() || uri.authority().is_none() {
        return None;
    }
    normalize_str(&uri.to_string())
}

/// Normalize an absolute URI given as a string
#[inline]
#[must_use]
pub fn normalize_str(uri: &str) -> Option<Url> {
    let mut url = Url::parse(uri).ok()?;
    if url.cannot_be_a_base() || url.host().is_none() {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Resolve a `Location`/`Content-Location` reference against the request URI
#[inline]
#[must_use]
pub fn resolve_reference(base: &Url, reference: &str) -> Option<Url> {
    let mut url = base.join(reference.trim()).ok()?;
    url.set_fragment(None);
    Some(url)
}

/// Scheme, host and port all match
#[inline]
#[must_use]
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_host_and_default_port_are_normalized() {
        let uri: Uri = "HTTP://Example.COM:80".parse().unwrap();
        let url = normalize_uri(&uri).unwrap();
        assert_eq!(url.as_str(), "http://example.com/");
    }

    #[test]
    fn path_and_query_stay_case_sensitive() {
        let uri: Uri = "https://example.com/Docs/Index?B=2&a=1".parse().unwrap();
        let url = normalize_uri(&uri).unwrap();
        assert_eq!(url.as_str(), "https://example.com/Docs/Index?B=2&a=1");
    }

    #[test]
    fn relative_uris_cannot_be_keyed() {
        let uri: Uri = "/only/a/path".parse().unwrap();
        assert!(normalize_uri(&uri).is_none());
    }

    #[test]
    fn references_resolve_relative_to_request() {
        let base = normalize_str("https://example.com/items/7").unwrap();
        let target = resolve_reference(&base, "../users/1#frag").unwrap();
        assert_eq!(target.as_str(), "https://example.com/users/1");
        assert!(same_origin(&base, &target));
        let other = resolve_reference(&base, "https://other.example.com/x").unwrap();
        assert!(!same_origin(&base, &other));
    }
}
