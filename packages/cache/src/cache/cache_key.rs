//! Cache key generation for HTTP responses
//!
//! `CacheKey` is derived from method + normalized URI. Responses carrying
//! `Vary` are additionally keyed by a `VariantKey`: the sorted
//! `(header-name, value)` pairs of the request headers the response varies on.

use std::fmt;

use http::{HeaderMap, Method, header::VARY};
use url::Url;

use crate::http::{HttpRequest, headers::header_elements, url::normalize_uri};

/// Sorted `(lower-case header name, normalized value)` pairs selecting a variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey(Vec<(String, String)>);

impl VariantKey {
    /// Build the variant key of `request_headers` for the given `Vary` names
    pub fn from_request<'a, I>(vary_names: I, request_headers: &HeaderMap) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut pairs: Vec<(String, String)> = vary_names
            .into_iter()
            .map(str::to_ascii_lowercase)
            .map(|name| {
                let value = header_elements(request_headers, name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                (name, value)
            })
            .collect();
        pairs.sort();
        pairs.dedup_by(|a, b| a.0 == b.0);
        Self(pairs)
    }

    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (name, value)) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("&")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str("}")
    }
}

/// Header names listed in a response's `Vary`, lower-cased
#[must_use]
pub fn vary_names(response_headers: &HeaderMap) -> Vec<String> {
    header_elements(response_headers, VARY)
        .map(str::to_ascii_lowercase)
        .collect()
}

/// `Vary: *` can never be matched by a finite variant key
#[must_use]
pub fn varies_on_everything(response_headers: &HeaderMap) -> bool {
    header_elements(response_headers, VARY).any(|name| name == "*")
}

/// Storage key: method, normalized URI and optional variant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    method: String,
    uri: String,
    variant: Option<VariantKey>,
}

impl CacheKey {
    /// Key for `method` on an already-normalized URI
    #[must_use]
    pub fn new(method: &Method, uri: &Url) -> Self {
        Self {
            method: method.as_str().to_string(),
            uri: uri.as_str().to_string(),
            variant: None,
        }
    }

    /// The GET key under which responses for `uri` are stored
    #[must_use]
    pub fn root(uri: &Url) -> Self {
        Self::new(&Method::GET, uri)
    }

    /// Root key for the resource a request targets, if its URI is absolute
    #[must_use]
    pub fn for_request(request: &HttpRequest) -> Option<Self> {
        normalize_uri(request.uri()).map(|uri| Self::root(&uri))
    }

    /// Same resource, specific variant
    #[must_use]
    pub fn with_variant(&self, variant: VariantKey) -> Self {
        Self {
            method: self.method.clone(),
            uri: self.uri.clone(),
            variant: Some(variant),
        }
    }

    /// Same resource without variant selection
    #[must_use]
    pub fn root_key(&self) -> Self {
        Self {
            method: self.method.clone(),
            uri: self.uri.clone(),
            variant: None,
        }
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn variant(&self) -> Option<&VariantKey> {
        self.variant.as_ref()
    }

    #[must_use]
    pub fn is_variant(&self) -> bool {
        self.variant.is_some()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.uri)?;
        if let Some(variant) = &self.variant {
            write!(f, " {variant}")?;
        }
        Ok(())
    }
}
