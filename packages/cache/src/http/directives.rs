//! `Cache-Control` directive parsing
//!
//! All header instances are treated as one concatenated element list.
//! Directive names match case-insensitively; quoted values may contain commas.

use ::http::{HeaderMap, header::CACHE_CONTROL};

pub const NO_STORE: &str = "no-store";
pub const NO_CACHE: &str = "no-cache";
pub const PRIVATE: &str = "private";
pub const PUBLIC: &str = "public";
pub const MUST_REVALIDATE: &str = "must-revalidate";
pub const PROXY_REVALIDATE: &str = "proxy-revalidate";
pub const MAX_AGE: &str = "max-age";
pub const S_MAXAGE: &str = "s-maxage";
pub const MAX_STALE: &str = "max-stale";
pub const MIN_FRESH: &str = "min-fresh";
pub const STALE_IF_ERROR: &str = "stale-if-error";
pub const ONLY_IF_CACHED: &str = "only-if-cached";

/// A single `name[=value]` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Lower-cased directive name
    pub name: String,
    /// Value with surrounding quotes removed
    pub value: Option<String>,
}

/// Parsed `Cache-Control` directives of a request or response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    directives: Vec<Directive>,
}

impl CacheControl {
    /// Parse every `Cache-Control` instance in `headers`
    #[must_use]
    pub fn parse(headers: &HeaderMap) -> Self {
        let mut directives = Vec::new();
        for value in headers.get_all(CACHE_CONTROL) {
            if let Ok(text) = value.to_str() {
                directives.extend(split_elements(text).filter_map(parse_directive));
            }
        }
        Self { directives }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter()
    }

    /// Directive present, with or without a value
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.directives.iter().any(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// `Some(value)` when the directive is present; the inner option is its value
    #[must_use]
    pub fn value(&self, name: &str) -> Option<Option<&str>> {
        self.directives
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .map(|d| d.value.as_deref())
    }

    /// Delta-seconds value of a directive; absent or unparseable yields `None`
    #[must_use]
    pub fn delta_seconds(&self, name: &str) -> Option<u64> {
        self.value(name).flatten().and_then(parse_delta_seconds)
    }

    pub fn no_store(&self) -> bool {
        self.has(NO_STORE)
    }

    pub fn no_cache(&self) -> bool {
        self.has(NO_CACHE)
    }

    pub fn private(&self) -> bool {
        self.has(PRIVATE)
    }

    pub fn public(&self) -> bool {
        self.has(PUBLIC)
    }

    pub fn must_revalidate(&self) -> bool {
        self.has(MUST_REVALIDATE)
    }

    pub fn proxy_revalidate(&self) -> bool {
        self.has(PROXY_REVALIDATE)
    }

    pub fn only_if_cached(&self) -> bool {
        self.has(ONLY_IF_CACHED)
    }

    /// `max-age`; a present but unparseable value counts as zero
    pub fn max_age(&self) -> Option<u64> {
        self.value(MAX_AGE)
            .map(|value| value.and_then(parse_delta_seconds).unwrap_or(0))
    }

    /// `s-maxage`; a present but unparseable value counts as zero
    pub fn s_maxage(&self) -> Option<u64> {
        self.value(S_MAXAGE)
            .map(|value| value.and_then(parse_delta_seconds).unwrap_or(0))
    }

    /// `Some(None)` for a bare `max-stale` (any staleness accepted)
    pub fn max_stale(&self) -> Option<Option<u64>> {
        self.value(MAX_STALE)
            .map(|value| value.and_then(parse_delta_seconds))
    }

    pub fn min_fresh(&self) -> Option<u64> {
        self.delta_seconds(MIN_FRESH)
    }

    pub fn stale_if_error(&self) -> Option<u64> {
        self.delta_seconds(STALE_IF_ERROR)
    }
}

/// Split on commas that are not inside a quoted string
fn split_elements(text: &str) -> impl Iterator<Item = &str> {
    let mut elements = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                elements.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    elements.push(&text[start..]);
    elements.into_iter().map(str::trim).filter(|e| !e.is_empty())
}

fn parse_directive(element: &str) -> Option<Directive> {
    let (name, value) = match element.split_once('=') {
        Some((name, value)) => {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            (name.trim(), Some(value.to_string()))
        }
        None => (element, None),
    };
    if name.is_empty() {
        return None;
    }
    Some(Directive {
        name: name.to_ascii_lowercase(),
        value,
    })
}

/// Delta-seconds per RFC 7234 §1.2.1; overflow saturates at 2^31
#[must_use]
pub fn parse_delta_seconds(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(value.parse::<u64>().map_or(DELTA_SECONDS_MAX, |v| v.min(DELTA_SECONDS_MAX)))
}

/// Largest delta-seconds value a cache must be able to represent
pub const DELTA_SECONDS_MAX: u64 = 1 << 31;
