//! Caching orchestrator
//!
//! Every request runs through the same state machine:
//! `Start -> CheckRequestCacheable -> Lookup -> {HitFresh, HitStale, Miss}
//! -> [Revalidate] -> Store -> Respond`.
//!
//! The decisions live in a shared core; `CachingExec` drives it over a
//! blocking `Transport` and `CacheStorage`, `AsyncCachingExec` over an
//! `AsyncTransport` and `AsyncCacheStorage`. Both give identical results.

use std::fmt;

use crate::http::HttpResponse;

pub mod async_caching_exec;
pub mod builder;
pub mod caching_exec;
pub(crate) mod decision;

pub use async_caching_exec::AsyncCachingExec;
pub use builder::{AsyncCachingExecBuilder, CachingExecBuilder};
pub use caching_exec::CachingExec;

/// How a response was produced, attached to every orchestrated response as
/// an `http::Extensions` value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStatus {
    /// Request bypassed the cache entirely
    Passthrough,
    /// Served from storage without contacting the origin
    Hit,
    /// Fetched from the origin (and stored when permitted)
    Miss,
    /// Stored entry confirmed by a `304 Not Modified`
    Validated,
    /// Stale entry served because the origin failed
    StaleServed,
    /// The cache could not take part: storage was unavailable, or
    /// `only-if-cached` found nothing usable
    Failure,
}

impl CacheStatus {
    /// Status recorded on an orchestrated response
    #[must_use]
    pub fn of(response: &HttpResponse) -> Option<Self> {
        response.extensions().get::<Self>().copied()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Validated => "validated",
            Self::StaleServed => "stale",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States of the orchestration state machine, reported in trace logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Start,
    CheckRequestCacheable,
    Lookup,
    HitFresh,
    HitStale,
    Miss,
    Revalidate,
    Store,
    Respond,
}
