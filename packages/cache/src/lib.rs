//! # Quyc HTTP Cache
//!
//! RFC 7234 response caching layer for HTTP clients. Sits between the caller
//! and a transport, answering requests from storage when it may and
//! revalidating or refetching when it must.
//!
//! ## Features
//!
//! - **Shared or private cache semantics** (`s-maxage`, `private`, `Authorization`)
//! - **Freshness and age** computed per RFC 7234 §4.2, with configurable heuristics
//! - **Conditional revalidation** with `ETag` / `Last-Modified` validators
//! - **`Vary` support** through composite variant keys
//! - **Lock-free storage updates** via compare-and-swap with bounded retries
//! - **Blocking and async execution** over the same decision core
//! - **`stale-if-error`** fallback when the origin fails
//! - **Invalidation** of stored entries by unsafe methods
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use quyc_cache::prelude::*;
//!
//! struct Origin;
//!
//! impl Transport for Origin {
//!     fn execute(&self, _target: &Target, _request: HttpRequest) -> quyc_cache::Result<HttpResponse> {
//!         Ok(http::Response::new(Bytes::from_static(b"hello")))
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let exec = CachingExec::builder(Origin)
//!         .config(CacheConfig::private())
//!         .build()?;
//!
//!     let request = http::Request::get("https://example.com/").body(Bytes::new())?;
//!     let response = exec.execute(request)?;
//!     println!("{:?}", CacheStatus::of(&response));
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod exec;
pub mod http;
pub mod transport;

pub mod prelude;

pub use crate::error::{Error, Result};
pub use crate::prelude::*;
