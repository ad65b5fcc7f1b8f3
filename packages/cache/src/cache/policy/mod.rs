//! HTTP caching policies
//!
//! - `request`: may a request be answered from cache at all
//! - `response`: may a response be stored
//! - `validity`: freshness lifetime, current age and revalidation decisions
//!
//! All policies are pure; rejections are booleans, never errors.

pub mod request;
pub mod response;
pub mod validity;

pub use request::RequestCacheabilityPolicy;
pub use response::ResponseCacheabilityPolicy;
pub use validity::CacheValidityPolicy;
