//! Cache configuration and preset policies
//!
//! Provides `CacheConfig` for selecting shared or private cache semantics,
//! heuristic freshness, CAS contention limits and `stale-if-error` handling.

use std::time::Duration;

use serde::Deserialize;

pub mod validation;

pub use validation::{ConfigResult, ConfigValidator, ConfigurationError, Validator};

use validation::serde_duration;

/// Default upper bound for a cacheable response body (10MB)
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 10 * 1024 * 1024;

/// Cache configuration and limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Shared caches apply `s-maxage`, `private` and `Authorization` rules
    pub shared_cache: bool,
    /// Allow heuristic freshness for responses without explicit expiration
    pub heuristic_caching_enabled: bool,
    /// Fraction of `Date - Last-Modified` used as heuristic lifetime
    pub heuristic_coefficient: f64,
    /// Heuristic lifetime for responses without `Last-Modified`
    #[serde(with = "serde_duration::secs")]
    pub heuristic_default_lifetime: Duration,
    /// Retries after the first read-apply-commit attempt before an update
    /// reports contention (attempts = retries + 1). Applied to every storage
    /// the exec writes through, not only the default one.
    pub max_update_retries: u32,
    /// Honour `stale-if-error` on transport failures
    pub stale_if_error_enabled: bool,
    /// Largest response body that will be stored
    pub max_object_size_bytes: u64,
    /// End-to-end timeout for an orchestrated request (async execution)
    #[serde(rename = "request_timeout_ms", with = "serde_duration::opt_millis")]
    pub request_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shared_cache: true,
            heuristic_caching_enabled: true,
            heuristic_coefficient: 0.1,
            heuristic_default_lifetime: Duration::ZERO,
            max_update_retries: 5,
            stale_if_error_enabled: true,
            max_object_size_bytes: DEFAULT_MAX_OBJECT_SIZE,
            request_timeout: None,
        }
    }
}

impl CacheConfig {
    /// Configuration for a cache shared between users (proxy semantics)
    #[must_use]
    pub fn shared() -> Self {
        Self::default()
    }

    /// Configuration for a single-user cache inside one client
    #[must_use]
    pub fn private() -> Self {
        Self {
            shared_cache: false,
            ..Self::default()
        }
    }

    /// Load configuration from a JSON document; absent fields keep their defaults
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::Parse` for malformed JSON and any
    /// validation error for out-of-range values.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_shared_cache(mut self, shared: bool) -> Self {
        self.shared_cache = shared;
        self
    }

    #[must_use]
    pub fn with_heuristic_caching(mut self, enabled: bool) -> Self {
        self.heuristic_caching_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_heuristic_coefficient(mut self, coefficient: f64) -> Self {
        self.heuristic_coefficient = coefficient;
        self
    }

    #[must_use]
    pub fn with_heuristic_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.heuristic_default_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_max_update_retries(mut self, retries: u32) -> Self {
        self.max_update_retries = retries;
        self
    }

    #[must_use]
    pub fn with_stale_if_error(mut self, enabled: bool) -> Self {
        self.stale_if_error_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_max_object_size(mut self, bytes: u64) -> Self {
        self.max_object_size_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl Validator for CacheConfig {
    fn validate(&self) -> ConfigResult<()> {
        ConfigValidator::validate_range(
            self.heuristic_coefficient,
            0.0,
            1.0,
            "heuristic_coefficient",
        )?;
        ConfigValidator::validate_range(self.max_update_retries, 1, 1000, "max_update_retries")?;
        ConfigValidator::validate_range(
            self.max_object_size_bytes,
            1,
            u64::MAX,
            "max_object_size_bytes",
        )?;
        if let Some(timeout) = self.request_timeout {
            ConfigValidator::validate_timeout(timeout, "request_timeout")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.shared_cache);
        assert!((config.heuristic_coefficient - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn private_preset_relaxes_sharing() {
        assert!(!CacheConfig::private().shared_cache);
    }

    #[test]
    fn json_overrides_selected_fields() {
        let config = CacheConfig::from_json_str(
            r#"{"shared_cache": false, "heuristic_default_lifetime": 30, "request_timeout_ms": 2500}"#,
        )
        .unwrap();
        assert!(!config.shared_cache);
        assert_eq!(config.heuristic_default_lifetime, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.max_update_retries, 5);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(CacheConfig::default().with_heuristic_coefficient(1.5).validate().is_err());
        assert!(CacheConfig::default().with_heuristic_coefficient(f64::NAN).validate().is_err());
        assert!(CacheConfig::default()
            .with_heuristic_coefficient(f64::INFINITY)
            .validate()
            .is_err());
        assert!(CacheConfig::default().with_max_update_retries(0).validate().is_err());
        assert!(CacheConfig::default()
            .with_request_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(matches!(
            CacheConfig::from_json_str("{not json"),
            Err(ConfigurationError::Parse(_))
        ));
    }
}
