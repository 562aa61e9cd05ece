//! Construction-time configuration.
//!
//! Everything here is fixed once the service is built. Per-call behaviour is
//! steered with [`DecideOptions`](crate::options::DecideOptions) instead.
//!
//! ```
//! use cmab_cache::config::{CmabConfig, RetryPolicy};
//! use std::time::Duration;
//!
//! let config = CmabConfig::default()
//!     .with_cache_size(5_000)
//!     .with_cache_ttl(Duration::from_secs(600))
//!     .with_retry_policy(RetryPolicy::none());
//!
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{Error, Result};
use std::time::Duration;

pub const DEFAULT_CACHE_SIZE: usize = 10_000;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_PREDICTION_ENDPOINT: &str = "https://prediction.cmab.optimizely.com";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_LOCK_STRIPES: usize = 1000;

/// Exponential backoff schedule for prediction requests.
///
/// `max_retries` counts attempts after the first one; zero disables retrying.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn none() -> Self {
        RetryPolicy {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Wait before retry number `attempt + 1`.
    ///
    /// `min(initial_backoff * multiplier^attempt, max_backoff)`. A multiplier
    /// below 1.0 (or NaN) is treated as 1.0 so waits never shrink.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let multiplier = self.multiplier.max(1.0);
        let nanos = self.initial_backoff.as_nanos() as f64 * multiplier.powi(exponent);

        if !nanos.is_finite() || nanos >= self.max_backoff.as_nanos() as f64 {
            self.max_backoff
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }

    /// # Errors
    ///
    /// Returns `Error::ConfigError` for a multiplier below 1.0 or not finite,
    /// or a maximum backoff smaller than the initial one.
    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::ConfigError(format!(
                "Backoff multiplier must be finite and >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(Error::ConfigError(format!(
                "Max backoff {:?} is smaller than initial backoff {:?}",
                self.max_backoff, self.initial_backoff
            )));
        }
        Ok(())
    }
}

/// Configuration for the decision cache service and its default client.
#[derive(Clone, Debug)]
pub struct CmabConfig {
    /// Maximum cached decisions. Zero disables caching.
    pub cache_size: usize,

    /// Lifetime of a cached decision. Zero disables expiry.
    pub cache_ttl: Duration,

    /// Base URL of the prediction service; requests go to
    /// `<endpoint>/predict/<rule_id>`.
    pub prediction_endpoint: String,

    /// Bound on a single request attempt.
    pub request_timeout: Duration,

    pub retry_policy: RetryPolicy,

    /// Number of independent locks `(user, rule)` pairs are hashed onto.
    pub lock_stripes: usize,
}

impl Default for CmabConfig {
    fn default() -> Self {
        CmabConfig {
            cache_size: DEFAULT_CACHE_SIZE,
            cache_ttl: DEFAULT_CACHE_TTL,
            prediction_endpoint: DEFAULT_PREDICTION_ENDPOINT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_policy: RetryPolicy::default(),
            lock_stripes: DEFAULT_LOCK_STRIPES,
        }
    }
}

impl CmabConfig {
    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_prediction_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.prediction_endpoint = endpoint.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_lock_stripes(mut self, stripes: usize) -> Self {
        self.lock_stripes = stripes;
        self
    }

    /// # Errors
    ///
    /// Returns `Error::ConfigError` for zero lock stripes, an empty endpoint,
    /// a zero request timeout or an invalid retry policy.
    pub fn validate(&self) -> Result<()> {
        if self.lock_stripes == 0 {
            return Err(Error::ConfigError(
                "lock_stripes must be at least 1".to_string(),
            ));
        }
        if self.prediction_endpoint.trim().is_empty() {
            return Err(Error::ConfigError(
                "prediction_endpoint must not be empty".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::ConfigError(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        self.retry_policy.validate()
    }
}
