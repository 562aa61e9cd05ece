//! Metrics hooks for the decision cache.
//!
//! Implement `DecisionMetrics` to feed cache behaviour into your monitoring
//! system:
//!
//! ```ignore
//! use cmab_cache::observability::DecisionMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl DecisionMetrics for PrometheusMetrics {
//!     fn record_fetch(&self, _key: &str, _duration: Duration) {
//!         // histogram!("cmab_fetch_latency").record(duration);
//!     }
//!     // ... implement other methods
//! }
//!
//! // let service = CmabService::new(client)
//! //     .with_metrics(Box::new(PrometheusMetrics));
//! ```
//!
//! Unset, the service uses `NoOpMetrics`. Trait methods not overridden fall
//! back to logging through the `log` crate.

use std::time::Duration;

/// Trait for decision cache metrics collection.
pub trait DecisionMetrics: Send + Sync {
    /// A prior decision was reused.
    fn record_hit(&self, key: &str) {
        debug!("CMAB cache HIT: {}", key);
    }

    /// No reusable decision was found (absent, expired or attribute mismatch).
    fn record_miss(&self, key: &str) {
        debug!("CMAB cache MISS: {}", key);
    }

    /// A prediction was fetched, retries included.
    fn record_fetch(&self, key: &str, duration: Duration) {
        debug!("CMAB FETCH: {} took {:?}", key, duration);
    }

    /// A prediction fetch failed for good.
    fn record_error(&self, key: &str, error: &str) {
        warn!("CMAB ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl DecisionMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str) {}
    fn record_miss(&self, _key: &str) {}
    fn record_fetch(&self, _key: &str, _duration: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}
