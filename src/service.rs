//! Decision cache service.
//!
//! Entry point of the crate. For each request it narrows the user's
//! attributes to those the rule consumes, then, under the lock stripe owning
//! the `(user, rule)` pair, applies the caller's cache options, looks up a
//! prior decision, and only calls the prediction client when nothing
//! reusable is cached.
//!
//! # Concurrency
//!
//! Locks are striped: a fixed array of `tokio::sync::Mutex<()>` indexed by
//! `xxh32(user_id + rule_id) % stripes`. The stripe is held for the whole
//! operation, network call and retry backoff included, so:
//!
//! - concurrent calls for the same pair never issue more than one request;
//!   later callers find the first caller's decision in the cache
//! - pairs on different stripes run fully in parallel
//! - distinct pairs sharing a stripe are serialized

use crate::cache::BoundedCache;
use crate::client::CmabClient;
use crate::config::CmabConfig;
use crate::entity::{CacheEntry, Decision, DecisionResponse, UserContext};
use crate::error::Result;
use crate::key::{self, Attributes, CacheKeyBuilder};
use crate::observability::{DecisionMetrics, NoOpMetrics};
use crate::options::{DecideOption, DecideOptions};
use crate::project::ProjectConfig;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Decision cache service for CMAB rules.
///
/// Cheap to clone: clones share the cache, client, lock stripes and metrics.
///
/// # Example
///
/// ```ignore
/// use cmab_cache::{CmabService, DecideOptions};
/// use cmab_cache::client::{DefaultCmabClient, ReqwestTransport};
///
/// let service = CmabService::new(DefaultCmabClient::new(ReqwestTransport::new()));
///
/// let response = service
///     .get_decision(&project_config, &user, "exp_1", DecideOptions::empty())
///     .await?;
/// println!("variation {}", response.decision.variation_id);
/// ```
pub struct CmabService<C: CmabClient> {
    cache: Arc<BoundedCache<String, CacheEntry>>,
    client: Arc<C>,
    locks: Arc<[Mutex<()>]>,
    metrics: Arc<dyn DecisionMetrics>,
}

impl<C: CmabClient> Clone for CmabService<C> {
    fn clone(&self) -> Self {
        CmabService {
            cache: Arc::clone(&self.cache),
            client: Arc::clone(&self.client),
            locks: Arc::clone(&self.locks),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<C: CmabClient> CmabService<C> {
    /// Create a service with the default cache size, TTL and stripe count.
    pub fn new(client: C) -> Self {
        let config = CmabConfig::default();
        Self::with_parts(
            BoundedCache::new(config.cache_size, config.cache_ttl),
            client,
            config.lock_stripes,
        )
    }

    /// Create a service sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if `config` fails validation.
    pub fn with_config(client: C, config: &CmabConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_parts(
            BoundedCache::new(config.cache_size, config.cache_ttl),
            client,
            config.lock_stripes,
        ))
    }

    /// Create a service from an existing cache. `lock_stripes` is clamped to
    /// at least one.
    pub fn with_parts(
        cache: BoundedCache<String, CacheEntry>,
        client: C,
        lock_stripes: usize,
    ) -> Self {
        let locks: Arc<[Mutex<()>]> = (0..lock_stripes.max(1)).map(|_| Mutex::new(())).collect();

        CmabService {
            cache: Arc::new(cache),
            client: Arc::new(client),
            locks,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn DecisionMetrics>) -> Self {
        self.metrics = Arc::from(metrics);
        self
    }

    /// Return a decision for `user` under `rule_id`.
    ///
    /// Reuses the cached decision when the user's relevant attributes are
    /// unchanged, otherwise fetches a new one and caches it. `options` can
    /// bypass, reset or invalidate the cache first.
    ///
    /// # Errors
    ///
    /// Returns the client's error when a fetch fails. The cache is not
    /// written in that case.
    pub async fn get_decision<P>(
        &self,
        config: &P,
        user: &UserContext,
        rule_id: &str,
        options: DecideOptions,
    ) -> Result<DecisionResponse>
    where
        P: ProjectConfig + ?Sized,
    {
        let user_id = user.user_id.as_str();
        let attributes = config.filter_attributes(user, rule_id);
        let mut reasons = Vec::new();

        let _stripe = self.lock_for(user_id, rule_id).lock().await;

        let cache_key = CacheKeyBuilder::build(user_id, rule_id);

        if options.contains(DecideOption::IgnoreCmabCache) {
            note(
                &mut reasons,
                format!(
                    "Ignoring CMAB cache for user \"{}\" and rule \"{}\".",
                    user_id, rule_id
                ),
            );
            let decision = self
                .fetch(&cache_key, rule_id, user_id, &attributes)
                .await?;
            return Ok(DecisionResponse { decision, reasons });
        }

        if options.contains(DecideOption::ResetCmabCache) {
            self.cache.reset();
            note(&mut reasons, "Reset CMAB cache for all users.".to_string());
        }

        if options.contains(DecideOption::InvalidateUserCmabCache) {
            self.cache.remove(&cache_key);
            note(
                &mut reasons,
                format!(
                    "Invalidated CMAB cache for user \"{}\" and rule \"{}\".",
                    user_id, rule_id
                ),
            );
        }

        let attributes_hash = key::hash_attributes(&attributes);

        match self.cache.lookup(&cache_key) {
            Some(entry) if entry.attributes_hash == attributes_hash => {
                self.metrics.record_hit(&cache_key);
                note(
                    &mut reasons,
                    format!(
                        "CMAB cache hit for user \"{}\" and rule \"{}\".",
                        user_id, rule_id
                    ),
                );
                return Ok(DecisionResponse {
                    decision: entry.to_decision(),
                    reasons,
                });
            }
            Some(_) => {
                self.cache.remove(&cache_key);
                self.metrics.record_miss(&cache_key);
                note(
                    &mut reasons,
                    format!(
                        "CMAB cache attributes mismatch for user \"{}\" and rule \"{}\", fetching new decision.",
                        user_id, rule_id
                    ),
                );
            }
            None => {
                self.metrics.record_miss(&cache_key);
                note(
                    &mut reasons,
                    format!(
                        "CMAB cache miss for user \"{}\" and rule \"{}\".",
                        user_id, rule_id
                    ),
                );
            }
        }

        let decision = self
            .fetch(&cache_key, rule_id, user_id, &attributes)
            .await?;
        self.cache
            .save(cache_key, CacheEntry::new(attributes_hash, &decision));
        note(
            &mut reasons,
            format!(
                "Fetched CMAB decision for user \"{}\" and rule \"{}\": variation \"{}\".",
                user_id, rule_id, decision.variation_id
            ),
        );

        Ok(DecisionResponse { decision, reasons })
    }

    /// Ask the client for a new decision under a fresh request UUID.
    async fn fetch(
        &self,
        cache_key: &str,
        rule_id: &str,
        user_id: &str,
        attributes: &Attributes,
    ) -> Result<Decision> {
        let cmab_uuid = Uuid::new_v4().to_string();
        let timer = Instant::now();

        match self
            .client
            .fetch_decision(rule_id, user_id, attributes, &cmab_uuid)
            .await
        {
            Ok(variation_id) => {
                self.metrics.record_fetch(cache_key, timer.elapsed());
                Ok(Decision {
                    variation_id,
                    cmab_uuid,
                })
            }
            Err(e) => {
                self.metrics.record_error(cache_key, &e.to_string());
                error!(
                    "Failed to fetch CMAB decision for user \"{}\" and rule \"{}\": {}",
                    user_id, rule_id, e
                );
                Err(e)
            }
        }
    }

    fn lock_for(&self, user_id: &str, rule_id: &str) -> &Mutex<()> {
        &self.locks[self.lock_index(user_id, rule_id)]
    }

    /// Stripe guarding `(user_id, rule_id)`.
    pub fn lock_index(&self, user_id: &str, rule_id: &str) -> usize {
        key::stripe_index(user_id, rule_id, self.locks.len())
    }

    pub fn lock_stripes(&self) -> usize {
        self.locks.len()
    }

    /// Get a reference to the underlying cache.
    pub fn cache(&self) -> &BoundedCache<String, CacheEntry> {
        &self.cache
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

fn note(reasons: &mut Vec<String>, reason: String) {
    debug!("{}", reason);
    reasons.push(reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::project::StaticProjectConfig;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Client counting calls, answering `var_<n>` after an optional delay.
    #[derive(Default)]
    struct CountingClient {
        calls: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
        seen: SyncMutex<Vec<Attributes>>,
    }

    impl CountingClient {
        fn slow(delay: Duration) -> Self {
            CountingClient {
                delay: Some(delay),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CmabClient for CountingClient {
        async fn fetch_decision(
            &self,
            _rule_id: &str,
            _user_id: &str,
            attributes: &Attributes,
            _cmab_uuid: &str,
        ) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen.lock().push(attributes.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(Error::FetchError("HTTP 503".to_string()));
            }
            Ok(format!("var_{}", n))
        }
    }

    /// Metrics counting each hook through a shared handle.
    #[derive(Default)]
    struct Counters {
        hits: AtomicUsize,
        misses: AtomicUsize,
        fetches: AtomicUsize,
        errors: AtomicUsize,
    }

    struct CountingMetrics(Arc<Counters>);

    impl DecisionMetrics for CountingMetrics {
        fn record_hit(&self, _key: &str) {
            self.0.hits.fetch_add(1, Ordering::SeqCst);
        }
        fn record_miss(&self, _key: &str) {
            self.0.misses.fetch_add(1, Ordering::SeqCst);
        }
        fn record_fetch(&self, _key: &str, _duration: Duration) {
            self.0.fetches.fetch_add(1, Ordering::SeqCst);
        }
        fn record_error(&self, _key: &str, error: &str) {
            assert!(error.contains("HTTP 503"));
            self.0.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Counters {
        fn snapshot(&self) -> (usize, usize, usize, usize) {
            (
                self.hits.load(Ordering::SeqCst),
                self.misses.load(Ordering::SeqCst),
                self.fetches.load(Ordering::SeqCst),
                self.errors.load(Ordering::SeqCst),
            )
        }
    }

    fn project() -> StaticProjectConfig {
        StaticProjectConfig::new()
            .with_attribute("1", "age")
            .with_attribute("2", "country")
            .with_cmab_experiment("exp1", ["1", "2"])
    }

    fn service(client: CountingClient) -> CmabService<CountingClient> {
        CmabService::with_parts(BoundedCache::new(100, Duration::ZERO), client, 1000)
    }

    #[tokio::test]
    async fn test_second_call_hits_cache() {
        let service = service(CountingClient::default());
        let user = UserContext::new("user123").with_attribute("age", 25);

        let first = service
            .get_decision(&project(), &user, "exp1", DecideOptions::empty())
            .await
            .expect("First decision failed");
        let second = service
            .get_decision(&project(), &user, "exp1", DecideOptions::empty())
            .await
            .expect("Second decision failed");

        assert_eq!(first.decision, second.decision);
        assert_eq!(service.client().calls(), 1);
        assert!(first.reasons.iter().any(|r| r.contains("cache miss")));
        assert!(second.reasons.iter().any(|r| r.contains("cache hit")));
    }

    #[tokio::test]
    async fn test_cache_entry_written_under_key() {
        let service = service(CountingClient::default());
        let user = UserContext::new("user123").with_attribute("age", 25);

        let response = service
            .get_decision(&project(), &user, "exp1", DecideOptions::empty())
            .await
            .expect("Decision failed");

        let entry = service
            .cache()
            .peek("7-user123-exp1")
            .expect("Entry should be cached");
        assert_eq!(entry.to_decision(), response.decision);
        assert_eq!(entry.cmab_uuid.len(), 36);
    }

    #[tokio::test]
    async fn test_irrelevant_attributes_do_not_invalidate() {
        let service = service(CountingClient::default());
        let user = UserContext::new("user").with_attribute("age", 25);
        let same_but_noisy = user.clone().with_attribute("session_id", "abc");

        service
            .get_decision(&project(), &user, "exp1", DecideOptions::empty())
            .await
            .expect("Decision failed");
        service
            .get_decision(&project(), &same_but_noisy, "exp1", DecideOptions::empty())
            .await
            .expect("Decision failed");

        assert_eq!(service.client().calls(), 1);
        let seen = service.client().seen.lock();
        assert!(!seen[0].contains_key("session_id"));
    }

    #[tokio::test]
    async fn test_failed_fetch_writes_nothing() {
        let client = CountingClient {
            fail: true,
            ..Default::default()
        };
        let service = service(client);
        let user = UserContext::new("user");

        let result = service
            .get_decision(&project(), &user, "exp1", DecideOptions::empty())
            .await;

        assert!(matches!(result, Err(Error::FetchError(_))));
        assert!(service.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_pair_coalesces_to_one_fetch() {
        let service = service(CountingClient::slow(Duration::from_millis(50)));
        let user = UserContext::new("user").with_attribute("age", 30);
        let config = project();

        let calls = (0..10).map(|_| {
            service.get_decision(&config, &user, "exp1", DecideOptions::empty())
        });
        let responses = futures::future::join_all(calls).await;

        assert_eq!(service.client().calls(), 1);
        let decisions: Vec<Decision> = responses
            .into_iter()
            .map(|r| r.expect("Decision failed").decision)
            .collect();
        assert!(decisions.iter().all(|d| *d == decisions[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_stripes_run_in_parallel() {
        let service = service(CountingClient::slow(Duration::from_millis(200)));
        let config = project();

        let first = UserContext::new("user_0");
        let second = (1..)
            .map(|i| UserContext::new(format!("user_{}", i)))
            .find(|u| service.lock_index(&u.user_id, "exp1") != service.lock_index("user_0", "exp1"))
            .expect("Some user maps to another stripe");

        let start = tokio::time::Instant::now();
        let (a, b) = tokio::join!(
            service.get_decision(&config, &first, "exp1", DecideOptions::empty()),
            service.get_decision(&config, &second, "exp1", DecideOptions::empty()),
        );
        a.expect("Decision failed");
        b.expect("Decision failed");

        assert_eq!(service.client().calls(), 2);
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_stripe_serializes_distinct_pairs() {
        let service = CmabService::with_parts(
            BoundedCache::new(100, Duration::ZERO),
            CountingClient::slow(Duration::from_millis(200)),
            1,
        );
        let config = project();

        let (user_a, user_b) = (UserContext::new("a"), UserContext::new("b"));

        let start = tokio::time::Instant::now();
        let (a, b) = tokio::join!(
            service.get_decision(&config, &user_a, "exp1", DecideOptions::empty()),
            service.get_decision(&config, &user_b, "exp1", DecideOptions::empty()),
        );
        a.expect("Decision failed");
        b.expect("Decision failed");

        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_metrics_track_hit_miss_and_fetch() {
        let counters = Arc::new(Counters::default());
        let service = service(CountingClient::default())
            .with_metrics(Box::new(CountingMetrics(Arc::clone(&counters))));
        let config = project();
        let user = UserContext::new("user123").with_attribute("age", 25);

        for _ in 0..2 {
            service
                .get_decision(&config, &user, "exp1", DecideOptions::empty())
                .await
                .expect("Decision failed");
        }
        // (hits, misses, fetches, errors)
        assert_eq!(counters.snapshot(), (1, 1, 1, 0));

        let older = user.clone().with_attribute("age", 26);
        service
            .get_decision(&config, &older, "exp1", DecideOptions::empty())
            .await
            .expect("Decision failed");
        assert_eq!(counters.snapshot(), (1, 2, 2, 0));
    }

    #[tokio::test]
    async fn test_metrics_record_failed_fetch() {
        let counters = Arc::new(Counters::default());
        let service = service(CountingClient {
            fail: true,
            ..Default::default()
        })
        .with_metrics(Box::new(CountingMetrics(Arc::clone(&counters))));
        let user = UserContext::new("user123").with_attribute("age", 25);

        let result = service
            .get_decision(&project(), &user, "exp1", DecideOptions::empty())
            .await;

        assert!(result.is_err());
        assert_eq!(counters.snapshot(), (0, 1, 0, 1));
    }

    #[test]
    fn test_config_validation_on_construction() {
        let config = CmabConfig::default().with_lock_stripes(0);
        assert!(CmabService::with_config(CountingClient::default(), &config).is_err());

        let service = CmabService::with_config(CountingClient::default(), &CmabConfig::default())
            .expect("Default config is valid");
        assert_eq!(service.lock_stripes(), 1000);
        assert_eq!(service.cache().capacity(), 10_000);
    }

    #[test]
    fn test_clone_shares_state() {
        let service = service(CountingClient::default());
        let clone = service.clone();
        assert!(Arc::ptr_eq(&service.cache, &clone.cache));
        assert!(Arc::ptr_eq(&service.client, &clone.client));
    }
}
