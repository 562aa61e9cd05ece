//! Bounded in-memory cache (thread-safe, LRU, optional TTL).
//!
//! A single mutex guards the recency list. Every operation is O(1) map and
//! list manipulation with no I/O, so one lock for the whole structure is
//! enough. Expiry is evaluated lazily on lookup; there is no sweeper.

use lru::LruCache;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Stored element with its insertion time.
struct CacheElement<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheElement<V> {
    fn new(value: V) -> Self {
        CacheElement {
            value,
            inserted_at: Instant::now(),
        }
    }

    /// `ttl` of zero means entries never go stale.
    fn is_stale(&self, ttl: Duration) -> bool {
        !ttl.is_zero() && self.inserted_at.elapsed() >= ttl
    }
}

/// Thread-safe least-recently-used cache with optional time-to-live.
///
/// - `capacity == 0` disables storage: every operation is a no-op and
///   lookups always miss.
/// - `ttl == Duration::ZERO` disables expiry.
///
/// # Example
///
/// ```
/// use cmab_cache::cache::BoundedCache;
/// use std::time::Duration;
///
/// let cache = BoundedCache::new(2, Duration::ZERO);
/// cache.save("a", 1);
/// cache.save("b", 2);
/// cache.save("c", 3);
///
/// assert_eq!(cache.lookup("a"), None);
/// assert_eq!(cache.lookup("c"), Some(3));
/// ```
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, CacheElement<V>>>,
    capacity: usize,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries, each valid for `ttl`.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        BoundedCache {
            entries: Mutex::new(LruCache::unbounded()),
            capacity,
            ttl,
        }
    }

    /// Return the value for `key` if present and not stale.
    ///
    /// A fresh hit becomes the most recently used entry. A stale entry is
    /// reported as absent and left where it is; it is never promoted, so it
    /// ages out through normal eviction or is replaced by the next save.
    pub fn lookup<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.capacity == 0 {
            return None;
        }

        let mut entries = self.entries.lock();
        match entries.peek(key) {
            None => return None,
            Some(element) if element.is_stale(self.ttl) => {
                debug!("BoundedCache LOOKUP -> STALE (ttl {:?})", self.ttl);
                return None;
            }
            Some(_) => {}
        }

        entries.get(key).map(|element| element.value.clone())
    }

    /// Insert or overwrite `key` as the most recently used entry.
    ///
    /// Evicts exactly one least recently used entry when the insert pushes
    /// the cache over capacity.
    pub fn save(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }

        let mut entries = self.entries.lock();
        entries.put(key, CacheElement::new(value));

        if entries.len() > self.capacity {
            entries.pop_lru();
            debug!("BoundedCache SAVE evicted LRU entry (capacity {})", self.capacity);
        }
    }

    /// Return the stored value ignoring staleness, without touching recency.
    ///
    /// Inspection only. Do not base freshness decisions on it.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.capacity == 0 {
            return None;
        }

        self.entries
            .lock()
            .peek(key)
            .map(|element| element.value.clone())
    }

    /// Remove `key` if present.
    pub fn remove<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.capacity == 0 {
            return;
        }

        self.entries.lock().pop(key);
    }

    /// Drop every entry.
    pub fn reset(&self) {
        if self.capacity == 0 {
            return;
        }

        self.entries.lock().clear();
        debug!("BoundedCache RESET - all entries cleared");
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
