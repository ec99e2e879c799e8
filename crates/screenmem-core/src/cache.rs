//! Shared cache abstraction backing the embedding, conflict, classification,
//! and response caches (plain LRU) and the search result cache (TTL+LRU).
//!
//! One generic type for uniform stats and eviction policy, per the design
//! notes' recommendation.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cache statistics, exposed verbatim by C11 and reused for the plain-LRU
/// caches (expirations stay 0 when no TTL is configured).
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A capacity-bounded LRU cache with an optional time-to-live. `ttl = None`
/// makes this a pure LRU (used for the embedding/conflict/classification/
/// response caches); `ttl = Some(..)` makes it the search result cache.
pub struct TtlLru<K: Eq + Hash, V: Clone> {
    inner: Mutex<LruCache<K, Entry<V>>>,
    ttl: Option<Duration>,
    stats: Mutex<CacheStats>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlLru<K, V> {
    /// Create a cache with the given capacity and optional TTL.
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            ttl,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Look up `key`, removing and counting it as a miss+expiration if its
    /// TTL has elapsed.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        let expired = match inner.peek(key) {
            Some(entry) => self.ttl.is_some_and(|ttl| entry.inserted_at.elapsed() > ttl),
            None => false,
        };
        if expired {
            inner.pop(key);
            let mut stats = self.stats.lock().unwrap();
            stats.misses += 1;
            stats.expirations += 1;
            stats.size = inner.len();
            return None;
        }
        let hit = inner.get(key).map(|e| e.value.clone());
        let mut stats = self.stats.lock().unwrap();
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        hit
    }

    /// Insert or overwrite `key`. Evicts the least-recently-used entry if
    /// capacity is exceeded.
    pub fn set(&self, key: K, value: V) {
        let mut inner = self.inner.lock().unwrap();
        let was_full = inner.len() >= inner.cap().get() && !inner.contains(&key);
        inner.put(key, Entry { value, inserted_at: Instant::now() });
        let mut stats = self.stats.lock().unwrap();
        if was_full {
            stats.evictions += 1;
        }
        stats.size = inner.len();
    }

    /// Remove `key` if present.
    pub fn invalidate(&self, key: &K) {
        let mut inner = self.inner.lock().unwrap();
        inner.pop(key);
        self.stats.lock().unwrap().size = inner.len();
    }

    /// Drop every entry. Used when a write touches cached member ids and
    /// the simplest acceptable invalidation is a full clear (§4.8).
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.clear();
        self.stats.lock().unwrap().size = 0;
    }

    /// Snapshot of current statistics.
    pub fn stats(&self) -> CacheStats {
        *self.stats.lock().unwrap()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_at_capacity() {
        let cache: TtlLru<&str, i32> = TtlLru::new(2, None);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.get(&"a"); // touch a, b becomes LRU
        cache.set("c", 3);
        assert!(cache.get(&"b").is_none());
        assert!(cache.get(&"a").is_some());
        assert!(cache.get(&"c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn ttl_expires_entries() {
        let cache: TtlLru<&str, i32> = TtlLru::new(10, Some(Duration::from_millis(10)));
        cache.set("a", 1);
        assert!(cache.get(&"a").is_some());
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get(&"a").is_none());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn hit_rate_computed_from_hits_and_misses() {
        let cache: TtlLru<&str, i32> = TtlLru::new(10, None);
        cache.set("a", 1);
        cache.get(&"a");
        cache.get(&"missing");
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn invalidate_removes_single_key() {
        let cache: TtlLru<&str, i32> = TtlLru::new(10, None);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.invalidate(&"a");
        assert!(cache.get(&"a").is_none());
        assert!(cache.get(&"b").is_some());
    }
}
