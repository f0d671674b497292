//! One independent TTL+LRU store, keyed by string key, holding arbitrary
//! JSON-serializable values.

use lru::LruCache;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
}

pub struct NamedCache {
    store: RwLock<LruCache<String, CacheEntry>>,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl NamedCache {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size.max(1)).expect("max_size clamped to >= 1");
        Self {
            store: RwLock::new(LruCache::new(capacity)),
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Reads `key`, reporting an expired or type-mismatched entry as a miss
    /// rather than an error.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut store = self.store.write();
        let expired = matches!(store.peek(key), Some(entry) if entry.expires_at <= Instant::now());
        if expired {
            store.pop(key);
        }
        match store.get(key) {
            Some(entry) => match serde_json::from_value(entry.value.clone()) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Some(value)
                }
                Err(_) => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: String, value: Value, ttl: Duration) {
        let mut store = self.store.write();
        let was_new = store.peek(&key).is_none();
        let at_capacity = was_new && store.len() >= self.max_size;
        store.put(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        if at_capacity {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.store.write().pop(key).is_some()
    }

    /// Removes every key matching a `*`/`?` glob pattern, returning the count removed.
    pub fn remove_pattern(&self, pattern: &str) -> usize {
        let mut store = self.store.write();
        let matching: Vec<String> = store
            .iter()
            .filter(|(key, _)| crate::util::glob::matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &matching {
            store.pop(key);
        }
        matching.len()
    }

    pub fn clear(&self) {
        self.store.write().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    /// Evicts every entry past its expiry; used by the background cleaner.
    pub fn purge_expired(&self) -> usize {
        let mut store = self.store.write();
        let now = Instant::now();
        let expired: Vec<String> = store
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            store.pop(key);
        }
        expired.len()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.store.read().len(),
            max_size: self.max_size,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_typed_value() {
        let cache = NamedCache::new(10);
        cache.put("k".to_string(), serde_json::json!({"n": 1}), Duration::from_secs(60));
        let value: serde_json::Value = cache.get("k").expect("value present");
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn expired_entry_reports_as_miss() {
        let cache = NamedCache::new(10);
        cache.put("k".to_string(), serde_json::json!(1), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        let value: Option<i64> = cache.get("k");
        assert!(value.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn lru_eviction_drops_least_recently_used() {
        let cache = NamedCache::new(2);
        cache.put("a".to_string(), serde_json::json!(1), Duration::from_secs(60));
        cache.put("b".to_string(), serde_json::json!(2), Duration::from_secs(60));
        let _: Option<i64> = cache.get("a");
        cache.put("c".to_string(), serde_json::json!(3), Duration::from_secs(60));
        assert!(cache.get::<i64>("b").is_none());
        assert!(cache.get::<i64>("a").is_some());
        assert!(cache.get::<i64>("c").is_some());
    }

    #[test]
    fn remove_pattern_matches_glob() {
        let cache = NamedCache::new(10);
        cache.put("user:42:profile".to_string(), serde_json::json!(1), Duration::from_secs(60));
        cache.put("user:42:orders".to_string(), serde_json::json!(1), Duration::from_secs(60));
        cache.put("user:43:profile".to_string(), serde_json::json!(1), Duration::from_secs(60));
        let removed = cache.remove_pattern("user:42:*");
        assert_eq!(removed, 2);
        assert!(cache.get::<i64>("user:43:profile").is_some());
    }
}
