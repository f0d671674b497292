//! Concurrent named-cache map: caches are created lazily by name so no
//! single lock guards the whole manager.

use crate::cache::named_cache::{CacheStats, NamedCache};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct CacheManager {
    caches: DashMap<String, Arc<NamedCache>>,
    default_max_size: usize,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("caches", &self.caches.len())
            .finish()
    }
}

impl CacheManager {
    #[must_use]
    pub fn new(default_max_size: usize) -> Self {
        Self {
            caches: DashMap::new(),
            default_max_size,
        }
    }

    fn cache_for(&self, name: &str) -> Arc<NamedCache> {
        Arc::clone(
            self.caches
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(NamedCache::new(self.default_max_size)))
                .value(),
        )
    }

    pub fn get<T: DeserializeOwned>(&self, cache: &str, key: &str) -> Option<T> {
        self.cache_for(cache).get(key)
    }

    pub fn put(&self, cache: &str, key: String, value: Value, ttl: Duration) {
        self.cache_for(cache).put(key, value, ttl);
    }

    pub fn remove(&self, cache: &str, key: &str) -> bool {
        self.cache_for(cache).remove(key)
    }

    /// Removes matching keys from a single named cache.
    pub fn remove_pattern(&self, cache: &str, pattern: &str) -> usize {
        self.cache_for(cache).remove_pattern(pattern)
    }

    /// Removes matching keys from every named cache (used by the
    /// invalidation engine, which does not target a single cache).
    pub fn remove_pattern_everywhere(&self, pattern: &str) -> usize {
        self.caches
            .iter()
            .map(|entry| entry.value().remove_pattern(pattern))
            .sum()
    }

    pub fn clear(&self, cache: &str) {
        self.cache_for(cache).clear();
    }

    #[must_use]
    pub fn stats(&self, cache: &str) -> CacheStats {
        self.cache_for(cache).stats()
    }

    #[must_use]
    pub fn all_stats(&self) -> HashMap<String, CacheStats> {
        self.caches
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    /// Purges expired entries from every named cache; intended to be driven
    /// by a periodic background task.
    pub fn purge_expired(&self) -> usize {
        self.caches.iter().map(|entry| entry.value().purge_expired()).sum()
    }
}

/// Spawns the periodic background cleaner described in the cache core
/// design. Returns the task handle so callers may abort it on shutdown.
pub fn spawn_cleaner(manager: Arc<CacheManager>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let purged = manager.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "cache cleaner purged expired entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_are_independent_by_name() {
        let manager = CacheManager::new(10);
        manager.put("a", "k".to_string(), serde_json::json!(1), Duration::from_secs(60));
        manager.put("b", "k".to_string(), serde_json::json!(2), Duration::from_secs(60));
        assert_eq!(manager.get::<i64>("a", "k"), Some(1));
        assert_eq!(manager.get::<i64>("b", "k"), Some(2));
    }

    #[test]
    fn remove_pattern_everywhere_spans_all_caches() {
        let manager = CacheManager::new(10);
        manager.put("query_results", "user:1:p".to_string(), serde_json::json!(1), Duration::from_secs(60));
        manager.put("count_results", "user:1:c".to_string(), serde_json::json!(1), Duration::from_secs(60));
        let removed = manager.remove_pattern_everywhere("user:1:*");
        assert_eq!(removed, 2);
    }
}
