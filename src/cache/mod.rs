//! Cache subsystem: per-named-cache TTL+LRU store and the cache key
//! algorithm used to front query execution.

pub mod key_builder;
pub mod manager;
pub mod named_cache;

pub use key_builder::build_cache_key;
pub use manager::{spawn_cleaner, CacheManager};
pub use named_cache::{CacheStats, NamedCache};

/// Well-known cache names used by the query executor.
pub const QUERY_RESULTS_CACHE: &str = "query_results";
pub const COUNT_RESULTS_CACHE: &str = "count_results";
