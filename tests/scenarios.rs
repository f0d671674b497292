//! End-to-end scenarios against the public crate surface, exercised without
//! a live Postgres instance — each corresponds to one of the service's
//! testable properties around caching, invalidation, config loading, and
//! parameter safety.

use cordal::cache::{build_cache_key, CacheManager};
use cordal::config::loader::filesystem::FilesystemLoaderConfig;
use cordal::config::loader::{ConfigLoader, FilesystemLoader};
use cordal::config::model::ParamType;
use cordal::events::EventBus;
use cordal::invalidation::{InvalidationEngine, InvalidationRule};
use cordal::query::params::coerce;
use serde_json::json;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).expect("create fixture file");
    f.write_all(contents.as_bytes()).expect("write fixture file");
    path
}

/// S1 — a second request for the same bound parameters reuses the cached
/// entry instead of hitting the database again.
#[test]
fn paged_list_second_request_is_a_cache_hit() {
    let cache = CacheManager::new(100);
    let mut params = BTreeMap::new();
    params.insert("symbol".to_string(), json!("AAPL"));
    params.insert("limit".to_string(), json!(20));
    params.insert("offset".to_string(), json!(0));
    let key = build_cache_key("stock-trades-by-symbol", Some("t:{symbol}:{limit}:{offset}"), &params);
    assert_eq!(key, "t:aapl:20:0");

    assert!(cache.get::<serde_json::Value>("query_results", &key).is_none());
    cache.put("query_results", key.clone(), json!([{"symbol": "AAPL", "price": 190.1}]), Duration::from_secs(60));

    let first = cache.get::<serde_json::Value>("query_results", &key);
    let second = cache.get::<serde_json::Value>("query_results", &key);
    assert_eq!(first, second);
    assert_eq!(cache.stats("query_results").hits, 2);
    assert_eq!(cache.stats("query_results").misses, 1);
}

/// S2 — a `trade.created` event for AAPL purges the AAPL cache entry via a
/// condition-gated invalidation rule, leaving a GOOGL entry untouched.
#[tokio::test]
async fn conditional_invalidation_only_purges_the_matching_symbol() {
    let cache = Arc::new(CacheManager::new(100));
    // `build_cache_key` normalizes string params (trim + lowercase), so the
    // stored keys are lowercase; the invalidation rule's own pattern must be
    // built the same way to resolve to a matching cache key.
    let mut aapl_params = BTreeMap::new();
    aapl_params.insert("symbol".to_string(), json!("AAPL"));
    let aapl_key = build_cache_key("stock-trades-by-symbol", Some("t:{symbol}"), &aapl_params);
    let mut googl_params = BTreeMap::new();
    googl_params.insert("symbol".to_string(), json!("GOOGL"));
    let googl_key = build_cache_key("stock-trades-by-symbol", Some("t:{symbol}"), &googl_params);
    assert_eq!(aapl_key, "t:aapl");
    assert_eq!(googl_key, "t:googl");

    cache.put("query_results", aapl_key.clone(), json!([1]), Duration::from_secs(60));
    cache.put("query_results", googl_key.clone(), json!([2]), Duration::from_secs(60));

    let event_bus = Arc::new(EventBus::new());
    let engine = InvalidationEngine::new(Arc::clone(&event_bus), Arc::clone(&cache));
    engine.register_rules(vec![InvalidationRule {
        event_type: "trade.created".to_string(),
        patterns: vec!["t:{symbol}".to_string()],
        condition: Some("${data.symbol} = aapl".to_string()),
        delay_ms: 0,
        r#async: false,
    }]);

    let event = cordal::events::Event::new("trade.created", "test").with_data("symbol", "aapl");
    event_bus.publish_sync(event);

    assert!(cache.get::<serde_json::Value>("query_results", &aapl_key).is_none());
    assert!(cache.get::<serde_json::Value>("query_results", &googl_key).is_some());
}

/// S3 — two endpoint files defining the same endpoint name is a fatal load
/// error, not a silently-overwritten descriptor.
#[tokio::test]
async fn duplicate_endpoint_name_across_files_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(
        dir.path(),
        "a-endpoints.yaml",
        "endpoints:\n  stock-trades-all:\n    path: /stock-trades\n    method: GET\n    query: q1\n",
    );
    write_file(
        dir.path(),
        "b-endpoints.yaml",
        "endpoints:\n  stock-trades-all:\n    path: /stock-trades-2\n    method: GET\n    query: q2\n",
    );
    let loader = FilesystemLoader::new(FilesystemLoaderConfig {
        directories: vec![dir.path().to_path_buf()],
        database_patterns: vec![],
        query_patterns: vec![],
        endpoint_patterns: vec!["*-endpoints.yaml".to_string()],
    });
    let err = loader.load_endpoints().await.expect_err("duplicate endpoint name must be fatal");
    let message = err.to_string();
    assert!(message.contains("a-endpoints.yaml"), "error should name the first file: {message}");
    assert!(message.contains("b-endpoints.yaml"), "error should name the second file: {message}");
}

/// S6 — a parameter declared as `INTEGER` rejects a SQL-injection payload
/// outright (400), and a parameter declared as `STRING` carries it through
/// as an opaque bound value rather than interpolated SQL.
#[test]
fn injection_payload_is_rejected_or_safely_bound() {
    let payload = "AAPL'; DROP TABLE stock_trades; --";

    let as_integer = coerce("id", payload, ParamType::Integer);
    assert!(as_integer.is_err());

    let as_string = coerce("symbol", payload, ParamType::String).expect("string coercion always succeeds");
    assert_eq!(as_string, json!(payload));
}
