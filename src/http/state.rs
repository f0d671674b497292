//! Shared application state handed to every HTTP handler, built once in
//! the composition root (`main.rs`) and wrapped in an `Arc`.

use crate::cache::CacheManager;
use crate::config::app_config::AppConfig;
use crate::config::loader::{ConfigLoader, SourceKind};
use crate::config::registry::ConfigRegistry;
use crate::events::EventBus;
use crate::health::HealthMonitor;
use crate::invalidation::InvalidationEngine;
use crate::pool::PoolRegistry;
use crate::query::QueryExecutor;
use crate::stats::Statistics;
use std::sync::Arc;

/// Everything a request handler might need, composed once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<ConfigRegistry>,
    pub pools: Arc<PoolRegistry>,
    pub cache: Arc<CacheManager>,
    pub event_bus: Arc<EventBus>,
    pub invalidation: Arc<InvalidationEngine>,
    pub executor: Arc<QueryExecutor>,
    pub stats: Arc<Statistics>,
    pub health: Arc<HealthMonitor>,
    /// The loader currently backing the registry; re-used by `reload` and
    /// by the migration endpoints as the filesystem side of a comparison.
    pub fs_loader: Option<Arc<dyn ConfigLoader>>,
    pub store_loader: Option<Arc<dyn ConfigLoader>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").field("source", &self.registry.source()).finish()
    }
}

impl AppState {
    /// Whether management mutation endpoints are available: the registry
    /// must be backed by the store, not the filesystem (§6 `IllegalState`).
    #[must_use]
    pub fn mutations_allowed(&self) -> bool {
        self.registry.source() == SourceKind::Store
    }
}
