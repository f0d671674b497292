//! Pool registry: lazily instantiates one connection pool per database
//! descriptor.

use crate::config::model::Database;
use crate::error::AppError;
use dashmap::DashMap;
use sqlx::postgres::{PgPoolOptions, PgConnectOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;

/// Reserved name under which the configuration-store's own connection pool
/// is kept, alongside the per-descriptor pools. The store is itself just a
/// Postgres database, so it shares the same map rather than a separate field.
const STORE_POOL_KEY: &str = "__cordal_config_store__";

pub struct PoolRegistry {
    pools: DashMap<String, PgPool>,
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry").field("pools", &self.pools.len()).finish()
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { pools: DashMap::new() }
    }

    /// Returns the pool for `db_name`, creating it from `database` on first
    /// access. Only the `postgres` driver has a working backend; any other
    /// driver identifier fails fast.
    pub async fn get_or_create(&self, database: &Database) -> Result<PgPool, AppError> {
        if let Some(pool) = self.pools.get(&database.name) {
            return Ok(pool.clone());
        }
        if database.driver != "postgres" {
            return Err(AppError::IllegalState(format!(
                "unsupported driver '{}' for database '{}'",
                database.driver, database.name
            )));
        }

        let connect_options = PgConnectOptions::from_str(&database.url)
            .map_err(|e| AppError::IllegalState(format!("invalid connection url for '{}': {e}", database.name)))?;
        let connect_options = match (&database.username, &database.password) {
            (Some(user), Some(password)) => connect_options.username(user).password(password),
            (Some(user), None) => connect_options.username(user),
            _ => connect_options,
        };

        let pool = PgPoolOptions::new()
            .max_connections(database.pool.max_size)
            .min_connections(database.pool.min_idle)
            .acquire_timeout(Duration::from_millis(database.pool.connect_timeout_ms))
            .idle_timeout(Some(Duration::from_millis(database.pool.idle_timeout_ms)))
            .max_lifetime(Some(Duration::from_millis(database.pool.max_lifetime_ms)))
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                AppError::IllegalState(format!("failed to create pool for '{}': {e}", database.name))
            })?;

        self.pools.insert(database.name.clone(), pool.clone());
        tracing::info!(database = %database.name, "connection pool created");
        Ok(pool)
    }

    /// Returns an existing pool or fails with `UnknownDatabase`-shaped `NotFound`.
    pub fn get(&self, db_name: &str) -> Result<PgPool, AppError> {
        self.pools
            .get(db_name)
            .map(|entry| entry.clone())
            .ok_or_else(|| AppError::NotFound(format!("unknown database '{db_name}'")))
    }

    /// Registers the pool backing the configuration store (used only when
    /// `config.source = "store"`, or when the store is a migration target).
    pub fn set_store_pool(&self, pool: PgPool) {
        self.pools.insert(STORE_POOL_KEY.to_string(), pool);
    }

    #[must_use]
    pub fn store_pool(&self) -> Option<PgPool> {
        self.pools.get(STORE_POOL_KEY).map(|entry| entry.clone())
    }

    /// Closes every pool. Idempotent.
    pub async fn shutdown(&self) {
        for entry in self.pools.iter() {
            entry.value().close().await;
        }
        self.pools.clear();
    }
}
