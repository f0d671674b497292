//! Store-backed config loader: reads descriptors from three tables in a
//! configuration-store Postgres database, each shaped
//! `(name PRIMARY KEY, body TEXT, created_at, updated_at)`.

use super::{config_error, ConfigLoader, SourceKind};
use crate::config::model::{Database, Endpoint, Query};
use crate::error::{AppError, ConfigErrorKind};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;

pub struct StoreLoader {
    pool: PgPool,
}

impl StoreLoader {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_table<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
    ) -> Result<HashMap<String, T>, AppError> {
        let query = format!("SELECT name, body FROM {table} ORDER BY name");
        let rows: Vec<(String, String)> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| config_error(ConfigErrorKind::Io, table, e.to_string()))?;

        let mut result = HashMap::with_capacity(rows.len());
        for (name, body) in rows {
            let descriptor: T = serde_json::from_str(&body)
                .map_err(|e| config_error(ConfigErrorKind::Parse, format!("{table}/{name}"), e.to_string()))?;
            result.insert(name, descriptor);
        }
        Ok(result)
    }
}

#[async_trait]
impl ConfigLoader for StoreLoader {
    fn kind(&self) -> SourceKind {
        SourceKind::Store
    }

    async fn load_databases(&self) -> Result<HashMap<String, Database>, AppError> {
        let mut databases: HashMap<String, Database> = self.load_table("cordal_databases").await?;
        for database in databases.values_mut() {
            database.url = crate::config::env::substitute(&database.url);
        }
        Ok(databases)
    }

    async fn load_queries(&self) -> Result<HashMap<String, Query>, AppError> {
        self.load_table("cordal_queries").await
    }

    async fn load_endpoints(&self) -> Result<HashMap<String, Endpoint>, AppError> {
        self.load_table("cordal_endpoints").await
    }
}

/// Writes (insert-or-update) a single descriptor's canonical JSON body into
/// its table. Used by the management mutation endpoints and by the
/// filesystem-to-store migration path.
pub async fn upsert(
    pool: &PgPool,
    table: &str,
    name: &str,
    body: &str,
) -> Result<(), AppError> {
    let query = format!(
        "INSERT INTO {table} (name, body, created_at, updated_at) VALUES ($1, $2, now(), now()) \
         ON CONFLICT (name) DO UPDATE SET body = EXCLUDED.body, updated_at = now()"
    );
    sqlx::query(&query)
        .bind(name)
        .bind(body)
        .execute(pool)
        .await
        .map_err(|e| config_error(ConfigErrorKind::Io, table, e.to_string()))?;
    Ok(())
}

pub async fn delete(pool: &PgPool, table: &str, name: &str) -> Result<bool, AppError> {
    let query = format!("DELETE FROM {table} WHERE name = $1");
    let result = sqlx::query(&query)
        .bind(name)
        .execute(pool)
        .await
        .map_err(|e| config_error(ConfigErrorKind::Io, table, e.to_string()))?;
    Ok(result.rows_affected() > 0)
}
