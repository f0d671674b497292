//! Query executor (C8): cache-fronted parameter binding, prepare/execute,
//! row materialization.

use crate::cache::{build_cache_key, CacheManager, COUNT_RESULTS_CACHE, QUERY_RESULTS_CACHE};
use crate::config::model::Query;
use crate::error::AppError;
use crate::pool::PoolRegistry;
use crate::query::params::build_arguments;
use crate::query::row::Row;
use crate::stats::Statistics;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row as SqlxRow};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct QueryExecutor {
    pools: Arc<PoolRegistry>,
    cache: Arc<CacheManager>,
    stats: Arc<Statistics>,
}

impl QueryExecutor {
    #[must_use]
    pub fn new(pools: Arc<PoolRegistry>, cache: Arc<CacheManager>, stats: Arc<Statistics>) -> Self {
        Self { pools, cache, stats }
    }

    /// Executes a row-returning query, consulting the cache first when the
    /// query has caching enabled.
    pub async fn execute(
        &self,
        query: &Query,
        database: &crate::config::model::Database,
        bound: &BTreeMap<String, Value>,
    ) -> Result<Vec<Row>, AppError> {
        let cache_key = self.cache_key(query, bound);
        if let Some(key) = &cache_key {
            let started = Instant::now();
            if let Some(rows) = self.cache.get::<Vec<Row>>(QUERY_RESULTS_CACHE, key) {
                self.stats.record_query(query.name.as_str(), started.elapsed(), true, rows.len());
                return Ok(rows);
            }
        }

        let started = Instant::now();
        let pool = self.acquire(database).await?;
        let arguments = build_arguments(&query.parameters, bound)?;
        let pg_rows = sqlx::query_with(&query.sql, arguments)
            .fetch_all(&pool)
            .await
            .map_err(|e| AppError::ExecError {
                query_name: query.name.clone(),
                cause: e.to_string(),
            })?;
        let rows: Vec<Row> = pg_rows.iter().map(row_to_typed_row).collect();

        self.stats.record_query(query.name.as_str(), started.elapsed(), false, rows.len());

        if let (Some(key), Some(cache_spec)) = (&cache_key, &query.cache) {
            self.cache.put(
                QUERY_RESULTS_CACHE,
                key.clone(),
                serde_json::to_value(&rows).map_err(|e| AppError::Internal(e.into()))?,
                Duration::from_secs(cache_spec.ttl_seconds),
            );
        }

        Ok(rows)
    }

    /// Executes a count query, reading the first column of the first row as
    /// a signed 64-bit integer (0 if the result set is empty).
    pub async fn execute_count(
        &self,
        query: &Query,
        database: &crate::config::model::Database,
        bound: &BTreeMap<String, Value>,
    ) -> Result<i64, AppError> {
        let cache_key = self.cache_key(query, bound);
        if let Some(key) = &cache_key {
            if let Some(count) = self.cache.get::<i64>(COUNT_RESULTS_CACHE, key) {
                return Ok(count);
            }
        }

        let pool = self.acquire(database).await?;
        let arguments = build_arguments(&query.parameters, bound)?;
        let pg_row = sqlx::query_with(&query.sql, arguments)
            .fetch_optional(&pool)
            .await
            .map_err(|e| AppError::ExecError {
                query_name: query.name.clone(),
                cause: e.to_string(),
            })?;
        let count = pg_row
            .map(|row| row_to_typed_row(&row).first_as_i64().unwrap_or(0))
            .unwrap_or(0);

        if let (Some(key), Some(cache_spec)) = (&cache_key, &query.cache) {
            self.cache.put(
                COUNT_RESULTS_CACHE,
                key.clone(),
                Value::from(count),
                Duration::from_secs(cache_spec.ttl_seconds),
            );
        }

        Ok(count)
    }

    /// Acquires a pool for `database`, recording the database-family
    /// connection statistics (C11) around the acquisition itself.
    async fn acquire(&self, database: &crate::config::model::Database) -> Result<sqlx::PgPool, AppError> {
        let started = Instant::now();
        let result = self.pools.get_or_create(database).await;
        self.stats.record_database(&database.name, started.elapsed(), result.is_ok());
        result
    }

    fn cache_key(&self, query: &Query, bound: &BTreeMap<String, Value>) -> Option<String> {
        let cache_spec = query.cache.as_ref()?;
        if !cache_spec.enabled {
            return None;
        }
        Some(build_cache_key(&query.name, cache_spec.key_pattern.as_deref(), bound))
    }
}

/// Materializes a Postgres row into an ordered, typed [`Row`], trying
/// progressively looser decode targets per column (integers, floating
/// point, boolean, text, then JSON/JSONB, falling back to null).
fn row_to_typed_row(row: &PgRow) -> Row {
    let mut result = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = column_to_json(row, idx);
        result.push(column.name(), value);
    }
    result
}

fn column_to_json(row: &PgRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(|dt| Value::String(dt.to_rfc3339())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    Value::Null
}
