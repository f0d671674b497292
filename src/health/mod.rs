//! Health & readiness (C10): cached per-pool liveness probes and the
//! derived overall status, readiness, and liveness payloads.

use crate::config::model::Database;
use crate::pool::PoolRegistry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

const CACHE_TTL: Duration = Duration::from_millis(30_000);
const ACQUIRE_BUDGET: Duration = Duration::from_millis(5_000);
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Up,
    Down,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    pub status: Status,
    pub message: String,
    pub elapsed_ms: u64,
}

struct CachedHealth {
    health: DatabaseHealth,
    checked_at: Instant,
}

/// Caches one probe result per database name; `check` only re-probes once
/// the cached entry has aged past [`CACHE_TTL`].
pub struct HealthMonitor {
    pools: Arc<PoolRegistry>,
    cache: DashMap<String, CachedHealth>,
    config_load_failed: std::sync::atomic::AtomicBool,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor").field("tracked", &self.cache.len()).finish()
    }
}

impl HealthMonitor {
    #[must_use]
    pub fn new(pools: Arc<PoolRegistry>) -> Self {
        Self {
            pools,
            cache: DashMap::new(),
            config_load_failed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Marks that the last configuration (re)load failed; forces overall
    /// health to `DOWN` regardless of individual probe results.
    pub fn set_config_load_failed(&self, failed: bool) {
        self.config_load_failed.store(failed, std::sync::atomic::Ordering::Relaxed);
    }

    /// Returns a cached result if younger than 30s, otherwise probes the
    /// database within a 5s acquire budget and a 3s validation timeout.
    pub async fn check(&self, database: &Database) -> DatabaseHealth {
        if let Some(cached) = self.cache.get(&database.name) {
            if cached.checked_at.elapsed() < CACHE_TTL {
                return cached.health.clone();
            }
        }

        let started = Instant::now();
        let health = match tokio::time::timeout(ACQUIRE_BUDGET, self.probe(database)).await {
            Ok(Ok(())) => DatabaseHealth {
                status: Status::Up,
                message: "ok".to_string(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
            Ok(Err(message)) => DatabaseHealth {
                status: Status::Down,
                message,
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
            Err(_) => DatabaseHealth {
                status: Status::Down,
                message: "acquire budget exceeded".to_string(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
        };

        self.cache.insert(
            database.name.clone(),
            CachedHealth { health: health.clone(), checked_at: Instant::now() },
        );
        health
    }

    async fn probe(&self, database: &Database) -> Result<(), String> {
        let pool = self.pools.get_or_create(database).await.map_err(|e| e.to_string())?;
        tokio::time::timeout(PROBE_TIMEOUT, sqlx::query("SELECT 1").execute(&pool))
            .await
            .map_err(|_| "validation probe timed out".to_string())?
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// Probes every registered database and derives the overall status:
    /// `DOWN` if configuration failed to load, else `DEGRADED` if any
    /// database is down, else `UP`.
    pub async fn overall(&self, databases: &std::collections::HashMap<String, Database>) -> (Status, std::collections::HashMap<String, DatabaseHealth>) {
        if self.config_load_failed.load(std::sync::atomic::Ordering::Relaxed) {
            let results = self.probe_all(databases).await;
            return (Status::Down, results);
        }
        let results = self.probe_all(databases).await;
        let any_down = results.values().any(|h| h.status == Status::Down);
        let status = if any_down { Status::Degraded } else { Status::Up };
        (status, results)
    }

    async fn probe_all(&self, databases: &std::collections::HashMap<String, Database>) -> std::collections::HashMap<String, DatabaseHealth> {
        let mut results = std::collections::HashMap::with_capacity(databases.len());
        for database in databases.values() {
            results.insert(database.name.clone(), self.check(database).await);
        }
        results
    }
}

/// Coarse resident-memory usage as a fraction of total system memory, read
/// from `/proc/self/status` and `/proc/meminfo`. Returns `None` on
/// non-Linux platforms or if the proc files are unreadable.
#[must_use]
pub fn memory_usage_fraction() -> Option<f64> {
    let rss_kb = proc_field("/proc/self/status", "VmRSS:")?;
    let total_kb = proc_field("/proc/meminfo", "MemTotal:")?;
    if total_kb == 0 {
        return None;
    }
    Some(rss_kb as f64 / total_kb as f64)
}

/// Approximates "active thread-equivalent count" via the process's OS
/// thread count, read from `/proc/self/status`.
#[must_use]
pub fn active_thread_count() -> Option<u64> {
    proc_field("/proc/self/status", "Threads:")
}

fn proc_field(path: &str, field: &str) -> Option<u64> {
    let contents = std::fs::read_to_string(path).ok()?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix(field) {
            return rest.split_whitespace().next()?.parse().ok();
        }
    }
    None
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub databases_configured: bool,
    pub databases_up: bool,
    pub memory_ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LivenessReport {
    pub alive: bool,
    pub memory_ok: bool,
    pub thread_count_ok: bool,
}

/// Readiness combines: non-empty configuration, every database probe `UP`,
/// and resident memory at or below 95%.
#[must_use]
pub fn readiness(databases_configured: bool, databases_up: bool) -> ReadinessReport {
    let memory_ok = memory_usage_fraction().map_or(true, |fraction| fraction <= 0.95);
    ReadinessReport {
        ready: databases_configured && databases_up && memory_ok,
        databases_configured,
        databases_up,
        memory_ok,
    }
}

/// Liveness combines: resident memory at or below 98% and an active
/// thread-equivalent count at or below 2000.
#[must_use]
pub fn liveness() -> LivenessReport {
    let memory_ok = memory_usage_fraction().map_or(true, |fraction| fraction <= 0.98);
    let thread_count_ok = active_thread_count().map_or(true, |count| count <= 2000);
    LivenessReport {
        alive: memory_ok && thread_count_ok,
        memory_ok,
        thread_count_ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_fails_when_databases_not_configured() {
        let report = readiness(false, true);
        assert!(!report.ready);
    }

    #[test]
    fn readiness_fails_when_a_database_is_down() {
        let report = readiness(true, false);
        assert!(!report.ready);
    }

    #[test]
    fn readiness_passes_when_everything_nominal() {
        let report = readiness(true, true);
        assert!(report.ready || !report.memory_ok);
    }
}
