//! Statistics (C11): per-endpoint, per-query, and per-database counters and
//! latency aggregates. Every counter is an atomic; min/max use a
//! compare-and-swap loop rather than a lock per key.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Atomic call/latency counters shared by the endpoint and database
/// families (the query family embeds one of these plus its own extras).
#[derive(Debug, Default)]
struct Counters {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    total_elapsed_ms: AtomicU64,
    min_elapsed_ms: AtomicI64,
    max_elapsed_ms: AtomicI64,
    first_call_ms: AtomicI64,
    last_call_ms: AtomicI64,
}

impl Counters {
    fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            total_elapsed_ms: AtomicU64::new(0),
            min_elapsed_ms: AtomicI64::new(i64::MAX),
            max_elapsed_ms: AtomicI64::new(i64::MIN),
            first_call_ms: AtomicI64::new(0),
            last_call_ms: AtomicI64::new(0),
        }
    }

    fn record(&self, elapsed_ms: u64, success: bool, now_ms: i64) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.total_elapsed_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        cas_min(&self.min_elapsed_ms, elapsed_ms as i64);
        cas_max(&self.max_elapsed_ms, elapsed_ms as i64);
        self.first_call_ms.compare_exchange(0, now_ms, Ordering::Relaxed, Ordering::Relaxed).ok();
        self.last_call_ms.store(now_ms, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CounterSnapshot {
        let calls = self.calls.load(Ordering::Relaxed);
        let min = self.min_elapsed_ms.load(Ordering::Relaxed);
        let max = self.max_elapsed_ms.load(Ordering::Relaxed);
        CounterSnapshot {
            calls,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            total_elapsed_ms: self.total_elapsed_ms.load(Ordering::Relaxed),
            min_elapsed_ms: if calls == 0 { 0 } else { min },
            max_elapsed_ms: if calls == 0 { 0 } else { max },
            first_call_ms: self.first_call_ms.load(Ordering::Relaxed),
            last_call_ms: self.last_call_ms.load(Ordering::Relaxed),
        }
    }
}

fn cas_min(cell: &AtomicI64, value: i64) {
    let mut current = cell.load(Ordering::Relaxed);
    while value < current {
        match cell.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

fn cas_max(cell: &AtomicI64, value: i64) {
    let mut current = cell.load(Ordering::Relaxed);
    while value > current {
        match cell.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterSnapshot {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_elapsed_ms: u64,
    pub min_elapsed_ms: i64,
    pub max_elapsed_ms: i64,
    pub first_call_ms: i64,
    pub last_call_ms: i64,
}

#[derive(Debug, Default)]
struct QueryCounters {
    base: Counters,
    rows_returned: AtomicU64,
    database_usage: DashMap<String, AtomicU64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuerySnapshot {
    #[serde(flatten)]
    pub base: CounterSnapshot,
    pub rows_returned: u64,
    pub database_usage: std::collections::HashMap<String, u64>,
}

/// Process-wide counter registry. Cheap to clone (an `Arc` wrapper is
/// expected at the composition root); every mutation is lock-free.
#[derive(Debug, Default)]
pub struct Statistics {
    endpoints: DashMap<String, Counters>,
    queries: DashMap<String, QueryCounters>,
    databases: DashMap<String, Counters>,
    started_at: std::sync::OnceLock<std::time::Instant>,
}

impl Statistics {
    #[must_use]
    pub fn new() -> Self {
        let started_at = std::sync::OnceLock::new();
        started_at.set(std::time::Instant::now()).ok();
        Self {
            endpoints: DashMap::new(),
            queries: DashMap::new(),
            databases: DashMap::new(),
            started_at,
        }
    }

    fn now_ms(&self) -> i64 {
        self.started_at
            .get()
            .map(|start| start.elapsed().as_millis() as i64)
            .unwrap_or(0)
    }

    pub fn record_endpoint(&self, name: &str, elapsed: std::time::Duration, success: bool) {
        let now_ms = self.now_ms();
        self.endpoints
            .entry(name.to_string())
            .or_insert_with(Counters::new)
            .record(elapsed.as_millis() as u64, success, now_ms);
    }

    pub fn record_database(&self, name: &str, elapsed: std::time::Duration, success: bool) {
        let now_ms = self.now_ms();
        self.databases
            .entry(name.to_string())
            .or_insert_with(Counters::new)
            .record(elapsed.as_millis() as u64, success, now_ms);
    }

    /// Records one query execution. `success` is always `true` here because
    /// a failed execution surfaces as an `Err` before statistics are
    /// reached (see [`crate::query::QueryExecutor`]); the parameter exists
    /// so query statistics share the same counter shape as endpoints.
    pub fn record_query(&self, name: &str, elapsed: std::time::Duration, cache_hit: bool, rows: usize) {
        let now_ms = self.now_ms();
        let entry = self.queries.entry(name.to_string()).or_insert_with(QueryCounters::default);
        entry.base.record(elapsed.as_millis() as u64, true, now_ms);
        if !cache_hit {
            entry.rows_returned.fetch_add(rows as u64, Ordering::Relaxed);
        }
    }

    pub fn record_query_database_usage(&self, query_name: &str, database_name: &str) {
        let entry = self.queries.entry(query_name.to_string()).or_insert_with(QueryCounters::default);
        entry
            .database_usage
            .entry(database_name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn endpoint_snapshot(&self, name: &str) -> Option<CounterSnapshot> {
        self.endpoints.get(name).map(|c| c.snapshot())
    }

    #[must_use]
    pub fn all_endpoint_snapshots(&self) -> std::collections::HashMap<String, CounterSnapshot> {
        self.endpoints.iter().map(|e| (e.key().clone(), e.value().snapshot())).collect()
    }

    #[must_use]
    pub fn query_snapshot(&self, name: &str) -> Option<QuerySnapshot> {
        self.queries.get(name).map(|q| QuerySnapshot {
            base: q.base.snapshot(),
            rows_returned: q.rows_returned.load(Ordering::Relaxed),
            database_usage: q
                .database_usage
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect(),
        })
    }

    #[must_use]
    pub fn all_query_snapshots(&self) -> std::collections::HashMap<String, QuerySnapshot> {
        self.queries.iter().map(|e| (e.key().clone(), self.query_snapshot(e.key()).unwrap_or_else(|| QuerySnapshot {
            base: e.value().base.snapshot(),
            rows_returned: e.value().rows_returned.load(Ordering::Relaxed),
            database_usage: std::collections::HashMap::new(),
        }))).collect()
    }

    #[must_use]
    pub fn database_snapshot(&self, name: &str) -> Option<CounterSnapshot> {
        self.databases.get(name).map(|c| c.snapshot())
    }

    #[must_use]
    pub fn all_database_snapshots(&self) -> std::collections::HashMap<String, CounterSnapshot> {
        self.databases.iter().map(|e| (e.key().clone(), e.value().snapshot())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn endpoint_counters_accumulate() {
        let stats = Statistics::new();
        stats.record_endpoint("e1", Duration::from_millis(10), true);
        stats.record_endpoint("e1", Duration::from_millis(30), false);
        let snapshot = stats.endpoint_snapshot("e1").expect("snapshot present");
        assert_eq!(snapshot.calls, 2);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.min_elapsed_ms, 10);
        assert_eq!(snapshot.max_elapsed_ms, 30);
        assert_eq!(snapshot.total_elapsed_ms, 40);
    }

    #[test]
    fn query_counters_track_rows_and_database_usage() {
        let stats = Statistics::new();
        stats.record_query("q1", Duration::from_millis(5), false, 12);
        stats.record_query("q1", Duration::from_millis(2), true, 12);
        stats.record_query_database_usage("q1", "main");
        let snapshot = stats.query_snapshot("q1").expect("snapshot present");
        assert_eq!(snapshot.base.calls, 2);
        assert_eq!(snapshot.rows_returned, 12);
        assert_eq!(snapshot.database_usage.get("main"), Some(&1));
    }

    #[test]
    fn unknown_name_has_no_snapshot() {
        let stats = Statistics::new();
        assert!(stats.endpoint_snapshot("missing").is_none());
    }
}
