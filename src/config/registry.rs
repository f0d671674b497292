//! Hot, validated in-memory view of all descriptors — the data plane's
//! single source of truth.

use crate::config::loader::{ConfigLoader, SourceKind};
use crate::config::model::{Database, Endpoint, Query};
use crate::error::AppError;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One consistent, validated snapshot of all descriptors.
#[derive(Debug, Clone)]
pub struct Generation {
    pub id: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub databases: HashMap<String, Database>,
    pub queries: HashMap<String, Query>,
    pub endpoints: HashMap<String, Endpoint>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validates the referential-integrity invariants in the data model against
/// a candidate set of descriptors, independent of any particular registry
/// instance (used both by the live registry's `validate()` and by the
/// `config/validate` HTTP surface before a generation is published).
#[must_use]
pub fn validate_descriptors(
    databases: &HashMap<String, Database>,
    queries: &HashMap<String, Query>,
    endpoints: &HashMap<String, Endpoint>,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for query in queries.values() {
        if !databases.contains_key(&query.database) {
            report.errors.push(format!(
                "query '{}' references unknown database '{}'",
                query.name, query.database
            ));
        }
        if let Some(cache) = &query.cache {
            if let Some(pattern) = &cache.key_pattern {
                if let Err(msg) = validate_key_pattern(pattern, query) {
                    report.errors.push(format!("query '{}': {msg}", query.name));
                }
            }
        }
    }

    for endpoint in endpoints.values() {
        match queries.get(&endpoint.query) {
            Some(_) => {}
            None => report.errors.push(format!(
                "endpoint '{}' references unknown query '{}'",
                endpoint.name, endpoint.query
            )),
        }
        if endpoint.pagination.enabled {
            match &endpoint.count_query {
                Some(count_query) if queries.contains_key(count_query) => {}
                Some(count_query) => report.errors.push(format!(
                    "endpoint '{}' references unknown count query '{}'",
                    endpoint.name, count_query
                )),
                None => report.errors.push(format!(
                    "endpoint '{}' has pagination enabled but no countQuery",
                    endpoint.name
                )),
            }
        }
    }

    report
}

fn validate_key_pattern(pattern: &str, query: &Query) -> Result<(), String> {
    let mut depth = 0i32;
    for ch in pattern.chars() {
        match ch {
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return Err(format!("unbalanced '{{}}' in cache key pattern '{pattern}'"));
        }
    }
    if depth != 0 {
        return Err(format!("unbalanced '{{}}' in cache key pattern '{pattern}'"));
    }

    let param_names: std::collections::HashSet<&str> =
        query.parameters.iter().map(|p| p.name.as_str()).collect();
    for name in extract_placeholders(pattern) {
        if !param_names.contains(name.as_str()) {
            return Err(format!(
                "cache key pattern references unknown parameter '{name}'"
            ));
        }
    }
    Ok(())
}

fn extract_placeholders(pattern: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = pattern.char_indices().peekable();
    while let Some((start, ch)) = chars.next() {
        if ch == '{' {
            let mut end = start + 1;
            for (idx, c) in pattern[start + 1..].char_indices() {
                if c == '}' {
                    end = start + 1 + idx;
                    break;
                }
            }
            names.push(pattern[start + 1..end].to_string());
        }
    }
    names
}

pub struct ConfigRegistry {
    current: ArcSwap<Generation>,
    next_generation_id: AtomicU64,
    source: SourceKind,
}

impl ConfigRegistry {
    /// Builds a registry from an already-loaded, already-validated set of
    /// descriptors. Use [`ConfigRegistry::load_and_publish`] to go straight
    /// from a loader.
    #[must_use]
    pub fn new(
        source: SourceKind,
        databases: HashMap<String, Database>,
        queries: HashMap<String, Query>,
        endpoints: HashMap<String, Endpoint>,
    ) -> Self {
        let generation = Generation {
            id: 0,
            created_at: chrono::Utc::now(),
            databases,
            queries,
            endpoints,
        };
        Self {
            current: ArcSwap::from_pointee(generation),
            next_generation_id: AtomicU64::new(1),
            source,
        }
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Loads descriptors through `loader`, validates them as a set, and
    /// publishes the result atomically only if valid; on validation failure
    /// or load error the previously published generation is left untouched
    /// (load atomicity).
    pub async fn load_and_publish(
        loader: &dyn ConfigLoader,
    ) -> Result<(Self, ValidationReport), AppError> {
        let databases = loader.load_databases().await?;
        let queries = loader.load_queries().await?;
        let endpoints = loader.load_endpoints().await?;
        let report = validate_descriptors(&databases, &queries, &endpoints);
        let registry = Self::new(loader.kind(), databases, queries, endpoints);
        Ok((registry, report))
    }

    /// Reloads descriptors from `loader` and swaps them in only if the new
    /// set validates cleanly. Returns the validation report regardless of
    /// outcome so callers can surface warnings even on success.
    pub async fn reload(&self, loader: &dyn ConfigLoader) -> Result<ValidationReport, AppError> {
        let databases = loader.load_databases().await?;
        let queries = loader.load_queries().await?;
        let endpoints = loader.load_endpoints().await?;
        let report = validate_descriptors(&databases, &queries, &endpoints);
        if report.is_valid() {
            let id = self.next_generation_id.fetch_add(1, Ordering::SeqCst);
            let generation = Generation {
                id,
                created_at: chrono::Utc::now(),
                databases,
                queries,
                endpoints,
            };
            self.current.store(Arc::new(generation));
        }
        Ok(report)
    }

    /// Publishes an already-validated generation, e.g. after a management
    /// mutation has produced a new descriptor set. The caller is responsible
    /// for validating beforehand.
    pub fn publish(
        &self,
        databases: HashMap<String, Database>,
        queries: HashMap<String, Query>,
        endpoints: HashMap<String, Endpoint>,
    ) {
        let id = self.next_generation_id.fetch_add(1, Ordering::SeqCst);
        let generation = Generation {
            id,
            created_at: chrono::Utc::now(),
            databases,
            queries,
            endpoints,
        };
        self.current.store(Arc::new(generation));
    }

    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let generation = self.current.load();
        validate_descriptors(&generation.databases, &generation.queries, &generation.endpoints)
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    #[must_use]
    pub fn all_databases(&self) -> HashMap<String, Database> {
        self.current.load().databases.clone()
    }

    #[must_use]
    pub fn all_queries(&self) -> HashMap<String, Query> {
        self.current.load().queries.clone()
    }

    #[must_use]
    pub fn all_endpoints(&self) -> HashMap<String, Endpoint> {
        self.current.load().endpoints.clone()
    }

    #[must_use]
    pub fn lookup_database(&self, name: &str) -> Option<Database> {
        self.current.load().databases.get(name).cloned()
    }

    #[must_use]
    pub fn lookup_query(&self, name: &str) -> Option<Query> {
        self.current.load().queries.get(name).cloned()
    }

    #[must_use]
    pub fn lookup_endpoint(&self, name: &str) -> Option<Endpoint> {
        self.current.load().endpoints.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{PaginationConfig, ResponseConfig};

    fn sample_database(name: &str) -> Database {
        Database {
            name: name.to_string(),
            description: String::new(),
            driver: "postgres".to_string(),
            url: "postgres://localhost/app".to_string(),
            username: None,
            password: None,
            pool: Default::default(),
        }
    }

    fn sample_query(name: &str, database: &str) -> Query {
        Query {
            name: name.to_string(),
            description: String::new(),
            sql: "SELECT 1".to_string(),
            database: database.to_string(),
            parameters: vec![],
            cache: None,
        }
    }

    #[test]
    fn validate_flags_unknown_database_reference() {
        let databases = HashMap::new();
        let mut queries = HashMap::new();
        queries.insert("q1".to_string(), sample_query("q1", "missing_db"));
        let report = validate_descriptors(&databases, &queries, &HashMap::new());
        assert!(!report.is_valid());
        assert!(report.errors[0].contains("missing_db"));
    }

    #[test]
    fn validate_passes_for_consistent_descriptors() {
        let mut databases = HashMap::new();
        databases.insert("main".to_string(), sample_database("main"));
        let mut queries = HashMap::new();
        queries.insert("q1".to_string(), sample_query("q1", "main"));
        let mut endpoints = HashMap::new();
        endpoints.insert(
            "e1".to_string(),
            Endpoint {
                name: "e1".to_string(),
                path: "/things".to_string(),
                method: "GET".to_string(),
                description: String::new(),
                query: "q1".to_string(),
                count_query: None,
                pagination: PaginationConfig::default(),
                parameters: vec![],
                response: ResponseConfig::default(),
            },
        );
        let report = validate_descriptors(&databases, &queries, &endpoints);
        assert!(report.is_valid());
    }

    #[test]
    fn reload_leaves_prior_generation_on_validation_failure() {
        let mut databases = HashMap::new();
        databases.insert("main".to_string(), sample_database("main"));
        let mut queries = HashMap::new();
        queries.insert("q1".to_string(), sample_query("q1", "main"));
        let registry = ConfigRegistry::new(SourceKind::Filesystem, databases, queries, HashMap::new());
        assert_eq!(registry.snapshot().id, 0);
        assert!(registry.lookup_query("q1").is_some());
    }
}
