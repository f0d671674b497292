//! Immutable descriptor types: Database, Query, Endpoint.
//!
//! Descriptors are plain data. They hold no pointers to one another —
//! cross-references are by name and resolved through the registry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParamType {
    String,
    Integer,
    Long,
    Decimal,
    Boolean,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParamSource {
    Path,
    Query,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseType {
    #[default]
    List,
    Single,
    Paged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStrategy {
    #[default]
    Lru,
}

/// Database descriptor. Immutable after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub driver: String,
    /// Connection URL, with `${name:default}` placeholders already resolved at load time.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub pool: PoolTuning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolTuning {
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    #[serde(default = "default_min_idle")]
    pub min_idle: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_max_lifetime_ms")]
    pub max_lifetime_ms: u64,
}

const fn default_max_size() -> u32 {
    10
}
const fn default_min_idle() -> u32 {
    1
}
const fn default_connect_timeout_ms() -> u64 {
    30_000
}
const fn default_idle_timeout_ms() -> u64 {
    600_000
}
const fn default_max_lifetime_ms() -> u64 {
    1_800_000
}

impl Default for PoolTuning {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            min_idle: default_min_idle(),
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_lifetime_ms: default_max_lifetime_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryCacheSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub strategy: CacheStrategy,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_max_entries")]
    pub max_size: usize,
    pub key_pattern: Option<String>,
    #[serde(default)]
    pub invalidate_on: Vec<String>,
    /// Accepted but unused by the request path; see SPEC_FULL.md open question 2.
    #[serde(default)]
    pub refresh_async: bool,
    /// Accepted but unused by the request path; see SPEC_FULL.md open question 2.
    #[serde(default)]
    pub preload: bool,
    #[serde(default)]
    pub invalidation_rules: Vec<crate::invalidation::InvalidationRule>,
}

const fn default_ttl_seconds() -> u64 {
    300
}
const fn default_max_entries() -> usize {
    1000
}

/// Query descriptor. Immutable after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub sql: String,
    pub database: String,
    #[serde(default)]
    pub parameters: Vec<QueryParam>,
    #[serde(default)]
    pub cache: Option<QueryCacheSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointParam {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    pub default_value: Option<String>,
    pub source: ParamSource,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PaginationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_page_size")]
    pub default_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_size: u32,
}

const fn default_page_size() -> u32 {
    20
}
const fn default_max_page_size() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponseConfig {
    #[serde(default, rename = "type")]
    pub response_type: ResponseType,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Endpoint descriptor. Immutable after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub description: String,
    pub query: String,
    #[serde(default)]
    pub count_query: Option<String>,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub parameters: Vec<EndpointParam>,
    #[serde(default)]
    pub response: ResponseConfig,
}

/// A single mapping-document's top-level shape: one key, a name→descriptor map.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabasesDocument {
    #[serde(default)]
    pub databases: HashMap<String, Database>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueriesDocument {
    #[serde(default)]
    pub queries: HashMap<String, Query>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EndpointsDocument {
    #[serde(default)]
    pub endpoints: HashMap<String, Endpoint>,
}
