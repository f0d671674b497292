//! Generic config surface, management mutation surface, migration surface,
//! and health/readiness/liveness endpoints (§6).

use crate::config::registry::{validate_descriptors, ValidationReport};
use crate::error::{AppError, AppResult};
use crate::health::{self, Status};
use crate::http::state::AppState;
use crate::migration;
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DescriptorKind {
    Databases,
    Queries,
    Endpoints,
}

impl DescriptorKind {
    fn parse(kind: &str) -> Result<Self, AppError> {
        match kind {
            "databases" => Ok(Self::Databases),
            "queries" => Ok(Self::Queries),
            "endpoints" => Ok(Self::Endpoints),
            other => Err(AppError::NotFound(format!("unknown config kind '{other}'"))),
        }
    }
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let generation = state.registry.snapshot();
    let (overall, _) = state.health.overall(&generation.databases).await;
    Ok(Json(json!({
        "status": overall,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

#[derive(Debug, Serialize)]
struct EndpointSummary {
    path: String,
    method: String,
    description: String,
}

pub async fn list_endpoints(State(state): State<Arc<AppState>>) -> Json<Value> {
    let generation = state.registry.snapshot();
    let endpoints: std::collections::HashMap<String, EndpointSummary> = generation
        .endpoints
        .values()
        .map(|e| {
            (
                e.name.clone(),
                EndpointSummary { path: e.path.clone(), method: e.method.clone(), description: e.description.clone() },
            )
        })
        .collect();
    Json(json!({
        "totalEndpoints": endpoints.len(),
        "endpoints": endpoints,
    }))
}

pub async fn config_summary(State(state): State<Arc<AppState>>) -> Json<Value> {
    let generation = state.registry.snapshot();
    Json(json!({
        "summary": {
            "databases": generation.databases.len(),
            "queries": generation.queries.len(),
            "endpoints": generation.endpoints.len(),
            "generation": generation.id,
            "source": state.registry.source().to_string(),
        },
        "databases": generation.databases,
        "queries": generation.queries,
        "endpoints": generation.endpoints,
    }))
}

pub async fn config_by_kind(State(state): State<Arc<AppState>>, Path(kind): Path<String>) -> AppResult<Json<Value>> {
    let generation = state.registry.snapshot();
    let value = match DescriptorKind::parse(&kind)? {
        DescriptorKind::Databases => json!(generation.databases),
        DescriptorKind::Queries => json!(generation.queries),
        DescriptorKind::Endpoints => json!(generation.endpoints),
    };
    Ok(Json(value))
}

pub async fn config_by_kind_and_name(
    State(state): State<Arc<AppState>>,
    Path((kind, name)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let generation = state.registry.snapshot();
    let value = match DescriptorKind::parse(&kind)? {
        DescriptorKind::Databases => generation.databases.get(&name).map(|d| json!(d)),
        DescriptorKind::Queries => generation.queries.get(&name).map(|q| json!(q)),
        DescriptorKind::Endpoints => generation.endpoints.get(&name).map(|e| json!(e)),
    };
    value
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("{kind} descriptor '{name}' not found")))
}

fn validation_response(report: &ValidationReport) -> Value {
    json!({
        "status": if report.is_valid() { "VALID" } else { "INVALID" },
        "errors": report.errors,
        "warnings": report.warnings,
        "errorCount": report.errors.len(),
        "warningCount": report.warnings.len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn validate_all(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(validation_response(&state.registry.validate()))
}

/// Narrows the full validation report to errors/warnings naming one facet
/// (`endpoints`, `queries`, `databases`, or `relationships` for
/// cross-references), by substring match on the facet's singular noun.
pub async fn validate_facet(State(state): State<Arc<AppState>>, Path(facet): Path<String>) -> AppResult<Json<Value>> {
    let generation = state.registry.snapshot();
    let full = validate_descriptors(&generation.databases, &generation.queries, &generation.endpoints);
    let needle = match facet.as_str() {
        "endpoints" => "endpoint",
        "queries" => "query",
        "databases" => "database",
        "relationships" => "references",
        other => return Err(AppError::NotFound(format!("unknown validation facet '{other}'"))),
    };
    let filtered = ValidationReport {
        errors: full.errors.into_iter().filter(|e| e.contains(needle)).collect(),
        warnings: full.warnings.into_iter().filter(|w| w.contains(needle)).collect(),
    };
    Ok(Json(validation_response(&filtered)))
}

/// `POST|PUT|DELETE /api/management/config/{kind}/{name}` — only available
/// when the registry's source is the store (§6); otherwise 409.
pub async fn mutate_config(
    State(state): State<Arc<AppState>>,
    Path((kind, name)): Path<(String, String)>,
    method: axum::http::Method,
    body: Option<Json<Value>>,
) -> AppResult<Json<Value>> {
    if !state.mutations_allowed() {
        return Err(AppError::IllegalState(
            "configuration mutations require the store source; this instance is filesystem-backed".to_string(),
        ));
    }
    let descriptor_kind = DescriptorKind::parse(&kind)?;
    let table = match descriptor_kind {
        DescriptorKind::Databases => "cordal_databases",
        DescriptorKind::Queries => "cordal_queries",
        DescriptorKind::Endpoints => "cordal_endpoints",
    };
    let store_loader = state
        .store_loader
        .as_ref()
        .ok_or_else(|| AppError::IllegalState("no store loader configured".to_string()))?;
    let store_pool = state
        .pools
        .store_pool()
        .ok_or_else(|| AppError::IllegalState("no store connection pool configured".to_string()))?;

    let action = if method == axum::http::Method::DELETE {
        crate::config::loader::store::delete(&store_pool, table, &name).await?;
        "deleted"
    } else {
        let Some(Json(body)) = body else {
            return Err(AppError::BadRequest("request body required".to_string()));
        };
        let body_str = serde_json::to_string(&body).map_err(|e| AppError::Internal(e.into()))?;
        let existed = match descriptor_kind {
            DescriptorKind::Databases => store_loader.load_databases().await?.contains_key(&name),
            DescriptorKind::Queries => store_loader.load_queries().await?.contains_key(&name),
            DescriptorKind::Endpoints => store_loader.load_endpoints().await?.contains_key(&name),
        };
        crate::config::loader::store::upsert(&store_pool, table, &name, &body_str).await?;
        if existed { "updated" } else { "created" }
    };

    state.event_bus.publish_async(crate::events::Event::new("configuration.changed", "management").with_data("kind", kind.clone()).with_data("name", name.clone()));

    if let Err(report) = reload_registry(&state).await {
        tracing::warn!(error = %report, "registry reload after mutation failed validation");
    }

    Ok(Json(json!({
        "success": true,
        "action": action,
        "name": name,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

async fn reload_registry(state: &Arc<AppState>) -> Result<(), String> {
    let Some(loader) = state.store_loader.as_ref() else { return Ok(()) };
    let report = state.registry.reload(loader.as_ref()).await.map_err(|e| e.to_string())?;
    if report.is_valid() { Ok(()) } else { Err(report.errors.join("; ")) }
}

pub async fn migration_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let generation = state.registry.snapshot();
    Json(json!({
        "source": state.registry.source().to_string(),
        "generation": generation.id,
        "databases": generation.databases.len(),
        "queries": generation.queries.len(),
        "endpoints": generation.endpoints.len(),
    }))
}

pub async fn migration_compare(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let (fs_loader, store_loader) = required_loaders(&state)?;
    let report = migration::compare(fs_loader.as_ref(), store_loader.as_ref()).await?;
    Ok(Json(json!(report)))
}

pub async fn migration_export_store_to_fs(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let (_, store_loader) = required_loaders(&state)?;
    let (databases, queries, endpoints) = migration::export_store_to_filesystem_form(store_loader.as_ref()).await?;
    Ok(Json(json!({
        "databases": databases,
        "queries": queries,
        "endpoints": endpoints,
    })))
}

pub async fn migration_fs_to_store(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let (fs_loader, _) = required_loaders(&state)?;
    let store_pool = state
        .pools
        .store_pool()
        .ok_or_else(|| AppError::IllegalState("no store connection pool configured".to_string()))?;
    let report = migration::migrate_filesystem_to_store(fs_loader.as_ref(), &store_pool).await?;
    Ok(Json(json!(report)))
}

fn required_loaders(state: &Arc<AppState>) -> AppResult<(Arc<dyn crate::config::loader::ConfigLoader>, Arc<dyn crate::config::loader::ConfigLoader>)> {
    let fs_loader = state.fs_loader.clone().ok_or_else(|| AppError::IllegalState("no filesystem loader configured".to_string()))?;
    let store_loader = state.store_loader.clone().ok_or_else(|| AppError::IllegalState("no store loader configured".to_string()))?;
    Ok((fs_loader, store_loader))
}

pub async fn ready(State(state): State<Arc<AppState>>) -> Json<Value> {
    let generation = state.registry.snapshot();
    let (overall, _) = state.health.overall(&generation.databases).await;
    let report = health::readiness(!generation.databases.is_empty(), overall != Status::Degraded && overall != Status::Down);
    Json(json!(report))
}

pub async fn live() -> Json<Value> {
    Json(json!(health::liveness()))
}

/// `GET /api/generic/stats` — per-endpoint/query/database counters. Additive
/// relative to spec.md's external interface list: the statistics component
/// (C11) would otherwise have no HTTP visibility at all (see SPEC_FULL.md §6).
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "endpoints": state.stats.all_endpoint_snapshots(),
        "queries": state.stats.all_query_snapshots(),
        "databases": state.stats.all_database_snapshots(),
    }))
}
