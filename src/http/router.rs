//! Router assembly: static management/generic routes plus one dynamic
//! route per loaded [`Endpoint`] descriptor.

use crate::config::model::Endpoint;
use crate::http::dispatch::dispatch;
use crate::http::management;
use crate::http::state::AppState;
use axum::extract::{Json as JsonExtract, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put, MethodRouter};
use axum::{Json, Router};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Converts a descriptor path's `{name}` segments into axum 0.7's `:name`
/// segment syntax.
fn to_axum_path(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '{' {
            result.push(':');
            for next in chars.by_ref() {
                if next == '}' {
                    break;
                }
                result.push(next);
            }
        } else {
            result.push(ch);
        }
    }
    result
}

fn method_router(endpoint: Endpoint, state: Arc<AppState>) -> MethodRouter<Arc<AppState>> {
    let method = endpoint.method.to_ascii_uppercase();
    let name = endpoint.name.clone();
    let handler = move |Path(path_params): Path<HashMap<String, String>>,
                         Query(query_params): Query<HashMap<String, String>>,
                         body: Option<JsonExtract<Value>>| {
        let state = Arc::clone(&state);
        let endpoint = endpoint.clone();
        async move {
            let body = body.map(|JsonExtract(value)| value);
            match dispatch(state, endpoint, path_params, query_params, body).await {
                Ok(value) => (StatusCode::OK, Json(value)).into_response(),
                Err(err) => err.into_response(),
            }
        }
    };
    match method.as_str() {
        "GET" => get(handler),
        "POST" => post(handler),
        "PUT" => put(handler),
        "DELETE" => delete(handler),
        "PATCH" => axum::routing::patch(handler),
        other => {
            tracing::warn!(method = other, endpoint = %name, "unsupported HTTP method, defaulting to GET");
            get(handler)
        }
    }
}

/// Builds the full router: generic/management/health routes are static;
/// one route is registered per loaded endpoint descriptor, grouped by
/// path so multiple methods on the same path share a single axum route.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/api/health", get(management::health_check))
        .route("/api/generic/endpoints", get(management::list_endpoints))
        .route("/api/generic/config", get(management::config_summary))
        .route("/api/generic/stats", get(management::stats))
        .route("/api/generic/config/validate", get(management::validate_all))
        .route("/api/generic/config/validate/:facet", get(management::validate_facet))
        .route("/api/generic/config/:kind", get(management::config_by_kind))
        .route("/api/generic/config/:kind/:name", get(management::config_by_kind_and_name))
        .route(
            "/api/management/config/:kind/:name",
            post(management::mutate_config).put(management::mutate_config).delete(management::mutate_config),
        )
        .route("/api/management/migration/status", get(management::migration_status))
        .route("/api/management/migration/compare", get(management::migration_compare))
        .route("/api/management/migration/export-store-to-fs", get(management::migration_export_store_to_fs))
        .route("/api/management/migration/fs-to-store", post(management::migration_fs_to_store))
        .route("/api/management/ready", get(management::ready))
        .route("/api/management/live", get(management::live));

    let generation = state.registry.snapshot();
    let mut by_path: HashMap<String, Vec<Endpoint>> = HashMap::new();
    for endpoint in generation.endpoints.values() {
        by_path.entry(endpoint.path.clone()).or_default().push(endpoint.clone());
    }

    for (path, endpoints) in by_path {
        let axum_path = to_axum_path(&path);
        let mut route: Option<MethodRouter<Arc<AppState>>> = None;
        for endpoint in endpoints {
            let next = method_router(endpoint, Arc::clone(&state));
            route = Some(match route {
                Some(existing) => existing.merge(next),
                None => next,
            });
        }
        if let Some(route) = route {
            router = router.route(&axum_path, route);
        }
    }

    router
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!("http_request", method = %request.method(), uri = %request.uri())
            }),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_curly_brace_segments_to_axum_colon_syntax() {
        assert_eq!(to_axum_path("/stock-trades/symbol/{symbol}"), "/stock-trades/symbol/:symbol");
        assert_eq!(to_axum_path("/things/{a}/{b}"), "/things/:a/:b");
        assert_eq!(to_axum_path("/static/path"), "/static/path");
    }
}
