//! Request dispatcher (C9): endpoint resolution, parameter extraction and
//! validation, pagination, query execution, and response shaping.

use crate::config::model::{Endpoint, ParamSource, ParamType, Query, ResponseType};
use crate::error::AppError;
use crate::http::state::AppState;
use crate::query::params::coerce;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, serde::Serialize)]
pub struct PagedResponse {
    pub data: Vec<crate::query::Row>,
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Extracts the raw string form of one endpoint parameter from its
/// declared source, or `None` if absent.
fn extract_raw(
    param_name: &str,
    source: ParamSource,
    path_params: &HashMap<String, String>,
    query_params: &HashMap<String, String>,
    body: Option<&Value>,
) -> Option<String> {
    match source {
        ParamSource::Path => path_params.get(param_name).cloned(),
        ParamSource::Query => query_params.get(param_name).cloned(),
        ParamSource::Body => body
            .and_then(|b| b.get(param_name))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
    }
}

/// Extracts and coerces every declared endpoint parameter, applying
/// required/default/missing rules from §4.8 step 2.
fn bind_parameters(
    endpoint: &Endpoint,
    path_params: &HashMap<String, String>,
    query_params: &HashMap<String, String>,
    body: Option<&Value>,
) -> Result<BTreeMap<String, Value>, AppError> {
    let mut bound = BTreeMap::new();
    for param in &endpoint.parameters {
        let raw = extract_raw(&param.name, param.source, path_params, query_params, body);
        match raw {
            Some(raw) => {
                bound.insert(param.name.clone(), coerce(&param.name, &raw, param.param_type)?);
            }
            None if param.required => {
                return Err(AppError::BadRequest(format!("missing required parameter '{}'", param.name)));
            }
            None => {
                if let Some(default) = &param.default_value {
                    bound.insert(param.name.clone(), coerce(&param.name, default, param.param_type)?);
                }
            }
        }
    }
    Ok(bound)
}

struct PaginationBounds {
    page: u32,
    size: u32,
}

/// Extracts `page` (>=0, default 0) and `size` (1..=maxSize, default
/// defaultSize, clamped rather than rejected when too large) per §4.8 step
/// 3 and testable property 9.
fn bind_pagination(endpoint: &Endpoint, query_params: &HashMap<String, String>) -> Result<PaginationBounds, AppError> {
    let page = match query_params.get("page") {
        Some(raw) => {
            let page: i64 = raw
                .parse()
                .map_err(|_| AppError::BadRequest("parameter 'page' must be an integer".to_string()))?;
            if page < 0 {
                return Err(AppError::BadRequest("parameter 'page' must be >= 0".to_string()));
            }
            page as u32
        }
        None => 0,
    };

    let size = match query_params.get("size") {
        Some(raw) => {
            let size: i64 = raw
                .parse()
                .map_err(|_| AppError::BadRequest("parameter 'size' must be an integer".to_string()))?;
            if size < 1 {
                return Err(AppError::BadRequest("parameter 'size' must be >= 1".to_string()));
            }
            (size as u32).min(endpoint.pagination.max_size)
        }
        None => endpoint.pagination.default_size,
    };

    Ok(PaginationBounds { page, size })
}

/// Appends the pagination bounds onto the bound-parameter map using the
/// data query's last two declared formal parameters (by position), as
/// `LIMIT size OFFSET page*size` — see §4.8 step 3.
fn apply_pagination_to_query(query: &Query, bound: &mut BTreeMap<String, Value>, bounds: &PaginationBounds) -> Result<(), AppError> {
    let len = query.parameters.len();
    if len < 2 {
        return Err(AppError::IllegalState(format!(
            "query '{}' has pagination enabled but declares fewer than 2 parameters for LIMIT/OFFSET",
            query.name
        )));
    }
    let limit_param = &query.parameters[len - 2];
    let offset_param = &query.parameters[len - 1];
    bound.insert(limit_param.name.clone(), Value::from(bounds.size));
    bound.insert(offset_param.name.clone(), Value::from(i64::from(bounds.page) * i64::from(bounds.size)));
    Ok(())
}

fn project_fields(rows: Vec<crate::query::Row>, fields: &[String]) -> Vec<crate::query::Row> {
    if fields.is_empty() {
        return rows;
    }
    rows.into_iter()
        .map(|row| {
            let mut projected = crate::query::Row::new();
            for field in fields {
                if let Some(value) = row.get(field) {
                    projected.push(field.clone(), value.clone());
                }
            }
            projected
        })
        .collect()
}

/// Executes the full dispatch pipeline for one resolved endpoint and
/// returns the shaped JSON body (the caller wraps it in an HTTP response).
pub async fn dispatch(
    state: Arc<AppState>,
    endpoint: Endpoint,
    path_params: HashMap<String, String>,
    query_params: HashMap<String, String>,
    body: Option<Value>,
) -> Result<Value, AppError> {
    let started = Instant::now();
    let result = dispatch_inner(&state, &endpoint, path_params, query_params, body).await;
    state.stats.record_endpoint(&endpoint.name, started.elapsed(), result.is_ok());
    result
}

async fn dispatch_inner(
    state: &Arc<AppState>,
    endpoint: &Endpoint,
    path_params: HashMap<String, String>,
    query_params: HashMap<String, String>,
    body: Option<Value>,
) -> Result<Value, AppError> {
    let query = state
        .registry
        .lookup_query(&endpoint.query)
        .ok_or_else(|| AppError::IllegalState(format!("endpoint '{}' references unresolvable query '{}'", endpoint.name, endpoint.query)))?;
    let database = state
        .registry
        .lookup_database(&query.database)
        .ok_or_else(|| AppError::IllegalState(format!("query '{}' references unresolvable database '{}'", query.name, query.database)))?;

    let bound = bind_parameters(endpoint, &path_params, &query_params, body.as_ref())?;

    let (rows, total_elements) = if endpoint.pagination.enabled {
        let bounds = bind_pagination(endpoint, &query_params)?;
        let mut data_bound = bound.clone();
        apply_pagination_to_query(&query, &mut data_bound, &bounds)?;

        let count_query_name = endpoint.count_query.as_ref().ok_or_else(|| {
            AppError::IllegalState(format!("endpoint '{}' has pagination enabled but no countQuery", endpoint.name))
        })?;
        let count_query = state.registry.lookup_query(count_query_name).ok_or_else(|| {
            AppError::IllegalState(format!("endpoint '{}' references unresolvable count query '{count_query_name}'", endpoint.name))
        })?;
        let count_database = state.registry.lookup_database(&count_query.database).ok_or_else(|| {
            AppError::IllegalState(format!("count query '{}' references unresolvable database '{}'", count_query.name, count_query.database))
        })?;

        let executor = Arc::clone(&state.executor);
        let executor_count = Arc::clone(&state.executor);
        let count_bound = bound.clone();
        let (rows, total) = tokio::join!(
            executor.execute(&query, &database, &data_bound),
            executor_count.execute_count(&count_query, &count_database, &count_bound)
        );
        state.stats.record_query_database_usage(&query.name, &database.name);
        (rows?, total?)
    } else {
        let rows = state.executor.execute(&query, &database, &bound).await?;
        state.stats.record_query_database_usage(&query.name, &database.name);
        let total = rows.len() as i64;
        (rows, total)
    };
    let rows = project_fields(rows, &endpoint.response.fields);

    match endpoint.response.response_type {
        ResponseType::Single => {
            if rows.is_empty() {
                return Err(AppError::NotFound(format!("no row for endpoint '{}'", endpoint.name)));
            }
            if rows.len() > 1 {
                tracing::warn!(endpoint = %endpoint.name, rows = rows.len(), "SINGLE response matched more than one row, returning the first");
            }
            serde_json::to_value(&rows[0]).map_err(|e| AppError::Internal(e.into()))
        }
        ResponseType::List => serde_json::to_value(&rows).map_err(|e| AppError::Internal(e.into())),
        ResponseType::Paged => {
            let bounds = bind_pagination(endpoint, &query_params)?;
            let total_pages = if bounds.size == 0 {
                0
            } else {
                ((total_elements as f64) / f64::from(bounds.size)).ceil() as u32
            };
            let response = PagedResponse {
                data: rows,
                page: bounds.page,
                size: bounds.size,
                total_elements,
                total_pages,
                has_next: bounds.page + 1 < total_pages,
                has_previous: bounds.page > 0,
            };
            serde_json::to_value(&response).map_err(|e| AppError::Internal(e.into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{EndpointParam, PaginationConfig, ResponseConfig};

    fn param(name: &str, param_type: ParamType, required: bool, source: ParamSource) -> EndpointParam {
        EndpointParam {
            name: name.to_string(),
            param_type,
            required,
            default_value: None,
            source,
            description: String::new(),
        }
    }

    fn sample_endpoint() -> Endpoint {
        Endpoint {
            name: "e1".to_string(),
            path: "/things/{id}".to_string(),
            method: "GET".to_string(),
            description: String::new(),
            query: "q1".to_string(),
            count_query: None,
            pagination: PaginationConfig::default(),
            parameters: vec![param("id", ParamType::Integer, true, ParamSource::Path)],
            response: ResponseConfig::default(),
        }
    }

    #[test]
    fn missing_required_parameter_is_bad_request() {
        let endpoint = sample_endpoint();
        let result = bind_parameters(&endpoint, &HashMap::new(), &HashMap::new(), None);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn path_parameter_is_coerced() {
        let endpoint = sample_endpoint();
        let mut path_params = HashMap::new();
        path_params.insert("id".to_string(), "42".to_string());
        let bound = bind_parameters(&endpoint, &path_params, &HashMap::new(), None).expect("bind");
        assert_eq!(bound.get("id"), Some(&Value::from(42)));
    }

    #[test]
    fn pagination_rejects_negative_page() {
        let endpoint = sample_endpoint();
        let mut query_params = HashMap::new();
        query_params.insert("page".to_string(), "-1".to_string());
        assert!(bind_pagination(&endpoint, &query_params).is_err());
    }

    #[test]
    fn pagination_rejects_non_numeric_size() {
        let endpoint = sample_endpoint();
        let mut query_params = HashMap::new();
        query_params.insert("size".to_string(), "abc".to_string());
        assert!(bind_pagination(&endpoint, &query_params).is_err());
    }

    #[test]
    fn pagination_clamps_oversized_page_to_max() {
        let mut endpoint = sample_endpoint();
        endpoint.pagination.max_size = 100;
        let mut query_params = HashMap::new();
        query_params.insert("size".to_string(), "1000000".to_string());
        let bounds = bind_pagination(&endpoint, &query_params).expect("bind");
        assert_eq!(bounds.size, 100);
    }

    #[test]
    fn pagination_math_matches_spec_example() {
        let total_elements: i64 = 105;
        let size: u32 = 20;
        let total_pages = ((total_elements as f64) / f64::from(size)).ceil() as u32;
        assert_eq!(total_pages, 6);
        assert!(4 + 1 < total_pages);
        assert!(!(5 + 1 < total_pages));
    }
}
