//! Top-level error type for the service.
//!
//! Every fallible operation in the crate eventually surfaces as an
//! [`AppError`], which knows how to render itself as an HTTP response at
//! the boundary (see the `IntoResponse` impl below).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("query '{query_name}' failed: {cause}")]
    ExecError {
        query_name: String,
        cause: String,
    },

    #[error("config error ({kind}) at {path}: {message}")]
    ConfigError {
        kind: ConfigErrorKind,
        path: String,
        message: String,
    },

    #[error("health check failed: {0}")]
    HealthError(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    NotFound,
    Parse,
    ReferentialIntegrity,
    DuplicateName,
    Empty,
    Io,
}

impl std::fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfigErrorKind::NotFound => "not_found",
            ConfigErrorKind::Parse => "parse",
            ConfigErrorKind::ReferentialIntegrity => "referential_integrity",
            ConfigErrorKind::DuplicateName => "duplicate_name",
            ConfigErrorKind::Empty => "empty",
            ConfigErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::IllegalState(_) => "illegal_state",
            AppError::ExecError { .. } => "exec_error",
            AppError::ConfigError { .. } => "config_error",
            AppError::HealthError(_) => "health_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::IllegalState(_) => StatusCode::CONFLICT,
            AppError::ExecError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ConfigError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::HealthError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind(),
                message: self.to_string(),
            },
        };
        tracing::warn!(status = %status, kind = body.error.kind, "request failed");
        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
