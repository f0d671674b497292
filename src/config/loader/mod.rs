//! Pluggable descriptor sources behind a single contract.

pub mod filesystem;
pub mod store;

use crate::config::model::{Database, Endpoint, Query};
use crate::error::{AppError, ConfigErrorKind};
use async_trait::async_trait;
use std::collections::HashMap;

pub use filesystem::FilesystemLoader;
pub use store::StoreLoader;

/// Identifies which backing source a registry was built from. Drives the
/// management surface's write-availability check (store-only) and the
/// migration engine's direction labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Filesystem,
    Store,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SourceKind::Filesystem => "filesystem",
            SourceKind::Store => "store",
        })
    }
}

/// Common contract implemented by both the filesystem and store-backed loaders.
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn load_databases(&self) -> Result<HashMap<String, Database>, AppError>;
    async fn load_queries(&self) -> Result<HashMap<String, Query>, AppError>;
    async fn load_endpoints(&self) -> Result<HashMap<String, Endpoint>, AppError>;
}

pub(crate) fn config_error(
    kind: ConfigErrorKind,
    path: impl Into<String>,
    message: impl Into<String>,
) -> AppError {
    AppError::ConfigError {
        kind,
        path: path.into(),
        message: message.into(),
    }
}
