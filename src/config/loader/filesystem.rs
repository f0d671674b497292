//! Filesystem-backed config loader.
//!
//! Enumerates regular files under configured directories matching configured
//! glob patterns, in lexicographic order, and parses each as a
//! single-top-level-key mapping document (YAML or JSON, chosen by extension).

use super::{config_error, ConfigLoader, SourceKind};
use crate::config::model::{Database, DatabasesDocument, Endpoint, EndpointsDocument, Query, QueriesDocument};
use crate::error::{AppError, ConfigErrorKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FilesystemLoaderConfig {
    pub directories: Vec<PathBuf>,
    pub database_patterns: Vec<String>,
    pub query_patterns: Vec<String>,
    pub endpoint_patterns: Vec<String>,
}

pub struct FilesystemLoader {
    config: FilesystemLoaderConfig,
}

impl FilesystemLoader {
    #[must_use]
    pub fn new(config: FilesystemLoaderConfig) -> Self {
        Self { config }
    }

    fn matching_files(&self, patterns: &[String]) -> Result<Vec<PathBuf>, AppError> {
        let mut files = Vec::new();
        for dir in &self.config.directories {
            for pattern in patterns {
                let full_pattern = dir.join(pattern);
                let full_pattern = full_pattern.to_string_lossy().into_owned();
                let matches = glob::glob(&full_pattern).map_err(|e| {
                    config_error(ConfigErrorKind::Io, full_pattern.clone(), e.to_string())
                })?;
                for entry in matches {
                    let path = entry.map_err(|e| {
                        config_error(ConfigErrorKind::Io, dir.display().to_string(), e.to_string())
                    })?;
                    if path.is_file() {
                        files.push(path);
                    }
                }
            }
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AppError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            config_error(ConfigErrorKind::Io, path.display().to_string(), e.to_string())
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            serde_json::from_str(&contents).map_err(|e| {
                config_error(ConfigErrorKind::Parse, path.display().to_string(), e.to_string())
            })
        } else {
            serde_yaml::from_str(&contents).map_err(|e| {
                config_error(ConfigErrorKind::Parse, path.display().to_string(), e.to_string())
            })
        }
    }
}

#[async_trait]
impl ConfigLoader for FilesystemLoader {
    fn kind(&self) -> SourceKind {
        SourceKind::Filesystem
    }

    async fn load_databases(&self) -> Result<HashMap<String, Database>, AppError> {
        let files = self.matching_files(&self.config.database_patterns)?;
        let mut result = HashMap::new();
        for path in &files {
            let doc: DatabasesDocument = match Self::read_document(path) {
                Ok(doc) => doc,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable database file");
                    continue;
                }
            };
            for (name, mut database) in doc.databases {
                database.url = crate::config::env::substitute(&database.url);
                if result.contains_key(&name) {
                    tracing::warn!(name, path = %path.display(), "duplicate database descriptor, keeping first definition");
                    continue;
                }
                result.insert(name, database);
            }
        }
        if result.is_empty() {
            return Err(config_error(
                ConfigErrorKind::Empty,
                "<database files>",
                "no valid database descriptors found",
            ));
        }
        Ok(result)
    }

    async fn load_queries(&self) -> Result<HashMap<String, Query>, AppError> {
        let files = self.matching_files(&self.config.query_patterns)?;
        if files.is_empty() {
            return Err(config_error(ConfigErrorKind::NotFound, "<query files>", "no query files found"));
        }
        let mut result = HashMap::new();
        let mut first_seen_in: HashMap<String, PathBuf> = HashMap::new();
        for path in &files {
            let doc: QueriesDocument = Self::read_document(path)?;
            for (name, query) in doc.queries {
                if let Some(first_path) = first_seen_in.get(&name) {
                    return Err(config_error(
                        ConfigErrorKind::DuplicateName,
                        path.display().to_string(),
                        format!(
                            "duplicate query name '{name}' defined in both {} and {}",
                            first_path.display(),
                            path.display()
                        ),
                    ));
                }
                first_seen_in.insert(name.clone(), path.clone());
                result.insert(name, query);
            }
        }
        Ok(result)
    }

    async fn load_endpoints(&self) -> Result<HashMap<String, Endpoint>, AppError> {
        let files = self.matching_files(&self.config.endpoint_patterns)?;
        if files.is_empty() {
            return Err(config_error(ConfigErrorKind::NotFound, "<endpoint files>", "no endpoint files found"));
        }
        let mut result = HashMap::new();
        let mut first_seen_in: HashMap<String, PathBuf> = HashMap::new();
        for path in &files {
            let doc: EndpointsDocument = Self::read_document(path)?;
            for (name, endpoint) in doc.endpoints {
                if let Some(first_path) = first_seen_in.get(&name) {
                    return Err(config_error(
                        ConfigErrorKind::DuplicateName,
                        path.display().to_string(),
                        format!(
                            "duplicate endpoint name '{name}' defined in both {} and {}",
                            first_path.display(),
                            path.display()
                        ),
                    ));
                }
                first_seen_in.insert(name.clone(), path.clone());
                result.insert(name, endpoint);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).expect("create fixture file");
        f.write_all(contents.as_bytes()).expect("write fixture file");
        path
    }

    #[tokio::test]
    async fn loads_databases_from_yaml() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(
            dir.path(),
            "databases.yaml",
            "databases:\n  main:\n    driver: postgres\n    url: \"postgres://localhost/app\"\n",
        );
        let loader = FilesystemLoader::new(FilesystemLoaderConfig {
            directories: vec![dir.path().to_path_buf()],
            database_patterns: vec!["*.yaml".to_string()],
            query_patterns: vec![],
            endpoint_patterns: vec![],
        });
        let databases = loader.load_databases().await.expect("load");
        assert!(databases.contains_key("main"));
    }

    #[tokio::test]
    async fn duplicate_query_name_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(
            dir.path(),
            "a.yaml",
            "queries:\n  q1:\n    sql: \"SELECT 1\"\n    database: main\n",
        );
        write_file(
            dir.path(),
            "b.yaml",
            "queries:\n  q1:\n    sql: \"SELECT 2\"\n    database: main\n",
        );
        let loader = FilesystemLoader::new(FilesystemLoaderConfig {
            directories: vec![dir.path().to_path_buf()],
            database_patterns: vec![],
            query_patterns: vec!["*.yaml".to_string()],
            endpoint_patterns: vec![],
        });
        let result = loader.load_queries().await;
        assert!(result.is_err());
    }
}
