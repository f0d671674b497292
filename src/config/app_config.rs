//! Service bootstrap configuration (`cordal.toml`), independent of the
//! descriptor documents the registry loads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    #[default]
    Filesystem,
    Store,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSection {
    pub source: ConfigSource,
    pub directories: Vec<String>,
    pub patterns: PatternsSection,
    /// Required only when `source = "store"`.
    pub store_url: Option<String>,
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            source: ConfigSource::default(),
            directories: vec!["config".to_string()],
            patterns: PatternsSection::default(),
            store_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsSection {
    pub databases: Vec<String>,
    pub queries: Vec<String>,
    pub endpoints: Vec<String>,
}

impl Default for PatternsSection {
    fn default() -> Self {
        Self {
            databases: vec!["*-databases.yaml".to_string(), "*-databases.yml".to_string()],
            queries: vec!["*-queries.yaml".to_string(), "*-queries.yml".to_string()],
            endpoints: vec!["*-endpoints.yaml".to_string(), "*-endpoints.yml".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSection {
    pub run_on_startup: bool,
    pub validate_only: bool,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            run_on_startup: true,
            validate_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub default_ttl_seconds: u64,
    pub max_size: usize,
    pub cleanup_interval_seconds: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 300,
            max_size: 1000,
            cleanup_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub config: ConfigSection,
    pub validation: ValidationSection,
    pub cache: CacheSection,
    pub server: ServerSection,
}

impl AppConfig {
    /// Reads and parses `path` as TOML. Individual values may additionally be
    /// overridden by `CORDAL__SECTION__KEY`-shaped environment variables,
    /// applied after parsing (see `apply_env_overrides`).
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CORDAL__SERVER__HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CORDAL__SERVER__PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(store_url) = std::env::var("CORDAL__CONFIG__STORE_URL") {
            self.config.store_url = Some(store_url);
        }
    }

    /// Validates cross-field requirements that can't be expressed as a
    /// simple deserialize default (e.g. `store_url` is required only when
    /// the source is `store`).
    pub fn validate(&self) -> Result<(), String> {
        if matches!(self.config.source, ConfigSource::Store) && self.config.store_url.is_none() {
            return Err("config.store_url is required when config.source = \"store\"".to_string());
        }
        if self.config.directories.is_empty() && matches!(self.config.source, ConfigSource::Filesystem) {
            return Err("config.directories must not be empty for the filesystem source".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn store_source_without_url_fails_validation() {
        let mut config = AppConfig::default();
        config.config.source = ConfigSource::Store;
        assert!(config.validate().is_err());
    }
}
