//! Configuration for reportflow.
//!
//! TOML-based, with global defaults and per-datasource overrides.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportflowConfig {
    /// Global defaults applied to all datasources unless overridden.
    pub defaults: GlobalDefaults,

    /// Per-datasource configuration overrides (keyed by datasource name).
    #[serde(default)]
    pub datasources: HashMap<String, DatasourceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GlobalDefaults {
    pub query: QueryConfig,
    pub schema_cache: SchemaCacheConfig,
    pub validation: ValidationConfig,
}

/// Query execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Query timeout in milliseconds (default: 30000). Enforced by the store
    /// client, not the compiler.
    pub timeout_ms: u64,
    /// Maximum rows to return (0 = unlimited).
    pub max_row_limit: u64,
    /// Default row limit when not specified in a report.
    pub default_row_limit: u64,
}

/// Schema cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchemaCacheConfig {
    /// Cache TTL in seconds (default: 3600).
    pub ttl_secs: u64,
    /// Maximum cached schemas (default: 1000).
    pub max_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ValidationConfig {
    /// Continue on validation errors (default: false).
    pub warn_only: bool,
}

/// Per-datasource configuration (can override globals).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasourceConfig {
    pub query: Option<QueryConfig>,
    pub schema_cache: Option<SchemaCacheConfig>,

    /// DuckDB-specific options.
    pub duckdb: Option<DuckDbConfig>,
}

/// DuckDB-specific configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DuckDbConfig {
    /// Maximum concurrent queries (default: 16).
    pub max_concurrency: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_row_limit: 0, // 0 = unlimited
            default_row_limit: 1000,
        }
    }
}

impl Default for SchemaCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_size: 1000,
        }
    }
}

impl Default for DuckDbConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
        }
    }
}

impl ReportflowConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ReportError::Config(format!("failed to read config file: {e}")))?;
        toml::from_str(&contents)
            .map_err(|e| ReportError::Config(format!("failed to parse config: {e}")))
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| ReportError::Config(format!("failed to parse config: {e}")))
    }

    /// Load from default locations (env var, cwd, user config dir, or defaults).
    ///
    /// Search order:
    /// 1. `REPORTFLOW_CONFIG` environment variable
    /// 2. `./reportflow.toml` (current directory)
    /// 3. `~/.config/reportflow/config.toml` (user config dir)
    /// 4. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("REPORTFLOW_CONFIG") {
            if let Ok(cfg) = Self::from_file(&path) {
                tracing::info!(path = %path, "loaded config from REPORTFLOW_CONFIG");
                return cfg;
            }
        }

        if let Ok(cfg) = Self::from_file("reportflow.toml") {
            tracing::info!("loaded config from ./reportflow.toml");
            return cfg;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("reportflow").join("config.toml");
            if let Ok(cfg) = Self::from_file(&user_config) {
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return cfg;
            }
        }

        tracing::debug!("no config file found, using defaults");
        Self::default()
    }

    /// Get resolved config for a specific datasource (merges global defaults).
    pub fn for_datasource(&self, name: &str) -> ResolvedDatasourceConfig {
        let ds_config = self.datasources.get(name);
        ResolvedDatasourceConfig::merge(&self.defaults, ds_config)
    }
}

/// Fully resolved configuration for a datasource (no Option fields).
#[derive(Debug, Clone)]
pub struct ResolvedDatasourceConfig {
    pub query: QueryConfig,
    pub schema_cache: SchemaCacheConfig,
    pub duckdb: DuckDbConfig,
}

impl ResolvedDatasourceConfig {
    fn merge(defaults: &GlobalDefaults, override_cfg: Option<&DatasourceConfig>) -> Self {
        match override_cfg {
            Some(ds) => Self {
                query: ds.query.clone().unwrap_or_else(|| defaults.query.clone()),
                schema_cache: ds
                    .schema_cache
                    .clone()
                    .unwrap_or_else(|| defaults.schema_cache.clone()),
                duckdb: ds.duckdb.clone().unwrap_or_default(),
            },
            None => Self {
                query: defaults.query.clone(),
                schema_cache: defaults.schema_cache.clone(),
                duckdb: DuckDbConfig::default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ReportflowConfig::default();
        assert_eq!(cfg.defaults.query.timeout_ms, 30_000);
        assert_eq!(cfg.defaults.schema_cache.ttl_secs, 3600);
        assert!(!cfg.defaults.validation.warn_only);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[defaults.query]
timeout_ms = 60000
max_row_limit = 50000

[datasources.analytics.duckdb]
max_concurrency = 4
"#;
        let cfg = ReportflowConfig::from_toml(toml).unwrap();
        assert_eq!(cfg.defaults.query.timeout_ms, 60_000);
        assert_eq!(cfg.defaults.query.max_row_limit, 50_000);

        let resolved = cfg.for_datasource("analytics");
        assert_eq!(resolved.duckdb.max_concurrency, 4);
    }

    #[test]
    fn test_datasource_override() {
        let toml = r#"
[defaults.schema_cache]
ttl_secs = 60

[datasources.prod.schema_cache]
ttl_secs = 7200
"#;
        let cfg = ReportflowConfig::from_toml(toml).unwrap();

        let default_resolved = cfg.for_datasource("unknown");
        assert_eq!(default_resolved.schema_cache.ttl_secs, 60);

        let prod_resolved = cfg.for_datasource("prod");
        assert_eq!(prod_resolved.schema_cache.ttl_secs, 7200);
    }
}
