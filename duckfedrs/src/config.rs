//! Configuration system for duckfed.
//!
//! TOML-based configuration with one section per engine component. Every field has a
//! default, so an empty file (or no file at all) yields a working engine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DuckfedError, Result};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DuckfedConfig {
    pub compiler: CompilerConfig,
    pub detector: DetectorConfig,
    pub duckdb: DuckDbConfig,
    pub metadata_cache: MetadataCacheConfig,
}

/// Visual query compiler options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// LIMIT applied when the configuration does not set one (0 = no limit).
    pub default_limit: u64,
    /// Emit the `-- duckfed visual query` comment header (default: true).
    pub emit_header: bool,
    /// Target type of the automatic cast wrapped around non-numeric aggregation inputs.
    pub numeric_cast_type: String,
}

/// Federated query detector options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Debounce delay in milliseconds before re-parsing (0 = parse inline).
    pub debounce_ms: u64,
    /// Schema prefixes that always resolve to the local engine.
    pub local_schemas: Vec<String>,
}

/// DuckDB backend options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DuckDbConfig {
    /// Database file path (default: in-memory).
    pub path: String,
    /// Maximum concurrent queries (default: 16).
    pub max_concurrency: usize,
}

/// Column metadata cache options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetadataCacheConfig {
    /// Cache TTL in seconds (default: 3600).
    pub ttl_secs: u64,
    /// Maximum cached tables (default: 1000).
    pub max_size: usize,
}

// Default implementations

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_limit: 1000,
            emit_header: true,
            numeric_cast_type: "DECIMAL".to_string(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            local_schemas: [
                "main",
                "temp",
                "memory",
                "system",
                "information_schema",
                "pg_catalog",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Default for DuckDbConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            max_concurrency: 16,
        }
    }
}

impl Default for MetadataCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_size: 1000,
        }
    }
}

impl DuckfedConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DuckfedError::Config(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| DuckfedError::Config(format!("failed to parse config: {e}")))
    }

    /// Load from default locations (env var, cwd, user config dir, or defaults).
    ///
    /// Search order:
    /// 1. `DUCKFED_CONFIG` environment variable
    /// 2. `./duckfed.toml` (current directory)
    /// 3. `~/.config/duckfed/config.toml` (user config dir)
    /// 4. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("DUCKFED_CONFIG") {
            match Self::from_file(&path) {
                Ok(cfg) => {
                    tracing::info!(path = %path, "loaded config from DUCKFED_CONFIG");
                    return cfg;
                }
                Err(e) => tracing::warn!(path = %path, error = %e, "ignoring DUCKFED_CONFIG"),
            }
        }

        if let Ok(cfg) = Self::from_file("duckfed.toml") {
            tracing::info!("loaded config from ./duckfed.toml");
            return cfg;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("duckfed").join("config.toml");
            if let Ok(cfg) = Self::from_file(&user_config) {
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return cfg;
            }
        }

        tracing::debug!("no config file found, using defaults");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = DuckfedConfig::default();
        assert_eq!(cfg.compiler.default_limit, 1000);
        assert!(cfg.compiler.emit_header);
        assert_eq!(cfg.compiler.numeric_cast_type, "DECIMAL");
        assert_eq!(cfg.detector.debounce_ms, 300);
        assert!(cfg.detector.local_schemas.contains(&"main".to_string()));
        assert_eq!(cfg.duckdb.max_concurrency, 16);
        assert_eq!(cfg.metadata_cache.ttl_secs, 3600);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[compiler]
default_limit = 250
emit_header = false

[detector]
debounce_ms = 50
local_schemas = ["main", "staging"]

[duckdb]
path = "analytics.duckdb"
max_concurrency = 4
"#;
        let cfg = DuckfedConfig::from_toml(toml).unwrap();
        assert_eq!(cfg.compiler.default_limit, 250);
        assert!(!cfg.compiler.emit_header);
        // untouched fields keep their defaults
        assert_eq!(cfg.compiler.numeric_cast_type, "DECIMAL");
        assert_eq!(cfg.detector.debounce_ms, 50);
        assert_eq!(cfg.detector.local_schemas, vec!["main", "staging"]);
        assert_eq!(cfg.duckdb.path, "analytics.duckdb");
        assert_eq!(cfg.duckdb.max_concurrency, 4);
        assert_eq!(cfg.metadata_cache.max_size, 1000);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = DuckfedConfig::from_toml("[compiler\ndefault_limit = ").unwrap_err();
        assert!(matches!(err, DuckfedError::Config(_)));
    }
}
