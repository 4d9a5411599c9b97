use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_BATCH_SIZE, DEFAULT_COMMIT_TIMEOUT_MS,
    DEFAULT_CONCURRENCY, SQLITE_DB_FILENAME,
};

// =============================================================================
// Database Backend Enum
// =============================================================================

/// Event store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Memory,
    Sqlite,
}

impl fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseBackend::Memory => write!(f, "memory"),
            DatabaseBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

// =============================================================================
// File Config (JSON)
// =============================================================================

/// Database configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    /// Event store backend: memory (default) or sqlite
    pub backend: Option<DatabaseBackend>,
    /// SQLite database path, `~` expanded
    pub sqlite_path: Option<String>,
}

/// Processing configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProcessingFileConfig {
    pub commit_timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub batch_size: Option<usize>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub database: Option<DatabaseFileConfig>,
    pub processing: Option<ProcessingFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        // Database
        if let Some(database) = other.database {
            let current = self
                .database
                .get_or_insert_with(DatabaseFileConfig::default);
            if database.backend.is_some() {
                tracing::trace!(backend = ?database.backend, "Merging database.backend");
                current.backend = database.backend;
            }
            if database.sqlite_path.is_some() {
                tracing::trace!(sqlite_path = ?database.sqlite_path, "Merging database.sqlite_path");
                current.sqlite_path = database.sqlite_path;
            }
        }

        // Processing
        if let Some(processing) = other.processing {
            let current = self
                .processing
                .get_or_insert_with(ProcessingFileConfig::default);
            if processing.commit_timeout_ms.is_some() {
                tracing::trace!(commit_timeout_ms = ?processing.commit_timeout_ms, "Merging processing.commit_timeout_ms");
                current.commit_timeout_ms = processing.commit_timeout_ms;
            }
            if processing.concurrency.is_some() {
                tracing::trace!(concurrency = ?processing.concurrency, "Merging processing.concurrency");
                current.concurrency = processing.concurrency;
            }
            if processing.batch_size.is_some() {
                tracing::trace!(batch_size = ?processing.batch_size, "Merging processing.batch_size");
                current.batch_size = processing.batch_size;
            }
        }
    }
}

// =============================================================================
// Resolved Config
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub sqlite_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::default(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingConfig {
    pub commit_timeout_ms: u64,
    pub concurrency: usize,
    pub batch_size: usize,
}

impl ProcessingConfig {
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            commit_timeout_ms: DEFAULT_COMMIT_TIMEOUT_MS,
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub processing: ProcessingConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.agentwatch/agentwatch.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Profile dir - skip if not exists
        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        Self::resolve(file_config, cli)
    }

    /// Layer defaults -> file config -> CLI/env overrides
    fn resolve(file_config: FileConfig, cli: &CliConfig) -> Result<Self> {
        let file_database = file_config.database.unwrap_or_default();
        let file_processing = file_config.processing.unwrap_or_default();
        let defaults = Self::default();

        let database = DatabaseConfig {
            backend: cli
                .db_backend
                .or(file_database.backend)
                .unwrap_or(defaults.database.backend),
            sqlite_path: cli
                .sqlite_path
                .clone()
                .or(file_database.sqlite_path)
                .unwrap_or(defaults.database.sqlite_path),
        };

        let processing = ProcessingConfig {
            commit_timeout_ms: cli
                .commit_timeout_ms
                .or(file_processing.commit_timeout_ms)
                .unwrap_or(defaults.processing.commit_timeout_ms),
            concurrency: cli
                .concurrency
                .or(file_processing.concurrency)
                .unwrap_or(defaults.processing.concurrency),
            batch_size: cli
                .batch_size
                .or(file_processing.batch_size)
                .unwrap_or(defaults.processing.batch_size),
        };

        let config = Self {
            database,
            processing,
        };
        config.validate()?;

        tracing::debug!(
            backend = %config.database.backend,
            commit_timeout_ms = config.processing.commit_timeout_ms,
            concurrency = config.processing.concurrency,
            batch_size = config.processing.batch_size,
            "Configuration resolved"
        );
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.processing.concurrency == 0 {
            anyhow::bail!("Configuration error: processing.concurrency must be greater than 0");
        }
        if self.processing.batch_size == 0 {
            anyhow::bail!("Configuration error: processing.batch_size must be greater than 0");
        }
        if self.processing.commit_timeout_ms == 0 {
            anyhow::bail!(
                "Configuration error: processing.commit_timeout_ms must be greater than 0"
            );
        }
        if self.database.backend == DatabaseBackend::Sqlite
            && self.database.sqlite_path.trim().is_empty()
        {
            anyhow::bail!(
                "Configuration error: database.sqlite_path is required when database.backend is 'sqlite'"
            );
        }
        Ok(())
    }
}

/// Get the profile config path (~/.agentwatch/agentwatch.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

fn default_sqlite_path() -> String {
    format!("~/{}/{}", APP_DOT_FOLDER, SQLITE_DB_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_backend_serde() {
        let backend: DatabaseBackend = serde_json::from_str(r#""sqlite""#).unwrap();
        assert_eq!(backend, DatabaseBackend::Sqlite);
        let backend: DatabaseBackend = serde_json::from_str(r#""memory""#).unwrap();
        assert_eq!(backend, DatabaseBackend::Memory);
        assert!(serde_json::from_str::<DatabaseBackend>(r#""postgres""#).is_err());
    }

    #[test]
    fn test_database_backend_display() {
        assert_eq!(DatabaseBackend::Memory.to_string(), "memory");
        assert_eq!(DatabaseBackend::Sqlite.to_string(), "sqlite");
    }

    #[test]
    fn test_file_config_parse_full() {
        let json = r#"{
            "database": { "backend": "sqlite", "sqlite_path": "/tmp/aw.db" },
            "processing": { "commit_timeout_ms": 250, "concurrency": 8, "batch_size": 50 }
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        let database = config.database.as_ref().unwrap();
        assert_eq!(database.backend, Some(DatabaseBackend::Sqlite));
        assert_eq!(database.sqlite_path.as_deref(), Some("/tmp/aw.db"));
        let processing = config.processing.as_ref().unwrap();
        assert_eq!(processing.commit_timeout_ms, Some(250));
        assert_eq!(processing.concurrency, Some(8));
        assert_eq!(processing.batch_size, Some(50));
    }

    #[test]
    fn test_file_config_parse_extra_fields() {
        let json = r#"{ "processing": { "concurrency": 2 }, "unknown_field": 123 }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.extra.get("unknown_field").unwrap(), 123);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_file_config_merge() {
        let mut base: FileConfig = serde_json::from_str(
            r#"{ "database": { "backend": "sqlite", "sqlite_path": "/a.db" },
                 "processing": { "concurrency": 2 } }"#,
        )
        .unwrap();
        let overlay: FileConfig = serde_json::from_str(
            r#"{ "database": { "sqlite_path": "/b.db" }, "processing": { "batch_size": 10 } }"#,
        )
        .unwrap();
        base.merge(overlay);

        let database = base.database.unwrap();
        assert_eq!(database.backend, Some(DatabaseBackend::Sqlite));
        assert_eq!(database.sqlite_path.as_deref(), Some("/b.db"));
        let processing = base.processing.unwrap();
        assert_eq!(processing.concurrency, Some(2));
        assert_eq!(processing.batch_size, Some(10));
    }

    #[test]
    fn test_resolve_defaults() {
        let config = AppConfig::resolve(FileConfig::default(), &CliConfig::default()).unwrap();
        assert_eq!(config.database.backend, DatabaseBackend::Memory);
        assert!(config.database.sqlite_path.ends_with(SQLITE_DB_FILENAME));
        assert_eq!(config.processing.commit_timeout_ms, DEFAULT_COMMIT_TIMEOUT_MS);
        assert_eq!(config.processing.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.processing.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(
            config.processing.commit_timeout(),
            Duration::from_millis(DEFAULT_COMMIT_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_resolve_cli_overrides_file() {
        let file: FileConfig = serde_json::from_str(
            r#"{ "database": { "backend": "sqlite" }, "processing": { "concurrency": 2, "batch_size": 10 } }"#,
        )
        .unwrap();
        let cli = CliConfig {
            db_backend: Some(DatabaseBackend::Memory),
            concurrency: Some(16),
            ..Default::default()
        };
        let config = AppConfig::resolve(file, &cli).unwrap();
        assert_eq!(config.database.backend, DatabaseBackend::Memory);
        assert_eq!(config.processing.concurrency, 16);
        assert_eq!(config.processing.batch_size, 10);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        for cli in [
            CliConfig {
                concurrency: Some(0),
                ..Default::default()
            },
            CliConfig {
                batch_size: Some(0),
                ..Default::default()
            },
            CliConfig {
                commit_timeout_ms: Some(0),
                ..Default::default()
            },
        ] {
            assert!(AppConfig::resolve(FileConfig::default(), &cli).is_err());
        }
    }

    #[test]
    fn test_validation_requires_sqlite_path() {
        let cli = CliConfig {
            db_backend: Some(DatabaseBackend::Sqlite),
            sqlite_path: Some("  ".to_string()),
            ..Default::default()
        };
        let err = AppConfig::resolve(FileConfig::default(), &cli).unwrap_err();
        assert!(err.to_string().contains("database.sqlite_path"));
    }

    #[test]
    fn test_load_missing_config_file_fails() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/nonexistent/agentwatch.json")),
            ..Default::default()
        };
        assert!(AppConfig::load(&cli).is_err());
    }

    #[test]
    fn test_load_explicit_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(
            &path,
            r#"{ "processing": { "commit_timeout_ms": 750 }, "typo": true }"#,
        )
        .unwrap();
        let cli = CliConfig {
            config: Some(path),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.processing.commit_timeout_ms, 750);
    }
}
