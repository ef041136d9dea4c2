//! Runtime configuration.
//!
//! Defaults can be overridden from a JSON file or from environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default database file name.
pub const DEFAULT_DB_FILE: &str = "review-assigner.db";

/// Environment variable overriding [`AppConfig::database_path`].
pub const ENV_DB_PATH: &str = "REVIEW_ASSIGNER_DB_PATH";

/// Environment variable overriding [`AppConfig::max_connections`].
pub const ENV_MAX_CONNECTIONS: &str = "REVIEW_ASSIGNER_MAX_CONNECTIONS";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Upper bound on pooled connections.
    pub max_connections: u32,

    /// Connections kept open while idle.
    pub min_connections: u32,

    /// Seconds to wait for a free pooled connection.
    pub acquire_timeout_secs: u64,

    /// Seconds SQLite waits on a locked database before failing.
    pub busy_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DB_FILE),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
            busy_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file; missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides looked up through `lookup`.
    ///
    /// Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|p| !p.is_empty()) {
            self.database_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            match raw.parse::<u32>() {
                Ok(n) => self.max_connections = n,
                Err(e) => log::warn!("Ignoring {}={:?}: {}", ENV_MAX_CONNECTIONS, raw, e),
            }
        }
    }

    /// Reject settings the pool cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be at least 1".into()));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::Invalid(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.database_path, PathBuf::from(DEFAULT_DB_FILE));
    }

    #[test]
    fn test_overrides() {
        let env = HashMap::from([
            (ENV_DB_PATH, "/tmp/reviews.db"),
            (ENV_MAX_CONNECTIONS, "4"),
        ]);
        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database_path, PathBuf::from("/tmp/reviews.db"));
        assert_eq!(config.max_connections, 4);
    }

    #[test]
    fn test_bad_override_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(|k| (k == ENV_MAX_CONNECTIONS).then(|| "lots".to_string()));
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"database_path": "data/app.db", "max_connections": 3}"#).unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.database_path, PathBuf::from("data/app.db"));
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.busy_timeout_secs, 30);
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempdir().unwrap();
        let missing = AppConfig::from_file(&dir.path().join("absent.json"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));

        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_connections": "many"}"#).unwrap();
        let err = AppConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.json"));

        std::fs::write(&path, r#"{"max_connections": 0}"#).unwrap();
        let err = AppConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_invalid_pool_bounds_rejected() {
        let config = AppConfig {
            max_connections: 2,
            min_connections: 5,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = AppConfig {
            max_connections: 0,
            min_connections: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
