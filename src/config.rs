use crate::core::{DbError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Immutable configuration bundle for the database layer.
///
/// Constructed once at startup and never mutated afterwards; the connection
/// manager takes ownership and only ever reads it. `database` is the SQLite
/// file path (or `:memory:`). `host`, `user` and `password` exist so the same
/// configuration surface works for networked deployments; the embedded driver
/// ignores them.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database file path, or ":memory:" for an in-memory database
    pub database: String,
    /// Character encoding applied on connect when `force_encoding` is set
    pub encoding: Option<String>,
    /// Prefix substituted into `{table}` markers before preparation
    #[serde(default)]
    pub table_prefix: String,
    /// Apply the encoding pragma on every fresh connection
    #[serde(default)]
    pub force_encoding: bool,
    /// Kept for parity with networked drivers; the embedded backend holds the
    /// handle for the manager's lifetime either way
    #[serde(default)]
    pub persistent: bool,
    /// Surface typed errors to the caller instead of reporting and halting
    #[serde(default)]
    pub throw_on_error: bool,
}

impl Config {
    /// Creates a configuration for the given database path with all optional
    /// settings at their defaults (empty prefix, terminate-on-error policy).
    pub fn new(database: impl Into<String>) -> Self {
        Config {
            host: None,
            user: None,
            password: None,
            database: database.into(),
            encoding: None,
            table_prefix: String::new(),
            force_encoding: false,
            persistent: false,
            throw_on_error: false,
        }
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// Unreadable or malformed files map to `DbError::Usage`: a broken config is
/// a caller problem, not a driver one.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)
        .map_err(|e| DbError::Usage(format!("failed to read config file: {e}")))?;
    toml::from_str(&content).map_err(|e| DbError::Usage(format!("failed to parse config: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CONFIG: &str = r#"
database = "support.db"
encoding = "UTF-8"
table_prefix = "chat_"
force_encoding = true
persistent = true
throw_on_error = true
"#;

    #[test]
    fn test_load_config_from_str() {
        let config: Config = toml::from_str(SAMPLE_CONFIG).expect("Failed to parse sample config");
        assert_eq!(config.database, "support.db");
        assert_eq!(config.encoding.as_deref(), Some("UTF-8"));
        assert_eq!(config.table_prefix, "chat_");
        assert!(config.force_encoding);
        assert!(config.persistent);
        assert!(config.throw_on_error);
        assert_eq!(config.host, None);
    }

    #[test]
    fn test_defaults_are_off() {
        let config: Config = toml::from_str(r#"database = ":memory:""#).unwrap();
        assert_eq!(config.table_prefix, "");
        assert!(!config.force_encoding);
        assert!(!config.persistent);
        assert!(!config.throw_on_error);
    }

    #[test]
    fn test_malformed_config_is_usage_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "database = ").unwrap();
        match load_config(file.path()).unwrap_err() {
            DbError::Usage(_) => {}
            other => panic!("Expected Usage error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_config_is_usage_error() {
        match load_config("/nonexistent/chatdb.toml").unwrap_err() {
            DbError::Usage(_) => {}
            other => panic!("Expected Usage error, got {other:?}"),
        }
    }
}
