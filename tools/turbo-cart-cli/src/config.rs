//! CLI configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use turbo_cart::{EngineConfig, StoreConfig};
use turbo_db::DbConfig;
use turbo_session::{SessionConfig, DEFAULT_SESSION_TTL_SECS};

/// CLI configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Database connection.
    #[serde(default = "default_database")]
    pub database: DbConfig,

    /// Where guest sessions are kept between runs.
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Reconciliation engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Durable store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_database() -> DbConfig {
    DbConfig::file("turbo-cart.db")
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            session: SessionFileConfig::default(),
            engine: EngineConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Self = if path.ends_with(".json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))?
        };

        config
            .engine
            .validate()
            .with_context(|| format!("Invalid engine settings in {}", path))?;
        Ok(config)
    }
}

/// Session file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFileConfig {
    /// JSON file holding the session store.
    #[serde(default = "default_session_file")]
    pub file: PathBuf,

    /// Seconds of inactivity before a session reads as absent.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_session_file() -> PathBuf {
    PathBuf::from(".turbo-cart").join("sessions.json")
}

fn default_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            file: default_session_file(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl SessionFileConfig {
    /// Session lifetime settings for the store.
    pub fn lifetime(&self) -> SessionConfig {
        SessionConfig {
            ttl_secs: self.ttl_secs,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Generate a default turbo-cart.toml config file.
pub fn generate_default_config() -> String {
    format!(
        r#"# Turbo Cart configuration

[database]
path = "turbo-cart.db"
busy_timeout_ms = 5000
journal_mode = "wal"

[session]
file = ".turbo-cart/sessions.json"
ttl_secs = {ttl}

[engine]
max_attempts = 3
retry_backoff_ms = 0
currency = "USD"

[store]
# Turn off to open a database that still holds duplicate open carts
enforce_single_open_cart = true

[logging]
level = "warn"
format = "compact"
"#,
        ttl = DEFAULT_SESSION_TTL_SECS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_parses() {
        let config: CliConfig = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.database.path, Some(PathBuf::from("turbo-cart.db")));
        assert_eq!(config.engine.max_attempts, 3);
        assert!(config.store.enforce_single_open_cart);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config.database.path, Some(PathBuf::from("turbo-cart.db")));
        assert_eq!(config.session.ttl_secs, DEFAULT_SESSION_TTL_SECS);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turbo-cart.toml");
        std::fs::write(&path, "[engine]\nmax_attempts = 0\n").unwrap();
        assert!(CliConfig::load(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turbo-cart.json");
        std::fs::write(&path, r#"{"engine": {"currency": "EUR"}}"#).unwrap();
        let config = CliConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.engine.currency, turbo_cart::Currency::EUR);
    }
}
