//! Back-office configuration.
//!
//! Loaded from environment variables with development defaults.
//!
//! | Variable                    | Default                                |
//! |-----------------------------|----------------------------------------|
//! | `LAPTOPPOS_DB_PATH`         | `laptoppos.db`                         |
//! | `LAPTOPPOS_TENANT_ID`       | the built-in single-shop tenant        |
//! | `LAPTOPPOS_MAX_CONNECTIONS` | `5`                                    |
//! | `LAPTOPPOS_LOG`             | `info,laptoppos=debug,sqlx=warn`       |

use std::env;
use std::path::PathBuf;

use laptoppos_core::validation::validate_tenant_id;
use laptoppos_core::DEFAULT_TENANT_ID;
use serde::{Deserialize, Serialize};

use crate::logging::DEFAULT_LOG_FILTER;
use crate::pool::DbConfig;

pub const ENV_DB_PATH: &str = "LAPTOPPOS_DB_PATH";
pub const ENV_TENANT_ID: &str = "LAPTOPPOS_TENANT_ID";
pub const ENV_MAX_CONNECTIONS: &str = "LAPTOPPOS_MAX_CONNECTIONS";
pub const ENV_LOG: &str = "LAPTOPPOS_LOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite file, created on first connect.
    pub database_path: PathBuf,
    pub tenant_id: String,
    pub max_connections: u32,
    /// `tracing_subscriber::EnvFilter` directives. `RUST_LOG` wins when set.
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("laptoppos.db"),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            max_connections: 5,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();

        let database_path = match lookup(ENV_DB_PATH) {
            Some(path) if path.trim().is_empty() => {
                return Err(ConfigError::InvalidValue(ENV_DB_PATH.to_string()))
            }
            Some(path) => PathBuf::from(path),
            None => defaults.database_path,
        };

        let tenant_id = lookup(ENV_TENANT_ID).unwrap_or(defaults.tenant_id);
        validate_tenant_id(&tenant_id).map_err(|_| ConfigError::InvalidValue(ENV_TENANT_ID.to_string()))?;

        let max_connections = match lookup(ENV_MAX_CONNECTIONS) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::InvalidValue(ENV_MAX_CONNECTIONS.to_string()))?,
            None => defaults.max_connections,
        };

        let log_filter = lookup(ENV_LOG).unwrap_or(defaults.log_filter);

        Ok(AppConfig {
            database_path,
            tenant_id,
            max_connections,
            log_filter,
        })
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path).max_connections(self.max_connections)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
