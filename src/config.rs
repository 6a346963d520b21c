//! Service configuration, read once at startup and passed down explicitly.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_CONNECTOR_BASE_URL: &str = "https://api.fivetran.com";
pub const DEFAULT_UPLOAD_TABLE: &str = "sheet_upload";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("failed to load env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub database: Option<PathBuf>,
    /// Directory holding `<schema>.db` files attached per request.
    pub schema_dir: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Directory attached schemas are read from; falls back to the database's directory.
    pub fn schema_dir(&self) -> Option<PathBuf> {
        self.schema_dir.clone().or_else(|| {
            self.database
                .as_ref()
                .and_then(|db| db.parent())
                .map(|p| p.to_path_buf())
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database: DatabaseConfig,
    pub connector: ConnectorConfig,
    pub upload_table: String,
    /// When set, requests must present it in the `Authorization` header.
    pub secret_key: Option<String>,
}

impl AppConfig {
    /// Loads `env_file` (or `.env` when present) with override semantics,
    /// then reads the process environment.
    pub fn load(env_file: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        match env_file {
            Some(path) => {
                dotenvy::from_path_override(path)?;
            }
            None => {
                if let Err(e) = dotenvy::dotenv_override() {
                    if !e.not_found() {
                        return Err(e.into());
                    }
                }
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from a key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind.parse().map_err(|_| ConfigError::Invalid {
            key: "BIND_ADDR",
            value: bind.clone(),
        })?;

        let busy_timeout_ms = match get("SQL_BUSY_TIMEOUT_MS") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "SQL_BUSY_TIMEOUT_MS",
                value: v.clone(),
            })?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };

        let base_url = get("CONNECTOR_BASE_URL")
            .unwrap_or_else(|| DEFAULT_CONNECTOR_BASE_URL.to_string());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "CONNECTOR_BASE_URL",
                value: base_url,
            });
        }

        Ok(AppConfig {
            bind_addr,
            database: DatabaseConfig {
                database: get("SQL_DATABASE").map(PathBuf::from),
                schema_dir: get("SQL_SCHEMA_DIR").map(PathBuf::from),
                busy_timeout_ms,
            },
            connector: ConnectorConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
            },
            upload_table: get("UPLOAD_TABLE").unwrap_or_else(|| DEFAULT_UPLOAD_TABLE.to_string()),
            secret_key: get("XLWINGS_SECRET_KEY"),
        })
    }
}
