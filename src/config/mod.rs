use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::api::rate_limit::Rate;

/// Environment variable that overrides `auth.jwt_secret`
pub const JWT_SECRET_ENV: &str = "STOREFRONT_JWT_SECRET";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file name, relative to `server.data_dir`
    #[serde(default = "default_db_filename")]
    pub filename: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            filename: default_db_filename(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_db_filename() -> String {
    "storefront.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign access and refresh tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Access token lifetime in seconds (default: 5 minutes)
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    /// Refresh token lifetime in seconds (default: 1 day)
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
    /// Staff account created on startup when it does not exist yet
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            access_token_lifetime: default_access_token_lifetime(),
            refresh_token_lifetime: default_refresh_token_lifetime(),
            admin_username: None,
            admin_password: None,
        }
    }
}

fn default_jwt_secret() -> String {
    // Random per process if not provided; tokens then do not survive restarts
    uuid::Uuid::new_v4().to_string()
}

fn default_access_token_lifetime() -> i64 {
    5 * 60
}

fn default_refresh_token_lifetime() -> i64 {
    24 * 60 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    /// Page size used when the client sends no `limit`. `None` disables
    /// pagination for such requests.
    #[serde(default)]
    pub default_limit: Option<i64>,
    #[serde(default = "default_max_limit")]
    pub max_limit: i64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: None,
            max_limit: default_max_limit(),
        }
    }
}

fn default_max_limit() -> i64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Rates per scope, e.g. `products = "60/minute"`
    #[serde(default = "default_throttle_rates")]
    pub rates: HashMap<String, String>,
    /// Seconds between pruning of idle request histories
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rates: default_throttle_rates(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_throttle_rates() -> HashMap<String, String> {
    [
        ("anon", "120/minute"),
        ("user", "600/minute"),
        ("products", "60/minute"),
        ("orders", "60/minute"),
    ]
    .into_iter()
    .map(|(scope, rate)| (scope.to_string(), rate.to_string()))
    .collect()
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lifetime of a cached page in seconds (default: 15 minutes)
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl(),
            cleanup_interval: default_cache_cleanup_interval(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    15 * 60
}

fn default_cache_cleanup_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
            if !secret.is_empty() {
                config.auth.jwt_secret = secret;
            }
        }

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.server.data_dir.join(&self.database.filename)
    }

    /// Check values that deserialize fine but cannot be served
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            bail!("auth.jwt_secret must not be empty");
        }
        if self.auth.access_token_lifetime <= 0 || self.auth.refresh_token_lifetime <= 0 {
            bail!("token lifetimes must be positive");
        }
        if self.pagination.max_limit <= 0 {
            bail!("pagination.max_limit must be positive");
        }
        if let Some(limit) = self.pagination.default_limit {
            if limit <= 0 {
                bail!("pagination.default_limit must be positive");
            }
        }
        for (scope, rate) in &self.throttle.rates {
            rate.parse::<Rate>()
                .with_context(|| format!("Invalid throttle rate for scope '{}'", scope))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.cache.ttl_seconds, 900);
        assert_eq!(config.auth.access_token_lifetime, 300);
        assert!(config.throttle.rates.contains_key("products"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9001

            [throttle.rates]
            orders = "5/m"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.throttle.rates.get("orders").unwrap(), "5/m");
        assert!(!config.throttle.rates.contains_key("anon"));
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_validate_rejects_bad_rate() {
        let config = Config::from_toml(
            r#"
            [throttle.rates]
            products = "lots"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = Config::default();
        config.pagination.default_limit = Some(0);
        assert!(config.validate().is_err());
    }
}
