//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Connection settings for the backend record store.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub admin_email: String,
    pub admin_password: String,
    /// Auth collection the service account logs in against.
    pub auth_collection: String,
    pub timeout: Duration,
    pub token_max_age: Duration,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub backend: BackendConfig,
    /// When set, mutating endpoints require a matching `X-Api-Key` header.
    pub shared_secret: Option<String>,
    pub link_page_size: u32,
    pub cors_origin: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server Settings ---
        let bind_address_str = get("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8000".to_string());
        let mut bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;
        if let Some(port) = get("API_PORT") {
            let port = port.parse::<u16>().map_err(|e| {
                ConfigError::InvalidValue("API_PORT".to_string(), e.to_string())
            })?;
            bind_address.set_port(port);
        }

        let log_level_str = get("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Backend Settings ---
        let base_url = get("PB_BASE")
            .unwrap_or_else(|| "http://127.0.0.1:8090".to_string())
            .trim_end_matches('/')
            .to_string();
        let admin_email =
            get("PB_ADMIN_EMAIL").ok_or_else(|| ConfigError::MissingVar("PB_ADMIN_EMAIL".to_string()))?;
        let admin_password = get("PB_ADMIN_PASSWORD")
            .ok_or_else(|| ConfigError::MissingVar("PB_ADMIN_PASSWORD".to_string()))?;
        let auth_collection =
            get("PB_AUTH_COLLECTION").unwrap_or_else(|| "_superusers".to_string());
        let timeout = Duration::from_secs(parse_or(&get, "BACKEND_TIMEOUT_SECS", 10)?);
        let token_max_age = Duration::from_secs(parse_or(&get, "TOKEN_MAX_AGE_SECS", 3600)?);

        // --- API Settings ---
        let shared_secret = get("API_SHARED_SECRET").filter(|s| !s.is_empty());
        let link_page_size = parse_or(&get, "LINK_PAGE_SIZE", 500u32)?;
        let cors_origin = get("CORS_ORIGIN").filter(|s| !s.is_empty());

        Ok(Self {
            bind_address,
            log_level,
            backend: BackendConfig {
                base_url,
                admin_email,
                admin_password,
                auth_collection,
                timeout,
                token_max_age,
            },
            shared_secret,
            link_page_size,
            cors_origin,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
