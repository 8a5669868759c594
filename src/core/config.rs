//! Application configuration from environment variables.
//!
//! Load configuration using `Config::from_env()` after calling `dotenvy::dotenv()`.
//! Component settings (JWT, database pool, cache) live next to their
//! components and read their own variables; this struct holds the
//! process-level ones.

use std::net::SocketAddr;

use crate::core::auth::password::DEFAULT_BCRYPT_COST;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::Display)]
pub enum Environment {
    #[default]
    #[display("development")]
    Development,
    #[display("production")]
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        *self == Environment::Production
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,

    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,

    /// Allowed CORS origin
    pub frontend_url: String,

    pub bcrypt_cost: u32,

    /// Expired-session sweep period; 0 disables the sweeper
    pub sweep_interval_secs: u64,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` before this to load from `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port: u16 = parse_var("PORT", DEFAULT_PORT)?;
        let bind_addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "HOST",
                value: host,
            })?;

        Ok(Self {
            environment: var("APP_ENV")
                .map(|v| Environment::parse(&v))
                .unwrap_or_default(),
            bind_addr,
            frontend_url: var("FRONTEND_URL").unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            bcrypt_cost: parse_var("BCRYPT_COST", DEFAULT_BCRYPT_COST)?,
            sweep_interval_secs: parse_var("SESSION_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}
