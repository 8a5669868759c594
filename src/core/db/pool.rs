//! PostgreSQL pool backing the user and session repositories
//!
//! Settings come from the environment:
//! - `DATABASE_URL` (required)
//! - `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS`
//! - `DB_ACQUIRE_TIMEOUT_SECS`, `DB_IDLE_TIMEOUT_SECS`

use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a query waits for a free connection
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl DbConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
        }
    }

    pub fn from_env() -> Result<Self, DbError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DbError> {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = lookup("DATABASE_URL").ok_or(DbError::MissingDatabaseUrl)?;
        let defaults = Self::new(database_url);

        let number = |key: &'static str, default: u64| match lookup(key) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|_| DbError::InvalidSetting { key, value }),
            None => Ok(default),
        };

        let max_connections = number("DB_MAX_CONNECTIONS", defaults.max_connections.into())?;
        let min_connections = number("DB_MIN_CONNECTIONS", defaults.min_connections.into())?;
        if max_connections == 0 || min_connections > max_connections {
            return Err(DbError::InvalidSetting {
                key: "DB_MIN_CONNECTIONS",
                value: format!("{} (max {})", min_connections, max_connections),
            });
        }

        let pool_size = |key: &'static str, value: u64| {
            u32::try_from(value).map_err(|_| DbError::InvalidSetting {
                key,
                value: value.to_string(),
            })
        };

        Ok(Self {
            max_connections: pool_size("DB_MAX_CONNECTIONS", max_connections)?,
            min_connections: pool_size("DB_MIN_CONNECTIONS", min_connections)?,
            acquire_timeout: Duration::from_secs(number(
                "DB_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout.as_secs(),
            )?),
            idle_timeout: Duration::from_secs(number(
                "DB_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )?),
            ..defaults
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,

    #[error("Invalid value for {key}: {value}")]
    InvalidSetting { key: &'static str, value: String },

    #[error("Failed to connect to database: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Failed to run migrations: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}

/// Connect and bring the schema up to date
pub async fn create_pool_with_migrations(config: &DbConfig) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!(
        "Database ready (pool {}..{})",
        config.min_connections,
        config.max_connections
    );

    Ok(pool)
}

/// Round-trip a trivial query; used by `/health`
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<DbConfig, DbError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DbConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/tokengate")]).unwrap();

        assert_eq!(config.database_url, "postgres://localhost/tokengate");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/tokengate"),
            ("DB_MAX_CONNECTIONS", "20"),
            ("DB_MIN_CONNECTIONS", "5"),
            ("DB_ACQUIRE_TIMEOUT_SECS", "2"),
            ("DB_IDLE_TIMEOUT_SECS", "60"),
        ])
        .unwrap();

        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.acquire_timeout, Duration::from_secs(2));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_url() {
        assert!(matches!(config_from(&[]), Err(DbError::MissingDatabaseUrl)));
        assert!(matches!(
            config_from(&[("DATABASE_URL", "  ")]),
            Err(DbError::MissingDatabaseUrl)
        ));
    }

    #[test]
    fn test_invalid_settings() {
        let url = ("DATABASE_URL", "postgres://localhost/tokengate");

        assert!(matches!(
            config_from(&[url, ("DB_MAX_CONNECTIONS", "many")]),
            Err(DbError::InvalidSetting {
                key: "DB_MAX_CONNECTIONS",
                ..
            })
        ));
        assert!(matches!(
            config_from(&[url, ("DB_MAX_CONNECTIONS", "2"), ("DB_MIN_CONNECTIONS", "3")]),
            Err(DbError::InvalidSetting { .. })
        ));
        assert!(config_from(&[url, ("DB_MAX_CONNECTIONS", "0")]).is_err());
    }

    #[tokio::test]
    async fn test_health_check_fails_without_server() {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://tokengate@127.0.0.1:1/tokengate")
            .unwrap();

        assert!(health_check(&pool).await.is_err());
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_create_pool_with_migrations_and_health_check() {
        let config = DbConfig::from_env().expect("DATABASE_URL must be set");
        let pool = create_pool_with_migrations(&config)
            .await
            .expect("Failed to create pool");

        assert!(health_check(&pool).await.is_ok());
    }
}
