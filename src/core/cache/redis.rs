//! Redis cache backend
//!
//! The connection is established lazily on first use and re-established after
//! it has been dropped, so the service starts even when Redis is down.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;

use crate::core::cache::backend::{CacheBackend, CacheError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            CacheError::Unavailable(err.to_string())
        } else {
            CacheError::Backend(err.to_string())
        }
    }
}

pub struct RedisBackend {
    client: redis::Client,
    connection: RwLock<Option<ConnectionManager>>,
}

impl RedisBackend {
    /// Validate the URL without connecting
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut slot = self.connection.write().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(self.client.clone()))
            .await
            .map_err(|_| CacheError::Timeout)??;

        tracing::info!("Connected to Redis");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Forget the connection so the next call reconnects
    async fn reset_on_unavailable<T>(&self, result: Result<T, CacheError>) -> Result<T, CacheError> {
        if let Err(CacheError::Unavailable(_)) = &result {
            self.connection.write().await.take();
        }
        result
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let result = conn
            .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(CacheError::from);
        self.reset_on_unavailable(result).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let result = conn
            .get::<_, Option<String>>(key)
            .await
            .map_err(CacheError::from);
        self.reset_on_unavailable(result).await
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let result = conn
            .del::<_, u64>(key)
            .await
            .map(|removed| removed > 0)
            .map_err(CacheError::from);
        self.reset_on_unavailable(result).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let result = conn
            .exists::<_, bool>(key)
            .await
            .map_err(CacheError::from);
        self.reset_on_unavailable(result).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let result = redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(CacheError::from);
        self.reset_on_unavailable(result).await
    }
}
