//! Key-value backends for the session cache

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

/// Cache backend errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("Cache operation timed out")]
    Timeout,

    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache entry could not be (de)serialized: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Minimal string key-value contract needed by [`SessionCache`](super::SessionCache)
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Returns whether a key was removed
    async fn del(&self, key: &str) -> Result<bool, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

/// In-process backend with per-entry expiry
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.value().1 > Instant::now())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .map(|entry| (entry.value().0.clone(), entry.value().1));

        match value {
            Some((value, expires_at)) if expires_at > now => Some(value),
            Some(_) => {
                self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.live(key))
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let existed = self.live(key).is_some();
        self.entries.remove(key);
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.live(key).is_some())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
