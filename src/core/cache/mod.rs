//! Best-effort session cache
//!
//! Mirrors the latest refresh session of each user so the refresh path can skip
//! the database. The cache is never authoritative: every failure is absorbed
//! here and reported to callers as "not cached", which makes them fall back to
//! the session store.

pub mod backend;
pub mod health;
pub mod redis;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::core::db::models::RefreshSession;

pub use backend::{CacheBackend, CacheError, MemoryBackend};
pub use health::{CacheHealth, CacheState};
pub use self::redis::RedisBackend;
pub use retry::RetryPolicy;

/// Session cache configuration
#[derive(Debug, Clone)]
pub struct SessionCacheConfig {
    /// Redis URL; `None` disables the cache
    pub redis_url: Option<String>,
    pub retry: RetryPolicy,
    pub failure_threshold: u32,
    pub probe_interval: Duration,
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            retry: RetryPolicy::default(),
            failure_threshold: 3,
            probe_interval: Duration::from_secs(30),
        }
    }
}

impl SessionCacheConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            retry: RetryPolicy::from_env(),
            failure_threshold: std::env::var("CACHE_FAILURE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.failure_threshold),
            probe_interval: std::env::var("CACHE_PROBE_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.probe_interval),
        }
    }

    pub fn health(&self) -> CacheHealth {
        CacheHealth::new(self.failure_threshold, self.probe_interval)
    }
}

#[derive(Clone)]
pub struct SessionCache {
    backend: Option<Arc<dyn CacheBackend>>,
    health: Arc<CacheHealth>,
    policy: RetryPolicy,
    ttl: Duration,
}

impl SessionCache {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        health: CacheHealth,
        policy: RetryPolicy,
        ttl: Duration,
    ) -> Self {
        Self {
            backend: Some(backend),
            health: Arc::new(health),
            policy,
            ttl,
        }
    }

    /// A cache that stores nothing; every lookup misses
    pub fn disabled() -> Self {
        Self {
            backend: None,
            health: Arc::new(CacheHealth::default()),
            policy: RetryPolicy::default(),
            ttl: Duration::ZERO,
        }
    }

    /// Build from configuration, disabled when no Redis URL is set or it is unusable
    pub fn from_config(config: &SessionCacheConfig, ttl: Duration) -> Self {
        let Some(url) = config.redis_url.as_deref() else {
            tracing::info!("REDIS_URL not set, session cache disabled");
            return Self::disabled();
        };

        match RedisBackend::new(url) {
            Ok(backend) => Self::new(Arc::new(backend), config.health(), config.retry, ttl),
            Err(e) => {
                tracing::warn!("Invalid REDIS_URL, session cache disabled: {}", e);
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn health(&self) -> &CacheHealth {
        &self.health
    }

    pub fn key(user_id: Uuid) -> String {
        format!("session:{}", user_id)
    }

    async fn execute<T, F, Fut>(&self, name: &str, op: F) -> Option<T>
    where
        F: Fn(Arc<dyn CacheBackend>) -> Fut,
        Fut: std::future::Future<Output = Result<T, CacheError>>,
    {
        let backend = self.backend.as_ref()?;

        if !self.health.allow_request() {
            tracing::debug!("Session cache degraded, skipping {}", name);
            return None;
        }

        match self.policy.run(name, || op(backend.clone())).await {
            Ok(value) => {
                self.health.record_success();
                Some(value)
            }
            Err(e) => {
                tracing::debug!("Session cache {} gave up: {}", name, e);
                self.health.record_failure();
                None
            }
        }
    }

    /// Remaining lifetime of an entry: the configured TTL, capped by the
    /// session's own expiry. `None` once the session has expired.
    fn entry_ttl(&self, session: &RefreshSession) -> Option<Duration> {
        let remaining = (session.expires_at - Utc::now()).to_std().ok()?;
        let ttl = self.ttl.min(remaining);
        (!ttl.is_zero()).then_some(ttl)
    }

    /// Mirror a session; `false` when it could not be cached
    pub async fn set(&self, session: &RefreshSession) -> bool {
        let Some(ttl) = self.entry_ttl(session) else {
            tracing::debug!("Not caching expired session {}", session.id);
            return false;
        };
        let value = match encode(session) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to cache session {}: {}", session.id, e);
                return false;
            }
        };
        let key = Self::key(session.user_id);

        self.execute("set", |backend| {
            let key = key.clone();
            let value = value.clone();
            async move { backend.set_ex(&key, value, ttl).await }
        })
        .await
        .is_some()
    }

    /// Cached session of a user; `None` on miss, corrupt entry or cache failure
    pub async fn get(&self, user_id: Uuid) -> Option<RefreshSession> {
        let key = Self::key(user_id);

        let raw = self
            .execute("get", |backend| {
                let key = key.clone();
                async move { backend.get(&key).await }
            })
            .await
            .flatten()?;

        match decode(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Dropping cache entry for user {}: {}", user_id, e);
                self.delete(user_id).await;
                None
            }
        }
    }

    /// Drop a user's entry; `false` when nothing was removed or the cache failed
    pub async fn delete(&self, user_id: Uuid) -> bool {
        let key = Self::key(user_id);

        self.execute("delete", |backend| {
            let key = key.clone();
            async move { backend.del(&key).await }
        })
        .await
        .unwrap_or(false)
    }

    pub async fn exists(&self, user_id: Uuid) -> bool {
        let key = Self::key(user_id);

        self.execute("exists", |backend| {
            let key = key.clone();
            async move { backend.exists(&key).await }
        })
        .await
        .unwrap_or(false)
    }

    /// Check the backend outside of regular traffic, restoring health on success
    pub async fn probe(&self) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };

        match tokio::time::timeout(self.policy.operation_timeout, backend.ping()).await {
            Ok(Ok(())) => {
                self.health.mark_reconnected();
                true
            }
            _ => {
                self.health.record_failure();
                false
            }
        }
    }
}

fn encode(session: &RefreshSession) -> Result<String, CacheError> {
    Ok(serde_json::to_string(session)?)
}

fn decode(raw: &str) -> Result<RefreshSession, CacheError> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Backend that can be switched off and counts the calls reaching it
    struct FlakyBackend {
        inner: MemoryBackend,
        down: AtomicBool,
        calls: AtomicU32,
    }

    impl FlakyBackend {
        fn new() -> Self {
            Self {
                inner: MemoryBackend::new(),
                down: AtomicBool::new(false),
                calls: AtomicU32::new(0),
            }
        }

        fn check(&self) -> Result<(), CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                Err(CacheError::Unavailable("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CacheBackend for FlakyBackend {
        async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
            self.check()?;
            self.inner.set_ex(key, value, ttl).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.check()?;
            self.inner.get(key).await
        }

        async fn del(&self, key: &str) -> Result<bool, CacheError> {
            self.check()?;
            self.inner.del(key).await
        }

        async fn exists(&self, key: &str) -> Result<bool, CacheError> {
            self.check()?;
            self.inner.exists(key).await
        }

        async fn ping(&self) -> Result<(), CacheError> {
            self.check()
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .max_attempts(2)
            .delays(Duration::from_millis(1), Duration::from_millis(2))
            .operation_timeout(Duration::from_millis(100))
    }

    fn cache_with(backend: Arc<dyn CacheBackend>, probe_interval: Duration) -> SessionCache {
        SessionCache::new(
            backend,
            CacheHealth::new(2, probe_interval),
            fast_policy(),
            Duration::from_secs(60),
        )
    }

    fn session(user_id: Uuid) -> RefreshSession {
        RefreshSession {
            id: Uuid::new_v4(),
            user_id,
            token_hash: "abc".to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(7),
            revoked: false,
        }
    }

    #[test]
    fn test_key_format() {
        let user_id = Uuid::nil();
        assert_eq!(
            SessionCache::key(user_id),
            "session:00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = cache_with(Arc::new(MemoryBackend::new()), Duration::from_secs(30));
        let user_id = Uuid::new_v4();
        let stored = session(user_id);

        assert!(cache.set(&stored).await);
        assert!(cache.exists(user_id).await);
        assert_eq!(cache.get(user_id).await, Some(stored));

        assert!(cache.delete(user_id).await);
        assert!(!cache.exists(user_id).await);
        assert!(cache.get(user_id).await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_is_a_no_op() {
        let cache = SessionCache::disabled();
        let user_id = Uuid::new_v4();

        assert!(!cache.is_enabled());
        assert!(!cache.set(&session(user_id)).await);
        assert!(cache.get(user_id).await.is_none());
        assert!(!cache.delete(user_id).await);
        assert!(!cache.exists(user_id).await);
        assert!(!cache.probe().await);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_dropped() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = cache_with(backend.clone(), Duration::from_secs(30));
        let user_id = Uuid::new_v4();

        backend
            .set_ex(&SessionCache::key(user_id), "{not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(cache.get(user_id).await.is_none());
        assert!(backend.is_empty());
    }

    #[test]
    fn test_unreadable_entry_is_a_serialization_error() {
        let err = decode("{not json").unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_entry_does_not_outlive_session() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = cache_with(backend.clone(), Duration::from_secs(30));
        let user_id = Uuid::new_v4();
        let stored = RefreshSession {
            expires_at: Utc::now() + chrono::Duration::milliseconds(50),
            ..session(user_id)
        };

        assert!(cache.set(&stored).await);
        assert!(cache.exists(user_id).await);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.get(user_id).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_not_cached() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = cache_with(backend.clone(), Duration::from_secs(30));
        let user_id = Uuid::new_v4();
        let stored = RefreshSession {
            expires_at: Utc::now() - chrono::Duration::seconds(1),
            ..session(user_id)
        };

        assert!(!cache.set(&stored).await);
        assert!(backend.is_empty());
        assert!(cache.health().is_healthy());
    }

    #[tokio::test]
    async fn test_outage_degrades_and_short_circuits() {
        let backend = Arc::new(FlakyBackend::new());
        let cache = cache_with(backend.clone(), Duration::from_secs(60));
        let user_id = Uuid::new_v4();
        backend.down.store(true, Ordering::SeqCst);

        assert!(!cache.set(&session(user_id)).await);
        assert!(cache.get(user_id).await.is_none());
        assert_eq!(cache.health().state(), CacheState::Degraded);

        let calls = backend.calls.load(Ordering::SeqCst);
        assert!(cache.get(user_id).await.is_none());
        assert!(!cache.exists(user_id).await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_successful_probe_restores_cache() {
        let backend = Arc::new(FlakyBackend::new());
        let cache = cache_with(backend.clone(), Duration::ZERO);
        let user_id = Uuid::new_v4();

        backend.down.store(true, Ordering::SeqCst);
        cache.get(user_id).await;
        cache.get(user_id).await;
        assert_eq!(cache.health().state(), CacheState::Degraded);

        backend.down.store(false, Ordering::SeqCst);
        assert!(cache.set(&session(user_id)).await);
        assert_eq!(cache.health().state(), CacheState::Healthy);
        assert!(cache.get(user_id).await.is_some());
    }

    #[tokio::test]
    async fn test_explicit_probe() {
        let backend = Arc::new(FlakyBackend::new());
        let cache = cache_with(backend.clone(), Duration::from_secs(60));

        backend.down.store(true, Ordering::SeqCst);
        assert!(!cache.probe().await);
        assert!(!cache.probe().await);
        assert_eq!(cache.health().state(), CacheState::Degraded);

        backend.down.store(false, Ordering::SeqCst);
        assert!(cache.probe().await);
        assert!(cache.health().is_healthy());
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionCacheConfig::default();

        assert!(config.redis_url.is_none());
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.probe_interval, Duration::from_secs(30));
        assert!(!SessionCache::from_config(&config, Duration::from_secs(1)).is_enabled());
    }
}
