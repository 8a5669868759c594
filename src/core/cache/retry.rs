//! Bounded retry for cache operations
//!
//! Each attempt runs under its own timeout. Between attempts the delay doubles
//! from `base_delay` up to `max_delay`, with a little jitter so callers that
//! failed together do not retry in lockstep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::core::cache::backend::CacheError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 100;
const DEFAULT_MAX_DELAY_MS: u64 = 3000;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 500;

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound for a single attempt
    pub operation_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
        }
    }
}

impl RetryPolicy {
    /// Create policy from CACHE_* environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_attempts = env_parse("CACHE_MAX_RETRIES").unwrap_or(defaults.max_attempts);
        let base_delay = env_parse("CACHE_RETRY_BASE_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_delay);
        let max_delay = env_parse("CACHE_RETRY_MAX_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_delay);
        let operation_timeout = env_parse("CACHE_OP_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.operation_timeout);

        Self {
            max_attempts,
            base_delay,
            max_delay,
            operation_timeout,
        }
    }

    /// Set the number of attempts (at least one is always made)
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set backoff bounds
    pub fn delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// Set the per-attempt timeout
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Backoff before the attempt following `attempt` (1-based), without jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        let jitter_ms = (delay.as_millis() as u64 / 10).max(1);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
        (delay + jitter).min(self.max_delay.max(delay))
    }

    /// Run `op` until it succeeds or the attempts are used up
    pub async fn run<T, F, Fut>(&self, name: &str, mut op: F) -> Result<T, CacheError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = CacheError::Timeout;

        for attempt in 1..=attempts {
            let result = match tokio::time::timeout(self.operation_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Timeout),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::debug!("Cache {} failed, attempt {}/{}: {}", name, attempt, attempts, e);
                    last_error = e;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.jittered(attempt)).await;
            }
        }

        Err(last_error)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
