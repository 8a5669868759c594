//! Cache health tracking
//!
//! A small circuit breaker. After `failure_threshold` consecutive failed
//! operations the cache is marked degraded and requests are short-circuited.
//! Once `probe_interval` has passed, a single request is let through to probe
//! the backend; its success restores the healthy state.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;

/// Observable cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Healthy,
    Degraded,
}

#[derive(Debug)]
pub struct CacheHealth {
    degraded: AtomicBool,
    consecutive_failures: AtomicU32,
    failure_threshold: u32,
    probe_interval: Duration,
    /// When the cache went degraded or the last probe was let through
    last_probe: Mutex<Option<Instant>>,
}

impl Default for CacheHealth {
    fn default() -> Self {
        Self::new(
            DEFAULT_FAILURE_THRESHOLD,
            Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
        )
    }
}

impl CacheHealth {
    pub fn new(failure_threshold: u32, probe_interval: Duration) -> Self {
        Self {
            degraded: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
            probe_interval,
            last_probe: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CacheState {
        if self.degraded.load(Ordering::Acquire) {
            CacheState::Degraded
        } else {
            CacheState::Healthy
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == CacheState::Healthy
    }

    /// Whether an operation may reach the backend right now
    ///
    /// While degraded, returns `true` at most once per probe interval.
    pub fn allow_request(&self) -> bool {
        if !self.degraded.load(Ordering::Acquire) {
            return true;
        }

        let Ok(mut last_probe) = self.last_probe.lock() else {
            return false;
        };
        let due = last_probe.is_none_or(|at| at.elapsed() >= self.probe_interval);
        if due {
            *last_probe = Some(Instant::now());
        }
        due
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        if self.degraded.swap(false, Ordering::AcqRel) {
            tracing::info!("Session cache recovered");
        }
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.failure_threshold && !self.degraded.swap(true, Ordering::AcqRel) {
            if let Ok(mut last_probe) = self.last_probe.lock() {
                *last_probe = Some(Instant::now());
            }
            tracing::warn!(
                "Session cache degraded after {} consecutive failures, falling back to the session store",
                failures
            );
        }
    }

    /// A backend (re)connection succeeded
    pub fn mark_reconnected(&self) {
        self.record_success();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_healthy() {
        let health = CacheHealth::default();

        assert_eq!(health.state(), CacheState::Healthy);
        assert!(health.allow_request());
    }

    #[test]
    fn test_degrades_after_threshold() {
        let health = CacheHealth::new(3, Duration::from_secs(60));

        health.record_failure();
        health.record_failure();
        assert!(health.is_healthy());

        health.record_failure();
        assert_eq!(health.state(), CacheState::Degraded);
        assert!(!health.allow_request());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let health = CacheHealth::new(2, Duration::from_secs(60));

        health.record_failure();
        health.record_success();
        health.record_failure();

        assert!(health.is_healthy());
    }

    #[test]
    fn test_probe_is_let_through_after_interval() {
        let health = CacheHealth::new(1, Duration::ZERO);
        health.record_failure();
        assert_eq!(health.state(), CacheState::Degraded);

        assert!(health.allow_request());
    }

    #[test]
    fn test_only_one_probe_per_interval() {
        let health = CacheHealth::new(1, Duration::from_millis(20));
        health.record_failure();
        assert!(!health.allow_request());

        std::thread::sleep(Duration::from_millis(30));

        assert!(health.allow_request());
        assert!(!health.allow_request());
    }

    #[test]
    fn test_reconnect_restores_healthy() {
        let health = CacheHealth::new(1, Duration::from_secs(60));
        health.record_failure();

        health.mark_reconnected();

        assert!(health.is_healthy());
        assert!(health.allow_request());
    }
}
