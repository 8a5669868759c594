//! Periodic removal of expired refresh sessions

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::core::auth::service::AuthService;

/// Spawn a task that calls [`AuthService::sweep_expired`] every `interval`
///
/// The first sweep runs immediately. Returns `None` when `interval` is zero.
pub fn spawn_session_sweeper(service: AuthService, interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        tracing::info!("Session sweeper disabled");
        return None;
    }

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = service.sweep_expired().await {
                tracing::error!("Session sweep failed: {}", e);
            }
        }
    });

    tracing::info!("Session sweeper started (interval: {:?})", interval);
    Some(handle)
}
