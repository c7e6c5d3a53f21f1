//! Background token refresh
//!
//! While a session is authenticated the monitor checks the token every
//! `interval` (first check immediately) and refreshes it once it is expired
//! or within `threshold` of expiring. A failed check ends the session. The
//! monitor idles while nobody is logged in and wakes up on the next login.
//!
//! Author: hephaex@gmail.com

use crate::error::{ClientError, Result};
use crate::session::{Session, SessionState, SessionStore};
use crate::token;
use abroad_core::SessionConfig;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Monitor timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Time between checks
    pub interval: Duration,
    /// Refresh once the remaining lifetime is at or below this
    pub threshold: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            threshold: Duration::from_secs(10 * 60),
        }
    }
}

impl From<&SessionConfig> for MonitorConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            interval: config.refresh_interval(),
            threshold: config.refresh_threshold(),
        }
    }
}

/// Result of a single check
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Token still has enough lifetime left
    Fresh { remaining: Duration },
    Refreshed(Session),
}

/// Inspect the current token and refresh it if needed
///
/// A token that cannot be decoded ends the session, unless it was replaced
/// in the meantime.
pub async fn check_session(session: &SessionStore, threshold: Duration) -> Result<CheckOutcome> {
    let current = session.token().ok_or(ClientError::NoToken)?;
    let claims = match token::decode_claims(&current) {
        Ok(claims) => claims,
        Err(e) => {
            session.expire_if_current(&current);
            return Err(e.into());
        }
    };

    let now = Utc::now();
    let remaining = claims.remaining_at(now);
    if !claims.is_expired_at(now) && remaining > threshold {
        return Ok(CheckOutcome::Fresh { remaining });
    }

    tracing::debug!(remaining_secs = remaining.as_secs(), "Token close to expiry, refreshing");
    let fresh = session.refresh_if_current(&current).await?;
    Ok(CheckOutcome::Refreshed(fresh))
}

/// Refresh immediately; a failed exchange ends the session and is returned
///
/// `NoToken` and `Superseded` leave the state alone: the session they refer
/// to is already gone.
pub async fn refresh_or_expire(session: &SessionStore) -> Result<Session> {
    session.refresh_token().await
}

/// Handle to the background refresh task; stops it when dropped
pub struct RefreshMonitor {
    session: Arc<SessionStore>,
    config: MonitorConfig,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RefreshMonitor {
    /// Start monitoring `session` on the current tokio runtime
    pub fn spawn(session: Arc<SessionStore>, config: MonitorConfig) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(session.clone(), config, cancel.clone()));
        tracing::debug!(
            interval_secs = config.interval.as_secs(),
            threshold_secs = config.threshold.as_secs(),
            "Refresh monitor started"
        );

        Self {
            session,
            config,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn config(&self) -> MonitorConfig {
        self.config
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Manual refresh; logs the session out if it fails
    pub async fn refresh_now(&self) -> Result<Session> {
        refresh_or_expire(&self.session).await
    }

    /// Stop the task and wait for it to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Refresh monitor task failed");
            }
        }
    }
}

impl Drop for RefreshMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(session: Arc<SessionStore>, config: MonitorConfig, cancel: CancellationToken) {
    let mut changes = session.subscribe();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            active = async { changes.wait_for(SessionState::is_authenticated).await.map(|_| ()) } => {
                if active.is_err() {
                    return;
                }
            }
        }
        tracing::debug!("Refresh monitor active");

        if !watch_session(&session, &config, &cancel, &mut changes).await {
            return;
        }
        tracing::debug!("Refresh monitor idle");
    }
}

/// Check on every tick until the session ends; false once cancelled
async fn watch_session(
    session: &SessionStore,
    config: &MonitorConfig,
    cancel: &CancellationToken,
    changes: &mut watch::Receiver<SessionState>,
) -> bool {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut generation = session.generation();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = ticker.tick() => {
                match check_session(session, config.threshold).await {
                    Ok(CheckOutcome::Fresh { remaining }) => {
                        tracing::trace!(remaining_secs = remaining.as_secs(), "Token fresh");
                    }
                    Ok(CheckOutcome::Refreshed(_)) => {}
                    Err(ClientError::NoToken | ClientError::Superseded) => {}
                    Err(e) => tracing::warn!(error = %e, "Session check failed, logging out"),
                }
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    return false;
                }
                // logged out and back in between two polls
                let current = session.generation();
                if current != generation {
                    generation = current;
                    ticker.reset_immediately();
                }
            }
        }

        if !session.is_authenticated() {
            return true;
        }
    }
}
