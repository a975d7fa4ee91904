//! Test session bookkeeping.
//!
//! At most one alarm per manager can be under test. Each session gets a
//! unique token and its own cancellation token, so a timer started by
//! `run_test` only ever ends the session that created it: once that session
//! has ended, been rolled back or been replaced, the timer does nothing.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::handle::AlarmHandle;
use crate::manager::AlarmManager;

/// The alarm currently under test.
pub(crate) struct TestSession {
    pub(crate) alarm: AlarmHandle,
    pub(crate) token: u64,
    pub(crate) timer: CancellationToken,
}

impl TestSession {
    pub(crate) fn new(alarm: AlarmHandle, token: u64) -> Self {
        Self {
            alarm,
            token,
            timer: CancellationToken::new(),
        }
    }

    /// Stop any timer attached to this session.
    pub(crate) fn disarm(&self) {
        self.timer.cancel();
    }
}

/// Spawn a timer that ends session `token` after `duration`.
///
/// The timer holds only a weak reference, so dropping the manager also
/// disarms it.
pub(crate) fn spawn_timer(
    runtime: &Handle,
    manager: Weak<AlarmManager>,
    token: u64,
    timer: CancellationToken,
    duration: Duration,
) {
    runtime.spawn(async move {
        tokio::select! {
            biased;
            () = timer.cancelled() => {
                tracing::debug!(session = token, "Test timer disarmed");
            }
            () = tokio::time::sleep(duration) => {
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                match manager.end_test_session(token) {
                    Ok(Some(alarm)) => {
                        tracing::info!(alarm_id = %alarm.id(), session = token, "Timed test ended");
                    }
                    Ok(None) => {
                        tracing::debug!(session = token, "Test session already ended");
                    }
                    Err(e) => {
                        tracing::warn!(session = token, error = %e, "Failed to end timed test");
                    }
                }
            }
        }
    });
}
