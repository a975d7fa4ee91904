//! Change notification listeners.
//!
//! The manager keeps two independent [`Listeners`] lists: one invoked in-line
//! whenever an alarm changes, and one invoked by the drain loop for every
//! alarm taken off the dispatch queue.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::handle::AlarmHandle;

/// Error returned by a listener that failed to handle a notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

impl NotifyError {
    /// Create a new notification error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A notification callback.
pub type Listener = Arc<dyn Fn(&AlarmHandle) -> Result<(), NotifyError> + Send + Sync>;

/// An ordered list of listeners for one notification channel.
pub struct Listeners {
    channel: &'static str,
    listeners: RwLock<Vec<Listener>>,
}

impl Listeners {
    /// Create an empty list for the named channel.
    #[must_use]
    pub fn new(channel: &'static str) -> Self {
        Self {
            channel,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Add a listener.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&AlarmHandle) -> Result<(), NotifyError> + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// True if nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver a notification to every listener in subscription order.
    ///
    /// A failing listener is logged and skipped. Returns the number of
    /// listeners that failed.
    pub fn notify(&self, alarm: &AlarmHandle) -> usize {
        // Listeners may subscribe further listeners, so deliver from a copy.
        let listeners = self.listeners.read().clone();

        let mut failures = 0;
        for listener in &listeners {
            if let Err(e) = listener(alarm) {
                failures += 1;
                tracing::warn!(
                    channel = self.channel,
                    alarm_id = %alarm.id(),
                    error = %e,
                    "Alarm listener failed"
                );
            }
        }
        failures
    }
}
