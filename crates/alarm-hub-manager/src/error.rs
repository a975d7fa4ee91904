//! Error types for the alarm manager.
//!
//! This module defines all errors that can occur during registration,
//! mutation, test sessions and message handling.

use alarm_hub_core::{AlarmId, CoreError, RaiserId};
use thiserror::Error;

/// A result type using `ManagerError`.
pub type Result<T> = std::result::Result<T, ManagerError>;

/// Errors that can occur in alarm manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The requested alarm was not found.
    #[error("alarm not found: {0}")]
    AlarmNotFound(String),

    /// An alarm with this ID is already registered.
    #[error("there is already an alarm with ID {0}")]
    DuplicateAlarm(AlarmId),

    /// The raiser has not been added to this manager.
    #[error("unknown raiser: {0}")]
    UnknownRaiser(RaiserId),

    /// Another alarm is already under test.
    #[error("cannot test {requested} as {active} is already being tested")]
    TestInProgress {
        /// The alarm that was requested for testing.
        requested: String,
        /// The alarm currently under test.
        active: AlarmId,
    },

    /// The alarm is already raised and cannot be tested.
    #[error("alarm {0} already raised")]
    AlreadyRaised(AlarmId),

    /// The alarm is disconnected and cannot be tested.
    #[error("alarm {0} is disconnected")]
    Disconnected(AlarmId),

    /// Starting a test failed and the test was rolled back.
    #[error("failed to start test for alarm {alarm_id}: {source}")]
    TestStartFailed {
        /// The alarm that was being tested.
        alarm_id: AlarmId,
        /// The underlying failure.
        #[source]
        source: Box<ManagerError>,
    },

    /// An inbound message was malformed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A drain loop is already consuming the dispatch queue.
    #[error("dispatch queue is already being drained")]
    DrainAlreadyRunning,

    /// The operation needs a tokio runtime but none is running.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// A raiser failed while registering its alarms.
    #[error("raiser error: {0}")]
    Raiser(String),

    /// The alarm state machine rejected the operation.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ManagerError {
    /// Returns true if the error is a caller-side validation failure.
    ///
    /// All manager errors except `NoRuntime` and `Raiser` are validation
    /// failures and are never worth retrying unchanged.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        !matches!(self, Self::NoRuntime(_) | Self::Raiser(_))
    }

    /// The alarm the error refers to, if any.
    #[must_use]
    pub fn alarm_id(&self) -> Option<&str> {
        match self {
            Self::AlarmNotFound(id) => Some(id.as_str()),
            Self::TestInProgress { requested, .. } => Some(requested.as_str()),
            Self::DuplicateAlarm(id)
            | Self::AlreadyRaised(id)
            | Self::Disconnected(id)
            | Self::TestStartFailed { alarm_id: id, .. } => Some(id.as_str()),
            Self::Core(CoreError::Disabled { alarm_id, .. } | CoreError::CannotDisable(alarm_id)) => {
                Some(alarm_id.as_str())
            }
            _ => None,
        }
    }
}
