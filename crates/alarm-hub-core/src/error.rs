//! Error types for the alarm state machine.
//!
//! These errors are raised by the `Alarm` entity itself and are wrapped by
//! the manager crate.

use crate::ids::{AlarmId, IdError};
use crate::state::AlarmState;
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur when transitioning an alarm.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// The requested state cannot be used to raise an alarm.
    #[error("alarm state {0} is not valid for raising an alarm")]
    InvalidRaiseState(AlarmState),

    /// The alarm is disabled and can only be moved to `DISCONNECTED`.
    #[error("alarm {alarm_id} is disabled and cannot be set directly to {to}")]
    Disabled {
        /// The alarm being transitioned.
        alarm_id: AlarmId,
        /// The requested target state.
        to: AlarmState,
    },

    /// The alarm does not allow being disabled.
    #[error("alarm {0} cannot be disabled")]
    CannotDisable(AlarmId),
}
