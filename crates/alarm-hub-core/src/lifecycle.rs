//! Alarm transition rules.
//!
//! # State Machine
//!
//! ```text
//!                ┌──────────────┐
//!      ┌────────▶│ Disconnected │◀───────────────┐
//!      │         └──────┬───────┘                │
//!      │ (enable)       │ (connect)              │ (disconnect)
//!      │                ▼                        │
//! ┌──────────┐   ┌──────────────┐  (raise)  ┌────┴────────────────────┐
//! │ Disabled │◀──│   Lowered    │──────────▶│ Minor / Moderate /      │
//! └──────────┘   │              │◀──────────│ Severe / Critical       │
//!   (disable,    └──────────────┘  (lower)  └─────────────────────────┘
//!    from any
//!    enabled state)
//! ```
//!
//! Only two rules are enforced: a disabled alarm can only be moved to
//! `Disconnected`, and an alarm can only be disabled when its policy allows
//! it. Everything else is a valid update.

use crate::error::{CoreError, Result};
use crate::ids::AlarmId;
use crate::state::AlarmState;

/// Validates a direct state assignment.
///
/// # Errors
///
/// Returns `CoreError::Disabled` if the alarm is disabled and `to` is not
/// `Disconnected`, or `CoreError::CannotDisable` if `to` is `Disabled` and
/// the alarm does not allow it.
pub fn validate_transition(
    alarm_id: &AlarmId,
    from: AlarmState,
    to: AlarmState,
    can_disable: bool,
) -> Result<()> {
    if is_disabled(from) && to != AlarmState::Disconnected {
        return Err(CoreError::Disabled {
            alarm_id: alarm_id.clone(),
            to,
        });
    }
    if is_disabled(to) && !can_disable {
        return Err(CoreError::CannotDisable(alarm_id.clone()));
    }
    Ok(())
}

/// Validates that `state` can be used to raise an alarm.
///
/// # Errors
///
/// Returns `CoreError::InvalidRaiseState` unless `state` is one of
/// `Minor`, `Moderate`, `Severe` or `Critical`.
pub fn validate_raise_target(state: AlarmState) -> Result<()> {
    if is_raised(state) {
        Ok(())
    } else {
        Err(CoreError::InvalidRaiseState(state))
    }
}

/// Returns true if the state is raised.
#[must_use]
pub const fn is_raised(state: AlarmState) -> bool {
    state.is_raised()
}

/// Returns true if the state is `Lowered`.
#[must_use]
pub const fn is_lowered(state: AlarmState) -> bool {
    matches!(state, AlarmState::Lowered)
}

/// Returns true if the state is `Disabled`.
#[must_use]
pub const fn is_disabled(state: AlarmState) -> bool {
    matches!(state, AlarmState::Disabled)
}

/// Returns true if the alarm is connected (neither disconnected nor disabled).
#[must_use]
pub const fn is_connected(state: AlarmState) -> bool {
    !matches!(state, AlarmState::Disconnected | AlarmState::Disabled)
}
