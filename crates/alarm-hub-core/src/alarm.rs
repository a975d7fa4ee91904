//! The alarm entity and its state machine.
//!
//! An [`Alarm`] applies updates, validates them against the rules in
//! [`crate::lifecycle`], and keeps the `last_*` history timestamps. While an
//! alarm is in test mode the history timestamps are frozen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codes;
use crate::error::Result;
use crate::ids::{AlarmId, RaiserId};
use crate::lifecycle;
use crate::state::AlarmState;

/// A named alarm tracking the severity of one health indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    id: AlarmId,
    name: Option<String>,
    source: Option<String>,
    state: AlarmState,
    message: String,
    code: i32,
    testing: bool,
    can_disable: bool,
    last_raised: Option<DateTime<Utc>>,
    last_lowered: Option<DateTime<Utc>>,
    last_disabled: Option<DateTime<Utc>>,
    #[serde(skip)]
    raiser: Option<RaiserId>,
}

impl Alarm {
    /// Create a new alarm in the `Disconnected` state.
    #[must_use]
    pub fn new(id: AlarmId) -> Self {
        Self {
            id,
            name: None,
            source: None,
            state: AlarmState::Disconnected,
            message: String::new(),
            code: codes::NO_CODE,
            testing: false,
            can_disable: true,
            last_raised: None,
            last_lowered: None,
            last_disabled: None,
            raiser: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Set the source classification tag.
    #[must_use]
    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    /// Set whether the alarm may be disabled.
    #[must_use]
    pub fn with_can_disable(mut self, can_disable: bool) -> Self {
        self.can_disable = can_disable;
        self
    }

    /// Bind the raiser that owns this alarm.
    #[must_use]
    pub fn with_raiser(mut self, raiser: RaiserId) -> Self {
        self.raiser = Some(raiser);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The alarm ID.
    #[must_use]
    pub const fn id(&self) -> &AlarmId {
        &self.id
    }

    /// The display name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The source tag, if any.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AlarmState {
        self.state
    }

    /// Message from the last update.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Code from the last update.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// Raw test-mode flag.
    #[must_use]
    pub const fn testing(&self) -> bool {
        self.testing
    }

    /// Whether the alarm may be disabled.
    #[must_use]
    pub const fn can_disable(&self) -> bool {
        self.can_disable
    }

    /// When the alarm was last raised outside of a test.
    #[must_use]
    pub const fn last_raised(&self) -> Option<DateTime<Utc>> {
        self.last_raised
    }

    /// When the alarm was last lowered from a raised state outside of a test.
    #[must_use]
    pub const fn last_lowered(&self) -> Option<DateTime<Utc>> {
        self.last_lowered
    }

    /// When the alarm was last disabled.
    #[must_use]
    pub const fn last_disabled(&self) -> Option<DateTime<Utc>> {
        self.last_disabled
    }

    /// The raiser that registered this alarm.
    #[must_use]
    pub const fn raiser(&self) -> Option<RaiserId> {
        self.raiser
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// True while in test mode, or while the code still marks a test boundary.
    #[must_use]
    pub const fn is_testing(&self) -> bool {
        self.testing || self.code == codes::START_TEST || self.code == codes::END_TEST
    }

    /// True if the state is `Lowered`.
    #[must_use]
    pub const fn is_lowered(&self) -> bool {
        lifecycle::is_lowered(self.state)
    }

    /// True if the state is `Disabled`.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        lifecycle::is_disabled(self.state)
    }

    /// True if neither disconnected nor disabled.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        lifecycle::is_connected(self.state)
    }

    /// True if the state is above `Lowered`.
    #[must_use]
    pub const fn is_raised(&self) -> bool {
        lifecycle::is_raised(self.state)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Apply a state, message and code.
    ///
    /// Returns true if the state or the code changed. The message is always
    /// replaced, `None` clears it.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed, in which case the
    /// alarm is left untouched.
    pub fn update(&mut self, state: AlarmState, message: Option<&str>, code: i32) -> Result<bool> {
        lifecycle::validate_transition(&self.id, self.state, state, self.can_disable)?;

        let previous = self.state;
        let changed = previous != state || self.code != code;

        self.state = state;
        self.message = message.unwrap_or_default().to_string();
        self.code = code;

        if previous != state && !self.testing {
            self.record_transition(previous, Utc::now());
        }

        Ok(changed)
    }

    fn record_transition(&mut self, previous: AlarmState, now: DateTime<Utc>) {
        if self.is_raised() {
            self.last_raised = Some(now);
            self.last_lowered = None;
        } else if self.is_lowered() && lifecycle::is_raised(previous) {
            self.last_lowered = Some(now);
        } else if self.is_disabled() {
            self.last_disabled = Some(now);
        }
    }

    /// Raise the alarm to one of the raised states.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRaiseState` if `state` is not raised.
    pub fn raise(&mut self, state: AlarmState, message: &str, code: i32) -> Result<bool> {
        lifecycle::validate_raise_target(state)?;
        self.update(state, Some(message), code)
    }

    /// Lower the alarm.
    ///
    /// # Errors
    ///
    /// Returns an error if the alarm is disabled.
    pub fn lower(&mut self, message: &str, code: i32) -> Result<bool> {
        self.update(AlarmState::Lowered, Some(message), code)
    }

    /// Mark the alarm as disconnected.
    ///
    /// # Errors
    ///
    /// Never fails in practice; disconnecting is allowed from every state.
    pub fn disconnect(&mut self, message: &str, code: i32) -> Result<bool> {
        self.update(AlarmState::Disconnected, Some(message), code)
    }

    /// Enable or disable the alarm.
    ///
    /// Enabling a disabled alarm moves it to `Disconnected`; disabling an
    /// enabled alarm moves it to `Disabled`. Anything else is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CannotDisable` when disabling is not allowed.
    pub fn enable(&mut self, enable: bool) -> Result<bool> {
        match (enable, self.is_disabled()) {
            (true, true) => self.update(AlarmState::Disconnected, None, codes::NO_CODE),
            (false, false) => self.update(AlarmState::Disabled, None, codes::NO_CODE),
            _ => Ok(false),
        }
    }

    /// Disable the alarm.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CannotDisable` when disabling is not allowed.
    pub fn disable(&mut self) -> Result<bool> {
        self.enable(false)
    }

    /// Enter test mode and raise the alarm.
    ///
    /// The test flag stays set if raising fails; callers roll back with
    /// [`Alarm::end_test`].
    ///
    /// # Errors
    ///
    /// Same as [`Alarm::raise`].
    pub fn start_test(&mut self, state: AlarmState, message: &str, code: i32) -> Result<bool> {
        self.testing = true;
        self.raise(state, message, code)
    }

    /// Lower the alarm and leave test mode.
    ///
    /// The test flag is cleared even if lowering fails.
    ///
    /// # Errors
    ///
    /// Same as [`Alarm::lower`].
    pub fn end_test(&mut self, message: &str, code: i32) -> Result<bool> {
        let changed = self.lower(message, code);
        self.testing = false;
        changed
    }
}
