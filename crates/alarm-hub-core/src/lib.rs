//! Core alarm types for alarm-hub.
//!
//! This crate provides the pieces shared by everything that handles alarms:
//!
//! - **Identifiers**: [`AlarmId`] and [`RaiserId`]
//! - **States**: [`AlarmState`], ranked by an explicit severity table
//! - **State machine**: the [`Alarm`] entity and its transition rules
//! - **Error types**: [`CoreError`]
//!
//! # Example
//!
//! ```
//! use alarm_hub_core::{codes, Alarm, AlarmId, AlarmState};
//!
//! let mut alarm = Alarm::new(AlarmId::new("pump-temp").unwrap());
//! assert_eq!(alarm.state(), AlarmState::Disconnected);
//!
//! alarm.lower("connected", codes::CONNECTING).unwrap();
//! let changed = alarm.raise(AlarmState::Severe, "overheat", 7).unwrap();
//! assert!(changed);
//! assert!(alarm.is_raised());
//! assert!(alarm.last_raised().is_some());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod alarm;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod state;

pub use alarm::Alarm;
pub use error::{CoreError, Result};
pub use ids::{AlarmId, IdError, RaiserId};
pub use state::{AlarmState, ParseStateError};

/// Reserved alarm codes.
pub mod codes {
    /// No particular reason.
    pub const NO_CODE: i32 = 0;
    /// The alarm was raised by a test session.
    pub const START_TEST: i32 = 1;
    /// The alarm was lowered at the end of a test session.
    pub const END_TEST: i32 = 2;
    /// The alarm was lowered because its raiser connected.
    pub const CONNECTING: i32 = 3;

    /// Default message when a test session starts.
    pub const START_TEST_MESSAGE: &str = "Start testing";
    /// Default message when a test session ends.
    pub const END_TEST_MESSAGE: &str = "End testing";
}
