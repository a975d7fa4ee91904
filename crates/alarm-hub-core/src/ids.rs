//! Identifier types for alarm-hub.
//!
//! Alarms are identified by caller-chosen string IDs. Raisers are identified
//! by a small numeric handle assigned by the manager when they are added.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Errors that can occur when constructing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier was empty or contained only whitespace.
    #[error("identifier cannot be empty")]
    Empty,
}

/// A string alarm identifier, unique within a manager.
///
/// IDs are immutable once the alarm is registered.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AlarmId(String);

impl AlarmId {
    /// Create a new `AlarmId`.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if the string is empty or whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(id))
    }

    /// Return the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AlarmId({})", self.0)
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AlarmId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AlarmId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AlarmId> for String {
    fn from(id: AlarmId) -> Self {
        id.0
    }
}

impl Borrow<str> for AlarmId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AlarmId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Handle for a raiser registered with a manager.
///
/// Alarms keep a `RaiserId` rather than a pointer to the raiser, so the
/// manager's raiser table stays the only owner.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RaiserId(u32);

impl RaiserId {
    /// Create a `RaiserId` from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Return the raw value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for RaiserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RaiserId({})", self.0)
    }
}

impl fmt::Display for RaiserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "raiser-{}", self.0)
    }
}
