//! Alarm severity states.
//!
//! Severity ordering comes from [`AlarmState::rank`], an explicit table,
//! so reordering the enum variants never changes which states count as
//! "raised".

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Severity state of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    /// Switched off; ignores everything except re-enabling.
    Disabled,
    /// The raiser is not connected, so the state is unknown.
    Disconnected,
    /// Connected and healthy.
    Lowered,
    /// Raised, lowest severity.
    Minor,
    /// Raised, moderate severity.
    Moderate,
    /// Raised, severe.
    Severe,
    /// Raised, highest severity.
    Critical,
}

/// Error returned when parsing an unknown state name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown alarm state: {0}")]
pub struct ParseStateError(String);

impl AlarmState {
    /// All states in ascending severity.
    pub const ALL: [Self; 7] = [
        Self::Disabled,
        Self::Disconnected,
        Self::Lowered,
        Self::Minor,
        Self::Moderate,
        Self::Severe,
        Self::Critical,
    ];

    /// States that count as raised.
    pub const RAISED: [Self; 4] = [Self::Minor, Self::Moderate, Self::Severe, Self::Critical];

    /// Severity rank of the state.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::Disconnected => 1,
            Self::Lowered => 2,
            Self::Minor => 3,
            Self::Moderate => 4,
            Self::Severe => 5,
            Self::Critical => 6,
        }
    }

    /// Look up a state by its rank.
    #[must_use]
    pub const fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(Self::Disabled),
            1 => Some(Self::Disconnected),
            2 => Some(Self::Lowered),
            3 => Some(Self::Minor),
            4 => Some(Self::Moderate),
            5 => Some(Self::Severe),
            6 => Some(Self::Critical),
            _ => None,
        }
    }

    /// Returns true if the state is strictly more severe than `Lowered`.
    #[must_use]
    pub const fn is_raised(self) -> bool {
        self.rank() > Self::Lowered.rank()
    }

    /// Wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::Disconnected => "DISCONNECTED",
            Self::Lowered => "LOWERED",
            Self::Minor => "MINOR",
            Self::Moderate => "MODERATE",
            Self::Severe => "SEVERE",
            Self::Critical => "CRITICAL",
        }
    }
}

impl PartialOrd for AlarmState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AlarmState {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlarmState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}
