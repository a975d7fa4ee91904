//! Request and configuration types for the alarm manager.

use std::time::Duration;

use alarm_hub_core::codes;
use serde::{Deserialize, Serialize};

/// Request to register a new alarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRegistration {
    /// Unique alarm ID.
    pub id: String,
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Optional classification tag used by source-wide connect/disconnect.
    #[serde(default)]
    pub source: Option<String>,
    /// Whether the alarm may be disabled.
    #[serde(default = "AlarmRegistration::default_can_disable")]
    pub can_disable: bool,
}

impl AlarmRegistration {
    const fn default_can_disable() -> bool {
        true
    }

    /// Create a registration for the given ID with default settings.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            source: None,
            can_disable: Self::default_can_disable(),
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the source tag.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set whether the alarm may be disabled.
    #[must_use]
    pub fn with_can_disable(mut self, can_disable: bool) -> Self {
        self.can_disable = can_disable;
        self
    }
}

/// Configuration for the alarm manager.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    /// How long the drain loop waits before re-checking a closed dequeue gate.
    #[serde(default = "ManagerConfig::default_gate_poll_interval_ms")]
    pub gate_poll_interval_ms: u64,

    /// Message used when a test session starts without one.
    #[serde(default = "ManagerConfig::default_start_test_message")]
    pub start_test_message: String,

    /// Message used when a test session ends.
    #[serde(default = "ManagerConfig::default_end_test_message")]
    pub end_test_message: String,

    /// Default duration of a timed test session.
    #[serde(default = "ManagerConfig::default_test_duration_ms")]
    pub default_test_duration_ms: u64,
}

impl ManagerConfig {
    const fn default_gate_poll_interval_ms() -> u64 {
        50
    }

    fn default_start_test_message() -> String {
        codes::START_TEST_MESSAGE.to_string()
    }

    fn default_end_test_message() -> String {
        codes::END_TEST_MESSAGE.to_string()
    }

    const fn default_test_duration_ms() -> u64 {
        5000
    }

    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    ///
    /// # Environment Variables
    ///
    /// - `ALARM_HUB_GATE_POLL_MS`: Dequeue gate poll interval
    /// - `ALARM_HUB_START_TEST_MESSAGE`: Message for test starts
    /// - `ALARM_HUB_END_TEST_MESSAGE`: Message for test ends
    /// - `ALARM_HUB_TEST_DURATION_MS`: Default timed test duration
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ALARM_HUB_GATE_POLL_MS") {
            if let Ok(n) = val.parse() {
                config.gate_poll_interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("ALARM_HUB_START_TEST_MESSAGE") {
            config.start_test_message = val;
        }
        if let Ok(val) = std::env::var("ALARM_HUB_END_TEST_MESSAGE") {
            config.end_test_message = val;
        }
        if let Ok(val) = std::env::var("ALARM_HUB_TEST_DURATION_MS") {
            if let Ok(n) = val.parse() {
                config.default_test_duration_ms = n;
            }
        }

        config
    }

    /// Get the gate poll interval as a `Duration`.
    #[must_use]
    pub const fn gate_poll_interval(&self) -> Duration {
        Duration::from_millis(self.gate_poll_interval_ms)
    }

    /// Get the default test duration as a `Duration`.
    #[must_use]
    pub const fn default_test_duration(&self) -> Duration {
        Duration::from_millis(self.default_test_duration_ms)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            gate_poll_interval_ms: Self::default_gate_poll_interval_ms(),
            start_test_message: Self::default_start_test_message(),
            end_test_message: Self::default_end_test_message(),
            default_test_duration_ms: Self::default_test_duration_ms(),
        }
    }
}
