//! Message shapes for exchanging alarm state with remote peers.
//!
//! Transport is out of scope here: these types only define what goes on the
//! wire and how the manager applies what comes back. Only the ID, state and
//! message of an alarm are transmitted.

use alarm_hub_core::{codes, Alarm, AlarmId, AlarmState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ManagerError, Result};
use crate::manager::AlarmManager;

/// Command asking a peer for its full alarm list.
pub const COMMAND_LIST_ALARMS: &str = "list-alarms";

/// Command asking a peer to test one of its alarms.
pub const COMMAND_TEST_ALARM: &str = "test-alarm";

/// Kind of message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// A single alarm changed.
    Alert,
    /// A request for the peer to do something.
    Command,
    /// The reply to a command.
    CommandResponse,
}

/// The transmitted part of an alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmSnapshot {
    /// Alarm ID.
    pub id: AlarmId,
    /// Alarm state.
    pub state: AlarmState,
    /// Last message.
    #[serde(default)]
    pub message: String,
}

impl From<&Alarm> for AlarmSnapshot {
    fn from(alarm: &Alarm) -> Self {
        Self {
            id: alarm.id().clone(),
            state: alarm.state(),
            message: alarm.message().to_string(),
        }
    }
}

/// A message exchanged with a remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID.
    pub id: Uuid,
    /// Message kind.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Recipient, if addressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Alert severity rank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<u8>,
    /// Command name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Alarm carried by an alert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm: Option<AlarmSnapshot>,
    /// Alarm list carried by a list-alarms response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarms: Option<Vec<AlarmSnapshot>>,
}

impl Message {
    /// Create an empty message of the given kind with a fresh ID.
    #[must_use]
    pub fn new(message_type: MessageType) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_type,
            target: None,
            sub_type: None,
            command: None,
            alarm: None,
            alarms: None,
        }
    }

    /// Create an alert for `alarm`. The sub-type is the severity rank.
    #[must_use]
    pub fn alert(alarm: &Alarm, target: Option<&str>) -> Self {
        Self {
            target: target.map(str::to_string),
            sub_type: Some(alarm.state().rank()),
            alarm: Some(AlarmSnapshot::from(alarm)),
            ..Self::new(MessageType::Alert)
        }
    }

    /// Create a command addressed to `target`.
    #[must_use]
    pub fn command(target: &str, command: &str) -> Self {
        Self {
            target: Some(target.to_string()),
            command: Some(command.to_string()),
            ..Self::new(MessageType::Command)
        }
    }

    /// Create a `list-alarms` command addressed to `target`.
    #[must_use]
    pub fn list_alarms(target: &str) -> Self {
        Self::command(target, COMMAND_LIST_ALARMS)
    }

    /// True if this is an alert carrying an alarm.
    #[must_use]
    pub fn is_alert_message(&self) -> bool {
        self.message_type == MessageType::Alert && self.alarm.is_some()
    }

    /// True if this is the named command.
    #[must_use]
    pub fn is_command(&self, command: &str) -> bool {
        self.message_type == MessageType::Command && self.command.as_deref() == Some(command)
    }
}

impl AlarmManager {
    /// Create an alert message for a registered alarm.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::AlarmNotFound` for unknown IDs.
    pub fn create_alert_message(&self, id: &str, target: Option<&str>) -> Result<Message> {
        let alarm = self.require_alarm(id)?;
        let message = Message::alert(&alarm.read(), target);
        Ok(message)
    }

    /// Create a `list-alarms` command addressed to `target`.
    #[must_use]
    pub fn create_list_alarms_message(&self, target: &str) -> Message {
        tracing::debug!(target_peer = %target, "Requesting alarm list");
        Message::list_alarms(target)
    }

    /// Attach snapshots of every registered alarm to `message`.
    pub fn add_alarms_list_to_message(&self, message: &mut Message) {
        let alarms = self.alarms().iter().map(AlarmSnapshot::from).collect();
        message.alarms = Some(alarms);
    }

    /// Apply a remote alert to the matching local alarm.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::InvalidMessage` unless the message is an alert
    /// carrying an alarm, `ManagerError::AlarmNotFound` if the alarm is not
    /// registered here, and any error from [`AlarmManager::update_alarm`].
    pub fn update_from_alert_message(&self, message: &Message) -> Result<()> {
        if message.message_type != MessageType::Alert {
            return Err(ManagerError::InvalidMessage(format!(
                "message is of type {:?}, expected Alert",
                message.message_type
            )));
        }
        let alarm = message
            .alarm
            .as_ref()
            .ok_or_else(|| ManagerError::InvalidMessage("alert carries no alarm".to_string()))?;

        self.update_alarm(alarm.id.as_str(), alarm.state, Some(&alarm.message), codes::NO_CODE)?;
        Ok(())
    }

    /// Apply a remote alarm list to the matching local alarms.
    ///
    /// Alarms not registered here are skipped. Returns the received list.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::InvalidMessage` if the message carries no list,
    /// and any error from [`AlarmManager::update_alarm`].
    pub fn update_from_list_alarms_response(&self, response: &Message) -> Result<Vec<AlarmSnapshot>> {
        let alarms = response
            .alarms
            .clone()
            .ok_or_else(|| ManagerError::InvalidMessage("message does not contain an alarm list".to_string()))?;

        for alarm in &alarms {
            if self.has_alarm(alarm.id.as_str()) {
                self.update_alarm(alarm.id.as_str(), alarm.state, Some(&alarm.message), codes::NO_CODE)?;
            } else {
                tracing::debug!(alarm_id = %alarm.id, "Skipping unknown alarm in list");
            }
        }
        Ok(alarms)
    }
}
