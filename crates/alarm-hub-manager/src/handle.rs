//! Shared, read-only handles to registered alarms.

use std::fmt;
use std::sync::Arc;

use alarm_hub_core::{Alarm, AlarmId, AlarmState};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A live reference to an alarm owned by an `AlarmManager`.
///
/// Handles see every later change to the alarm; use [`AlarmHandle::snapshot`]
/// to capture its current value. Only the manager can write through a handle.
#[derive(Clone)]
pub struct AlarmHandle {
    id: AlarmId,
    inner: Arc<RwLock<Alarm>>,
}

impl AlarmHandle {
    pub(crate) fn new(alarm: Alarm) -> Self {
        Self {
            id: alarm.id().clone(),
            inner: Arc::new(RwLock::new(alarm)),
        }
    }

    /// The alarm ID.
    #[must_use]
    pub const fn id(&self) -> &AlarmId {
        &self.id
    }

    /// Lock the alarm for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Alarm> {
        self.inner.read()
    }

    /// Clone the alarm's current value.
    #[must_use]
    pub fn snapshot(&self) -> Alarm {
        self.inner.read().clone()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AlarmState {
        self.inner.read().state()
    }

    /// Returns true if both handles point at the same alarm.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Alarm> {
        self.inner.write()
    }
}

impl fmt::Debug for AlarmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlarmHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
