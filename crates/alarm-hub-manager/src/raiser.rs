//! The raiser capability.
//!
//! Raisers are the producers that own alarms: a pump controller, a network
//! monitor, a sensor bridge. The manager only needs two things from them:
//! somewhere to store a back-reference to the manager, and a callback to
//! register their alarms once they are added.

use std::sync::{Arc, Weak};

use alarm_hub_core::RaiserId;
use parking_lot::Mutex;

use crate::error::{ManagerError, Result};
use crate::manager::AlarmManager;
use crate::types::AlarmRegistration;

/// Trait implemented by anything that owns alarms.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Weak};
/// use alarm_hub_manager::{AlarmManager, AlarmRaiser, ManagerError, RaiserId, Result};
/// use parking_lot::Mutex;
///
/// #[derive(Default)]
/// struct PumpMonitor {
///     binding: Mutex<Option<(Weak<AlarmManager>, RaiserId)>>,
/// }
///
/// impl AlarmRaiser for PumpMonitor {
///     fn attach(&self, manager: Weak<AlarmManager>, id: RaiserId) {
///         *self.binding.lock() = Some((manager, id));
///     }
///
///     fn register_alarms(&self) -> Result<()> {
///         let (manager, id) = self
///             .binding
///             .lock()
///             .clone()
///             .ok_or_else(|| ManagerError::Raiser("not attached".into()))?;
///         let manager = manager
///             .upgrade()
///             .ok_or_else(|| ManagerError::Raiser("manager dropped".into()))?;
///         manager.register_alarm(id, "pump-temp", Some("Pump temperature"))?;
///         Ok(())
///     }
/// }
///
/// let manager = AlarmManager::with_defaults();
/// manager.add_raiser(Arc::new(PumpMonitor::default())).unwrap();
/// assert!(manager.has_alarm("pump-temp"));
/// ```
pub trait AlarmRaiser: Send + Sync {
    /// Store the owning manager and the handle it assigned to this raiser.
    ///
    /// Called once, right before [`AlarmRaiser::register_alarms`].
    fn attach(&self, manager: Weak<AlarmManager>, id: RaiserId);

    /// Register this raiser's alarms with the attached manager.
    ///
    /// # Errors
    ///
    /// Returns an error if any registration fails.
    fn register_alarms(&self) -> Result<()>;
}

/// A raiser that owns a fixed set of alarms.
///
/// Useful for built-in health alarms and for wiring external sources whose
/// alarm list is known up front.
pub struct StaticRaiser {
    name: String,
    alarms: Vec<AlarmRegistration>,
    binding: Mutex<Option<(Weak<AlarmManager>, RaiserId)>>,
}

impl StaticRaiser {
    /// Create a raiser that registers `alarms` when added to a manager.
    #[must_use]
    pub fn new(name: impl Into<String>, alarms: impl IntoIterator<Item = AlarmRegistration>) -> Self {
        Self {
            name: name.into(),
            alarms: alarms.into_iter().collect(),
            binding: Mutex::new(None),
        }
    }

    /// The raiser name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ID assigned by the manager, once attached.
    #[must_use]
    pub fn id(&self) -> Option<RaiserId> {
        self.binding.lock().as_ref().map(|(_, id)| *id)
    }

    /// The attached manager, if it is still alive.
    #[must_use]
    pub fn manager(&self) -> Option<Arc<AlarmManager>> {
        self.binding
            .lock()
            .as_ref()
            .and_then(|(manager, _)| manager.upgrade())
    }
}

impl AlarmRaiser for StaticRaiser {
    fn attach(&self, manager: Weak<AlarmManager>, id: RaiserId) {
        *self.binding.lock() = Some((manager, id));
    }

    fn register_alarms(&self) -> Result<()> {
        let id = self
            .id()
            .ok_or_else(|| ManagerError::Raiser(format!("{} is not attached", self.name)))?;
        let manager = self
            .manager()
            .ok_or_else(|| ManagerError::Raiser(format!("{}: manager dropped", self.name)))?;

        for registration in &self.alarms {
            manager.register_alarm_with(id, registration.clone())?;
        }
        tracing::debug!(raiser = %id, name = %self.name, count = self.alarms.len(), "Registered raiser alarms");
        Ok(())
    }
}
