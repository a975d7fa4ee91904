//! The alarm registry.
//!
//! `AlarmManager` owns every registered alarm, the raisers that own them, the
//! single test session slot and the dispatch queue. All state changes go
//! through [`AlarmManager::update_alarm`], which notifies the "changed"
//! listeners and queues the alarm for the drain loop.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use alarm_hub_core::{codes, lifecycle, Alarm, AlarmId, AlarmState, CoreError, RaiserId};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{ManagerError, Result};
use crate::handle::AlarmHandle;
use crate::notify::{Listeners, NotifyError};
use crate::queue::DispatchQueue;
use crate::raiser::AlarmRaiser;
use crate::session::{self, TestSession};
use crate::types::{AlarmRegistration, ManagerConfig};

struct RaiserEntry {
    id: RaiserId,
    raiser: Arc<dyn AlarmRaiser>,
}

#[derive(Default)]
struct Registry {
    alarms: HashMap<AlarmId, AlarmHandle>,
    raisers: Vec<RaiserEntry>,
    next_raiser: u32,
    test: Option<TestSession>,
    next_session: u64,
}

/// Registry of alarms and their raisers.
///
/// Always shared through an `Arc`; raisers and test timers hold weak
/// references back to it.
pub struct AlarmManager {
    registry: RwLock<Registry>,
    queue: DispatchQueue,
    changed: Listeners,
    dequeued: Listeners,
    config: ManagerConfig,
    me: Weak<AlarmManager>,
}

impl AlarmManager {
    /// Create a new manager.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            registry: RwLock::new(Registry::default()),
            queue: DispatchQueue::new(config.gate_poll_interval()),
            changed: Listeners::new("changed"),
            dequeued: Listeners::new("dequeued"),
            config,
            me: me.clone(),
        })
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults() -> Arc<Self> {
        Self::new(ManagerConfig::default())
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register an alarm owned by `raiser`.
    ///
    /// # Errors
    ///
    /// See [`AlarmManager::register_alarm_with`].
    pub fn register_alarm(&self, raiser: RaiserId, id: &str, name: Option<&str>) -> Result<AlarmHandle> {
        let mut registration = AlarmRegistration::new(id);
        if let Some(name) = name {
            registration = registration.with_name(name);
        }
        self.register_alarm_with(raiser, registration)
    }

    /// Register an alarm owned by `raiser` from a full registration request.
    ///
    /// The alarm starts out `Disconnected`.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::UnknownRaiser` if the raiser was never added,
    /// `ManagerError::Core` if the ID is empty, and
    /// `ManagerError::DuplicateAlarm` if the ID is taken.
    pub fn register_alarm_with(&self, raiser: RaiserId, registration: AlarmRegistration) -> Result<AlarmHandle> {
        let id = AlarmId::new(registration.id).map_err(CoreError::from)?;

        let mut registry = self.registry.write();
        if !registry.raisers.iter().any(|entry| entry.id == raiser) {
            return Err(ManagerError::UnknownRaiser(raiser));
        }
        if registry.alarms.contains_key(&id) {
            return Err(ManagerError::DuplicateAlarm(id));
        }

        let alarm = Alarm::new(id.clone())
            .with_name(registration.name)
            .with_source(registration.source)
            .with_can_disable(registration.can_disable)
            .with_raiser(raiser);
        let handle = AlarmHandle::new(alarm);
        registry.alarms.insert(id, handle.clone());

        tracing::info!(alarm_id = %handle.id(), raiser = %raiser, "Registered alarm");
        Ok(handle)
    }

    /// Lower and remove an alarm.
    ///
    /// Returns `false` if no such alarm exists. Lowering is best-effort:
    /// failures are logged and the alarm is removed anyway.
    ///
    /// # Errors
    ///
    /// Does not currently fail.
    pub fn deregister_alarm(&self, id: &str) -> Result<bool> {
        let Some(handle) = self.get_alarm(id) else {
            return Ok(false);
        };
        let message = format!("Deregistering alarm {id}");

        let session = {
            let mut registry = self.registry.write();
            match registry.test.as_ref() {
                Some(active) if active.alarm.ptr_eq(&handle) => registry.test.take(),
                _ => None,
            }
        };
        if let Some(session) = session {
            session.disarm();
            if let Err(e) = self.finish_test(session) {
                tracing::warn!(alarm_id = %id, error = %e, "Failed to end test before removal");
            }
        }

        let disabled = handle.read().is_disabled();
        if disabled {
            if let Err(e) = self.update_alarm(id, AlarmState::Disconnected, Some(&message), codes::NO_CODE) {
                tracing::warn!(alarm_id = %id, error = %e, "Failed to re-enable alarm before removal");
            }
        }
        if let Err(e) = self.lower(id, &message, codes::NO_CODE) {
            tracing::warn!(alarm_id = %id, error = %e, "Failed to lower alarm before removal");
        }

        self.registry.write().alarms.remove(id);

        tracing::info!(alarm_id = %id, "Deregistered alarm");
        Ok(true)
    }

    /// Add a raiser and let it register its alarms.
    ///
    /// Adding the same raiser twice is a no-op that returns its existing ID.
    ///
    /// # Errors
    ///
    /// Returns whatever the raiser's `register_alarms` returns. The raiser
    /// stays added, along with any alarms it registered before failing.
    pub fn add_raiser(&self, raiser: Arc<dyn AlarmRaiser>) -> Result<RaiserId> {
        let id = {
            let mut registry = self.registry.write();
            if let Some(entry) = registry
                .raisers
                .iter()
                .find(|entry| same_raiser(&entry.raiser, &raiser))
            {
                return Ok(entry.id);
            }
            let id = RaiserId::from_raw(registry.next_raiser);
            registry.next_raiser += 1;
            registry.raisers.push(RaiserEntry {
                id,
                raiser: Arc::clone(&raiser),
            });
            id
        };

        raiser.attach(self.me.clone(), id);
        raiser.register_alarms()?;

        tracing::info!(raiser = %id, "Added alarm raiser");
        Ok(id)
    }

    /// Add several raisers in order.
    ///
    /// # Errors
    ///
    /// Stops at the first raiser that fails to register its alarms.
    pub fn add_raisers<I>(&self, raisers: I) -> Result<Vec<RaiserId>>
    where
        I: IntoIterator<Item = Arc<dyn AlarmRaiser>>,
    {
        raisers.into_iter().map(|raiser| self.add_raiser(raiser)).collect()
    }

    /// Deregister every alarm and forget every raiser.
    ///
    /// Returns the number of alarms removed.
    ///
    /// # Errors
    ///
    /// Propagates deregistration errors.
    pub fn remove_raisers(&self) -> Result<usize> {
        let ids: Vec<AlarmId> = self.registry.read().alarms.keys().cloned().collect();
        let mut removed = 0;
        for id in &ids {
            if self.deregister_alarm(id.as_str())? {
                removed += 1;
            }
        }
        let raisers = std::mem::take(&mut self.registry.write().raisers);

        tracing::info!(alarms = removed, raisers = raisers.len(), "Removed all raisers");
        Ok(removed)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Apply a state change to an alarm.
    ///
    /// When the state or code actually changes, the "changed" listeners run
    /// first and the alarm is then queued for the drain loop.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::AlarmNotFound` for unknown IDs and
    /// `ManagerError::Core` if the transition is not allowed. A rejected
    /// transition leaves the alarm untouched.
    pub fn update_alarm(&self, id: &str, state: AlarmState, message: Option<&str>, code: i32) -> Result<AlarmHandle> {
        let handle = self.require_alarm(id)?;
        let changed = handle.write().update(state, message, code)?;

        if changed {
            tracing::debug!(alarm_id = %id, state = %state, code, "Alarm changed");
            self.changed.notify(&handle);
            self.queue.enqueue(handle.clone());
        }
        Ok(handle)
    }

    /// Raise an alarm to `state`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRaiseState` (wrapped) unless `state` is
    /// `Minor` through `Critical`, plus the errors of
    /// [`AlarmManager::update_alarm`].
    pub fn raise(&self, id: &str, state: AlarmState, message: &str, code: i32) -> Result<AlarmHandle> {
        lifecycle::validate_raise_target(state)?;
        self.update_alarm(id, state, Some(message), code)
    }

    /// Lower an alarm.
    ///
    /// # Errors
    ///
    /// See [`AlarmManager::update_alarm`].
    pub fn lower(&self, id: &str, message: &str, code: i32) -> Result<AlarmHandle> {
        self.update_alarm(id, AlarmState::Lowered, Some(message), code)
    }

    /// Enable an alarm by moving it to `Disconnected`.
    ///
    /// Applies to any state; its raiser reconnects it afterwards.
    ///
    /// # Errors
    ///
    /// See [`AlarmManager::update_alarm`].
    pub fn enable(&self, id: &str) -> Result<AlarmHandle> {
        self.update_alarm(id, AlarmState::Disconnected, None, codes::NO_CODE)
    }

    /// Disable an alarm.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CannotDisable` (wrapped) if the alarm was
    /// registered with `can_disable = false`, and `CoreError::Disabled`
    /// (wrapped) if it is already disabled.
    pub fn disable(&self, id: &str) -> Result<AlarmHandle> {
        self.update_alarm(id, AlarmState::Disabled, None, codes::NO_CODE)
    }

    // =========================================================================
    // Test Sessions
    // =========================================================================

    /// Put an alarm under test by raising it to `state`.
    ///
    /// Test transitions fire the "changed" listeners but are not queued.
    /// `message` falls back to the configured start-test message.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::TestInProgress` if another alarm is under test,
    /// `ManagerError::AlarmNotFound`, `ManagerError::AlreadyRaised` or
    /// `ManagerError::Disconnected` if the alarm cannot be tested, and
    /// `ManagerError::TestStartFailed` if raising it failed (the test is
    /// rolled back).
    pub fn start_test(&self, id: &str, state: AlarmState, message: Option<&str>, code: i32) -> Result<AlarmHandle> {
        self.begin_test(id, state, message, code)
            .map(|(handle, _, _)| handle)
    }

    /// End the current test session, lowering the alarm under test.
    ///
    /// Returns `None` if no test was running.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::Core` if the alarm could not be lowered. The
    /// session is cleared regardless.
    pub fn end_test(&self) -> Result<Option<AlarmHandle>> {
        let session = self.registry.write().test.take();
        let Some(session) = session else {
            return Ok(None);
        };
        session.disarm();
        self.finish_test(session).map(Some)
    }

    /// Start a test that ends by itself after `duration`.
    ///
    /// `duration` falls back to the configured default test duration.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::NoRuntime` when called outside a tokio runtime,
    /// plus the errors of [`AlarmManager::start_test`].
    pub fn run_test(
        &self,
        id: &str,
        state: AlarmState,
        message: Option<&str>,
        duration: Option<Duration>,
        code: i32,
    ) -> Result<AlarmHandle> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| ManagerError::NoRuntime(e.to_string()))?;
        let duration = duration.unwrap_or_else(|| self.config.default_test_duration());

        let (handle, token, timer) = self.begin_test(id, state, message, code)?;
        session::spawn_timer(&runtime, self.me.clone(), token, timer, duration);

        tracing::debug!(alarm_id = %id, session = token, ?duration, "Armed test timer");
        Ok(handle)
    }

    /// True if an alarm is currently under test.
    #[must_use]
    pub fn is_testing(&self) -> bool {
        self.registry
            .read()
            .test
            .as_ref()
            .is_some_and(|session| session.alarm.read().is_testing())
    }

    /// The alarm currently under test.
    #[must_use]
    pub fn alarm_under_test(&self) -> Option<AlarmHandle> {
        self.registry
            .read()
            .test
            .as_ref()
            .map(|session| session.alarm.clone())
    }

    /// End session `token` if it is still the active one.
    pub(crate) fn end_test_session(&self, token: u64) -> Result<Option<AlarmHandle>> {
        let session = {
            let mut registry = self.registry.write();
            match registry.test.as_ref() {
                Some(active) if active.token == token => registry.test.take(),
                _ => None,
            }
        };
        let Some(session) = session else {
            return Ok(None);
        };
        self.finish_test(session).map(Some)
    }

    fn begin_test(
        &self,
        id: &str,
        state: AlarmState,
        message: Option<&str>,
        code: i32,
    ) -> Result<(AlarmHandle, u64, CancellationToken)> {
        let message = message.unwrap_or(self.config.start_test_message.as_str());

        let (handle, token, timer, changed) = {
            let mut registry = self.registry.write();
            if let Some(active) = &registry.test {
                return Err(ManagerError::TestInProgress {
                    requested: id.to_string(),
                    active: active.alarm.id().clone(),
                });
            }
            let handle = registry
                .alarms
                .get(id)
                .cloned()
                .ok_or_else(|| ManagerError::AlarmNotFound(id.to_string()))?;
            {
                let alarm = handle.read();
                if alarm.is_raised() {
                    return Err(ManagerError::AlreadyRaised(alarm.id().clone()));
                }
                if alarm.state() == AlarmState::Disconnected {
                    return Err(ManagerError::Disconnected(alarm.id().clone()));
                }
            }

            registry.next_session += 1;
            let session = TestSession::new(handle.clone(), registry.next_session);
            let (token, timer) = (session.token, session.timer.clone());
            registry.test = Some(session);

            let started = handle.write().start_test(state, message, code);
            match started {
                Ok(changed) => (handle, token, timer, changed),
                Err(e) => {
                    if let Some(session) = registry.test.take() {
                        session.disarm();
                    }
                    let rollback = handle
                        .write()
                        .end_test(&self.config.end_test_message, codes::END_TEST);
                    drop(registry);

                    // Rollback is a test transition: notified, never queued
                    match rollback {
                        Ok(true) => {
                            self.changed.notify(&handle);
                        }
                        Ok(false) => {}
                        Err(rollback) => {
                            tracing::warn!(alarm_id = %id, error = %rollback, "Test rollback could not lower alarm");
                        }
                    }
                    tracing::warn!(alarm_id = %id, error = %e, "Failed to start test, rolled back");
                    return Err(ManagerError::TestStartFailed {
                        alarm_id: handle.id().clone(),
                        source: Box::new(e.into()),
                    });
                }
            }
        };

        tracing::info!(alarm_id = %id, state = %state, session = token, "Started alarm test");
        if changed {
            self.changed.notify(&handle);
        }
        Ok((handle, token, timer))
    }

    fn finish_test(&self, session: TestSession) -> Result<AlarmHandle> {
        let changed = session
            .alarm
            .write()
            .end_test(&self.config.end_test_message, codes::END_TEST)?;

        tracing::info!(alarm_id = %session.alarm.id(), session = session.token, "Ended alarm test");
        if changed {
            self.changed.notify(&session.alarm);
        }
        Ok(session.alarm)
    }

    // =========================================================================
    // Connectivity
    // =========================================================================

    /// Lower every disconnected alarm, optionally only those of one raiser.
    ///
    /// Disabled alarms are left alone. Returns the number of alarms lowered.
    ///
    /// # Errors
    ///
    /// Stops at the first alarm that fails to lower.
    pub fn connect(&self, raiser: Option<RaiserId>) -> Result<usize> {
        self.connect_matching(|alarm| match raiser {
            Some(raiser) => alarm.raiser() == Some(raiser),
            None => true,
        })
    }

    /// Lower every disconnected alarm tagged with `source`.
    ///
    /// # Errors
    ///
    /// Stops at the first alarm that fails to lower.
    pub fn connect_source(&self, source: &str) -> Result<usize> {
        self.connect_matching(|alarm| alarm.source() == Some(source))
    }

    /// Disconnect every connected alarm, optionally only those of one raiser.
    ///
    /// Returns the number of alarms disconnected.
    ///
    /// # Errors
    ///
    /// Stops at the first alarm that fails to disconnect.
    pub fn disconnect(&self, raiser: Option<RaiserId>) -> Result<usize> {
        self.disconnect_matching(|alarm| match raiser {
            Some(raiser) => alarm.raiser() == Some(raiser),
            None => true,
        })
    }

    /// Disconnect every connected alarm tagged with `source`.
    ///
    /// # Errors
    ///
    /// Stops at the first alarm that fails to disconnect.
    pub fn disconnect_source(&self, source: &str) -> Result<usize> {
        self.disconnect_matching(|alarm| alarm.source() == Some(source))
    }

    fn connect_matching(&self, filter: impl Fn(&Alarm) -> bool) -> Result<usize> {
        let targets = self.select(|alarm| !alarm.is_connected() && !alarm.is_disabled() && filter(alarm));
        for handle in &targets {
            let id = handle.id();
            self.lower(id.as_str(), &format!("Connecting {id}"), codes::CONNECTING)?;
        }
        Ok(targets.len())
    }

    fn disconnect_matching(&self, filter: impl Fn(&Alarm) -> bool) -> Result<usize> {
        let targets = self.select(|alarm| alarm.is_connected() && filter(alarm));
        for handle in &targets {
            let id = handle.id();
            self.update_alarm(
                id.as_str(),
                AlarmState::Disconnected,
                Some(&format!("Disconnecting {id}")),
                codes::NO_CODE,
            )?;
        }
        Ok(targets.len())
    }

    fn select(&self, filter: impl Fn(&Alarm) -> bool) -> Vec<AlarmHandle> {
        self.registry
            .read()
            .alarms
            .values()
            .filter(|handle| filter(&handle.read()))
            .cloned()
            .collect()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Get an alarm by ID.
    #[must_use]
    pub fn get_alarm(&self, id: &str) -> Option<AlarmHandle> {
        self.registry.read().alarms.get(id).cloned()
    }

    /// Get an alarm by ID, failing if it is not registered.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::AlarmNotFound`.
    pub fn require_alarm(&self, id: &str) -> Result<AlarmHandle> {
        self.get_alarm(id)
            .ok_or_else(|| ManagerError::AlarmNotFound(id.to_string()))
    }

    /// True if an alarm with this ID is registered.
    #[must_use]
    pub fn has_alarm(&self, id: &str) -> bool {
        self.registry.read().alarms.contains_key(id)
    }

    /// Snapshots of every registered alarm.
    #[must_use]
    pub fn alarms(&self) -> Vec<Alarm> {
        self.select(|_| true).iter().map(AlarmHandle::snapshot).collect()
    }

    /// Current state of every alarm.
    #[must_use]
    pub fn alarm_states(&self) -> HashMap<AlarmId, AlarmState> {
        self.collect_by(Alarm::state)
    }

    /// Current message of every alarm.
    #[must_use]
    pub fn alarm_messages(&self) -> HashMap<AlarmId, String> {
        self.collect_by(|alarm| alarm.message().to_string())
    }

    /// Current code of every alarm.
    #[must_use]
    pub fn alarm_codes(&self) -> HashMap<AlarmId, i32> {
        self.collect_by(Alarm::code)
    }

    fn collect_by<T>(&self, value: impl Fn(&Alarm) -> T) -> HashMap<AlarmId, T> {
        self.registry
            .read()
            .alarms
            .iter()
            .map(|(id, handle)| (id.clone(), value(&handle.read())))
            .collect()
    }

    /// True if any alarm is raised.
    #[must_use]
    pub fn is_alarm_raised(&self) -> bool {
        self.registry
            .read()
            .alarms
            .values()
            .any(|handle| handle.read().is_raised())
    }

    /// True if any alarm is in exactly `state`.
    #[must_use]
    pub fn has_alarm_with_state(&self, state: AlarmState) -> bool {
        self.registry
            .read()
            .alarms
            .values()
            .any(|handle| handle.state() == state)
    }

    /// True if the alarm is disabled.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::AlarmNotFound`.
    pub fn is_alarm_disabled(&self, id: &str) -> Result<bool> {
        Ok(self.require_alarm(id)?.read().is_disabled())
    }

    /// Number of raisers added.
    #[must_use]
    pub fn raiser_count(&self) -> usize {
        self.registry.read().raisers.len()
    }

    /// Number of alarms waiting in the dispatch queue.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Subscribe to in-line change notifications.
    pub fn on_changed<F>(&self, listener: F)
    where
        F: Fn(&AlarmHandle) -> std::result::Result<(), NotifyError> + Send + Sync + 'static,
    {
        self.changed.subscribe(listener);
    }

    /// Subscribe to notifications from the drain loop.
    pub fn on_dequeued<F>(&self, listener: F)
    where
        F: Fn(&AlarmHandle) -> std::result::Result<(), NotifyError> + Send + Sync + 'static,
    {
        self.dequeued.subscribe(listener);
    }

    /// Drain the dispatch queue until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::DrainAlreadyRunning` if a drain loop is
    /// already running.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.run_with_gate(cancel, || true).await
    }

    /// Drain the dispatch queue, consuming only while `can_dequeue` is true.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::DrainAlreadyRunning` if a drain loop is
    /// already running.
    pub async fn run_with_gate<G>(&self, cancel: CancellationToken, can_dequeue: G) -> Result<()>
    where
        G: Fn() -> bool + Send,
    {
        tracing::info!(queued = self.queue.len(), "Starting alarm dispatch");
        self.queue
            .run(cancel, can_dequeue, |alarm| {
                self.dequeued.notify(&alarm);
            })
            .await
    }
}

fn same_raiser(a: &Arc<dyn AlarmRaiser>, b: &Arc<dyn AlarmRaiser>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raiser::StaticRaiser;
    use parking_lot::Mutex;

    fn setup() -> (Arc<AlarmManager>, RaiserId) {
        let manager = AlarmManager::with_defaults();
        let raiser = Arc::new(StaticRaiser::new(
            "plant",
            [
                AlarmRegistration::new("pump-temp").with_name("Pump temperature"),
                AlarmRegistration::new("valve-1").with_source("plc-2"),
                AlarmRegistration::new("door").with_can_disable(false),
            ],
        ));
        let id = manager.add_raiser(raiser).unwrap();
        (manager, id)
    }

    fn record_changes(manager: &AlarmManager) -> Arc<Mutex<Vec<(String, AlarmState)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager.on_changed(move |alarm| {
            sink.lock().push((alarm.id().to_string(), alarm.state()));
            Ok(())
        });
        seen
    }

    #[test]
    fn registered_alarms_start_disconnected() {
        let (manager, raiser) = setup();

        assert_eq!(manager.raiser_count(), 1);
        assert_eq!(manager.alarms().len(), 3);
        let pump = manager.require_alarm("pump-temp").unwrap();
        assert_eq!(pump.state(), AlarmState::Disconnected);
        assert_eq!(pump.read().raiser(), Some(raiser));
        assert!(!pump.read().is_connected());
    }

    #[test]
    fn register_duplicate_fails() {
        let (manager, raiser) = setup();

        let result = manager.register_alarm(raiser, "pump-temp", None);
        assert!(matches!(result, Err(ManagerError::DuplicateAlarm(ref id)) if id.as_str() == "pump-temp"));
    }

    #[test]
    fn register_requires_known_raiser() {
        let (manager, _) = setup();

        let result = manager.register_alarm(RaiserId::from_raw(42), "fan", None);
        assert!(matches!(result, Err(ManagerError::UnknownRaiser(_))));
        assert!(!manager.has_alarm("fan"));
    }

    #[test]
    fn register_rejects_empty_id() {
        let (manager, raiser) = setup();

        let result = manager.register_alarm(raiser, "  ", None);
        assert!(matches!(result, Err(ManagerError::Core(CoreError::InvalidId(_)))));
    }

    #[test]
    fn add_raiser_is_idempotent() {
        let manager = AlarmManager::with_defaults();
        let raiser: Arc<dyn AlarmRaiser> = Arc::new(StaticRaiser::new("solo", [AlarmRegistration::new("fan")]));

        let first = manager.add_raiser(Arc::clone(&raiser)).unwrap();
        let second = manager.add_raiser(raiser).unwrap();

        assert_eq!(first, second);
        assert_eq!(manager.raiser_count(), 1);
    }

    #[test]
    fn pump_temp_raise_and_lower() {
        let (manager, _) = setup();
        let changes = record_changes(&manager);

        manager.connect(None).unwrap();
        let pump = manager
            .raise("pump-temp", AlarmState::Severe, "overheat", 42)
            .unwrap();
        assert!(manager.is_alarm_raised());
        assert!(pump.read().last_raised().is_some());
        assert_eq!(pump.read().code(), 42);

        manager.lower("pump-temp", "ok", codes::NO_CODE).unwrap();
        assert!(pump.read().is_lowered());
        assert!(pump.read().last_lowered().is_some());
        assert!(!manager.is_alarm_raised());

        let pump_changes: Vec<AlarmState> = changes
            .lock()
            .iter()
            .filter(|(id, _)| id == "pump-temp")
            .map(|(_, state)| *state)
            .collect();
        assert_eq!(
            pump_changes,
            vec![AlarmState::Lowered, AlarmState::Severe, AlarmState::Lowered]
        );
    }

    #[test]
    fn unchanged_update_is_silent() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();
        let changes = record_changes(&manager);
        let queued = manager.queue_len();

        manager.lower("pump-temp", "still fine", codes::CONNECTING).unwrap();

        assert!(changes.lock().is_empty());
        assert_eq!(manager.queue_len(), queued);
        assert_eq!(
            manager.alarm_messages().get("pump-temp").map(String::as_str),
            Some("still fine")
        );
    }

    #[test]
    fn every_change_is_queued() {
        let (manager, _) = setup();

        assert_eq!(manager.connect(None).unwrap(), 3);
        assert_eq!(manager.queue_len(), 3);
        manager.raise("valve-1", AlarmState::Minor, "sticky", 0).unwrap();
        assert_eq!(manager.queue_len(), 4);
    }

    #[test]
    fn raise_rejects_non_raised_target() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();

        let result = manager.raise("pump-temp", AlarmState::Lowered, "nope", 0);
        assert!(matches!(
            result,
            Err(ManagerError::Core(CoreError::InvalidRaiseState(AlarmState::Lowered)))
        ));
    }

    #[test]
    fn update_unknown_alarm() {
        let (manager, _) = setup();

        let result = manager.update_alarm("ghost", AlarmState::Lowered, None, 0);
        assert!(matches!(result, Err(ManagerError::AlarmNotFound(ref id)) if id == "ghost"));
    }

    #[test]
    fn disable_respects_policy() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();

        let result = manager.disable("door");
        assert!(matches!(
            result,
            Err(ManagerError::Core(CoreError::CannotDisable(_)))
        ));
        assert_eq!(manager.require_alarm("door").unwrap().state(), AlarmState::Lowered);
        assert!(!manager.is_alarm_disabled("door").unwrap());
    }

    #[test]
    fn disable_and_enable() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();

        let pump = manager.disable("pump-temp").unwrap();
        assert!(pump.read().is_disabled());
        assert!(pump.read().last_disabled().is_some());

        // A disabled alarm can't be raised or lowered
        assert!(manager.raise("pump-temp", AlarmState::Minor, "x", 0).is_err());
        assert_eq!(manager.connect(None).unwrap(), 0);

        manager.enable("pump-temp").unwrap();
        assert_eq!(pump.state(), AlarmState::Disconnected);
        // Enabling an enabled alarm is not a change
        let queued = manager.queue_len();
        manager.enable("pump-temp").unwrap();
        assert_eq!(pump.state(), AlarmState::Disconnected);
        assert_eq!(manager.queue_len(), queued);
    }

    #[test]
    fn enable_disconnects_raised_alarm() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();
        manager
            .raise("pump-temp", AlarmState::Critical, "fire", 0)
            .unwrap();
        let queued = manager.queue_len();

        let pump = manager.enable("pump-temp").unwrap();
        assert_eq!(pump.state(), AlarmState::Disconnected);
        assert_eq!(manager.queue_len(), queued + 1);
    }

    #[test]
    fn disable_twice_fails_like_update() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();
        manager.disable("pump-temp").unwrap();

        let again = manager.disable("pump-temp");
        assert!(matches!(
            again,
            Err(ManagerError::Core(CoreError::Disabled { to: AlarmState::Disabled, .. }))
        ));
        let direct = manager.update_alarm("pump-temp", AlarmState::Disabled, None, codes::NO_CODE);
        assert!(matches!(direct, Err(ManagerError::Core(CoreError::Disabled { .. }))));
        assert!(manager.is_alarm_disabled("pump-temp").unwrap());
    }

    #[test]
    fn connect_and_disconnect_by_filter() {
        let (manager, raiser) = setup();

        assert_eq!(manager.connect_source("plc-2").unwrap(), 1);
        let valve = manager.require_alarm("valve-1").unwrap();
        assert!(valve.read().is_lowered());
        assert_eq!(valve.read().code(), codes::CONNECTING);
        assert_eq!(valve.read().message(), "Connecting valve-1");

        assert_eq!(manager.connect(Some(raiser)).unwrap(), 2);
        assert_eq!(manager.connect(Some(RaiserId::from_raw(9))).unwrap(), 0);

        assert_eq!(manager.disconnect_source("plc-2").unwrap(), 1);
        assert_eq!(valve.state(), AlarmState::Disconnected);
        assert_eq!(valve.read().message(), "Disconnecting valve-1");

        assert_eq!(manager.disconnect(None).unwrap(), 2);
        assert!(manager.has_alarm_with_state(AlarmState::Disconnected));
        assert!(!manager.has_alarm_with_state(AlarmState::Lowered));
    }

    #[test]
    fn deregister_lowers_before_removal() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();
        manager.raise("pump-temp", AlarmState::Critical, "fire", 0).unwrap();
        manager.disable("valve-1").unwrap();

        let pump = manager.require_alarm("pump-temp").unwrap();
        let valve = manager.require_alarm("valve-1").unwrap();

        assert!(manager.deregister_alarm("pump-temp").unwrap());
        assert!(manager.deregister_alarm("valve-1").unwrap());
        assert!(!manager.deregister_alarm("pump-temp").unwrap());

        assert!(pump.read().is_lowered());
        assert_eq!(pump.read().message(), "Deregistering alarm pump-temp");
        assert!(valve.read().is_lowered());
        assert!(!manager.has_alarm("pump-temp"));
        assert!(!manager.has_alarm("valve-1"));
    }

    #[test]
    fn remove_raisers_clears_everything() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();

        assert_eq!(manager.remove_raisers().unwrap(), 3);
        assert_eq!(manager.raiser_count(), 0);
        assert!(manager.alarms().is_empty());
    }

    #[test]
    fn test_session_lifecycle() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();
        let queued = manager.queue_len();
        let changes = record_changes(&manager);

        let pump = manager
            .start_test("pump-temp", AlarmState::Critical, Some("drill"), codes::START_TEST)
            .unwrap();
        assert!(manager.is_testing());
        assert!(pump.read().is_raised());
        assert!(pump.read().last_raised().is_none());
        assert!(manager.alarm_under_test().unwrap().ptr_eq(&pump));

        let ended = manager.end_test().unwrap().unwrap();
        assert!(ended.ptr_eq(&pump));
        assert!(pump.read().is_lowered());
        assert!(!pump.read().testing());
        assert_eq!(pump.read().message(), "End testing");
        assert!(manager.alarm_under_test().is_none());
        assert!(manager.end_test().unwrap().is_none());

        // Test transitions notify but are not queued
        assert_eq!(changes.lock().len(), 2);
        assert_eq!(manager.queue_len(), queued);
    }

    #[test]
    fn concurrent_test_sessions_rejected() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();

        manager
            .start_test("pump-temp", AlarmState::Critical, Some("drill"), codes::START_TEST)
            .unwrap();
        let second = manager.start_test("valve-1", AlarmState::Minor, None, codes::START_TEST);

        assert!(matches!(
            second,
            Err(ManagerError::TestInProgress { ref requested, ref active })
                if requested == "valve-1" && active.as_str() == "pump-temp"
        ));
        assert!(manager.require_alarm("valve-1").unwrap().read().is_lowered());
        assert!(manager.require_alarm("pump-temp").unwrap().read().is_raised());
    }

    #[test]
    fn start_test_preconditions() {
        let (manager, _) = setup();

        let disconnected = manager.start_test("pump-temp", AlarmState::Minor, None, 0);
        assert!(matches!(disconnected, Err(ManagerError::Disconnected(_))));

        manager.connect(None).unwrap();
        manager.raise("pump-temp", AlarmState::Minor, "warm", 0).unwrap();
        let raised = manager.start_test("pump-temp", AlarmState::Critical, None, 0);
        assert!(matches!(raised, Err(ManagerError::AlreadyRaised(_))));

        let missing = manager.start_test("ghost", AlarmState::Minor, None, 0);
        assert!(matches!(missing, Err(ManagerError::AlarmNotFound(_))));
        assert!(manager.alarm_under_test().is_none());
    }

    #[test]
    fn failed_start_test_rolls_back() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();
        let queued = manager.queue_len();
        let changes = record_changes(&manager);

        let result = manager.start_test("pump-temp", AlarmState::Lowered, None, 0);
        let (alarm_id, source) = match result {
            Err(ManagerError::TestStartFailed { alarm_id, source }) => (alarm_id, source),
            other => panic!("expected TestStartFailed, got {other:?}"),
        };
        assert_eq!(alarm_id.as_str(), "pump-temp");
        assert!(matches!(
            *source,
            ManagerError::Core(CoreError::InvalidRaiseState(AlarmState::Lowered))
        ));

        let pump = manager.require_alarm("pump-temp").unwrap();
        assert!(!pump.read().testing());
        assert!(pump.read().is_lowered());
        assert!(manager.alarm_under_test().is_none());
        assert!(!manager.is_testing());

        // Rollback rewrote the code: listeners hear about it, the queue does not
        assert_eq!(pump.read().code(), codes::END_TEST);
        assert_eq!(*changes.lock(), vec![("pump-temp".to_string(), AlarmState::Lowered)]);
        assert_eq!(manager.queue_len(), queued);

        // The slot is free again
        manager
            .start_test("pump-temp", AlarmState::Minor, None, codes::START_TEST)
            .unwrap();
    }

    #[test]
    fn deregister_clears_test_session() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();
        let pump = manager
            .start_test("pump-temp", AlarmState::Severe, None, codes::START_TEST)
            .unwrap();

        manager.deregister_alarm("pump-temp").unwrap();
        assert!(manager.alarm_under_test().is_none());
        assert!(!manager.is_testing());

        // Outstanding handles see the test ended, then the final lower
        assert!(!pump.read().testing());
        assert!(pump.read().is_lowered());
        assert_eq!(pump.read().message(), "Deregistering alarm pump-temp");
        assert_eq!(pump.read().code(), codes::NO_CODE);
    }

    #[test]
    fn run_test_requires_runtime() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();

        let result = manager.run_test("pump-temp", AlarmState::Minor, None, None, 0);
        assert!(matches!(result, Err(ManagerError::NoRuntime(_))));
        assert!(manager.alarm_under_test().is_none());
    }

    #[test]
    fn snapshot_maps() {
        let (manager, _) = setup();
        manager.connect(None).unwrap();
        manager.raise("valve-1", AlarmState::Moderate, "stuck", 7).unwrap();

        let states = manager.alarm_states();
        assert_eq!(states.get("valve-1"), Some(&AlarmState::Moderate));
        assert_eq!(states.get("door"), Some(&AlarmState::Lowered));
        assert_eq!(manager.alarm_codes().get("valve-1"), Some(&7));
    }
}
