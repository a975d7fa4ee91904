//! End-to-end tests for change delivery and test sessions.
//!
//! Timed behaviour runs on tokio's paused clock, so these tests finish
//! instantly regardless of the durations involved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alarm_hub_manager::{
    codes, AlarmManager, AlarmRegistration, AlarmState, ManagerConfig, ManagerError, StaticRaiser,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Helpers
// =============================================================================

fn plant() -> Arc<AlarmManager> {
    let config = ManagerConfig {
        gate_poll_interval_ms: 20,
        ..Default::default()
    };
    let manager = AlarmManager::new(config);
    manager
        .add_raiser(Arc::new(StaticRaiser::new(
            "plant",
            [
                AlarmRegistration::new("pump-temp").with_name("Pump temperature"),
                AlarmRegistration::new("valve-1").with_source("plc-2"),
                AlarmRegistration::new("fan"),
            ],
        )))
        .unwrap();
    manager
}

type Log = Arc<Mutex<Vec<String>>>;

fn record(manager: &AlarmManager) -> (Log, Log) {
    let changed: Log = Arc::default();
    let dequeued: Log = Arc::default();

    let sink = Arc::clone(&changed);
    manager.on_changed(move |alarm| {
        sink.lock().push(alarm.id().to_string());
        Ok(())
    });
    let sink = Arc::clone(&dequeued);
    manager.on_dequeued(move |alarm| {
        sink.lock().push(alarm.id().to_string());
        Ok(())
    });

    (changed, dequeued)
}

fn spawn_drain(manager: &Arc<AlarmManager>, cancel: &CancellationToken) -> tokio::task::JoinHandle<Result<(), ManagerError>> {
    let manager = Arc::clone(manager);
    let cancel = cancel.clone();
    tokio::spawn(async move { manager.run(cancel).await })
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test(start_paused = true)]
async fn every_change_is_delivered_twice_in_order() {
    let manager = plant();
    let (changed, dequeued) = record(&manager);
    let cancel = CancellationToken::new();
    let drain = spawn_drain(&manager, &cancel);

    manager.connect(None).unwrap();
    manager
        .raise("pump-temp", AlarmState::Severe, "overheat", 0)
        .unwrap();
    manager.raise("valve-1", AlarmState::Minor, "sticky", 0).unwrap();
    manager.lower("pump-temp", "ok", codes::NO_CODE).unwrap();
    // No effective change
    manager.lower("pump-temp", "still ok", codes::NO_CODE).unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;

    let changed = changed.lock().clone();
    assert_eq!(changed.len(), 6);
    assert_eq!(&changed[3..], ["pump-temp", "valve-1", "pump-temp"]);
    assert_eq!(*dequeued.lock(), changed);
    assert_eq!(manager.queue_len(), 0);

    cancel.cancel();
    drain.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn failing_listener_does_not_block_dispatch() {
    let manager = plant();
    manager.on_dequeued(|_| Err(alarm_hub_manager::NotifyError::new("uplink down")));
    let (_, dequeued) = record(&manager);
    let cancel = CancellationToken::new();
    let drain = spawn_drain(&manager, &cancel);

    manager.connect_source("plc-2").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(*dequeued.lock(), vec!["valve-1".to_string()]);

    cancel.cancel();
    drain.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn closed_gate_defers_delivery() {
    let manager = plant();
    let (changed, dequeued) = record(&manager);
    let online = Arc::new(AtomicBool::new(false));
    let cancel = CancellationToken::new();

    let drain = {
        let manager = Arc::clone(&manager);
        let cancel = cancel.clone();
        let online = Arc::clone(&online);
        tokio::spawn(async move {
            manager
                .run_with_gate(cancel, move || online.load(Ordering::SeqCst))
                .await
        })
    };

    manager.connect(None).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(changed.lock().len(), 3);
    assert!(dequeued.lock().is_empty());
    assert_eq!(manager.queue_len(), 3);

    online.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*dequeued.lock(), *changed.lock());
    assert_eq!(manager.queue_len(), 0);

    cancel.cancel();
    drain.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn only_one_drain_loop() {
    let manager = plant();
    let cancel = CancellationToken::new();
    let drain = spawn_drain(&manager, &cancel);
    tokio::time::sleep(Duration::from_millis(1)).await;

    let second = manager.run(CancellationToken::new()).await;
    assert!(matches!(second, Err(ManagerError::DrainAlreadyRunning)));

    cancel.cancel();
    drain.await.unwrap().unwrap();

    // Restartable once the first loop has stopped
    let cancel = CancellationToken::new();
    let drain = spawn_drain(&manager, &cancel);
    tokio::time::sleep(Duration::from_millis(1)).await;
    cancel.cancel();
    drain.await.unwrap().unwrap();
}

// =============================================================================
// Timed Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn run_test_ends_after_duration() {
    let manager = plant();
    manager.connect(None).unwrap();
    let (changed, _) = record(&manager);

    let pump = manager
        .run_test(
            "pump-temp",
            AlarmState::Critical,
            Some("drill"),
            Some(Duration::from_millis(100)),
            codes::START_TEST,
        )
        .unwrap();
    assert!(pump.read().is_raised());
    assert!(manager.is_testing());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(manager.is_testing());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!manager.is_testing());
    assert!(manager.alarm_under_test().is_none());
    assert!(pump.read().is_lowered());
    assert!(!pump.read().testing());
    assert_eq!(pump.read().code(), codes::END_TEST);
    // Test transitions never touch the timestamps
    assert!(pump.read().last_raised().is_none());

    assert_eq!(changed.lock().len(), 2);
    // Test transitions are not queued
    assert_eq!(manager.queue_len(), 3);
}

#[tokio::test(start_paused = true)]
async fn run_test_uses_default_duration() {
    let manager = AlarmManager::new(ManagerConfig {
        default_test_duration_ms: 1_000,
        ..Default::default()
    });
    manager
        .add_raiser(Arc::new(StaticRaiser::new("solo", [AlarmRegistration::new("fan")])))
        .unwrap();
    manager.connect(None).unwrap();

    manager
        .run_test("fan", AlarmState::Minor, None, None, codes::START_TEST)
        .unwrap();
    assert_eq!(
        manager.require_alarm("fan").unwrap().read().message(),
        codes::START_TEST_MESSAGE
    );

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(manager.is_testing());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!manager.is_testing());
}

#[tokio::test(start_paused = true)]
async fn stale_timer_leaves_new_session_alone() {
    let manager = plant();
    manager.connect(None).unwrap();

    manager
        .run_test(
            "pump-temp",
            AlarmState::Severe,
            None,
            Some(Duration::from_millis(100)),
            codes::START_TEST,
        )
        .unwrap();
    manager.end_test().unwrap();

    // Same alarm again, longer timer
    manager
        .run_test(
            "pump-temp",
            AlarmState::Severe,
            None,
            Some(Duration::from_millis(300)),
            codes::START_TEST,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(manager.is_testing());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!manager.is_testing());
}

#[tokio::test(start_paused = true)]
async fn manual_session_survives_old_timer() {
    let manager = plant();
    manager.connect(None).unwrap();

    manager
        .run_test(
            "pump-temp",
            AlarmState::Minor,
            None,
            Some(Duration::from_millis(50)),
            codes::START_TEST,
        )
        .unwrap();
    manager.end_test().unwrap();
    manager
        .start_test("valve-1", AlarmState::Moderate, None, codes::START_TEST)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let under_test = manager.alarm_under_test().unwrap();
    assert_eq!(under_test.id().as_str(), "valve-1");
    assert!(under_test.read().is_raised());
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn concurrent_start_test_admits_one() {
    let manager = plant();
    manager.connect(None).unwrap();

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = ["pump-temp", "valve-1", "fan"]
            .into_iter()
            .cycle()
            .take(12)
            .map(|id| {
                let manager = &manager;
                scope.spawn(move || manager.start_test(id, AlarmState::Critical, None, codes::START_TEST))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let started = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(started, 1);
    assert!(results.iter().all(|r| matches!(
        r,
        Ok(_) | Err(ManagerError::TestInProgress { .. } | ManagerError::AlreadyRaised(_))
    )));

    let raised = manager.alarms().iter().filter(|a| a.is_raised()).count();
    assert_eq!(raised, 1);
}
