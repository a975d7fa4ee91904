//! Alarm Hub - Alarm Registry Daemon
//!
//! Runs an alarm manager with a built-in heartbeat alarm, logs every change
//! and every dispatched alarm, and shuts down on Ctrl-C.

use std::sync::Arc;

use alarm_hub_manager::{AlarmManager, AlarmRegistration, ManagerConfig, StaticRaiser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HEARTBEAT_ALARM: &str = "hub.heartbeat";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,alarm_hub=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Alarm Hub");

    // Load configuration from environment
    let config = ManagerConfig::from_env();
    tracing::info!(
        gate_poll_ms = config.gate_poll_interval_ms,
        test_duration_ms = config.default_test_duration_ms,
        "Loaded configuration"
    );

    let manager = AlarmManager::new(config);

    manager.on_changed(|alarm| {
        let alarm = alarm.read();
        tracing::info!(
            alarm_id = %alarm.id(),
            state = %alarm.state(),
            code = alarm.code(),
            message = %alarm.message(),
            "Alarm changed"
        );
        Ok(())
    });
    manager.on_dequeued(|alarm| {
        tracing::info!(alarm_id = %alarm.id(), state = %alarm.state(), "Alarm dispatched");
        Ok(())
    });

    let heartbeat = StaticRaiser::new(
        "hub",
        [AlarmRegistration::new(HEARTBEAT_ALARM)
            .with_name("Alarm hub heartbeat")
            .with_can_disable(false)],
    );
    manager.add_raiser(Arc::new(heartbeat))?;

    // Start the drain loop
    let cancel = CancellationToken::new();
    let drain = {
        let manager = Arc::clone(&manager);
        let cancel = cancel.clone();
        tokio::spawn(async move { manager.run(cancel).await })
    };

    let connected = manager.connect(None)?;
    tracing::info!(alarms = connected, "Alarm Hub ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    cancel.cancel();
    drain.await??;

    tracing::info!(remaining = manager.queue_len(), "Alarm Hub stopped");
    Ok(())
}
