//! Alarm registry and change dispatch for alarm-hub.
//!
//! This crate owns the runtime side of alarm handling: it keeps track of
//! which raisers own which alarms, funnels every state change through one
//! place, runs exclusive test sessions, and delivers changes both in-line
//! and through a background drain loop.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐
//! │   Raiser A   │  │   Raiser B   │   register_alarms / raise / lower
//! └──────────────┘  └──────────────┘
//!         │                 │
//!         ▼                 ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        AlarmManager                          │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Registry   │ │ Test        │ │   update_alarm      │    │
//! │  │  (alarms,   │ │ session     │ │   (funnel)          │    │
//! │  │   raisers)  │ │ slot        │ │                     │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!               │                               │
//!               ▼ in-line                       ▼ enqueue
//!        ┌──────────────┐               ┌──────────────┐
//!        │  "changed"   │               │DispatchQueue │──run()──▶ "dequeued"
//!        │  listeners   │               └──────────────┘
//!        └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use alarm_hub_manager::{AlarmManager, AlarmRegistration, AlarmState, StaticRaiser};
//!
//! let manager = AlarmManager::with_defaults();
//! let raiser = StaticRaiser::new("plant", [AlarmRegistration::new("pump-temp")]);
//! manager.add_raiser(Arc::new(raiser)).unwrap();
//!
//! manager.on_changed(|alarm| {
//!     println!("{} is now {}", alarm.id(), alarm.state());
//!     Ok(())
//! });
//!
//! manager.connect(None).unwrap();
//! manager.raise("pump-temp", AlarmState::Severe, "overheat", 0).unwrap();
//! assert!(manager.is_alarm_raised());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod handle;
pub mod manager;
pub mod messages;
pub mod notify;
pub mod queue;
pub mod raiser;
mod session;
pub mod types;

pub use error::{ManagerError, Result};
pub use handle::AlarmHandle;
pub use manager::AlarmManager;
pub use messages::{AlarmSnapshot, Message, MessageType, COMMAND_LIST_ALARMS, COMMAND_TEST_ALARM};
pub use notify::{Listener, Listeners, NotifyError};
pub use queue::DispatchQueue;
pub use raiser::{AlarmRaiser, StaticRaiser};
pub use types::{AlarmRegistration, ManagerConfig};

// Re-export commonly used types from dependencies for convenience
pub use alarm_hub_core::{codes, Alarm, AlarmId, AlarmState, CoreError, RaiserId};
