//! Dispatch queue for deferred change delivery.
//!
//! Every effective alarm change is pushed onto an unbounded FIFO. A single
//! drain loop, started with [`DispatchQueue::run`], takes items off the head
//! and hands them to a delivery callback.
//!
//! ```text
//!   update_alarm ──enqueue──▶ [ a1 | a2 | a1 | ... ] ──run()──▶ deliver(a)
//!                                                      ▲
//!                                   can_dequeue() ─────┘ (gate, polled)
//! ```
//!
//! The queue stores live [`AlarmHandle`]s, so a delivered alarm may already
//! reflect a later change than the one that queued it. Items are neither
//! coalesced nor flushed when the loop is cancelled.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{ManagerError, Result};
use crate::handle::AlarmHandle;

/// Unbounded FIFO of changed alarms with a single cancellable consumer.
pub struct DispatchQueue {
    items: Mutex<VecDeque<AlarmHandle>>,
    wake: Notify,
    running: AtomicBool,
    gate_poll_interval: Duration,
}

/// Clears the running flag when the drain loop exits or is dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DispatchQueue {
    /// Create an empty queue.
    ///
    /// `gate_poll_interval` is how long the drain loop sleeps before asking
    /// a closed dequeue gate again.
    #[must_use]
    pub fn new(gate_poll_interval: Duration) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            running: AtomicBool::new(false),
            gate_poll_interval,
        }
    }

    /// Push an alarm onto the back of the queue and wake the drain loop.
    pub fn enqueue(&self, alarm: AlarmHandle) {
        self.items.lock().push_back(alarm);
        self.wake.notify_one();
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// True if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// True while a drain loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn pop(&self) -> Option<AlarmHandle> {
        self.items.lock().pop_front()
    }

    /// Drain the queue until `cancel` fires.
    ///
    /// Each iteration checks cancellation, then the `can_dequeue` gate. While
    /// the gate is closed nothing is consumed and the gate is polled again
    /// after the configured interval. When the queue is empty the loop sleeps
    /// until the next [`DispatchQueue::enqueue`].
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::DrainAlreadyRunning` if another drain loop is
    /// active on this queue.
    pub async fn run<G, D>(&self, cancel: CancellationToken, can_dequeue: G, mut deliver: D) -> Result<()>
    where
        G: Fn() -> bool + Send,
        D: FnMut(AlarmHandle) + Send,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ManagerError::DrainAlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        tracing::debug!(queued = self.len(), "Dispatch drain loop started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if !can_dequeue() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(self.gate_poll_interval) => continue,
                }
            }

            if let Some(alarm) = self.pop() {
                tracing::debug!(alarm_id = %alarm.id(), "Dequeued alarm");
                deliver(alarm);
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.wake.notified() => {}
            }
        }

        tracing::debug!(remaining = self.len(), "Dispatch drain loop stopped");
        Ok(())
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}
