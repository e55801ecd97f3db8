//! # Runtime events emitted by tasks and pools.
//!
//! The [`EventKind`] enum classifies events across three categories:
//! - **Task lifecycle**: starting, stop requested, finished, failed, stopped
//! - **Scheduling**: workers stepped, teardown, retry decisions
//! - **Subscriber health**: overflow and panics
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use verivisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_task("job/b")
//!     .with_reason("boom")
//!     .with_attempt(2);
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.task.as_deref(), Some("job/b"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason`.
    SubscriberOverflow,

    // === Task lifecycle events ===
    /// Task execution unit started.
    ///
    /// Sets: `task`.
    TaskStarting,

    /// Cooperative cancellation was delivered to a task.
    ///
    /// Sets: `task`.
    StopRequested,

    /// Task body returned successfully.
    ///
    /// Sets: `task`, `elapsed_ms`.
    TaskFinished,

    /// Task body failed.
    ///
    /// Sets: `task`, `reason`, `elapsed_ms`.
    TaskFailed,

    /// Task reached the `Stopped` terminal state.
    ///
    /// Sets: `task`, `elapsed_ms`.
    TaskStopped,

    // === Scheduling events ===
    /// Queue pool switched its worker target.
    ///
    /// Sets: `workers` (new target), `task` (trigger).
    WorkersStepped,

    /// Pool started forced teardown of still-running tasks.
    ///
    /// Sets: `workers` (tasks being stopped).
    PoolTeardown,

    /// Governor authorized a retry with an enlarged budget.
    ///
    /// Sets: `task`, `attempt`, `reason` (limits).
    RetryScheduled,

    /// Governor gave up on a budget-exhausted task.
    ///
    /// Sets: `task`, `attempt`, `reason`.
    RetryAbandoned,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Identifier of the task, if applicable.
    pub task: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, limits).
    pub reason: Option<Arc<str>>,
    /// Attempt number under the same identity.
    pub attempt: Option<u32>,
    /// Elapsed wall time in milliseconds (compact).
    pub elapsed_ms: Option<u32>,
    /// Worker count for scheduling events.
    pub workers: Option<usize>,
}

impl Event {
    /// Creates a new event with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            reason: None,
            attempt: None,
            elapsed_ms: None,
            workers: None,
        }
    }

    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches elapsed time (stored as milliseconds, saturating).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    #[inline]
    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::TaskStarting);
        let b = Event::new(EventKind::TaskFinished);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn elapsed_saturates() {
        let ev = Event::new(EventKind::TaskFinished).with_elapsed(Duration::from_secs(u64::MAX));
        assert_eq!(ev.elapsed_ms, Some(u32::MAX));
    }
}
