//! # LogWriter: event renderer over `tracing`
//!
//! A subscriber that turns runtime [`Event`]s into structured `tracing` records.
//!
//! ## Example output (text format)
//! ```text
//! INFO verivisor::events: task starting task="job/a"
//! WARN verivisor::events: task failed task="job/b" reason="execution failed: boom"
//! INFO verivisor::events: workers stepped workers=8 task="job/lead"
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::TaskStarting => {
                info!(target: "verivisor::events", task, "task starting");
            }
            EventKind::StopRequested => {
                info!(target: "verivisor::events", task, "stop requested");
            }
            EventKind::TaskFinished => {
                info!(target: "verivisor::events", task, elapsed_ms = e.elapsed_ms, "task finished");
            }
            EventKind::TaskStopped => {
                info!(target: "verivisor::events", task, elapsed_ms = e.elapsed_ms, "task stopped");
            }
            EventKind::TaskFailed => {
                warn!(target: "verivisor::events", task, reason, elapsed_ms = e.elapsed_ms, "task failed");
            }
            EventKind::WorkersStepped => {
                info!(target: "verivisor::events", workers = e.workers, task, "workers stepped");
            }
            EventKind::PoolTeardown => {
                warn!(target: "verivisor::events", workers = e.workers, "pool teardown");
            }
            EventKind::RetryScheduled => {
                info!(target: "verivisor::events", task, attempt = e.attempt, reason, "retry scheduled");
            }
            EventKind::RetryAbandoned => {
                warn!(target: "verivisor::events", task, attempt = e.attempt, reason, "retry abandoned");
            }
            EventKind::SubscriberOverflow => {
                debug!(target: "verivisor::events", subscriber = task, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "verivisor::events", subscriber = task, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
