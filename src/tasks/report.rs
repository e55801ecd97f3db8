//! # Outcome records and the report sink.
//!
//! Every task emits exactly one [`Report`] during finalization. The
//! [`ReportSink`] is an unbounded queue paired with a process-wide counter:
//! `seq` is assigned and the record enqueued under one lock, so records are
//! totally ordered and never reordered for the same identifier. Delivery
//! beyond the queue (upload, serialization format) belongs to the consumer.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::tasks::state::TaskState;

static REPORT_SEQ: Mutex<u64> = Mutex::new(0);

/// Structured outcome record of one task run.
#[derive(Clone, Debug, Serialize)]
pub struct Report {
    /// Global report counter value.
    pub seq: u64,
    /// Task identifier.
    pub id: String,
    /// Terminal state.
    pub state: TaskState,
    pub wall_time_ms: u64,
    pub cpu_time_ms: u64,
    pub memory_bytes: u64,
    /// Task log, attached for full-weight runs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<PathBuf>,
    /// Failure description for `finished_error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ordered, at-least-once outlet for [`Report`]s.
#[derive(Clone, Debug)]
pub struct ReportSink {
    tx: mpsc::UnboundedSender<Report>,
}

impl ReportSink {
    /// Creates a sink and the receiving end of its queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Report>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Assigns the next sequence number and enqueues the record.
    ///
    /// Returns the assigned sequence number.
    pub fn send(&self, mut report: Report) -> u64 {
        let mut seq = REPORT_SEQ.lock().unwrap_or_else(|e| e.into_inner());
        *seq += 1;
        report.seq = *seq;
        if self.tx.send(report).is_err() {
            warn!(seq = *seq, "report receiver dropped; outcome record lost");
        }
        *seq
    }
}
