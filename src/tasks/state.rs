//! # Task lifecycle states.
//!
//! ```text
//! Created ──start──► Running ──body Ok──────► FinishedOk
//!    │                  ├──────body Err─────► FinishedError
//!    │                  └──────stop─────────► Stopped
//!    └────────stop before start─────────────► Stopped
//! ```
//!
//! Terminal states are sticky: once reached, the state never changes again.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a [`Task`](crate::Task).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Constructed, not started.
    Created,
    /// Execution unit is live.
    Running,
    /// Terminated by a cooperative-cancellation request.
    Stopped,
    /// Body returned successfully.
    FinishedOk,
    /// Body failed, panicked or exhausted its budget.
    FinishedError,
}

impl TaskState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Stopped | TaskState::FinishedOk | TaskState::FinishedError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Created => "created",
            TaskState::Running => "running",
            TaskState::Stopped => "stopped",
            TaskState::FinishedOk => "finished_ok",
            TaskState::FinishedError => "finished_error",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
