//! Error types used by the verivisor runtime, its pools and task bodies.
//!
//! This module defines three enums:
//!
//! - [`TaskError`]: outcome of a single task body (including budget exhaustion).
//! - [`ConfigError`]: construction-time errors; raised before anything starts and never retried.
//! - [`RuntimeError`]: errors surfaced by task operations and pool schedulers.
//!
//! All of them expose `as_label()` for logs/metrics.

use std::time::Duration;

use thiserror::Error;

use crate::callbacks::Interception;

/// # Errors produced by task execution.
///
/// Resource-budget exhaustion (`Timeout`, `OutOfMemory`) is kept apart from
/// ordinary failures so the governor can decide on a retry.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task exceeded its CPU or wall-time budget.
    #[error("timed out after {limit:?}")]
    Timeout {
        /// The limit that was hit.
        limit: Duration,
    },

    /// Task exceeded its memory budget.
    #[error("out of memory (limit {limit} bytes)")]
    OutOfMemory {
        /// The memory limit in bytes.
        limit: u64,
    },

    /// Non-recoverable error.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Ordinary failure of the task body.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Task observed its own cancellation request.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use verivisor::TaskError;
    ///
    /// let err = TaskError::OutOfMemory { limit: 1024 };
    /// assert_eq!(err.as_label(), "task_out_of_memory");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::OutOfMemory { .. } => "task_out_of_memory",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// True for `Timeout` and `OutOfMemory`, the outcomes the governor may retry.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, TaskError::Timeout { .. } | TaskError::OutOfMemory { .. })
    }
}

/// # Construction errors.
///
/// Raised while building tasks, registries, pools or configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Task identifier is longer than the configured ceiling.
    #[error("task id '{id}' is {len} characters long, limit is {max}")]
    IdTooLong { id: String, len: usize, max: usize },

    /// Task identifier segment is empty or contains the separator.
    #[error("invalid task id segment '{segment}'")]
    InvalidId { segment: String },

    /// Two siblings share the same identifier.
    #[error("duplicate task id '{id}'")]
    DuplicateId { id: String },

    /// Same owner registered twice for one (kind, event) pair.
    #[error("owner '{owner}' already has a {kind} handler for '{event}'")]
    DuplicateHandler {
        owner: String,
        kind: Interception,
        event: String,
    },

    /// Prefixed handler name without a known interception prefix.
    #[error("handler name '{name}' must start with before_, instead_ or after_")]
    InvalidHandlerName { name: String },

    /// Worker count resolved outside of `[1, 2 × cores]`.
    #[error("invalid parallelism {value}: resolves to {resolved} workers, allowed 1..={max}")]
    InvalidParallelism {
        value: String,
        resolved: i64,
        max: usize,
    },

    /// Task was built without a body.
    #[error("task '{id}' has no body")]
    MissingBody { id: String },

    /// Malformed configuration input.
    #[error("invalid configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::IdTooLong { .. } => "config_id_too_long",
            ConfigError::InvalidId { .. } => "config_invalid_id",
            ConfigError::DuplicateId { .. } => "config_duplicate_id",
            ConfigError::DuplicateHandler { .. } => "config_duplicate_handler",
            ConfigError::InvalidHandlerName { .. } => "config_invalid_handler_name",
            ConfigError::InvalidParallelism { .. } => "config_invalid_parallelism",
            ConfigError::MissingBody { .. } => "config_missing_body",
            ConfigError::Parse(_) => "config_parse",
        }
    }
}

/// # Errors surfaced by task operations and pools.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Construction-time error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Task body finished with a failure.
    #[error("task '{id}' failed: {error}")]
    Execution { id: String, error: TaskError },

    /// Externally-owned monitored task terminated unexpectedly.
    #[error("monitored task '{id}' terminated unexpectedly")]
    MonitorDied { id: String },

    /// A callback handler returned an error.
    #[error("callback for '{event}' on task '{id}' failed: {error}")]
    Callback {
        id: String,
        event: String,
        error: TaskError,
    },

    /// Operation is not valid in the task's current state.
    #[error("task '{id}' cannot {op} in state {state}")]
    InvalidState {
        id: String,
        op: &'static str,
        state: &'static str,
    },

    /// Filesystem error while preparing or cleaning a work directory.
    #[error("io error on '{path}': {error}")]
    Io { path: String, error: String },

    /// Pool was interrupted by an external shutdown request.
    #[error("interrupted by shutdown request")]
    Interrupted,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Config(e) => e.as_label(),
            RuntimeError::Execution { .. } => "runtime_execution",
            RuntimeError::MonitorDied { .. } => "runtime_monitor_died",
            RuntimeError::Callback { .. } => "runtime_callback",
            RuntimeError::InvalidState { .. } => "runtime_invalid_state",
            RuntimeError::Io { .. } => "runtime_io",
            RuntimeError::Interrupted => "runtime_interrupted",
        }
    }

    /// Identity of the task this error belongs to, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            RuntimeError::Execution { id, .. }
            | RuntimeError::MonitorDied { id }
            | RuntimeError::Callback { id, .. }
            | RuntimeError::InvalidState { id, .. } => Some(id),
            _ => None,
        }
    }

    pub(crate) fn io(path: &std::path::Path, error: std::io::Error) -> Self {
        RuntimeError::Io {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_covers_timeout_and_oom_only() {
        assert!(TaskError::Timeout { limit: Duration::from_secs(1) }.is_exhaustion());
        assert!(TaskError::OutOfMemory { limit: 1 }.is_exhaustion());
        assert!(!TaskError::fail("boom").is_exhaustion());
        assert!(!TaskError::Canceled.is_exhaustion());
    }

    #[test]
    fn runtime_error_exposes_task_id() {
        let err = RuntimeError::Execution {
            id: "job/b".into(),
            error: TaskError::fail("boom"),
        };
        assert_eq!(err.task_id(), Some("job/b"));
        assert_eq!(err.as_label(), "runtime_execution");
        assert_eq!(RuntimeError::Interrupted.task_id(), None);
    }
}
