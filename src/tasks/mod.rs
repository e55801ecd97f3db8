//! # Units of work.
//!
//! This module provides the task-related types:
//! - [`Task`] - handle to an isolated, independently schedulable unit of work
//! - [`TaskBuilder`] - validated construction of root tasks
//! - [`TaskContext`] - what a running body sees (token, work dir, children, callbacks)
//! - [`Runnable`] / [`RunnableFn`] / [`CommandBody`] - task bodies
//! - [`Report`] / [`ReportSink`] - outcome records emitted during finalization

mod cleanup;
mod command;
mod context;
mod id;
mod report;
mod runnable;
mod runner;
mod state;
mod task;
mod usage;

pub use command::{CommandBody, KILL_GRACE};
pub use context::TaskContext;
pub use id::TaskId;
pub use report::{Report, ReportSink};
pub use runnable::{Runnable, RunnableFn, RunnableRef};
pub use runner::STOP_GRACE;
pub use state::TaskState;
pub use task::{LOG_FILE, Task, TaskBuilder};
pub use usage::ResourceUsage;
