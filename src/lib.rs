//! # verivisor
//!
//! **Verivisor** orchestrates isolated, long-running verification tasks.
//!
//! It provides a task abstraction with a stable identity, cooperative stop and
//! interceptable operations, two schedulers for running many tasks, and a
//! resource governor that retries resource-exhausted tasks with larger limits
//! inside one global deadline.
//!
//! ## Architecture
//! ```text
//!   Config ──► TaskBuilder ──► Task ─────────────────────────────┐
//!                               │ start / stop / join             │
//!                               ▼ (dispatched via CallbackRegistry)
//!                     ┌───────────────────┐                       │
//!                     │ runner::execute   │  body: Runnable       │
//!                     │  - CancellationTk │  (RunnableFn or       │
//!                     │  - wall limit     │   CommandBody)        │
//!                     │  - finalize       │                       │
//!                     └────────┬──────────┘                       │
//!                              │ Report ──► ReportSink            │
//!                              │ Event  ──► Bus ──► SubscriberSet │
//!                              ▼                                  │
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐        │
//!   │  BatchPool   │   │  QueuePool   │◄──│  Governor    │        │
//!   │ (known list) │   │ (WorkSource) │   │ (budgets +   │        │
//!   └──────┬───────┘   └──────┬───────┘   │  retries)    │        │
//!          └──────────────────┴───────────┴──────────────┘◄───────┘
//! ```
//!
//! ### Task lifecycle
//! ```text
//! Created ──start──► Running ──┬─ body Ok ─────────────► FinishedOk
//!                              ├─ body Err ────────────► FinishedError
//!                              └─ stop / Canceled ─────► Stopped
//! ```
//! Terminal states are sticky. During finalization children are stopped
//! first, a [`Report`] is emitted and the working directory is cleaned up.
//!
//! ## Features
//! | Area            | Description                                                  | Key types / traits                         |
//! |-----------------|--------------------------------------------------------------|--------------------------------------------|
//! | **Tasks**       | Identity, lifecycle, children, cooperative stop, reports.    | [`Task`], [`TaskContext`], [`Runnable`]    |
//! | **Callbacks**   | Before / Instead / After interception of named operations.   | [`CallbackRegistry`], [`Interception`]     |
//! | **Pools**       | Fixed batches and queues with step growth and tolerance.     | [`BatchPool`], [`QueuePool`], [`Workers`]  |
//! | **Governor**    | Per-task budgets and retries inside a global deadline.       | [`Governor`], [`RetryDecision`]            |
//! | **Events**      | Lifecycle events fanned out to subscribers.                  | [`Bus`], [`Subscribe`], [`LogWriter`]      |
//! | **Errors**      | Typed errors for configuration, tasks and the runtime.       | [`TaskError`], [`RuntimeError`]            |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use verivisor::{BatchPool, Config, PoolConfig, RunnableFn, Task, TaskContext, TaskState};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let root = std::env::temp_dir().join("verivisor-doc");
//!     let conf = Arc::new(Config { work_root: root, ..Config::default() });
//!
//!     let tasks = (0..3)
//!         .map(|i| {
//!             Task::builder(format!("check-{i}"))
//!                 .config(Arc::clone(&conf))
//!                 .body(RunnableFn::arc(|ctx: TaskContext| async move {
//!                     if ctx.is_cancelled() {
//!                         return Ok(());
//!                     }
//!                     println!("verifying in {}", ctx.work_dir().display());
//!                     Ok(())
//!                 }))
//!                 .build()
//!         })
//!         .collect::<Result<Vec<_>, _>>()?;
//!
//!     BatchPool::new(PoolConfig::from_config(&conf)?)
//!         .run(tasks.clone(), &[])
//!         .await?;
//!     assert!(tasks.iter().all(|t| t.state() == TaskState::FinishedOk));
//!     Ok(())
//! }
//! ```
mod callbacks;
mod config;
mod error;
mod events;
mod governor;
mod pools;
mod subscribers;
mod tasks;

pub mod logger;
pub mod shutdown;

// ---- Public re-exports ----

pub use callbacks::{CallbackRegistry, CallbackRegistryBuilder, Handler, HandlerFn, Interception};
pub use config::{Config, DEFAULT_MAX_ID_LEN, Parallelism, Weight};
pub use error::{ConfigError, RuntimeError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use governor::{
    DEFAULT_MIN_GROWTH, Governor, GovernorConfig, Outcome, ResourceLimits, RetryDecision, Verdict,
    attach_rlimits,
};
pub use pools::{BatchPool, PoolConfig, Pop, QueuePool, Trigger, WorkSource, Workers};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet, spawn_listener};
pub use tasks::{
    CommandBody, KILL_GRACE, LOG_FILE, Report, ReportSink, ResourceUsage, Runnable, RunnableFn,
    RunnableRef, STOP_GRACE, Task, TaskBuilder, TaskContext, TaskId, TaskState,
};
