//! # View of a running task handed to its body.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::RuntimeError;
use crate::governor::ResourceLimits;
use crate::tasks::id::TaskId;
use crate::tasks::runnable::RunnableRef;
use crate::tasks::task::{Task, lock};
use crate::tasks::usage::ResourceUsage;

/// Execution context of one task run.
///
/// Cheap to clone; every clone refers to the same task.
#[derive(Clone, Debug)]
pub struct TaskContext {
    task: Task,
}

impl TaskContext {
    pub(crate) fn new(task: Task) -> Self {
        Self { task }
    }

    #[inline]
    pub fn id(&self) -> &TaskId {
        self.task.id()
    }

    #[inline]
    pub fn config(&self) -> &Arc<Config> {
        self.task.config()
    }

    #[inline]
    pub fn work_dir(&self) -> &Path {
        self.task.work_dir()
    }

    pub fn log_file(&self) -> PathBuf {
        self.task.log_file()
    }

    /// Budget issued for this attempt.
    #[inline]
    pub fn limits(&self) -> &ResourceLimits {
        self.task.limits()
    }

    /// Token cancelled on stop requests, wall-limit expiry or parent cancellation.
    #[inline]
    pub fn token(&self) -> &CancellationToken {
        &self.task.inner.token
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.task.inner.token.is_cancelled()
    }

    /// Completes once cancellation was requested.
    pub async fn cancelled(&self) {
        self.task.inner.token.cancelled().await
    }

    /// The task this context belongs to.
    #[inline]
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Creates and starts a child task named `suffix`.
    ///
    /// The child inherits configuration, callbacks, limits, sinks and a child
    /// cancellation token; its work dir lives inside this task's work dir.
    /// A suffix already used by a sibling is a construction error.
    pub async fn spawn_child(&self, suffix: &str, body: RunnableRef) -> Result<Task, RuntimeError> {
        let child = self.task.child(suffix, body)?;
        child.start().await?;
        Ok(child)
    }

    /// Runs a user-named operation through the callback registry.
    ///
    /// ## Example
    /// ```rust,no_run
    /// # use serde_json::json;
    /// # use verivisor::{RuntimeError, TaskContext};
    /// # async fn body(ctx: TaskContext) -> Result<(), RuntimeError> {
    /// ctx.call("submit_result", || async { Ok(json!({"verdict": "safe"})) })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call<F, Fut>(&self, event: &str, body: F) -> Result<Value, RuntimeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, RuntimeError>>,
    {
        let callbacks = Arc::clone(&self.task.inner.callbacks);
        callbacks.dispatch(&self.task, event, body).await
    }

    /// Adds a measurement (e.g. of a reaped subprocess) to the task's usage.
    pub fn record_usage(&self, usage: &ResourceUsage) {
        lock(&self.task.inner.usage).absorb(usage);
    }
}
