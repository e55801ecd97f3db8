//! # Task: isolated, independently schedulable unit of work.
//!
//! A [`Task`] is a cheap, cloneable handle. It carries a hierarchical
//! [`TaskId`], a configuration snapshot, a private working directory, an issued
//! resource budget and a [`Runnable`] body.
//!
//! ## Public operations
//! `start`, `stop` and `join` are dispatched through the task's
//! [`CallbackRegistry`] under the event names `"start"`, `"stop"` and `"join"`;
//! third parties can augment or replace them without touching call sites.
//!
//! ## Lifecycle
//! ```text
//! start() ─► ensure work dir ─► Running ─► spawn runner
//!                                              │
//!                     body (own tokio task) ◄──┤
//!                                              ▼
//!                 finalize: children stopped, usage, report, cleanup
//!                                              ▼
//!                          Stopped | FinishedOk | FinishedError
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::callbacks::CallbackRegistry;
use crate::config::Config;
use crate::error::{ConfigError, RuntimeError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::governor::ResourceLimits;
use crate::tasks::id::TaskId;
use crate::tasks::report::ReportSink;
use crate::tasks::runnable::RunnableRef;
use crate::tasks::runner;
use crate::tasks::state::TaskState;
use crate::tasks::usage::ResourceUsage;

/// File inside the work directory that collects the task's output.
pub const LOG_FILE: &str = "task.log";

pub(crate) struct Inner {
    pub(crate) id: TaskId,
    pub(crate) conf: Arc<Config>,
    pub(crate) callbacks: Arc<CallbackRegistry>,
    pub(crate) work_dir: PathBuf,
    pub(crate) limits: ResourceLimits,
    pub(crate) body: RunnableRef,
    pub(crate) token: CancellationToken,
    pub(crate) sink: Option<ReportSink>,
    pub(crate) bus: Option<Bus>,
    pub(crate) keep: Vec<PathBuf>,

    pub(crate) state: watch::Sender<TaskState>,
    pub(crate) stop_requested: AtomicBool,
    pub(crate) failure: Mutex<Option<TaskError>>,
    pub(crate) usage: Mutex<ResourceUsage>,
    pub(crate) children: Mutex<Vec<Task>>,
    pub(crate) runner: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a unit of work.
#[derive(Clone)]
pub struct Task {
    pub(crate) inner: Arc<Inner>,
}

impl Task {
    /// Starts building a root task.
    pub fn builder(id: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(id.into())
    }

    #[inline]
    pub fn id(&self) -> &TaskId {
        &self.inner.id
    }

    #[inline]
    pub fn config(&self) -> &Arc<Config> {
        &self.inner.conf
    }

    #[inline]
    pub fn work_dir(&self) -> &Path {
        &self.inner.work_dir
    }

    /// Path of the task's log file inside its work directory.
    pub fn log_file(&self) -> PathBuf {
        self.inner.work_dir.join(LOG_FILE)
    }

    #[inline]
    pub fn limits(&self) -> &ResourceLimits {
        &self.inner.limits
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        *self.inner.state.borrow()
    }

    /// True while the execution unit is live.
    pub fn is_alive(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Failure recorded for a `FinishedError` task.
    pub fn failure(&self) -> Option<TaskError> {
        lock(&self.inner.failure).clone()
    }

    /// Resources accounted so far (final after the task reached a terminal state).
    pub fn usage(&self) -> ResourceUsage {
        *lock(&self.inner.usage)
    }

    /// Children spawned through this task's context.
    pub fn children(&self) -> Vec<Task> {
        lock(&self.inner.children).clone()
    }

    /// Returns a guard that cancels this task when dropped.
    ///
    /// Pools hold one per running task so that dropping the pool future still
    /// tears its tasks down.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.inner.token.clone().drop_guard()
    }

    /// Creates the work directory and launches the body in its own execution unit.
    ///
    /// Dispatched as event `"start"`.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let callbacks = Arc::clone(&self.inner.callbacks);
        callbacks
            .dispatch(self, "start", || self.launch())
            .await
            .map(drop)
    }

    /// Delivers a cooperative-cancellation request and waits until the task is terminal.
    ///
    /// Stopping an already terminal task is a no-op. Dispatched as event `"stop"`.
    pub async fn stop(&self) -> Result<(), RuntimeError> {
        let callbacks = Arc::clone(&self.inner.callbacks);
        callbacks
            .dispatch(self, "stop", || async {
                self.halt().await;
                Ok(Value::Null)
            })
            .await
            .map(drop)
    }

    /// Waits until the task is terminal or `timeout` elapses; returns the state observed.
    ///
    /// A task that finished with an error (and was not stopped by a caller)
    /// surfaces [`RuntimeError::Execution`]. The returned state is the same
    /// snapshot that decision was made on, so `Ok` never carries
    /// `FinishedError` for an unstopped task. Dispatched as event `"join"`.
    pub async fn join(&self, timeout: Option<Duration>) -> Result<TaskState, RuntimeError> {
        let callbacks = Arc::clone(&self.inner.callbacks);
        let mut observed = None;
        callbacks
            .dispatch(self, "join", || self.wait(timeout, &mut observed))
            .await?;
        match observed {
            Some(state) => Ok(state),
            // Replaced by an Instead handler: judge the current state once.
            None => self.judge(self.state()),
        }
    }

    async fn launch(&self) -> Result<Value, RuntimeError> {
        let current = self.state();
        if current != TaskState::Created {
            return Err(RuntimeError::InvalidState {
                id: self.id().to_string(),
                op: "start",
                state: current.as_str(),
            });
        }
        let max = self.inner.conf.max_id_len;
        if self.id().len() > max {
            return Err(ConfigError::IdTooLong {
                id: self.id().to_string(),
                len: self.id().len(),
                max,
            }
            .into());
        }

        tokio::fs::create_dir_all(&self.inner.work_dir)
            .await
            .map_err(|e| RuntimeError::io(&self.inner.work_dir, e))?;

        if !self.transition(TaskState::Running) {
            // Stopped concurrently before it ever ran.
            return Ok(Value::Null);
        }
        self.publish(Event::new(EventKind::TaskStarting));

        let handle = tokio::spawn(runner::execute(self.clone()));
        *lock(&self.inner.runner) = Some(handle);
        Ok(Value::Null)
    }

    pub(crate) async fn halt(&self) {
        match self.state() {
            TaskState::Created => {
                self.inner.stop_requested.store(true, Ordering::SeqCst);
                self.inner.token.cancel();
                if self.transition(TaskState::Stopped) {
                    self.publish(Event::new(EventKind::TaskStopped));
                }
            }
            TaskState::Running => {
                if !self.inner.stop_requested.swap(true, Ordering::SeqCst) {
                    debug!(task = %self.id(), "stop requested");
                    self.publish(Event::new(EventKind::StopRequested));
                }
                self.inner.token.cancel();
                self.wait_terminal().await;
            }
            _ => {}
        }
    }

    async fn wait(
        &self,
        timeout: Option<Duration>,
        observed: &mut Option<TaskState>,
    ) -> Result<Value, RuntimeError> {
        match timeout {
            Some(d) => {
                let _ = tokio::time::timeout(d, self.wait_terminal()).await;
            }
            None => self.wait_terminal().await,
        }

        let state = self.judge(self.state())?;
        *observed = Some(state);
        Ok(Value::String(state.as_str().to_string()))
    }

    /// Turns an unstopped `FinishedError` snapshot into [`RuntimeError::Execution`].
    fn judge(&self, state: TaskState) -> Result<TaskState, RuntimeError> {
        if state == TaskState::FinishedError && !self.inner.stop_requested.load(Ordering::SeqCst) {
            let error = self
                .failure()
                .unwrap_or_else(|| TaskError::fail("unknown failure"));
            return Err(RuntimeError::Execution {
                id: self.id().to_string(),
                error,
            });
        }
        Ok(state)
    }

    async fn wait_terminal(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|s| s.is_terminal()).await;
    }

    /// Moves to `next` unless the current state is terminal; returns whether it changed.
    pub(crate) fn transition(&self, next: TaskState) -> bool {
        self.inner.state.send_if_modified(|cur| {
            if cur.is_terminal() || *cur == next {
                return false;
            }
            *cur = next;
            true
        })
    }

    pub(crate) fn publish(&self, ev: Event) {
        if let Some(bus) = &self.inner.bus {
            bus.publish(ev.with_task(self.id()));
        }
    }

    pub(crate) fn was_stop_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::SeqCst)
    }

    /// Builds (without starting) a child named `suffix`.
    pub(crate) fn child(&self, suffix: &str, body: RunnableRef) -> Result<Task, ConfigError> {
        let id = self.id().child(suffix, self.inner.conf.max_id_len)?;
        let mut children = lock(&self.inner.children);
        if children.iter().any(|c| c.id() == &id) {
            return Err(ConfigError::DuplicateId { id: id.to_string() });
        }
        let child = Task::from_parts(Parts {
            id,
            conf: Arc::clone(&self.inner.conf),
            callbacks: Arc::clone(&self.inner.callbacks),
            work_dir: self.inner.work_dir.join(suffix),
            limits: self.inner.limits,
            body,
            token: self.inner.token.child_token(),
            sink: self.inner.sink.clone(),
            bus: self.inner.bus.clone(),
            keep: Vec::new(),
        });
        children.push(child.clone());
        Ok(child)
    }

    fn from_parts(p: Parts) -> Self {
        let (state, _) = watch::channel(TaskState::Created);
        Self {
            inner: Arc::new(Inner {
                id: p.id,
                conf: p.conf,
                callbacks: p.callbacks,
                work_dir: p.work_dir,
                limits: p.limits,
                body: p.body,
                token: p.token,
                sink: p.sink,
                bus: p.bus,
                keep: p.keep,
                state,
                stop_requested: AtomicBool::new(false),
                failure: Mutex::new(None),
                usage: Mutex::new(ResourceUsage::default()),
                children: Mutex::new(Vec::new()),
                runner: Mutex::new(None),
            }),
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

struct Parts {
    id: TaskId,
    conf: Arc<Config>,
    callbacks: Arc<CallbackRegistry>,
    work_dir: PathBuf,
    limits: ResourceLimits,
    body: RunnableRef,
    token: CancellationToken,
    sink: Option<ReportSink>,
    bus: Option<Bus>,
    keep: Vec<PathBuf>,
}

/// Builder for root tasks.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use verivisor::{Config, RunnableFn, Task};
///
/// let task = Task::builder("job/unit-1")
///     .config(Arc::new(Config::default()))
///     .body(RunnableFn::arc(|_ctx| async { Ok(()) }))
///     .build()
///     .unwrap();
/// assert_eq!(task.id().name(), "unit-1");
/// ```
pub struct TaskBuilder {
    id: String,
    conf: Option<Arc<Config>>,
    callbacks: Option<Arc<CallbackRegistry>>,
    work_dir: Option<PathBuf>,
    limits: ResourceLimits,
    body: Option<RunnableRef>,
    token: Option<CancellationToken>,
    sink: Option<ReportSink>,
    bus: Option<Bus>,
    keep: Vec<PathBuf>,
}

impl TaskBuilder {
    fn new(id: String) -> Self {
        Self {
            id,
            conf: None,
            callbacks: None,
            work_dir: None,
            limits: ResourceLimits::default(),
            body: None,
            token: None,
            sink: None,
            bus: None,
            keep: Vec::new(),
        }
    }

    /// Configuration snapshot (default: `Config::default()`).
    pub fn config(mut self, conf: Arc<Config>) -> Self {
        self.conf = Some(conf);
        self
    }

    /// Callback registry (default: [`CallbackRegistry::global`]).
    pub fn callbacks(mut self, callbacks: Arc<CallbackRegistry>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    /// Work directory (default: `<work_root>/<id>`).
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Issued resource budget.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn body(mut self, body: RunnableRef) -> Self {
        self.body = Some(body);
        self
    }

    /// Parent cancellation token; the task gets a child of it.
    pub fn parent_token(mut self, token: &CancellationToken) -> Self {
        self.token = Some(token.child_token());
        self
    }

    pub fn report_sink(mut self, sink: ReportSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Path (relative to the work dir, or absolute) that survives cleanup.
    pub fn keep_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.keep.push(path.into());
        self
    }

    /// Validates the identifier and builds the task in the `Created` state.
    pub fn build(self) -> Result<Task, ConfigError> {
        let conf = self.conf.unwrap_or_default();
        let id = TaskId::root(&self.id, conf.max_id_len)?;
        let body = self
            .body
            .ok_or_else(|| ConfigError::MissingBody { id: id.to_string() })?;
        let work_dir = self
            .work_dir
            .unwrap_or_else(|| conf.work_root.join(id.as_str()));

        Ok(Task::from_parts(Parts {
            id,
            callbacks: self.callbacks.unwrap_or_else(CallbackRegistry::global),
            work_dir,
            limits: self.limits,
            body,
            token: self.token.unwrap_or_default(),
            sink: self.sink,
            bus: self.bus,
            keep: self.keep,
            conf,
        }))
    }
}

/// Locks a std mutex, ignoring poisoning (state stays usable after a panicking body).
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
