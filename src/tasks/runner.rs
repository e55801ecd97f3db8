//! # Execution unit of a single task.
//!
//! [`execute`] runs inside the `tokio` task spawned by `Task::start`. The body
//! itself gets one more `tokio::spawn` so that a panic is caught at the
//! `JoinHandle` boundary instead of tearing down the runner.
//!
//! ```text
//! body ──► Ok / Err / panic ─────────────────────┐
//!   ▲                                            │
//!   ├── wall limit hit ─► cancel ─► grace ─► abort ─► Timeout
//!   └── token cancelled ─► grace ─► abort ────────────► Canceled
//!                                                │
//!                                                ▼
//!   finalize (exactly once): stop children ─► usage ─► report ─► cleanup ─► terminal state
//! ```
//!
//! ## Rules
//! - An error observed after a stop request, or `Canceled`, ends in `Stopped`.
//! - So does any error once the token is cancelled, whether by `stop`, a
//!   cancelled parent or a dropped guard. Only the wall limit yields `Timeout`.
//! - Exactly one terminal event is published: `TaskFinished`, `TaskFailed` or `TaskStopped`.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::tasks::cleanup;
use crate::tasks::context::TaskContext;
use crate::tasks::report::Report;
use crate::tasks::state::TaskState;
use crate::tasks::task::{Task, lock};

/// Time a body gets to return after its token was cancelled before it is aborted.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

pub(crate) async fn execute(task: Task) {
    let started = Instant::now();
    let token = task.inner.token.clone();
    let body = Arc::clone(&task.inner.body);
    let ctx = TaskContext::new(task.clone());
    let mut unit = tokio::spawn(async move { body.run(ctx).await });

    let res = tokio::select! {
        joined = &mut unit => match flatten(joined) {
            Err(_) if token.is_cancelled() => Err(TaskError::Canceled),
            res => res,
        },
        _ = token.cancelled() => {
            let _ = settle(&mut unit).await;
            Err(TaskError::Canceled)
        }
        limit = wall_limit(task.limits().wall_time) => {
            debug!(task = %task.id(), ?limit, "wall-time limit hit");
            token.cancel();
            let _ = settle(&mut unit).await;
            Err(TaskError::Timeout { limit })
        }
    };

    finalize(&task, started, res).await;
}

/// Waits up to [`STOP_GRACE`] for a cancelled body, then aborts it.
async fn settle(unit: &mut JoinHandle<Result<(), TaskError>>) -> Result<(), TaskError> {
    match time::timeout(STOP_GRACE, &mut *unit).await {
        Ok(joined) => flatten(joined),
        Err(_) => {
            unit.abort();
            Err(TaskError::Canceled)
        }
    }
}

async fn wall_limit(limit: Option<Duration>) -> Duration {
    match limit.filter(|d| !d.is_zero()) {
        Some(d) => {
            time::sleep(d).await;
            d
        }
        None => std::future::pending().await,
    }
}

fn flatten(joined: Result<Result<(), TaskError>, JoinError>) -> Result<(), TaskError> {
    match joined {
        Ok(res) => res,
        Err(e) if e.is_panic() => Err(TaskError::Fatal {
            error: format!("body panicked: {}", panic_message(e.into_panic())),
        }),
        Err(_) => Err(TaskError::Canceled),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn finalize(task: &Task, started: Instant, res: Result<(), TaskError>) {
    let children = task.children();
    join_all(children.iter().map(Task::halt)).await;

    let state = match &res {
        Ok(()) => TaskState::FinishedOk,
        Err(TaskError::Canceled) => TaskState::Stopped,
        Err(_) if task.was_stop_requested() => TaskState::Stopped,
        Err(_) => TaskState::FinishedError,
    };
    let failure = match (&res, state) {
        (Err(e), TaskState::FinishedError) => Some(e.clone()),
        _ => None,
    };

    let elapsed = started.elapsed();
    let usage = {
        let mut usage = lock(&task.inner.usage);
        usage.wall_time = elapsed;
        if task.config().include_child_resources {
            for child in &children {
                usage.absorb(&child.usage());
            }
        }
        *usage
    };
    *lock(&task.inner.failure) = failure.clone();

    let log = task.log_file();
    let attach = task.config().weight.attaches_logs()
        && tokio::fs::try_exists(&log).await.unwrap_or(false);

    if let Some(sink) = &task.inner.sink {
        sink.send(Report {
            seq: 0,
            id: task.id().to_string(),
            state,
            wall_time_ms: millis(usage.wall_time),
            cpu_time_ms: millis(usage.cpu_time),
            memory_bytes: usage.memory_bytes,
            log: attach.then(|| log.clone()),
            error: failure.as_ref().map(ToString::to_string),
        });
    }

    if !task.config().keep_intermediate_files {
        let mut keep = task.inner.keep.clone();
        if attach {
            keep.push(log);
        }
        if let Err(e) = cleanup::remove_work_dir(task.work_dir(), keep).await {
            warn!(task = %task.id(), error = %e, "work dir cleanup failed");
        }
    }

    task.transition(state);
    match (state, failure) {
        (TaskState::FinishedOk, _) => {
            info!(task = %task.id(), ?elapsed, "task finished");
            task.publish(Event::new(EventKind::TaskFinished).with_elapsed(elapsed));
        }
        (TaskState::FinishedError, Some(e)) => {
            warn!(task = %task.id(), error = %e, label = e.as_label(), "task failed");
            task.publish(
                Event::new(EventKind::TaskFailed)
                    .with_reason(e.to_string())
                    .with_elapsed(elapsed),
            );
        }
        _ => {
            info!(task = %task.id(), ?elapsed, "task stopped");
            task.publish(Event::new(EventKind::TaskStopped).with_elapsed(elapsed));
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
