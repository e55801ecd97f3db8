//! # Fixed-batch pool.
//!
//! Starts a known list of tasks together and waits until none is alive.
//!
//! ```text
//! check ids ─► start all ─► loop {
//!                              shutdown requested?      ─► Interrupted
//!                              join(each, poll / alive) ─► first failure
//!                              any monitor terminal?    ─► MonitorDied
//!                              nothing pending          ─► done
//!                           }
//!           ─► teardown: stop every task still alive (always)
//! ```
//!
//! A failure is returned only after every other task was stopped.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use super::config::PoolConfig;
use crate::error::{ConfigError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::tasks::Task;

/// Scheduler for a finite, already-known set of tasks.
pub struct BatchPool {
    conf: PoolConfig,
    bus: Option<Bus>,
    shutdown: Option<CancellationToken>,
}

impl BatchPool {
    pub fn new(conf: PoolConfig) -> Self {
        Self {
            conf,
            bus: None,
            shutdown: None,
        }
    }

    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// External shutdown request; when cancelled the pool tears down and
    /// returns [`RuntimeError::Interrupted`].
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Runs `tasks` to completion.
    ///
    /// `monitors` are already-running, externally-owned tasks: they are only
    /// watched, and any of them terminating fails the batch with
    /// [`RuntimeError::MonitorDied`].
    pub async fn run(&self, tasks: Vec<Task>, monitors: &[Task]) -> Result<(), RuntimeError> {
        let mut ids = HashSet::with_capacity(tasks.len());
        for t in &tasks {
            if !ids.insert(t.id().as_str()) {
                return Err(ConfigError::DuplicateId {
                    id: t.id().to_string(),
                }
                .into());
            }
        }

        let _guards: Vec<DropGuard> = tasks.iter().map(Task::cancel_on_drop).collect();
        let res = self.drive(&tasks, monitors).await;
        self.teardown(&tasks).await;
        res
    }

    async fn drive(&self, tasks: &[Task], monitors: &[Task]) -> Result<(), RuntimeError> {
        for t in tasks {
            t.start().await?;
        }
        debug!(tasks = tasks.len(), monitors = monitors.len(), "batch started");

        let mut pending: Vec<&Task> = tasks.iter().collect();
        while !pending.is_empty() {
            if self.interrupted() {
                return Err(RuntimeError::Interrupted);
            }

            let slice = fair_slice(self.conf.poll_interval, pending.len());
            let mut i = 0;
            while i < pending.len() {
                let state = pending[i].join(Some(slice)).await?;
                if state.is_terminal() {
                    pending.remove(i);
                } else {
                    i += 1;
                }
            }

            if let Some(dead) = monitors.iter().find(|m| m.state().is_terminal()) {
                return Err(RuntimeError::MonitorDied {
                    id: dead.id().to_string(),
                });
            }
        }
        Ok(())
    }

    async fn teardown(&self, tasks: &[Task]) {
        let live: Vec<&Task> = tasks.iter().filter(|t| !t.state().is_terminal()).collect();
        if live.is_empty() {
            return;
        }
        debug!(tasks = live.len(), "batch teardown");
        if let Some(bus) = &self.bus {
            bus.publish(Event::new(EventKind::PoolTeardown).with_workers(live.len()));
        }
        for (t, res) in live.iter().zip(join_all(live.iter().map(|t| t.stop())).await) {
            if let Err(e) = res {
                warn!(task = %t.id(), error = %e, "stop failed during teardown");
            }
        }
    }

    fn interrupted(&self) -> bool {
        self.shutdown.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Splits one polling cycle among `n` tasks (at least 1ms each).
pub(crate) fn fair_slice(poll: Duration, n: usize) -> Duration {
    let n = u32::try_from(n.max(1)).unwrap_or(u32::MAX);
    (poll / n).max(Duration::from_millis(1))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use serde_json::Value;

    use super::*;
    use crate::callbacks::{CallbackRegistry, Interception};
    use crate::config::Config;
    use crate::error::TaskError;
    use crate::tasks::{RunnableFn, RunnableRef, TaskContext, TaskState};

    pub(crate) fn conf(root: &TempDir) -> Arc<Config> {
        Arc::new(Config {
            work_root: root.path().to_path_buf(),
            ..Config::default()
        })
    }

    pub(crate) fn task(conf: &Arc<Config>, id: &str, body: RunnableRef) -> Task {
        Task::builder(id)
            .config(Arc::clone(conf))
            .body(body)
            .build()
            .unwrap()
    }

    /// Succeeds after `ms`, or stops cooperatively.
    pub(crate) fn succeeds_after(ms: u64) -> RunnableRef {
        RunnableFn::arc(move |ctx: TaskContext| async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
                _ = ctx.cancelled() => Err(TaskError::Canceled),
            }
        })
    }

    pub(crate) fn fails_after(ms: u64) -> RunnableRef {
        RunnableFn::arc(move |_ctx| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Err(TaskError::fail("boom"))
        })
    }

    fn pool() -> BatchPool {
        BatchPool::new(PoolConfig::default().with_poll_interval(Duration::from_millis(20)))
    }

    #[tokio::test]
    async fn all_succeed() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let tasks: Vec<Task> = (0..3)
            .map(|i| task(&conf, &format!("ok-{i}"), succeeds_after(10 * i)))
            .collect();

        pool().run(tasks.clone(), &[]).await.unwrap();
        assert!(tasks.iter().all(|t| t.state() == TaskState::FinishedOk));
        assert!(!tasks.iter().any(Task::is_alive));
    }

    #[tokio::test]
    async fn one_failure_stops_the_rest() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let a = task(&conf, "a", succeeds_after(60_000));
        let b = task(&conf, "b", fails_after(30));
        let c = task(&conf, "c", succeeds_after(60_000));

        let err = pool()
            .run(vec![a.clone(), b.clone(), c.clone()], &[])
            .await
            .unwrap_err();

        assert_eq!(err.task_id(), Some("b"));
        assert_eq!(a.state(), TaskState::Stopped);
        assert_eq!(b.state(), TaskState::FinishedError);
        assert_eq!(c.state(), TaskState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failure_during_a_slow_join_handler_is_not_success() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let mut callbacks = CallbackRegistry::builder();
        callbacks
            .register("slow", Interception::After, "join", |_: &Task| {
                std::thread::sleep(Duration::from_millis(40));
                Ok(Value::Null)
            })
            .unwrap();
        let t = Task::builder("late")
            .config(Arc::clone(&conf))
            .callbacks(callbacks.build())
            .body(fails_after(30))
            .build()
            .unwrap();

        let err = pool().run(vec![t.clone()], &[]).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Execution { ref id, .. } if id == "late"));
        assert_eq!(t.state(), TaskState::FinishedError);
    }

    #[tokio::test]
    async fn duplicate_ids_start_nothing() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let x1 = task(&conf, "x", succeeds_after(0));
        let x2 = task(&conf, "x", succeeds_after(0));

        let err = pool().run(vec![x1.clone(), x2.clone()], &[]).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::DuplicateId { .. })
        ));
        assert_eq!(x1.state(), TaskState::Created);
        assert_eq!(x2.state(), TaskState::Created);
    }

    #[tokio::test]
    async fn dead_monitor_fails_the_batch() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let monitor = task(&conf, "server", succeeds_after(20));
        monitor.start().await.unwrap();
        let worker = task(&conf, "worker", succeeds_after(60_000));

        let err = pool()
            .run(vec![worker.clone()], std::slice::from_ref(&monitor))
            .await
            .unwrap_err();

        assert!(matches!(err, RuntimeError::MonitorDied { ref id } if id == "server"));
        assert_eq!(worker.state(), TaskState::Stopped);
    }

    #[tokio::test]
    async fn shutdown_interrupts_and_tears_down() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let worker = task(&conf, "worker", succeeds_after(60_000));
        let token = CancellationToken::new();
        let pool = pool().with_shutdown(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let err = pool.run(vec![worker.clone()], &[]).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, RuntimeError::Interrupted));
        assert_eq!(worker.state(), TaskState::Stopped);
    }

    #[test]
    fn slices_are_fair_and_bounded() {
        assert_eq!(fair_slice(Duration::from_millis(100), 4), Duration::from_millis(25));
        assert_eq!(fair_slice(Duration::from_millis(1), 10), Duration::from_millis(1));
        assert_eq!(fair_slice(Duration::from_millis(50), 0), Duration::from_millis(50));
    }
}
