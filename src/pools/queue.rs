//! # Queue-driven pool.
//!
//! Continuously drains a [`WorkSource`], keeps up to `N` tasks running and
//! terminates once the source ended and all work is done.
//!
//! ```text
//! loop {
//!   shutdown requested?                          ─► Interrupted
//!   1. drain source (non-blocking)               ─► backlog (FIFO)
//!   2. while running < N: pop, construct, start  ─► maybe step N0 → N1 (once)
//!   3. join(each, poll / running)                ─► failure: tolerant ? code = 1 : propagate
//!   4. remove finished tasks, keeping order
//!   5. source ended, backlog empty, none running ─► done
//!   idle: wait for the first element instead of spinning
//! }
//! teardown (always): stop every task still running
//! ```
//!
//! ## Governed runs
//! [`QueuePool::run_governed`] routes every element through a [`Governor`]:
//! the constructor receives the issued [`ResourceLimits`]; a `Timeout` or
//! `OutOfMemory` failure is recorded and, depending on the decision, the
//! element is re-queued (`Retry`), parked until rescheduling mode (`Wait`) or
//! treated as an ordinary failure (`Abandon`). When the source ends, the
//! number of received elements is declared as the workload size.

use std::collections::VecDeque;

use futures::future::join_all;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::batch::fair_slice;
use super::config::{PoolConfig, Workers};
use super::source::{Pop, WorkSource};
use crate::error::{RuntimeError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::governor::{Governor, Outcome, ResourceLimits, RetryDecision, Verdict};
use crate::tasks::{Task, TaskState};

/// Governor plumbing for one governed run.
struct Governance<'g, J> {
    governor: &'g mut Governor,
    identity: &'g (dyn Fn(&J) -> String + Send + Sync),
    duplicate: fn(&J) -> J,
}

struct Running<J> {
    task: Task,
    /// Identity and a copy of the element, for governed runs.
    origin: Option<(String, J)>,
    _guard: DropGuard,
}

struct Parked<J> {
    id: String,
    job: J,
    error: TaskError,
}

/// Scheduler for an open-ended stream of work.
pub struct QueuePool {
    conf: PoolConfig,
    bus: Option<Bus>,
    shutdown: Option<CancellationToken>,
}

impl QueuePool {
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

    /// Processes every element of `source` through `constructor`.
    ///
    /// Returns `0` if every task succeeded, `1` if a failure was tolerated.
    /// Without `fail_tolerant` the first failure is returned as an error
    /// after the remaining tasks were stopped.
    pub async fn run<J, S, C>(&self, source: &mut S, mut constructor: C) -> Result<i32, RuntimeError>
    where
        J: Send,
        S: WorkSource<J>,
        C: FnMut(J) -> Result<Task, RuntimeError>,
    {
        self.execute(source, None, |job, _limits| constructor(job))
            .await
    }

    /// Like [`QueuePool::run`], with budgets and retries decided by `governor`.
    ///
    /// `identity` names an element's task; it must match the id of the task
    /// the constructor builds for it.
    pub async fn run_governed<J, S, I, C>(
        &self,
        source: &mut S,
        governor: &mut Governor,
        identity: I,
        constructor: C,
    ) -> Result<i32, RuntimeError>
    where
        J: Clone + Send,
        S: WorkSource<J>,
        I: Fn(&J) -> String + Send + Sync,
        C: FnMut(J, ResourceLimits) -> Result<Task, RuntimeError>,
    {
        let gov = Governance {
            governor,
            identity: &identity,
            duplicate: J::clone,
        };
        self.execute(source, Some(gov), constructor).await
    }

    async fn execute<J, S, C>(
        &self,
        source: &mut S,
        gov: Option<Governance<'_, J>>,
        constructor: C,
    ) -> Result<i32, RuntimeError>
    where
        J: Send,
        S: WorkSource<J>,
        C: FnMut(J, ResourceLimits) -> Result<Task, RuntimeError>,
    {
        self.conf.validate()?;
        let mut run = Cycle {
            pool: self,
            gov,
            constructor,
            backlog: VecDeque::new(),
            parked: Vec::new(),
            running: Vec::new(),
            target: self.conf.workers.initial(),
            stepped: false,
            exhausted: false,
            received: 0,
            failed: false,
        };
        let res = run.drive(source).await;
        run.teardown().await;
        res
    }

    fn interrupted(&self) -> bool {
        self.shutdown.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn publish(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev);
        }
    }
}

/// State of one pool run.
struct Cycle<'p, 'g, J, C> {
    pool: &'p QueuePool,
    gov: Option<Governance<'g, J>>,
    constructor: C,
    backlog: VecDeque<J>,
    parked: Vec<Parked<J>>,
    running: Vec<Running<J>>,
    target: usize,
    stepped: bool,
    exhausted: bool,
    received: usize,
    failed: bool,
}

impl<J, C> Cycle<'_, '_, J, C>
where
    J: Send,
    C: FnMut(J, ResourceLimits) -> Result<Task, RuntimeError>,
{
    async fn drive<S: WorkSource<J>>(&mut self, source: &mut S) -> Result<i32, RuntimeError> {
        loop {
            if self.pool.interrupted() {
                return Err(RuntimeError::Interrupted);
            }

            self.drain(source);
            self.revisit_parked()?;
            self.fill().await?;
            self.poll().await?;

            if self.exhausted
                && self.backlog.is_empty()
                && self.running.is_empty()
                && self.parked.is_empty()
            {
                let code = i32::from(self.failed);
                info!(received = self.received, code, "queue pool finished");
                return Ok(code);
            }

            if self.running.is_empty() && self.backlog.is_empty() {
                self.idle(source).await?;
            }
        }
    }

    /// Moves every currently available element into the backlog.
    fn drain<S: WorkSource<J>>(&mut self, source: &mut S) {
        while !self.exhausted {
            match source.try_pop() {
                Pop::Item(job) => self.accept(job),
                Pop::Empty => break,
                Pop::End => self.end_of_stream(),
            }
        }
    }

    /// Nothing to run: wait for the source (or sleep while parked work waits).
    async fn idle<S: WorkSource<J>>(&mut self, source: &mut S) -> Result<(), RuntimeError> {
        let poll = self.pool.conf.poll_interval;
        let shutdown = self.pool.shutdown.clone().unwrap_or_default();
        if self.exhausted || !self.parked.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = shutdown.cancelled() => return Err(RuntimeError::Interrupted),
            }
            return Ok(());
        }
        tokio::select! {
            pop = source.wait_first() => match pop {
                Pop::Item(job) => self.accept(job),
                Pop::End => self.end_of_stream(),
                Pop::Empty => {}
            },
            _ = shutdown.cancelled() => return Err(RuntimeError::Interrupted),
        }
        Ok(())
    }

    fn accept(&mut self, job: J) {
        self.received += 1;
        self.backlog.push_back(job);
    }

    fn end_of_stream(&mut self) {
        self.exhausted = true;
        debug!(received = self.received, "work source exhausted");
        if let Some(gov) = self.gov.as_mut() {
            gov.governor.set_total_tasks(self.received);
        }
    }

    /// Re-evaluates elements waiting for rescheduling mode.
    fn revisit_parked(&mut self) -> Result<(), RuntimeError> {
        let Some(gov) = self.gov.as_mut() else {
            return Ok(());
        };
        let stalled = self.exhausted && self.backlog.is_empty() && self.running.is_empty();

        let mut abandoned = Vec::new();
        for p in std::mem::take(&mut self.parked) {
            match gov.governor.retry_decision(&p.id) {
                RetryDecision::Retry(_) => self.backlog.push_back(p.job),
                RetryDecision::Wait if !stalled => self.parked.push(p),
                RetryDecision::Wait | RetryDecision::Abandon => abandoned.push(p),
            }
        }
        for p in abandoned {
            self.failure(RuntimeError::Execution {
                id: p.id,
                error: p.error,
            })?;
        }
        Ok(())
    }

    /// Starts tasks from the backlog up to the current target.
    async fn fill(&mut self) -> Result<(), RuntimeError> {
        while self.running.len() < self.target {
            let Some(job) = self.backlog.pop_front() else {
                break;
            };

            let (task, origin) = match self.gov.as_mut() {
                Some(gov) => {
                    let id = (gov.identity)(&job);
                    let limits = gov.governor.issue(&id);
                    let copy = (gov.duplicate)(&job);
                    ((self.constructor)(job, limits)?, Some((id, copy)))
                }
                None => ((self.constructor)(job, ResourceLimits::default())?, None),
            };

            let guard = task.cancel_on_drop();
            self.running.push(Running {
                task: task.clone(),
                origin,
                _guard: guard,
            });
            task.start().await?;
            self.maybe_step(&task);
        }
        Ok(())
    }

    fn maybe_step(&mut self, task: &Task) {
        if self.stepped {
            return;
        }
        if let Workers::Step { grown, trigger, .. } = &self.pool.conf.workers {
            if trigger(task) {
                self.stepped = true;
                self.target = *grown;
                info!(task = %task.id(), workers = *grown, "worker target stepped");
                self.pool.publish(
                    Event::new(EventKind::WorkersStepped)
                        .with_task(task.id())
                        .with_workers(*grown),
                );
            }
        }
    }

    /// Joins every running task for its share of the cycle and settles finished ones.
    async fn poll(&mut self) -> Result<(), RuntimeError> {
        if self.running.is_empty() {
            return Ok(());
        }
        let slice = fair_slice(self.pool.conf.poll_interval, self.running.len());
        let mut i = 0;
        while i < self.running.len() {
            let res = self.running[i].task.join(Some(slice)).await;
            let finished = match &res {
                Ok(state) => state.is_terminal(),
                Err(RuntimeError::Execution { .. }) => true,
                Err(_) => self.running[i].task.state().is_terminal(),
            };
            if !finished {
                if let Err(e) = res {
                    self.failure(e)?;
                }
                i += 1;
                continue;
            }
            let done = self.running.remove(i);
            self.settle(done, res)?;
        }
        Ok(())
    }

    fn settle(
        &mut self,
        done: Running<J>,
        res: Result<TaskState, RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let Some((id, job)) = done.origin else {
            return res.map(drop).or_else(|e| self.failure(e));
        };
        let Some(gov) = self.gov.as_mut() else {
            return res.map(drop).or_else(|e| self.failure(e));
        };

        let error = match res {
            Ok(_) => {
                gov.governor.record(&id, Outcome::Success);
                return Ok(());
            }
            Err(RuntimeError::Execution { error, .. }) => error,
            Err(other) => {
                gov.governor.record(&id, Outcome::Failure);
                return self.failure(other);
            }
        };

        if gov.governor.record(&id, Outcome::of(&Err(error.clone()))) == Verdict::Pending {
            match gov.governor.retry_decision(&id) {
                RetryDecision::Retry(limits) => {
                    debug!(task = %id, ?limits, "re-queued with an enlarged budget");
                    self.backlog.push_back(job);
                    return Ok(());
                }
                RetryDecision::Wait => {
                    debug!(task = %id, "parked until rescheduling mode");
                    self.parked.push(Parked { id, job, error });
                    return Ok(());
                }
                RetryDecision::Abandon => {}
            }
        }
        self.failure(RuntimeError::Execution { id, error })
    }

    fn failure(&mut self, err: RuntimeError) -> Result<(), RuntimeError> {
        if !self.pool.conf.fail_tolerant {
            return Err(err);
        }
        warn!(error = %err, task = err.task_id().unwrap_or("-"), "task failed; tolerated");
        self.failed = true;
        Ok(())
    }

    async fn teardown(&mut self) {
        let live: Vec<Task> = self
            .running
            .iter()
            .map(|r| r.task.clone())
            .filter(|t| !t.state().is_terminal())
            .collect();
        if !live.is_empty() {
            debug!(tasks = live.len(), "queue pool teardown");
            self.pool
                .publish(Event::new(EventKind::PoolTeardown).with_workers(live.len()));
            for (t, res) in live.iter().zip(join_all(live.iter().map(Task::stop)).await) {
                if let Err(e) = res {
                    warn!(task = %t.id(), error = %e, "stop failed during teardown");
                }
            }
        }
        self.running.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use super::*;
    use crate::callbacks::{CallbackRegistry, Interception};
    use crate::config::Config;
    use crate::governor::GovernorConfig;
    use crate::pools::batch::tests::{conf, fails_after, succeeds_after, task};
    use crate::tasks::{RunnableFn, TaskContext};

    fn pool(workers: Workers, tolerant: bool) -> QueuePool {
        QueuePool::new(
            PoolConfig::default()
                .with_poll_interval(Duration::from_millis(10))
                .with_workers(workers)
                .with_fail_tolerant(tolerant),
        )
    }

    fn source<J: Send + 'static>(jobs: Vec<J>) -> mpsc::Receiver<Option<J>> {
        let (tx, rx) = mpsc::channel(jobs.len() + 1);
        for j in jobs {
            tx.try_send(Some(j)).unwrap();
        }
        tx.try_send(None).unwrap();
        rx
    }

    #[tokio::test]
    async fn tolerant_pool_processes_every_element_once() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let runs: Arc<Mutex<HashMap<usize, usize>>> = Arc::default();

        let mut rx = source((0..10).collect::<Vec<usize>>());
        let code = pool(Workers::Fixed(3), true)
            .run(&mut rx, |i: usize| {
                let runs = Arc::clone(&runs);
                let body = RunnableFn::arc(move |_ctx| {
                    let runs = Arc::clone(&runs);
                    async move {
                        *runs.lock().unwrap().entry(i).or_default() += 1;
                        if i % 3 == 0 {
                            Err(TaskError::fail("unsound"))
                        } else {
                            Ok(())
                        }
                    }
                });
                Ok(task(&conf, &format!("job/{i}"), body))
            })
            .await
            .unwrap();

        assert_eq!(code, 1);
        let runs = runs.lock().unwrap();
        assert_eq!(runs.len(), 10);
        assert!(runs.values().all(|n| *n == 1));
    }

    #[tokio::test]
    async fn tolerant_pool_without_failures_returns_zero() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let mut rx = source(vec!["a", "b", "c", "d"]);

        let code = pool(Workers::Fixed(2), true)
            .run(&mut rx, |id: &str| Ok(task(&conf, id, succeeds_after(5))))
            .await
            .unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn failure_stops_siblings_and_names_the_culprit() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let started: Arc<Mutex<Vec<Task>>> = Arc::default();
        let mut rx = source(vec!["A", "B", "C"]);

        let err = pool(Workers::Fixed(3), false)
            .run(&mut rx, |id: &str| {
                let body = if id == "B" {
                    fails_after(0)
                } else {
                    succeeds_after(1000)
                };
                let t = task(&conf, id, body);
                started.lock().unwrap().push(t.clone());
                Ok(t)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RuntimeError::Execution { ref id, .. } if id == "B"));
        let started = started.lock().unwrap();
        assert_eq!(started.len(), 3);
        for t in started.iter() {
            assert!(!t.is_alive());
            let expected = if t.id().as_str() == "B" {
                TaskState::FinishedError
            } else {
                TaskState::Stopped
            };
            assert_eq!(t.state(), expected, "{}", t.id());
        }
    }

    fn vetoed_join(conf: &Arc<Config>, id: &str, body: crate::tasks::RunnableRef) -> Task {
        let mut callbacks = CallbackRegistry::builder();
        callbacks
            .register("audit", Interception::Before, "join", |_: &Task| {
                Err(TaskError::fail("join vetoed"))
            })
            .unwrap();
        Task::builder(id)
            .config(Arc::clone(conf))
            .callbacks(callbacks.build())
            .body(body)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn join_callback_error_on_a_running_task_fails_the_pool() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let started: Arc<Mutex<Vec<Task>>> = Arc::default();
        let mut rx = source(vec!["slow"]);

        let err = pool(Workers::Fixed(1), false)
            .run(&mut rx, |id: &str| {
                let t = vetoed_join(&conf, id, succeeds_after(60_000));
                started.lock().unwrap().push(t.clone());
                Ok(t)
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RuntimeError::Callback { ref id, ref event, .. } if id == "slow" && event == "join"
        ));
        let started = started.lock().unwrap();
        assert_eq!(started[0].state(), TaskState::Stopped);
    }

    #[tokio::test]
    async fn tolerated_join_callback_error_is_counted() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let mut rx = source(vec!["a", "b"]);

        let code = pool(Workers::Fixed(2), true)
            .run(&mut rx, |id: &str| Ok(vetoed_join(&conf, id, succeeds_after(30))))
            .await
            .unwrap();
        assert_eq!(code, 1);
    }

    fn tracks_concurrency(
        active: &Arc<AtomicUsize>,
        peak: &Arc<AtomicUsize>,
        ms: u64,
    ) -> crate::tasks::RunnableRef {
        let active = Arc::clone(active);
        let peak = Arc::clone(peak);
        RunnableFn::arc(move |_ctx| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn step_sequence_grows_once_triggered() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let bus = Bus::new(16);
        let mut events = bus.subscribe();

        let mut rx = source(vec!["wide", "a", "b"]);
        let code = pool(Workers::step(1, 3, |t| t.id().name() == "wide"), false)
            .with_bus(bus)
            .run(&mut rx, |id: &str| {
                Ok(task(&conf, id, tracks_concurrency(&active, &peak, 200)))
            })
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        let ev = events.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::WorkersStepped);
        assert_eq!(ev.workers, Some(3));
    }

    #[tokio::test]
    async fn step_sequence_without_trigger_keeps_initial_target() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut rx = source(vec!["a", "b", "c"]);
        pool(Workers::step(1, 3, |t| t.id().name() == "wide"), false)
            .run(&mut rx, |id: &str| {
                Ok(task(&conf, id, tracks_concurrency(&active, &peak, 20)))
            })
            .await
            .unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn late_elements_are_picked_up_while_idle() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let (tx, mut rx) = mpsc::channel::<Option<&'static str>>(1);
        let producer = tokio::spawn(async move {
            for id in ["x", "y"] {
                tokio::time::sleep(Duration::from_millis(30)).await;
                tx.send(Some(id)).await.unwrap();
            }
            tx.send(None).await.unwrap();
        });

        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let code = pool(Workers::Fixed(2), false)
            .run(&mut rx, |id: &str| {
                seen.lock().unwrap().push(id.to_string());
                Ok(task(&conf, id, succeeds_after(1)))
            })
            .await
            .unwrap();
        producer.await.unwrap();

        assert_eq!(code, 0);
        assert_eq!(*seen.lock().unwrap(), ["x", "y"]);
    }

    #[tokio::test]
    async fn shutdown_interrupts_running_work() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let (tx, mut rx) = mpsc::channel::<Option<&'static str>>(4);
        tx.send(Some("long")).await.unwrap();
        let token = CancellationToken::new();
        let started: Arc<Mutex<Vec<Task>>> = Arc::default();

        let stopper = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                token.cancel();
            })
        };
        let err = pool(Workers::Fixed(1), false)
            .with_shutdown(token)
            .run(&mut rx, |id: &str| {
                let t = task(&conf, id, succeeds_after(60_000));
                started.lock().unwrap().push(t.clone());
                Ok(t)
            })
            .await
            .unwrap_err();
        stopper.await.unwrap();

        assert!(matches!(err, RuntimeError::Interrupted));
        assert_eq!(started.lock().unwrap()[0].state(), TaskState::Stopped);
        drop(tx);
    }

    /// Times out while its CPU budget is at most `needs` seconds.
    fn needs_cpu(
        needs: u64,
    ) -> impl Fn(TaskContext) -> std::future::Ready<Result<(), TaskError>> + Send + Sync + 'static
    {
        move |ctx: TaskContext| {
            let cpu = ctx.limits().cpu_time.unwrap_or_default();
            std::future::ready(if cpu.as_secs() > needs {
                Ok(())
            } else {
                Err(TaskError::Timeout { limit: cpu })
            })
        }
    }

    fn governor(allowance: u64) -> Governor {
        Governor::new(GovernorConfig {
            qos: ResourceLimits {
                cpu_time: Some(Duration::from_secs(10)),
                ..Default::default()
            },
            wall_time_allowance: Some(Duration::from_secs(allowance)),
            ..GovernorConfig::default()
        })
    }

    fn governed_task(conf: &Arc<Config>, id: &str, limits: ResourceLimits, needs: u64) -> Task {
        Task::builder(id)
            .config(Arc::clone(conf))
            .limits(limits)
            .body(RunnableFn::arc(needs_cpu(needs)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn exhausted_budget_is_retried_with_more_cpu() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let mut gov = governor(1000);
        let issued: Arc<Mutex<Vec<u64>>> = Arc::default();

        let mut rx = source(vec![("hard", 12u64), ("easy", 1)]);
        let code = pool(Workers::Fixed(2), false)
            .run_governed(
                &mut rx,
                &mut gov,
                |job| job.0.to_string(),
                |(id, needs), limits| {
                    if id == "hard" {
                        let cpu = limits.cpu_time.unwrap_or_default().as_secs();
                        issued.lock().unwrap().push(cpu);
                    }
                    Ok(governed_task(&conf, id, limits, needs))
                },
            )
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(*issued.lock().unwrap(), [10, 15]);
        assert!(!gov.is_tracked("hard"));
    }

    #[tokio::test]
    async fn abandoned_retry_is_an_ordinary_failure() {
        let root = TempDir::new().unwrap();
        let conf = conf(&root);
        let mut gov = governor(20);

        let mut rx = source(vec![("greedy", 1000u64)]);
        let code = pool(Workers::Fixed(1), true)
            .run_governed(
                &mut rx,
                &mut gov,
                |job| job.0.to_string(),
                |(id, needs), limits| Ok(governed_task(&conf, id, limits, needs)),
            )
            .await
            .unwrap();

        assert_eq!(code, 1);
        assert!(!gov.is_tracked("greedy"));
    }
}
