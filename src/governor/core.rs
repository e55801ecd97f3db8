//! # Resource governor.
//!
//! Issues per-identity budgets and decides whether a budget-exhausted task
//! may run again with a larger one, inside a global wall-clock allowance.
//!
//! ```text
//! Unseen ──issue──► Running ──record(OOM|Timeout)──► WaitingRetry
//!                      ▲                                 │
//!                      └────issue (enlarged)──── Retry ◄─┤
//!                                                        └─► Abandon (removed)
//! record(Success|Failure) ──► removed, Final
//! ```
//!
//! ## Rescheduling mode
//! Retries are offered only once the governor has seen the whole workload
//! (distinct identities == declared total) or when forced by configuration.
//!
//! ## Enlargement
//! `cpu' = round(cpu × factor)` in whole seconds, where `factor` is
//! `min_growth` unless all waiting identities grown by `min_growth` would
//! overshoot the remaining allowance; then `factor = remaining / Σ waiting cpu`.
//! A factor of 1.0 or below means no useful retry is possible.
//!
//! The governor is owned by a single coordinator (`&mut self`); it is never
//! shared across pools.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::config::GovernorConfig;
use super::limits::ResourceLimits;
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};

/// Outcome of one attempt, as far as the governor cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Failure unrelated to the budget.
    Failure,
    OutOfMemory,
    Timeout,
}

impl Outcome {
    #[inline]
    pub fn is_exhaustion(self) -> bool {
        matches!(self, Outcome::OutOfMemory | Outcome::Timeout)
    }

    /// Classifies a task result.
    pub fn of(res: &Result<(), TaskError>) -> Self {
        match res {
            Ok(()) => Outcome::Success,
            Err(TaskError::Timeout { .. }) => Outcome::Timeout,
            Err(TaskError::OutOfMemory { .. }) => Outcome::OutOfMemory,
            Err(_) => Outcome::Failure,
        }
    }
}

/// Whether a recorded outcome ends the identity's history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Final,
    /// Budget exhausted; consult [`Governor::retry_decision`].
    Pending,
}

/// What to do with a waiting-retry identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run again; the next [`Governor::issue`] returns these limits.
    Retry(ResourceLimits),
    /// Not in rescheduling mode yet; ask again later.
    Wait,
    /// No retry possible; the exhaustion is final.
    Abandon,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Running,
    WaitingRetry,
}

#[derive(Clone, Debug)]
struct Budget {
    issued: ResourceLimits,
    attempt: u32,
    status: Option<Outcome>,
    phase: Phase,
    enlarged: Option<ResourceLimits>,
}

/// Per-identity budget bookkeeping.
pub struct Governor {
    conf: GovernorConfig,
    deadline: Option<Instant>,
    budgets: HashMap<String, Budget>,
    seen: HashSet<String>,
    total: Option<usize>,
    bus: Option<Bus>,
}

impl Governor {
    /// Creates a governor; the global deadline is fixed now.
    pub fn new(conf: GovernorConfig) -> Self {
        let deadline = conf.wall_time_allowance.map(|w| Instant::now() + w);
        Self {
            conf,
            deadline,
            budgets: HashMap::new(),
            seen: HashSet::new(),
            total: None,
            bus: None,
        }
    }

    /// Publishes retry decisions to `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    #[inline]
    pub fn config(&self) -> &GovernorConfig {
        &self.conf
    }

    /// Returns the limits for the next attempt of `id`.
    ///
    /// Unseen identities get the QoS defaults; an identity with an authorized
    /// retry gets its enlarged limits and its attempt counter advances.
    pub fn issue(&mut self, id: &str) -> ResourceLimits {
        if !self.seen.contains(id) {
            self.seen.insert(id.to_string());
        }
        let qos = self.conf.qos;
        let b = self.budgets.entry(id.to_string()).or_insert_with(|| Budget {
            issued: qos,
            attempt: 0,
            status: None,
            phase: Phase::Running,
            enlarged: None,
        });

        if let Some(next) = b.enlarged.take() {
            b.issued = next;
            b.status = None;
        }
        b.phase = Phase::Running;
        b.attempt += 1;
        debug!(task = id, attempt = b.attempt, limits = ?b.issued, "budget issued");
        b.issued
    }

    /// Records the outcome of the current attempt of `id`.
    pub fn record(&mut self, id: &str, outcome: Outcome) -> Verdict {
        if !outcome.is_exhaustion() || self.deadline.is_none() {
            self.budgets.remove(id);
            return Verdict::Final;
        }
        match self.budgets.get_mut(id) {
            Some(b) => {
                b.phase = Phase::WaitingRetry;
                b.status = Some(outcome);
                debug!(task = id, attempt = b.attempt, ?outcome, "budget exhausted");
                Verdict::Pending
            }
            None => Verdict::Final,
        }
    }

    /// True when a retry of `id` could be authorized right now.
    pub fn may_retry(&self, id: &str) -> bool {
        let Some(b) = self.budgets.get(id) else {
            return false;
        };
        if b.phase != Phase::WaitingRetry || !self.rescheduling() {
            return false;
        }
        match b.issued.cpu_time {
            Some(cpu) => self.remaining() > cpu.mul_f64(self.conf.min_growth),
            None => false,
        }
    }

    /// Decides the fate of a waiting-retry identity.
    ///
    /// `Abandon` drops the identity's record; its exhaustion becomes final.
    pub fn retry_decision(&mut self, id: &str) -> RetryDecision {
        let Some(b) = self.budgets.get(id) else {
            return RetryDecision::Abandon;
        };
        if b.phase != Phase::WaitingRetry {
            return RetryDecision::Abandon;
        }
        if let Some(next) = b.enlarged {
            return RetryDecision::Retry(next);
        }
        if !self.rescheduling() {
            return RetryDecision::Wait;
        }
        if !self.may_retry(id) {
            return self.abandon(id, "global allowance exhausted");
        }

        let remaining = self.remaining();
        let waiting: Duration = self
            .budgets
            .values()
            .filter(|w| w.phase == Phase::WaitingRetry && w.enlarged.is_none())
            .filter_map(|w| w.issued.cpu_time)
            .sum();
        let mut factor = self.conf.min_growth;
        if waiting.mul_f64(factor) > remaining && !waiting.is_zero() {
            factor = remaining.as_secs_f64() / waiting.as_secs_f64();
        }
        if factor <= 1.0 {
            return self.abandon(id, "fair share too small");
        }

        let Some(b) = self.budgets.get_mut(id) else {
            return RetryDecision::Abandon;
        };
        let prev = b.issued.cpu_time.unwrap_or_default();
        let cpu = Duration::from_secs((prev.as_secs_f64() * factor).round() as u64);
        if cpu <= prev {
            return self.abandon(id, "enlarged budget rounds to the current one");
        }
        if cpu > remaining {
            return self.abandon(id, "enlarged budget exceeds the remaining allowance");
        }
        let next = b.issued.rescaled(cpu);
        b.enlarged = Some(next);
        let attempt = b.attempt + 1;

        info!(task = id, attempt, ?cpu, factor, "retry scheduled");
        self.publish(
            Event::new(EventKind::RetryScheduled)
                .with_task(id)
                .with_attempt(attempt)
                .with_reason(format!("cpu_time={}s", cpu.as_secs())),
        );
        RetryDecision::Retry(next)
    }

    /// Declares the size of the whole workload.
    pub fn set_total_tasks(&mut self, n: usize) {
        debug!(total = n, seen = self.seen.len(), "workload size declared");
        self.total = Some(n);
    }

    /// True if `id` has a live budget record.
    pub fn is_tracked(&self, id: &str) -> bool {
        self.budgets.contains_key(id)
    }

    /// Attempts made under `id` so far (0 if untracked).
    pub fn attempts(&self, id: &str) -> u32 {
        self.budgets.get(id).map_or(0, |b| b.attempt)
    }

    /// Last exhaustion recorded for `id` while it waits for a retry.
    pub fn status(&self, id: &str) -> Option<Outcome> {
        self.budgets.get(id).and_then(|b| b.status)
    }

    /// Time left in the global allowance (zero without one).
    pub fn remaining(&self) -> Duration {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }

    fn rescheduling(&self) -> bool {
        self.conf.force_rescheduling || self.total == Some(self.seen.len())
    }

    fn abandon(&mut self, id: &str, reason: &'static str) -> RetryDecision {
        let attempt = self.budgets.remove(id).map_or(0, |b| b.attempt);
        info!(task = id, attempt, reason, "retry abandoned");
        self.publish(
            Event::new(EventKind::RetryAbandoned)
                .with_task(id)
                .with_attempt(attempt)
                .with_reason(reason),
        );
        RetryDecision::Abandon
    }

    fn publish(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn conf(allowance: u64, cpu: u64) -> GovernorConfig {
        GovernorConfig {
            qos: ResourceLimits {
                cpu_time: Some(secs(cpu)),
                wall_time: Some(secs(cpu * 2)),
                memory_bytes: Some(1 << 30),
                disk_bytes: None,
            },
            wall_time_allowance: Some(secs(allowance)),
            min_growth: 1.5,
            force_rescheduling: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_timeouts_stay_inside_the_allowance() {
        let mut g = Governor::new(conf(100, 10));
        let mut issued = Vec::new();

        loop {
            let limits = g.issue("t");
            let cpu = limits.cpu_time.unwrap();
            issued.push(cpu.as_secs());
            tokio::time::advance(cpu).await;

            assert_eq!(g.record("t", Outcome::Timeout), Verdict::Pending);
            match g.retry_decision("t") {
                RetryDecision::Retry(next) => {
                    assert_eq!(next.wall_time, Some(next.cpu_time.unwrap() * 2));
                }
                RetryDecision::Abandon => break,
                RetryDecision::Wait => panic!("forced rescheduling never waits"),
            }
        }

        assert_eq!(issued, [10, 15, 23, 35]);
        assert!(issued.iter().sum::<u64>() <= 100);
        assert!(!g.may_retry("t"));
        assert!(!g.is_tracked("t"));
    }

    #[tokio::test(start_paused = true)]
    async fn clean_outcomes_are_final() {
        let mut g = Governor::new(conf(100, 10));
        g.issue("ok");
        assert_eq!(g.record("ok", Outcome::Success), Verdict::Final);
        g.issue("bad");
        assert_eq!(g.record("bad", Outcome::Failure), Verdict::Final);
        assert!(!g.is_tracked("ok"));
        assert!(!g.is_tracked("bad"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_without_allowance_is_final() {
        let mut g = Governor::new(GovernorConfig {
            wall_time_allowance: None,
            ..conf(100, 10)
        });
        g.issue("t");
        assert_eq!(g.record("t", Outcome::OutOfMemory), Verdict::Final);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_until_whole_workload_was_seen() {
        let mut g = Governor::new(GovernorConfig {
            force_rescheduling: false,
            ..conf(1000, 10)
        });
        g.issue("a");
        assert_eq!(g.record("a", Outcome::Timeout), Verdict::Pending);
        assert!(!g.may_retry("a"));
        assert_eq!(g.retry_decision("a"), RetryDecision::Wait);

        g.issue("b");
        g.record("b", Outcome::Success);
        g.set_total_tasks(2);
        assert!(g.may_retry("a"));
        assert!(matches!(g.retry_decision("a"), RetryDecision::Retry(_)));

        let next = g.issue("a");
        assert_eq!(next.cpu_time, Some(secs(15)));
        assert_eq!(g.attempts("a"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn growth_is_shared_fairly_near_the_deadline() {
        let mut g = Governor::new(conf(60, 10));
        for id in ["a", "b", "c"] {
            g.issue(id);
            g.record(id, Outcome::Timeout);
        }
        tokio::time::advance(secs(10)).await;

        // 50s left; three waiting at 10s grown by 1.5 need 45s, so plain growth fits.
        let RetryDecision::Retry(a) = g.retry_decision("a") else {
            panic!("expected retry");
        };
        assert_eq!(a.cpu_time, Some(secs(15)));

        tokio::time::advance(secs(25)).await;
        // 25s left, two waiting at 10s each: 30s would overshoot, factor = 1.25.
        let RetryDecision::Retry(b) = g.retry_decision("b") else {
            panic!("expected retry");
        };
        assert_eq!(b.cpu_time, Some(secs(13)));
        assert_eq!(g.status("b"), Some(Outcome::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn factor_at_or_below_one_abandons() {
        let mut g = Governor::new(conf(100, 10));
        for id in ["a", "b", "c", "d"] {
            g.issue(id);
            g.record(id, Outcome::OutOfMemory);
        }
        tokio::time::advance(secs(80)).await;
        // 20s left > 15s for "a" alone, but four waiting need 40s: factor 0.5.
        assert!(g.may_retry("a"));
        assert_eq!(g.retry_decision("a"), RetryDecision::Abandon);
        assert!(!g.is_tracked("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn rounded_budget_must_fit_the_remaining_allowance() {
        let mut g = Governor::new(conf(100, 15));
        g.issue("t");
        assert_eq!(g.record("t", Outcome::Timeout), Verdict::Pending);
        tokio::time::advance(Duration::from_millis(77_400)).await;

        // 22.6s left beats 15s x 1.5 = 22.5s, but the whole-second budget is 23s.
        assert!(g.may_retry("t"));
        assert_eq!(g.retry_decision("t"), RetryDecision::Abandon);
        assert!(!g.is_tracked("t"));
    }
}
