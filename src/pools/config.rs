use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::ConfigError;
use crate::tasks::Task;

/// Predicate deciding whether a freshly started task triggers the worker step.
pub type Trigger = Arc<dyn Fn(&Task) -> bool + Send + Sync>;

/// Concurrency target of a pool.
#[derive(Clone)]
pub enum Workers {
    /// Constant number of concurrently running tasks.
    Fixed(usize),
    /// Starts with `initial`; switches to `grown` the first time a started
    /// task satisfies `trigger`.
    Step {
        initial: usize,
        grown: usize,
        trigger: Trigger,
    },
}

impl Workers {
    /// Builds the step form from a plain closure.
    pub fn step<F>(initial: usize, grown: usize, trigger: F) -> Self
    where
        F: Fn(&Task) -> bool + Send + Sync + 'static,
    {
        Workers::Step {
            initial,
            grown,
            trigger: Arc::new(trigger),
        }
    }

    /// Target before any step happened.
    #[inline]
    pub fn initial(&self) -> usize {
        match self {
            Workers::Fixed(n) => *n,
            Workers::Step { initial, .. } => *initial,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let counts = match self {
            Workers::Fixed(n) => [*n, *n],
            Workers::Step { initial, grown, .. } => [*initial, *grown],
        };
        match counts.into_iter().find(|n| *n == 0) {
            Some(_) => Err(ConfigError::InvalidParallelism {
                value: self.to_string(),
                resolved: 0,
                max: usize::MAX,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Workers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workers::Fixed(n) => write!(f, "{n}"),
            Workers::Step { initial, grown, .. } => write!(f, "[{initial}, {grown}]"),
        }
    }
}

impl fmt::Debug for Workers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Workers({self})")
    }
}

/// Configuration shared by both pools.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Length of one polling cycle; divided fairly among running tasks.
    pub poll_interval: Duration,

    /// Queue pool only: record failures and keep going instead of propagating.
    pub fail_tolerant: bool,

    /// Queue pool only: concurrency target.
    pub workers: Workers,
}

impl PoolConfig {
    /// Derives a pool configuration from the global one.
    ///
    /// Fails if the configured parallelism resolves outside `[1, 2 × cores]`.
    pub fn from_config(conf: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            poll_interval: conf.poll_interval(),
            fail_tolerant: false,
            workers: Workers::Fixed(conf.workers()?),
        })
    }

    pub fn with_workers(mut self, workers: Workers) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_fail_tolerant(mut self, tolerant: bool) -> Self {
        self.fail_tolerant = tolerant;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Rejects zero worker counts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.workers.validate()
    }
}

impl Default for PoolConfig {
    /// One worker, 100ms cycles, failures propagate.
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            fail_tolerant: false,
            workers: Workers::Fixed(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parallelism;

    #[test]
    fn from_config_resolves_parallelism() {
        let conf = Config {
            parallelism: Parallelism::Absolute(1),
            poll_interval_ms: 20,
            ..Config::default()
        };
        let pool = PoolConfig::from_config(&conf).unwrap();
        assert_eq!(pool.workers.initial(), 1);
        assert_eq!(pool.poll_interval, Duration::from_millis(20));
        assert!(!pool.fail_tolerant);
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        let conf = PoolConfig::default().with_workers(Workers::step(2, 0, |_| true));
        assert!(matches!(
            conf.validate(),
            Err(ConfigError::InvalidParallelism { .. })
        ));
        assert_eq!(Workers::step(1, 4, |_| false).to_string(), "[1, 4]");
    }
}
