//! # Resource governance.
//!
//! - [`ResourceLimits`] - per-attempt budget and its rlimit enforcement
//! - [`GovernorConfig`] - QoS defaults, global allowance, growth step
//! - [`Governor`] - issues budgets and decides on retries with enlarged budgets

mod config;
mod core;
mod limits;

pub use config::{DEFAULT_MIN_GROWTH, GovernorConfig};
pub use core::{Governor, Outcome, RetryDecision, Verdict};
pub use limits::{ResourceLimits, attach_rlimits};
