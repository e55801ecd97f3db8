//! # Worker pools.
//!
//! Two schedulers run many [`Task`](crate::Task)s under a concurrency bound.
//! Both are coordinators: they start, poll and stop tasks but never execute
//! a body inline.
//!
//! - [`BatchPool`] - fixed, known batch started together; first failure stops the rest
//! - [`QueuePool`] - open-ended [`WorkSource`] with a (possibly stepped) worker target
//!
//! Either pool always stops the tasks still alive before returning, also when
//! it fails or is interrupted through its shutdown token.

mod batch;
mod config;
mod queue;
mod source;

pub use batch::BatchPool;
pub use config::{PoolConfig, Trigger, Workers};
pub use queue::QueuePool;
pub use source::{Pop, WorkSource};
