//! # Task bodies.
//!
//! [`Runnable`] is the unit of work a [`Task`](crate::Task) executes. It receives
//! a [`TaskContext`] and should check the cancellation token at its own
//! checkpoints to stop cooperatively.
//!
//! [`RunnableFn`] wraps a closure `Fn(TaskContext) -> Fut`, producing a fresh
//! future per run; share state explicitly through `Arc` inside the closure.
//!
//! ## Example
//! ```rust
//! use verivisor::{RunnableFn, RunnableRef, TaskContext, TaskError};
//!
//! let body: RunnableRef = RunnableFn::arc(|ctx: TaskContext| async move {
//!     if ctx.is_cancelled() {
//!         return Err(TaskError::Canceled);
//!     }
//!     // do work...
//!     Ok(())
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::tasks::context::TaskContext;

/// Asynchronous, cancelable task body.
#[async_trait]
pub trait Runnable: Send + Sync + 'static {
    /// Executes the body until completion or cancellation.
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError>;
}

/// Shared handle to a body.
pub type RunnableRef = Arc<dyn Runnable>;

/// Function-backed body.
pub struct RunnableFn<F> {
    f: F,
}

impl<F, Fut> RunnableFn<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the body and returns it as a [`RunnableRef`].
    pub fn arc(f: F) -> RunnableRef {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Runnable for RunnableFn<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError> {
        (self.f)(ctx).await
    }
}
