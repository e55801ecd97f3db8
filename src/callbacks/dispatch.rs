//! Before → Instead-or-body → After dispatch for one named operation.

use std::future::Future;

use serde_json::Value;
use tracing::trace;

use super::registry::{CallbackRegistry, Handler};
use crate::error::RuntimeError;
use crate::tasks::Task;

impl CallbackRegistry {
    /// Runs `body` for `event` on `task`, wrapped by the registered handlers.
    ///
    /// - Before handlers run first, their values are discarded.
    /// - Instead handlers, if any, replace `body`; it is never polled then.
    /// - After handlers run last; the final value is the last one executed.
    ///
    /// A handler error aborts the dispatch as [`RuntimeError::Callback`].
    pub async fn dispatch<F, Fut>(
        &self,
        task: &Task,
        event: &str,
        body: F,
    ) -> Result<Value, RuntimeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, RuntimeError>>,
    {
        run_all(self.before(event), task, event)?;

        let instead = self.instead(event);
        let mut out = if instead.is_empty() {
            body().await?
        } else {
            trace!(task = %task.id(), event, handlers = instead.len(), "operation replaced");
            run_all(instead, task, event)?
        };

        let after = self.after(event);
        if !after.is_empty() {
            out = run_all(after, task, event)?;
        }
        Ok(out)
    }
}

/// Invokes handlers in order and returns the last value (`Null` if none).
fn run_all(handlers: &[Handler], task: &Task, event: &str) -> Result<Value, RuntimeError> {
    let mut last = Value::Null;
    for h in handlers {
        last = h.call(task).map_err(|error| RuntimeError::Callback {
            id: task.id().to_string(),
            event: event.to_string(),
            error,
        })?;
    }
    Ok(last)
}
