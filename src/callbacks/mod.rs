//! # Callback interception for named task operations.
//!
//! A process-wide [`CallbackRegistry`] maps `(Interception, event)` to an
//! ordered list of `(owner, handler)` pairs. Every named public task operation
//! is dispatched through it:
//!
//! ```text
//! op(event)
//!   ├─► Before handlers   (registration order, values discarded)
//!   ├─► Instead handlers  (registration order) ── or ── original body
//!   └─► After handlers    (registration order, last value wins)
//! ```
//!
//! ## Lifecycle
//! - **Populate** with [`CallbackRegistryBuilder`] during start-up.
//! - **Freeze** with [`CallbackRegistryBuilder::build`]; the result is read-only.
//! - **Share** through [`CallbackRegistry::install`] / [`CallbackRegistry::global`],
//!   or pass an `Arc` explicitly to task builders.

mod dispatch;
mod registry;

pub use registry::{
    CallbackRegistry, CallbackRegistryBuilder, Handler, HandlerFn, Interception,
};
