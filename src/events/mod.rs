//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Task` (lifecycle), `BatchPool` / `QueuePool` (scheduling),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: [`SubscriberSet`](crate::SubscriberSet) through
//!   [`spawn_listener`](crate::spawn_listener), or any receiver from
//!   [`Bus::subscribe`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
