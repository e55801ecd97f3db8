//! # Event subscribers.
//!
//! ```text
//! Task / Pool ── publish(Event) ──► Bus ──► spawn_listener ──► SubscriberSet
//!                                                                  │
//!                                                       ┌──────────┼──────────┐
//!                                                       ▼          ▼          ▼
//!                                                   LogWriter   Metrics    Custom
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::{SubscriberSet, spawn_listener};
pub use subscribe::Subscribe;
