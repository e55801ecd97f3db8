//! # Subscriber contract
//!
//! A subscriber consumes [`Event`]s published by tasks, pools and the governor.
//! The [`SubscriberSet`](crate::SubscriberSet) gives each subscriber its own
//! bounded queue and worker, so a slow report writer never delays task
//! finalization.

use async_trait::async_trait;

use crate::events::{Event, EventKind};

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should avoid
/// blocking the async runtime.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event.
    async fn on_event(&self, event: &Event);

    /// Whether events of `kind` should reach [`on_event`](Self::on_event).
    ///
    /// Filtered events still occupy a queue slot.
    fn accepts(&self, _kind: EventKind) -> bool {
        true
    }

    /// Human-readable name (for logs and overflow events).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity; on overflow events for this subscriber are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
