//! # Work sources for the queue pool.
//!
//! A [`WorkSource`] is a depletable, backpressured FIFO. The pool drains it
//! with non-blocking [`WorkSource::try_pop`]; [`WorkSource::wait_first`] is
//! only used while the pool is idle, to avoid spinning on an empty queue.
//!
//! The stock implementation is a bounded `tokio::sync::mpsc` channel of
//! `Option<J>`: producers get backpressure from the bound, and `None` (or
//! dropping every sender) marks the end of the stream.
//!
//! ## Example
//! ```rust
//! use tokio::sync::mpsc;
//! use verivisor::{Pop, WorkSource};
//!
//! let (tx, mut rx) = mpsc::channel::<Option<u32>>(8);
//! tx.try_send(Some(7)).unwrap();
//! tx.try_send(None).unwrap();
//!
//! assert_eq!(rx.try_pop(), Pop::Item(7));
//! assert_eq!(rx.try_pop(), Pop::End);
//! ```

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Result of popping from a [`WorkSource`].
#[derive(Debug, PartialEq, Eq)]
pub enum Pop<J> {
    Item(J),
    /// Nothing available right now.
    Empty,
    /// End-of-stream marker reached; nothing will follow.
    End,
}

/// Depletable queue of work elements.
#[async_trait]
pub trait WorkSource<J: Send>: Send {
    /// Pops one element without blocking.
    fn try_pop(&mut self) -> Pop<J>;

    /// Waits until an element or the end marker is available.
    async fn wait_first(&mut self) -> Pop<J>;
}

#[async_trait]
impl<J: Send> WorkSource<J> for mpsc::Receiver<Option<J>> {
    fn try_pop(&mut self) -> Pop<J> {
        match self.try_recv() {
            Ok(Some(job)) => Pop::Item(job),
            Ok(None) | Err(TryRecvError::Disconnected) => Pop::End,
            Err(TryRecvError::Empty) => Pop::Empty,
        }
    }

    async fn wait_first(&mut self) -> Pop<J> {
        match self.recv().await {
            Some(Some(job)) => Pop::Item(job),
            Some(None) | None => Pop::End,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_channel_is_end_of_stream() {
        let (tx, mut rx) = mpsc::channel::<Option<&str>>(2);
        assert_eq!(rx.try_pop(), Pop::Empty);
        tx.send(Some("a")).await.unwrap();
        drop(tx);
        assert_eq!(rx.wait_first().await, Pop::Item("a"));
        assert_eq!(rx.try_pop(), Pop::End);
        assert_eq!(rx.wait_first().await, Pop::End);
    }
}
