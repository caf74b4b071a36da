//! # Bounded Channel
//!
//! Bridges push-style delivery (broker callbacks, routing recomputation)
//! into pull-style consumption (RPC response streams).
//!
//! ```text
//!   producer ── push() ──► [ ring buffer, capacity N ] ── recv() ──► consumer
//!                  │                                         ▲
//!                  └── full: message dropped                 └── close(): end of stream
//! ```
//!
//! The producer never waits. A full buffer drops the incoming item and a
//! closed channel rejects it; both are reported through [`PushOutcome`].

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// Result of a [`Channel::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The item was queued.
    Delivered,
    /// The buffer was full and the item was discarded.
    Dropped,
    /// The channel was closed and the item was discarded.
    Closed,
}

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    capacity: usize,
}

/// A bounded, closable, single-consumer queue.
///
/// Clones share the same buffer. Once closed it stays closed, and pending
/// items are discarded so the consumer observes end-of-stream immediately.
pub struct Channel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Channel")
            .field("capacity", &self.inner.capacity)
            .field("len", &state.queue.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T> Channel<T> {
    /// Create a channel holding at most `capacity` undelivered items.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                notify: Notify::new(),
                capacity,
            }),
        }
    }

    /// Queue an item without waiting.
    pub fn push(&self, item: T) -> PushOutcome {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return PushOutcome::Closed;
            }
            if state.queue.len() >= self.inner.capacity {
                return PushOutcome::Dropped;
            }
            state.queue.push_back(item);
        }
        self.inner.notify.notify_one();
        PushOutcome::Delivered
    }

    /// Close the channel. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.queue.clear();
        }
        // `Notified` futures receive this as soon as they are created, even
        // before their first poll.
        self.inner.notify.notify_waiters();
    }

    /// Wait for the next item. `None` once the channel is closed.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.inner.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(item) = state.queue.pop_front() {
                    return Some(item);
                }
            }
            notified.await;
        }
    }

    /// Take the next item if one is ready.
    pub fn try_recv(&self) -> Option<T> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return None;
        }
        state.queue.pop_front()
    }

    /// Whether [`Channel::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether no items are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Whether `other` shares this channel's buffer.
    #[must_use]
    pub fn same_channel(&self, other: &Channel<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Send + 'static> Channel<T> {
    /// Consume the channel as a stream.
    ///
    /// The stream ends when the channel closes. Dropping the stream closes
    /// the channel, so cancelling a consumer releases the producer side too.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, T> {
        stream::unfold(CloseOnDrop(self), |guard| async move {
            let item = guard.0.recv().await?;
            Some((item, guard))
        })
        .boxed()
    }
}

struct CloseOnDrop<T>(Channel<T>);

impl<T> Drop for CloseOnDrop<T> {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_push_and_try_recv() {
        let channel = Channel::bounded(4);
        assert_eq!(channel.push(1), PushOutcome::Delivered);
        assert_eq!(channel.push(2), PushOutcome::Delivered);
        assert_eq!(channel.len(), 2);
        assert_eq!(channel.try_recv(), Some(1));
        assert_eq!(channel.try_recv(), Some(2));
        assert_eq!(channel.try_recv(), None);
    }

    #[test]
    fn test_overflow_drops_incoming() {
        let channel = Channel::bounded(2);
        assert_eq!(channel.push("a"), PushOutcome::Delivered);
        assert_eq!(channel.push("b"), PushOutcome::Delivered);
        assert_eq!(channel.push("c"), PushOutcome::Dropped);
        assert_eq!(channel.try_recv(), Some("a"));
        assert_eq!(channel.try_recv(), Some("b"));
        assert!(channel.is_empty());
    }

    #[test]
    fn test_push_after_close() {
        let channel = Channel::bounded(2);
        channel.push(1);
        channel.close();
        channel.close();
        assert!(channel.is_closed());
        assert_eq!(channel.push(2), PushOutcome::Closed);
        assert_eq!(channel.try_recv(), None);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let channel: Channel<u8> = Channel::bounded(0);
        assert_eq!(channel.capacity(), 1);
    }

    #[tokio::test]
    async fn test_recv_waits_for_push() {
        let channel = Channel::bounded(8);
        let producer = channel.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.push(7u32);
        });

        let item = timeout(Duration::from_secs(1), channel.recv())
            .await
            .expect("timeout");
        assert_eq!(item, Some(7));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_wakes_consumer() {
        let channel: Channel<u32> = Channel::bounded(8);
        let consumer = channel.clone();
        let handle = tokio::spawn(async move { consumer.recv().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.close();

        let result = timeout(Duration::from_secs(1), handle)
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_stream_ends_on_close() {
        let channel = Channel::bounded(8);
        channel.push(1u8);
        channel.push(2u8);
        let mut stream = channel.clone().into_stream();

        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, Some(2));
        channel.close();
        let end = timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timeout");
        assert_eq!(end, None);
    }

    #[tokio::test]
    async fn test_dropping_stream_closes_channel() {
        let channel: Channel<u8> = Channel::bounded(8);
        let stream = channel.clone().into_stream();
        assert!(!channel.is_closed());
        drop(stream);
        assert!(channel.is_closed());
        assert_eq!(channel.push(1), PushOutcome::Closed);
    }
}
