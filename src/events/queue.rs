//! Deadline queue driving the single-threaded event loop's timed work:
//! delayed respawns, `Wait` timeouts, weak-container cleanup (spec §4.5
//! "Event Loop").

use std::time::Duration;

use tokio_util::time::{delay_queue::Key, DelayQueue};

/// What a deadline firing means to the dispatcher.
#[derive(Debug, Clone)]
pub enum Deadline {
    Respawn { container: String },
    WaitTimeout { client_id: u64 },
    WeakContainerCleanup { container: String },
}

/// Wraps [`DelayQueue`] with typed payloads instead of raw keys.
pub struct DeadlineQueue {
    queue: DelayQueue<Deadline>,
}

impl DeadlineQueue {
    pub fn new() -> Self {
        Self { queue: DelayQueue::new() }
    }

    pub fn schedule(&mut self, deadline: Deadline, after: Duration) -> Key {
        self.queue.insert(deadline, after)
    }

    pub fn cancel(&mut self, key: Key) {
        self.queue.try_remove(&key);
    }

    /// Await the next deadline. Resolves to `None` once the queue is
    /// permanently empty and no further `schedule` calls are expected to
    /// race with this await — callers in the event loop hold the only
    /// handle so this is safe to poll in a `select!`.
    pub async fn next(&mut self) -> Option<Deadline> {
        use futures_util::StreamExt;
        self.queue.next().await.map(|expired| expired.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for DeadlineQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_after_delay() {
        let mut queue = DeadlineQueue::new();
        queue.schedule(Deadline::Respawn { container: "/a".to_string() }, Duration::from_millis(10));
        let fired = queue.next().await;
        assert!(matches!(fired, Some(Deadline::Respawn { .. })));
    }

    #[tokio::test]
    async fn cancel_prevents_firing() {
        let mut queue = DeadlineQueue::new();
        let key = queue.schedule(Deadline::Respawn { container: "/a".to_string() }, Duration::from_millis(50));
        queue.cancel(key);
        assert!(queue.is_empty());
    }
}
