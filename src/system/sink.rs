//! Broadcast channel for a container's captured output.
//!
//! Each running container owns a stdout and a stderr [`SinkPool`]
//! (spec §4.1 "captured output is broadcast to attached clients"); the
//! runtime pushes bytes read from the container's pipes in, and any
//! number of `Attach`ed RPC sessions subscribe to read them back.

use parking_lot::RwLock;
use tokio::sync::broadcast;

/// A broadcast channel for one container's stdout or stderr.
///
/// Late subscribers only see output pushed after they subscribe — this
/// is a live stream, not a scrollback buffer.
pub struct SinkPool {
    sender: broadcast::Sender<Vec<u8>>,
    // Keep a receiver to prevent the channel from closing
    _receiver: broadcast::Receiver<Vec<u8>>,
}

impl SinkPool {
    /// Create a new sink pool with the specified capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new sink pool with custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender, _receiver }
    }

    /// Attach to the stream, receiving chunks pushed from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.sender.subscribe()
    }

    /// Push a chunk of captured output to all attached subscribers.
    ///
    /// If nobody is attached, the chunk is dropped.
    pub fn push(&self, data: Vec<u8>) {
        let _ = self.sender.send(data);
    }

    /// Push a chunk of captured output as text.
    pub fn push_string(&self, data: &str) {
        self.push(data.as_bytes().to_vec());
    }

    /// Number of RPC sessions currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SinkPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SinkPool {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            _receiver: self.sender.subscribe(),
        }
    }
}

/// Sink pools keyed by container name, for daemon-wide output attach by
/// name rather than by holding a direct handle.
#[allow(dead_code)]
pub struct SinkPoolMap {
    pools: RwLock<std::collections::HashMap<String, SinkPool>>,
}

#[allow(dead_code)]
impl SinkPoolMap {
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(std::collections::HashMap::new()),
        }
    }

    /// Get or create the sink pool for a container name.
    pub fn get_or_create(&self, name: &str) -> SinkPool {
        {
            let pools = self.pools.read();
            if let Some(pool) = pools.get(name) {
                return pool.clone();
            }
        }

        let mut pools = self.pools.write();
        pools
            .entry(name.to_string())
            .or_insert_with(SinkPool::new)
            .clone()
    }

    /// Drop a container's sink pool, e.g. on destroy.
    pub fn remove(&self, name: &str) {
        self.pools.write().remove(name);
    }
}

impl Default for SinkPoolMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_pool() {
        let pool = SinkPool::new();

        // Subscribe
        let mut rx = pool.subscribe();

        // Push data
        pool.push(b"Hello".to_vec());
        pool.push_string(" World");

        // Receive
        let msg1 = rx.recv().await.unwrap();
        assert_eq!(msg1, b"Hello");

        let msg2 = rx.recv().await.unwrap();
        assert_eq!(msg2, b" World");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let pool = SinkPool::new();

        let mut rx1 = pool.subscribe();
        let mut rx2 = pool.subscribe();

        pool.push_string("test");

        assert_eq!(rx1.recv().await.unwrap(), b"test");
        assert_eq!(rx2.recv().await.unwrap(), b"test");
    }
}
