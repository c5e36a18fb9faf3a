//! Process-wide event bus: container state changes, console output and
//! resource samples fan out to RPC subscribers (spec §4.5 "events").

use tokio::sync::broadcast;
use tracing::info;

use crate::container::State;

/// Network statistics for `GetData("net_bytes")`.
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Resource usage sample (spec §6 "cpu_usage", "memory_usage").
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub memory_bytes: u64,
    pub memory_limit_bytes: u64,
    pub cpu_usage_usec: u64,
    pub network: NetworkStats,
}

/// Events published across the daemon, consumed by RPC clients waiting on
/// `Wait` and by internal bookkeeping (respawn, weak-container cleanup).
#[derive(Debug, Clone)]
pub enum Event {
    StateChange { container: String, state: State },
    Exit { container: String, exit_code: Option<i32> },
    Stats { container: String, stats: Stats },
    ConsoleOutput { container: String, data: Vec<u8> },
    PropertyChanged { container: String, property: String },
}

/// Broadcast hub for [`Event`]s.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    _receiver: broadcast::Receiver<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender, _receiver }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn publish_state(&self, container: &str, state: State) -> usize {
        let receivers = self.publish(Event::StateChange { container: container.to_string(), state });
        info!(container, %state, "container state changed");
        receivers
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone(), _receiver: self.sender.subscribe() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_state_changes() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish_state("/a", State::Running);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::StateChange { state: State::Running, .. }));
    }

    #[test]
    fn subscriber_count_tracks_active_receivers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }
}
