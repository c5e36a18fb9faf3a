//! Respawn bookkeeping (spec §4.2 "if respawn is true and max_respawns has
//! not been exceeded, schedule a delayed restart").
//!
//! A crash-counting gate on auto-restart: respawn exactly `max_respawns`
//! times, then stay Dead.

use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub struct RespawnHandler {
    count: AtomicU32,
}

impl RespawnHandler {
    pub fn new() -> Self {
        Self { count: AtomicU32::new(0) }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }

    /// Called when a container with `respawn=true` exits. Returns `true`
    /// if a delayed restart should be scheduled (and bumps the counter).
    pub fn should_respawn(&self, max_respawns: u32) -> bool {
        let current = self.count.load(Ordering::SeqCst);
        if current >= max_respawns {
            return false;
        }
        self.count.fetch_add(1, Ordering::SeqCst);
        true
    }
}

impl Default for RespawnHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RespawnHandler {
    fn clone(&self) -> Self {
        Self { count: AtomicU32::new(self.count.load(Ordering::SeqCst)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respawns_exactly_max_times_then_stops() {
        let handler = RespawnHandler::new();
        for _ in 0..3 {
            assert!(handler.should_respawn(3));
        }
        assert!(!handler.should_respawn(3));
        assert_eq!(handler.count(), 3);
    }

    #[test]
    fn reset_clears_counter() {
        let handler = RespawnHandler::new();
        handler.should_respawn(3);
        handler.reset();
        assert_eq!(handler.count(), 0);
    }
}
