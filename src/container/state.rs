//! Ancillary busy-flags layered on top of the `State` enum.
//!
//! These are compare-and-swap admission gates for the handful of
//! operations the single-threaded dispatcher still needs to guard against
//! re-entrancy (a second `Start` arriving while the first is mid-flight,
//! before the `power_lock` is even acquired).

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct AncillaryFlags {
    starting: AtomicBool,
    stopping: AtomicBool,
    destroying: AtomicBool,
}

impl AncillaryFlags {
    pub fn new() -> Self {
        Self {
            starting: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            destroying: AtomicBool::new(false),
        }
    }

    /// Atomically claim the "starting" admission gate. Returns `false` if
    /// already claimed.
    pub fn try_start_starting(&self) -> bool {
        self.starting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn finish_starting(&self) {
        self.starting.store(false, Ordering::SeqCst);
    }

    pub fn try_start_stopping(&self) -> bool {
        self.stopping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn finish_stopping(&self) {
        self.stopping.store(false, Ordering::SeqCst);
    }

    pub fn mark_destroying(&self) -> bool {
        self.destroying
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_destroying(&self) -> bool {
        self.destroying.load(Ordering::SeqCst)
    }
}

impl Default for AncillaryFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for AncillaryFlags {
    fn clone(&self) -> Self {
        Self {
            starting: AtomicBool::new(self.starting.load(Ordering::SeqCst)),
            stopping: AtomicBool::new(self.stopping.load(Ordering::SeqCst)),
            destroying: AtomicBool::new(self.destroying.load(Ordering::SeqCst)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_gate_is_exclusive_until_finished() {
        let flags = AncillaryFlags::new();
        assert!(flags.try_start_starting());
        assert!(!flags.try_start_starting());
        flags.finish_starting();
        assert!(flags.try_start_starting());
    }

    #[test]
    fn destroying_is_claimed_once() {
        let flags = AncillaryFlags::new();
        assert!(flags.mark_destroying());
        assert!(!flags.mark_destroying());
        assert!(flags.is_destroying());
    }
}
