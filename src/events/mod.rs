//! Event bus and deadline queue (spec §4.5 "Event Loop").

mod bus;
mod queue;

pub use bus::{Event, EventBus, NetworkStats, Stats};
pub use queue::{Deadline, DeadlineQueue};
