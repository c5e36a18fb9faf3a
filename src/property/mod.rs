//! Property Registry and per-container Value Store (spec §4.1).

mod catalog;
mod registry;
mod value;

pub use registry::{Descriptor, Flags, Registry, REGISTRY};
pub use value::{invalid_value, Kind, Slot, Value, ValueStore};
