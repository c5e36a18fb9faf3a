//! Container model and lifecycle engine (spec §4.2).
//!
//! A [`Container`] is a node in a process-wide [`ContainerTree`]. Property
//! reads/writes run through the registry in [`crate::property`]; power
//! transitions run through [`power`].

mod container;
mod lifecycle;
mod power;
mod respawn;
mod state;
mod tree;

pub use container::{Access, Container, ExitStatus, RuntimeResources};
pub use lifecycle::{transition, State, Trigger};
pub use power::{PowerError, Supervisor};
pub use respawn::RespawnHandler;
pub use state::AncillaryFlags;
pub use tree::ContainerTree;
