//! Volume engine: four storage backends behind one lifecycle (spec §4.3).

pub mod backends;
mod holder;
mod quota;
mod volume;

pub use holder::VolumeHolder;
pub use quota::set_project_quota;
pub use volume::{Backend, Volume, VolumeError, VolumeState};
