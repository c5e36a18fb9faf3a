//! One module per volume backend, dispatched from [`super::holder`] on
//! [`super::Backend`] (spec §4.3).

mod loop_dev;
mod native;
mod overlay;
mod plain;

use async_trait::async_trait;

pub use loop_dev::LoopBackend;
pub use native::NativeBackend;
pub use overlay::OverlayBackend;
pub use plain::PlainBackend;

use crate::error::DaemonError;
use crate::volume::Volume;

/// Disk usage for `GetData` on a volume (spec §10 "all four share GetStat
/// via statvfs").
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeStat {
    pub used_bytes: u64,
    pub available_bytes: u64,
}

#[async_trait]
pub trait VolumeBackend: Send + Sync {
    async fn build(&self, volume: &Volume) -> Result<(), DaemonError>;
    async fn destroy(&self, volume: &Volume) -> Result<(), DaemonError>;
    async fn resize(&self, volume: &Volume, new_limit: u64) -> Result<(), DaemonError>;
    async fn stat(&self, volume: &Volume) -> Result<VolumeStat, DaemonError>;
}

/// Shared `statvfs`-based usage query (spec §10: all four backends share
/// `GetStat`).
pub fn statvfs_stat(path: &std::path::Path) -> Result<VolumeStat, DaemonError> {
    use nix::sys::statvfs::statvfs;
    let vfs = statvfs(path).map_err(|e| DaemonError::with_errno(crate::error::ErrorCode::Unknown, e.to_string(), e as i32))?;
    let block_size = vfs.fragment_size().max(vfs.block_size());
    let total = vfs.blocks() * block_size;
    let free = vfs.blocks_available() * block_size;
    Ok(VolumeStat { used_bytes: total.saturating_sub(free), available_bytes: free })
}

/// Applies the volume's owner credential and permission mask to its
/// mounted path (spec §4.3 "sets owner and mode on the storage
/// directory"), shared by the Plain and Loop backends.
pub fn apply_ownership(path: &std::path::Path, volume: &Volume) -> Result<(), DaemonError> {
    use nix::unistd::{chown, Gid, Uid};
    chown(path, Some(Uid::from_raw(volume.owner_uid)), Some(Gid::from_raw(volume.owner_gid)))
        .map_err(|e| DaemonError::with_errno(crate::error::ErrorCode::Unknown, e.to_string(), e as i32))?;
    let permissions = std::fs::Permissions::from_mode(volume.permissions);
    std::fs::set_permissions(path, permissions).map_err(DaemonError::from)
}

use std::os::unix::fs::PermissionsExt;
