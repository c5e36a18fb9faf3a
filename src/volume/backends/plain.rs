//! Bind-mounts `storage` directly onto `path` (spec §10 "Plain bind-mounts
//! storage directly").

use std::fs;

use async_trait::async_trait;
use nix::mount::{mount, umount2, MntFlags, MsFlags};

use super::{apply_ownership, statvfs_stat, VolumeBackend, VolumeStat};
use crate::error::DaemonError;
use crate::volume::Volume;

pub struct PlainBackend;

#[async_trait]
impl VolumeBackend for PlainBackend {
    async fn build(&self, volume: &Volume) -> Result<(), DaemonError> {
        fs::create_dir_all(&volume.storage)?;
        apply_ownership(&volume.storage, volume)?;
        fs::create_dir_all(&volume.path)?;
        mount(Some(&volume.storage), &volume.path, None::<&str>, MsFlags::MS_BIND, None::<&str>)
            .map_err(|e| DaemonError::with_errno(crate::error::ErrorCode::ResourceNotAvailable, e.to_string(), e as i32))
    }

    async fn destroy(&self, volume: &Volume) -> Result<(), DaemonError> {
        umount2(&volume.path, MntFlags::MNT_DETACH).ok();
        Ok(())
    }

    async fn resize(&self, _volume: &Volume, _new_limit: u64) -> Result<(), DaemonError> {
        // Plain has no quota; `space_limit` is advisory only.
        Ok(())
    }

    async fn stat(&self, volume: &Volume) -> Result<VolumeStat, DaemonError> {
        statvfs_stat(&volume.path)
    }
}
