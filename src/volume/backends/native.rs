//! Same as Plain, plus an ext4 project quota on `storage` (spec §10).

use std::fs;

use async_trait::async_trait;
use nix::mount::{mount, umount2, MntFlags, MsFlags};

use super::{apply_ownership, statvfs_stat, VolumeBackend, VolumeStat};
use crate::error::DaemonError;
use crate::volume::{set_project_quota, Volume};

pub struct NativeBackend;

#[async_trait]
impl VolumeBackend for NativeBackend {
    async fn build(&self, volume: &Volume) -> Result<(), DaemonError> {
        fs::create_dir_all(&volume.storage)?;
        fs::create_dir_all(&volume.path)?;
        let project_id = volume_project_id(volume);
        set_project_quota(&volume.storage, project_id, volume.space_limit).await?;
        apply_ownership(&volume.storage, volume)?;
        mount(Some(&volume.storage), &volume.path, None::<&str>, MsFlags::MS_BIND, None::<&str>)
            .map_err(|e| DaemonError::with_errno(crate::error::ErrorCode::ResourceNotAvailable, e.to_string(), e as i32))
    }

    async fn destroy(&self, volume: &Volume) -> Result<(), DaemonError> {
        umount2(&volume.path, MntFlags::MNT_DETACH).ok();
        Ok(())
    }

    async fn resize(&self, volume: &Volume, new_limit: u64) -> Result<(), DaemonError> {
        set_project_quota(&volume.storage, volume_project_id(volume), new_limit).await
    }

    async fn stat(&self, volume: &Volume) -> Result<VolumeStat, DaemonError> {
        statvfs_stat(&volume.path)
    }
}

/// ext4 project ids are small positive integers; the volume's own 16-bit
/// id is already process-wide unique, so it's used directly (offset by 1
/// since project id 0 means "untracked").
fn volume_project_id(volume: &Volume) -> u32 {
    volume.id as u32 + 1
}
