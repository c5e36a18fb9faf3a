//! `lowerdir=<layers joined by ':'>` plus `upperdir`/`workdir` under
//! `storage`, with a project quota on that storage (spec §10).

use std::fs;

use async_trait::async_trait;
use nix::mount::{mount, umount2, MntFlags, MsFlags};

use super::{apply_ownership, statvfs_stat, VolumeBackend, VolumeStat};
use crate::error::{DaemonError, ErrorCode};
use crate::volume::{set_project_quota, Volume};

pub struct OverlayBackend;

impl OverlayBackend {
    fn upper(volume: &Volume) -> std::path::PathBuf {
        volume.storage.join("upper")
    }

    fn work(volume: &Volume) -> std::path::PathBuf {
        volume.storage.join("work")
    }
}

#[async_trait]
impl VolumeBackend for OverlayBackend {
    async fn build(&self, volume: &Volume) -> Result<(), DaemonError> {
        if volume.layers.is_empty() {
            return Err(DaemonError::new(ErrorCode::InvalidValue, "overlay volume requires at least one layer"));
        }
        fs::create_dir_all(Self::upper(volume))?;
        fs::create_dir_all(Self::work(volume))?;
        fs::create_dir_all(&volume.path)?;
        set_project_quota(&volume.storage, overlay_project_id(volume), volume.space_limit).await?;
        apply_ownership(&Self::upper(volume), volume)?;

        let lower = volume.layers.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>().join(":");
        let options = format!("lowerdir={},upperdir={},workdir={}", lower, Self::upper(volume).display(), Self::work(volume).display());
        mount(Some("overlay"), &volume.path, Some("overlay"), MsFlags::empty(), Some(options.as_str()))
            .map_err(|e| DaemonError::with_errno(ErrorCode::ResourceNotAvailable, e.to_string(), e as i32))
    }

    async fn destroy(&self, volume: &Volume) -> Result<(), DaemonError> {
        umount2(&volume.path, MntFlags::MNT_DETACH).ok();
        Ok(())
    }

    async fn resize(&self, volume: &Volume, new_limit: u64) -> Result<(), DaemonError> {
        set_project_quota(&volume.storage, overlay_project_id(volume), new_limit).await
    }

    async fn stat(&self, volume: &Volume) -> Result<VolumeStat, DaemonError> {
        statvfs_stat(&volume.path)
    }
}

/// See `native::volume_project_id` — the volume id is process-wide unique
/// across all backends, so native and overlay volumes never collide.
fn overlay_project_id(volume: &Volume) -> u32 {
    volume.id as u32 + 1
}
