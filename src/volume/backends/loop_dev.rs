//! ext4 filesystem inside `storage/loop.img`, attached via a loop device
//! (spec §10 "Loop requires space_limit, allocates storage/loop.img only
//! if absent, attaches a loop device, and does not support Resize").

use std::fs::OpenOptions;
use std::path::PathBuf;

use async_trait::async_trait;
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use tokio::process::Command;

use super::{apply_ownership, statvfs_stat, VolumeBackend, VolumeStat};
use crate::error::{DaemonError, ErrorCode};
use crate::volume::Volume;

pub struct LoopBackend;

impl LoopBackend {
    fn image_path(volume: &Volume) -> PathBuf {
        volume.storage.join("loop.img")
    }
}

async fn run(program: &str, args: &[&str]) -> Result<std::process::Output, DaemonError> {
    Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| DaemonError::new(ErrorCode::ResourceNotAvailable, format!("failed to exec {}: {}", program, e)))
}

#[async_trait]
impl VolumeBackend for LoopBackend {
    async fn build(&self, volume: &Volume) -> Result<(), DaemonError> {
        if volume.space_limit == 0 {
            return Err(DaemonError::new(ErrorCode::InvalidValue, "loop volume requires space_limit"));
        }
        std::fs::create_dir_all(&volume.storage)?;
        std::fs::create_dir_all(&volume.path)?;

        let image = Self::image_path(volume);
        if !image.exists() {
            let file = OpenOptions::new().create(true).write(true).open(&image)?;
            file.set_len(volume.space_limit)?;
            let mkfs = run("mkfs.ext4", &["-q", &image.to_string_lossy()]).await?;
            if !mkfs.status.success() {
                return Err(DaemonError::new(ErrorCode::ResourceNotAvailable, "mkfs.ext4 failed"));
            }
        }

        let attach = run("losetup", &["-f", "--show", &image.to_string_lossy()]).await?;
        if !attach.status.success() {
            return Err(DaemonError::new(ErrorCode::ResourceNotAvailable, "losetup failed"));
        }
        let device = String::from_utf8_lossy(&attach.stdout).trim().to_string();

        mount(Some(device.as_str()), &volume.path, Some("ext4"), MsFlags::empty(), None::<&str>)
            .map_err(|e| DaemonError::with_errno(ErrorCode::ResourceNotAvailable, e.to_string(), e as i32))?;
        apply_ownership(&volume.path, volume)
    }

    async fn destroy(&self, volume: &Volume) -> Result<(), DaemonError> {
        umount2(&volume.path, MntFlags::MNT_DETACH).ok();
        if let Some(device) = &volume.loop_device {
            run("losetup", &["-d", &device.to_string_lossy()]).await.ok();
        }
        Ok(())
    }

    async fn resize(&self, _volume: &Volume, _new_limit: u64) -> Result<(), DaemonError> {
        Err(DaemonError::new(ErrorCode::NotSupported, "loop volumes do not support resize"))
    }

    async fn stat(&self, volume: &Volume) -> Result<VolumeStat, DaemonError> {
        statvfs_stat(&volume.path)
    }
}
