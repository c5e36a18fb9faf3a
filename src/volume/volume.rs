//! A volume: a directory backed by one of four storage strategies, bound
//! into zero or more containers (spec §3 "Volume", §4.3).

use std::collections::HashSet;
use std::path::PathBuf;

use thiserror::Error;

use crate::error::{DaemonError, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Bind-mounts `storage` directly (spec §10 "Plain bind-mounts storage
    /// directly").
    Plain,
    /// Same as Plain, plus an ext4 project quota on `storage`.
    Native,
    /// `lowerdir`/`upperdir`/`workdir` overlayfs mount, quota on the
    /// upper/work storage.
    Overlay,
    /// ext4 filesystem inside `storage/loop.img`, attached via a loop
    /// device (spec §10 "Loop requires space_limit").
    Loop,
}

impl Backend {
    pub fn parse(raw: &str) -> Result<Self, DaemonError> {
        match raw {
            "plain" => Ok(Backend::Plain),
            "native" => Ok(Backend::Native),
            "overlay" => Ok(Backend::Overlay),
            "loop" => Ok(Backend::Loop),
            other => Err(DaemonError::new(ErrorCode::InvalidValue, format!("unknown volume backend: {}", other))),
        }
    }

    /// Resize is only meaningful for backends whose quota/filesystem size
    /// can change in place (spec §10: "Loop ... does not support Resize").
    pub fn supports_resize(self) -> bool {
        !matches!(self, Backend::Loop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeState {
    Building,
    Ready,
    Destroying,
}

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("volume already exists: {0}")]
    AlreadyExists(String),
    #[error("volume not found: {0}")]
    NotFound(String),
    #[error("volume not ready")]
    NotReady,
    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

impl VolumeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            VolumeError::AlreadyExists(_) => ErrorCode::VolumeAlreadyExists,
            VolumeError::NotFound(_) => ErrorCode::VolumeNotFound,
            VolumeError::NotReady => ErrorCode::VolumeNotReady,
            VolumeError::Daemon(e) => e.code(),
        }
    }
}

/// One volume (spec §3 "Volume"): `path` is the mounted directory
/// containers bind into; `storage` is where its actual bytes live.
#[derive(Debug, Clone)]
pub struct Volume {
    /// Allocated by `VolumeHolder` on create, returned to the id pool on
    /// destroy (spec §3 "a unique 16-bit id", §4.3).
    pub id: u16,
    pub path: PathBuf,
    pub storage: PathBuf,
    pub backend: Backend,
    pub space_limit: u64,
    pub inode_limit: u64,
    pub space_guarantee: u64,
    pub inode_guarantee: u64,
    pub layers: Vec<PathBuf>,
    /// The container that issued CreateVolume (spec §3 "owner uid+gid").
    pub creator: String,
    pub owner_uid: u32,
    pub owner_gid: u32,
    /// Octal permission mask applied to the storage directory (or the loop
    /// filesystem's mount point).
    pub permissions: u32,
    pub read_only: bool,
    /// Containers currently bound to this volume (spec §4.3
    /// "LinkContainer/UnlinkContainer maintain the set of owning
    /// containers"). Destroy is eligible once this set is empty.
    pub linked_containers: HashSet<String>,
    pub state: VolumeState,
    /// Loop backend only: the attached `/dev/loopN` device.
    pub loop_device: Option<PathBuf>,
}

impl Volume {
    pub fn new(id: u16, path: PathBuf, storage: PathBuf, backend: Backend, space_limit: u64, creator: String) -> Self {
        Self {
            id,
            path,
            storage,
            backend,
            space_limit,
            inode_limit: 0,
            space_guarantee: 0,
            inode_guarantee: 0,
            layers: Vec::new(),
            creator,
            owner_uid: 0,
            owner_gid: 0,
            permissions: 0o775,
            read_only: false,
            linked_containers: HashSet::new(),
            state: VolumeState::Building,
            loop_device: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_backend_does_not_support_resize() {
        assert!(!Backend::Loop.supports_resize());
        assert!(Backend::Native.supports_resize());
    }

    #[test]
    fn unknown_backend_name_is_rejected() {
        assert!(Backend::parse("zfs").is_err());
    }
}
