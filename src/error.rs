//! Wire-level error taxonomy.
//!
//! Every fallible operation in the daemon ultimately reports one of these
//! codes to the client. Module-specific error enums (`container::
//! ContainerError`, `volume::VolumeError`, ...) implement `.code()` to map
//! into this taxonomy rather than each inventing their own.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    Unknown = 1,
    InvalidValue = 2,
    InvalidProperty = 3,
    InvalidState = 4,
    NotSupported = 5,
    ResourceNotAvailable = 6,
    Permission = 7,
    ContainerAlreadyExists = 8,
    ContainerDoesNotExist = 9,
    /// Reserved: queue cleaner is not part of this build.
    QueueCleanerDisabled = 10,
    VolumeAlreadyExists = 11,
    VolumeNotFound = 12,
    VolumeNotReady = 13,
    NoSpace = 14,
    /// Internal only — a request accepted but deferred; never surfaced on
    /// the wire as a terminal response.
    Queued = 15,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::Success => "Success",
            ErrorCode::Unknown => "Unknown",
            ErrorCode::InvalidValue => "InvalidValue",
            ErrorCode::InvalidProperty => "InvalidProperty",
            ErrorCode::InvalidState => "InvalidState",
            ErrorCode::NotSupported => "NotSupported",
            ErrorCode::ResourceNotAvailable => "ResourceNotAvailable",
            ErrorCode::Permission => "Permission",
            ErrorCode::ContainerAlreadyExists => "ContainerAlreadyExists",
            ErrorCode::ContainerDoesNotExist => "ContainerDoesNotExist",
            ErrorCode::QueueCleanerDisabled => "QueueCleanerDisabled",
            ErrorCode::VolumeAlreadyExists => "VolumeAlreadyExists",
            ErrorCode::VolumeNotFound => "VolumeNotFound",
            ErrorCode::VolumeNotReady => "VolumeNotReady",
            ErrorCode::NoSpace => "NoSpace",
            ErrorCode::Queued => "Queued",
        };
        f.write_str(s)
    }
}

/// A daemon-wide error carrying a stable wire code, optional preserved
/// errno, and a human-readable message.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct DaemonError {
    pub code: ErrorCode,
    pub message: String,
    pub errno: Option<i32>,
}

impl DaemonError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), errno: None }
    }

    pub fn with_errno(code: ErrorCode, message: impl Into<String>, errno: i32) -> Self {
        Self { code, message: message.into(), errno: Some(errno) }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl From<std::io::Error> for DaemonError {
    fn from(e: std::io::Error) -> Self {
        let errno = e.raw_os_error();
        let code = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::ContainerDoesNotExist,
            std::io::ErrorKind::PermissionDenied => ErrorCode::Permission,
            _ => ErrorCode::Unknown,
        };
        match errno {
            Some(no) => DaemonError::with_errno(code, e.to_string(), no),
            None => DaemonError::new(code, e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(ErrorCode::ContainerDoesNotExist.to_string(), "ContainerDoesNotExist");
    }

    #[test]
    fn io_not_found_maps_to_container_does_not_exist() {
        let io = std::io::Error::from(std::io::ErrorKind::NotFound);
        let err = DaemonError::from(io);
        assert_eq!(err.code(), ErrorCode::ContainerDoesNotExist);
    }
}
