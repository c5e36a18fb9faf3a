//! ext4 project quota helpers for the Native and Overlay backends (spec
//! §10 "Native does the same after creating an ext4 project quota").
//!
//! No quotactl wrapper exists in this corpus, so — matching the
//! networking layer's choice to shell out rather than hand-roll a raw
//! ioctl binding — this drives the `chattr`/`setquota` userspace tools.

use std::path::Path;

use tokio::process::Command;

use crate::error::{DaemonError, ErrorCode};

async fn run(program: &str, args: &[&str]) -> Result<(), DaemonError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| DaemonError::new(ErrorCode::ResourceNotAvailable, format!("failed to exec {}: {}", program, e)))?;
    if !output.status.success() {
        return Err(DaemonError::new(
            ErrorCode::ResourceNotAvailable,
            format!("{} {:?} failed: {}", program, args, String::from_utf8_lossy(&output.stderr)),
        ));
    }
    Ok(())
}

/// Mark `path` project-quota-tracked and set its byte limit.
pub async fn set_project_quota(path: &Path, project_id: u32, bytes: u64) -> Result<(), DaemonError> {
    let id = project_id.to_string();
    run("chattr", &["-p", &id, "+P", &path.to_string_lossy()]).await?;
    let limit = format!("{}", bytes / 1024);
    run("setquota", &["-P", &id, &limit, &limit, "0", "0", &path.to_string_lossy()]).await
}
