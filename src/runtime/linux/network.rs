//! Network materialization for the `net` property (spec §6 "Net grammar").
//!
//! `host` leaves the container in the host's network namespace; `macvlan`
//! creates a macvlan sub-interface of the named master and moves it into
//! the container's netns. Shells out to `ip` the way porto's own netlink
//! layer is approximated here: no netlink crate is in the example corpus
//! for this spec, so the daemon drives the same userspace tool operators
//! already have installed.

use tokio::process::Command;

use crate::error::{DaemonError, ErrorCode};

async fn run_ip(args: &[&str]) -> Result<(), DaemonError> {
    let output = Command::new("ip")
        .args(args)
        .output()
        .await
        .map_err(|e| DaemonError::new(ErrorCode::ResourceNotAvailable, format!("failed to exec ip: {}", e)))?;
    if !output.status.success() {
        return Err(DaemonError::new(
            ErrorCode::ResourceNotAvailable,
            format!("ip {:?} failed: {}", args, String::from_utf8_lossy(&output.stderr)),
        ));
    }
    Ok(())
}

/// Create a macvlan interface named after the container, attached to
/// `master`, and move it into the namespace of `pid`.
pub async fn attach_macvlan(container_name: &str, master: &str, mode: &str, pid: u32) -> Result<(), DaemonError> {
    let link = format!("veth-{}", &container_name.trim_start_matches('/').replace('/', "-"));
    run_ip(&["link", "add", &link, "link", master, "type", "macvlan", "mode", mode]).await?;
    run_ip(&["link", "set", &link, "netns", &pid.to_string()]).await?;
    Ok(())
}

pub async fn teardown(container_name: &str) -> Result<(), DaemonError> {
    let link = format!("veth-{}", &container_name.trim_start_matches('/').replace('/', "-"));
    // Best-effort: the interface may already be gone with its netns.
    let _ = run_ip(&["link", "delete", &link]).await;
    Ok(())
}
