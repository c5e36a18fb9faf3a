//! The Linux process-environment trait (spec §4.2 "Runtime resources").
//!
//! Abstracts the kernel-facing half of a container: namespaces, cgroups,
//! the init process, network materialization. [`container::tree`] and
//! [`container::power`] drive lifecycle transitions against this trait so
//! the state machine stays testable without real namespaces/cgroups.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::container::ExitStatus;
use crate::error::DaemonError;

/// Everything needed to launch a container's init process (spec §6,
/// properties `command`, `user`, `group`, `env`, `root`, `cwd`, `isolate`,
/// `hostname`, `net`, `bind`, `ulimit`, `allowed_devices`).
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: String,
    pub uid: u32,
    pub gid: u32,
    pub env: HashMap<String, String>,
    pub root: PathBuf,
    pub cwd: PathBuf,
    pub isolate: bool,
    pub hostname: String,
    pub stdin_path: PathBuf,
    pub memory_limit: u64,
    pub cpu_priority: i64,
}

/// A process this environment is tracking.
#[derive(Debug, Clone, Copy)]
pub struct Launched {
    pub pid: u32,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Materialize cgroups/namespaces and fork the init process (spec §4.2
    /// "Start").
    async fn spawn(&self, name: &str, spec: &LaunchSpec) -> Result<Launched, DaemonError>;

    /// Send a signal to the tracked init process.
    async fn signal(&self, pid: u32, signal: i32) -> Result<(), DaemonError>;

    /// Suspend/resume via the cgroup freezer (spec §4.2 "Pause"/"Resume").
    async fn freeze(&self, name: &str, frozen: bool) -> Result<(), DaemonError>;

    /// Block until the process exits, without reaping concurrently from
    /// elsewhere (the event loop owns SIGCHLD handling).
    async fn wait(&self, pid: u32) -> Result<ExitStatus, DaemonError>;

    /// Remove the container's cgroup and any materialized network state.
    async fn teardown(&self, name: &str) -> Result<(), DaemonError>;

    /// Live resource usage for `GetData("cpu_usage"/"memory_usage")`.
    async fn usage(&self, name: &str) -> Result<(u64, u64), DaemonError>;
}
