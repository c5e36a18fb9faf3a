//! The Linux `ContainerRuntime`: forks the init process into its cgroup and
//! namespaces and tracks it (spec §4.2 "Start"/"Stop"/"Pause"/"Resume").

use std::collections::HashMap;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::{sethostname, Pid};

use super::{cgroup, namespace};
use crate::container::ExitStatus;
use crate::error::{DaemonError, ErrorCode};
use crate::runtime::traits::{ContainerRuntime, LaunchSpec, Launched};

pub struct LinuxRuntime {
    cgroup_root: PathBuf,
}

impl LinuxRuntime {
    pub fn new(cgroup_root: PathBuf) -> Self {
        Self { cgroup_root }
    }

    fn leaf(&self, name: &str) -> PathBuf {
        cgroup::leaf_path(&self.cgroup_root, name)
    }
}

#[async_trait]
impl ContainerRuntime for LinuxRuntime {
    async fn spawn(&self, name: &str, spec: &LaunchSpec) -> Result<Launched, DaemonError> {
        let leaf = self.leaf(name);
        cgroup::create(&leaf)?;
        cgroup::set_memory_max(&leaf, spec.memory_limit)?;
        cgroup::set_cpu_weight(&leaf, spec.cpu_priority)?;

        let uid = spec.uid;
        let gid = spec.gid;
        let root = spec.root.clone();
        let cwd = spec.cwd.clone();
        let hostname = spec.hostname.clone();
        let isolate = spec.isolate;
        let env: HashMap<String, String> = spec.env.clone();
        let command = spec.command.clone();

        let mut cmd = std::process::Command::new("/bin/sh");
        cmd.arg("-c").arg(&command);
        cmd.env_clear();
        cmd.envs(env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        unsafe {
            cmd.pre_exec(move || {
                let flags = namespace::clone_flags(isolate);
                if !flags.is_empty() {
                    nix::sched::unshare(flags).map_err(std::io::Error::from)?;
                }
                if isolate {
                    let _ = sethostname(&hostname);
                    if root != PathBuf::from("/") {
                        nix::unistd::chroot(&root).map_err(std::io::Error::from)?;
                    }
                }
                std::env::set_current_dir(&cwd)?;
                nix::unistd::setgid(nix::unistd::Gid::from_raw(gid)).map_err(std::io::Error::from)?;
                nix::unistd::setuid(nix::unistd::Uid::from_raw(uid)).map_err(std::io::Error::from)?;
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(|e| DaemonError::new(ErrorCode::Unknown, format!("spawn failed: {}", e)))?;
        let pid = child.id();
        cgroup::add_pid(&leaf, pid)?;
        // The child handle is intentionally leaked here: reaping happens
        // through `wait`, driven by the event loop's SIGCHLD watch, not by
        // holding on to `std::process::Child`.
        std::mem::forget(child);
        Ok(Launched { pid })
    }

    async fn signal(&self, pid: u32, signal_no: i32) -> Result<(), DaemonError> {
        let sig = Signal::try_from(signal_no).map_err(|_| DaemonError::new(ErrorCode::InvalidValue, format!("bad signal: {}", signal_no)))?;
        signal::kill(Pid::from_raw(pid as i32), sig).map_err(|e| DaemonError::with_errno(ErrorCode::Unknown, e.to_string(), e as i32))
    }

    async fn freeze(&self, name: &str, frozen: bool) -> Result<(), DaemonError> {
        cgroup::freeze(&self.leaf(name), frozen)
    }

    async fn wait(&self, pid: u32) -> Result<ExitStatus, DaemonError> {
        use nix::sys::wait::{waitpid, WaitStatus};
        tokio::task::spawn_blocking(move || match waitpid(Pid::from_raw(pid as i32), None) {
            Ok(WaitStatus::Exited(_, code)) => ExitStatus::Exited(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => ExitStatus::Signaled(sig as i32),
            _ => ExitStatus::Error,
        })
        .await
        .map_err(|e| DaemonError::new(ErrorCode::Unknown, format!("wait task failed: {}", e)))
    }

    async fn teardown(&self, name: &str) -> Result<(), DaemonError> {
        super::network::teardown(name).await.ok();
        cgroup::remove(&self.leaf(name))
    }

    async fn usage(&self, name: &str) -> Result<(u64, u64), DaemonError> {
        let leaf = self.leaf(name);
        let memory = cgroup::read_memory_current(&leaf).unwrap_or(0);
        let cpu = cgroup::read_cpu_usage_usec(&leaf).unwrap_or(0);
        Ok((cpu, memory))
    }
}
