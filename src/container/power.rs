//! Start/Stop/Pause/Resume/Kill dispatch: drives the [`State`] machine and
//! the kernel-facing [`ContainerRuntime`] together (spec §4.2).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::container::lifecycle::{transition, State, Trigger};
use crate::container::tree::ContainerTree;
use crate::container::{Container, ExitStatus};
use crate::error::{DaemonError, ErrorCode};
use crate::events::{Event, EventBus};
use crate::runtime::{ContainerRuntime, LaunchSpec};

#[derive(Debug, Error)]
pub enum PowerError {
    #[error("no such transition from {0} on {1:?}")]
    InvalidTransition(State, Trigger),
    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

/// Orchestrates lifecycle transitions for every container in a tree
/// against one kernel backend.
pub struct Supervisor {
    runtime: Arc<dyn ContainerRuntime>,
    events: Arc<EventBus>,
}

impl Supervisor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, events: Arc<EventBus>) -> Self {
        Self { runtime, events }
    }

    fn build_spec(&self, tree: &ContainerTree, name: &str) -> Result<LaunchSpec, PowerError> {
        let node = tree.get(name).ok_or_else(|| DaemonError::new(ErrorCode::ContainerDoesNotExist, name.to_string()))?;
        let get = |prop: &str| tree.get_property(name, prop);
        let env_raw = get("env")?;
        let mut env = HashMap::new();
        for pair in env_raw.split(';').filter(|s| !s.is_empty()) {
            if let Some((k, v)) = pair.split_once('=') {
                env.insert(k.to_string(), v.to_string());
            }
        }
        Ok(LaunchSpec {
            command: get("command")?,
            uid: node.access.owner_uid,
            gid: node.access.owner_gid,
            env,
            root: PathBuf::from(get("root")?),
            cwd: PathBuf::from(get("cwd")?),
            isolate: get("isolate")? == "true",
            hostname: get("hostname")?,
            stdin_path: PathBuf::from(get("stdin_path")?),
            memory_limit: get("memory_limit")?.parse().unwrap_or(0),
            cpu_priority: get("cpu_priority")?.parse().unwrap_or(50),
        })
    }

    /// Spec §4.2 "Start": Stopped|Dead -> Starting -> {Running, Meta}.
    pub async fn start(&self, tree: &ContainerTree, name: &str) -> Result<(), PowerError> {
        let node = tree.get(name).ok_or_else(|| DaemonError::new(ErrorCode::ContainerDoesNotExist, name.to_string()))?;
        if !node.flags.try_start_starting() {
            return Err(DaemonError::new(ErrorCode::InvalidState, "start already in progress").into());
        }
        let _guard = node.power_lock.acquire().await.map_err(|e| DaemonError::new(ErrorCode::Unknown, e.to_string()))?;
        let result = self.do_start(tree, name, node.clone()).await;
        node.flags.finish_starting();
        result
    }

    async fn do_start(&self, tree: &ContainerTree, name: &str, node: Arc<Container>) -> Result<(), PowerError> {
        let next = transition(node.state(), Trigger::Start).ok_or(PowerError::InvalidTransition(node.state(), Trigger::Start))?;
        node.set_state(next);

        let spec = self.build_spec(tree, name)?;
        if spec.command.is_empty() {
            // A command-less container is a pure grouping node (spec §3
            // "Meta container").
            let meta = transition(node.state(), Trigger::ChildExitNone).unwrap_or(State::Meta);
            node.set_state(meta);
            return Ok(());
        }

        match self.runtime.spawn(name, &spec).await {
            Ok(launched) => {
                node.runtime.write().pid = Some(launched.pid);
                let running = transition(node.state(), Trigger::ChildExitClean).unwrap_or(State::Running);
                node.set_state(running);
                self.events.publish_state(name, running);
                self.spawn_exit_watcher(name.to_string(), node, launched.pid);
                Ok(())
            }
            Err(e) => {
                node.set_state(transition(node.state(), Trigger::ChildExitError).unwrap_or(State::Dead));
                *node.exit_status.write() = ExitStatus::Error;
                Err(e.into())
            }
        }
    }

    /// Reaps the container's process in the background and drives the
    /// state machine to `Dead` (or `Starting` -> respawn, left to the event
    /// loop to decide) once it exits on its own, independent of an
    /// explicit Stop (spec §4.2 "a container may also transition to Dead
    /// because its process exited").
    fn spawn_exit_watcher(&self, name: String, node: Arc<Container>, pid: u32) {
        let runtime = self.runtime.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let status = match runtime.wait(pid).await {
                Ok(status) => status,
                Err(_) => return,
            };
            if node.pid() != Some(pid) {
                // Superseded by a Stop/restart that already reaped this pid.
                return;
            }
            *node.exit_status.write() = status;
            node.runtime.write().pid = None;
            let exit_code = match status {
                ExitStatus::Exited(code) => Some(code),
                _ => None,
            };
            let trigger = if matches!(status, ExitStatus::Exited(0)) {
                Trigger::ChildExitClean
            } else {
                Trigger::ChildExitError
            };
            let dead = transition(node.state(), trigger).unwrap_or(State::Dead);
            node.set_state(dead);
            events.publish_state(&name, dead);
            events.publish(Event::Exit { container: name, exit_code });
        });
    }

    /// Spec §4.2 "Stop": SIGTERM, wait `stop_timeout`, SIGKILL, then any
    /// state -> Stopped.
    pub async fn stop(&self, tree: &ContainerTree, name: &str, timeout: Duration) -> Result<(), PowerError> {
        let node = tree.get(name).ok_or_else(|| DaemonError::new(ErrorCode::ContainerDoesNotExist, name.to_string()))?;
        if !node.flags.try_start_stopping() {
            return Err(DaemonError::new(ErrorCode::InvalidState, "stop already in progress").into());
        }
        let _guard = node.power_lock.acquire().await.map_err(|e| DaemonError::new(ErrorCode::Unknown, e.to_string()))?;

        if let Some(pid) = node.pid() {
            self.runtime.signal(pid, libc::SIGTERM).await.ok();
            let reaped = tokio::time::timeout(timeout, self.runtime.wait(pid)).await;
            match reaped {
                Ok(Ok(status)) => *node.exit_status.write() = status,
                _ => {
                    self.runtime.signal(pid, libc::SIGKILL).await.ok();
                    let _ = self.runtime.wait(pid).await;
                    *node.exit_status.write() = ExitStatus::Signaled(libc::SIGKILL);
                }
            }
            self.runtime.teardown(name).await.ok();
            node.runtime.write().pid = None;
        }
        let stopped = transition(node.state(), Trigger::Stop).unwrap_or(State::Stopped);
        node.set_state(stopped);
        self.events.publish_state(name, stopped);
        node.flags.finish_stopping();
        Ok(())
    }

    /// Spec §4.2 "Pause": Running -> Paused via the cgroup freezer.
    pub async fn pause(&self, tree: &ContainerTree, name: &str) -> Result<(), PowerError> {
        let node = tree.get(name).ok_or_else(|| DaemonError::new(ErrorCode::ContainerDoesNotExist, name.to_string()))?;
        let next = transition(node.state(), Trigger::Pause).ok_or(PowerError::InvalidTransition(node.state(), Trigger::Pause))?;
        self.runtime.freeze(name, true).await?;
        node.set_state(next);
        self.events.publish_state(name, next);
        Ok(())
    }

    /// Spec §4.2 "Resume": Paused -> Running.
    pub async fn resume(&self, tree: &ContainerTree, name: &str) -> Result<(), PowerError> {
        let node = tree.get(name).ok_or_else(|| DaemonError::new(ErrorCode::ContainerDoesNotExist, name.to_string()))?;
        let next = transition(node.state(), Trigger::Resume).ok_or(PowerError::InvalidTransition(node.state(), Trigger::Resume))?;
        self.runtime.freeze(name, false).await?;
        node.set_state(next);
        self.events.publish_state(name, next);
        Ok(())
    }

    /// Spec §4.2 "Kill": send an arbitrary signal without changing state.
    pub async fn kill(&self, tree: &ContainerTree, name: &str, signal: i32) -> Result<(), PowerError> {
        let node = tree.get(name).ok_or_else(|| DaemonError::new(ErrorCode::ContainerDoesNotExist, name.to_string()))?;
        let pid = node.pid().ok_or_else(|| DaemonError::new(ErrorCode::InvalidState, "container has no running process"))?;
        transition(node.state(), Trigger::Kill).ok_or(PowerError::InvalidTransition(node.state(), Trigger::Kill))?;
        self.runtime.signal(pid, signal).await?;
        Ok(())
    }
}
