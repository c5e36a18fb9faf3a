//! The Container lifecycle node (spec §3 "Container").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::access::AccessLevel;
use crate::container::lifecycle::State;
use crate::container::respawn::RespawnHandler;
use crate::container::state::AncillaryFlags;
use crate::property::ValueStore;
use crate::system::{AtomicCounter, AtomicFlag, Locker, SinkPool};

/// Exit status recorded for `GetData("exit_status")` (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    None,
    Exited(i32),
    Signaled(i32),
    /// Start failed before a child process ever ran.
    Error,
}

/// Kernel-side resources a running container owns (spec §3 "Runtime
/// resources").
#[derive(Debug, Default)]
pub struct RuntimeResources {
    /// cgroup subsystem identifier -> leaf cgroup path.
    pub cgroups: HashMap<String, PathBuf>,
    pub pid: Option<u32>,
    pub network_materialized: bool,
}

/// The owning credential and access bookkeeping for a container (spec §3
/// "Access").
#[derive(Debug)]
pub struct Access {
    pub owner_uid: u32,
    pub owner_gid: u32,
    pub level: RwLock<AccessLevel>,
    pub client_refs: AtomicCounter,
    pub weak: AtomicFlag,
}

/// A node in the container hierarchy.
pub struct Container {
    pub name: String,
    pub id: u64,
    pub parent_name: Option<String>,

    pub values: RwLock<ValueStore>,
    state: RwLock<State>,
    pub runtime: RwLock<RuntimeResources>,
    pub access: Access,
    pub exit_status: RwLock<ExitStatus>,

    /// Mutual exclusion for Start/Stop/Pause/Resume/Destroy on this
    /// container (spec §5 "per-container locking").
    pub power_lock: Locker,
    pub flags: AncillaryFlags,
    pub respawn: RespawnHandler,

    pub stdout: SinkPool,
    pub stderr: SinkPool,

    pub cancel: CancellationToken,
}

impl Container {
    pub fn new(name: impl Into<String>, id: u64, parent_name: Option<String>, owner_uid: u32, owner_gid: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            id,
            parent_name,
            values: RwLock::new(ValueStore::new()),
            state: RwLock::new(State::Stopped),
            runtime: RwLock::new(RuntimeResources::default()),
            access: Access {
                owner_uid,
                owner_gid,
                level: RwLock::new(AccessLevel::Normal),
                client_refs: AtomicCounter::new(0),
                weak: AtomicFlag::new(false),
            },
            exit_status: RwLock::new(ExitStatus::None),
            power_lock: Locker::new(),
            flags: AncillaryFlags::new(),
            respawn: RespawnHandler::new(),
            stdout: SinkPool::with_capacity(64),
            stderr: SinkPool::with_capacity(64),
            cancel: CancellationToken::new(),
        })
    }

    pub fn root() -> Arc<Self> {
        Self::new("/", 0, None, 0, 0)
    }

    pub fn is_root(&self) -> bool {
        self.name == "/"
    }

    pub fn state(&self) -> State {
        *self.state.read()
    }

    pub fn set_state(&self, state: State) {
        *self.state.write() = state;
    }

    pub fn pid(&self) -> Option<u32> {
        self.runtime.read().pid
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_parent_and_is_stopped() {
        let root = Container::root();
        assert!(root.is_root());
        assert_eq!(root.parent_name, None);
        assert_eq!(root.state(), State::Stopped);
    }
}
