//! Routes a decoded [`DispatchRequest`] against the container tree, volume
//! holder and supervisor, enforcing the access matrix along the way (spec
//! §4.4 "access-level computation").

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::access::{self, AccessLevel};
use crate::container::{ContainerTree, State, Supervisor};
use crate::error::{DaemonError, ErrorCode};
use crate::events::{Event, EventBus};
use crate::proto::{build_response, DispatchRequest, Outcome, Response};
use crate::session::ClientSession;
use crate::store::Database;
use crate::volume::{Backend, Volume, VolumeHolder};

pub struct Dispatcher {
    pub tree: Arc<ContainerTree>,
    pub volumes: Arc<VolumeHolder>,
    pub supervisor: Arc<Supervisor>,
    pub store: Arc<Database>,
    pub events: Arc<EventBus>,
    pub privileged_groups: Vec<String>,
}

impl Dispatcher {
    fn resolve(&self, session: &ClientSession, raw: &str) -> Result<String, DaemonError> {
        access::resolve_name(raw, &session.namespace, &session.origin)
    }

    fn require_write(&self, session: &ClientSession) -> Result<(), DaemonError> {
        if !session.access_level.can_write() {
            return Err(DaemonError::new(ErrorCode::Permission, "write access required"));
        }
        Ok(())
    }

    fn require_read(&self, session: &ClientSession) -> Result<(), DaemonError> {
        if !session.access_level.can_read() {
            return Err(DaemonError::new(ErrorCode::Permission, "read access required"));
        }
        Ok(())
    }

    /// A write against a container owned by someone else also needs
    /// `can_modify_foreign` (spec §4.4 access matrix), not just a write
    /// access level.
    fn require_ownership(&self, session: &ClientSession, owner_uid: u32) -> Result<(), DaemonError> {
        let allowed = access::can_modify_foreign(
            session.credentials.uid,
            &[],
            owner_uid,
            &self.privileged_groups,
            session.access_level.is_superuser(),
        );
        if allowed {
            Ok(())
        } else {
            Err(DaemonError::new(ErrorCode::Permission, "not the owner of this container"))
        }
    }

    pub async fn handle(&self, session: &mut ClientSession, request: DispatchRequest) -> Response {
        match self.try_handle(session, request).await {
            Ok((code, message, outcome)) => build_response(code, &message, outcome),
            Err(e) => build_response(e.code(), &e.message, Outcome::None),
        }
    }

    async fn try_handle(&self, session: &mut ClientSession, request: DispatchRequest) -> Result<(ErrorCode, String, Outcome), DaemonError> {
        use DispatchRequest::*;
        match request {
            Create { parent, name } => {
                self.require_write(session)?;
                let parent = self.resolve(session, &parent)?;
                let name = self.resolve(session, &name)?;
                self.tree.create(&name, &parent, session.credentials.uid, session.credentials.gid)?;
                let nodes = self.store.nodes().await;
                nodes.append(&name, "owner_uid", session.credentials.uid.to_string().as_bytes()).ok();
                nodes.append(&name, "owner_gid", session.credentials.gid.to_string().as_bytes()).ok();
                nodes.append(&name, "parent", parent.as_bytes()).ok();
                session.mark_weak(name);
                Ok((ErrorCode::Success, String::new(), Outcome::None))
            }
            Destroy { name } => {
                self.require_write(session)?;
                let name = self.resolve(session, &name)?;
                if let Some(node) = self.tree.get(&name) {
                    self.require_ownership(session, node.access.owner_uid)?;
                }
                self.tree.destroy(&name)?;
                self.store.nodes().await.remove(&name).ok();
                Ok((ErrorCode::Success, String::new(), Outcome::None))
            }
            Start { name } => {
                self.require_write(session)?;
                let name = self.resolve(session, &name)?;
                self.supervisor.start(&self.tree, &name).await.map_err(to_daemon_error)?;
                Ok((ErrorCode::Success, String::new(), Outcome::None))
            }
            Stop { name, timeout_ms } => {
                self.require_write(session)?;
                let name = self.resolve(session, &name)?;
                self.supervisor.stop(&self.tree, &name, Duration::from_millis(timeout_ms as u64)).await.map_err(to_daemon_error)?;
                Ok((ErrorCode::Success, String::new(), Outcome::None))
            }
            Pause { name } => {
                self.require_write(session)?;
                let name = self.resolve(session, &name)?;
                self.supervisor.pause(&self.tree, &name).await.map_err(to_daemon_error)?;
                Ok((ErrorCode::Success, String::new(), Outcome::None))
            }
            Resume { name } => {
                self.require_write(session)?;
                let name = self.resolve(session, &name)?;
                self.supervisor.resume(&self.tree, &name).await.map_err(to_daemon_error)?;
                Ok((ErrorCode::Success, String::new(), Outcome::None))
            }
            Kill { name, signal } => {
                self.require_write(session)?;
                let name = self.resolve(session, &name)?;
                self.supervisor.kill(&self.tree, &name, signal).await.map_err(to_daemon_error)?;
                Ok((ErrorCode::Success, String::new(), Outcome::None))
            }
            GetProperty { name, property } => {
                self.require_read(session)?;
                let name = self.resolve(session, &name)?;
                let value = self.tree.get_property(&name, &property)?;
                Ok((ErrorCode::Success, String::new(), Outcome::Value(value)))
            }
            SetProperty { name, property, value } => {
                self.require_write(session)?;
                let name = self.resolve(session, &name)?;
                if let Some(node) = self.tree.get(&name) {
                    self.require_ownership(session, node.access.owner_uid)?;
                }
                self.tree.set_property(&name, &property, &value)?;
                self.store.nodes().await.append(&name, &property, value.as_bytes()).ok();
                Ok((ErrorCode::Success, String::new(), Outcome::None))
            }
            GetData { name, field } => {
                self.require_read(session)?;
                let name = self.resolve(session, &name)?;
                let value = self.tree.get_data(&name, &field)?;
                Ok((ErrorCode::Success, String::new(), Outcome::Value(value)))
            }
            List { mask } => {
                self.require_read(session)?;
                let names = self.tree.list().into_iter().filter(|n| mask.is_empty() || n.starts_with(&mask)).collect();
                Ok((ErrorCode::Success, String::new(), Outcome::Names(names)))
            }
            Wait { names, timeout_ms } => {
                self.require_read(session)?;
                self.wait(names, timeout_ms).await
            }
            CreateVolume { path, backend, space_limit, layers, owner_uid, owner_gid, permissions, read_only, inode_limit, space_guarantee, inode_guarantee } => {
                self.require_write(session)?;
                let backend = Backend::parse(&backend)?;
                let mut volume = Volume::new(0, PathBuf::from(&path), PathBuf::from(format!("{}.storage", path)), backend, space_limit, session.origin.clone());
                volume.layers = layers.into_iter().map(PathBuf::from).collect();
                volume.owner_uid = owner_uid;
                volume.owner_gid = owner_gid;
                if permissions != 0 {
                    volume.permissions = permissions;
                }
                volume.read_only = read_only;
                volume.inode_limit = inode_limit;
                volume.space_guarantee = space_guarantee;
                volume.inode_guarantee = inode_guarantee;
                self.volumes.create(volume).await?;
                Ok((ErrorCode::Success, String::new(), Outcome::None))
            }
            LinkVolume { path, container } => {
                self.require_write(session)?;
                let container = self.resolve(session, &container)?;
                self.volumes.link(std::path::Path::new(&path), &container)?;
                Ok((ErrorCode::Success, String::new(), Outcome::None))
            }
            UnlinkVolume { path, container } => {
                self.require_write(session)?;
                let container = self.resolve(session, &container)?;
                self.volumes.unlink(std::path::Path::new(&path), &container).await?;
                Ok((ErrorCode::Success, String::new(), Outcome::None))
            }
            DestroyVolume { path } => {
                self.require_write(session)?;
                self.volumes.destroy(std::path::Path::new(&path)).await?;
                Ok((ErrorCode::Success, String::new(), Outcome::None))
            }
            ResizeVolume { path, space_limit } => {
                self.require_write(session)?;
                self.volumes.resize(std::path::Path::new(&path), space_limit).await?;
                Ok((ErrorCode::Success, String::new(), Outcome::None))
            }
            ListVolumes { .. } => {
                self.require_read(session)?;
                let paths = self.volumes.list().into_iter().map(|p| p.display().to_string()).collect();
                Ok((ErrorCode::Success, String::new(), Outcome::Names(paths)))
            }
        }
    }

    /// Blocks on the watched containers' terminal state, racing the
    /// caller's timeout (spec §4.2 "Wait(names, timeout)", §5 "on expiry
    /// the event queue fires a callback that composes and sends a timeout
    /// response"). Reports immediately if any watched container is already
    /// Dead when called.
    async fn wait(&self, names: Vec<String>, timeout_ms: u32) -> Result<(ErrorCode, String, Outcome), DaemonError> {
        for name in &names {
            if let Some(node) = self.tree.get(name) {
                if node.state() == State::Dead {
                    return Ok((ErrorCode::Success, String::new(), Outcome::Wait { name: name.clone(), timed_out: false }));
                }
            }
        }

        let mut events = self.events.subscribe();
        let watch = async {
            loop {
                match events.recv().await {
                    Ok(Event::StateChange { container, state: State::Dead }) if names.contains(&container) => return container,
                    Ok(_) => continue,
                    Err(_) => return String::new(),
                }
            }
        };

        if timeout_ms == 0 {
            let name = watch.await;
            return Ok((ErrorCode::Success, String::new(), Outcome::Wait { name, timed_out: false }));
        }

        match tokio::time::timeout(Duration::from_millis(timeout_ms as u64), watch).await {
            Ok(name) => Ok((ErrorCode::Success, String::new(), Outcome::Wait { name, timed_out: false })),
            Err(_) => Ok((ErrorCode::Success, String::new(), Outcome::Wait { name: names.into_iter().next().unwrap_or_default(), timed_out: true })),
        }
    }
}

fn to_daemon_error(e: crate::container::PowerError) -> DaemonError {
    match e {
        crate::container::PowerError::Daemon(d) => d,
        other => DaemonError::new(ErrorCode::InvalidState, other.to_string()),
    }
}

/// Effective level for a session is the minimum over its ancestor chain
/// from root down to its origin container (spec §10 "recomputes AccessLevel
/// as the minimum over the ancestor chain").
pub fn compute_access_level(levels_root_to_origin: &[AccessLevel]) -> AccessLevel {
    levels_root_to_origin.iter().copied().min().unwrap_or(AccessLevel::None)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::net::UnixStream;

    use super::*;
    use crate::container::ExitStatus;
    use crate::events::EventBus;
    use crate::runtime::{ContainerRuntime, LaunchSpec, Launched};
    use crate::store::Database;

    #[test]
    fn access_level_is_the_minimum_down_the_chain() {
        let chain = [AccessLevel::SuperUser, AccessLevel::Normal, AccessLevel::ReadOnly];
        assert_eq!(compute_access_level(&chain), AccessLevel::ReadOnly);
    }

    struct NoopRuntime;

    #[async_trait]
    impl ContainerRuntime for NoopRuntime {
        async fn spawn(&self, _name: &str, _spec: &LaunchSpec) -> Result<Launched, DaemonError> {
            Ok(Launched { pid: 1 })
        }
        async fn signal(&self, _pid: u32, _signal: i32) -> Result<(), DaemonError> {
            Ok(())
        }
        async fn freeze(&self, _name: &str, _frozen: bool) -> Result<(), DaemonError> {
            Ok(())
        }
        async fn wait(&self, _pid: u32) -> Result<ExitStatus, DaemonError> {
            Ok(ExitStatus::Exited(0))
        }
        async fn teardown(&self, _name: &str) -> Result<(), DaemonError> {
            Ok(())
        }
        async fn usage(&self, _name: &str) -> Result<(u64, u64), DaemonError> {
            Ok((0, 0))
        }
    }

    fn dispatcher() -> Dispatcher {
        let events = Arc::new(EventBus::new());
        Dispatcher {
            tree: Arc::new(ContainerTree::new()),
            volumes: Arc::new(VolumeHolder::new()),
            supervisor: Arc::new(Supervisor::new(Arc::new(NoopRuntime), events.clone())),
            store: Arc::new(Database::open_in_memory().unwrap()),
            events,
            privileged_groups: Vec::new(),
        }
    }

    async fn session() -> ClientSession {
        let (a, _b) = UnixStream::pair().unwrap();
        ClientSession::new(a, 1024 * 1024).unwrap()
    }

    #[tokio::test]
    async fn create_set_get_and_destroy_round_trip() {
        let d = dispatcher();
        let mut s = session().await;

        let resp = d
            .handle(&mut s, DispatchRequest::Create { parent: "/".into(), name: "/a".into() })
            .await;
        assert_eq!(resp.error_code, ErrorCode::Success as i32);

        let resp = d
            .handle(&mut s, DispatchRequest::SetProperty { name: "/a".into(), property: "command".into(), value: "/bin/true".into() })
            .await;
        assert_eq!(resp.error_code, ErrorCode::Success as i32);

        let resp = d.handle(&mut s, DispatchRequest::GetProperty { name: "/a".into(), property: "command".into() }).await;
        assert_eq!(resp.error_code, ErrorCode::Success as i32);
        assert!(matches!(resp.result, Some(crate::proto::response::Result::Value(ref v)) if v.value == "/bin/true"));

        let resp = d.handle(&mut s, DispatchRequest::Destroy { name: "/a".into() }).await;
        assert_eq!(resp.error_code, ErrorCode::Success as i32);

        let resp = d.handle(&mut s, DispatchRequest::GetProperty { name: "/a".into(), property: "command".into() }).await;
        assert_eq!(resp.error_code, ErrorCode::ContainerDoesNotExist as i32);
    }

    #[tokio::test]
    async fn read_only_session_cannot_create() {
        let d = dispatcher();
        let mut s = session().await;
        s.access_level = AccessLevel::ReadOnly;

        let resp = d
            .handle(&mut s, DispatchRequest::Create { parent: "/".into(), name: "/a".into() })
            .await;
        assert_eq!(resp.error_code, ErrorCode::Permission as i32);
    }

    #[tokio::test]
    async fn wait_reports_dead_state_without_blocking_once_already_dead() {
        let d = dispatcher();
        let mut s = session().await;
        d.handle(&mut s, DispatchRequest::Create { parent: "/".into(), name: "/a".into() }).await;
        d.tree.get("/a").unwrap().set_state(State::Dead);

        let resp = d.handle(&mut s, DispatchRequest::Wait { names: vec!["/a".into()], timeout_ms: 5000 }).await;
        assert_eq!(resp.error_code, ErrorCode::Success as i32);
        match resp.result {
            Some(crate::proto::response::Result::Wait(w)) => {
                assert_eq!(w.name, "/a");
                assert!(!w.timed_out);
            }
            other => panic!("expected Wait outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn wait_times_out_when_nothing_reaches_dead() {
        let d = dispatcher();
        let mut s = session().await;
        d.handle(&mut s, DispatchRequest::Create { parent: "/".into(), name: "/a".into() }).await;

        let resp = d.handle(&mut s, DispatchRequest::Wait { names: vec!["/a".into()], timeout_ms: 20 }).await;
        assert_eq!(resp.error_code, ErrorCode::Success as i32);
        match resp.result {
            Some(crate::proto::response::Result::Wait(w)) => assert!(w.timed_out),
            other => panic!("expected Wait outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn wait_wakes_on_state_change_event() {
        let d = dispatcher();
        let mut s = session().await;
        d.handle(&mut s, DispatchRequest::Create { parent: "/".into(), name: "/a".into() }).await;

        let events = d.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            events.publish_state("/a", State::Dead);
        });

        let resp = d.handle(&mut s, DispatchRequest::Wait { names: vec!["/a".into()], timeout_ms: 2000 }).await;
        assert_eq!(resp.error_code, ErrorCode::Success as i32);
        match resp.result {
            Some(crate::proto::response::Result::Wait(w)) => {
                assert_eq!(w.name, "/a");
                assert!(!w.timed_out);
            }
            other => panic!("expected Wait outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn volume_lifecycle_link_unlink_destroys_on_empty_owner_set() {
        let d = dispatcher();
        let mut s = session().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol");

        d.handle(&mut s, DispatchRequest::Create { parent: "/".into(), name: "/a".into() }).await;
        d.volumes.insert_for_test(Volume::new(0, path.clone(), dir.path().join("storage"), Backend::Plain, 0, "/a".into()));

        let resp = d.handle(&mut s, DispatchRequest::LinkVolume { path: path.display().to_string(), container: "/a".into() }).await;
        assert_eq!(resp.error_code, ErrorCode::Success as i32);
        assert!(d.volumes.get(&path).unwrap().read().linked_containers.contains("/a"));

        let resp = d.handle(&mut s, DispatchRequest::UnlinkVolume { path: path.display().to_string(), container: "/a".into() }).await;
        assert_eq!(resp.error_code, ErrorCode::Success as i32);
        assert!(d.volumes.get(&path).is_none());
    }

    #[tokio::test]
    async fn destroy_volume_rpc_removes_it() {
        let d = dispatcher();
        let mut s = session().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol");
        d.volumes.insert_for_test(Volume::new(0, path.clone(), dir.path().join("storage"), Backend::Plain, 0, "/a".into()));

        let resp = d.handle(&mut s, DispatchRequest::DestroyVolume { path: path.display().to_string() }).await;
        assert_eq!(resp.error_code, ErrorCode::Success as i32);
        assert!(d.volumes.get(&path).is_none());
    }
}
