//! `portod` with no subcommand — binds the RPC socket and runs the
//! single-threaded event loop (spec §5).

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use portod::config::Configuration;
use portod::container::{ContainerTree, Supervisor};
use portod::events::{Deadline, DeadlineQueue, Event, EventBus};
use portod::proto;
use portod::runtime::LinuxRuntime;
use portod::session::{ClientSession, Dispatcher};
use portod::store::Database;
use portod::volume::VolumeHolder;

pub async fn run(config_path: &str) -> Result<()> {
    info!("loading configuration from {}", config_path);
    let config = Configuration::load(config_path)?;

    info!("rpc socket: {}", config.rpc.socket_path.display());
    info!("cgroup root: {}", config.system.cgroup_root.display());

    let store = Arc::new(Database::open(config.system.node_store_directory.join("nodes.db"))?);
    let events = Arc::new(EventBus::new());
    let tree = Arc::new(ContainerTree::new());
    let volumes = Arc::new(VolumeHolder::new());
    let runtime = Arc::new(LinuxRuntime::new(config.system.cgroup_root.clone()));
    let supervisor = Arc::new(Supervisor::new(runtime, events.clone()));

    restore_tree(&tree, &store).await;

    let host_memory = sysinfo::System::new_all().total_memory();
    tree.set_memory_budget(host_memory, config.system.memory_reserve);
    info!("host memory {} bytes, reserve {} bytes", host_memory, config.system.memory_reserve);

    let dispatcher = Arc::new(Dispatcher {
        tree: tree.clone(),
        volumes: volumes.clone(),
        supervisor: supervisor.clone(),
        store: store.clone(),
        privileged_groups: config.container.privileged_groups.clone(),
        events: events.clone(),
    });

    if config.rpc.socket_path.exists() {
        std::fs::remove_file(&config.rpc.socket_path)?;
    }
    let listener = UnixListener::bind(&config.rpc.socket_path)?;
    std::fs::set_permissions(&config.rpc.socket_path, std::fs::Permissions::from_mode(config.rpc.socket_mode))?;
    info!("listening on {}", config.rpc.socket_path.display());

    let respawn_handle = tokio::spawn(respawn_loop(tree.clone(), supervisor.clone(), events.clone(), config.container.default_max_respawns));

    let mut shutdown = Box::pin(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        continue;
                    }
                };
                let dispatcher = dispatcher.clone();
                let max_frame_length = config.rpc.max_frame_length;
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, dispatcher, max_frame_length).await {
                        debug!("session ended: {}", e);
                    }
                });
            }
            _ = &mut shutdown => {
                info!("received shutdown signal");
                break;
            }
        }
    }

    respawn_handle.abort();
    let _ = std::fs::remove_file(&config.rpc.socket_path);
    info!("daemon stopped");
    Ok(())
}

async fn handle_connection(stream: UnixStream, dispatcher: Arc<Dispatcher>, max_frame_length: usize) -> Result<()> {
    let mut session = ClientSession::new(stream, max_frame_length)?;
    let mut buf = [0u8; 8192];

    loop {
        let n = session.stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        session.reader.feed(&buf[..n]);

        loop {
            let frame = session.reader.try_read_frame()?;
            match frame {
                portod::session::Progress::NeedMoreData => break,
                portod::session::Progress::Frame(payload) => {
                    session.reidentify_if_stale().ok();
                    let response = match proto::decode_request(&payload) {
                        Ok(request) => dispatcher.handle(&mut session, request).await,
                        Err(e) => proto::build_response(e.code(), &e.message, proto::Outcome::None),
                    };
                    let encoded = encode_response(&response);
                    let framed = portod::session::FrameReader::encode_frame(&encoded);
                    session.stream.write_all(&framed).await?;
                }
            }
        }
    }

    for container in &session.weak_containers {
        let _ = dispatcher.supervisor.stop(&dispatcher.tree, container, Duration::from_secs(1)).await;
        let _ = dispatcher.tree.destroy(container);
    }
    Ok(())
}

/// Rebuilds the container tree from the persistent node store on startup
/// (spec §2 "the container tree is reconstructed from the persistent node
/// store on daemon restart"), shallowest containers first so each node's
/// parent already exists when it's created.
async fn restore_tree(tree: &ContainerTree, store: &Database) {
    let nodes = store.nodes().await;
    let mut names = match nodes.all_nodes() {
        Ok(names) => names,
        Err(e) => {
            warn!("failed to list persisted containers: {}", e);
            return;
        }
    };
    names.retain(|n| n != "/");
    names.sort_by_key(|n| n.matches('/').count());

    for name in &names {
        let entries = match nodes.list(name) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("failed to restore {}: {}", name, e);
                continue;
            }
        };
        let mut parent = "/".to_string();
        let mut owner_uid = 0u32;
        let mut owner_gid = 0u32;
        let mut properties = Vec::new();
        for entry in &entries {
            let Ok(value) = entry.value_str() else { continue };
            match entry.key.as_str() {
                "parent" => parent = value.to_string(),
                "owner_uid" => owner_uid = value.parse().unwrap_or(0),
                "owner_gid" => owner_gid = value.parse().unwrap_or(0),
                property => properties.push((property.to_string(), value.to_string())),
            }
        }
        if let Err(e) = tree.create(name, &parent, owner_uid, owner_gid) {
            warn!("failed to recreate {}: {}", name, e);
            continue;
        }
        for (property, value) in properties {
            if let Err(e) = tree.set_property(name, &property, &value) {
                debug!("skipping persisted {}={} on {}: {}", property, value, name, e);
            }
        }
    }
    info!("restored {} containers from the node store", names.len());
}

fn encode_response(response: &proto::Response) -> Vec<u8> {
    use prost::Message;
    response.encode_to_vec()
}

/// Watches exit events and reschedules `Start` for containers whose
/// `respawn` property is set, honoring `max_respawns` (spec §6
/// "respawn"/"max_respawns").
async fn respawn_loop(tree: Arc<ContainerTree>, supervisor: Arc<Supervisor>, events: Arc<EventBus>, default_max_respawns: u32) {
    let mut exits = events.subscribe();
    let mut deadlines = DeadlineQueue::new();

    loop {
        tokio::select! {
            event = exits.recv() => {
                let Ok(Event::Exit { container, .. }) = event else { continue };
                let Some(node) = tree.get(&container) else { continue };
                let respawn = tree.get_property(&container, "respawn").unwrap_or_else(|_| "false".to_string());
                if respawn != "true" {
                    continue;
                }
                let max = tree.get_property(&container, "max_respawns").unwrap_or_else(|_| default_max_respawns.to_string());
                let max: u32 = max.parse().unwrap_or(default_max_respawns);
                if !node.respawn.should_respawn(max) {
                    continue;
                }
                deadlines.schedule(Deadline::Respawn { container }, Duration::from_secs(1));
            }
            fired = deadlines.next(), if !deadlines.is_empty() => {
                if let Some(Deadline::Respawn { container }) = fired {
                    if let Err(e) = supervisor.start(&tree, &container).await {
                        error!("respawn of {} failed: {}", container, e);
                    }
                }
            }
        }
    }
}
