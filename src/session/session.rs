//! A connected RPC peer: kernel credentials, namespace, access level, and
//! the weak-container set this session owns (spec §3 "Client session",
//! §4.4).

use std::os::fd::AsFd;

use nix::sys::socket::{getsockopt, sockopt::PeerCredentials as PeerCredentialsOpt};
use tokio::net::UnixStream;

use crate::access::AccessLevel;
use crate::error::DaemonError;
use crate::session::framing::FrameReader;

/// The kernel-verified identity of a connected peer (spec §4.4
/// "identification of a connecting peer through its kernel credentials").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub pid: i32,
    pub uid: u32,
    pub gid: u32,
}

fn read_peer_credentials(stream: &UnixStream) -> Result<PeerCredentials, DaemonError> {
    let cred = getsockopt(&stream.as_fd(), PeerCredentialsOpt)
        .map_err(|e| DaemonError::with_errno(crate::error::ErrorCode::Unknown, format!("SO_PEERCRED failed: {}", e), e as i32))?;
    Ok(PeerCredentials { pid: cred.pid(), uid: cred.uid(), gid: cred.gid() })
}

/// One accepted connection. Re-identified lazily whenever the cached
/// credentials no longer match the live socket (spec §10
/// "Session identify/re-identify").
pub struct ClientSession {
    pub stream: UnixStream,
    pub reader: FrameReader,
    pub credentials: PeerCredentials,
    /// The container this peer was spawned from, or root for an external
    /// client (spec §4.4 "origin container").
    pub origin: String,
    /// Namespace prefix bare names resolve against (spec §4.4).
    pub namespace: String,
    pub access_level: AccessLevel,
    /// Containers this session created that should be torn down when the
    /// session closes (spec §3 "weak references to containers marked
    /// ephemeral for this session").
    pub weak_containers: Vec<String>,
}

impl ClientSession {
    pub fn new(stream: UnixStream, max_frame_len: usize) -> Result<Self, DaemonError> {
        let credentials = read_peer_credentials(&stream)?;
        Ok(Self {
            stream,
            reader: FrameReader::new(max_frame_len),
            credentials,
            origin: "/".to_string(),
            namespace: "/".to_string(),
            access_level: AccessLevel::Normal,
            weak_containers: Vec::new(),
        })
    }

    /// Re-identify if the live socket credentials drifted from the cached
    /// ones (spec §10: re-resolved lazily, only on mismatch).
    pub fn reidentify_if_stale(&mut self) -> Result<bool, DaemonError> {
        let live = read_peer_credentials(&self.stream)?;
        if live == self.credentials {
            return Ok(false);
        }
        self.credentials = live;
        Ok(true)
    }

    pub fn mark_weak(&mut self, container: String) {
        self.weak_containers.push(container);
    }
}
