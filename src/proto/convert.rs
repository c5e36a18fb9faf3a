//! Flattens the generated `oneof` wire shapes into plain enums the
//! dispatcher matches on, and builds `Response` wire messages back.

use prost::Message;

use crate::error::{DaemonError, ErrorCode};
use crate::proto::{request, response, Request, Response};

/// One decoded RPC command, unwrapped from `Request`'s `oneof`.
#[derive(Debug, Clone)]
pub enum DispatchRequest {
    Create { parent: String, name: String },
    Destroy { name: String },
    Start { name: String },
    Stop { name: String, timeout_ms: u32 },
    Pause { name: String },
    Resume { name: String },
    Kill { name: String, signal: i32 },
    GetProperty { name: String, property: String },
    SetProperty { name: String, property: String, value: String },
    GetData { name: String, field: String },
    List { mask: String },
    Wait { names: Vec<String>, timeout_ms: u32 },
    CreateVolume {
        path: String,
        backend: String,
        space_limit: u64,
        layers: Vec<String>,
        owner_uid: u32,
        owner_gid: u32,
        permissions: u32,
        read_only: bool,
        inode_limit: u64,
        space_guarantee: u64,
        inode_guarantee: u64,
    },
    LinkVolume { path: String, container: String },
    UnlinkVolume { path: String, container: String },
    ListVolumes { container: String },
    DestroyVolume { path: String },
    ResizeVolume { path: String, space_limit: u64 },
}

pub fn decode_request(frame: &[u8]) -> Result<DispatchRequest, DaemonError> {
    let request = Request::decode(frame).map_err(|e| DaemonError::new(ErrorCode::InvalidValue, format!("malformed request: {}", e)))?;
    match request.command {
        Some(request::Command::Create(r)) => Ok(DispatchRequest::Create { parent: r.parent, name: r.name }),
        Some(request::Command::Destroy(r)) => Ok(DispatchRequest::Destroy { name: r.name }),
        Some(request::Command::Start(r)) => Ok(DispatchRequest::Start { name: r.name }),
        Some(request::Command::Stop(r)) => Ok(DispatchRequest::Stop { name: r.name, timeout_ms: r.timeout_ms }),
        Some(request::Command::Pause(r)) => Ok(DispatchRequest::Pause { name: r.name }),
        Some(request::Command::Resume(r)) => Ok(DispatchRequest::Resume { name: r.name }),
        Some(request::Command::Kill(r)) => Ok(DispatchRequest::Kill { name: r.name, signal: r.signal }),
        Some(request::Command::GetProperty(r)) => Ok(DispatchRequest::GetProperty { name: r.name, property: r.property }),
        Some(request::Command::SetProperty(r)) => Ok(DispatchRequest::SetProperty { name: r.name, property: r.property, value: r.value }),
        Some(request::Command::GetData(r)) => Ok(DispatchRequest::GetData { name: r.name, field: r.field }),
        Some(request::Command::List(r)) => Ok(DispatchRequest::List { mask: r.mask }),
        Some(request::Command::Wait(r)) => Ok(DispatchRequest::Wait { names: r.names, timeout_ms: r.timeout_ms }),
        Some(request::Command::CreateVolume(r)) => Ok(DispatchRequest::CreateVolume {
            path: r.path,
            backend: r.backend,
            space_limit: r.space_limit,
            layers: r.layers,
            owner_uid: r.owner_uid,
            owner_gid: r.owner_gid,
            permissions: r.permissions,
            read_only: r.read_only,
            inode_limit: r.inode_limit,
            space_guarantee: r.space_guarantee,
            inode_guarantee: r.inode_guarantee,
        }),
        Some(request::Command::LinkVolume(r)) => Ok(DispatchRequest::LinkVolume { path: r.path, container: r.container }),
        Some(request::Command::UnlinkVolume(r)) => Ok(DispatchRequest::UnlinkVolume { path: r.path, container: r.container }),
        Some(request::Command::ListVolumes(r)) => Ok(DispatchRequest::ListVolumes { container: r.container }),
        Some(request::Command::DestroyVolume(r)) => Ok(DispatchRequest::DestroyVolume { path: r.path }),
        Some(request::Command::ResizeVolume(r)) => Ok(DispatchRequest::ResizeVolume { path: r.path, space_limit: r.space_limit }),
        None => Err(DaemonError::new(ErrorCode::InvalidValue, "request carries no command")),
    }
}

/// The value a successful dispatch produced, to be wrapped into a
/// `Response`'s `oneof result`.
pub enum Outcome {
    None,
    Value(String),
    Names(Vec<String>),
    Wait { name: String, timed_out: bool },
}

pub fn build_response(code: ErrorCode, message: &str, outcome: Outcome) -> Response {
    let result = match outcome {
        Outcome::None => None,
        Outcome::Value(v) => Some(response::Result::Value(super::StringValue { value: v })),
        Outcome::Names(names) => Some(response::Result::List(super::ListResponse { names })),
        Outcome::Wait { name, timed_out } => Some(response::Result::Wait(super::WaitResponse { name, timed_out })),
    };
    Response { error_code: code as i32, error_message: message.to_string(), result }
}
