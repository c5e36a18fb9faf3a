//! Generated protobuf message types plus the conversions between them and
//! the daemon's own request/response types (spec §4.4, §6).

#![allow(clippy::all)]

include!(concat!(env!("OUT_DIR"), "/portod.rpc.rs"));

mod convert;

pub use convert::{build_response, decode_request, DispatchRequest, Outcome};
