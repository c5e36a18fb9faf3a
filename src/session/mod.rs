//! Client session lifecycle: framing, peer identification, and dispatch
//! (spec §3 "Client session", §4.4).

mod dispatch;
mod framing;
mod session;

pub use dispatch::Dispatcher;
pub use framing::{FrameReader, Progress};
pub use session::{ClientSession, PeerCredentials};
