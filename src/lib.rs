//! portod — a Linux container supervisor daemon.
//!
//! Accepts length-framed RPC requests over a Unix stream socket and, on
//! behalf of each caller, creates, configures, monitors and tears down
//! isolated Linux processes together with their backing storage volumes.

pub mod access;
pub mod config;
pub mod container;
pub mod error;
pub mod events;
pub mod property;
pub mod proto;
pub mod runtime;
pub mod session;
pub mod store;
pub mod system;
pub mod volume;

pub use config::Configuration;
pub use container::{Container, ContainerTree};
pub use error::{DaemonError, ErrorCode};
pub use events::EventBus;
