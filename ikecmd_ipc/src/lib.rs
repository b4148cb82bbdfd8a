//! ikecmd IPC Protocol Library
//!
//! This crate defines the messages and the Unix-domain-socket transport used
//! between the `ikecmd` front end and the tunnel daemon that negotiates the
//! connections it submits.

pub mod messages;
pub mod transport;

/// Re-export common types for convenience
pub use messages::{ClientRequest, DaemonResponse};
pub use transport::{IpcError, IpcResult, IpcTransport, UnixSocketListener, UnixSocketTransport};
