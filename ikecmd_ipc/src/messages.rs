//! IPC Message Definitions
//!
//! This module defines the message types exchanged between ikecmd and the
//! tunnel daemon.

use ikecmd_core::connection::ConnectionDescriptor;
use serde::{Deserialize, Serialize};

/// Request sent from ikecmd to the daemon
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ClientRequest {
    /// Simple ping to check if the daemon is up
    Ping,

    /// Ask which local port the IKE socket is bound to
    QueryPort,

    /// Start negotiating the given connection
    Initiate(ConnectionDescriptor),
}

/// Response sent from the daemon to ikecmd
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum DaemonResponse {
    /// Response to a ping request
    Pong,

    /// Local IKE port
    Port(u16),

    /// The connection was accepted for negotiation
    Initiated,

    /// Error response with a message
    Error(String),
}
