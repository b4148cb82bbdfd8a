//! Seams to the tunnel daemon.

use async_trait::async_trait;

use crate::connection::descriptor::ConnectionDescriptor;
use crate::connection::error::ControllerError;

/// Reports the local port the daemon's IKE socket is bound to.
#[async_trait]
pub trait PortQuery: Send + Sync {
    async fn local_port(&self) -> Result<u16, ControllerError>;
}

/// Accepts a finished descriptor and starts negotiating it.
///
/// Ownership of the negotiation passes to the daemon once this returns `Ok`.
#[async_trait]
pub trait Controller: Send + Sync {
    async fn initiate(&self, descriptor: ConnectionDescriptor) -> Result<(), ControllerError>;
}
