//! Daemon communications for ikecmd
//!
//! Wraps the IPC transport and exposes it to the initiation job as the
//! [`PortQuery`] and [`Controller`] collaborators.

use async_trait::async_trait;
use ikecmd_core::connection::{ConnectionDescriptor, ControllerError, Controller, PortQuery};
use ikecmd_ipc::{ClientRequest, DaemonResponse, IpcError, IpcTransport, UnixSocketTransport};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Client for communicating with the tunnel daemon
#[derive(Clone)]
pub struct DaemonClient {
    transport: Arc<Mutex<UnixSocketTransport>>,
}

impl DaemonClient {
    /// Connect to the daemon socket
    pub async fn connect<P: AsRef<Path>>(
        socket_path: P,
        io_timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let transport = match UnixSocketTransport::connect_with_timeout(socket_path, io_timeout)
            .await
        {
            Ok(t) => t,
            Err(IpcError::Connection(msg)) if msg.contains("Permission denied") => {
                return Err(anyhow::anyhow!(
                    "Permission denied when connecting to the daemon: {}",
                    msg
                ));
            }
            Err(e) => return Err(anyhow::anyhow!("Failed to connect to daemon: {}", e)),
        };

        Ok(Self {
            transport: Arc::new(Mutex::new(transport)),
        })
    }

    async fn exchange(&self, request: &ClientRequest) -> Result<DaemonResponse, IpcError> {
        let mut transport = self.transport.lock().await;
        transport.send_request(request).await?;
        transport.receive_response().await
    }

    /// Check that the daemon is up
    pub async fn ping(&self) -> Result<(), anyhow::Error> {
        debug!("Sending ping to daemon");
        let response = self
            .exchange(&ClientRequest::Ping)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to ping daemon: {}", e))?;

        match response {
            DaemonResponse::Pong => {
                debug!("Received pong from daemon");
                Ok(())
            }
            _ => {
                error!("Unexpected response to ping: {:?}", response);
                Err(anyhow::anyhow!(
                    "Unexpected response to ping: {:?}",
                    response
                ))
            }
        }
    }

    /// Close the connection to the daemon
    pub async fn close(&self) -> Result<(), anyhow::Error> {
        let mut transport = self.transport.lock().await;
        transport
            .close()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to close daemon connection: {}", e))
    }
}

fn unavailable(err: IpcError) -> ControllerError {
    ControllerError::Unavailable(err.to_string())
}

#[async_trait]
impl PortQuery for DaemonClient {
    async fn local_port(&self) -> Result<u16, ControllerError> {
        match self
            .exchange(&ClientRequest::QueryPort)
            .await
            .map_err(unavailable)?
        {
            DaemonResponse::Port(port) => {
                debug!(port, "daemon reported local IKE port");
                Ok(port)
            }
            DaemonResponse::Error(msg) => Err(ControllerError::Rejected(msg)),
            other => Err(ControllerError::Unavailable(format!(
                "unexpected response to port query: {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl Controller for DaemonClient {
    async fn initiate(&self, descriptor: ConnectionDescriptor) -> Result<(), ControllerError> {
        match self
            .exchange(&ClientRequest::Initiate(descriptor))
            .await
            .map_err(unavailable)?
        {
            DaemonResponse::Initiated => Ok(()),
            DaemonResponse::Error(msg) => Err(ControllerError::Rejected(msg)),
            other => Err(ControllerError::Unavailable(format!(
                "unexpected response to initiate: {:?}",
                other
            ))),
        }
    }
}
