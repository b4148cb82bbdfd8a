//! IPC Transport Layer
//!
//! Length-prefixed bincode messages over a Unix domain socket. The client
//! side is [`UnixSocketTransport`]; the daemon side is
//! [`UnixSocketListener`] and the connections it accepts.

use crate::messages::{ClientRequest, DaemonResponse};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{timeout, Duration};
use tracing::{debug, trace};

/// Default timeout for a single read or write
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest message accepted from the peer
const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Result type for IPC operations
pub type IpcResult<T> = Result<T, IpcError>;

/// Error type for IPC operations
#[derive(Error, Debug)]
pub enum IpcError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Timeout error
    #[error("Timeout error: {0}")]
    Timeout(String),
}

/// Trait for IPC transport implementations
#[async_trait]
pub trait IpcTransport: Send + Sync {
    /// Send a request to the daemon
    async fn send_request(&mut self, request: &ClientRequest) -> IpcResult<()>;

    /// Receive a response from the daemon
    async fn receive_response(&mut self) -> IpcResult<DaemonResponse>;

    /// Close the connection
    async fn close(&mut self) -> IpcResult<()>;
}

async fn write_message<T: Serialize>(
    stream: &mut UnixStream,
    message: &T,
    io_timeout: Duration,
) -> IpcResult<()> {
    let data = bincode::serialize(message)?;
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(IpcError::Protocol(format!(
            "Message too large: {} bytes",
            data.len()
        )));
    }

    let len = data.len() as u32;
    match timeout(io_timeout, stream.write_all(&len.to_le_bytes())).await {
        Ok(result) => result?,
        Err(_) => return Err(IpcError::Timeout("Write operation timed out".to_string())),
    };

    match timeout(io_timeout, stream.write_all(&data)).await {
        Ok(result) => result?,
        Err(_) => return Err(IpcError::Timeout("Write operation timed out".to_string())),
    };

    trace!(bytes = data.len(), "wrote IPC message");
    Ok(())
}

async fn read_message<T: DeserializeOwned>(
    stream: &mut UnixStream,
    io_timeout: Duration,
) -> IpcResult<T> {
    let mut len_buf = [0u8; 4];
    match timeout(io_timeout, stream.read_exact(&mut len_buf)).await {
        Ok(result) => result?,
        Err(_) => return Err(IpcError::Timeout("Read operation timed out".to_string())),
    };

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(IpcError::Protocol(format!(
            "Message too large: {} bytes",
            len
        )));
    }

    let mut data = vec![0u8; len];
    match timeout(io_timeout, stream.read_exact(&mut data)).await {
        Ok(result) => result?,
        Err(_) => return Err(IpcError::Timeout("Read operation timed out".to_string())),
    };

    trace!(bytes = len, "read IPC message");
    Ok(bincode::deserialize(&data)?)
}

/// Unix Domain Socket transport implementation
pub struct UnixSocketTransport {
    stream: UnixStream,
    io_timeout: Duration,
}

impl UnixSocketTransport {
    /// Connect to the daemon socket at `path`
    pub async fn connect<P: AsRef<Path>>(path: P) -> IpcResult<Self> {
        Self::connect_with_timeout(path, DEFAULT_TIMEOUT).await
    }

    /// Connect with a custom per-operation timeout
    pub async fn connect_with_timeout<P: AsRef<Path>>(
        path: P,
        io_timeout: Duration,
    ) -> IpcResult<Self> {
        let path = path.as_ref();
        let stream = match timeout(io_timeout, UnixStream::connect(path)).await {
            Ok(result) => result.map_err(|e| {
                IpcError::Connection(format!(
                    "Failed to connect to {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(_) => return Err(IpcError::Timeout("Connect timed out".to_string())),
        };

        debug!(socket = %path.display(), "connected to daemon");
        Ok(Self { stream, io_timeout })
    }
}

#[async_trait]
impl IpcTransport for UnixSocketTransport {
    async fn send_request(&mut self, request: &ClientRequest) -> IpcResult<()> {
        write_message(&mut self.stream, request, self.io_timeout).await
    }

    async fn receive_response(&mut self) -> IpcResult<DaemonResponse> {
        read_message(&mut self.stream, self.io_timeout).await
    }

    async fn close(&mut self) -> IpcResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Daemon-side Unix Domain Socket listener
pub struct UnixSocketListener {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl UnixSocketListener {
    /// Bind to `path`, replacing a stale socket file
    pub async fn bind<P: AsRef<Path>>(path: P) -> IpcResult<Self> {
        let path = path.as_ref();

        if path.exists() {
            std::fs::remove_file(path).map_err(|e| {
                IpcError::Connection(format!("Failed to remove existing socket: {}", e))
            })?;
        }

        let listener = UnixListener::bind(path)
            .map_err(|e| IpcError::Connection(format!("Failed to bind to socket: {}", e)))?;

        // rw-rw----
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut permissions = std::fs::metadata(path)
                .map_err(|e| {
                    IpcError::Connection(format!("Failed to get socket metadata: {}", e))
                })?
                .permissions();
            permissions.set_mode(0o660);
            std::fs::set_permissions(path, permissions).map_err(|e| {
                IpcError::Connection(format!("Failed to set socket permissions: {}", e))
            })?;
        }

        Ok(Self {
            listener,
            socket_path: path.to_path_buf(),
        })
    }

    /// Accept a new connection
    pub async fn accept(&self) -> IpcResult<UnixSocketConnection> {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .map_err(|e| IpcError::Connection(format!("Failed to accept connection: {}", e)))?;

        Ok(UnixSocketConnection {
            stream,
            io_timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for UnixSocketListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// One accepted client connection on the daemon side
pub struct UnixSocketConnection {
    stream: UnixStream,
    io_timeout: Duration,
}

impl UnixSocketConnection {
    /// Receive the next request
    pub async fn receive_request(&mut self) -> IpcResult<ClientRequest> {
        read_message(&mut self.stream, self.io_timeout).await
    }

    /// Send a response
    pub async fn send_response(&mut self, response: &DaemonResponse) -> IpcResult<()> {
        write_message(&mut self.stream, response, self.io_timeout).await
    }

    /// Close the connection
    pub async fn close(&mut self) -> IpcResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
