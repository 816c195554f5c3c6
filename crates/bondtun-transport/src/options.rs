use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tokio::net::{TcpSocket, TcpStream};
use tracing::debug;

use crate::error::{Result, TransportError};

/// Default kernel send/receive buffer size applied to every socket: 64 KiB.
pub const DEFAULT_SOCKET_BUFFER_SIZE: u32 = 64 * 1024;

/// Socket options applied to listeners, accepted streams and dialed links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketOptions {
    /// `SO_SNDBUF` in bytes. `None` keeps the kernel default.
    pub send_buffer_size: Option<u32>,
    /// `SO_RCVBUF` in bytes. `None` keeps the kernel default.
    pub recv_buffer_size: Option<u32>,
    /// Whether `TCP_NODELAY` is set on connected streams.
    pub nodelay: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            send_buffer_size: Some(DEFAULT_SOCKET_BUFFER_SIZE),
            recv_buffer_size: Some(DEFAULT_SOCKET_BUFFER_SIZE),
            nodelay: true,
        }
    }
}

impl SocketOptions {
    /// Use the same size for both kernel buffers.
    pub fn with_buffer_size(mut self, size: u32) -> Self {
        self.send_buffer_size = Some(size);
        self.recv_buffer_size = Some(size);
        self
    }

    /// Apply buffer sizes to a socket before it binds, listens or connects.
    ///
    /// Listening sockets pass their buffer sizes on to accepted streams.
    pub(crate) fn apply_to_socket(&self, socket: &TcpSocket) -> std::io::Result<()> {
        if let Some(size) = self.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        if let Some(size) = self.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        Ok(())
    }

    /// Apply per-stream options once a connection is established.
    pub(crate) fn apply_to_stream(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)
    }
}

/// A `host:port` pair naming a remote peer. The host may be a literal IP
/// address or a name resolved at dial time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
}

impl RemoteTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve to the first address the resolver returns.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|source| TransportError::Resolve {
                target: self.to_string(),
                source,
            })?;

        let addr = addrs.next().ok_or_else(|| TransportError::NoAddress {
            target: self.to_string(),
        })?;
        debug!(target = %self, %addr, "resolved remote target");
        Ok(addr)
    }
}

impl From<SocketAddr> for RemoteTarget {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
