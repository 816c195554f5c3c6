use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::options::{RemoteTarget, SocketOptions};

/// TCP listener for endpoint or link connections.
///
/// Socket options are applied to the listening socket before `listen` so
/// accepted streams inherit the kernel buffer sizes.
pub struct TcpLinkListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    options: SocketOptions,
}

impl TcpLinkListener {
    /// Bind and listen on `addr` with the given accept backlog.
    pub fn bind(addr: SocketAddr, backlog: u32, options: SocketOptions) -> Result<Self> {
        let bind_err = |source| TransportError::Bind { addr, source };

        let socket = new_socket(addr).map_err(bind_err)?;
        #[cfg(unix)]
        socket.set_reuseaddr(true).map_err(bind_err)?;
        options.apply_to_socket(&socket).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(backlog.max(1)).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        info!(%local_addr, backlog, "listening for tcp connections");

        Ok(Self {
            listener,
            local_addr,
            options,
        })
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
        self.options
            .apply_to_stream(&stream)
            .map_err(TransportError::Accept)?;
        debug!(%peer, local = %self.local_addr, "accepted connection");
        Ok((stream, peer))
    }

    /// The address this listener is bound to (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Resolve `remote` and dial it, optionally from a fixed local address.
pub async fn dial(
    local: Option<SocketAddr>,
    remote: &RemoteTarget,
    options: SocketOptions,
) -> Result<TcpStream> {
    let addr = remote.resolve().await?;
    dial_addr(local, addr, options).await
}

/// Dial an already-resolved address, optionally from a fixed local address.
pub async fn dial_addr(
    local: Option<SocketAddr>,
    remote: SocketAddr,
    options: SocketOptions,
) -> Result<TcpStream> {
    let connect_err = |source| TransportError::Connect {
        addr: remote,
        source,
    };

    let socket = new_socket(remote).map_err(connect_err)?;
    options.apply_to_socket(&socket).map_err(connect_err)?;

    if let Some(local) = local {
        #[cfg(unix)]
        socket
            .set_reuseaddr(true)
            .map_err(|source| TransportError::Bind {
                addr: local,
                source,
            })?;
        socket.bind(local).map_err(|source| TransportError::Bind {
            addr: local,
            source,
        })?;
    }

    let stream = socket.connect(remote).await.map_err(connect_err)?;
    options.apply_to_stream(&stream).map_err(connect_err)?;

    debug!(
        local = ?stream.local_addr().ok(),
        %remote,
        "connected tcp stream"
    );
    Ok(stream)
}

fn new_socket(addr: SocketAddr) -> std::io::Result<TcpSocket> {
    match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
}
