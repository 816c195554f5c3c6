//! TCP link plumbing for bonded tunnels.
//!
//! This is the lowest layer of bondtun. It knows how to listen for and
//! dial plain TCP connections, resolve `host:port` targets and apply the
//! socket options shared by every link. It knows nothing about framing or
//! link ordering; the session layer owns that.

pub mod error;
pub mod options;
pub mod tcp;

pub use error::{Result, TransportError};
pub use options::{RemoteTarget, SocketOptions, DEFAULT_SOCKET_BUFFER_SIZE};
pub use tcp::{dial, dial_addr, TcpLinkListener};
