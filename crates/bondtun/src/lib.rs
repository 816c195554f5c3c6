//! Bond several TCP links into one ordered byte tunnel.
//!
//! One side accepts a single application connection and spreads its bytes
//! round-robin over N links; the other side collects the links in the same
//! fixed order and replays the stream to its own endpoint. Both directions
//! run at once. Losing any link or either endpoint ends the whole session.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listen, dial and socket options
//! - [`frame`]: length-prefixed framing used on every link
//! - [`session`]: session configuration, the bonded session units and the
//!   multi-session host

/// Re-export transport types.
pub mod transport {
    pub use bondtun_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use bondtun_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use bondtun_session::*;
}
