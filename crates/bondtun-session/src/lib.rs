//! Bonded session management.
//!
//! A session owns one single endpoint and an ordered set of N links. Bytes
//! read from the endpoint are chunked into frames and dealt round-robin
//! across the links; frames read from the links, visited in the same fixed
//! order, are written back to the endpoint verbatim. Both peers must agree on
//! the link order: it is the only thing that carries sequencing.
//!
//! Any failure on any link or on the endpoint tears the whole session down.
//! There is no per-link recovery.

pub mod collector;
pub mod config;
pub mod distributor;
pub mod error;
pub mod host;
pub mod ingress;
pub mod queue;
pub mod session;
pub mod teardown;

pub use collector::LinkCollector;
pub use config::{
    HostConfig, LinkConfig, RoleConfig, SessionConfig, DEFAULT_QUEUE_DEPTH_MULTIPLIER,
    DEFAULT_ROUND_BUDGET, MAX_LINKS,
};
pub use distributor::LinkDistributor;
pub use error::{ConfigError, Result, SessionError};
pub use host::{run_host, Host, HostReport, SessionOutcome};
pub use ingress::IngressReader;
pub use queue::{frame_queue, FrameReceiver, FrameSender, QueueClosed};
pub use session::{run_bonded, SessionManager, SessionParams, SessionState, Termination};
pub use teardown::Teardown;
