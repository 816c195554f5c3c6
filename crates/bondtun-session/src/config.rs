use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use bondtun_frame::{FrameConfig, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
use bondtun_transport::{RemoteTarget, SocketOptions};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Bytes per distribution round across all links (header included).
pub const DEFAULT_ROUND_BUDGET: usize = 1500;

/// Frame queue capacity per link.
pub const DEFAULT_QUEUE_DEPTH_MULTIPLIER: usize = 16;

/// Upper bound on the number of links in one session.
pub const MAX_LINKS: usize = 255;

/// Every session hosted by one process, plus the socket options they share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub sessions: Vec<SessionConfig>,
    #[serde(default)]
    pub socket: SocketOptions,
}

impl HostConfig {
    /// Parse and validate a JSON host configuration.
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every session and reject duplicate names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sessions.is_empty() {
            return Err(ConfigError::NoSessions);
        }

        let mut seen = HashSet::new();
        for session in &self.sessions {
            if !seen.insert(session.name.as_str()) {
                return Err(ConfigError::DuplicateSession(session.name.clone()));
            }
            session.validate()?;
        }
        Ok(())
    }
}

/// One bonded session.
///
/// The link order in [`RoleConfig::Initiator::links`] is the canonical
/// cyclic order and must match the peer's accept order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub name: String,
    #[serde(flatten)]
    pub role: RoleConfig,
    /// Largest payload accepted from a link.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Bytes per distribution round; divided evenly across links.
    #[serde(default = "default_round_budget")]
    pub round_budget: usize,
    /// Frame queue capacity is `link_count * queue_depth_multiplier`.
    #[serde(default = "default_queue_depth_multiplier")]
    pub queue_depth_multiplier: usize,
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    #[serde(default)]
    pub write_timeout_ms: Option<u64>,
}

/// Which side listens and which side is the single endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum RoleConfig {
    /// Accepts one application connection on `bind`, then dials every link.
    Initiator {
        bind: SocketAddr,
        links: Vec<LinkConfig>,
    },
    /// Accepts `link_count` links on `bind`, then dials `remote`.
    Responder {
        bind: SocketAddr,
        link_count: usize,
        remote: RemoteTarget,
    },
}

/// One outbound link dialed by an initiator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Local address to bind before dialing (selects the physical path).
    #[serde(default)]
    pub local: Option<SocketAddr>,
    pub remote: RemoteTarget,
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_round_budget() -> usize {
    DEFAULT_ROUND_BUDGET
}

fn default_queue_depth_multiplier() -> usize {
    DEFAULT_QUEUE_DEPTH_MULTIPLIER
}

impl SessionConfig {
    /// An initiator session with default tuning.
    pub fn initiator(name: impl Into<String>, bind: SocketAddr, links: Vec<LinkConfig>) -> Self {
        Self::with_role(name, RoleConfig::Initiator { bind, links })
    }

    /// A responder session with default tuning.
    pub fn responder(
        name: impl Into<String>,
        bind: SocketAddr,
        link_count: usize,
        remote: RemoteTarget,
    ) -> Self {
        Self::with_role(
            name,
            RoleConfig::Responder {
                bind,
                link_count,
                remote,
            },
        )
    }

    fn with_role(name: impl Into<String>, role: RoleConfig) -> Self {
        Self {
            name: name.into(),
            role,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            round_budget: DEFAULT_ROUND_BUDGET,
            queue_depth_multiplier: DEFAULT_QUEUE_DEPTH_MULTIPLIER,
            read_timeout_ms: None,
            write_timeout_ms: None,
        }
    }

    /// Number of links `N`.
    pub fn link_count(&self) -> usize {
        match &self.role {
            RoleConfig::Initiator { links, .. } => links.len(),
            RoleConfig::Responder { link_count, .. } => *link_count,
        }
    }

    /// Local address the session listens on.
    pub fn bind_addr(&self) -> SocketAddr {
        match &self.role {
            RoleConfig::Initiator { bind, .. } | RoleConfig::Responder { bind, .. } => *bind,
        }
    }

    pub fn role_name(&self) -> &'static str {
        match self.role {
            RoleConfig::Initiator { .. } => "initiator",
            RoleConfig::Responder { .. } => "responder",
        }
    }

    /// Listen backlog: one endpoint for an initiator, `N` links for a
    /// responder.
    pub fn backlog(&self) -> u32 {
        match &self.role {
            RoleConfig::Initiator { .. } => 1,
            RoleConfig::Responder { link_count, .. } => *link_count as u32,
        }
    }

    /// Largest endpoint read, so that one round of `N` frames including
    /// headers fits the round budget.
    pub fn chunk_size(&self) -> usize {
        let per_link = self.round_budget / self.link_count().max(1);
        per_link
            .saturating_sub(HEADER_SIZE)
            .min(self.max_frame_size)
    }

    /// Frame queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.link_count() * self.queue_depth_multiplier
    }

    /// Frame codec settings shared by every link.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_size: self.max_frame_size,
            read_timeout: self.read_timeout_ms.map(Duration::from_millis),
            write_timeout: self.write_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            session: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("session name must not be empty".to_string()));
        }

        let n = self.link_count();
        if n == 0 {
            return Err(invalid("at least one link is required".to_string()));
        }
        if n > MAX_LINKS {
            return Err(invalid(format!("{n} links exceeds the maximum of {MAX_LINKS}")));
        }
        if self.max_frame_size == 0 || self.max_frame_size > u32::MAX as usize {
            return Err(invalid(format!(
                "max_frame_size must be between 1 and {}",
                u32::MAX
            )));
        }
        if self.round_budget / n <= HEADER_SIZE {
            return Err(invalid(format!(
                "round_budget {} leaves no payload room across {n} links",
                self.round_budget
            )));
        }
        if self.queue_depth_multiplier == 0 {
            return Err(invalid(
                "queue_depth_multiplier must be at least 1".to_string(),
            ));
        }
        if self.read_timeout_ms == Some(0) || self.write_timeout_ms == Some(0) {
            return Err(invalid("timeouts must be greater than zero".to_string()));
        }
        Ok(())
    }
}
