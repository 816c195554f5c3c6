use bondtun_frame::FrameError;
use bondtun_transport::TransportError;

/// Errors raised while loading or validating session configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration declares no sessions.
    #[error("config declares no sessions")]
    NoSessions,

    /// Two sessions share a name.
    #[error("duplicate session name `{0}`")]
    DuplicateSession(String),

    /// A session's settings are inconsistent.
    #[error("session `{session}`: {reason}")]
    Invalid { session: String, reason: String },
}

/// Errors that end a bonded session.
///
/// Every variant is fatal to the session that raised it. Nothing is retried
/// locally; recovery means establishing a fresh session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Invalid session configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The session listener could not be bound.
    #[error("listener bind failed: {0}")]
    Bind(#[source] TransportError),

    /// Accepting or dialing the single endpoint failed.
    #[error("endpoint setup failed: {0}")]
    EndpointSetup(#[source] TransportError),

    /// Accepting or dialing one link failed during establishment.
    #[error("link {index} setup failed: {source}")]
    LinkSetup {
        index: usize,
        #[source]
        source: TransportError,
    },

    /// A link failed while the session was running.
    #[error("link {index}: {source}")]
    Link {
        index: usize,
        #[source]
        source: FrameError,
    },

    /// The endpoint returned a zero-byte read.
    #[error("endpoint closed the connection")]
    EndpointClosed,

    /// An I/O error occurred on the endpoint.
    #[error("endpoint I/O error: {0}")]
    EndpointIo(#[source] std::io::Error),

    /// The other side of the frame queue went away.
    #[error("frame queue closed")]
    QueueClosed,

    /// A session task panicked or was aborted.
    #[error("session task `{unit}` failed: {reason}")]
    UnitFailed { unit: &'static str, reason: String },
}

impl SessionError {
    /// Whether this error is only a consequence of a sibling unit stopping.
    ///
    /// Secondary errors are never reported as the cause of a teardown when a
    /// primary error is also available.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::QueueClosed)
    }

    /// Whether this error happened before the session reached `Running`.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Bind(_) | Self::EndpointSetup(_) | Self::LinkSetup { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
