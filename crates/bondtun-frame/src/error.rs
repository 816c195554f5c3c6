use std::time::Duration;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared payload length exceeds the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A frame declared a zero-length payload.
    #[error("empty frame (zero-length payload)")]
    EmptyFrame,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read returned zero bytes: the peer closed the stream.
    #[error("connection closed")]
    ConnectionClosed,

    /// A frame did not complete within the configured timeout.
    #[error("frame I/O timed out after {0:?}")]
    TimedOut(Duration),
}

impl FrameError {
    /// Whether this error is a framing protocol violation rather than an
    /// I/O or lifecycle condition.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. } | Self::EmptyFrame)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
