use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: payload length (4, little-endian).
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size accepted from a link: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// One chunk of the bonded stream as carried by a single link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The chunk bytes, copied verbatim to the receiving endpoint.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Payload length in bytes (the value written in the header).
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty. Empty frames are never valid on the wire.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────────┐
/// │ Length       │ Payload          │
/// │ (4B LE)      │ (Length bytes)   │
/// └──────────────┴─────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.is_empty() {
        return Err(FrameError::EmptyFrame);
    }
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::FrameTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Validate a length header and return the payload length it announces.
///
/// This runs before any payload byte is read, so an oversized or empty
/// declaration never causes an allocation.
pub fn decode_length(header: [u8; HEADER_SIZE], max_frame_size: usize) -> Result<usize> {
    let len = u32::from_le_bytes(header) as usize;
    if len == 0 {
        return Err(FrameError::EmptyFrame);
    }
    if len > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }
    Ok(len)
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Upper bound on reading one whole frame. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
    /// Upper bound on writing one whole frame. `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let mut buf = BytesMut::new();
        encode_frame(b"abc", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_encode_appends_frames_back_to_back() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"second", &mut buf).unwrap();

        assert_eq!(buf.len(), 2 * HEADER_SIZE + 11);
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&buf[HEADER_SIZE + 5..2 * HEADER_SIZE + 5]);
        assert_eq!(decode_length(header, DEFAULT_MAX_FRAME_SIZE).unwrap(), 6);
    }

    #[test]
    fn test_encode_rejects_empty_payload() {
        let mut buf = BytesMut::new();
        let result = encode_frame(b"", &mut buf);
        assert!(matches!(result, Err(FrameError::EmptyFrame)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_length_too_large() {
        let result = decode_length((32u32 * 1024 * 1024).to_le_bytes(), DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(
            result,
            Err(FrameError::FrameTooLarge { size, max })
                if size == 32 * 1024 * 1024 && max == DEFAULT_MAX_FRAME_SIZE
        ));
    }

    #[test]
    fn test_decode_zero_length_is_violation() {
        let err = decode_length([0u8; HEADER_SIZE], DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_decode_length_at_bound() {
        assert_eq!(decode_length(2048u32.to_le_bytes(), 2048).unwrap(), 2048);
        assert!(matches!(
            decode_length(2049u32.to_le_bytes(), 2048),
            Err(FrameError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_frame_len() {
        let frame = Frame::new(Bytes::from_static(b"test"));
        assert_eq!(frame.len(), 4);
        assert!(!frame.is_empty());
    }
}
