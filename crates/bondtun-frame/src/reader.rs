use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::{decode_length, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Reads complete frames from any `AsyncRead` stream.
///
/// Each frame is read as exactly `HEADER_SIZE` bytes followed by exactly the
/// announced payload length. Nothing past the current frame is consumed, so
/// the stream is always positioned at a frame boundary between calls.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: AsyncRead + Unpin> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when the stream ends, even
    /// at a frame boundary.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        match self.config.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_frame_inner())
                .await
                .map_err(|_| FrameError::TimedOut(limit))?,
            None => self.read_frame_inner().await,
        }
    }

    async fn read_frame_inner(&mut self) -> Result<Frame> {
        let mut header = [0u8; HEADER_SIZE];
        read_exact_or_closed(&mut self.inner, &mut header).await?;
        let len = decode_length(header, self.config.max_frame_size)?;

        let mut payload = BytesMut::zeroed(len);
        read_exact_or_closed(&mut self.inner, &mut payload).await?;

        Ok(Frame {
            payload: payload.freeze(),
        })
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

/// Fill `buf` completely from `reader`.
///
/// A read that returns zero bytes is always `ConnectionClosed`; it is never
/// treated as "no data yet".
pub async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0usize;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use bytes::{BufMut, BytesMut};
    use tokio::io::ReadBuf;

    use super::*;
    use crate::codec::encode_frame;

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[tokio::test]
    async fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"hello"])));
        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn read_multiple_frames_in_order() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"one", b"two", b"three"])));

        let f1 = reader.read_frame().await.unwrap();
        let f2 = reader.read_frame().await.unwrap();
        let f3 = reader.read_frame().await.unwrap();

        assert_eq!(f1.payload.as_ref(), b"one");
        assert_eq!(f2.payload.as_ref(), b"two");
        assert_eq!(f3.payload.as_ref(), b"three");
    }

    #[tokio::test]
    async fn reader_stops_at_frame_boundary() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"abc", b"defg"])));
        reader.read_frame().await.unwrap();
        assert_eq!(reader.get_ref().position(), (HEADER_SIZE + 3) as u64);
    }

    #[tokio::test]
    async fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[b"slow"]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.payload.as_ref(), b"slow");
    }

    #[tokio::test]
    async fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn connection_closed_mid_header() {
        let mut reader = FrameReader::new(Cursor::new(vec![0x10, 0x00]));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn connection_closed_mid_payload() {
        let mut partial = BytesMut::new();
        partial.put_u32_le(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn oversized_frame_rejected_before_payload_read() {
        let mut wire = BytesMut::new();
        wire.put_u32_le(1024);
        wire.put_slice(&[0xEE; 1024]);

        let cfg = FrameConfig {
            max_frame_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let err = reader.read_frame().await.unwrap_err();

        assert!(matches!(err, FrameError::FrameTooLarge { size: 1024, max: 16 }));
        assert_eq!(reader.get_ref().position(), HEADER_SIZE as u64);
    }

    #[tokio::test]
    async fn huge_declared_length_does_not_allocate() {
        // u32::MAX with no payload behind it: must fail on the header alone.
        let mut reader = FrameReader::new(Cursor::new(u32::MAX.to_le_bytes().to_vec()));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn zero_length_frame_rejected() {
        let mut reader = FrameReader::new(Cursor::new(vec![0, 0, 0, 0, b'x']));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::EmptyFrame));
    }

    #[tokio::test]
    async fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(&[b"ok"])),
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().await.unwrap();
        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn read_timeout_fires_on_idle_stream() {
        let (_keep_open, idle) = tokio::io::duplex(64);
        let cfg = FrameConfig {
            read_timeout: Some(Duration::from_millis(20)),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(idle, cfg);

        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::TimedOut(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn roundtrip_over_duplex() {
        let (left, right) = tokio::io::duplex(16);
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let send = tokio::spawn(async move {
            for i in 0..32u32 {
                let payload = format!("chunk-{i}");
                writer.send(payload.as_bytes()).await.unwrap();
            }
        });

        for i in 0..32u32 {
            let frame = reader.read_frame().await.unwrap();
            assert_eq!(frame.payload.as_ref(), format!("chunk-{i}").as_bytes());
        }
        send.await.unwrap();
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for ByteByByteReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.pos < self.bytes.len() && buf.remaining() > 0 {
                let byte = self.bytes[self.pos];
                buf.put_slice(&[byte]);
                self.pos += 1;
            }
            Poll::Ready(Ok(()))
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl AsyncRead for InterruptedThenData {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if !self.interrupted {
                self.interrupted = true;
                return Poll::Ready(Err(std::io::Error::from(ErrorKind::Interrupted)));
            }
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }
}
