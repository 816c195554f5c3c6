//! Endpoint side of the outbound direction.

use bondtun_frame::Frame;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::error::{Result, SessionError};
use crate::queue::FrameSender;
use crate::teardown::Teardown;

/// Reads the single endpoint and feeds the frame queue.
///
/// Every endpoint read becomes exactly one frame, so frame boundaries carry
/// no meaning beyond "at most `chunk_size` bytes".
pub struct IngressReader<R> {
    endpoint: R,
    queue: FrameSender,
    chunk_size: usize,
}

impl<R: AsyncRead + Unpin> IngressReader<R> {
    pub fn new(endpoint: R, queue: FrameSender, chunk_size: usize) -> Self {
        Self {
            endpoint,
            queue,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Run until the endpoint fails or the session is torn down.
    ///
    /// Returns `Ok(())` only when stopped by teardown. A zero-byte read is
    /// `EndpointClosed`.
    pub async fn run(mut self, teardown: Teardown) -> Result<()> {
        let mut frames = 0u64;
        let mut bytes = 0u64;

        let result = loop {
            let mut buf = BytesMut::zeroed(self.chunk_size);
            let read = tokio::select! {
                biased;
                _ = teardown.cancelled() => break Ok(()),
                read = self.endpoint.read(&mut buf) => read,
            };

            let n = match read {
                Ok(0) => break Err(SessionError::EndpointClosed),
                Ok(n) => n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => break Err(SessionError::EndpointIo(err)),
            };
            buf.truncate(n);

            let pushed = tokio::select! {
                biased;
                _ = teardown.cancelled() => break Ok(()),
                pushed = self.queue.push(Frame::new(buf.freeze())) => pushed,
            };
            if pushed.is_err() {
                break Err(SessionError::QueueClosed);
            }

            frames += 1;
            bytes += n as u64;
            trace!(len = n, queued = self.queue.len(), "endpoint chunk queued");
        };

        debug!(frames, bytes, "ingress stopped");
        if let Err(err) = &result {
            teardown.fire(format_args!("ingress: {err}"));
        }
        result
    }
}
