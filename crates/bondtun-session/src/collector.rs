//! Inbound direction: frames from every link merged back onto the endpoint.

use bondtun_frame::{Frame, FrameReader};
use futures_util::future::try_join_all;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};
use crate::teardown::Teardown;

/// Reassembles the bonded stream onto the single endpoint.
///
/// Frames are delivered in the canonical cyclic order, one per link, and
/// delivery blocks until the link being visited has a frame. Every link has
/// its own reader that hands frames over through a channel of depth one, so
/// a link runs at most one frame ahead of the visit and the rest waits in
/// its socket buffer. A link that closes or breaks framing stops the
/// collector whether or not it is the one being visited.
pub struct LinkCollector<R, E> {
    links: Vec<FrameReader<R>>,
    endpoint: E,
}

impl<R, E> LinkCollector<R, E>
where
    R: AsyncRead + Unpin,
    E: AsyncWrite + Unpin,
{
    /// `links` must be in canonical order and non-empty.
    pub fn new(links: Vec<FrameReader<R>>, endpoint: E) -> Self {
        debug_assert!(!links.is_empty(), "link set must not be empty");
        Self { links, endpoint }
    }

    /// Run until a link or the endpoint fails, or the session is torn down.
    /// Returns `Ok(())` only when stopped by teardown.
    pub async fn run(self, teardown: Teardown) -> Result<()> {
        let Self { links, mut endpoint } = self;

        let (handoffs, mut pending): (Vec<_>, Vec<_>) =
            links.iter().map(|_| mpsc::channel::<Frame>(1)).unzip();
        let readers = try_join_all(
            links
                .into_iter()
                .zip(handoffs)
                .enumerate()
                .map(|(index, (link, handoff))| read_link(index, link, handoff)),
        );

        let mut delivered = 0u64;
        let result = tokio::select! {
            biased;
            _ = teardown.cancelled() => Ok(()),
            read = readers => read.map(drop),
            written = deliver(&mut pending, &mut endpoint, &mut delivered) => written,
        };

        debug!(frames = delivered, "collector stopped");
        if let Err(err) = &result {
            teardown.fire(format_args!("collector: {err}"));
        }
        if let Err(err) = endpoint.shutdown().await {
            debug!(error = %err, "endpoint shutdown failed");
        }
        result
    }
}

/// Read frames from one link and hand them to the delivery loop. Returns
/// `Ok(())` once delivery has stopped listening.
async fn read_link<R>(
    index: usize,
    mut link: FrameReader<R>,
    handoff: mpsc::Sender<Frame>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = link
            .read_frame()
            .await
            .map_err(|source| SessionError::Link { index, source })?;
        if handoff.send(frame).await.is_err() {
            return Ok(());
        }
    }
}

/// Take one frame per link in cyclic order and append each to the endpoint.
async fn deliver<E>(
    pending: &mut [mpsc::Receiver<Frame>],
    endpoint: &mut E,
    delivered: &mut u64,
) -> Result<()>
where
    E: AsyncWrite + Unpin,
{
    let mut position = 0;
    loop {
        let Some(frame) = pending[position].recv().await else {
            // The link reader stopped; its error ends the collector.
            return std::future::pending().await;
        };
        endpoint
            .write_all(&frame.payload)
            .await
            .map_err(SessionError::EndpointIo)?;

        trace!(link = position, len = frame.len(), "frame delivered to endpoint");
        position = (position + 1) % pending.len();
        *delivered += 1;
    }
}
