//! Outbound direction: queued frames fanned out across the links.

use bondtun_frame::{Frame, FrameWriter};
use futures_util::future::try_join_all;
use tokio::io::AsyncWrite;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};
use crate::queue::FrameReceiver;
use crate::teardown::Teardown;

/// Deals queued frames across the link set in canonical cyclic order.
///
/// The cursor persists across rounds, so the k-th frame ever taken from the
/// queue is written to link `k mod N` regardless of how rounds were sized.
/// All writes of a round run concurrently and the next round starts only
/// once every one of them has completed.
pub struct LinkDistributor<W> {
    links: Vec<FrameWriter<W>>,
    cursor: usize,
    frames_sent: u64,
}

impl<W: AsyncWrite + Unpin> LinkDistributor<W> {
    /// `links` must be in canonical order and non-empty.
    pub fn new(links: Vec<FrameWriter<W>>) -> Self {
        debug_assert!(!links.is_empty(), "link set must not be empty");
        Self {
            links,
            cursor: 0,
            frames_sent: 0,
        }
    }

    /// Position of the link that receives the next frame.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Write one round of at most `N` frames, one per link, starting at the
    /// cursor. Drains `round`.
    pub async fn write_round(&mut self, round: &mut Vec<Frame>) -> Result<()> {
        let n = self.links.len();
        let count = round.len();
        debug_assert!(count <= n, "a round carries at most one frame per link");

        let mut slots: Vec<Option<Frame>> = vec![None; n];
        for (offset, frame) in round.drain(..).enumerate() {
            slots[(self.cursor + offset) % n] = Some(frame);
        }

        let writes = self
            .links
            .iter_mut()
            .zip(slots.iter())
            .enumerate()
            .filter_map(|(index, (link, slot))| {
                slot.as_ref().map(|frame| async move {
                    link.write_frame(frame)
                        .await
                        .map_err(|source| SessionError::Link { index, source })
                })
            });
        try_join_all(writes).await?;

        trace!(cursor = self.cursor, frames = count, "round written");
        self.cursor = (self.cursor + count) % n;
        self.frames_sent += count as u64;
        Ok(())
    }

    /// Run until the queue closes, a link write fails, or the session is
    /// torn down. Returns `Ok(())` only when stopped by teardown.
    pub async fn run(mut self, mut queue: FrameReceiver, teardown: Teardown) -> Result<()> {
        let n = self.links.len();
        let mut round = Vec::with_capacity(n);

        let result = loop {
            round.clear();
            let open = tokio::select! {
                biased;
                _ = teardown.cancelled() => break Ok(()),
                open = queue.recv_round(n, &mut round) => open,
            };
            if !open {
                break Err(SessionError::QueueClosed);
            }

            let written = tokio::select! {
                biased;
                _ = teardown.cancelled() => break Ok(()),
                written = self.write_round(&mut round) => written,
            };
            if let Err(err) = written {
                break Err(err);
            }
        };

        debug!(frames = self.frames_sent, "distributor stopped");
        if let Err(err) = &result {
            teardown.fire(format_args!("distributor: {err}"));
        }
        result
    }
}
