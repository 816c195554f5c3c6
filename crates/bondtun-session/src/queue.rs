//! The bounded frame queue between ingress and distribution.
//!
//! This is the only state shared by two session units. A full queue blocks
//! the producer, which in turn stops reading from the endpoint: that is the
//! session's sole backpressure mechanism. Frames are never dropped.

use bondtun_frame::Frame;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::trace;

/// The consumer or producer side of the queue has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame queue closed")]
pub struct QueueClosed;

/// Create a bounded frame queue holding at most `capacity` frames.
pub fn frame_queue(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (FrameSender { tx }, FrameReceiver { rx })
}

/// Producer half, owned by the ingress reader.
#[derive(Debug)]
pub struct FrameSender {
    tx: mpsc::Sender<Frame>,
}

impl FrameSender {
    /// Push a frame, waiting while the queue is full.
    pub async fn push(&self, frame: Frame) -> Result<(), QueueClosed> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(frame)) => {
                trace!(capacity = self.capacity(), "frame queue saturated; waiting");
                self.tx.send(frame).await.map_err(|_| QueueClosed)
            }
            Err(TrySendError::Closed(_)) => Err(QueueClosed),
        }
    }

    /// Maximum number of queued frames.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Number of frames currently queued.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer half, owned by the link distributor.
#[derive(Debug)]
pub struct FrameReceiver {
    rx: mpsc::Receiver<Frame>,
}

impl FrameReceiver {
    /// Collect one distribution round into `round`.
    ///
    /// Waits until at least one frame is available, then takes whatever else
    /// is already queued, up to `max` frames in total. Never waits for the
    /// round to fill up. Returns `false` once the producer is gone and the
    /// queue is drained.
    pub async fn recv_round(&mut self, max: usize, round: &mut Vec<Frame>) -> bool {
        let Some(first) = self.rx.recv().await else {
            return false;
        };
        round.push(first);

        while round.len() < max {
            match self.rx.try_recv() {
                Ok(frame) => round.push(frame),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        true
    }

    /// Receive a single frame, waiting until one is available.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}
