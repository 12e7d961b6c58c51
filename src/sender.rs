//! The outbound frame funnel.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::RequestError;
use crate::frame::Frame;

/// Clone-able handle to the single outbound frame queue.
///
/// Every frame the requester emits goes through one of these; the transport
/// writer consumes the receiving end and serializes frames onto the wire in
/// queue order, which preserves per-stream emission order. The queue is
/// bounded, so producers wait when the writer falls behind.
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Frame>,
}

impl FrameSender {
    pub fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self { tx }
    }

    /// Enqueues a frame, waiting for queue space if needed.
    ///
    /// Used for terminal frames (CANCEL, ERROR, COMPLETE) that must still go
    /// out after a caller's cancellation has fired.
    pub async fn send(&self, frame: Frame) -> Result<(), RequestError> {
        self.tx.send(frame).await.map_err(|_| RequestError::Closed)
    }

    /// Enqueues a frame unless `cancel` fires first.
    ///
    /// An already-cancelled token wins over available queue space, so a
    /// canceled request never emits its initial frame.
    pub async fn send_cancellable(
        &self,
        cancel: &CancellationToken,
        frame: Frame,
    ) -> Result<(), RequestError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RequestError::Canceled),
            sent = self.tx.send(frame) => sent.map_err(|_| RequestError::Closed),
        }
    }
}
