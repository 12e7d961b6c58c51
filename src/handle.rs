//! Per-stream state: mailbox, lifecycle, and flow-control windows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorCode};
use crate::frame::{Frame, StreamId};
use crate::payload::{Payload, PayloadResult};
use crate::sender::FrameSender;

/// Interaction model of a stream, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamKind {
    /// REQUEST_RESPONSE: exactly one terminal inbound event.
    Response,
    /// REQUEST_STREAM: a sequence of inbound payloads, then a terminal.
    Stream,
    /// REQUEST_CHANNEL: payloads flow both ways, credit-gated.
    Channel,
}

/// Lifecycle of a stream.
///
/// RESPONSE and STREAM requesters send nothing on the stream after the
/// initial request frame (CANCEL aside), so a successful enqueue moves them
/// straight to `HalfClosedLocal`; only CHANNEL streams dwell in `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamState {
    Opening,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

/// What the dispatcher should do with a handle after applying a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameOutcome {
    Kept,
    /// The stream is fully terminated; remove it from the registry.
    Finished,
}

/// State for one live stream.
///
/// The inbound mailbox has a single writer (the dispatcher) and a single
/// reader (the caller's source); the mailbox sender is taken exactly once at
/// closure, so a closed source is observable and idempotent. The outbound
/// credit semaphore starts empty and only REQUEST_N grants add permits.
pub(crate) struct StreamHandle {
    id: StreamId,
    kind: StreamKind,
    sender: FrameSender,
    inbound: Mutex<Option<mpsc::Sender<PayloadResult>>>,
    state: Mutex<StreamState>,
    /// Remaining inbound window; replenished with a REQUEST_N grant at zero.
    credit_in: Mutex<u32>,
    /// Window size used for the initial request and replenishment grants.
    initial_requests: u32,
    /// Outbound credit for CHANNEL streams.
    pub(crate) credit_out: Semaphore,
    /// Cancelled once the stream is fully closed and removed; stops the
    /// channel pump and the cancellation watcher.
    pub(crate) closed: CancellationToken,
    /// RESPONSE streams: a NEXT payload has already been delivered.
    response_delivered: AtomicBool,
}

impl StreamHandle {
    pub fn new(
        id: StreamId,
        kind: StreamKind,
        sender: FrameSender,
        initial_requests: u32,
    ) -> (Arc<Self>, mpsc::Receiver<PayloadResult>) {
        // Mailbox capacity matches the inbound window, so a peer honoring
        // credit never blocks the dispatcher on an unconsumed mailbox.
        let capacity = match kind {
            StreamKind::Response => 1,
            StreamKind::Stream | StreamKind::Channel => initial_requests.max(1) as usize,
        };
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Arc::new(Self {
            id,
            kind,
            sender,
            inbound: Mutex::new(Some(tx)),
            state: Mutex::new(StreamState::Opening),
            credit_in: Mutex::new(initial_requests),
            initial_requests,
            credit_out: Semaphore::new(0),
            closed: CancellationToken::new(),
            response_delivered: AtomicBool::new(false),
        });
        (handle, rx)
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    #[cfg(test)]
    pub fn state(&self) -> StreamState {
        *self.state.lock()
    }

    /// Marks the initial request frame as enqueued.
    pub fn opened(&self) {
        let mut state = self.state.lock();
        if *state != StreamState::Opening {
            return;
        }
        *state = match self.kind {
            StreamKind::Channel => StreamState::Open,
            StreamKind::Response | StreamKind::Stream => StreamState::HalfClosedLocal,
        };
    }

    /// Marks the local half finished. Returns true once the stream is fully
    /// closed.
    pub fn close_local(&self) -> bool {
        let mut state = self.state.lock();
        *state = match *state {
            StreamState::HalfClosedRemote | StreamState::Closed => StreamState::Closed,
            _ => StreamState::HalfClosedLocal,
        };
        *state == StreamState::Closed
    }

    /// Marks the remote half finished. Returns true once the stream is fully
    /// closed.
    pub fn close_remote(&self) -> bool {
        let mut state = self.state.lock();
        *state = match *state {
            StreamState::HalfClosedLocal | StreamState::Closed => StreamState::Closed,
            _ => StreamState::HalfClosedRemote,
        };
        *state == StreamState::Closed
    }

    fn is_terminal(&self) -> bool {
        *self.state.lock() == StreamState::Closed
    }

    /// Delivers one result to the caller, in arrival order.
    ///
    /// Fails when the caller has dropped its source.
    pub async fn deliver(&self, item: PayloadResult) -> Result<(), ()> {
        let tx = self.inbound.lock().clone();
        match tx {
            Some(tx) => tx.send(item).await.map_err(|_| ()),
            None => Err(()),
        }
    }

    /// Delivers without waiting; used during connection teardown so one
    /// stalled consumer cannot hold up the rest.
    pub fn try_deliver(&self, item: PayloadResult) {
        if let Some(tx) = self.inbound.lock().clone() {
            if tx.try_send(item).is_err() {
                tracing::debug!(stream_id = self.id, "mailbox full, dropping teardown result");
            }
        }
    }

    /// Closes the caller-facing source. Idempotent.
    pub fn close_inbound(&self) {
        self.inbound.lock().take();
    }

    /// Final cleanup once the registry entry is gone.
    pub fn finish(&self) {
        *self.state.lock() = StreamState::Closed;
        self.close_inbound();
        self.closed.cancel();
    }

    /// Applies one inbound frame to this stream.
    pub async fn on_frame(&self, frame: Frame) -> FrameOutcome {
        match frame {
            Frame::Payload {
                complete,
                next,
                payload,
                ..
            } => self.on_payload(next, complete, payload).await,
            Frame::Error { error, .. } => self.on_error(error).await,
            Frame::Cancel { .. } => self.on_cancel().await,
            Frame::RequestN { n, .. } => self.on_request_n(n).await,
            other => {
                self.protocol_violation(format!(
                    "unexpected {} frame on stream {}",
                    other.frame_type(),
                    self.id
                ))
                .await
            }
        }
    }

    async fn on_payload(&self, next: bool, complete: bool, payload: Payload) -> FrameOutcome {
        if !next && !complete {
            return self
                .protocol_violation("PAYLOAD frame with neither NEXT nor COMPLETE".into())
                .await;
        }

        if next {
            if self.kind == StreamKind::Response
                && self.response_delivered.swap(true, Ordering::AcqRel)
            {
                return self
                    .protocol_violation("second payload on a request/response stream".into())
                    .await;
            }

            {
                let mut state = self.state.lock();
                if *state == StreamState::Opening {
                    *state = StreamState::Open;
                }
            }

            if self.deliver(Ok(payload)).await.is_err() {
                return self.consumer_gone().await;
            }

            if self.kind != StreamKind::Response && !complete {
                self.consume_credit().await;
            }
        }

        if complete {
            self.close_inbound();
            if self.close_remote() {
                FrameOutcome::Finished
            } else {
                FrameOutcome::Kept
            }
        } else {
            FrameOutcome::Kept
        }
    }

    /// Peer ERROR: terminal for both halves of the stream.
    async fn on_error(&self, error: Error) -> FrameOutcome {
        if self.deliver(Err(error)).await.is_err() {
            tracing::debug!(stream_id = self.id, "consumer gone before terminal error");
        }
        self.close_inbound();
        FrameOutcome::Finished
    }

    /// Peer CANCEL of a stream we initiated: terminal for both halves.
    async fn on_cancel(&self) -> FrameOutcome {
        let _ = self.deliver(Err(Error::canceled())).await;
        self.close_inbound();
        FrameOutcome::Finished
    }

    async fn on_request_n(&self, n: u32) -> FrameOutcome {
        if n == 0 {
            return self
                .protocol_violation("REQUEST_N with a zero request count".into())
                .await;
        }
        if self.kind == StreamKind::Channel {
            self.credit_out.add_permits(n as usize);
        }
        // RESPONSE and STREAM requesters produce no payloads, nothing to wake.
        FrameOutcome::Kept
    }

    /// Accounts one inbound payload against the window, replenishing the
    /// peer's send credit once the window is spent.
    async fn consume_credit(&self) {
        let grant = {
            let mut credit = self.credit_in.lock();
            *credit = credit.saturating_sub(1);
            if *credit == 0 && self.initial_requests > 0 {
                *credit = self.initial_requests;
                true
            } else {
                false
            }
        };
        if grant
            && self
                .sender
                .send(Frame::request_n(self.id, self.initial_requests))
                .await
                .is_err()
        {
            tracing::debug!(stream_id = self.id, "sender closed, skipping REQUEST_N grant");
        }
    }

    /// A protocol-violating inbound frame: surface INVALID to the caller,
    /// notify the peer if the stream was still open, and close.
    async fn protocol_violation(&self, message: String) -> FrameOutcome {
        tracing::warn!(stream_id = self.id, %message, "protocol violation");
        let error = Error::new(ErrorCode::Invalid, message);
        let _ = self.deliver(Err(error.clone())).await;
        self.close_inbound();
        if !self.is_terminal() && self.sender.send(Frame::error(self.id, error)).await.is_err() {
            tracing::debug!(stream_id = self.id, "sender closed, dropping INVALID error");
        }
        FrameOutcome::Finished
    }

    /// The caller dropped its source while the peer still considers the
    /// stream open: cancel on the wire and tear the stream down.
    async fn consumer_gone(&self) -> FrameOutcome {
        tracing::debug!(stream_id = self.id, "consumer dropped the source, canceling stream");
        if !self.is_terminal() && self.sender.send(Frame::cancel(self.id)).await.is_err() {
            tracing::debug!(stream_id = self.id, "sender closed, dropping CANCEL");
        }
        FrameOutcome::Finished
    }
}
