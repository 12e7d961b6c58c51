//! The client-side requester: interaction operations and inbound dispatch.
//!
//! A `Requester` multiplexes every interaction over one frame transport. The
//! key invariant is that only the connection's read loop feeds
//! [`Requester::handle_frame`]. All inbound routing happens there, one frame
//! at a time, which is what preserves per-stream delivery order.
//!
//! ```text
//!                      ┌───────────────────────────────┐
//!                      │           Requester           │
//!                      ├───────────────────────────────┤
//!                      │  sender: FrameSender          │
//!                      │  streams: StreamRegistry      │
//!                      │    StreamId -> StreamHandle   │
//!                      └──────────────┬────────────────┘
//!                                     │
//!                               handle_frame
//!                                     │
//!            ┌────────────────────────┼───────────────────────┐
//!            │                        │                       │
//!      stream 0?                live stream?              no handle
//!            │                        │                       │
//!  ┌─────────▼─────────┐   ┌──────────▼──────────┐   ┌────────▼───────┐
//!  │ metadata sink, or │   │ StreamHandle::      │   │ drop the frame │
//!  │ connection error  │   │ on_frame            │   │ (late arrival) │
//!  └───────────────────┘   └─────────────────────┘   └────────────────┘
//! ```
//!
//! Outbound, every frame funnels through the single [`FrameSender`]; CHANNEL
//! streams additionally run one pump task each, reading the caller's source
//! and spending REQUEST_N credit.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorCode, RequestError};
use crate::frame::{Frame, StreamId};
use crate::handle::{FrameOutcome, StreamHandle, StreamKind};
use crate::payload::{Payload, PayloadResult};
use crate::registry::StreamRegistry;
use crate::sender::FrameSender;
use crate::stream_id::StreamIds;

/// Default inbound window for REQUEST_STREAM and REQUEST_CHANNEL.
pub const DEFAULT_INITIAL_REQUESTS: u32 = 16;

/// The client-side protocol core: five interaction operations over one
/// shared frame transport.
pub struct Requester {
    sender: FrameSender,
    streams: Arc<StreamRegistry>,
    initial_requests: u32,
    metadata_sink: Mutex<Option<mpsc::Sender<Bytes>>>,
}

impl Requester {
    /// Creates a requester that emits frames into `sender`.
    ///
    /// `ids` selects the id parity ([`StreamIds::client`] or
    /// [`StreamIds::server`]); `initial_requests` is the inbound window
    /// requested for streams and channels.
    pub fn new(sender: mpsc::Sender<Frame>, ids: StreamIds, initial_requests: u32) -> Self {
        Self {
            sender: FrameSender::new(sender),
            streams: Arc::new(StreamRegistry::new(ids)),
            initial_requests,
            metadata_sink: Mutex::new(None),
        }
    }

    /// Routes inbound stream-0 METADATA_PUSH frames to `sink`.
    ///
    /// Without a sink those frames are dropped.
    pub fn set_metadata_sink(&self, sink: mpsc::Sender<Bytes>) {
        *self.metadata_sink.lock() = Some(sink);
    }

    /// Number of currently registered streams.
    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    /// Ids of currently registered streams, sorted (for diagnostics).
    pub fn active_stream_ids(&self) -> Vec<StreamId> {
        self.streams.ids()
    }

    /// Sends a request that expects no response. No stream state is kept.
    pub async fn fire_and_forget(
        &self,
        ctx: &CancellationToken,
        payload: Payload,
    ) -> Result<(), RequestError> {
        if ctx.is_cancelled() {
            return Err(RequestError::Canceled);
        }
        let stream_id = self.streams.allocate()?;
        self.sender
            .send_cancellable(ctx, Frame::request_fnf(stream_id, payload))
            .await
    }

    /// Pushes connection-level metadata on stream 0.
    pub async fn metadata_push(
        &self,
        ctx: &CancellationToken,
        metadata: impl Into<Bytes>,
    ) -> Result<(), RequestError> {
        self.sender
            .send_cancellable(ctx, Frame::metadata_push(metadata))
            .await
    }

    /// Sends one request and waits for the single response payload.
    ///
    /// Cancellation after the request frame went out emits one CANCEL and
    /// returns [`RequestError::Canceled`]; the stream entry is removed on
    /// every exit path.
    pub async fn request_response(
        &self,
        ctx: &CancellationToken,
        payload: Payload,
    ) -> Result<Payload, RequestError> {
        if ctx.is_cancelled() {
            return Err(RequestError::Canceled);
        }
        let (handle, mut responses) = self.streams.register(|id| {
            StreamHandle::new(id, StreamKind::Response, self.sender.clone(), 0)
        })?;
        let mut guard = StreamGuard::new(self.streams.clone(), self.sender.clone(), handle.clone());

        self.sender
            .send_cancellable(ctx, Frame::request_response(handle.id(), payload))
            .await?;
        handle.opened();
        guard.request_sent();

        tokio::select! {
            _ = ctx.cancelled() => {
                guard.cancel_stream().await;
                Err(RequestError::Canceled)
            }
            result = responses.recv() => match result {
                Some(Ok(payload)) => Ok(payload),
                Some(Err(error)) if error.code == ErrorCode::Canceled => {
                    Err(RequestError::Canceled)
                }
                Some(Err(error)) => Err(RequestError::Remote(error)),
                None => Err(RequestError::Closed),
            },
        }
    }

    /// Starts a stream of responses.
    ///
    /// The returned source yields payloads in arrival order, then at most one
    /// terminal error, then closes. Dropping the source cancels the stream on
    /// the wire; so does cancelling `ctx`.
    pub async fn request_stream(
        &self,
        ctx: &CancellationToken,
        payload: Payload,
    ) -> Result<mpsc::Receiver<PayloadResult>, RequestError> {
        if ctx.is_cancelled() {
            return Err(RequestError::Canceled);
        }
        let (handle, responses) = self.streams.register(|id| {
            StreamHandle::new(
                id,
                StreamKind::Stream,
                self.sender.clone(),
                self.initial_requests,
            )
        })?;
        let mut guard = StreamGuard::new(self.streams.clone(), self.sender.clone(), handle.clone());

        let frame = Frame::request_stream(handle.id(), self.initial_requests, payload);
        self.sender.send_cancellable(ctx, frame).await?;
        handle.opened();
        guard.request_sent();

        self.spawn_cancel_watcher(ctx, handle);
        guard.disarm();
        Ok(responses)
    }

    /// Opens a bidirectional channel fed by `outbound`.
    ///
    /// An already-buffered first payload rides in the REQUEST_CHANNEL frame
    /// itself; a source that closed empty turns the request into an immediate
    /// half-close. Outbound payloads wait for REQUEST_N credit from the peer.
    pub async fn request_channel(
        &self,
        ctx: &CancellationToken,
        mut outbound: mpsc::Receiver<PayloadResult>,
    ) -> Result<mpsc::Receiver<PayloadResult>, RequestError> {
        if ctx.is_cancelled() {
            return Err(RequestError::Canceled);
        }
        let (handle, responses) = self.streams.register(|id| {
            StreamHandle::new(
                id,
                StreamKind::Channel,
                self.sender.clone(),
                self.initial_requests,
            )
        })?;
        let mut guard = StreamGuard::new(self.streams.clone(), self.sender.clone(), handle.clone());

        // Non-blocking peek at the caller's source for the embedded payload.
        let mut pending = None;
        let mut source_complete = false;
        let first = match outbound.try_recv() {
            Ok(Ok(payload)) => Some(payload),
            Ok(Err(error)) => {
                pending = Some(Err(error));
                None
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                source_complete = true;
                None
            }
        };

        let frame = Frame::request_channel(
            handle.id(),
            self.initial_requests,
            source_complete,
            first.unwrap_or_default(),
        );
        self.sender.send_cancellable(ctx, frame).await?;
        handle.opened();
        guard.request_sent();

        if source_complete {
            handle.close_local();
        } else {
            tokio::spawn(channel_pump(
                self.sender.clone(),
                self.streams.clone(),
                handle.clone(),
                outbound,
                pending,
            ));
        }
        self.spawn_cancel_watcher(ctx, handle);
        guard.disarm();
        Ok(responses)
    }

    /// Routes one decoded inbound frame.
    ///
    /// Called by the connection's read loop, one frame at a time; per-stream
    /// delivery order follows call order. Returns an error only for a
    /// connection-level ERROR frame, after tearing down every live stream.
    pub async fn handle_frame(&self, frame: Frame) -> Result<(), Error> {
        let stream_id = frame.stream_id();
        if stream_id == 0 {
            return self.handle_connection_frame(frame).await;
        }

        let Some(handle) = self.streams.lookup(stream_id) else {
            tracing::debug!(
                stream_id,
                frame_type = %frame.frame_type(),
                "dropping frame for unknown stream"
            );
            return Ok(());
        };

        if handle.on_frame(frame).await == FrameOutcome::Finished {
            self.streams.remove(stream_id);
            handle.finish();
        }
        Ok(())
    }

    async fn handle_connection_frame(&self, frame: Frame) -> Result<(), Error> {
        match frame {
            Frame::MetadataPush { metadata } => {
                let sink = self.metadata_sink.lock().clone();
                match sink {
                    Some(sink) => {
                        if sink.send(metadata).await.is_err() {
                            tracing::debug!("metadata sink dropped, discarding METADATA_PUSH");
                        }
                    }
                    None => tracing::debug!("no metadata sink, dropping METADATA_PUSH"),
                }
                Ok(())
            }
            Frame::Error { error, .. } => {
                tracing::warn!(code = %error.code, message = %error.message, "connection error from peer");
                self.close_with_error(Error::new(
                    ErrorCode::ConnectionError,
                    error.message.clone(),
                ));
                Err(error)
            }
            // The keepalive loop lives with the transport, not the core.
            Frame::Keepalive { .. } => Ok(()),
            other => {
                tracing::warn!(frame_type = %other.frame_type(), "unexpected frame on stream 0");
                Ok(())
            }
        }
    }

    /// Tears down every live stream with CONNECTION_CLOSE. Call when the
    /// transport drops.
    pub fn close(&self) {
        self.close_with_error(Error::connection_closed());
    }

    /// Tears down every live stream with the given terminal error.
    pub fn close_with_error(&self, error: Error) {
        for handle in self.streams.drain() {
            handle.try_deliver(Err(error.clone()));
            handle.finish();
        }
    }

    /// Propagates caller cancellation for source-returning operations: one
    /// CANCEL on the wire, one CANCELED result, then teardown. The watcher
    /// exits as soon as the stream closes for any other reason.
    fn spawn_cancel_watcher(&self, ctx: &CancellationToken, handle: Arc<StreamHandle>) {
        let ctx = ctx.clone();
        let sender = self.sender.clone();
        let streams = self.streams.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = handle.closed.cancelled() => {}
                _ = ctx.cancelled() => {
                    if streams.remove(handle.id()).is_some() {
                        if sender.send(Frame::cancel(handle.id())).await.is_err() {
                            tracing::debug!(stream_id = handle.id(), "sender closed during cancellation");
                        }
                        let _ = handle.deliver(Err(Error::canceled())).await;
                        handle.finish();
                    }
                }
            }
        });
    }
}

/// Forwards caller payloads onto the wire, one CHANNEL stream each.
///
/// Every NEXT payload spends one REQUEST_N permit. Source end-of-stream
/// half-closes with an empty COMPLETE; a source error is terminal for the
/// whole stream. The pump stops as soon as the handle's `closed` token fires.
async fn channel_pump(
    sender: FrameSender,
    streams: Arc<StreamRegistry>,
    handle: Arc<StreamHandle>,
    mut outbound: mpsc::Receiver<PayloadResult>,
    mut pending: Option<PayloadResult>,
) {
    loop {
        let item = match pending.take() {
            Some(item) => Some(item),
            None => tokio::select! {
                _ = handle.closed.cancelled() => return,
                item = outbound.recv() => item,
            },
        };

        match item {
            // Caller closed its side: half-close with an empty COMPLETE.
            None => {
                if sender.send(Frame::payload_complete(handle.id())).await.is_err() {
                    tracing::debug!(stream_id = handle.id(), "sender closed, dropping COMPLETE");
                }
                if handle.close_local() {
                    remove_stream(&streams, &handle);
                }
                return;
            }
            // Caller-side failure: terminal for the whole stream.
            Some(Err(error)) => {
                if sender.send(Frame::error(handle.id(), error)).await.is_err() {
                    tracing::debug!(stream_id = handle.id(), "sender closed, dropping ERROR");
                }
                remove_stream(&streams, &handle);
                return;
            }
            Some(Ok(payload)) => {
                let acquired = tokio::select! {
                    _ = handle.closed.cancelled() => return,
                    permit = handle.credit_out.acquire() => permit,
                };
                match acquired {
                    Ok(permit) => permit.forget(),
                    Err(_) => return,
                }
                if sender
                    .send(Frame::payload_next(handle.id(), payload, false))
                    .await
                    .is_err()
                {
                    remove_stream(&streams, &handle);
                    return;
                }
            }
        }
    }
}

fn remove_stream(streams: &StreamRegistry, handle: &StreamHandle) {
    streams.remove(handle.id());
    handle.finish();
}

/// Cleans up a stream whose caller left before the stream terminated.
///
/// Normal completion removes the registry entry first, making the guard a
/// no-op. If the entry is still present at drop (the caller's future was
/// dropped mid-wait), the guard removes it and, when the request frame
/// already went out, cancels the stream on the wire.
struct StreamGuard {
    streams: Arc<StreamRegistry>,
    sender: FrameSender,
    handle: Arc<StreamHandle>,
    sent: bool,
    armed: bool,
}

impl StreamGuard {
    fn new(streams: Arc<StreamRegistry>, sender: FrameSender, handle: Arc<StreamHandle>) -> Self {
        Self {
            streams,
            sender,
            handle,
            sent: false,
            armed: true,
        }
    }

    fn request_sent(&mut self) {
        self.sent = true;
    }

    /// Hands lifecycle ownership to the dispatcher and watcher tasks.
    fn disarm(&mut self) {
        self.armed = false;
    }

    /// Explicit caller-cancellation path: one CANCEL frame, then teardown.
    async fn cancel_stream(&mut self) {
        self.armed = false;
        if self.streams.remove(self.handle.id()).is_none() {
            return;
        }
        if self.sent && self.sender.send(Frame::cancel(self.handle.id())).await.is_err() {
            tracing::debug!(
                stream_id = self.handle.id(),
                "sender closed while canceling stream"
            );
        }
        self.handle.finish();
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.streams.remove(self.handle.id()).is_none() {
            return;
        }
        self.handle.finish();
        if self.sent {
            let sender = self.sender.clone();
            let stream_id = self.handle.id();
            tokio::spawn(async move {
                let _ = sender.send(Frame::cancel(stream_id)).await;
            });
        }
    }
}
