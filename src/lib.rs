//! rsocket-core: client-side requester core and frame codec for RSocket 1.0.
//!
//! This crate implements the protocol state machine that multiplexes the
//! RSocket interaction models (fire-and-forget, request/response,
//! request/stream, request/channel, and metadata push) over a single
//! bidirectional frame transport:
//!
//! - Typed frame values ([`Frame`]) and their binary wire codec
//! - Stream-id allocation ([`StreamIds`]) over the shared 31-bit id space
//! - Per-stream lifecycle, REQUEST_N flow control in both directions, and
//!   cancellation from either side
//! - The [`Requester`] facade and its inbound frame dispatcher
//!
//! Transports, connection setup, keepalive scheduling, and the server-side
//! responder are out of scope; the requester consumes decoded [`Frame`]
//! values and emits frames into an `mpsc` queue drained by a transport
//! writer.
//!
//! # Usage
//!
//! ```ignore
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//! let requester = Arc::new(Requester::new(tx, StreamIds::client(), 16));
//!
//! // Transport writer: drain `rx`, encode, write to the wire.
//! // Transport reader: decode frames and feed the dispatcher.
//! tokio::spawn({
//!     let requester = requester.clone();
//!     async move {
//!         while let Some(frame) = decoded_frames.recv().await {
//!             requester.handle_frame(frame).await?;
//!         }
//!         requester.close();
//!     }
//! });
//!
//! let ctx = CancellationToken::new();
//! let response = requester
//!     .request_response(&ctx, Payload::text("ping"))
//!     .await?;
//! ```

#![forbid(unsafe_code)]

mod codec;
mod error;
mod frame;
mod handle;
mod payload;
mod registry;
mod requester;
mod sender;
mod stream_id;

pub use error::{DecodeError, Error, ErrorCode, RequestError};
pub use frame::{Frame, FrameFlags, FrameType, StreamId, CONNECTION_STREAM_ID, MAX_STREAM_ID};
pub use payload::{Payload, PayloadResult};
pub use requester::{Requester, DEFAULT_INITIAL_REQUESTS};
pub use sender::FrameSender;
pub use stream_id::StreamIds;
