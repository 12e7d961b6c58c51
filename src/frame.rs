//! Typed frame values for the RSocket 1.0 wire protocol.
//!
//! The requester core consumes and produces these typed values; the binary
//! encoding lives in [`crate::codec`]. Each frame addresses a stream by its
//! 31-bit identifier; stream 0 is reserved for connection-wide frames.

use std::time::Duration;

use bytes::Bytes;

use crate::error::Error;
use crate::payload::Payload;

/// A 31-bit stream identifier. Client-initiated streams use odd ids,
/// server-initiated streams even ids.
pub type StreamId = u32;

/// The largest legal stream identifier (2^31 - 1).
pub const MAX_STREAM_ID: StreamId = (1 << 31) - 1;

/// Stream 0 carries connection-wide frames: SETUP, KEEPALIVE, METADATA_PUSH,
/// and connection-level ERROR.
pub const CONNECTION_STREAM_ID: StreamId = 0;

/// The 6-bit frame type of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Setup = 0x01,
    Keepalive = 0x03,
    RequestResponse = 0x04,
    RequestFnf = 0x05,
    RequestStream = 0x06,
    RequestChannel = 0x07,
    RequestN = 0x08,
    Cancel = 0x09,
    Payload = 0x0A,
    Error = 0x0B,
    MetadataPush = 0x0C,
}

impl FrameType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Setup),
            0x03 => Some(Self::Keepalive),
            0x04 => Some(Self::RequestResponse),
            0x05 => Some(Self::RequestFnf),
            0x06 => Some(Self::RequestStream),
            0x07 => Some(Self::RequestChannel),
            0x08 => Some(Self::RequestN),
            0x09 => Some(Self::Cancel),
            0x0A => Some(Self::Payload),
            0x0B => Some(Self::Error),
            0x0C => Some(Self::MetadataPush),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => write!(f, "SETUP"),
            Self::Keepalive => write!(f, "KEEPALIVE"),
            Self::RequestResponse => write!(f, "REQUEST_RESPONSE"),
            Self::RequestFnf => write!(f, "REQUEST_FNF"),
            Self::RequestStream => write!(f, "REQUEST_STREAM"),
            Self::RequestChannel => write!(f, "REQUEST_CHANNEL"),
            Self::RequestN => write!(f, "REQUEST_N"),
            Self::Cancel => write!(f, "CANCEL"),
            Self::Payload => write!(f, "PAYLOAD"),
            Self::Error => write!(f, "ERROR"),
            Self::MetadataPush => write!(f, "METADATA_PUSH"),
        }
    }
}

bitflags::bitflags! {
    /// The 10-bit flag word of a frame header.
    ///
    /// Bits 0x080 and 0x040 are reused across frame types: FOLLOWS,
    /// RESUME_ENABLE and RESPOND share a bit, as do COMPLETE and LEASE.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FrameFlags: u16 {
        /// The receiver may ignore this frame if it does not understand it.
        const IGNORE = 0x200;
        /// The frame carries a metadata section.
        const METADATA = 0x100;
        /// More fragments of this payload follow.
        const FOLLOWS = 0x080;
        /// SETUP: the client wants to resume this connection later.
        const RESUME_ENABLE = 0x080;
        /// KEEPALIVE: the receiver must answer with its own KEEPALIVE.
        const RESPOND = 0x080;
        /// The stream half is complete.
        const COMPLETE = 0x040;
        /// SETUP: the client honors LEASE frames.
        const LEASE = 0x040;
        /// PAYLOAD: the frame carries a payload item.
        const NEXT = 0x020;
    }
}

/// One decoded RSocket frame.
///
/// The inbound dispatcher pattern-matches on the variant; the codec maps each
/// variant to its wire layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Setup {
        keepalive_interval: Duration,
        max_lifetime: Duration,
        resume_token: Option<Bytes>,
        lease: bool,
        metadata_mime_type: String,
        data_mime_type: String,
        payload: Payload,
    },
    Keepalive {
        respond: bool,
        last_received_position: u64,
        data: Bytes,
    },
    RequestResponse {
        stream_id: StreamId,
        follows: bool,
        payload: Payload,
    },
    RequestFnf {
        stream_id: StreamId,
        follows: bool,
        payload: Payload,
    },
    RequestStream {
        stream_id: StreamId,
        follows: bool,
        initial_requests: u32,
        payload: Payload,
    },
    RequestChannel {
        stream_id: StreamId,
        follows: bool,
        complete: bool,
        initial_requests: u32,
        payload: Payload,
    },
    RequestN {
        stream_id: StreamId,
        n: u32,
    },
    Cancel {
        stream_id: StreamId,
    },
    Payload {
        stream_id: StreamId,
        follows: bool,
        complete: bool,
        next: bool,
        payload: Payload,
    },
    Error {
        stream_id: StreamId,
        error: Error,
    },
    MetadataPush {
        metadata: Bytes,
    },
}

impl Frame {
    pub fn request_response(stream_id: StreamId, payload: Payload) -> Self {
        Self::RequestResponse {
            stream_id,
            follows: false,
            payload,
        }
    }

    pub fn request_fnf(stream_id: StreamId, payload: Payload) -> Self {
        Self::RequestFnf {
            stream_id,
            follows: false,
            payload,
        }
    }

    pub fn request_stream(stream_id: StreamId, initial_requests: u32, payload: Payload) -> Self {
        Self::RequestStream {
            stream_id,
            follows: false,
            initial_requests,
            payload,
        }
    }

    pub fn request_channel(
        stream_id: StreamId,
        initial_requests: u32,
        complete: bool,
        payload: Payload,
    ) -> Self {
        Self::RequestChannel {
            stream_id,
            follows: false,
            complete,
            initial_requests,
            payload,
        }
    }

    pub fn request_n(stream_id: StreamId, n: u32) -> Self {
        Self::RequestN { stream_id, n }
    }

    pub fn cancel(stream_id: StreamId) -> Self {
        Self::Cancel { stream_id }
    }

    /// A PAYLOAD frame carrying one item, optionally completing the stream.
    pub fn payload_next(stream_id: StreamId, payload: Payload, complete: bool) -> Self {
        Self::Payload {
            stream_id,
            follows: false,
            complete,
            next: true,
            payload,
        }
    }

    /// A bare COMPLETE frame: no item, just the half-close.
    pub fn payload_complete(stream_id: StreamId) -> Self {
        Self::Payload {
            stream_id,
            follows: false,
            complete: true,
            next: false,
            payload: Payload::empty(),
        }
    }

    pub fn error(stream_id: StreamId, error: Error) -> Self {
        Self::Error { stream_id, error }
    }

    pub fn metadata_push(metadata: impl Into<Bytes>) -> Self {
        Self::MetadataPush {
            metadata: metadata.into(),
        }
    }

    /// The stream this frame addresses; 0 for connection-wide frames.
    pub fn stream_id(&self) -> StreamId {
        match self {
            Self::Setup { .. } | Self::Keepalive { .. } | Self::MetadataPush { .. } => {
                CONNECTION_STREAM_ID
            }
            Self::RequestResponse { stream_id, .. }
            | Self::RequestFnf { stream_id, .. }
            | Self::RequestStream { stream_id, .. }
            | Self::RequestChannel { stream_id, .. }
            | Self::RequestN { stream_id, .. }
            | Self::Cancel { stream_id }
            | Self::Payload { stream_id, .. }
            | Self::Error { stream_id, .. } => *stream_id,
        }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Setup { .. } => FrameType::Setup,
            Self::Keepalive { .. } => FrameType::Keepalive,
            Self::RequestResponse { .. } => FrameType::RequestResponse,
            Self::RequestFnf { .. } => FrameType::RequestFnf,
            Self::RequestStream { .. } => FrameType::RequestStream,
            Self::RequestChannel { .. } => FrameType::RequestChannel,
            Self::RequestN { .. } => FrameType::RequestN,
            Self::Cancel { .. } => FrameType::Cancel,
            Self::Payload { .. } => FrameType::Payload,
            Self::Error { .. } => FrameType::Error,
            Self::MetadataPush { .. } => FrameType::MetadataPush,
        }
    }

    /// The flag word this frame encodes with.
    pub fn flags(&self) -> FrameFlags {
        let mut flags = FrameFlags::empty();
        match self {
            Self::Setup {
                resume_token,
                lease,
                payload,
                ..
            } => {
                if payload.has_metadata() {
                    flags |= FrameFlags::METADATA;
                }
                if resume_token.is_some() {
                    flags |= FrameFlags::RESUME_ENABLE;
                }
                if *lease {
                    flags |= FrameFlags::LEASE;
                }
            }
            Self::Keepalive { respond, .. } => {
                if *respond {
                    flags |= FrameFlags::RESPOND;
                }
            }
            Self::RequestResponse {
                follows, payload, ..
            }
            | Self::RequestFnf {
                follows, payload, ..
            }
            | Self::RequestStream {
                follows, payload, ..
            } => {
                if payload.has_metadata() {
                    flags |= FrameFlags::METADATA;
                }
                if *follows {
                    flags |= FrameFlags::FOLLOWS;
                }
            }
            Self::RequestChannel {
                follows,
                complete,
                payload,
                ..
            } => {
                if payload.has_metadata() {
                    flags |= FrameFlags::METADATA;
                }
                if *follows {
                    flags |= FrameFlags::FOLLOWS;
                }
                if *complete {
                    flags |= FrameFlags::COMPLETE;
                }
            }
            Self::Payload {
                follows,
                complete,
                next,
                payload,
                ..
            } => {
                if payload.has_metadata() {
                    flags |= FrameFlags::METADATA;
                }
                if *follows {
                    flags |= FrameFlags::FOLLOWS;
                }
                if *complete {
                    flags |= FrameFlags::COMPLETE;
                }
                if *next {
                    flags |= FrameFlags::NEXT;
                }
            }
            Self::RequestN { .. } | Self::Cancel { .. } | Self::Error { .. } => {}
            Self::MetadataPush { .. } => flags |= FrameFlags::METADATA,
        }
        flags
    }
}
