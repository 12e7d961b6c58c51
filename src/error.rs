//! Error codes and error types.

use core::fmt;

/// RSocket 1.0 error codes carried by ERROR frames.
///
/// Setup codes (0x001-0x004) and connection codes (0x101-0x102) are only
/// legal on stream 0; the remaining codes terminate a single stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    InvalidSetup = 0x0000_0001,
    UnsupportedSetup = 0x0000_0002,
    RejectedSetup = 0x0000_0003,
    RejectedResume = 0x0000_0004,
    ConnectionError = 0x0000_0101,
    ConnectionClose = 0x0000_0102,
    ApplicationError = 0x0000_0201,
    Rejected = 0x0000_0202,
    Canceled = 0x0000_0203,
    Invalid = 0x0000_0204,
}

impl ErrorCode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x0000_0001 => Some(Self::InvalidSetup),
            0x0000_0002 => Some(Self::UnsupportedSetup),
            0x0000_0003 => Some(Self::RejectedSetup),
            0x0000_0004 => Some(Self::RejectedResume),
            0x0000_0101 => Some(Self::ConnectionError),
            0x0000_0102 => Some(Self::ConnectionClose),
            0x0000_0201 => Some(Self::ApplicationError),
            0x0000_0202 => Some(Self::Rejected),
            0x0000_0203 => Some(Self::Canceled),
            0x0000_0204 => Some(Self::Invalid),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSetup => write!(f, "INVALID_SETUP"),
            Self::UnsupportedSetup => write!(f, "UNSUPPORTED_SETUP"),
            Self::RejectedSetup => write!(f, "REJECTED_SETUP"),
            Self::RejectedResume => write!(f, "REJECTED_RESUME"),
            Self::ConnectionError => write!(f, "CONNECTION_ERROR"),
            Self::ConnectionClose => write!(f, "CONNECTION_CLOSE"),
            Self::ApplicationError => write!(f, "APPLICATION_ERROR"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Invalid => write!(f, "INVALID"),
        }
    }
}

/// A terminal stream error: an RSocket error code plus a UTF-8 message.
///
/// This is both the payload of an ERROR frame and the error half of a
/// [`PayloadResult`](crate::PayloadResult) delivered to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The terminal error delivered when a stream is canceled, by either side.
    pub fn canceled() -> Self {
        Self::new(ErrorCode::Canceled, "canceled")
    }

    /// The terminal error delivered to every live stream when the transport drops.
    pub fn connection_closed() -> Self {
        Self::new(ErrorCode::ConnectionClose, "connection closed")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

/// Outcome of a failed facade operation.
///
/// Remote stream errors keep their code and message; the other variants are
/// local conditions that never produce an outbound ERROR frame by themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The peer terminated the stream with an ERROR frame.
    Remote(Error),
    /// The caller's cancellation fired, or the peer canceled the stream.
    Canceled,
    /// The outbound frame queue is gone; the transport has shut down.
    Closed,
    /// The 31-bit stream-id space has no free identifier.
    StreamIdsExhausted,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(e) => write!(f, "{e}"),
            Self::Canceled => write!(f, "canceled"),
            Self::Closed => write!(f, "connection closed"),
            Self::StreamIdsExhausted => write!(f, "no stream id available"),
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Error> for RequestError {
    fn from(e: Error) -> Self {
        Self::Remote(e)
    }
}

/// Frame decoding errors.
#[derive(Debug)]
pub enum DecodeError {
    UnexpectedEof,
    UnknownFrameType(u8),
    InvalidData(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of frame"),
            Self::UnknownFrameType(ty) => write!(f, "unknown frame type: {ty:#04x}"),
            Self::InvalidData(msg) => write!(f, "invalid frame: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}
