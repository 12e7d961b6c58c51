//! Payload and result values carried by streams.

use std::borrow::Cow;

use bytes::Bytes;
use serde::Serialize;

use crate::error::Error;

/// An opaque data value with optional metadata.
///
/// Metadata presence is independent of emptiness: `Some(Bytes::new())` is a
/// legal metadata value distinct from `None`, and the two encode differently
/// on the wire (the METADATA flag plus a zero-length prefix versus no
/// metadata section at all).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub metadata: Option<Bytes>,
    pub data: Bytes,
}

impl Payload {
    /// A payload with no data and no metadata.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a payload from raw bytes, without metadata.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self {
            metadata: None,
            data: data.into(),
        }
    }

    /// Creates a plain-text payload, without metadata.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            metadata: None,
            data: Bytes::from(text.into()),
        }
    }

    /// Creates a JSON payload, without metadata.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            metadata: None,
            data: Bytes::from(serde_json::to_vec(value)?),
        })
    }

    /// Returns this payload with the given metadata attached.
    pub fn with_metadata(mut self, metadata: impl Into<Bytes>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    /// The data interpreted as text.
    pub fn as_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// One item of a stream or channel: a payload, or the terminal error.
pub type PayloadResult = Result<Payload, Error>;
