//! Binary encoding and decoding of frames.
//!
//! Wire layout (big-endian throughout, no transport length prefix):
//!
//! ```text
//! offset
//!    0  ┐
//!    1  │ stream id (u31, MSB reserved = 0)
//!    2  │
//!    3  ┘
//!    4  ┐ frame type (6 bits) << 10 | flags (10 bits)
//!    5  ┘
//! ------
//!    type-specific body
//! ```
//!
//! When the METADATA flag is set, the body carries a metadata section with a
//! u24 length prefix, except in METADATA_PUSH where the metadata is the whole
//! body. Data is always the unprefixed remainder of the frame.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, Error, ErrorCode};
use crate::frame::{Frame, FrameFlags, FrameType, MAX_STREAM_ID};
use crate::payload::Payload;

const HEADER_LEN: usize = 6;
const METADATA_LEN_PREFIX: usize = 3;

/// Protocol version advertised in SETUP frames.
const VERSION_MAJOR: u16 = 1;
const VERSION_MINOR: u16 = 0;

impl Frame {
    /// Appends the wire encoding of this frame to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u32(self.stream_id() & MAX_STREAM_ID);
        buf.put_u16(((self.frame_type() as u16) << 10) | (self.flags().bits() & 0x3FF));

        match self {
            Self::Setup {
                keepalive_interval,
                max_lifetime,
                resume_token,
                metadata_mime_type,
                data_mime_type,
                payload,
                ..
            } => {
                buf.put_u16(VERSION_MAJOR);
                buf.put_u16(VERSION_MINOR);
                buf.put_u32(keepalive_interval.as_millis() as u32);
                buf.put_u32(max_lifetime.as_millis() as u32);
                if let Some(token) = resume_token {
                    buf.put_u16(token.len() as u16);
                    buf.put_slice(token);
                }
                buf.put_u8(metadata_mime_type.len() as u8);
                buf.put_slice(metadata_mime_type.as_bytes());
                buf.put_u8(data_mime_type.len() as u8);
                buf.put_slice(data_mime_type.as_bytes());
                put_payload(buf, payload);
            }
            Self::Keepalive {
                last_received_position,
                data,
                ..
            } => {
                buf.put_u64(*last_received_position);
                buf.put_slice(data);
            }
            Self::RequestResponse { payload, .. } | Self::RequestFnf { payload, .. } => {
                put_payload(buf, payload);
            }
            Self::RequestStream {
                initial_requests,
                payload,
                ..
            }
            | Self::RequestChannel {
                initial_requests,
                payload,
                ..
            } => {
                buf.put_u32(*initial_requests & MAX_STREAM_ID);
                put_payload(buf, payload);
            }
            Self::RequestN { n, .. } => {
                buf.put_u32(*n & MAX_STREAM_ID);
            }
            Self::Cancel { .. } => {}
            Self::Payload { payload, .. } => {
                put_payload(buf, payload);
            }
            Self::Error { error, .. } => {
                buf.put_u32(error.code as u32);
                buf.put_slice(error.message.as_bytes());
            }
            Self::MetadataPush { metadata } => {
                buf.put_slice(metadata);
            }
        }
    }

    /// The exact number of bytes [`encode`](Self::encode) will append.
    pub fn encoded_len(&self) -> usize {
        let body = match self {
            Self::Setup {
                resume_token,
                metadata_mime_type,
                data_mime_type,
                payload,
                ..
            } => {
                let token = resume_token.as_ref().map_or(0, |t| 2 + t.len());
                12 + token
                    + 1
                    + metadata_mime_type.len()
                    + 1
                    + data_mime_type.len()
                    + payload_len(payload)
            }
            Self::Keepalive { data, .. } => 8 + data.len(),
            Self::RequestResponse { payload, .. } | Self::RequestFnf { payload, .. } => {
                payload_len(payload)
            }
            Self::RequestStream { payload, .. } | Self::RequestChannel { payload, .. } => {
                4 + payload_len(payload)
            }
            Self::RequestN { .. } => 4,
            Self::Cancel { .. } => 0,
            Self::Payload { payload, .. } => payload_len(payload),
            Self::Error { error, .. } => 4 + error.message.len(),
            Self::MetadataPush { metadata } => metadata.len(),
        };
        HEADER_LEN + body
    }

    /// Decodes one frame from a complete frame buffer.
    pub fn decode(mut buf: Bytes) -> Result<Frame, DecodeError> {
        need(&buf, HEADER_LEN)?;
        let raw_id = buf.get_u32();
        if raw_id & !MAX_STREAM_ID != 0 {
            return Err(DecodeError::InvalidData(
                "stream id has the reserved bit set".into(),
            ));
        }
        let word = buf.get_u16();
        let raw_type = (word >> 10) as u8;
        let flags = FrameFlags::from_bits_truncate(word & 0x3FF);
        let frame_type =
            FrameType::from_u8(raw_type).ok_or(DecodeError::UnknownFrameType(raw_type))?;

        match frame_type {
            FrameType::Setup => {
                need(&buf, 12)?;
                let _major = buf.get_u16();
                let _minor = buf.get_u16();
                let keepalive_interval = Duration::from_millis(u64::from(buf.get_u32()));
                let max_lifetime = Duration::from_millis(u64::from(buf.get_u32()));
                let resume_token = if flags.contains(FrameFlags::RESUME_ENABLE) {
                    need(&buf, 2)?;
                    let len = buf.get_u16() as usize;
                    need(&buf, len)?;
                    Some(buf.split_to(len))
                } else {
                    None
                };
                let metadata_mime_type = get_mime(&mut buf)?;
                let data_mime_type = get_mime(&mut buf)?;
                let payload = get_payload(&mut buf, flags)?;
                Ok(Frame::Setup {
                    keepalive_interval,
                    max_lifetime,
                    resume_token,
                    lease: flags.contains(FrameFlags::LEASE),
                    metadata_mime_type,
                    data_mime_type,
                    payload,
                })
            }
            FrameType::Keepalive => {
                need(&buf, 8)?;
                let last_received_position = buf.get_u64();
                Ok(Frame::Keepalive {
                    respond: flags.contains(FrameFlags::RESPOND),
                    last_received_position,
                    data: take_rest(&mut buf),
                })
            }
            FrameType::RequestResponse => Ok(Frame::RequestResponse {
                stream_id: raw_id,
                follows: flags.contains(FrameFlags::FOLLOWS),
                payload: get_payload(&mut buf, flags)?,
            }),
            FrameType::RequestFnf => Ok(Frame::RequestFnf {
                stream_id: raw_id,
                follows: flags.contains(FrameFlags::FOLLOWS),
                payload: get_payload(&mut buf, flags)?,
            }),
            FrameType::RequestStream => {
                need(&buf, 4)?;
                let initial_requests = buf.get_u32() & MAX_STREAM_ID;
                Ok(Frame::RequestStream {
                    stream_id: raw_id,
                    follows: flags.contains(FrameFlags::FOLLOWS),
                    initial_requests,
                    payload: get_payload(&mut buf, flags)?,
                })
            }
            FrameType::RequestChannel => {
                need(&buf, 4)?;
                let initial_requests = buf.get_u32() & MAX_STREAM_ID;
                Ok(Frame::RequestChannel {
                    stream_id: raw_id,
                    follows: flags.contains(FrameFlags::FOLLOWS),
                    complete: flags.contains(FrameFlags::COMPLETE),
                    initial_requests,
                    payload: get_payload(&mut buf, flags)?,
                })
            }
            FrameType::RequestN => {
                need(&buf, 4)?;
                Ok(Frame::RequestN {
                    stream_id: raw_id,
                    n: buf.get_u32() & MAX_STREAM_ID,
                })
            }
            FrameType::Cancel => Ok(Frame::Cancel { stream_id: raw_id }),
            FrameType::Payload => Ok(Frame::Payload {
                stream_id: raw_id,
                follows: flags.contains(FrameFlags::FOLLOWS),
                complete: flags.contains(FrameFlags::COMPLETE),
                next: flags.contains(FrameFlags::NEXT),
                payload: get_payload(&mut buf, flags)?,
            }),
            FrameType::Error => {
                need(&buf, 4)?;
                let raw_code = buf.get_u32();
                let code = ErrorCode::from_u32(raw_code).unwrap_or(ErrorCode::Invalid);
                let message = String::from_utf8_lossy(&take_rest(&mut buf)).into_owned();
                Ok(Frame::Error {
                    stream_id: raw_id,
                    error: Error::new(code, message),
                })
            }
            FrameType::MetadataPush => {
                if !flags.contains(FrameFlags::METADATA) {
                    return Err(DecodeError::InvalidData(
                        "METADATA_PUSH without the METADATA flag".into(),
                    ));
                }
                Ok(Frame::MetadataPush {
                    metadata: take_rest(&mut buf),
                })
            }
        }
    }
}

fn payload_len(payload: &Payload) -> usize {
    let metadata = payload
        .metadata
        .as_ref()
        .map_or(0, |m| METADATA_LEN_PREFIX + m.len());
    metadata + payload.data.len()
}

fn put_payload(buf: &mut BytesMut, payload: &Payload) {
    if let Some(metadata) = &payload.metadata {
        buf.put_uint(metadata.len() as u64, METADATA_LEN_PREFIX);
        buf.put_slice(metadata);
    }
    buf.put_slice(&payload.data);
}

fn get_payload(buf: &mut Bytes, flags: FrameFlags) -> Result<Payload, DecodeError> {
    let metadata = if flags.contains(FrameFlags::METADATA) {
        need(buf, METADATA_LEN_PREFIX)?;
        let len = buf.get_uint(METADATA_LEN_PREFIX) as usize;
        need(buf, len)?;
        Some(buf.split_to(len))
    } else {
        None
    };
    Ok(Payload {
        metadata,
        data: take_rest(buf),
    })
}

fn get_mime(buf: &mut Bytes) -> Result<String, DecodeError> {
    need(buf, 1)?;
    let len = buf.get_u8() as usize;
    need(buf, len)?;
    Ok(String::from_utf8_lossy(&buf.split_to(len)).into_owned())
}

fn take_rest(buf: &mut Bytes) -> Bytes {
    buf.split_to(buf.len())
}

fn need(buf: &Bytes, len: usize) -> Result<(), DecodeError> {
    if buf.len() < len {
        Err(DecodeError::UnexpectedEof)
    } else {
        Ok(())
    }
}
