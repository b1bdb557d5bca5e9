//! Frame struct with typed accessors.
//!
//! Represents one part of a multi-part message: header plus payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use overwatch_receiver::protocol::{DataType, Frame, FrameKind};
//!
//! let frame = Frame::new(DataType::INFO, "run=42 HLT_MODE=B");
//! assert_eq!(frame.kind(), FrameKind::Metadata);
//! assert_eq!(frame.payload(), b"run=42 HLT_MODE=B");
//! ```

use bytes::Bytes;

use super::wire_format::{flags, DataType, Header, HEADER_SIZE};

/// What a received frame carries, derived from its data type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Run/mode key-value pairs.
    Metadata,
    /// Codec schema that must be registered before decoding payloads.
    Schema,
    /// Anything else; handed to the record codec.
    Payload,
}

/// A single frame of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Data type tag.
    pub data_type: DataType,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from a tag and payload.
    pub fn new(data_type: DataType, payload: impl Into<Bytes>) -> Self {
        Self {
            data_type,
            payload: payload.into(),
        }
    }

    /// Empty terminator frame.
    pub fn terminator() -> Self {
        Self {
            data_type: DataType::EMPTY,
            payload: Bytes::new(),
        }
    }

    /// Classify the frame by its tag.
    pub fn kind(&self) -> FrameKind {
        match self.data_type {
            DataType::INFO => FrameKind::Metadata,
            DataType::SCHEMA => FrameKind::Schema,
            _ => FrameKind::Payload,
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Header for this frame; `more` sets the continuation flag.
    pub fn header(&self, more: bool) -> Header {
        let flags = if more { flags::MORE } else { 0 };
        Header::new(self.data_type, flags, self.payload.len() as u32)
    }
}

/// Build a complete frame as a single byte vector.
///
/// # Example
///
/// ```
/// use overwatch_receiver::protocol::{build_frame, DataType, Frame, HEADER_SIZE};
///
/// let bytes = build_frame(&Frame::new(DataType::RECORD, &b"hello"[..]), false);
/// assert_eq!(bytes.len(), HEADER_SIZE + 5);
/// ```
pub fn build_frame(frame: &Frame, more: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + frame.payload_len());
    buf.extend_from_slice(&frame.header(more).encode());
    buf.extend_from_slice(&frame.payload);
    buf
}
