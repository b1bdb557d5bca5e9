//! Message buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 13 bytes
//! - `WaitingForPayload`: Header parsed, need N more payload bytes
//!
//! Completed frames are collected into the pending message until a frame
//! without the `MORE` flag closes it.
//!
//! # Example
//!
//! ```
//! use overwatch_receiver::protocol::{DataType, Frame, Message, MessageBuffer};
//!
//! let message = Message::new().with_frame(Frame::new(DataType::INFO, "run=7"));
//! let mut buffer = MessageBuffer::new();
//! let messages = buffer.push(&message.encode()).unwrap();
//! assert_eq!(messages, vec![message]);
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use super::{Frame, Message};
use crate::error::{ReceiverError, Result};

/// Default cap on the number of frames in one message.
pub const DEFAULT_MAX_MESSAGE_FRAMES: usize = 64 * 1024;

/// Default cap on the encoded size of one message, headers included (1 GiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 1024 * 1024 * 1024;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 13 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for payload bytes.
    WaitingForPayload { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete messages.
pub struct MessageBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Frames of the message currently being assembled.
    pending: Message,
    /// Encoded bytes of the pending message so far.
    pending_size: u64,
    /// Maximum allowed payload size.
    max_payload_size: u32,
    /// Maximum frames per message.
    max_message_frames: usize,
    /// Maximum encoded bytes per message.
    max_message_size: u64,
}

impl MessageBuffer {
    /// Create a new message buffer with default settings.
    ///
    /// Default capacity: 64KB, max payload: 256 MiB.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new message buffer with custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            pending: Message::new(),
            pending_size: 0,
            max_payload_size,
            max_message_frames: DEFAULT_MAX_MESSAGE_FRAMES,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Bound how large a single multi-part message may grow.
    pub fn with_max_message(mut self, frames: usize, size: u64) -> Self {
        self.max_message_frames = frames;
        self.max_message_size = size;
        self
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// Partial frames and partially assembled messages are kept for the
    /// next push.
    ///
    /// # Errors
    ///
    /// Returns error if a header fails validation or the pending message
    /// outgrows its frame or size limit. The buffer should be cleared
    /// afterwards; its contents can no longer be trusted.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Message>> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();

        while let Some((frame, more)) = self.try_extract_one()? {
            self.pending.push(frame);
            if !more {
                messages.push(std::mem::take(&mut self.pending));
                self.pending_size = 0;
            }
        }

        Ok(messages)
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some((frame, more)))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if protocol violation (e.g., payload too large)
    fn try_extract_one(&mut self) -> Result<Option<(Frame, bool)>> {
        match &self.state {
            State::WaitingForHeader => {
                let Some(header) = Header::decode(&self.buffer) else {
                    return Ok(None);
                };

                header.validate(self.max_payload_size)?;
                self.admit(&header)?;

                let _ = self.buffer.split_to(HEADER_SIZE);

                if header.payload_length == 0 {
                    let frame = Frame::new(header.data_type, Bytes::new());
                    return Ok(Some((frame, header.has_more())));
                }

                self.state = State::WaitingForPayload { header };

                self.try_extract_one()
            }

            State::WaitingForPayload { header } => {
                let remaining = header.payload_length as usize;

                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let payload = self.buffer.split_to(remaining).freeze();
                let header = *header;

                self.state = State::WaitingForHeader;

                Ok(Some((
                    Frame::new(header.data_type, payload),
                    header.has_more(),
                )))
            }
        }
    }

    /// Account for the next frame of the pending message, enforcing limits.
    fn admit(&mut self, header: &Header) -> Result<()> {
        if self.pending.len() >= self.max_message_frames {
            return Err(ReceiverError::Protocol(format!(
                "message exceeds maximum of {} frames",
                self.max_message_frames
            )));
        }
        let size = self.pending_size + HEADER_SIZE as u64 + u64::from(header.payload_length);
        if size > self.max_message_size {
            return Err(ReceiverError::Protocol(format!(
                "message size {size} exceeds maximum {}",
                self.max_message_size
            )));
        }
        self.pending_size = size;
        Ok(())
    }

    /// Get the number of buffered, not yet framed bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing is buffered, including partial messages.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.pending.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending = Message::new();
        self.pending_size = 0;
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}
