//! Protocol module - wire format, framing, and message assembly.
//!
//! This module implements the binary protocol spoken with the aggregator:
//! - 13-byte frame header encoding/decoding
//! - Frame struct with kind classification
//! - Multi-part messages and the message buffer that assembles them

mod frame;
mod message;
mod message_buffer;
mod wire_format;

pub use frame::{build_frame, Frame, FrameKind};
pub use message::{Message, REQUEST_COMMAND};
pub use message_buffer::{MessageBuffer, DEFAULT_MAX_MESSAGE_FRAMES, DEFAULT_MAX_MESSAGE_SIZE};
pub use wire_format::{
    flags, DataType, Header, DATA_TYPE_SIZE, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
};
