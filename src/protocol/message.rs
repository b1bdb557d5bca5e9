//! Multi-part messages.
//!
//! A [`Message`] is an ordered list of frames sent or received as a unit.
//! On the wire every frame but the last carries the `MORE` flag.

use super::frame::{build_frame, Frame};
use super::wire_format::{DataType, HEADER_SIZE};

/// Command name of the periodic data request.
pub const REQUEST_COMMAND: &str = "CONFIG";

/// An ordered sequence of frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    frames: Vec<Frame>,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame (builder style).
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Append a frame.
    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Build the outbound data request: command frame carrying the option
    /// string, then an empty terminator frame.
    ///
    /// # Example
    ///
    /// ```
    /// use overwatch_receiver::protocol::{DataType, Message};
    ///
    /// let request = Message::request(" -SchemaOnRequest");
    /// assert_eq!(request.len(), 2);
    /// assert_eq!(request.frames()[0].data_type, DataType::CONFIG);
    /// assert!(request.frames()[1].payload.is_empty());
    /// ```
    pub fn request(options: &str) -> Self {
        Self::new()
            .with_frame(Frame::new(
                DataType::from_name(REQUEST_COMMAND),
                options.to_string(),
            ))
            .with_frame(Frame::terminator())
    }

    /// Frames in arrival order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if the message has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        self.frames
            .iter()
            .map(|f| HEADER_SIZE + f.payload_len())
            .sum()
    }

    /// Encode all frames into one contiguous buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        let last = self.frames.len().saturating_sub(1);
        for (i, frame) in self.frames.iter().enumerate() {
            buf.extend_from_slice(&build_frame(frame, i < last));
        }
        buf
    }
}

impl IntoIterator for Message {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

impl FromIterator<Frame> for Message {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Header;

    #[test]
    fn test_encode_sets_more_on_all_but_last() {
        let message = Message::new()
            .with_frame(Frame::new(DataType::INFO, "run=1"))
            .with_frame(Frame::new(DataType::RECORD, &b"ab"[..]))
            .with_frame(Frame::new(DataType::RECORD, &b"c"[..]));
        let bytes = message.encode();
        assert_eq!(bytes.len(), message.encoded_len());

        let first = Header::decode(&bytes).unwrap();
        assert!(first.has_more());

        let second_at = HEADER_SIZE + 5;
        let second = Header::decode(&bytes[second_at..]).unwrap();
        assert!(second.has_more());

        let third_at = second_at + HEADER_SIZE + 2;
        let third = Header::decode(&bytes[third_at..]).unwrap();
        assert!(!third.has_more());
        assert_eq!(third.payload_length, 1);
    }

    #[test]
    fn test_request_carries_options() {
        let request = Message::request(" -select=EMC -ResetOnRequest");
        assert_eq!(
            request.frames()[0].payload(),
            b" -select=EMC -ResetOnRequest"
        );
        assert_eq!(request.frames()[1], Frame::terminator());
    }

    #[test]
    fn test_empty_message_encodes_to_nothing() {
        assert!(Message::new().encode().is_empty());
    }
}
