//! Wire format encoding and decoding.
//!
//! Implements the 13-byte frame header:
//! ```text
//! ┌────────────┬───────┬──────────┐
//! │ Data type  │ Flags │ Length   │
//! │ 8 bytes    │ 1 byte│ 4 bytes  │
//! │ ASCII tag  │       │ uint32 BE│
//! └────────────┴───────┴──────────┘
//! ```
//!
//! A message is a run of frames; every frame but the last carries the
//! `MORE` flag.

use std::fmt;

use crate::error::{ReceiverError, Result};

/// Header size in bytes (fixed, exactly 13).
pub const HEADER_SIZE: usize = 13;

/// Length of the data type tag.
pub const DATA_TYPE_SIZE: usize = 8;

/// Default maximum payload size (256 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 256 * 1024 * 1024;

/// Flag constants for the protocol.
pub mod flags {
    /// More frames of the same message follow.
    pub const MORE: u8 = 0b0000_0001;

    /// Reserved bits mask (bits 1-7).
    pub const RESERVED_MASK: u8 = 0b1111_1110;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Eight-byte ASCII tag identifying what a frame carries.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataType(pub [u8; DATA_TYPE_SIZE]);

impl DataType {
    /// Run/mode metadata (`key=value` pairs).
    pub const INFO: DataType = DataType(*b"INFO____");
    /// Serialization schema for the record codec.
    pub const SCHEMA: DataType = DataType(*b"SCHEMA__");
    /// Serialized record.
    pub const RECORD: DataType = DataType(*b"RECORD__");
    /// Outbound request command.
    pub const CONFIG: DataType = DataType(*b"CONFIG__");
    /// Empty tag used by terminator frames.
    pub const EMPTY: DataType = DataType([0u8; DATA_TYPE_SIZE]);

    /// Build a tag from a short name, padding with `_`.
    ///
    /// Names longer than eight bytes are truncated.
    pub fn from_name(name: &str) -> Self {
        let mut tag = [b'_'; DATA_TYPE_SIZE];
        for (slot, byte) in tag.iter_mut().zip(name.bytes()) {
            *slot = byte;
        }
        DataType(tag)
    }

    /// Tag with the `_` padding stripped.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.0)
            .trim_end_matches(['_', '\0'])
            .to_string()
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataType({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// What the frame carries.
    pub data_type: DataType,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(data_type: DataType, flags: u8, payload_length: u32) -> Self {
        Self {
            data_type,
            flags,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use overwatch_receiver::protocol::{DataType, Header, flags};
    ///
    /// let header = Header::new(DataType::RECORD, flags::MORE, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 13);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (13 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..8].copy_from_slice(&self.data_type.0);
        buf[8] = self.flags;
        buf[9..13].copy_from_slice(&self.payload_length.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use overwatch_receiver::protocol::{DataType, Header};
    ///
    /// let mut bytes = b"INFO____".to_vec();
    /// bytes.extend_from_slice(&[0, 0, 0, 0, 9]);
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.data_type, DataType::INFO);
    /// assert_eq!(header.payload_length, 9);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let mut tag = [0u8; DATA_TYPE_SIZE];
        tag.copy_from_slice(&buf[0..8]);
        Some(Self {
            data_type: DataType(tag),
            flags: buf[8],
            payload_length: u32::from_be_bytes([buf[9], buf[10], buf[11], buf[12]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Payload length doesn't exceed max
    /// - Reserved flag bits are 0
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.payload_length > max_payload_size {
            return Err(ReceiverError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(ReceiverError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if more frames of this message follow.
    #[inline]
    pub fn has_more(&self) -> bool {
        flags::has_flag(self.flags, flags::MORE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_byte_layout() {
        let header = Header::new(DataType::RECORD, flags::MORE, 0x0102_0304);
        let bytes = header.encode();

        assert_eq!(&bytes[0..8], b"RECORD__");
        assert_eq!(bytes[8], flags::MORE);
        assert_eq!(&bytes[9..13], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(Header::decode(&bytes), Some(header));
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; HEADER_SIZE - 1];
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_validate_payload_too_large() {
        let header = Header::new(DataType::RECORD, 0, 1_000_000);
        let result = header.validate(100);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_validate_reserved_bits_must_be_zero() {
        let header = Header::new(DataType::INFO, 0b1000_0000, 0);
        let result = header.validate(DEFAULT_MAX_PAYLOAD_SIZE);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Reserved flag bits"));
    }

    #[test]
    fn test_has_more() {
        assert!(Header::new(DataType::INFO, flags::MORE, 0).has_more());
        assert!(!Header::new(DataType::INFO, 0, 0).has_more());
    }

    #[test]
    fn test_data_type_from_name_pads_and_truncates() {
        assert_eq!(DataType::from_name("CONFIG"), DataType::CONFIG);
        assert_eq!(DataType::from_name("INFO"), DataType::INFO);
        assert_eq!(DataType::from_name("TOOLONGNAME").0, *b"TOOLONGN");
    }

    #[test]
    fn test_data_type_name_strips_padding() {
        assert_eq!(DataType::SCHEMA.name(), "SCHEMA");
        assert_eq!(DataType::EMPTY.name(), "");
    }
}
