//! MsgPack helpers using `rmp-serde`.
//!
//! Always encode with `to_vec_named`: structs become maps keyed by field
//! name, the layout aggregators expect.
//!
//! # Example
//!
//! ```
//! use overwatch_receiver::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Entry {
//!     class: String,
//!     version: u16,
//! }
//!
//! let entry = Entry { class: "TH1F".to_string(), version: 3 };
//! let encoded = MsgPackCodec::encode(&entry).unwrap();
//! let decoded: Entry = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, entry);
//! ```

use crate::error::Result;

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Encode a value straight into a writer.
    #[inline]
    pub fn encode_into<W: std::io::Write, T: serde::Serialize>(
        writer: &mut W,
        value: &T,
    ) -> Result<()> {
        Ok(rmp_serde::encode::write_named(writer, value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
