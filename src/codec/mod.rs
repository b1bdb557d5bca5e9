//! Codec module - serialization of schemas and records.
//!
//! - [`MsgPackCodec`] - MessagePack helpers using `rmp-serde` (`to_vec_named`)
//! - [`RecordCodec`] - the three-way payload decoding contract
//! - [`SchemaCodec`] - default `RecordCodec` keyed on registered class schemas
//!
//! # Example
//!
//! ```
//! use overwatch_receiver::codec::{Decoded, RecordCodec, SchemaCodec, SchemaEntry};
//! use overwatch_receiver::record::Record;
//!
//! let mut codec = SchemaCodec::new();
//! let record = Record::new("hEnergy", "TH1F", 1, vec![0u8; 8]);
//! let payload = SchemaCodec::encode_record(&record).unwrap();
//!
//! // No schema yet
//! assert_eq!(codec.decode(&payload), Decoded::NeedsSchema);
//!
//! let schema = SchemaCodec::encode_schema(&[SchemaEntry::new("TH1F", 1)]).unwrap();
//! codec.register_schema(&schema).unwrap();
//! assert_eq!(codec.decode(&payload), Decoded::Record(record));
//! ```

mod msgpack;
mod schema;

pub use msgpack::MsgPackCodec;
pub use schema::{Decoded, RecordCodec, SchemaCodec, SchemaEntry};
