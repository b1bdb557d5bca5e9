//! Schema-aware record codec.
//!
//! The aggregator ships class schemas out of band (schema frames) and
//! records in payload frames. A payload can only be trusted once the
//! schema for its class and version has been registered.
//!
//! Schema frame body: MessagePack list of `{class, version}`.
//! Payload frame body: MessagePack map `{name, class, version, data}`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::MsgPackCodec;
use crate::error::Result;
use crate::record::Record;

/// Result of decoding one payload frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Payload decoded into a usable record.
    Record(Record),
    /// Payload looks like a record but its schema is missing or stale.
    NeedsSchema,
    /// Payload is not a record at all.
    Unrecognized,
}

/// Decoder for payload frames.
pub trait RecordCodec {
    /// Register the schemas carried by a schema frame.
    ///
    /// Returns the number of classes registered.
    fn register_schema(&mut self, schema: &[u8]) -> Result<usize>;

    /// Decode a payload frame.
    fn decode(&self, payload: &[u8]) -> Decoded;
}

/// One class entry of a schema frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub class: String,
    pub version: u16,
}

impl SchemaEntry {
    pub fn new(class: impl Into<String>, version: u16) -> Self {
        Self {
            class: class.into(),
            version,
        }
    }
}

/// [`RecordCodec`] keyed on registered `(class, version)` pairs.
///
/// Registrations persist for the lifetime of the codec; a newer schema for
/// the same class replaces the old version.
#[derive(Debug, Default)]
pub struct SchemaCodec {
    schemas: HashMap<String, u16>,
}

impl SchemaCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a schema frame body.
    pub fn encode_schema(entries: &[SchemaEntry]) -> Result<Vec<u8>> {
        MsgPackCodec::encode(&entries)
    }

    /// Encode a payload frame body.
    pub fn encode_record(record: &Record) -> Result<Vec<u8>> {
        MsgPackCodec::encode(record)
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl RecordCodec for SchemaCodec {
    fn register_schema(&mut self, schema: &[u8]) -> Result<usize> {
        let entries: Vec<SchemaEntry> = MsgPackCodec::decode(schema)?;
        let count = entries.len();
        for entry in entries {
            self.schemas.insert(entry.class, entry.version);
        }
        Ok(count)
    }

    fn decode(&self, payload: &[u8]) -> Decoded {
        let record: Record = match MsgPackCodec::decode(payload) {
            Ok(record) => record,
            Err(_) => return Decoded::Unrecognized,
        };

        match self.schemas.get(&record.class) {
            Some(&version) if version == record.version => Decoded::Record(record),
            _ => Decoded::NeedsSchema,
        }
    }
}
