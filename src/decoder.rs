//! Interpretation of received messages.
//!
//! Frames are handled in arrival order:
//!
//! | Kind     | Effect                                              |
//! |----------|-----------------------------------------------------|
//! | Metadata | updates run and mode, no record                     |
//! | Schema   | registered with the codec, no record                |
//! | Payload  | decoded; a record, a schema request, or skipped     |
//!
//! One bad frame never discards the rest of the message.

use crate::codec::{Decoded, RecordCodec};
use crate::protocol::{FrameKind, Message};
use crate::record::Record;

/// Run identifier meaning "no active run".
pub const SENTINEL_RUN: u32 = 0;

/// Metadata key carrying the run identifier.
pub const RUN_KEY: &str = "run";

/// Metadata key carrying the mode tag.
pub const MODE_KEY: &str = "HLT_MODE";

/// Contents of one metadata frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataUpdate {
    /// Parsed run; [`SENTINEL_RUN`] when absent or not a number.
    pub run: u32,
    /// Mode tag, if the frame carried one.
    pub mode: Option<String>,
}

impl MetadataUpdate {
    /// Parse whitespace-separated `key=value` pairs.
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        let mut run = SENTINEL_RUN;
        let mut mode = None;

        for (key, value) in text.split_whitespace().filter_map(|pair| pair.split_once('=')) {
            match key {
                RUN_KEY => run = value.parse().unwrap_or(SENTINEL_RUN),
                MODE_KEY => mode = Some(value.to_string()),
                _ => {}
            }
        }

        Self { run, mode }
    }
}

/// Changes to the cycle state produced by one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStateDelta {
    /// The last metadata frame of the message, if any.
    pub metadata: Option<MetadataUpdate>,
    /// A payload needed a schema the codec does not have.
    pub schema_needed: bool,
}

/// What became of one payload frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Decoded(Record),
    NeedsSchema { position: usize },
    Unrecognized { position: usize },
}

/// Decodes messages through a [`RecordCodec`].
///
/// Owns the codec so schema registrations persist across cycles.
#[derive(Debug, Default)]
pub struct FrameDecoder<C> {
    codec: C,
}

impl<C: RecordCodec> FrameDecoder<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Decode every frame of `message`.
    pub fn decode(&mut self, message: &Message) -> (CycleStateDelta, Vec<RecordOutcome>) {
        let mut delta = CycleStateDelta::default();
        let mut outcomes = Vec::new();

        for (position, frame) in message.frames().iter().enumerate() {
            match frame.kind() {
                FrameKind::Metadata => {
                    let update = MetadataUpdate::parse(frame.payload());
                    tracing::debug!(run = update.run, mode = ?update.mode, "metadata");
                    delta.metadata = Some(update);
                }
                FrameKind::Schema => match self.codec.register_schema(frame.payload()) {
                    Ok(count) => tracing::debug!(count, "registered schemas"),
                    Err(e) => tracing::warn!(position, error = %e, "schema frame rejected"),
                },
                FrameKind::Payload => {
                    if frame.payload().is_empty() {
                        continue;
                    }
                    match self.codec.decode(frame.payload()) {
                        Decoded::Record(record) => {
                            tracing::debug!(position, name = %record.name, "decoded record");
                            outcomes.push(RecordOutcome::Decoded(record));
                        }
                        Decoded::NeedsSchema => {
                            tracing::info!(position, "schema missing, requesting it");
                            delta.schema_needed = true;
                            outcomes.push(RecordOutcome::NeedsSchema { position });
                        }
                        Decoded::Unrecognized => {
                            tracing::info!(position, "position {position} not a record");
                            outcomes.push(RecordOutcome::Unrecognized { position });
                        }
                    }
                }
            }
        }

        (delta, outcomes)
    }
}

impl RecordOutcome {
    /// The decoded record, if there is one.
    pub fn into_record(self) -> Option<Record> {
        match self {
            RecordOutcome::Decoded(record) => Some(record),
            _ => None,
        }
    }
}
