//! Decoded records and the per-cycle record store.

use serde::{Deserialize, Serialize};

/// A decoded data object destined for output.
///
/// The same shape is used on the wire (payload frames) and in output
/// containers, so a record is written back exactly as it arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Name the record is stored under.
    pub name: String,
    /// Class of the object; must have a registered schema to decode.
    pub class: String,
    /// Schema version the payload was serialized with.
    pub version: u16,
    /// Opaque serialized object body.
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(
        name: impl Into<String>,
        class: impl Into<String>,
        version: u16,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            version,
            data: data.into(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Records accumulated during the current cycle.
///
/// Cleared at the start of every receive, so it never mixes cycles.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every held record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Append a record, preserving arrival order.
    pub fn add(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Hand every record over to the caller, leaving the store empty.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Record> {
        self.records.drain(..)
    }
}

impl Extend<Record> for RecordStore {
    fn extend<I: IntoIterator<Item = Record>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histo(name: &str) -> Record {
        Record::new(name, "TH1F", 1, vec![1, 2, 3])
    }

    #[test]
    fn test_add_preserves_order() {
        let mut store = RecordStore::new();
        store.add(histo("a"));
        store.add(histo("b"));
        store.add(histo("c"));

        let names: Vec<&str> = store.iter().map(Record::name).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(store.size(), 3);
    }

    #[test]
    fn test_clear_then_size_is_zero() {
        let mut store = RecordStore::new();
        store.clear();
        assert_eq!(store.size(), 0);

        store.extend([histo("a"), histo("b")]);
        store.clear();
        assert_eq!(store.size(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_drain_empties_store() {
        let mut store = RecordStore::new();
        store.extend([histo("a"), histo("b")]);

        let drained: Vec<Record> = store.drain().collect();
        assert_eq!(drained.len(), 2);
        assert!(store.is_empty());
    }
}
