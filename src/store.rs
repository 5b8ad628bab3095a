//! Insertion-ordered result store.
//!
//! Keys keep the position of their first insertion. A second write to the same
//! key replaces the record in place (last write wins), so the canonical
//! serialization depends on the order in which probes *first* completed.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::signal::SignalRecord;

/// Key order used when serializing the store for hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationOrder {
    /// Order in which keys first appeared. Two sessions on the same host can
    /// produce different digests when probes complete in a different order.
    #[default]
    Completion,
    /// Lexicographic key order; stable across completion orders.
    Sorted,
}

/// Mapping from signal key to its latest record, in first-insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultStore {
    records: IndexMap<String, SignalRecord>,
}

impl ResultStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning the one it replaced.
    pub fn insert(&mut self, record: SignalRecord) -> Option<SignalRecord> {
        self.records.insert(record.key.clone(), record)
    }

    /// Look up a record by key.
    pub fn get(&self, key: &str) -> Option<&SignalRecord> {
        self.records.get(key)
    }

    /// Look up a value by key.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(|r| r.value.as_str())
    }

    /// Whether `key` has been written.
    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keys in first-insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Flat `key -> value` JSON object in the requested key order.
    pub fn to_value_map(&self, order: SerializationOrder) -> Map<String, Value> {
        let mut pairs: Vec<(&String, &SignalRecord)> = self.records.iter().collect();
        if order == SerializationOrder::Sorted {
            pairs.sort_by(|a, b| a.0.cmp(b.0));
        }
        pairs
            .into_iter()
            .map(|(k, r)| (k.clone(), Value::String(r.value.clone())))
            .collect()
    }

    /// Canonical string form used as hash input, e.g. `{"a":"1","b":"2"}`.
    pub fn canonical(&self, order: SerializationOrder) -> String {
        Value::Object(self.to_value_map(order)).to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn rec(key: &str, value: &str) -> SignalRecord {
        SignalRecord::new(key, value, Duration::ZERO)
    }

    #[test]
    fn test_empty_store_serializes_to_empty_object() {
        assert_eq!(ResultStore::new().canonical(SerializationOrder::Completion), "{}");
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let mut store = ResultStore::new();
        store.insert(rec("b", "2"));
        store.insert(rec("a", "1"));
        assert_eq!(
            store.canonical(SerializationOrder::Completion),
            r#"{"b":"2","a":"1"}"#
        );
        assert_eq!(
            store.canonical(SerializationOrder::Sorted),
            r#"{"a":"1","b":"2"}"#
        );
    }

    #[test]
    fn test_duplicate_write_keeps_first_position() {
        let mut store = ResultStore::new();
        store.insert(rec("ip", "1.2.3.4"));
        store.insert(rec("os", "linux"));
        let previous = store.insert(rec("ip", "5.6.7.8"));

        assert_eq!(previous.map(|r| r.value), Some("1.2.3.4".to_string()));
        assert_eq!(store.len(), 2);
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["ip", "os"]);
        assert_eq!(store.value("ip"), Some("5.6.7.8"));
    }

    #[test]
    fn test_values_are_escaped() {
        let mut store = ResultStore::new();
        store.insert(rec("gpu", "ANGLE \"Intel\""));
        assert_eq!(
            store.canonical(SerializationOrder::Completion),
            r#"{"gpu":"ANGLE \"Intel\""}"#
        );
    }
}
