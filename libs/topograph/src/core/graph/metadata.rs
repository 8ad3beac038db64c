// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Attribute mapping carried by nodes and edges.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered attribute mapping, compared by value.
///
/// Values are JSON values, so strings, numbers, booleans and nested
/// mappings are all representable. Insertion order is preserved for
/// display and serialization; equality ignores it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a value. Returns the previous value for the key, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of `key`, or `None` if absent or not a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Conjunctive exact-value match: every entry of `filter` must be present
    /// in `self` with an equal value. An empty filter matches everything.
    pub fn matches(&self, filter: &Metadata) -> bool {
        filter
            .0
            .iter()
            .all(|(key, expected)| self.0.get(key) == Some(expected))
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equality_ignores_insertion_order() {
        let a = Metadata::new().with("Name", "eth0").with("MTU", 1500);
        let b = Metadata::new().with("MTU", 1500).with("Name", "eth0");
        assert_eq!(a, b);
    }

    #[test]
    fn test_matches_is_conjunctive_and_exact() {
        let m = Metadata::new()
            .with("Type", "veth")
            .with("MAC", "aa:bb:cc:dd:ee:ff")
            .with("MTU", 1500);

        assert!(m.matches(&Metadata::new()));
        assert!(m.matches(&Metadata::new().with("Type", "veth")));
        assert!(m.matches(&Metadata::new().with("Type", "veth").with("MTU", 1500)));
        assert!(!m.matches(&Metadata::new().with("Type", "veth").with("MTU", 9000)));
        // No prefix matching
        assert!(!m.matches(&Metadata::new().with("MAC", "aa:bb")));
        // Missing key never matches
        assert!(!m.matches(&Metadata::new().with("Name", "eth0")));
    }

    #[test]
    fn test_nested_values_compare_by_value() {
        let a = Metadata::new().with("Ovs", json!({"Bridge": "br-int", "Port": 3}));
        let b = Metadata::new().with("Ovs", json!({"Port": 3, "Bridge": "br-int"}));
        assert_eq!(a, b);
        assert!(a.matches(&b));
    }

    #[test]
    fn test_get_str_ignores_non_strings() {
        let m = Metadata::new().with("MAC", "aa:bb").with("MTU", 1500);
        assert_eq!(m.get_str("MAC"), Some("aa:bb"));
        assert_eq!(m.get_str("MTU"), None);
        assert_eq!(m.get_str("Missing"), None);
    }

    #[test]
    fn test_remove_preserves_remaining_order() {
        let mut m = Metadata::new().with("a", 1).with("b", 2).with("c", 3);
        assert_eq!(m.remove("b"), Some(json!(2)));
        let keys: Vec<_> = m.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }
}
