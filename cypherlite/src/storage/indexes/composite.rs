// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Composite property index
//!
//! Keys are the concatenation of 4-byte CRC32 digests of the label, then for
//! each indexed property its name and value. Entries live in an ordered map,
//! so a lookup over the leading properties is a range scan over a byte prefix.
//!
//! A node is indexed by the longest leading run of indexed properties it
//! carries. Digests can collide, so callers verify candidates against the
//! node's real property values.

use crate::storage::types::Node;
use crate::storage::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

const DIGEST_LEN: usize = 4;

/// Composite (label, property..., value...) index
#[derive(Debug, Clone)]
pub struct CompositeIndex {
    label: String,
    properties: Vec<String>,
    entries: BTreeMap<Vec<u8>, BTreeSet<String>>,
    keys_by_node: HashMap<String, Vec<u8>>,
}

impl CompositeIndex {
    pub fn new(label: String, properties: Vec<String>) -> Self {
        Self {
            label,
            properties,
            entries: BTreeMap::new(),
            keys_by_node: HashMap::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn len(&self) -> usize {
        self.keys_by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys_by_node.is_empty()
    }

    /// Build the key for a prefix of (property, value) pairs
    fn key_for(&self, values: &[&Value]) -> Vec<u8> {
        let mut key = Vec::with_capacity(DIGEST_LEN * (1 + 2 * values.len()));
        key.extend_from_slice(&digest(self.label.as_bytes()));
        for (property, value) in self.properties.iter().zip(values) {
            key.extend_from_slice(&digest(property.as_bytes()));
            key.extend_from_slice(&value_digest(value));
        }
        key
    }

    /// The key a node should be stored under, if it is indexable
    fn key_for_node(&self, node: &Node) -> Option<Vec<u8>> {
        if !node.has_label(&self.label) {
            return None;
        }
        let values: Vec<&Value> = self
            .properties
            .iter()
            .map_while(|p| node.get_property(p))
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(self.key_for(&values))
    }

    /// Bring the index in line with a node's new state (`None` = deleted)
    pub fn update(&mut self, node_id: &str, node: Option<&Node>) {
        let new_key = node.and_then(|n| self.key_for_node(n));
        let old_key = self.keys_by_node.get(node_id).cloned();
        if old_key == new_key {
            return;
        }

        if let Some(old) = old_key {
            if let Some(ids) = self.entries.get_mut(&old) {
                ids.remove(node_id);
                if ids.is_empty() {
                    self.entries.remove(&old);
                }
            }
            self.keys_by_node.remove(node_id);
        }

        if let Some(new) = new_key {
            self.entries
                .entry(new.clone())
                .or_default()
                .insert(node_id.to_string());
            self.keys_by_node.insert(node_id.to_string(), new);
        }
    }

    /// Candidate node ids whose leading properties digest-match `values`.
    ///
    /// `values` may cover all indexed properties (exact lookup) or only a
    /// leading subset (prefix lookup). An empty slice matches every node
    /// carrying the label and the first property.
    pub fn lookup_prefix(&self, values: &[Value]) -> Vec<String> {
        let refs: Vec<&Value> = values.iter().take(self.properties.len()).collect();
        let prefix = self.key_for(&refs);
        let mut ids: BTreeSet<String> = BTreeSet::new();
        for (key, node_ids) in self.entries.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            ids.extend(node_ids.iter().cloned());
        }
        ids.into_iter().collect()
    }

    /// Whether `node` satisfies the equality predicate on the leading properties
    pub fn matches(&self, node: &Node, values: &[Value]) -> bool {
        node.has_label(&self.label)
            && self
                .properties
                .iter()
                .zip(values)
                .all(|(p, v)| node.get_property(p).and_then(|x| x.equals(v)) == Some(true))
    }
}

fn digest(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    crc32fast::hash(bytes).to_be_bytes()
}

/// Digest of a property value. Numerically equal integers and floats digest
/// identically so that `1` and `1.0` land on the same key.
fn value_digest(value: &Value) -> [u8; DIGEST_LEN] {
    let mut hasher = crc32fast::Hasher::new();
    feed_value(&mut hasher, value);
    hasher.finalize().to_be_bytes()
}

fn feed_value(hasher: &mut crc32fast::Hasher, value: &Value) {
    match value {
        Value::Null => hasher.update(&[0]),
        Value::Boolean(b) => hasher.update(&[1, *b as u8]),
        Value::Integer(i) => {
            hasher.update(&[2]);
            hasher.update(&i.to_be_bytes());
        }
        Value::Float(f) => {
            if f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64 {
                hasher.update(&[2]);
                hasher.update(&(*f as i64).to_be_bytes());
            } else {
                hasher.update(&[3]);
                hasher.update(&f.to_bits().to_be_bytes());
            }
        }
        Value::String(s) => {
            hasher.update(&[4]);
            hasher.update(s.as_bytes());
        }
        Value::List(items) => {
            hasher.update(&[5]);
            hasher.update(&(items.len() as u64).to_be_bytes());
            for item in items {
                feed_value(hasher, item);
            }
        }
        other => {
            hasher.update(&[6]);
            hasher.update(other.to_string().as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str, name: &str, age: i64) -> Node {
        let mut node = Node::with_labels(id.to_string(), vec!["Person".to_string()]);
        node.set_property("name".to_string(), Value::from(name));
        node.set_property("age".to_string(), Value::Integer(age));
        node
    }

    fn index_with(nodes: &[Node]) -> CompositeIndex {
        let mut index =
            CompositeIndex::new("Person".to_string(), vec!["name".to_string(), "age".to_string()]);
        for node in nodes {
            index.update(&node.id, Some(node));
        }
        index
    }

    #[test]
    fn test_exact_and_prefix_lookup() {
        let nodes = vec![
            person("1", "Alice", 30),
            person("2", "Alice", 40),
            person("3", "Bob", 30),
        ];
        let index = index_with(&nodes);

        assert_eq!(
            index.lookup_prefix(&[Value::from("Alice")]),
            vec!["1".to_string(), "2".to_string()]
        );
        assert_eq!(
            index.lookup_prefix(&[Value::from("Alice"), Value::Integer(40)]),
            vec!["2".to_string()]
        );
        assert_eq!(index.lookup_prefix(&[]).len(), 3);
    }

    #[test]
    fn test_integer_and_float_share_key() {
        let index = index_with(&[person("1", "Alice", 30)]);
        assert_eq!(
            index.lookup_prefix(&[Value::from("Alice"), Value::Float(30.0)]),
            vec!["1".to_string()]
        );
    }

    #[test]
    fn test_partial_nodes_indexed_by_leading_run() {
        let mut node = Node::with_labels("4".to_string(), vec!["Person".to_string()]);
        node.set_property("name".to_string(), Value::from("Carol"));
        let index = index_with(&[node]);
        assert_eq!(index.lookup_prefix(&[Value::from("Carol")]), vec!["4".to_string()]);

        let mut missing_first = Node::with_labels("5".to_string(), vec!["Person".to_string()]);
        missing_first.set_property("age".to_string(), Value::Integer(5));
        let index = index_with(&[missing_first]);
        assert!(index.is_empty());
    }

    #[test]
    fn test_update_and_remove() {
        let mut index = index_with(&[person("1", "Alice", 30)]);
        let renamed = person("1", "Alicia", 30);
        index.update("1", Some(&renamed));
        assert!(index.lookup_prefix(&[Value::from("Alice")]).is_empty());
        assert_eq!(index.lookup_prefix(&[Value::from("Alicia")]), vec!["1".to_string()]);

        index.update("1", None);
        assert!(index.is_empty());
    }
}
