// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction operation logging
//!
//! A transaction keeps its pending changes privately as an ordered list of
//! mutations. The overlay indexes the latest after-image of every touched
//! entity so statements inside the transaction read their own writes.

use std::collections::HashMap;

use super::state::TransactionId;
use crate::storage::{Edge, Mutation, Node, Value};

/// Latest uncommitted image of each entity a transaction touched.
/// `None` marks a deletion.
#[derive(Debug, Clone, Default)]
pub struct TransactionOverlay {
    nodes: HashMap<String, Option<Node>>,
    edges: HashMap<String, Option<Edge>>,
}

impl TransactionOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::CreateNode(node) | Mutation::UpdateNode(node) => {
                self.nodes.insert(node.id.clone(), Some(node.clone()));
            }
            Mutation::DeleteNode(id) => {
                self.nodes.insert(id.clone(), None);
            }
            Mutation::CreateEdge(edge) | Mutation::UpdateEdge(edge) => {
                self.edges.insert(edge.id.clone(), Some(edge.clone()));
            }
            Mutation::DeleteEdge(id) => {
                self.edges.insert(id.clone(), None);
            }
            _ => {}
        }
    }

    /// `Some(None)` when the node was deleted, `None` when untouched
    pub fn node(&self, id: &str) -> Option<Option<&Node>> {
        self.nodes.get(id).map(|n| n.as_ref())
    }

    pub fn edge(&self, id: &str) -> Option<Option<&Edge>> {
        self.edges.get(id).map(|e| e.as_ref())
    }

    /// Live nodes written by the transaction
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter_map(|n| n.as_ref())
    }

    /// Live edges written by the transaction
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values().filter_map(|e| e.as_ref())
    }

    /// Every touched node with its latest image, `None` for deletions
    pub fn node_changes(&self) -> Vec<(&str, Option<&Node>)> {
        self.nodes
            .iter()
            .map(|(id, image)| (id.as_str(), image.as_ref()))
            .collect()
    }

    pub fn touches_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn touches_edge(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }
}

/// Transaction operation log for a single transaction
#[derive(Debug, Clone)]
pub struct TransactionLog {
    /// The transaction this log belongs to
    pub transaction_id: TransactionId,
    mutations: Vec<Mutation>,
    overlay: TransactionOverlay,
    /// Memory usage estimate in bytes
    estimated_size_bytes: usize,
}

impl TransactionLog {
    /// Create a new empty transaction log
    pub fn new(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            mutations: Vec::new(),
            overlay: TransactionOverlay::new(),
            estimated_size_bytes: std::mem::size_of::<Self>(),
        }
    }

    /// Buffer a mutation
    pub fn record(&mut self, mutation: Mutation) {
        self.estimated_size_bytes += estimate_mutation_size(&mutation);
        self.overlay.apply(&mutation);
        self.mutations.push(mutation);
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn overlay(&self) -> &TransactionOverlay {
        &self.overlay
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn estimated_size_bytes(&self) -> usize {
        self.estimated_size_bytes
    }

    /// Marker for undoing a failed statement
    pub fn savepoint(&self) -> usize {
        self.mutations.len()
    }

    /// Discard every mutation buffered after `savepoint`
    pub fn rollback_to(&mut self, savepoint: usize) {
        if savepoint >= self.mutations.len() {
            return;
        }
        self.mutations.truncate(savepoint);
        self.overlay.clear();
        self.estimated_size_bytes = std::mem::size_of::<Self>();
        for mutation in &self.mutations {
            self.overlay.apply(mutation);
            self.estimated_size_bytes += estimate_mutation_size(mutation);
        }
    }

    /// Take the buffered mutations, leaving the log empty
    pub fn take(&mut self) -> Vec<Mutation> {
        self.overlay.clear();
        self.estimated_size_bytes = std::mem::size_of::<Self>();
        std::mem::take(&mut self.mutations)
    }
}

fn estimate_mutation_size(mutation: &Mutation) -> usize {
    std::mem::size_of::<Mutation>()
        + match mutation {
            Mutation::CreateNode(node) | Mutation::UpdateNode(node) => estimate_node_size(node),
            Mutation::CreateEdge(edge) | Mutation::UpdateEdge(edge) => estimate_edge_size(edge),
            Mutation::DeleteNode(id)
            | Mutation::DeleteEdge(id)
            | Mutation::DropIndex(id)
            | Mutation::DropConstraint(id) => id.len(),
            Mutation::CreateIndex(definition) => definition.name.len() + definition.label.len(),
            Mutation::CreateConstraint(constraint) => {
                constraint.name.len() + constraint.label.len() + constraint.property.len()
            }
        }
}

fn estimate_node_size(node: &Node) -> usize {
    node.id.len()
        + node.labels.iter().map(|l| l.len()).sum::<usize>()
        + node
            .properties
            .iter()
            .map(|(k, v)| k.len() + estimate_value_size(v))
            .sum::<usize>()
}

fn estimate_edge_size(edge: &Edge) -> usize {
    edge.id.len()
        + edge.from_node.len()
        + edge.to_node.len()
        + edge.rel_type.len()
        + edge
            .properties
            .iter()
            .map(|(k, v)| k.len() + estimate_value_size(v))
            .sum::<usize>()
}

fn estimate_value_size(value: &Value) -> usize {
    match value {
        Value::String(s) => s.len(),
        Value::List(items) => items.iter().map(estimate_value_size).sum(),
        _ => std::mem::size_of::<Value>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Node {
        Node::with_labels(id.to_string(), vec!["Person".to_string()])
    }

    #[test]
    fn test_overlay_tracks_latest_image() {
        let mut log = TransactionLog::new(TransactionId::new());
        log.record(Mutation::CreateNode(node("a")));
        let mut updated = node("a");
        updated.set_property("age".to_string(), Value::Integer(3));
        log.record(Mutation::UpdateNode(updated.clone()));

        assert_eq!(log.len(), 2);
        assert_eq!(log.overlay().node("a"), Some(Some(&updated)));
        assert_eq!(log.overlay().node("b"), None);

        log.record(Mutation::DeleteNode("a".to_string()));
        assert_eq!(log.overlay().node("a"), Some(None));
        assert_eq!(log.overlay().nodes().count(), 0);
    }

    #[test]
    fn test_rollback_to_savepoint() {
        let mut log = TransactionLog::new(TransactionId::new());
        log.record(Mutation::CreateNode(node("a")));
        let savepoint = log.savepoint();
        log.record(Mutation::CreateNode(node("b")));
        log.record(Mutation::DeleteNode("a".to_string()));

        log.rollback_to(savepoint);
        assert_eq!(log.len(), 1);
        assert!(log.overlay().node("a").unwrap().is_some());
        assert!(!log.overlay().touches_node("b"));
    }

    #[test]
    fn test_take_empties_log() {
        let mut log = TransactionLog::new(TransactionId::new());
        log.record(Mutation::CreateNode(node("a")));
        let size = log.estimated_size_bytes();
        assert!(size > std::mem::size_of::<TransactionLog>());

        let taken = log.take();
        assert_eq!(taken.len(), 1);
        assert!(log.is_empty());
        assert!(log.overlay().is_empty());
    }
}
