// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory graph cache implementation
//!
//! Authoritative storage for committed nodes and relationships. Uses ordered
//! maps so that scans are deterministic, with label and type indices and
//! adjacency lists for traversal.

use crate::storage::types::{Edge, GraphError, Node};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// In-memory graph with indices for fast lookups
#[derive(Debug, Clone, Default)]
pub struct GraphCache {
    /// All nodes indexed by ID
    nodes: BTreeMap<String, Node>,

    /// All edges indexed by ID
    edges: BTreeMap<String, Edge>,

    /// Index: label -> node IDs with that label
    node_labels: HashMap<String, BTreeSet<String>>,

    /// Index: relationship type -> edge IDs with that type
    edge_types: HashMap<String, BTreeSet<String>>,

    /// Adjacency list: node_id -> outgoing edge IDs
    adjacency_out: HashMap<String, BTreeSet<String>>,

    /// Adjacency list: node_id -> incoming edge IDs
    adjacency_in: HashMap<String, BTreeSet<String>>,
}

impl GraphCache {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::NodeAlreadyExists(node.id));
        }

        for label in &node.labels {
            self.node_labels
                .entry(label.clone())
                .or_default()
                .insert(node.id.clone());
        }

        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Replace a node's labels and properties, returning the previous state
    pub fn replace_node(&mut self, node: Node) -> Result<Node, GraphError> {
        let old = self
            .nodes
            .remove(&node.id)
            .ok_or_else(|| GraphError::NodeNotFound(node.id.clone()))?;

        for label in &old.labels {
            if !node.labels.contains(label) {
                self.unindex_label(label, &node.id);
            }
        }
        for label in &node.labels {
            self.node_labels
                .entry(label.clone())
                .or_default()
                .insert(node.id.clone());
        }

        self.nodes.insert(node.id.clone(), node);
        Ok(old)
    }

    /// Add an edge to the graph. Both endpoints must already exist.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if self.edges.contains_key(&edge.id) {
            return Err(GraphError::EdgeAlreadyExists(edge.id));
        }

        if !self.nodes.contains_key(&edge.from_node) || !self.nodes.contains_key(&edge.to_node) {
            return Err(GraphError::MissingEndpoint {
                edge: edge.id.clone(),
                from: edge.from_node.clone(),
                to: edge.to_node.clone(),
            });
        }

        self.edge_types
            .entry(edge.rel_type.clone())
            .or_default()
            .insert(edge.id.clone());
        self.adjacency_out
            .entry(edge.from_node.clone())
            .or_default()
            .insert(edge.id.clone());
        self.adjacency_in
            .entry(edge.to_node.clone())
            .or_default()
            .insert(edge.id.clone());

        self.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    /// Replace an edge's properties, returning the previous state.
    /// Endpoints and type are immutable.
    pub fn replace_edge(&mut self, edge: Edge) -> Result<Edge, GraphError> {
        let existing = self
            .edges
            .get_mut(&edge.id)
            .ok_or_else(|| GraphError::EdgeNotFound(edge.id.clone()))?;
        if existing.from_node != edge.from_node
            || existing.to_node != edge.to_node
            || existing.rel_type != edge.rel_type
        {
            return Err(GraphError::PropertyError(format!(
                "Relationship {} cannot change its endpoints or type",
                edge.id
            )));
        }
        Ok(std::mem::replace(existing, edge))
    }

    /// Get a node by ID
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Get an edge by ID
    pub fn get_edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// IDs of all nodes with a specific label, in id order
    pub fn node_ids_by_label(&self, label: &str) -> Vec<String> {
        self.node_labels
            .get(label)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// IDs of all nodes, in id order
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Iterate over all nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterate over all edges in id order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Get all outgoing edges from a node
    pub fn get_outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.adjacency_out
            .get(node_id)
            .map(|edge_ids| {
                edge_ids
                    .iter()
                    .filter_map(|id| self.edges.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get all incoming edges to a node
    pub fn get_incoming_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.adjacency_in
            .get(node_id)
            .map(|edge_ids| {
                edge_ids
                    .iter()
                    .filter_map(|id| self.edges.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn unindex_label(&mut self, label: &str, node_id: &str) {
        if let Some(nodes) = self.node_labels.get_mut(label) {
            nodes.remove(node_id);
            if nodes.is_empty() {
                self.node_labels.remove(label);
            }
        }
    }

    /// Get graph statistics
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            label_counts: self
                .node_labels
                .iter()
                .map(|(label, ids)| (label.clone(), ids.len()))
                .collect(),
            type_counts: self
                .edge_types
                .iter()
                .map(|(rel_type, ids)| (rel_type.clone(), ids.len()))
                .collect(),
        }
    }

    #[cfg(test)]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes carrying `label`
    pub fn label_count(&self, label: &str) -> usize {
        self.node_labels.get(label).map(|ids| ids.len()).unwrap_or(0)
    }
}

/// Graph statistics
#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub label_counts: HashMap<String, usize>,
    pub type_counts: HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str) -> Node {
        Node::with_labels(id.to_string(), vec!["Person".to_string()])
    }

    #[test]
    fn test_edge_requires_endpoints() {
        let mut graph = GraphCache::new();
        graph.add_node(person("a")).unwrap();
        let edge = Edge::new("e1".into(), "a".into(), "missing".into(), "KNOWS".into());
        match graph.add_edge(edge) {
            Err(GraphError::MissingEndpoint { .. }) => {}
            other => panic!("Expected MissingEndpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_remove_connected_node_fails() {
        let mut graph = GraphCache::new();
        graph.add_node(person("a")).unwrap();
        graph.add_node(person("b")).unwrap();
        graph
            .add_edge(Edge::new("e1".into(), "a".into(), "b".into(), "KNOWS".into()))
            .unwrap();

        match graph.remove_node("a") {
            Err(GraphError::NodeHasRelationships { count, .. }) => assert_eq!(count, 1),
            other => panic!("Expected NodeHasRelationships, got {:?}", other),
        }

        graph.remove_edge("e1").unwrap();
        graph.remove_node("a").unwrap();
        assert_eq!(graph.node_count(), 1);
        assert!(graph.stats().type_counts.is_empty());
    }

    #[test]
    fn test_replace_node_reindexes_labels() {
        let mut graph = GraphCache::new();
        graph.add_node(person("a")).unwrap();
        let updated = Node::with_labels("a".to_string(), vec!["Robot".to_string()]);
        let old = graph.replace_node(updated).unwrap();
        assert!(old.has_label("Person"));
        assert!(graph.node_ids_by_label("Person").is_empty());
        assert_eq!(graph.node_ids_by_label("Robot"), vec!["a".to_string()]);
        assert_eq!(graph.stats().label_counts.get("Robot"), Some(&1));
        assert!(!graph.stats().label_counts.contains_key("Person"));
    }

    #[test]
    fn test_self_loop_adjacency() {
        let mut graph = GraphCache::new();
        graph.add_node(person("a")).unwrap();
        graph
            .add_edge(Edge::new("e1".into(), "a".into(), "a".into(), "LIKES".into()))
            .unwrap();
        assert_eq!(graph.get_outgoing_edges("a").len(), 1);
        assert_eq!(graph.get_incoming_edges("a").len(), 1);
    }
}
