// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph data structures and error types
//!
//! Defines Node and Edge structures for the in-memory graph,
//! along with error types for graph operations.

use crate::storage::value::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Error types for graph operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Relationship not found: {0}")]
    EdgeNotFound(String),

    #[error("Node already exists: {0}")]
    NodeAlreadyExists(String),

    #[error("Relationship already exists: {0}")]
    EdgeAlreadyExists(String),

    #[error("Relationship {edge} references a missing endpoint: ({from})->({to})")]
    MissingEndpoint {
        edge: String,
        from: String,
        to: String,
    },

    #[error("Cannot delete node {id}, because it still has {count} relationship(s). Use DETACH DELETE to remove them first")]
    NodeHasRelationships { id: String, count: usize },

    #[error("Node {node} violates unique constraint '{constraint}': {label}.{property} = {value} already exists")]
    UniqueViolation {
        constraint: String,
        node: String,
        label: String,
        property: String,
        value: String,
    },

    #[error("Property error: {0}")]
    PropertyError(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Schema error: {0}")]
    SchemaError(String),
}

impl GraphError {
    /// Errors that reflect a violated data invariant rather than a missing entity
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            GraphError::MissingEndpoint { .. }
                | GraphError::NodeHasRelationships { .. }
                | GraphError::UniqueViolation { .. }
        )
    }
}

/// Error types for storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Durability error: {0}")]
    DurabilityError(String),
}

/// Graph node with id, labels, and properties
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: HashMap<String, Value>,
}

impl Node {
    /// Create a new node with the given id
    pub fn new(id: String) -> Self {
        Self {
            id,
            labels: Vec::new(),
            properties: HashMap::new(),
        }
    }

    /// Create a new node with id and labels, dropping duplicate labels
    pub fn with_labels(id: String, labels: Vec<String>) -> Self {
        let mut node = Self::new(id);
        for label in labels {
            node.add_label(label);
        }
        node
    }

    /// Create a node with a freshly generated identifier
    pub fn generate(labels: Vec<String>) -> Self {
        Self::with_labels(uuid::Uuid::new_v4().to_string(), labels)
    }

    /// Add a label to this node, returns false when it was already present
    pub fn add_label(&mut self, label: String) -> bool {
        if self.labels.contains(&label) {
            return false;
        }
        self.labels.push(label);
        true
    }

    /// Remove a label, returns true when it was present
    pub fn remove_label(&mut self, label: &str) -> bool {
        let before = self.labels.len();
        self.labels.retain(|l| l != label);
        before != self.labels.len()
    }

    /// Check if node has a specific label
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Set a property value. Null removes the property.
    pub fn set_property(&mut self, key: String, value: Value) {
        if value.is_null() {
            self.properties.remove(&key);
        } else {
            self.properties.insert(key, value);
        }
    }

    /// Get a property value
    pub fn get_property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Remove a property
    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    /// Check if node has a specific property
    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }
}

/// Graph relationship with id, endpoints, type, and properties
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Edge {
    pub id: String,
    pub from_node: String,
    pub to_node: String,
    pub rel_type: String,
    pub properties: HashMap<String, Value>,
}

impl Edge {
    /// Create a new edge
    pub fn new(id: String, from_node: String, to_node: String, rel_type: String) -> Self {
        Self {
            id,
            from_node,
            to_node,
            rel_type,
            properties: HashMap::new(),
        }
    }

    /// Create an edge with a freshly generated identifier
    pub fn generate(from_node: String, to_node: String, rel_type: String) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), from_node, to_node, rel_type)
    }

    /// Set a property value. Null removes the property.
    pub fn set_property(&mut self, key: String, value: Value) {
        if value.is_null() {
            self.properties.remove(&key);
        } else {
            self.properties.insert(key, value);
        }
    }

    /// Get a property value
    pub fn get_property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Remove a property
    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    /// Check if this edge touches the given node on either end
    pub fn touches(&self, node_id: &str) -> bool {
        self.from_node == node_id || self.to_node == node_id
    }

    /// The endpoint opposite to `node_id`
    pub fn other_end(&self, node_id: &str) -> &str {
        if self.from_node == node_id {
            &self.to_node
        } else {
            &self.from_node
        }
    }
}
