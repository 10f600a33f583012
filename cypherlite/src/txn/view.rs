// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Read view over committed state plus a transaction's own writes
//!
//! Committed entities a transaction overwrote or deleted are masked by the
//! overlay; entities it created are merged in. All id listings are sorted
//! so traversal order does not depend on hashing.

use std::collections::BTreeSet;

use super::log::TransactionOverlay;
use crate::storage::indexes::traits::VectorHit;
use crate::storage::indexes::IndexError;
use crate::storage::{Edge, GraphError, GraphState, Node, Value};

#[derive(Clone, Copy)]
pub struct GraphView<'a> {
    state: &'a GraphState,
    overlay: Option<&'a TransactionOverlay>,
}

impl<'a> GraphView<'a> {
    pub fn new(state: &'a GraphState, overlay: Option<&'a TransactionOverlay>) -> Self {
        Self { state, overlay }
    }

    pub fn node(&self, id: &str) -> Option<&'a Node> {
        if let Some(overlay) = self.overlay {
            if let Some(image) = overlay.node(id) {
                return image;
            }
        }
        self.state.graph.get_node(id)
    }

    pub fn edge(&self, id: &str) -> Option<&'a Edge> {
        if let Some(overlay) = self.overlay {
            if let Some(image) = overlay.edge(id) {
                return image;
            }
        }
        self.state.graph.get_edge(id)
    }

    /// All node ids in id order
    pub fn node_ids(&self) -> Vec<String> {
        match self.overlay {
            None => self.state.graph.node_ids(),
            Some(overlay) => {
                let mut ids: BTreeSet<String> = self
                    .state
                    .graph
                    .node_ids()
                    .into_iter()
                    .filter(|id| !overlay.touches_node(id))
                    .collect();
                ids.extend(overlay.nodes().map(|n| n.id.clone()));
                ids.into_iter().collect()
            }
        }
    }

    /// Ids of nodes carrying `label`, in id order
    pub fn node_ids_by_label(&self, label: &str) -> Vec<String> {
        match self.overlay {
            None => self.state.graph.node_ids_by_label(label),
            Some(overlay) => {
                let mut ids: BTreeSet<String> = self
                    .state
                    .graph
                    .node_ids_by_label(label)
                    .into_iter()
                    .filter(|id| !overlay.touches_node(id))
                    .collect();
                ids.extend(
                    overlay
                        .nodes()
                        .filter(|n| n.has_label(label))
                        .map(|n| n.id.clone()),
                );
                ids.into_iter().collect()
            }
        }
    }

    /// All relationship ids in id order
    pub fn edge_ids(&self) -> Vec<String> {
        let committed = self.state.graph.edges().map(|e| e.id.clone());
        let mut ids: BTreeSet<String> = match self.overlay {
            None => committed.collect(),
            Some(overlay) => committed.filter(|id| !overlay.touches_edge(id)).collect(),
        };
        if let Some(overlay) = self.overlay {
            ids.extend(overlay.edges().map(|e| e.id.clone()));
        }
        ids.into_iter().collect()
    }

    fn merge_edges(
        &self,
        committed: Vec<&'a Edge>,
        endpoint_matches: impl Fn(&Edge) -> bool,
    ) -> Vec<&'a Edge> {
        let overlay = match self.overlay {
            Some(overlay) => overlay,
            None => return committed,
        };
        let mut edges: Vec<&'a Edge> = committed
            .into_iter()
            .filter(|e| !overlay.touches_edge(&e.id))
            .collect();
        edges.extend(overlay.edges().filter(|e| endpoint_matches(e)));
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        edges
    }

    /// Relationships leaving `node_id`, in edge id order
    pub fn outgoing(&self, node_id: &str) -> Vec<&'a Edge> {
        let committed = self.state.graph.get_outgoing_edges(node_id);
        self.merge_edges(committed, |e| e.from_node == node_id)
    }

    /// Relationships entering `node_id`, in edge id order
    pub fn incoming(&self, node_id: &str) -> Vec<&'a Edge> {
        let committed = self.state.graph.get_incoming_edges(node_id);
        self.merge_edges(committed, |e| e.to_node == node_id)
    }

    /// Relationships touching `node_id` in either direction, each once
    pub fn relationships(&self, node_id: &str) -> Vec<&'a Edge> {
        let mut edges = self.outgoing(node_id);
        for edge in self.incoming(node_id) {
            if edge.from_node != edge.to_node {
                edges.push(edge);
            }
        }
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        edges
    }

    pub fn degree(&self, node_id: &str) -> usize {
        self.relationships(node_id).len()
    }

    /// Candidate ids from a composite index, corrected for uncommitted writes
    pub fn index_lookup(&self, index_name: &str, values: &[Value]) -> Result<Vec<String>, GraphError> {
        let columns = self
            .state
            .indexes
            .property_index_columns(index_name)
            .ok_or_else(|| GraphError::IndexError(format!("no property index '{}'", index_name)))?;
        let label = self
            .state
            .indexes
            .definition(index_name)
            .map(|d| d.label.clone())
            .unwrap_or_default();
        let committed = self
            .state
            .indexes
            .lookup_property(index_name, &self.state.graph, values)?;

        let overlay = match self.overlay {
            Some(overlay) => overlay,
            None => return Ok(committed),
        };
        let matches = |node: &Node| {
            node.has_label(&label)
                && columns.iter().zip(values).all(|(column, value)| {
                    node.get_property(column)
                        .map(|v| v.equals(value) == Some(true))
                        .unwrap_or(false)
                })
        };
        let mut ids: BTreeSet<String> = committed
            .into_iter()
            .filter(|id| !overlay.touches_node(id))
            .collect();
        ids.extend(overlay.nodes().filter(|n| matches(n)).map(|n| n.id.clone()));
        Ok(ids.into_iter().collect())
    }

    fn node_changes(&self) -> Vec<(&'a str, Option<&'a Node>)> {
        self.overlay.map(|o| o.node_changes()).unwrap_or_default()
    }

    /// Nearest neighbours from a vector index, including this transaction's
    /// own writes
    pub fn vector_search(&self, index_name: &str, query: &[f32], k: usize) -> Result<Vec<VectorHit>, IndexError> {
        self.state
            .indexes
            .vector_search_with_changes(index_name, query, k, &self.node_changes())
    }

    /// Ranked fulltext hits, including this transaction's own writes
    pub fn fulltext_search(&self, index_name: &str, query: &str, limit: usize) -> Result<Vec<(String, f64)>, IndexError> {
        self.state
            .indexes
            .fulltext_search_with_changes(index_name, query, limit, &self.node_changes())
    }

    /// Check uniqueness constraints for `node` against this view
    pub fn check_unique(&self, node: &Node) -> Result<(), GraphError> {
        for constraint in self.state.constraints.for_labels(&node.labels) {
            let value = match node.get_property(&constraint.property) {
                Some(value) => value,
                None => continue,
            };
            let holders =
                self.index_lookup(&constraint.backing_index_name(), std::slice::from_ref(value))?;
            if holders.iter().any(|id| id != &node.id) {
                return Err(GraphError::UniqueViolation {
                    constraint: constraint.name.clone(),
                    node: node.id.clone(),
                    label: constraint.label.clone(),
                    property: constraint.property.clone(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ApplyMode, ConstraintDefinition, Mutation};

    fn person(id: &str, name: &str) -> Node {
        let mut node = Node::with_labels(id.to_string(), vec!["Person".to_string()]);
        node.set_property("name".to_string(), Value::from(name));
        node
    }

    fn edge(id: &str, from: &str, to: &str) -> Edge {
        Edge::new(id.to_string(), from.to_string(), to.to_string(), "KNOWS".to_string())
    }

    fn committed_state() -> GraphState {
        let mut state = GraphState::new();
        state
            .apply(
                &Mutation::CreateConstraint(ConstraintDefinition::unique(
                    "person_name",
                    "Person",
                    "name",
                )),
                ApplyMode::Checked,
            )
            .unwrap();
        state
            .apply_all(&[
                Mutation::CreateNode(person("a", "Ann")),
                Mutation::CreateNode(person("b", "Bob")),
                Mutation::CreateEdge(edge("e1", "a", "b")),
            ])
            .unwrap();
        state
    }

    #[test]
    fn test_overlay_masks_and_merges() {
        let state = committed_state();
        let mut overlay = TransactionOverlay::new();
        overlay.apply(&Mutation::CreateNode(person("c", "Cid")));
        overlay.apply(&Mutation::DeleteEdge("e1".to_string()));
        overlay.apply(&Mutation::CreateEdge(edge("e2", "a", "c")));

        let view = GraphView::new(&state, Some(&overlay));
        assert_eq!(view.node_ids_by_label("Person"), vec!["a", "b", "c"]);
        let out: Vec<&str> = view.outgoing("a").iter().map(|e| e.id.as_str()).collect();
        assert_eq!(out, vec!["e2"]);
        assert!(view.incoming("b").is_empty());
        assert_eq!(view.degree("c"), 1);

        let committed = GraphView::new(&state, None);
        assert_eq!(committed.outgoing("a").len(), 1);
        assert!(committed.node("c").is_none());
    }

    #[test]
    fn test_unique_check_sees_own_writes() {
        let state = committed_state();
        let mut overlay = TransactionOverlay::new();
        overlay.apply(&Mutation::CreateNode(person("c", "Cid")));
        let view = GraphView::new(&state, Some(&overlay));

        assert!(view.check_unique(&person("d", "Cid")).is_err());
        assert!(view.check_unique(&person("d", "Ann")).is_err());
        assert!(view.check_unique(&person("d", "Dee")).is_ok());

        // Renaming Ann inside the transaction frees her old value
        overlay.apply(&Mutation::UpdateNode(person("a", "Annie")));
        let view = GraphView::new(&state, Some(&overlay));
        assert!(view.check_unique(&person("d", "Ann")).is_ok());
    }
}
