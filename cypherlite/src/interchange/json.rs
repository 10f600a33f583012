// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! JSON import and export of whole graphs
//!
//! Documents hold a `nodes` array and a `relationships` array. Import keeps
//! the ids it is given and produces one batch of mutations, which the caller
//! commits as a single transaction. Export sorts nodes and relationships by
//! id so the same graph always produces the same text.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use thiserror::Error;

use crate::storage::value::properties_to_json;
use crate::storage::{Edge, GraphState, Mutation, Node, Value};
use crate::txn::GraphView;

#[derive(Error, Debug)]
pub enum InterchangeError {
    #[error("Invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate id '{0}' in document")]
    DuplicateId(String),

    #[error("Id '{0}' already exists in the graph")]
    ExistingId(String),

    #[error("Relationship '{relationship}' refers to missing node '{node}'")]
    MissingEndpoint { relationship: String, node: String },

    #[error("Property '{key}' of '{entity}' cannot be stored: {reason}")]
    InvalidProperty {
        entity: String,
        key: String,
        reason: String,
    },

    #[error("Relationship '{0}' has an empty type")]
    MissingType(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Map<String, Json>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(alias = "start", alias = "startNode")]
    pub source: String,
    #[serde(alias = "end", alias = "endNode")]
    pub target: String,
    #[serde(default)]
    pub properties: Map<String, Json>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default, alias = "edges")]
    pub relationships: Vec<RelationshipRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub nodes_imported: usize,
    pub relationships_imported: usize,
}

impl GraphDocument {
    pub fn parse(text: &str) -> Result<Self, InterchangeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Document of every node and relationship in `state`, sorted by id
    pub fn from_state(state: &GraphState) -> Self {
        let mut nodes: Vec<&Node> = state.graph.nodes().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut edges: Vec<&Edge> = state.graph.edges().collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            nodes: nodes
                .into_iter()
                .map(|node| NodeRecord {
                    id: Some(node.id.clone()),
                    labels: node.labels.clone(),
                    properties: property_object(&node.properties),
                })
                .collect(),
            relationships: edges
                .into_iter()
                .map(|edge| RelationshipRecord {
                    id: Some(edge.id.clone()),
                    rel_type: edge.rel_type.clone(),
                    source: edge.from_node.clone(),
                    target: edge.to_node.clone(),
                    properties: property_object(&edge.properties),
                })
                .collect(),
        }
    }

    pub fn to_json_string(&self) -> Result<String, InterchangeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Mutations creating this document's contents on top of `view`.
    ///
    /// Records without an id get a fresh one. Ids may not repeat within the
    /// document or collide with existing entities, and every relationship
    /// endpoint must be in the document or already in the graph.
    pub fn into_mutations(
        self,
        view: &GraphView<'_>,
    ) -> Result<(Vec<Mutation>, ImportReport), InterchangeError> {
        let mut mutations = Vec::with_capacity(self.nodes.len() + self.relationships.len());
        let mut seen: HashSet<String> = HashSet::new();
        let mut report = ImportReport::default();

        for record in self.nodes {
            let mut node = match record.id {
                Some(id) => Node::with_labels(id, record.labels),
                None => Node::generate(record.labels),
            };
            claim_id(&node.id, &mut seen, view.node(&node.id).is_some())?;
            for (key, json) in record.properties {
                if let Some(value) = storable_property(&node.id, &key, &json)? {
                    node.set_property(key, value);
                }
            }
            mutations.push(Mutation::CreateNode(node));
            report.nodes_imported += 1;
        }

        for record in self.relationships {
            let mut edge = match record.id {
                Some(id) => Edge::new(id, record.source, record.target, record.rel_type),
                None => Edge::generate(record.source, record.target, record.rel_type),
            };
            if edge.rel_type.is_empty() {
                return Err(InterchangeError::MissingType(edge.id));
            }
            claim_id(&edge.id, &mut seen, view.edge(&edge.id).is_some())?;
            for endpoint in [&edge.from_node, &edge.to_node] {
                if !seen.contains(endpoint) && view.node(endpoint).is_none() {
                    return Err(InterchangeError::MissingEndpoint {
                        relationship: edge.id.clone(),
                        node: endpoint.clone(),
                    });
                }
            }
            for (key, json) in record.properties {
                if let Some(value) = storable_property(&edge.id, &key, &json)? {
                    edge.set_property(key, value);
                }
            }
            mutations.push(Mutation::CreateEdge(edge));
            report.relationships_imported += 1;
        }

        Ok((mutations, report))
    }
}

fn claim_id(id: &str, seen: &mut HashSet<String>, exists: bool) -> Result<(), InterchangeError> {
    if exists {
        return Err(InterchangeError::ExistingId(id.to_string()));
    }
    if !seen.insert(id.to_string()) {
        return Err(InterchangeError::DuplicateId(id.to_string()));
    }
    Ok(())
}

/// Null properties are skipped; maps and nested lists are rejected
fn storable_property(entity: &str, key: &str, json: &Json) -> Result<Option<Value>, InterchangeError> {
    let value = Value::from_json(json);
    if value.is_null() {
        return Ok(None);
    }
    if !value.is_storable() {
        return Err(InterchangeError::InvalidProperty {
            entity: entity.to_string(),
            key: key.to_string(),
            reason: format!("{} values are not allowed as properties", value.type_name()),
        });
    }
    Ok(Some(value))
}

fn property_object(properties: &std::collections::HashMap<String, Value>) -> Map<String, Json> {
    match properties_to_json(properties) {
        Json::Object(object) => object,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ApplyMode;

    fn empty_state() -> GraphState {
        GraphState::new()
    }

    #[test]
    fn test_relationship_endpoint_aliases() {
        let text = r#"{
            "nodes": [{"id": "a"}, {"id": "b"}, {"id": "c"}],
            "relationships": [
                {"id": "r1", "type": "T", "source": "a", "target": "b"},
                {"id": "r2", "type": "T", "start": "b", "end": "c"},
                {"id": "r3", "type": "T", "startNode": "c", "endNode": "a"}
            ]
        }"#;
        let document = GraphDocument::parse(text).unwrap();
        let endpoints: Vec<(&str, &str)> = document
            .relationships
            .iter()
            .map(|r| (r.source.as_str(), r.target.as_str()))
            .collect();
        assert_eq!(endpoints, vec![("a", "b"), ("b", "c"), ("c", "a")]);
    }

    #[test]
    fn test_import_preserves_ids_and_skips_nulls() {
        let state = empty_state();
        let view = GraphView::new(&state, None);
        let document = GraphDocument::parse(
            r#"{"nodes":[{"id":"n1","labels":["Person","Person"],"properties":{"name":"Ann","age":null}}]}"#,
        )
        .unwrap();
        let (mutations, report) = document.into_mutations(&view).unwrap();
        assert_eq!(report.nodes_imported, 1);
        match &mutations[0] {
            Mutation::CreateNode(node) => {
                assert_eq!(node.id, "n1");
                assert_eq!(node.labels, vec!["Person".to_string()]);
                assert_eq!(node.get_property("name"), Some(&Value::String("Ann".into())));
                assert!(node.get_property("age").is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_import_rejects_bad_documents() {
        let mut state = empty_state();
        state
            .apply(&Mutation::CreateNode(Node::new("taken".into())), ApplyMode::Checked)
            .unwrap();
        let view = GraphView::new(&state, None);

        let duplicate = GraphDocument::parse(r#"{"nodes":[{"id":"x"},{"id":"x"}]}"#).unwrap();
        assert!(matches!(
            duplicate.into_mutations(&view),
            Err(InterchangeError::DuplicateId(id)) if id == "x"
        ));

        let existing = GraphDocument::parse(r#"{"nodes":[{"id":"taken"}]}"#).unwrap();
        assert!(matches!(
            existing.into_mutations(&view),
            Err(InterchangeError::ExistingId(_))
        ));

        let dangling = GraphDocument::parse(
            r#"{"relationships":[{"id":"r","type":"T","source":"taken","target":"ghost"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            dangling.into_mutations(&view),
            Err(InterchangeError::MissingEndpoint { node, .. }) if node == "ghost"
        ));

        let nested = GraphDocument::parse(r#"{"nodes":[{"id":"m","properties":{"p":{"a":1}}}]}"#).unwrap();
        assert!(matches!(
            nested.into_mutations(&view),
            Err(InterchangeError::InvalidProperty { .. })
        ));
    }

    #[test]
    fn test_export_is_sorted_by_id() {
        let mut state = empty_state();
        for id in ["n3", "n1", "n2"] {
            state
                .apply(&Mutation::CreateNode(Node::new(id.into())), ApplyMode::Checked)
                .unwrap();
        }
        state
            .apply(
                &Mutation::CreateEdge(Edge::new("e2".into(), "n1".into(), "n2".into(), "T".into())),
                ApplyMode::Checked,
            )
            .unwrap();
        state
            .apply(
                &Mutation::CreateEdge(Edge::new("e1".into(), "n2".into(), "n3".into(), "T".into())),
                ApplyMode::Checked,
            )
            .unwrap();

        let document = GraphDocument::from_state(&state);
        let node_ids: Vec<_> = document.nodes.iter().filter_map(|n| n.id.clone()).collect();
        assert_eq!(node_ids, vec!["n1", "n2", "n3"]);
        let edge_ids: Vec<_> = document.relationships.iter().filter_map(|r| r.id.clone()).collect();
        assert_eq!(edge_ids, vec!["e1", "e2"]);
        assert_eq!(
            document.to_json_string().unwrap(),
            GraphDocument::from_state(&state).to_json_string().unwrap()
        );
    }
}
