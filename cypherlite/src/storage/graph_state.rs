// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Committed graph state
//!
//! `GraphState` bundles the graph, its secondary indexes and the constraint
//! set so that all three change together under one write lock. Every change
//! goes through [`GraphState::apply`], which returns the inverse mutation so
//! a failed commit can be unwound in reverse order.

use crate::storage::constraints::{ConstraintDefinition, ConstraintSet};
use crate::storage::indexes::{IndexDefinition, IndexError, IndexManager};
use crate::storage::mutation::{ApplyMode, Mutation};
use crate::storage::types::{Edge, GraphError, Node};
use crate::storage::GraphCache;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Complete serializable image of the committed state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphImage {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub indexes: Vec<IndexDefinition>,
    pub constraints: Vec<ConstraintDefinition>,
}

impl GraphImage {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.edges.is_empty()
            && self.indexes.is_empty()
            && self.constraints.is_empty()
    }
}

impl From<IndexError> for GraphError {
    fn from(e: IndexError) -> Self {
        GraphError::IndexError(e.to_string())
    }
}

/// Graph, indexes and constraints guarded as one unit
#[derive(Debug, Default)]
pub struct GraphState {
    pub graph: GraphCache,
    pub indexes: IndexManager,
    pub constraints: ConstraintSet,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a state from an image. Index contents are derived from the
    /// nodes, so only the definitions are taken from the image.
    pub fn from_image(image: GraphImage) -> Result<Self, GraphError> {
        let mut state = Self::new();
        for node in image.nodes {
            state.graph.add_node(node)?;
        }
        for edge in image.edges {
            state.graph.add_edge(edge)?;
        }
        for constraint in image.constraints {
            state.constraints.insert(constraint);
        }
        for definition in image.indexes {
            state.indexes.create_index(definition, &state.graph)?;
        }
        Ok(state)
    }

    /// Capture the state, ordered by id
    pub fn to_image(&self) -> GraphImage {
        GraphImage {
            nodes: self.graph.nodes().cloned().collect(),
            edges: self.graph.edges().cloned().collect(),
            indexes: self.indexes.definitions(),
            constraints: self.constraints.definitions(),
        }
    }

    /// Apply one mutation and return its inverse.
    ///
    /// Under `Replay`, creates of existing entities become updates and
    /// deletes of missing entities are skipped; `None` is returned when
    /// nothing changed.
    pub fn apply(
        &mut self,
        mutation: &Mutation,
        mode: ApplyMode,
    ) -> Result<Option<Mutation>, GraphError> {
        let replay = mode == ApplyMode::Replay;
        match mutation {
            Mutation::CreateNode(node) => {
                if replay && self.graph.get_node(&node.id).is_some() {
                    return self.apply(&Mutation::UpdateNode(node.clone()), mode);
                }
                if mode == ApplyMode::Checked {
                    self.check_unique(node)?;
                }
                self.graph.add_node(node.clone())?;
                self.indexes.node_changed(&node.id, None, Some(node));
                Ok(Some(Mutation::DeleteNode(node.id.clone())))
            }
            Mutation::UpdateNode(node) => {
                if self.graph.get_node(&node.id).is_none() {
                    if replay {
                        return self.apply(&Mutation::CreateNode(node.clone()), mode);
                    }
                    return Err(GraphError::NodeNotFound(node.id.clone()));
                }
                if mode == ApplyMode::Checked {
                    self.check_unique(node)?;
                }
                let old = self.graph.replace_node(node.clone())?;
                self.indexes.node_changed(&node.id, Some(&old), Some(node));
                Ok(Some(Mutation::UpdateNode(old)))
            }
            Mutation::DeleteNode(id) => {
                if replay && self.graph.get_node(id).is_none() {
                    return Ok(None);
                }
                let old = self.graph.remove_node(id)?;
                self.indexes.node_changed(id, Some(&old), None);
                Ok(Some(Mutation::CreateNode(old)))
            }
            Mutation::CreateEdge(edge) => {
                if replay && self.graph.get_edge(&edge.id).is_some() {
                    return self.apply(&Mutation::UpdateEdge(edge.clone()), mode);
                }
                self.graph.add_edge(edge.clone())?;
                Ok(Some(Mutation::DeleteEdge(edge.id.clone())))
            }
            Mutation::UpdateEdge(edge) => {
                if replay && self.graph.get_edge(&edge.id).is_none() {
                    return self.apply(&Mutation::CreateEdge(edge.clone()), mode);
                }
                let old = self.graph.replace_edge(edge.clone())?;
                Ok(Some(Mutation::UpdateEdge(old)))
            }
            Mutation::DeleteEdge(id) => {
                if replay && self.graph.get_edge(id).is_none() {
                    return Ok(None);
                }
                let old = self.graph.remove_edge(id)?;
                Ok(Some(Mutation::CreateEdge(old)))
            }
            Mutation::CreateIndex(definition) => {
                if self.indexes.definition(&definition.name).is_some() {
                    if replay {
                        return Ok(None);
                    }
                    return Err(GraphError::SchemaError(format!(
                        "An index named '{}' already exists",
                        definition.name
                    )));
                }
                self.indexes.create_index(definition.clone(), &self.graph)?;
                Ok(Some(Mutation::DropIndex(definition.name.clone())))
            }
            Mutation::DropIndex(name) => {
                let owner = match self.indexes.definition(name) {
                    Some(definition) => definition.owning_constraint.clone(),
                    None if replay => return Ok(None),
                    None => {
                        return Err(GraphError::SchemaError(format!(
                            "There is no index named '{}'",
                            name
                        )))
                    }
                };
                if let (Some(constraint), ApplyMode::Checked) = (owner, mode) {
                    return Err(GraphError::SchemaError(format!(
                        "Index '{}' belongs to constraint '{}'; drop the constraint instead",
                        name, constraint
                    )));
                }
                let definition = self.indexes.drop_index(name)?;
                Ok(Some(Mutation::CreateIndex(definition)))
            }
            Mutation::CreateConstraint(constraint) => {
                if self.constraints.get(&constraint.name).is_some() {
                    if replay {
                        return Ok(None);
                    }
                    return Err(GraphError::SchemaError(format!(
                        "A constraint named '{}' already exists",
                        constraint.name
                    )));
                }
                self.create_constraint(constraint, mode)?;
                Ok(Some(Mutation::DropConstraint(constraint.name.clone())))
            }
            Mutation::DropConstraint(name) => {
                let constraint = match self.constraints.remove(name) {
                    Some(constraint) => constraint,
                    None if replay => return Ok(None),
                    None => {
                        return Err(GraphError::SchemaError(format!(
                            "There is no constraint named '{}'",
                            name
                        )))
                    }
                };
                let backing = constraint.backing_index_name();
                if self.indexes.definition(&backing).is_some() {
                    self.indexes.drop_index(&backing)?;
                }
                Ok(Some(Mutation::CreateConstraint(constraint)))
            }
        }
    }

    /// Apply a batch, unwinding everything already applied on the first
    /// failure. Returns the inverses in application order.
    pub fn apply_all(&mut self, mutations: &[Mutation]) -> Result<Vec<Mutation>, GraphError> {
        let mut inverses = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            match self.apply(mutation, ApplyMode::Checked) {
                Ok(Some(inverse)) => inverses.push(inverse),
                Ok(None) => {}
                Err(e) => {
                    debug!("Mutation '{}' failed: {}", mutation.describe(), e);
                    self.undo(inverses);
                    return Err(e);
                }
            }
        }
        Ok(inverses)
    }

    /// Apply inverses in reverse order
    pub fn undo(&mut self, inverses: Vec<Mutation>) {
        for inverse in inverses.into_iter().rev() {
            if let Err(e) = self.apply(&inverse, ApplyMode::Undo) {
                warn!("Undo of '{}' failed: {}", inverse.describe(), e);
            }
        }
    }

    /// Reject `node` if another node already holds a constrained value
    pub fn check_unique(&self, node: &Node) -> Result<(), GraphError> {
        for constraint in self.constraints.for_labels(&node.labels) {
            let value = match node.get_property(&constraint.property) {
                Some(value) => value,
                None => continue,
            };
            let holders = self.indexes.lookup_property(
                &constraint.backing_index_name(),
                &self.graph,
                std::slice::from_ref(value),
            )?;
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

    fn create_constraint(
        &mut self,
        constraint: &ConstraintDefinition,
        mode: ApplyMode,
    ) -> Result<(), GraphError> {
        let backing = constraint.backing_index_name();
        if self.indexes.definition(&backing).is_none() {
            let mut definition = IndexDefinition::property(
                backing.clone(),
                constraint.label.clone(),
                vec![constraint.property.clone()],
            );
            definition.owning_constraint = Some(constraint.name.clone());
            self.indexes.create_index(definition, &self.graph)?;
        }

        if mode == ApplyMode::Checked {
            if let Err(e) = self.validate_existing(constraint, &backing) {
                self.indexes.drop_index(&backing)?;
                return Err(e);
            }
        }
        self.constraints.insert(constraint.clone());
        Ok(())
    }

    /// Existing data must already satisfy a new constraint
    fn validate_existing(
        &self,
        constraint: &ConstraintDefinition,
        backing: &str,
    ) -> Result<(), GraphError> {
        for node_id in self.graph.node_ids_by_label(&constraint.label) {
            let node = match self.graph.get_node(&node_id) {
                Some(node) => node,
                None => continue,
            };
            if let Some(value) = node.get_property(&constraint.property) {
                let holders = self.indexes.lookup_property(
                    backing,
                    &self.graph,
                    std::slice::from_ref(value),
                )?;
                if holders.len() > 1 {
                    return Err(GraphError::UniqueViolation {
                        constraint: constraint.name.clone(),
                        node: node_id.clone(),
                        label: constraint.label.clone(),
                        property: constraint.property.clone(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;

    fn person(id: &str, email: &str) -> Node {
        let mut node = Node::with_labels(id.to_string(), vec!["Person".to_string()]);
        node.set_property("email".to_string(), Value::from(email));
        node
    }

    fn unique_email() -> Mutation {
        Mutation::CreateConstraint(ConstraintDefinition::unique("person_email", "Person", "email"))
    }

    #[test]
    fn test_apply_and_inverse() {
        let mut state = GraphState::new();
        let inverse = state
            .apply(&Mutation::CreateNode(person("a", "a@x")), ApplyMode::Checked)
            .unwrap();
        assert_eq!(inverse, Some(Mutation::DeleteNode("a".to_string())));
        assert_eq!(state.graph.node_count(), 1);

        state.undo(vec![inverse.unwrap()]);
        assert_eq!(state.graph.node_count(), 0);
    }

    #[test]
    fn test_apply_all_unwinds_on_failure() {
        let mut state = GraphState::new();
        state.apply(&unique_email(), ApplyMode::Checked).unwrap();
        state
            .apply(&Mutation::CreateNode(person("a", "a@x")), ApplyMode::Checked)
            .unwrap();

        let batch = vec![
            Mutation::CreateNode(person("b", "b@x")),
            Mutation::CreateNode(person("c", "a@x")),
        ];
        let err = state.apply_all(&batch).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(state.graph.node_count(), 1);
        assert!(state.graph.get_node("b").is_none());
        assert_eq!(state.indexes.entry_count("person_email_index"), 1);
    }

    #[test]
    fn test_update_keeps_own_unique_value() {
        let mut state = GraphState::new();
        state.apply(&unique_email(), ApplyMode::Checked).unwrap();
        let mut node = person("a", "a@x");
        state
            .apply(&Mutation::CreateNode(node.clone()), ApplyMode::Checked)
            .unwrap();
        node.set_property("name".to_string(), Value::from("Ann"));
        assert!(state
            .apply(&Mutation::UpdateNode(node), ApplyMode::Checked)
            .is_ok());
    }

    #[test]
    fn test_constraint_rejects_existing_duplicates() {
        let mut state = GraphState::new();
        state
            .apply_all(&[
                Mutation::CreateNode(person("a", "dup@x")),
                Mutation::CreateNode(person("b", "dup@x")),
            ])
            .unwrap();
        assert!(state.apply(&unique_email(), ApplyMode::Checked).is_err());
        assert!(state.indexes.definition("person_email_index").is_none());
        assert!(state.constraints.get("person_email").is_none());
    }

    #[test]
    fn test_backing_index_cannot_be_dropped_directly() {
        let mut state = GraphState::new();
        state.apply(&unique_email(), ApplyMode::Checked).unwrap();
        let err = state
            .apply(
                &Mutation::DropIndex("person_email_index".to_string()),
                ApplyMode::Checked,
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::SchemaError(_)));

        state
            .apply(
                &Mutation::DropConstraint("person_email".to_string()),
                ApplyMode::Checked,
            )
            .unwrap();
        assert!(state.indexes.definition("person_email_index").is_none());
    }

    #[test]
    fn test_replay_is_idempotent() {
        let mut state = GraphState::new();
        let create = Mutation::CreateNode(person("a", "a@x"));
        state.apply(&create, ApplyMode::Replay).unwrap();
        state.apply(&create, ApplyMode::Replay).unwrap();
        assert_eq!(state.graph.node_count(), 1);

        let delete = Mutation::DeleteNode("a".to_string());
        state.apply(&delete, ApplyMode::Replay).unwrap();
        assert_eq!(state.apply(&delete, ApplyMode::Replay).unwrap(), None);
    }

    #[test]
    fn test_image_round_trip() {
        let mut state = GraphState::new();
        state.apply(&unique_email(), ApplyMode::Checked).unwrap();
        state
            .apply_all(&[
                Mutation::CreateNode(person("a", "a@x")),
                Mutation::CreateNode(person("b", "b@x")),
                Mutation::CreateEdge(Edge::new(
                    "e1".to_string(),
                    "a".to_string(),
                    "b".to_string(),
                    "KNOWS".to_string(),
                )),
            ])
            .unwrap();

        let image = state.to_image();
        let restored = GraphState::from_image(image.clone()).unwrap();
        assert_eq!(restored.to_image(), image);
        assert_eq!(restored.indexes.entry_count("person_email_index"), 2);
        assert!(restored.check_unique(&person("c", "a@x")).is_err());
    }
}
