// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Storage mutations
//!
//! A `Mutation` is the unit that transactions buffer, the WAL persists and
//! recovery replays. Updates carry the complete after-image of the entity so
//! that replaying a mutation twice converges on the same state.

use crate::storage::constraints::ConstraintDefinition;
use crate::storage::indexes::IndexDefinition;
use crate::storage::types::{Edge, Node};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    CreateNode(Node),
    UpdateNode(Node),
    DeleteNode(String),
    CreateEdge(Edge),
    UpdateEdge(Edge),
    DeleteEdge(String),
    CreateIndex(IndexDefinition),
    DropIndex(String),
    CreateConstraint(ConstraintDefinition),
    DropConstraint(String),
}

impl Mutation {
    /// Operation descriptor stored alongside the payload in WAL records
    pub fn op_code(&self) -> u8 {
        match self {
            Mutation::CreateNode(_) => 1,
            Mutation::UpdateNode(_) => 2,
            Mutation::DeleteNode(_) => 3,
            Mutation::CreateEdge(_) => 4,
            Mutation::UpdateEdge(_) => 5,
            Mutation::DeleteEdge(_) => 6,
            Mutation::CreateIndex(_) => 7,
            Mutation::DropIndex(_) => 8,
            Mutation::CreateConstraint(_) => 9,
            Mutation::DropConstraint(_) => 10,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Mutation::CreateNode(n) => format!("create node {}", n.id),
            Mutation::UpdateNode(n) => format!("update node {}", n.id),
            Mutation::DeleteNode(id) => format!("delete node {}", id),
            Mutation::CreateEdge(e) => format!("create relationship {}", e.id),
            Mutation::UpdateEdge(e) => format!("update relationship {}", e.id),
            Mutation::DeleteEdge(id) => format!("delete relationship {}", id),
            Mutation::CreateIndex(d) => format!("create index {}", d.name),
            Mutation::DropIndex(name) => format!("drop index {}", name),
            Mutation::CreateConstraint(c) => format!("create constraint {}", c.name),
            Mutation::DropConstraint(name) => format!("drop constraint {}", name),
        }
    }

    /// Whether the mutation changes schema rather than data
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            Mutation::CreateIndex(_)
                | Mutation::DropIndex(_)
                | Mutation::CreateConstraint(_)
                | Mutation::DropConstraint(_)
        )
    }
}

/// How strictly a mutation is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Foreground commit: every invariant is enforced
    Checked,
    /// Recovery replay: creates upsert and deletes of missing entities are ignored
    Replay,
    /// Undoing a partially applied commit: restores an earlier valid state
    Undo,
}
