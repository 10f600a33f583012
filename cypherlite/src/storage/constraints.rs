// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Schema constraints
//!
//! Only uniqueness constraints are supported. Each one is backed by a
//! composite index on the constrained property, created alongside it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    Unique,
}

/// Persisted definition of a constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDefinition {
    pub name: String,
    pub label: String,
    pub property: String,
    pub kind: ConstraintKind,
}

impl ConstraintDefinition {
    pub fn unique(name: impl Into<String>, label: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            property: property.into(),
            kind: ConstraintKind::Unique,
        }
    }

    /// Name of the index that backs this constraint
    pub fn backing_index_name(&self) -> String {
        format!("{}_index", self.name)
    }
}

/// Registry of active constraints
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    constraints: BTreeMap<String, ConstraintDefinition>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, constraint: ConstraintDefinition) -> bool {
        if self.constraints.contains_key(&constraint.name) {
            return false;
        }
        self.constraints.insert(constraint.name.clone(), constraint);
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<ConstraintDefinition> {
        self.constraints.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&ConstraintDefinition> {
        self.constraints.get(name)
    }

    /// Constraint on the same label and property, whatever its name
    pub fn find(&self, label: &str, property: &str) -> Option<&ConstraintDefinition> {
        self.constraints
            .values()
            .find(|c| c.label == label && c.property == property)
    }

    /// Constraints that apply to a node carrying `labels`
    pub fn for_labels<'a>(&'a self, labels: &'a [String]) -> impl Iterator<Item = &'a ConstraintDefinition> + 'a {
        self.constraints
            .values()
            .filter(move |c| labels.contains(&c.label))
    }

    pub fn definitions(&self) -> Vec<ConstraintDefinition> {
        self.constraints.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.constraints.clear();
    }
}
