// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cardinality and db-hit estimation for plan descriptions
//!
//! Estimates are computed from committed graph statistics only. They are
//! shown by EXPLAIN and PROFILE and never influence which operator runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ast::{Direction, LengthRange, RelationshipPattern};
use crate::storage::GraphState;

/// Selectivity assumed for a WHERE predicate
pub const FILTER_SELECTIVITY: f64 = 0.5;
/// Fraction of a label matched by a non-unique index seek, per column
pub const SEEK_SELECTIVITY: f64 = 0.1;
/// Rows assumed per UNWIND input row when the list is not a literal
pub const UNWIND_FANOUT: f64 = 10.0;
/// Variable-length expansions are estimated over at most this many hops
const MAX_ESTIMATED_HOPS: u64 = 5;

/// Statistics about data distribution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    /// Total number of nodes in the graph
    pub total_nodes: usize,
    /// Total number of relationships in the graph
    pub total_edges: usize,
    /// Node count by label
    pub node_counts: HashMap<String, usize>,
    /// Relationship count by type
    pub edge_counts: HashMap<String, usize>,
    /// Label and property pairs covered by a uniqueness constraint
    pub unique_properties: Vec<(String, String)>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the committed graph's counts
    pub fn from_state(state: &GraphState) -> Self {
        let stats = state.graph.stats();
        Self {
            total_nodes: stats.node_count,
            total_edges: stats.edge_count,
            node_counts: stats.label_counts,
            edge_counts: stats.type_counts,
            unique_properties: state
                .constraints
                .definitions()
                .into_iter()
                .map(|c| (c.label, c.property))
                .collect(),
        }
    }

    pub fn label_cardinality(&self, label: &str) -> f64 {
        self.node_counts.get(label).copied().unwrap_or(0) as f64
    }

    /// Rows produced by a seek on `label` with the given leading columns
    pub fn seek_cardinality(&self, label: &str, properties: &[String]) -> f64 {
        let unique = properties.iter().any(|p| {
            self.unique_properties
                .iter()
                .any(|(l, up)| l == label && up == p)
        });
        if unique {
            return 1.0;
        }
        let selectivity = SEEK_SELECTIVITY.powi(properties.len().max(1) as i32);
        (self.label_cardinality(label) * selectivity).max(1.0)
    }

    /// Average number of relationships followed per node for one hop
    pub fn expand_factor(&self, relationship: &RelationshipPattern) -> f64 {
        if self.total_nodes == 0 {
            return 0.0;
        }
        let matching = if relationship.types.is_empty() {
            self.total_edges
        } else {
            relationship
                .types
                .iter()
                .map(|t| self.edge_counts.get(t).copied().unwrap_or(0))
                .sum()
        };
        let per_node = matching as f64 / self.total_nodes as f64;
        match relationship.direction {
            Direction::Both => per_node * 2.0,
            Direction::Outgoing | Direction::Incoming => per_node,
        }
    }

    /// Paths reachable per start node through a variable-length hop
    pub fn var_length_factor(&self, relationship: &RelationshipPattern, length: &LengthRange) -> f64 {
        let factor = self.expand_factor(relationship);
        let min = length.min.unwrap_or(1);
        let max = length
            .max
            .unwrap_or(min + MAX_ESTIMATED_HOPS)
            .min(min + MAX_ESTIMATED_HOPS);
        (min..=max).map(|hops| factor.powi(hops as i32)).sum()
    }
}

/// Rows out of an aggregation
pub fn aggregation_cardinality(input_rows: f64, grouped: bool) -> f64 {
    if grouped {
        input_rows.sqrt().max(1.0).min(input_rows.max(1.0))
    } else {
        1.0
    }
}
