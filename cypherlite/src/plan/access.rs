// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Access path selection shared by the planner and the executor
//!
//! The executor and EXPLAIN pick the same start operator for a node pattern,
//! so the operator a plan shows is the operator that runs.

use std::collections::HashMap;

use crate::ast::{
    BinaryOperator, Direction, Expression, NodePattern, PathKind, PathPattern, PatternElement,
};
use crate::storage::{GraphState, Value};

/// How the candidates of an unbound node pattern are produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPath {
    AllNodesScan,
    NodeByLabelScan {
        label: String,
    },
    NodeIndexSeek {
        index: String,
        label: String,
        /// Leading index columns the lookup supplies values for
        properties: Vec<String>,
    },
}

impl AccessPath {
    pub fn operator(&self) -> &'static str {
        match self {
            AccessPath::AllNodesScan => "AllNodesScan",
            AccessPath::NodeByLabelScan { .. } => "NodeByLabelScan",
            AccessPath::NodeIndexSeek { .. } => "NodeIndexSeek",
        }
    }
}

/// Choose the cheapest access path for a node pattern with `labels`, given
/// the property names that have equality values available.
///
/// A composite index covering the longest leading run of `available` wins;
/// otherwise the label with the fewest nodes is scanned.
pub fn choose_access(state: &GraphState, labels: &[String], available: &[&str]) -> AccessPath {
    let mut best: Option<(String, String, usize)> = None;
    for label in labels {
        if let Some((index, covered)) = state.indexes.best_property_index(label, available) {
            let better = match &best {
                Some((_, _, best_covered)) => covered > *best_covered,
                None => true,
            };
            if better {
                best = Some((index, label.clone(), covered));
            }
        }
    }
    if let Some((index, label, covered)) = best {
        if let Some(columns) = state.indexes.property_index_columns(&index) {
            return AccessPath::NodeIndexSeek {
                index,
                label,
                properties: columns.into_iter().take(covered).collect(),
            };
        }
    }

    labels
        .iter()
        .min_by_key(|label| state.graph.label_count(label))
        .map(|label| AccessPath::NodeByLabelScan {
            label: label.clone(),
        })
        .unwrap_or(AccessPath::AllNodesScan)
}

/// Where the value for a seek column comes from
#[derive(Debug, Clone, Copy)]
pub enum SeekSource<'e> {
    /// The node pattern's own property map
    Inline,
    /// An equality conjunct of the WHERE clause
    Predicate(&'e Expression),
}

/// Property names of an unbound node pattern that have equality values
/// available before the node is matched, in pattern order then WHERE order
pub fn seek_sources<'e>(
    node: &'e NodePattern,
    filter: Option<&'e Expression>,
    params: &HashMap<String, Value>,
    is_bound: &dyn Fn(&str) -> bool,
) -> Vec<(String, SeekSource<'e>)> {
    let mut sources: Vec<(String, SeekSource<'e>)> = inline_keys(node.properties.as_ref(), params)
        .into_iter()
        .map(|key| (key, SeekSource::Inline))
        .collect();
    if let (Some(variable), Some(filter)) = (node.variable.as_deref(), filter) {
        for (key, value) in equality_lookups(filter, variable) {
            let evaluable = free_variables(value).into_iter().all(|v| is_bound(v));
            if evaluable && !sources.iter().any(|(k, _)| k == &key) {
                sources.push((key, SeekSource::Predicate(value)));
            }
        }
    }
    sources
}

/// Property names an inline map supplies, when known without evaluating it
pub fn inline_keys(properties: Option<&Expression>, params: &HashMap<String, Value>) -> Vec<String> {
    match properties {
        Some(Expression::Map(entries)) => entries.iter().map(|(k, _)| k.clone()).collect(),
        Some(Expression::Parameter(name)) => match params.get(name) {
            Some(Value::Map(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Top-level `variable.property = value` conjuncts of a WHERE predicate,
/// where the value side does not mention `variable`
pub fn equality_lookups<'e>(predicate: &'e Expression, variable: &str) -> Vec<(String, &'e Expression)> {
    let mut out = Vec::new();
    collect_equalities(predicate, variable, &mut out);
    out
}

fn collect_equalities<'e>(
    predicate: &'e Expression,
    variable: &str,
    out: &mut Vec<(String, &'e Expression)>,
) {
    match predicate {
        Expression::Binary(BinaryOperator::And, left, right) => {
            collect_equalities(left, variable, out);
            collect_equalities(right, variable, out);
        }
        Expression::Binary(BinaryOperator::Equal, left, right) => {
            for (property_side, value_side) in [(left, right), (right, left)] {
                if let Expression::Property(target, key) = property_side.as_ref() {
                    if matches!(target.as_ref(), Expression::Variable(v) if v == variable)
                        && is_lookup_value(value_side, variable)
                    {
                        out.push((key.clone(), value_side.as_ref()));
                        return;
                    }
                }
            }
        }
        _ => {}
    }
}

/// Expressions usable as seek values: no reference to the variable being
/// sought and nothing that needs the graph
fn is_lookup_value(expression: &Expression, variable: &str) -> bool {
    let mut usable = true;
    expression.walk(&mut |e| match e {
        Expression::Variable(v) if v == variable => usable = false,
        Expression::MapProjection { .. }
        | Expression::PatternPredicate(_)
        | Expression::Exists(_)
        | Expression::CountSubquery(_) => usable = false,
        e if e.is_aggregate_call() => usable = false,
        _ => {}
    });
    usable
}

/// Variables an expression reads, outside of subqueries
pub fn free_variables(expression: &Expression) -> Vec<&str> {
    let mut names = Vec::new();
    expression.walk(&mut |e| {
        if let Expression::Variable(v) = e {
            names.push(v.as_str());
        }
    });
    names
}

/// Whether matching should start from the far end of the pattern: true when
/// only the last node is already bound
pub fn should_reverse(pattern: &PathPattern, is_bound: &dyn Fn(&str) -> bool) -> bool {
    if pattern.kind != PathKind::Simple || pattern.variable.is_some() {
        return false;
    }
    let element = &pattern.element;
    let start_bound = element
        .start
        .variable
        .as_deref()
        .map(is_bound)
        .unwrap_or(false);
    let end_bound = element
        .chain
        .last()
        .and_then(|(_, node)| node.variable.as_deref())
        .map(is_bound)
        .unwrap_or(false);
    !start_bound && end_bound
}

/// The same pattern written from its last node back to its first
pub fn reverse_element(element: &PatternElement) -> PatternElement {
    let mut nodes: Vec<_> = element.nodes().cloned().collect();
    let mut relationships: Vec<_> = element.relationships().cloned().collect();
    nodes.reverse();
    relationships.reverse();
    for relationship in &mut relationships {
        relationship.direction = match relationship.direction {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
            Direction::Both => Direction::Both,
        };
    }
    let mut nodes = nodes.into_iter();
    let start = nodes.next().unwrap_or_default();
    PatternElement {
        start,
        chain: relationships.into_iter().zip(nodes).collect(),
    }
}

/// Number of profiling stages a pattern occupies: the start scan plus one
/// per hop, or the scan plus the search for shortest paths
pub fn pattern_stage_count(pattern: &PathPattern) -> usize {
    match pattern.kind {
        PathKind::Simple => 1 + pattern.element.chain.len(),
        PathKind::Shortest | PathKind::AllShortest => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse_expression;
    use crate::storage::indexes::IndexDefinition;
    use crate::storage::{ApplyMode, Mutation, Node};

    fn state_with_index() -> GraphState {
        let mut state = GraphState::new();
        for (id, label) in [("a", "Person"), ("b", "Person"), ("c", "City")] {
            state
                .apply(
                    &Mutation::CreateNode(Node::with_labels(id.to_string(), vec![label.to_string()])),
                    ApplyMode::Checked,
                )
                .unwrap();
        }
        state
            .apply(
                &Mutation::CreateIndex(IndexDefinition::property(
                    "person_name",
                    "Person",
                    vec!["name".to_string(), "age".to_string()],
                )),
                ApplyMode::Checked,
            )
            .unwrap();
        state
    }

    #[test]
    fn test_index_seek_preferred() {
        let state = state_with_index();
        let labels = vec!["Person".to_string()];
        assert_eq!(
            choose_access(&state, &labels, &["name"]),
            AccessPath::NodeIndexSeek {
                index: "person_name".to_string(),
                label: "Person".to_string(),
                properties: vec!["name".to_string()],
            }
        );
        // age alone is not a leading column
        assert_eq!(
            choose_access(&state, &labels, &["age"]),
            AccessPath::NodeByLabelScan {
                label: "Person".to_string()
            }
        );
    }

    #[test]
    fn test_smallest_label_scanned() {
        let state = state_with_index();
        let labels = vec!["Person".to_string(), "City".to_string()];
        assert_eq!(
            choose_access(&state, &labels, &[]),
            AccessPath::NodeByLabelScan {
                label: "City".to_string()
            }
        );
        assert_eq!(choose_access(&state, &[], &[]), AccessPath::AllNodesScan);
    }

    #[test]
    fn test_equality_lookups() {
        let predicate = parse_expression("n.name = $name AND 30 = n.age AND n.x = n.y OR false").unwrap();
        assert!(equality_lookups(&predicate, "n").is_empty());

        let predicate = parse_expression("n.name = $name AND 30 = n.age AND n.x = n.y").unwrap();
        let found: Vec<String> = equality_lookups(&predicate, "n")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(found, vec!["name", "age"]);
    }
}
