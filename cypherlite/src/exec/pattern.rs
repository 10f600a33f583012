// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pattern matching for MATCH, OPTIONAL MATCH, MERGE and pattern predicates
//!
//! Matching extends one input row at a time. Patterns of a clause are matched
//! left to right; within a pattern the start node is found through the access
//! path chosen by [`choose_access`], then each hop expands from the node
//! before it. A relationship is bound at most once per clause.
//!
//! Every traversal step checks the cancellation token, so long expansions
//! stop promptly on timeout.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::ast::{
    Direction, Expression, NodePattern, PathKind, PathPattern, PatternElement, RelationshipPattern,
};
use crate::exec::context::{ExecutionContext, Record};
use crate::exec::error::ExecutionError;
use crate::exec::eval::{evaluate, evaluate_property_map};
use crate::plan::access::{
    choose_access, pattern_stage_count, reverse_element, seek_sources, should_reverse, AccessPath,
    SeekSource,
};
use crate::plan::StageStats;
use crate::storage::{Edge, Node, PathValue, Value};
use crate::txn::GraphView;

type MatchResult<T> = Result<T, ExecutionError>;

/// Scans check for cancellation once per this many candidates
const CANCEL_CHECK_INTERVAL: usize = 64;

/// Match `patterns` against one input row.
///
/// `filter` is the clause's WHERE predicate. It is only used to find seek
/// values for start nodes; the caller applies it to the returned rows.
/// `stages` receives rows and db hits per pattern stage and is grown to the
/// required length.
pub fn match_row(
    ctx: &ExecutionContext,
    row: &Record,
    patterns: &[PathPattern],
    filter: Option<&Expression>,
    stages: &mut Vec<StageStats>,
) -> MatchResult<Vec<Record>> {
    let needed: usize = patterns.iter().map(pattern_stage_count).sum();
    if stages.len() < needed {
        stages.resize(needed, StageStats::default());
    }

    let matcher = Matcher {
        ctx,
        view: ctx.view(),
    };
    let mut partials = vec![Partial {
        row: row.clone(),
        used: HashSet::new(),
    }];
    let mut offset = 0;
    for pattern in patterns {
        let count = pattern_stage_count(pattern);
        let mut next = Vec::new();
        for partial in partials {
            matcher.match_pattern(partial, pattern, filter, &mut stages[offset..offset + count], &mut next)?;
        }
        partials = next;
        offset += count;
        if partials.is_empty() {
            break;
        }
    }
    Ok(partials.into_iter().map(|p| p.row).collect())
}

/// Whether a relationship pattern used as a predicate has at least one match
pub fn pattern_exists(
    ctx: &ExecutionContext,
    row: &Record,
    element: &PatternElement,
) -> MatchResult<bool> {
    let pattern = PathPattern {
        variable: None,
        kind: PathKind::Simple,
        element: element.clone(),
    };
    let mut scratch = Vec::new();
    Ok(!match_row(ctx, row, std::slice::from_ref(&pattern), None, &mut scratch)?.is_empty())
}

/// A row under construction plus the relationships it has bound
#[derive(Clone)]
struct Partial {
    row: Record,
    used: HashSet<String>,
}

/// Traversal state inside one pattern
struct State {
    partial: Partial,
    current: Node,
    path: Option<PathValue>,
}

struct Matcher<'c, 'a> {
    ctx: &'c ExecutionContext<'a>,
    view: GraphView<'c>,
}

impl<'c, 'a> Matcher<'c, 'a> {
    fn hit(&self, stage: &mut StageStats, n: u64) {
        stage.db_hits += n;
        self.ctx.hit(n);
    }

    fn match_pattern(
        &self,
        partial: Partial,
        pattern: &PathPattern,
        filter: Option<&Expression>,
        stages: &mut [StageStats],
        out: &mut Vec<Partial>,
    ) -> MatchResult<()> {
        let reversed;
        let element = if should_reverse(pattern, &|v| partial.row.contains_key(v)) {
            reversed = reverse_element(&pattern.element);
            &reversed
        } else {
            &pattern.element
        };

        let starts = self.start_candidates(&partial.row, &element.start, filter, &mut stages[0])?;
        stages[0].rows += starts.len() as u64;

        match pattern.kind {
            PathKind::Simple => {
                let mut states: Vec<State> = starts
                    .into_iter()
                    .map(|node| {
                        let mut partial = partial.clone();
                        bind_node(&mut partial.row, &element.start, &node);
                        State {
                            path: pattern.variable.as_ref().map(|_| PathValue::new(node.clone())),
                            partial,
                            current: node,
                        }
                    })
                    .collect();

                for (hop, (relationship, node)) in element.chain.iter().enumerate() {
                    let stage = &mut stages[1 + hop];
                    let mut next = Vec::new();
                    for state in states {
                        self.ctx.check_cancelled()?;
                        match &relationship.length {
                            Some(_) => self.expand_var_length(state, relationship, node, stage, &mut next)?,
                            None => self.expand(state, relationship, node, stage, &mut next)?,
                        }
                    }
                    stage.rows += next.len() as u64;
                    states = next;
                }

                for mut state in states {
                    if let (Some(variable), Some(path)) = (&pattern.variable, state.path.take()) {
                        state.partial.row.insert(variable.clone(), Value::Path(path));
                    }
                    out.push(state.partial);
                }
            }
            PathKind::Shortest | PathKind::AllShortest => {
                let before = out.len();
                for start in starts {
                    let mut partial = partial.clone();
                    bind_node(&mut partial.row, &element.start, &start);
                    self.shortest_paths(partial, &start, pattern, element, filter, &mut stages[1], out)?;
                }
                stages[1].rows += (out.len() - before) as u64;
            }
        }
        Ok(())
    }

    /// Nodes a node pattern can bind to at the start of a pattern
    fn start_candidates(
        &self,
        row: &Record,
        pattern: &NodePattern,
        filter: Option<&Expression>,
        stage: &mut StageStats,
    ) -> MatchResult<Vec<Node>> {
        let properties = self.required_properties(row, pattern.properties.as_ref())?;

        if let Some(bound) = bound_node(row, pattern)? {
            self.hit(stage, 1);
            let current = bound.and_then(|node| self.view.node(&node.id));
            return Ok(match current {
                Some(node) if node_satisfies(node, &pattern.labels, properties.as_ref()) => {
                    vec![node.clone()]
                }
                _ => Vec::new(),
            });
        }

        let sources = seek_sources(pattern, filter, self.ctx.params, &|v| row.contains_key(v));
        let available: Vec<&str> = sources.iter().map(|(k, _)| k.as_str()).collect();
        let ids = match choose_access(self.ctx.state, &pattern.labels, &available) {
            AccessPath::NodeIndexSeek {
                index, properties: columns, ..
            } => {
                let mut values = Vec::with_capacity(columns.len());
                for column in &columns {
                    let source = sources
                        .iter()
                        .find(|(k, _)| k == column)
                        .map(|(_, s)| *s)
                        .unwrap_or(SeekSource::Inline);
                    let value = match source {
                        SeekSource::Inline => properties
                            .as_ref()
                            .and_then(|p| p.get(column))
                            .cloned()
                            .unwrap_or(Value::Null),
                        SeekSource::Predicate(expression) => evaluate(self.ctx, row, expression)?,
                    };
                    values.push(value);
                }
                self.hit(stage, 1);
                self.view.index_lookup(&index, &values)?
            }
            AccessPath::NodeByLabelScan { label } => {
                self.hit(stage, 1);
                self.view.node_ids_by_label(&label)
            }
            AccessPath::AllNodesScan => self.view.node_ids(),
        };
        self.hit(stage, ids.len() as u64);

        let mut nodes = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 {
                self.ctx.check_cancelled()?;
            }
            if let Some(node) = self.view.node(id) {
                if node_satisfies(node, &pattern.labels, properties.as_ref()) {
                    nodes.push(node.clone());
                }
            }
        }
        Ok(nodes)
    }

    fn required_properties(
        &self,
        row: &Record,
        properties: Option<&Expression>,
    ) -> MatchResult<Option<BTreeMap<String, Value>>> {
        properties
            .map(|expression| evaluate_property_map(self.ctx, row, expression))
            .transpose()
    }

    /// Relationships leaving `node_id` that fit the pattern's direction and
    /// types, paired with the node at their other end
    fn neighbours(&self, node_id: &str, relationship: &RelationshipPattern) -> Vec<(&'c Edge, String)> {
        let edges = match relationship.direction {
            Direction::Outgoing => self.view.outgoing(node_id),
            Direction::Incoming => self.view.incoming(node_id),
            Direction::Both => self.view.relationships(node_id),
        };
        edges
            .into_iter()
            .filter(|edge| relationship.types.is_empty() || relationship.types.contains(&edge.rel_type))
            .map(|edge| {
                let other = match relationship.direction {
                    Direction::Outgoing => edge.to_node.clone(),
                    Direction::Incoming => edge.from_node.clone(),
                    Direction::Both => edge.other_end(node_id).to_string(),
                };
                (edge, other)
            })
            .collect()
    }

    fn expand(
        &self,
        state: State,
        relationship: &RelationshipPattern,
        node: &NodePattern,
        stage: &mut StageStats,
        out: &mut Vec<State>,
    ) -> MatchResult<()> {
        let row = &state.partial.row;
        let edge_properties = self.required_properties(row, relationship.properties.as_ref())?;
        let node_properties = self.required_properties(row, node.properties.as_ref())?;
        let bound_edge = bound_relationship(row, relationship)?;
        let bound_target = bound_node(row, node)?;

        let neighbours = self.neighbours(&state.current.id, relationship);
        self.hit(stage, neighbours.len() as u64 + 1);
        for (edge, other) in neighbours {
            if state.partial.used.contains(&edge.id)
                || !properties_match(&edge.properties, edge_properties.as_ref())
            {
                continue;
            }
            match &bound_edge {
                Some(Some(bound)) if bound.id != edge.id => continue,
                Some(None) => continue,
                _ => {}
            }
            match &bound_target {
                Some(Some(bound)) if bound.id != other => continue,
                Some(None) => continue,
                _ => {}
            }
            let target = match self.view.node(&other) {
                Some(target) if node_satisfies(target, &node.labels, node_properties.as_ref()) => target,
                _ => continue,
            };

            let mut partial = state.partial.clone();
            partial.used.insert(edge.id.clone());
            if let Some(variable) = &relationship.variable {
                partial.row.insert(variable.clone(), Value::Edge(edge.clone()));
            }
            bind_node(&mut partial.row, node, target);
            let path = state.path.clone().map(|mut path| {
                path.push(edge.clone(), target.clone());
                path
            });
            out.push(State {
                partial,
                current: target.clone(),
                path,
            });
        }
        Ok(())
    }

    fn expand_var_length(
        &self,
        state: State,
        relationship: &RelationshipPattern,
        node: &NodePattern,
        stage: &mut StageStats,
        out: &mut Vec<State>,
    ) -> MatchResult<()> {
        let length = relationship.length.unwrap_or(crate::ast::LengthRange {
            min: Some(1),
            max: Some(1),
        });
        let row = &state.partial.row;
        let search = VarLengthSearch {
            relationship,
            node,
            min: length.min.unwrap_or(1),
            max: length.max,
            edge_properties: self.required_properties(row, relationship.properties.as_ref())?,
            node_properties: self.required_properties(row, node.properties.as_ref())?,
            bound_edges: match relationship.variable.as_ref().and_then(|v| row.get(v)) {
                None => None,
                Some(Value::List(items)) => Some(
                    items
                        .iter()
                        .filter_map(|v| v.as_edge().map(|e| e.id.clone()))
                        .collect(),
                ),
                Some(_) => return Ok(()),
            },
            bound_target: bound_node(row, node)?,
        };
        let mut trail: Vec<(&'c Edge, &'c Node)> = Vec::new();
        let start = state.current.clone();
        self.var_length_step(&state, &search, &start.id, &mut trail, stage, out)
    }

    fn var_length_step(
        &self,
        state: &State,
        search: &VarLengthSearch<'_>,
        current_id: &str,
        trail: &mut Vec<(&'c Edge, &'c Node)>,
        stage: &mut StageStats,
        out: &mut Vec<State>,
    ) -> MatchResult<()> {
        self.ctx.check_cancelled()?;
        let depth = trail.len() as u64;
        if depth >= search.min {
            self.emit_var_length(state, search, current_id, trail, out);
        }
        if search.max.map(|max| depth >= max).unwrap_or(false) {
            return Ok(());
        }

        let neighbours = self.neighbours(current_id, search.relationship);
        self.hit(stage, neighbours.len() as u64 + 1);
        for (edge, other) in neighbours {
            if state.partial.used.contains(&edge.id)
                || trail.iter().any(|(e, _)| e.id == edge.id)
                || !properties_match(&edge.properties, search.edge_properties.as_ref())
            {
                continue;
            }
            let next = match self.view.node(&other) {
                Some(next) => next,
                None => continue,
            };
            trail.push((edge, next));
            self.var_length_step(state, search, &other, trail, stage, out)?;
            trail.pop();
        }
        Ok(())
    }

    fn emit_var_length(
        &self,
        state: &State,
        search: &VarLengthSearch<'_>,
        current_id: &str,
        trail: &[(&'c Edge, &'c Node)],
        out: &mut Vec<State>,
    ) {
        match &search.bound_target {
            Some(Some(bound)) if bound.id != current_id => return,
            Some(None) => return,
            _ => {}
        }
        if let Some(bound) = &search.bound_edges {
            if bound.len() != trail.len() || bound.iter().zip(trail).any(|(id, (e, _))| id != &e.id) {
                return;
            }
        }
        let target = match trail.last() {
            Some((_, node)) => (*node).clone(),
            None => state.current.clone(),
        };
        if !node_satisfies(&target, &search.node.labels, search.node_properties.as_ref()) {
            return;
        }

        let mut partial = state.partial.clone();
        partial.used.extend(trail.iter().map(|(e, _)| e.id.clone()));
        if let Some(variable) = &search.relationship.variable {
            partial.row.insert(
                variable.clone(),
                Value::List(trail.iter().map(|(e, _)| Value::Edge((*e).clone())).collect()),
            );
        }
        bind_node(&mut partial.row, search.node, &target);
        let path = state.path.clone().map(|mut path| {
            for (edge, node) in trail {
                path.push((*edge).clone(), (*node).clone());
            }
            path
        });
        out.push(State {
            partial,
            current: target,
            path,
        });
    }

    /// Breadth-first search from `start` to every end candidate. Neighbours
    /// are visited in edge id order, so the first path found is stable.
    #[allow(clippy::too_many_arguments)]
    fn shortest_paths(
        &self,
        partial: Partial,
        start: &Node,
        pattern: &PathPattern,
        element: &PatternElement,
        filter: Option<&Expression>,
        stage: &mut StageStats,
        out: &mut Vec<Partial>,
    ) -> MatchResult<()> {
        let (relationship, end_pattern) = match element.chain.first() {
            Some((relationship, node)) => (relationship, node),
            None => return Ok(()),
        };
        let (min, max) = match &relationship.length {
            Some(length) => (length.min.unwrap_or(1), length.max),
            None => (1, Some(1)),
        };
        let edge_properties = self.required_properties(&partial.row, relationship.properties.as_ref())?;
        let ends = self.start_candidates(&partial.row, end_pattern, filter, stage)?;
        if ends.is_empty() {
            return Ok(());
        }
        let targets: HashSet<&str> = ends.iter().map(|n| n.id.as_str()).collect();

        let mut distance: HashMap<String, u64> = HashMap::new();
        let mut parents: HashMap<String, Vec<(&'c Edge, String)>> = HashMap::new();
        distance.insert(start.id.clone(), 0);
        let mut frontier = vec![start.id.clone()];
        let mut level = 0u64;
        let all = pattern.kind == PathKind::AllShortest;

        while !frontier.is_empty() && max.map(|m| level < m).unwrap_or(true) {
            if targets.iter().all(|t| distance.contains_key(*t)) {
                break;
            }
            self.ctx.check_cancelled()?;
            let mut next = Vec::new();
            for node_id in &frontier {
                let neighbours = self.neighbours(node_id, relationship);
                self.hit(stage, neighbours.len() as u64 + 1);
                for (edge, other) in neighbours {
                    if partial.used.contains(&edge.id)
                        || !properties_match(&edge.properties, edge_properties.as_ref())
                    {
                        continue;
                    }
                    match distance.get(&other) {
                        None => {
                            distance.insert(other.clone(), level + 1);
                            parents.insert(other.clone(), vec![(edge, node_id.clone())]);
                            next.push(other);
                        }
                        Some(d) if *d == level + 1 && all => {
                            if let Some(list) = parents.get_mut(&other) {
                                list.push((edge, node_id.clone()));
                            }
                        }
                        _ => {}
                    }
                }
            }
            frontier = next;
            level += 1;
        }

        for end in &ends {
            let routes: Vec<Vec<&'c Edge>> = if end.id == start.id {
                if min == 0 {
                    vec![Vec::new()]
                } else {
                    Vec::new()
                }
            } else {
                match distance.get(&end.id) {
                    Some(d) if *d >= min => routes_to(&parents, &start.id, &end.id, all),
                    _ => Vec::new(),
                }
            };
            for route in routes {
                let mut bound = partial.clone();
                let mut path = PathValue::new(start.clone());
                let mut at = start.id.clone();
                for edge in &route {
                    let next_id = edge.other_end(&at).to_string();
                    let next = match self.view.node(&next_id) {
                        Some(next) => next.clone(),
                        None => break,
                    };
                    path.push((*edge).clone(), next);
                    bound.used.insert(edge.id.clone());
                    at = next_id;
                }
                if let Some(variable) = &relationship.variable {
                    let value = match &relationship.length {
                        Some(_) => Value::List(route.iter().map(|e| Value::Edge((*e).clone())).collect()),
                        None => route
                            .first()
                            .map(|e| Value::Edge((*e).clone()))
                            .unwrap_or(Value::Null),
                    };
                    bound.row.insert(variable.clone(), value);
                }
                bind_node(&mut bound.row, end_pattern, end);
                if let Some(variable) = &pattern.variable {
                    bound.row.insert(variable.clone(), Value::Path(path));
                }
                out.push(bound);
            }
        }
        Ok(())
    }
}

/// Fixed inputs of one variable-length expansion
struct VarLengthSearch<'p> {
    relationship: &'p RelationshipPattern,
    node: &'p NodePattern,
    min: u64,
    max: Option<u64>,
    edge_properties: Option<BTreeMap<String, Value>>,
    node_properties: Option<BTreeMap<String, Value>>,
    bound_edges: Option<Vec<String>>,
    bound_target: Option<Option<Node>>,
}

/// Edge sequences from `start` to `end` along BFS parent links; one route
/// unless `all` is set
fn routes_to<'e>(
    parents: &HashMap<String, Vec<(&'e Edge, String)>>,
    start: &str,
    end: &str,
    all: bool,
) -> Vec<Vec<&'e Edge>> {
    if end == start {
        return vec![Vec::new()];
    }
    let links = match parents.get(end) {
        Some(links) => links,
        None => return Vec::new(),
    };
    let links: &[(&'e Edge, String)] = if all { links } else { &links[..1.min(links.len())] };
    let mut routes = Vec::new();
    for (edge, previous) in links {
        for mut route in routes_to(parents, start, previous, all) {
            route.push(*edge);
            routes.push(route);
        }
    }
    routes
}

/// The node a pattern variable is already bound to: `None` when unbound,
/// `Some(None)` when bound to null
fn bound_node(row: &Record, pattern: &NodePattern) -> MatchResult<Option<Option<Node>>> {
    let variable = match &pattern.variable {
        Some(variable) => variable,
        None => return Ok(None),
    };
    match row.get(variable) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::Node(node)) => Ok(Some(Some(node.clone()))),
        Some(other) => Err(ExecutionError::TypeError(format!(
            "Variable `{}` is already bound to a {}, expected a node",
            variable,
            other.type_name()
        ))),
    }
}

fn bound_relationship(row: &Record, pattern: &RelationshipPattern) -> MatchResult<Option<Option<Edge>>> {
    let variable = match &pattern.variable {
        Some(variable) => variable,
        None => return Ok(None),
    };
    match row.get(variable) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::Edge(edge)) => Ok(Some(Some(edge.clone()))),
        Some(other) => Err(ExecutionError::TypeError(format!(
            "Variable `{}` is already bound to a {}, expected a relationship",
            variable,
            other.type_name()
        ))),
    }
}

fn bind_node(row: &mut Record, pattern: &NodePattern, node: &Node) {
    if let Some(variable) = &pattern.variable {
        row.insert(variable.clone(), Value::Node(node.clone()));
    }
}

pub(crate) fn node_satisfies(
    node: &Node,
    labels: &[String],
    properties: Option<&BTreeMap<String, Value>>,
) -> bool {
    labels.iter().all(|label| node.has_label(label)) && properties_match(&node.properties, properties)
}

fn properties_match(actual: &HashMap<String, Value>, required: Option<&BTreeMap<String, Value>>) -> bool {
    required
        .map(|required| {
            required.iter().all(|(key, value)| {
                actual
                    .get(key)
                    .map(|v| v.equals(value) == Some(true))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(true)
}
