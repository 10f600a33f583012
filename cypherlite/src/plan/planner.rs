// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Builds operator trees from statements
//!
//! Each query part becomes a chain of operators built bottom-up in clause
//! order. The planner tracks variable scope the same way the executor binds
//! rows, so the start operator and match direction it reports are the ones
//! execution uses.

use std::collections::{BTreeSet, HashMap};

use crate::ast::pretty_printer::{join, projection_summary};
use crate::ast::{
    Clause, Expression, MatchClause, PathKind, PathPattern, ProjectionClause, Query, RemoveItem,
    SchemaCommand, SetItem, SingleQuery, Statement, TransactionCommand,
};
use crate::plan::access::{
    choose_access, pattern_stage_count, reverse_element, seek_sources, should_reverse, AccessPath,
};
use crate::plan::cost::{aggregation_cardinality, Statistics, FILTER_SELECTIVITY, UNWIND_FANOUT};
use crate::plan::{
    PlanDescription, Slot, DISTINCT_STAGE, LIMIT_STAGE, PROJECTION_STAGE, SKIP_STAGE, SORT_STAGE,
    WITH_FILTER_STAGE,
};
use crate::storage::{GraphState, Value};

/// Describe how `statement` would run against `state`
pub fn plan_statement(
    state: &GraphState,
    statement: &Statement,
    params: &HashMap<String, Value>,
) -> PlanDescription {
    let planner = Planner {
        state,
        params,
        stats: Statistics::from_state(state),
    };
    planner.plan(statement.inner())
}

struct Planner<'a> {
    state: &'a GraphState,
    params: &'a HashMap<String, Value>,
    stats: Statistics,
}

/// Variables bound at a point in a query part
type Scope = BTreeSet<String>;

impl<'a> Planner<'a> {
    fn plan(&self, statement: &Statement) -> PlanDescription {
        match statement {
            Statement::Query(query) => self.plan_query(query),
            Statement::Schema(command) => self.plan_schema(command),
            Statement::Transaction(command) => {
                let keyword = match command {
                    TransactionCommand::Begin => "BEGIN",
                    TransactionCommand::Commit => "COMMIT",
                    TransactionCommand::Rollback => "ROLLBACK",
                };
                PlanDescription::new("Transaction", keyword)
            }
            Statement::Explain(inner) | Statement::Profile(inner) => self.plan(inner),
        }
    }

    fn plan_query(&self, query: &Query) -> PlanDescription {
        let mut parts = query.parts().enumerate();
        let (mut root, columns) = match parts.next() {
            Some((index, part)) => self.plan_part(index, part),
            None => (PlanDescription::new("EmptyResult", ""), Vec::new()),
        };
        for (index, part) in parts {
            let all = query.unions[index - 1].all;
            let (plan, _) = self.plan_part(index, part);
            let rows = root.estimated_rows + plan.estimated_rows;
            let mut union = PlanDescription::new("Union", if all { "UNION ALL" } else { "UNION" });
            union.identifiers = columns.clone();
            union.estimated_rows = rows;
            union.children = vec![root, plan];
            root = if all {
                union
            } else {
                let mut distinct = self.operator("Distinct", columns.join(", "), &union, None);
                distinct.identifiers = columns.clone();
                distinct.children = vec![union];
                distinct
            };
        }

        let mut produce = PlanDescription::new("ProduceResults", columns.join(", "));
        produce.identifiers = columns;
        produce.estimated_rows = root.estimated_rows;
        produce.timed = true;
        produce.children = vec![root];
        produce
    }

    fn plan_schema(&self, command: &SchemaCommand) -> PlanDescription {
        let (operator, details) = match command {
            SchemaCommand::CreateIndex {
                name,
                label,
                properties,
                ..
            } => (
                "CreateIndex",
                format!(
                    "{}FOR (:{}) ON ({})",
                    name.as_ref().map(|n| format!("{} ", n)).unwrap_or_default(),
                    label,
                    properties.join(", ")
                ),
            ),
            SchemaCommand::CreateFulltextIndex {
                name,
                label,
                properties,
                ..
            } => (
                "CreateFulltextIndex",
                format!("{} FOR (:{}) ON EACH [{}]", name, label, properties.join(", ")),
            ),
            SchemaCommand::CreateVectorIndex {
                name,
                label,
                property,
                ..
            } => (
                "CreateVectorIndex",
                format!("{} FOR (:{}) ON ({})", name, label, property),
            ),
            SchemaCommand::CreateConstraint {
                name,
                label,
                property,
                ..
            } => (
                "CreateConstraint",
                format!(
                    "{}FOR (:{}) REQUIRE {} IS UNIQUE",
                    name.as_ref().map(|n| format!("{} ", n)).unwrap_or_default(),
                    label,
                    property
                ),
            ),
            SchemaCommand::DropIndex { name, .. } => ("DropIndex", name.clone()),
            SchemaCommand::DropConstraint { name, .. } => ("DropConstraint", name.clone()),
            SchemaCommand::ShowIndexes => ("ShowIndexes", String::new()),
            SchemaCommand::ShowConstraints => ("ShowConstraints", String::new()),
        };
        let mut plan = PlanDescription::new(operator, details);
        plan.estimated_rows = 1.0;
        plan
    }

    /// Plan one query part; returns its operator chain and result columns
    fn plan_part(&self, part: usize, query: &SingleQuery) -> (PlanDescription, Vec<String>) {
        let mut scope = Scope::new();
        let mut current: Option<PlanDescription> = None;
        let mut columns = Vec::new();

        for (index, clause) in query.clauses.iter().enumerate() {
            let next = match clause {
                Clause::Match(m) => self.plan_match(part, index, m, current.take(), &mut scope),
                Clause::With(projection) => {
                    self.plan_projection(part, index, projection, current.take(), &mut scope)
                }
                Clause::Return(projection) => {
                    let plan = self.plan_projection(part, index, projection, current.take(), &mut scope);
                    columns = projection_columns(projection, &plan);
                    plan
                }
                other => {
                    let input = current.take();
                    let mut plan = self.plan_simple_clause(other, input.as_ref(), &mut scope);
                    plan.slot = Some(Slot::new(part, index, 0));
                    plan.identifiers = scope.iter().cloned().collect();
                    if let Some(input) = input {
                        plan.children.push(input);
                    }
                    plan
                }
            };
            current = Some(mark_timed(next));
        }

        if columns.is_empty() {
            if let Some(Clause::Call(call)) = query.clauses.last() {
                columns = crate::exec::procedures::yielded_columns(call);
            }
        }
        (
            current.unwrap_or_else(|| PlanDescription::new("EmptyResult", "")),
            columns,
        )
    }

    fn input_rows(input: Option<&PlanDescription>) -> f64 {
        input.map(|p| p.estimated_rows).unwrap_or(1.0)
    }

    fn operator(
        &self,
        operator: &str,
        details: impl Into<String>,
        input: &PlanDescription,
        slot: Option<Slot>,
    ) -> PlanDescription {
        let mut plan = PlanDescription::new(operator, details);
        plan.estimated_rows = input.estimated_rows;
        plan.slot = slot;
        plan
    }

    fn plan_match(
        &self,
        part: usize,
        clause: usize,
        m: &MatchClause,
        input: Option<PlanDescription>,
        scope: &mut Scope,
    ) -> PlanDescription {
        let optional_input_rows = Self::input_rows(input.as_ref());
        let mut current = input;
        let mut stage = 0;

        for pattern in &m.patterns {
            current = Some(self.plan_pattern(
                part,
                clause,
                stage,
                pattern,
                m.where_clause.as_ref(),
                current,
                scope,
            ));
            stage += pattern_stage_count(pattern);
        }
        let mut plan = current.unwrap_or_else(|| PlanDescription::new("EmptyResult", ""));

        if let Some(predicate) = &m.where_clause {
            let mut filter = self.operator(
                "Filter",
                predicate.to_string(),
                &plan,
                Some(Slot::new(part, clause, stage)),
            );
            filter.estimated_rows = plan.estimated_rows * FILTER_SELECTIVITY;
            filter.estimated_db_hits = plan.estimated_rows;
            filter.identifiers = scope.iter().cloned().collect();
            filter.children.push(plan);
            plan = filter;
        }

        if m.optional {
            let mut optional = self.operator(
                "Optional",
                join(&m.patterns, ", "),
                &plan,
                Some(Slot::new(part, clause, stage + 1)),
            );
            optional.estimated_rows = plan.estimated_rows.max(optional_input_rows);
            optional.identifiers = scope.iter().cloned().collect();
            optional.children.push(plan);
            plan = optional;
        }
        plan
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_pattern(
        &self,
        part: usize,
        clause: usize,
        first_stage: usize,
        pattern: &PathPattern,
        filter: Option<&Expression>,
        input: Option<PlanDescription>,
        scope: &mut Scope,
    ) -> PlanDescription {
        let reversed;
        let element = if should_reverse(pattern, &|v| scope.contains(v)) {
            reversed = reverse_element(&pattern.element);
            &reversed
        } else {
            &pattern.element
        };

        let start = &element.start;
        let start_bound = start
            .variable
            .as_ref()
            .map(|v| scope.contains(v))
            .unwrap_or(false);

        let mut current = input;
        if !start_bound {
            let sources = seek_sources(start, filter, self.params, &|v| scope.contains(v));
            let available: Vec<&str> = sources.iter().map(|(k, _)| k.as_str()).collect();
            let access = choose_access(self.state, &start.labels, &available);
            let variable = start.variable.clone().unwrap_or_default();
            if let Some(v) = &start.variable {
                scope.insert(v.clone());
            }
            let slot = Some(Slot::new(part, clause, first_stage));
            let mut scan = PlanDescription::new(access.operator(), self.access_details(&access, &variable));
            let (rows, hits) = match &access {
                AccessPath::AllNodesScan => {
                    let n = self.stats.total_nodes as f64;
                    (n, n + 1.0)
                }
                AccessPath::NodeByLabelScan { label } => {
                    let n = self.stats.label_cardinality(label);
                    (n, n + 1.0)
                }
                AccessPath::NodeIndexSeek {
                    label, properties, ..
                } => {
                    let n = self.stats.seek_cardinality(label, properties);
                    (n, n + 1.0)
                }
            };
            scan.estimated_rows = rows;
            scan.estimated_db_hits = hits;
            scan.slot = slot;
            scan.identifiers = scope.iter().cloned().collect();

            current = Some(match current {
                None => scan,
                Some(input) => {
                    let mut product = PlanDescription::new("CartesianProduct", "");
                    product.estimated_rows = input.estimated_rows * scan.estimated_rows;
                    product.slot = slot;
                    product.identifiers = scan.identifiers.clone();
                    product.children = vec![input, scan];
                    product
                }
            });
        }

        let mut plan = current.unwrap_or_else(|| PlanDescription::new("Argument", ""));
        match pattern.kind {
            PathKind::Simple => {
                let mut previous = start.clone();
                for (hop, (relationship, node)) in element.chain.iter().enumerate() {
                    let into = node
                        .variable
                        .as_ref()
                        .map(|v| scope.contains(v))
                        .unwrap_or(false);
                    for v in relationship.variable.iter().chain(node.variable.iter()) {
                        scope.insert(v.clone());
                    }
                    let (operator, factor) = match &relationship.length {
                        Some(length) => (
                            "VarLengthExpand",
                            self.stats.var_length_factor(relationship, length),
                        ),
                        None => ("Expand", self.stats.expand_factor(relationship)),
                    };
                    let mut details = format!("{}{}{}", previous, relationship, node);
                    if into {
                        details.push_str(" (into)");
                    }
                    let mut expand = PlanDescription::new(operator, details);
                    expand.estimated_db_hits = plan.estimated_rows * (1.0 + factor);
                    expand.estimated_rows = if into {
                        (plan.estimated_rows * factor).min(plan.estimated_rows)
                    } else {
                        plan.estimated_rows * factor
                    };
                    expand.slot = Some(Slot::new(part, clause, first_stage + 1 + hop));
                    expand.identifiers = scope.iter().cloned().collect();
                    expand.children.push(plan);
                    plan = expand;
                    previous = node.clone();
                }
            }
            PathKind::Shortest | PathKind::AllShortest => {
                for v in element
                    .relationships()
                    .filter_map(|r| r.variable.as_ref())
                    .chain(element.nodes().filter_map(|n| n.variable.as_ref()))
                {
                    scope.insert(v.clone());
                }
                let end_rows = element
                    .chain
                    .last()
                    .map(|(_, node)| match node.labels.first() {
                        Some(label) => self.stats.label_cardinality(label),
                        None => self.stats.total_nodes as f64,
                    })
                    .unwrap_or(1.0)
                    .max(1.0);
                let mut shortest = PlanDescription::new("ShortestPath", pattern.to_string());
                shortest.estimated_rows = plan.estimated_rows * end_rows;
                shortest.estimated_db_hits = plan.estimated_rows * (self.stats.total_edges as f64 + 1.0);
                shortest.slot = Some(Slot::new(part, clause, first_stage + 1));
                if let Some(v) = &pattern.variable {
                    scope.insert(v.clone());
                }
                shortest.identifiers = scope.iter().cloned().collect();
                shortest.children.push(plan);
                return shortest;
            }
        }
        if let Some(v) = &pattern.variable {
            scope.insert(v.clone());
            plan.identifiers = scope.iter().cloned().collect();
        }
        plan
    }

    fn access_details(&self, access: &AccessPath, variable: &str) -> String {
        match access {
            AccessPath::AllNodesScan => variable.to_string(),
            AccessPath::NodeByLabelScan { label } => format!("{}:{}", variable, label),
            AccessPath::NodeIndexSeek {
                index,
                label,
                properties,
            } => format!(
                "{}:{}({}) USING {}",
                variable,
                label,
                properties.join(", "),
                index
            ),
        }
    }

    fn plan_projection(
        &self,
        part: usize,
        clause: usize,
        projection: &ProjectionClause,
        input: Option<PlanDescription>,
        scope: &mut Scope,
    ) -> PlanDescription {
        let input_rows = Self::input_rows(input.as_ref());
        let aggregating = projection
            .items
            .iter()
            .any(|item| item.expression.contains_aggregate());
        let grouped = projection.star
            || projection
                .items
                .iter()
                .any(|item| !item.expression.contains_aggregate());

        let mut projected: Scope = if projection.star {
            scope.clone()
        } else {
            Scope::new()
        };
        projected.extend(projection.items.iter().map(|i| i.column_name().to_string()));

        let slot = |stage| Some(Slot::new(part, clause, stage));
        let mut plan = PlanDescription::new(
            if aggregating { "Aggregation" } else { "Projection" },
            projection_summary(projection),
        );
        plan.estimated_rows = if aggregating {
            aggregation_cardinality(input_rows, grouped)
        } else {
            input_rows
        };
        plan.estimated_db_hits = if aggregating { input_rows } else { 0.0 };
        plan.slot = slot(PROJECTION_STAGE);
        plan.identifiers = projected.iter().cloned().collect();
        if let Some(input) = input {
            plan.children.push(input);
        }

        let wrap = |plan: PlanDescription, operator: &str, details: String, stage, rows: f64| {
            let mut next = PlanDescription::new(operator, details);
            next.estimated_rows = rows;
            next.slot = slot(stage);
            next.identifiers = plan.identifiers.clone();
            next.children.push(plan);
            next
        };

        if projection.distinct {
            let rows = plan.estimated_rows;
            plan = wrap(plan, "Distinct", String::new(), DISTINCT_STAGE, rows);
        }
        if !projection.order_by.is_empty() {
            let details = projection
                .order_by
                .iter()
                .map(|s| {
                    format!(
                        "{} {}",
                        s.expression,
                        if s.descending { "DESC" } else { "ASC" }
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            let rows = plan.estimated_rows;
            plan = wrap(plan, "Sort", details, SORT_STAGE, rows);
        }
        if let Some(skip) = &projection.skip {
            let rows = match literal_count(skip) {
                Some(n) => (plan.estimated_rows - n).max(0.0),
                None => plan.estimated_rows,
            };
            plan = wrap(plan, "Skip", skip.to_string(), SKIP_STAGE, rows);
        }
        if let Some(limit) = &projection.limit {
            let rows = match literal_count(limit) {
                Some(n) => plan.estimated_rows.min(n),
                None => plan.estimated_rows,
            };
            plan = wrap(plan, "Limit", limit.to_string(), LIMIT_STAGE, rows);
        }
        if let Some(predicate) = &projection.where_clause {
            let rows = plan.estimated_rows * FILTER_SELECTIVITY;
            plan = wrap(plan, "Filter", predicate.to_string(), WITH_FILTER_STAGE, rows);
        }

        *scope = projected;
        plan
    }

    /// Operators for clauses that occupy a single stage
    fn plan_simple_clause(
        &self,
        clause: &Clause,
        input: Option<&PlanDescription>,
        scope: &mut Scope,
    ) -> PlanDescription {
        let rows = Self::input_rows(input);
        match clause {
            Clause::Create(create) => {
                let mut entities = 0.0;
                for pattern in &create.patterns {
                    entities += pattern.element.nodes().count() as f64
                        + pattern.element.chain.len() as f64;
                    bind_pattern(scope, pattern);
                }
                let mut plan = PlanDescription::new("Create", join(&create.patterns, ", "));
                plan.estimated_rows = rows;
                plan.estimated_db_hits = rows * entities;
                plan
            }
            Clause::Merge(merge) => {
                bind_pattern(scope, &merge.pattern);
                let candidates = merge
                    .pattern
                    .element
                    .start
                    .labels
                    .first()
                    .map(|l| self.stats.label_cardinality(l))
                    .unwrap_or(self.stats.total_nodes as f64);
                let mut plan = PlanDescription::new("Merge", merge.pattern.to_string());
                plan.estimated_rows = rows;
                plan.estimated_db_hits = rows * (candidates + 1.0);
                plan
            }
            Clause::Set(set) => {
                let details = set.items.iter().map(describe_set_item).collect::<Vec<_>>();
                let mut plan = PlanDescription::new("SetProperties", details.join(", "));
                plan.estimated_rows = rows;
                plan.estimated_db_hits = rows * set.items.len() as f64;
                plan
            }
            Clause::Remove(remove) => {
                let details = remove
                    .items
                    .iter()
                    .map(describe_remove_item)
                    .collect::<Vec<_>>();
                let mut plan = PlanDescription::new("Remove", details.join(", "));
                plan.estimated_rows = rows;
                plan.estimated_db_hits = rows * remove.items.len() as f64;
                plan
            }
            Clause::Delete(delete) => {
                let operator = if delete.detach { "DetachDelete" } else { "Delete" };
                let mut plan = PlanDescription::new(operator, join(&delete.expressions, ", "));
                plan.estimated_rows = rows;
                plan.estimated_db_hits = rows * delete.expressions.len() as f64;
                plan
            }
            Clause::Unwind(unwind) => {
                let fanout = match &unwind.expression {
                    Expression::List(items) => items.len() as f64,
                    _ => UNWIND_FANOUT,
                };
                scope.insert(unwind.variable.clone());
                let mut plan = PlanDescription::new(
                    "Unwind",
                    format!("{} AS {}", unwind.expression, unwind.variable),
                );
                plan.estimated_rows = rows * fanout;
                plan
            }
            Clause::Foreach(foreach) => {
                let body = foreach
                    .body
                    .iter()
                    .map(|c| c.name())
                    .collect::<Vec<_>>()
                    .join(" ");
                let mut plan = PlanDescription::new(
                    "Foreach",
                    format!("{} IN {} | {}", foreach.variable, foreach.list, body),
                );
                plan.estimated_rows = rows;
                plan.estimated_db_hits = rows * foreach.body.len() as f64;
                plan
            }
            Clause::Call(call) => {
                let yielded = crate::exec::procedures::yielded_columns(call);
                let mut details = format!("{}({})", call.procedure, join(&call.arguments, ", "));
                if !yielded.is_empty() && call.yield_items.is_some() {
                    details.push_str(&format!(" YIELD {}", yielded.join(", ")));
                }
                if let Some(predicate) = &call.where_clause {
                    details.push_str(&format!(" WHERE {}", predicate));
                }
                scope.extend(yielded);
                let mut plan = PlanDescription::new("ProcedureCall", details);
                plan.estimated_rows = rows * self.procedure_rows(&call.procedure, &call.arguments);
                plan.estimated_db_hits = plan.estimated_rows;
                plan
            }
            Clause::Match(_) | Clause::With(_) | Clause::Return(_) => PlanDescription::new("Argument", ""),
        }
    }

    fn procedure_rows(&self, procedure: &str, arguments: &[Expression]) -> f64 {
        match procedure.to_ascii_lowercase().as_str() {
            "db.labels" => self.stats.node_counts.len() as f64,
            "db.relationshiptypes" => self.stats.edge_counts.len() as f64,
            "db.indexes" => self.state.indexes.definitions().len() as f64,
            "db.constraints" => self.state.constraints.definitions().len() as f64,
            "db.index.vector.querynodes" => arguments.get(1).and_then(literal_count).unwrap_or(10.0),
            "db.index.hybrid.querynodes" => arguments.get(4).and_then(literal_count).unwrap_or(10.0),
            _ => 10.0,
        }
    }
}

fn mark_timed(mut plan: PlanDescription) -> PlanDescription {
    plan.timed = true;
    plan
}

pub(crate) fn bind_pattern(scope: &mut Scope, pattern: &PathPattern) {
    if let Some(v) = &pattern.variable {
        scope.insert(v.clone());
    }
    for node in pattern.element.nodes() {
        if let Some(v) = &node.variable {
            scope.insert(v.clone());
        }
    }
    for relationship in pattern.element.relationships() {
        if let Some(v) = &relationship.variable {
            scope.insert(v.clone());
        }
    }
}

fn projection_columns(projection: &ProjectionClause, plan: &PlanDescription) -> Vec<String> {
    if projection.star {
        // RETURN * lists every variable in scope, sorted
        plan.identifiers.clone()
    } else {
        projection
            .items
            .iter()
            .map(|i| i.column_name().to_string())
            .collect()
    }
}

fn literal_count(expression: &Expression) -> Option<f64> {
    match expression {
        Expression::Literal(crate::ast::Literal::Integer(n)) if *n >= 0 => Some(*n as f64),
        _ => None,
    }
}

fn describe_set_item(item: &SetItem) -> String {
    match item {
        SetItem::Property {
            variable,
            key,
            value,
        } => format!("{}.{} = {}", variable, key, value),
        SetItem::Replace { variable, value } => format!("{} = {}", variable, value),
        SetItem::Merge { variable, value } => format!("{} += {}", variable, value),
        SetItem::Labels { variable, labels } => format!("{}:{}", variable, labels.join(":")),
    }
}

fn describe_remove_item(item: &RemoveItem) -> String {
    match item {
        RemoveItem::Property { variable, key } => format!("{}.{}", variable, key),
        RemoveItem::Labels { variable, labels } => format!("{}:{}", variable, labels.join(":")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse_query;
    use crate::storage::indexes::IndexDefinition;
    use crate::storage::{ApplyMode, Edge, Mutation, Node};

    fn state() -> GraphState {
        let mut state = GraphState::new();
        let mut mutations = Vec::new();
        for i in 0..10 {
            let mut node = Node::with_labels(format!("p{}", i), vec!["Person".to_string()]);
            node.set_property("name".to_string(), Value::from(format!("n{}", i)));
            mutations.push(Mutation::CreateNode(node));
        }
        mutations.push(Mutation::CreateEdge(Edge::new(
            "e1".into(),
            "p0".into(),
            "p1".into(),
            "KNOWS".into(),
        )));
        state.apply_all(&mutations).unwrap();
        state
            .apply(
                &Mutation::CreateIndex(IndexDefinition::property(
                    "person_name",
                    "Person",
                    vec!["name".to_string()],
                )),
                ApplyMode::Checked,
            )
            .unwrap();
        state
    }

    fn explain(text: &str) -> PlanDescription {
        let document = parse_query(text).unwrap();
        plan_statement(&state(), &document.statement, &HashMap::new())
    }

    #[test]
    fn test_index_seek_chosen_for_equality() {
        let plan = explain("MATCH (n:Person) WHERE n.name = 'n1' RETURN n");
        assert_eq!(
            plan.operators(),
            vec!["ProduceResults", "Projection", "Filter", "NodeIndexSeek"]
        );
        let seek = plan.find("NodeIndexSeek").unwrap();
        assert!(seek.details.contains("person_name"));
        assert_eq!(seek.estimated_rows, 1.0);

        let plan = explain("MATCH (n:Person {name: 'n1'}) RETURN n");
        assert!(plan.find("NodeIndexSeek").is_some());
    }

    #[test]
    fn test_label_scan_and_expand() {
        let plan = explain("MATCH (a:Person)-[:KNOWS]->(b) RETURN a, b");
        assert_eq!(
            plan.operators(),
            vec!["ProduceResults", "Projection", "Expand", "NodeByLabelScan"]
        );
        assert_eq!(plan.find("NodeByLabelScan").unwrap().estimated_rows, 10.0);
        assert_eq!(plan.children[0].identifiers, vec!["a", "b"]);
    }

    #[test]
    fn test_bound_end_reverses_pattern() {
        let plan = explain("MATCH (b:Person {name: 'n1'}) MATCH (a)-[:KNOWS]->(b) RETURN a");
        let expand = plan.find("Expand").unwrap();
        assert_eq!(expand.details, "(b)<-[:KNOWS]-(a)");
        assert!(plan.find("AllNodesScan").is_none());
    }

    #[test]
    fn test_aggregation_sort_limit() {
        let plan = explain("MATCH (n:Person) RETURN n.name AS name, count(*) AS c ORDER BY c DESC LIMIT 3");
        assert_eq!(
            plan.operators(),
            vec!["ProduceResults", "Limit", "Sort", "Aggregation", "NodeByLabelScan"]
        );
        assert_eq!(plan.find("Limit").unwrap().estimated_rows, 3.0);
        assert_eq!(plan.identifiers, vec!["name", "c"]);
    }

    #[test]
    fn test_union_and_updates() {
        let plan = explain("MATCH (n:Person) RETURN n.name AS x UNION ALL UNWIND [1, 2] AS x RETURN x");
        assert!(plan.find("Union").is_some());
        assert_eq!(plan.find("Unwind").unwrap().estimated_rows, 2.0);

        let plan = explain("MATCH (n:Person) DETACH DELETE n");
        assert!(plan.find("DetachDelete").is_some());
        let plan = explain("CREATE INDEX FOR (n:City) ON (n.name)");
        assert_eq!(plan.operator, "CreateIndex");
    }
}
