// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Clause-by-clause query execution
//!
//! A single query runs as a pipeline of rows. Each clause consumes the rows
//! produced by the one before it: MATCH extends them, WITH and RETURN project
//! them, and updating clauses buffer mutations in the statement's transaction
//! while passing the rows through. Writes become visible to later clauses
//! through the transaction overlay.
//!
//! The executor tracks variable scope the same way the planner does, so
//! PROFILE statistics land on the operators EXPLAIN shows.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Instant;

use log::debug;

use crate::ast::{
    CallClause, Clause, CreateClause, DeleteClause, Direction, Expression, ForeachClause,
    MatchClause, MergeClause, NodePattern, PathKind, PathPattern, ProjectionClause, Query,
    RelationshipPattern, RemoveItem, SchemaCommand, SetItem, SingleQuery, UnwindClause, YieldItems,
};
use crate::exec::context::{ExecutionContext, Record};
use crate::exec::error::ExecutionError;
use crate::exec::eval::{
    aggregate_key, current_node, evaluate, evaluate_predicate,
    evaluate_property_map, evaluate_with_aggregates, properties_of, refresh,
};
use crate::exec::pattern::match_row;
use crate::exec::procedures::{call_procedure, show_constraints, show_indexes, yielded_columns};
use crate::functions::{count_star, new_aggregator, Aggregator};
use crate::plan::access::pattern_stage_count;
use crate::plan::planner::bind_pattern;
use crate::plan::{
    Slot, StageStats, DISTINCT_STAGE, LIMIT_STAGE, PROJECTION_STAGE, SKIP_STAGE, SORT_STAGE,
    WITH_FILTER_STAGE,
};
use crate::storage::indexes::{IndexDefinition, IndexKind, VectorIndexConfig};
use crate::storage::{ConstraintDefinition, Edge, Mutation, Node, PathValue, Value};

type ExecResult<T> = Result<T, ExecutionError>;

/// Columns and rows produced by a statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    fn from_procedure(output: crate::exec::procedures::ProcedureOutput) -> Self {
        Self {
            columns: output.columns,
            rows: output.rows,
        }
    }
}

/// Execute a query, combining UNION parts
pub fn execute_query(ctx: &mut ExecutionContext, query: &Query) -> ExecResult<QueryOutput> {
    let mut combined: Option<QueryOutput> = None;
    for (index, part) in query.parts().enumerate() {
        let output = execute_part(ctx, part, index)?;
        match &mut combined {
            None => combined = Some(output),
            Some(combined) => {
                if combined.columns != output.columns {
                    return Err(ExecutionError::SemanticError(
                        "All sub queries in an UNION must have the same return column names"
                            .to_string(),
                    ));
                }
                combined.rows.extend(output.rows);
            }
        }
    }
    let mut output = combined.unwrap_or_default();
    if query.unions.iter().any(|u| !u.all) {
        let mut seen = HashSet::new();
        output.rows.retain(|row| seen.insert(row.clone()));
    }
    Ok(output)
}

/// Run a read-only subquery for EXISTS or COUNT, starting from the outer row
pub fn run_subquery(
    ctx: &ExecutionContext,
    query: &Query,
    row: &Record,
    limit: Option<usize>,
) -> ExecResult<Vec<Record>> {
    if query.is_updating() {
        return Err(ExecutionError::SemanticError(
            "EXISTS and COUNT subqueries cannot update the graph".to_string(),
        ));
    }
    ctx.enter_nested();
    let result = subquery_rows(ctx, query, row, limit);
    ctx.leave_nested();
    result
}

fn subquery_rows(
    ctx: &ExecutionContext,
    query: &Query,
    row: &Record,
    limit: Option<usize>,
) -> ExecResult<Vec<Record>> {
    let mut rows = Vec::new();
    for part in query.parts() {
        let mut pipeline = Pipeline::new(0, vec![row.clone()], row.keys().cloned().collect());
        for (index, clause) in part.clauses.iter().enumerate() {
            pipeline.read_clause(ctx, index, clause)?;
        }
        rows.extend(pipeline.into_records());
        if query.unions.is_empty() {
            if let Some(limit) = limit {
                rows.truncate(limit);
            }
        }
    }
    if query.unions.iter().any(|u| !u.all) {
        let mut seen = HashSet::new();
        rows.retain(|record| {
            let mut key: Vec<(String, Value)> =
                record.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            key.sort_by(|a, b| a.0.cmp(&b.0));
            seen.insert(key)
        });
    }
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    Ok(rows)
}

fn execute_part(ctx: &mut ExecutionContext, part: &SingleQuery, index: usize) -> ExecResult<QueryOutput> {
    let mut pipeline = Pipeline::new(index, vec![Record::new()], BTreeSet::new());
    for (clause_index, clause) in part.clauses.iter().enumerate() {
        ctx.check_cancelled()?;
        let started = Instant::now();
        let hits = ctx.db_hits();
        if !pipeline.read_clause(ctx, clause_index, clause)? {
            let rows = std::mem::take(&mut pipeline.rows);
            pipeline.rows = execute_update(ctx, clause, rows)?;
            match clause {
                Clause::Create(create) => {
                    for pattern in &create.patterns {
                        bind_pattern(&mut pipeline.scope, pattern);
                    }
                }
                Clause::Merge(merge) => bind_pattern(&mut pipeline.scope, &merge.pattern),
                _ => {}
            }
            ctx.record_stage(
                Slot::new(index, clause_index, 0),
                StageStats {
                    rows: pipeline.rows.len() as u64,
                    db_hits: ctx.db_hits() - hits,
                },
            );
        }
        debug!(
            "{} produced {} rows",
            clause.name(),
            pipeline.output.as_ref().map(|o| o.rows.len()).unwrap_or(pipeline.rows.len())
        );
        ctx.record_time(index, clause_index, started.elapsed().as_secs_f64() * 1000.0);
    }
    Ok(pipeline.finish(part))
}

/// Rows and scope flowing through one single query
struct Pipeline {
    part: usize,
    rows: Vec<Record>,
    scope: BTreeSet<String>,
    output: Option<QueryOutput>,
}

impl Pipeline {
    fn new(part: usize, rows: Vec<Record>, scope: BTreeSet<String>) -> Self {
        Self {
            part,
            rows,
            scope,
            output: None,
        }
    }

    /// Run `clause` if it only reads. Returns false, leaving the rows
    /// untouched, for updating clauses.
    fn read_clause(&mut self, ctx: &ExecutionContext, index: usize, clause: &Clause) -> ExecResult<bool> {
        let part = self.part;
        let slot = move |stage| Slot::new(part, index, stage);
        match clause {
            Clause::Match(m) => {
                let rows = std::mem::take(&mut self.rows);
                self.rows = execute_match(ctx, m, rows, self.part, index)?;
                for pattern in &m.patterns {
                    bind_pattern(&mut self.scope, pattern);
                }
            }
            Clause::With(projection) => {
                let rows = std::mem::take(&mut self.rows);
                let output = project(ctx, projection, rows, &self.scope, &slot, false)?;
                self.scope = output.columns.iter().cloned().collect();
                self.rows = records(output);
            }
            Clause::Return(projection) => {
                let rows = std::mem::take(&mut self.rows);
                self.output = Some(project(ctx, projection, rows, &self.scope, &slot, true)?);
            }
            Clause::Unwind(unwind) => {
                let hits = ctx.db_hits();
                let rows = std::mem::take(&mut self.rows);
                self.rows = execute_unwind(ctx, unwind, rows)?;
                self.scope.insert(unwind.variable.clone());
                ctx.record_stage(slot(0), stage_stats(ctx, self.rows.len(), hits));
            }
            Clause::Call(call) => {
                let hits = ctx.db_hits();
                let rows = std::mem::take(&mut self.rows);
                self.rows = execute_call(ctx, call, rows)?;
                self.scope.extend(yielded_columns(call));
                ctx.record_stage(slot(0), stage_stats(ctx, self.rows.len(), hits));
            }
            Clause::Create(_)
            | Clause::Merge(_)
            | Clause::Set(_)
            | Clause::Remove(_)
            | Clause::Delete(_)
            | Clause::Foreach(_) => return Ok(false),
        }
        Ok(true)
    }

    /// Result columns: the RETURN projection, or a trailing standalone CALL
    fn finish(self, part: &SingleQuery) -> QueryOutput {
        if let Some(output) = self.output {
            return output;
        }
        match part.clauses.last() {
            Some(Clause::Call(call)) => {
                let columns = yielded_columns(call);
                let rows = self
                    .rows
                    .iter()
                    .map(|row| {
                        columns
                            .iter()
                            .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                            .collect()
                    })
                    .collect();
                QueryOutput { columns, rows }
            }
            _ => QueryOutput::default(),
        }
    }

    fn into_records(self) -> Vec<Record> {
        match self.output {
            Some(output) => records(output),
            None => self.rows,
        }
    }
}

fn records(output: QueryOutput) -> Vec<Record> {
    let columns = output.columns;
    output
        .rows
        .into_iter()
        .map(|values| columns.iter().cloned().zip(values).collect())
        .collect()
}

fn stage_stats(ctx: &ExecutionContext, rows: usize, hits_before: u64) -> StageStats {
    StageStats {
        rows: rows as u64,
        db_hits: ctx.db_hits() - hits_before,
    }
}

// ==============================================================================
// MATCH
// ==============================================================================

fn execute_match(
    ctx: &ExecutionContext,
    clause: &MatchClause,
    input: Vec<Record>,
    part: usize,
    index: usize,
) -> ExecResult<Vec<Record>> {
    let pattern_stages: usize = clause.patterns.iter().map(pattern_stage_count).sum();
    let mut stages = vec![StageStats::default(); pattern_stages];
    let hits_before = ctx.db_hits();
    let mut filtered = 0usize;
    let mut output = Vec::new();

    let introduced: Vec<String> = {
        let mut scope = BTreeSet::new();
        for pattern in &clause.patterns {
            bind_pattern(&mut scope, pattern);
        }
        scope.into_iter().collect()
    };

    for row in input {
        ctx.check_cancelled()?;
        let candidates = match_row(ctx, &row, &clause.patterns, clause.where_clause.as_ref(), &mut stages)?;
        let mut kept = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Some(predicate) = &clause.where_clause {
                if !evaluate_predicate(ctx, &candidate, predicate)? {
                    continue;
                }
            }
            kept.push(candidate);
        }
        filtered += kept.len();
        if kept.is_empty() && clause.optional {
            let mut row = row;
            for variable in &introduced {
                row.entry(variable.clone()).or_insert(Value::Null);
            }
            output.push(row);
        } else {
            output.extend(kept);
        }
    }

    if ctx.profiling() {
        let mut explicit = 0;
        for (stage, stats) in stages.iter().enumerate() {
            explicit += stats.db_hits;
            ctx.record_stage(Slot::new(part, index, stage), *stats);
        }
        let filter_hits = (ctx.db_hits() - hits_before).saturating_sub(explicit);
        ctx.record_stage(
            Slot::new(part, index, pattern_stages),
            StageStats {
                rows: filtered as u64,
                db_hits: filter_hits,
            },
        );
        ctx.record_stage(
            Slot::new(part, index, pattern_stages + 1),
            StageStats {
                rows: output.len() as u64,
                db_hits: 0,
            },
        );
    }
    Ok(output)
}

// ==============================================================================
// WITH / RETURN
// ==============================================================================

/// A projected row plus what ORDER BY may still refer to
struct ProjectedRow {
    values: Vec<Value>,
    source: Record,
    aggregates: HashMap<String, Value>,
}

/// Items of a projection in column order; `*` expands to the variables in
/// scope, merged with the explicit items and sorted
fn projection_items(clause: &ProjectionClause, scope: &BTreeSet<String>) -> Vec<(String, Expression)> {
    let explicit = clause
        .items
        .iter()
        .map(|item| (item.column_name().to_string(), item.expression.clone()));
    if !clause.star {
        return explicit.collect();
    }
    let mut items: BTreeMap<String, Expression> = scope
        .iter()
        .map(|name| (name.clone(), Expression::Variable(name.clone())))
        .collect();
    items.extend(explicit);
    items.into_iter().collect()
}

fn project(
    ctx: &ExecutionContext,
    clause: &ProjectionClause,
    rows: Vec<Record>,
    scope: &BTreeSet<String>,
    slot: &dyn Fn(usize) -> Slot,
    refresh_entities: bool,
) -> ExecResult<QueryOutput> {
    let items = projection_items(clause, scope);
    let columns: Vec<String> = items.iter().map(|(name, _)| name.clone()).collect();

    let hits = ctx.db_hits();
    let mut projected = if items.iter().any(|(_, e)| e.contains_aggregate()) {
        aggregate(ctx, clause, &items, rows)?
    } else {
        let mut projected = Vec::with_capacity(rows.len());
        for row in rows {
            ctx.check_cancelled()?;
            let values = items
                .iter()
                .map(|(_, expression)| evaluate(ctx, &row, expression))
                .collect::<ExecResult<Vec<_>>>()?;
            projected.push(ProjectedRow {
                values,
                source: row,
                aggregates: HashMap::new(),
            });
        }
        projected
    };
    ctx.record_stage(slot(PROJECTION_STAGE), stage_stats(ctx, projected.len(), hits));

    if clause.distinct {
        let mut seen = HashSet::new();
        projected.retain(|row| seen.insert(row.values.clone()));
        ctx.record_stage(slot(DISTINCT_STAGE), stage_stats(ctx, projected.len(), ctx.db_hits()));
    }

    if !clause.order_by.is_empty() {
        let hits = ctx.db_hits();
        let mut keyed = Vec::with_capacity(projected.len());
        for row in projected {
            ctx.check_cancelled()?;
            let mut scope = row.source.clone();
            for (name, value) in columns.iter().zip(&row.values) {
                scope.insert(name.clone(), value.clone());
            }
            let key = clause
                .order_by
                .iter()
                .map(|item| evaluate_with_aggregates(ctx, &scope, &item.expression, &row.aggregates))
                .collect::<ExecResult<Vec<_>>>()?;
            keyed.push((key, row));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for ((x, y), item) in a.iter().zip(b).zip(&clause.order_by) {
                let ordering = x.order_cmp(y);
                let ordering = if item.descending { ordering.reverse() } else { ordering };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
        projected = keyed.into_iter().map(|(_, row)| row).collect();
        ctx.record_stage(slot(SORT_STAGE), stage_stats(ctx, projected.len(), hits));
    }

    if let Some(skip) = &clause.skip {
        let n = row_count(ctx, skip, "SKIP")?;
        projected = projected.into_iter().skip(n).collect();
        ctx.record_stage(slot(SKIP_STAGE), stage_stats(ctx, projected.len(), ctx.db_hits()));
    }
    if let Some(limit) = &clause.limit {
        let n = row_count(ctx, limit, "LIMIT")?;
        projected.truncate(n);
        ctx.record_stage(slot(LIMIT_STAGE), stage_stats(ctx, projected.len(), ctx.db_hits()));
    }

    let mut rows: Vec<Vec<Value>> = projected.into_iter().map(|row| row.values).collect();
    if let Some(predicate) = &clause.where_clause {
        let hits = ctx.db_hits();
        let mut kept = Vec::with_capacity(rows.len());
        for values in rows {
            let record: Record = columns.iter().cloned().zip(values.iter().cloned()).collect();
            if evaluate_predicate(ctx, &record, predicate)? {
                kept.push(values);
            }
        }
        rows = kept;
        ctx.record_stage(slot(WITH_FILTER_STAGE), stage_stats(ctx, rows.len(), hits));
    }
    if refresh_entities {
        rows = rows
            .into_iter()
            .map(|values| values.into_iter().map(|v| refresh(ctx, v)).collect())
            .collect();
    }
    Ok(QueryOutput { columns, rows })
}

fn aggregate(
    ctx: &ExecutionContext,
    clause: &ProjectionClause,
    items: &[(String, Expression)],
    rows: Vec<Record>,
) -> ExecResult<Vec<ProjectedRow>> {
    let mut calls: Vec<&Expression> = Vec::new();
    let expressions = items
        .iter()
        .map(|(_, e)| e)
        .chain(clause.order_by.iter().map(|s| &s.expression));
    for expression in expressions {
        expression.walk(&mut |e| {
            if e.is_aggregate_call() {
                let key = aggregate_key(e);
                if !calls.iter().any(|c| aggregate_key(c) == key) {
                    calls.push(e);
                }
            }
        });
    }
    let grouping: Vec<&Expression> = items
        .iter()
        .map(|(_, e)| e)
        .filter(|e| !e.contains_aggregate())
        .collect();

    struct Group {
        key: Vec<Value>,
        sample: Record,
        aggregators: Vec<Box<dyn Aggregator>>,
    }
    let mut groups: Vec<Group> = Vec::new();
    let mut positions: HashMap<Vec<Value>, usize> = HashMap::new();

    for row in rows {
        ctx.check_cancelled()?;
        let key = grouping
            .iter()
            .map(|e| evaluate(ctx, &row, e))
            .collect::<ExecResult<Vec<_>>>()?;
        let position = match positions.get(&key) {
            Some(position) => *position,
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push(Group {
                    key,
                    sample: row.clone(),
                    aggregators: new_aggregators(&calls)?,
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[position];
        for (call, aggregator) in calls.iter().zip(group.aggregators.iter_mut()) {
            let value = aggregate_argument(ctx, &row, call)?;
            aggregator.update(&value)?;
        }
    }
    if groups.is_empty() && grouping.is_empty() {
        groups.push(Group {
            key: Vec::new(),
            sample: Record::new(),
            aggregators: new_aggregators(&calls)?,
        });
    }

    let mut projected = Vec::with_capacity(groups.len());
    for group in groups {
        let aggregates: HashMap<String, Value> = calls
            .iter()
            .zip(&group.aggregators)
            .map(|(call, aggregator)| (aggregate_key(call), aggregator.finish()))
            .collect();
        let mut keys = group.key.into_iter();
        let mut values = Vec::with_capacity(items.len());
        for (_, expression) in items {
            if expression.contains_aggregate() {
                values.push(evaluate_with_aggregates(ctx, &group.sample, expression, &aggregates)?);
            } else {
                values.push(keys.next().unwrap_or(Value::Null));
            }
        }
        projected.push(ProjectedRow {
            values,
            source: group.sample,
            aggregates,
        });
    }
    Ok(projected)
}

fn new_aggregators(calls: &[&Expression]) -> ExecResult<Vec<Box<dyn Aggregator>>> {
    calls
        .iter()
        .map(|call| match call {
            Expression::CountStar => Ok(count_star()),
            Expression::FunctionCall { name, distinct, .. } => new_aggregator(name, *distinct)
                .ok_or_else(|| ExecutionError::SemanticError(format!("Unknown aggregate function {}", name))),
            other => Err(ExecutionError::RuntimeError(format!("{} is not an aggregate", other))),
        })
        .collect()
}

fn aggregate_argument(ctx: &ExecutionContext, row: &Record, call: &Expression) -> ExecResult<Value> {
    match call {
        Expression::FunctionCall { arguments, .. } => match arguments.first() {
            Some(argument) => evaluate(ctx, row, argument),
            None => Ok(Value::Null),
        },
        _ => Ok(Value::Null),
    }
}

fn row_count(ctx: &ExecutionContext, expression: &Expression, clause: &str) -> ExecResult<usize> {
    match evaluate(ctx, &Record::new(), expression)? {
        Value::Integer(n) if n >= 0 => Ok(n as usize),
        other => Err(ExecutionError::SemanticError(format!(
            "Invalid input. '{}' is not a valid value for {}. Must be a non-negative integer.",
            other, clause
        ))),
    }
}

// ==============================================================================
// UNWIND / CALL
// ==============================================================================

fn execute_unwind(ctx: &ExecutionContext, clause: &UnwindClause, rows: Vec<Record>) -> ExecResult<Vec<Record>> {
    let mut output = Vec::new();
    for row in rows {
        ctx.check_cancelled()?;
        match evaluate(ctx, &row, &clause.expression)? {
            Value::Null => {}
            Value::List(items) => {
                for item in items {
                    let mut next = row.clone();
                    next.insert(clause.variable.clone(), item);
                    output.push(next);
                }
            }
            single => {
                let mut next = row;
                next.insert(clause.variable.clone(), single);
                output.push(next);
            }
        }
    }
    Ok(output)
}

fn execute_call(ctx: &ExecutionContext, call: &CallClause, rows: Vec<Record>) -> ExecResult<Vec<Record>> {
    let mut output = Vec::new();
    for row in rows {
        ctx.check_cancelled()?;
        let arguments = call
            .arguments
            .iter()
            .map(|a| evaluate(ctx, &row, a))
            .collect::<ExecResult<Vec<_>>>()?;
        let result = call_procedure(ctx, &call.procedure, &arguments)?;

        let bindings: Vec<(usize, String)> = match &call.yield_items {
            None | Some(YieldItems::All) => result
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| (i, c.clone()))
                .collect(),
            Some(YieldItems::Items(items)) => items
                .iter()
                .map(|item| {
                    result
                        .columns
                        .iter()
                        .position(|c| c == &item.field)
                        .map(|i| (i, item.variable().to_string()))
                        .ok_or_else(|| {
                            ExecutionError::SemanticError(format!(
                                "Unknown procedure output: `{}`",
                                item.field
                            ))
                        })
                })
                .collect::<ExecResult<Vec<_>>>()?,
        };

        for values in result.rows {
            let mut next = row.clone();
            for (position, variable) in &bindings {
                next.insert(variable.clone(), values.get(*position).cloned().unwrap_or(Value::Null));
            }
            if let Some(predicate) = &call.where_clause {
                if !evaluate_predicate(ctx, &next, predicate)? {
                    continue;
                }
            }
            output.push(next);
        }
    }
    Ok(output)
}

// ==============================================================================
// Updating clauses
// ==============================================================================

fn execute_update(ctx: &mut ExecutionContext, clause: &Clause, rows: Vec<Record>) -> ExecResult<Vec<Record>> {
    match clause {
        Clause::Create(create) => execute_create(ctx, create, rows),
        Clause::Merge(merge) => execute_merge(ctx, merge, rows),
        Clause::Set(set) => {
            let mut output = Vec::with_capacity(rows.len());
            for mut row in rows {
                ctx.check_cancelled()?;
                for item in &set.items {
                    apply_set_item(ctx, &mut row, item)?;
                }
                output.push(row);
            }
            Ok(output)
        }
        Clause::Remove(remove) => {
            for row in &rows {
                ctx.check_cancelled()?;
                for item in &remove.items {
                    apply_remove_item(ctx, row, item)?;
                }
            }
            Ok(rows)
        }
        Clause::Delete(delete) => execute_delete(ctx, delete, rows),
        Clause::Foreach(foreach) => {
            ctx.enter_nested();
            let result = execute_foreach(ctx, foreach, &rows);
            ctx.leave_nested();
            result.map(|_| rows)
        }
        other => Err(ExecutionError::SemanticError(format!(
            "{} is not allowed inside FOREACH",
            other.name()
        ))),
    }
}

fn execute_create(ctx: &mut ExecutionContext, clause: &CreateClause, rows: Vec<Record>) -> ExecResult<Vec<Record>> {
    let mut output = Vec::with_capacity(rows.len());
    for mut row in rows {
        ctx.check_cancelled()?;
        for pattern in &clause.patterns {
            create_pattern(ctx, &mut row, pattern, false)?;
        }
        output.push(row);
    }
    Ok(output)
}

fn execute_merge(ctx: &mut ExecutionContext, clause: &MergeClause, rows: Vec<Record>) -> ExecResult<Vec<Record>> {
    let mut output = Vec::with_capacity(rows.len());
    let mut stages = Vec::new();
    for row in rows {
        ctx.check_cancelled()?;
        reject_null_merge_properties(ctx, &row, &clause.pattern)?;
        let matched = match_row(ctx, &row, std::slice::from_ref(&clause.pattern), None, &mut stages)?;
        if matched.is_empty() {
            let mut row = row;
            create_pattern(ctx, &mut row, &clause.pattern, true)?;
            for item in &clause.on_create {
                apply_set_item(ctx, &mut row, item)?;
            }
            output.push(row);
        } else {
            for mut row in matched {
                for item in &clause.on_match {
                    apply_set_item(ctx, &mut row, item)?;
                }
                output.push(row);
            }
        }
    }
    Ok(output)
}

fn reject_null_merge_properties(ctx: &ExecutionContext, row: &Record, pattern: &PathPattern) -> ExecResult<()> {
    let maps = pattern
        .element
        .nodes()
        .filter(|n| !n.variable.as_ref().map(|v| row.contains_key(v)).unwrap_or(false))
        .filter_map(|n| n.properties.as_ref())
        .chain(pattern.element.relationships().filter_map(|r| r.properties.as_ref()));
    for map in maps {
        for (key, value) in evaluate_property_map(ctx, row, map)? {
            if value.is_null() {
                return Err(ExecutionError::SemanticError(format!(
                    "Cannot merge the following node or relationship because of null property value for '{}'",
                    key
                )));
            }
        }
    }
    Ok(())
}

/// Create the unbound parts of a pattern, binding its variables in `row`.
/// MERGE may create an undirected relationship, which is stored outgoing.
fn create_pattern(
    ctx: &mut ExecutionContext,
    row: &mut Record,
    pattern: &PathPattern,
    merging: bool,
) -> ExecResult<()> {
    if pattern.kind != PathKind::Simple {
        return Err(ExecutionError::SemanticError(
            "shortestPath(..) cannot be used to create data".to_string(),
        ));
    }
    let element = &pattern.element;
    let mut previous = create_or_reuse_node(ctx, row, &element.start)?;
    let mut path = PathValue::new(previous.clone());
    for (relationship, node) in &element.chain {
        let next = create_or_reuse_node(ctx, row, node)?;
        let edge = create_relationship(ctx, row, relationship, &previous, &next, merging)?;
        path.push(edge, next.clone());
        previous = next;
    }
    if let Some(variable) = &pattern.variable {
        row.insert(variable.clone(), Value::Path(path));
    }
    Ok(())
}

fn create_or_reuse_node(ctx: &mut ExecutionContext, row: &mut Record, pattern: &NodePattern) -> ExecResult<Node> {
    if let Some(variable) = &pattern.variable {
        match row.get(variable) {
            Some(Value::Node(node)) => {
                if !pattern.labels.is_empty() || pattern.properties.is_some() {
                    return Err(ExecutionError::SemanticError(format!(
                        "Can't create node `{}` with labels or properties here. The variable is already declared in this context",
                        variable
                    )));
                }
                return Ok(current_node(ctx, node));
            }
            Some(Value::Null) => {
                return Err(ExecutionError::SemanticError(format!(
                    "Failed to create relationship, node `{}` is null",
                    variable
                )))
            }
            Some(other) => {
                return Err(ExecutionError::TypeError(format!(
                    "Variable `{}` is already bound to a {}, expected a node",
                    variable,
                    other.type_name()
                )))
            }
            None => {}
        }
    }

    let mut node = Node::generate(pattern.labels.clone());
    let mut written = 0;
    if let Some(properties) = &pattern.properties {
        for (key, value) in storable(evaluate_property_map(ctx, row, properties)?)? {
            node.set_property(key, value);
            written += 1;
        }
    }
    ctx.view().check_unique(&node)?;
    ctx.counters.nodes_created += 1;
    ctx.counters.labels_added += node.labels.len();
    ctx.counters.properties_set += written;
    ctx.record(Mutation::CreateNode(node.clone()));
    if let Some(variable) = &pattern.variable {
        row.insert(variable.clone(), Value::Node(node.clone()));
    }
    Ok(node)
}

fn create_relationship(
    ctx: &mut ExecutionContext,
    row: &mut Record,
    pattern: &RelationshipPattern,
    previous: &Node,
    next: &Node,
    merging: bool,
) -> ExecResult<Edge> {
    if let Some(variable) = &pattern.variable {
        if row.contains_key(variable) {
            return Err(ExecutionError::SemanticError(format!(
                "Can't create relationship `{}`: the variable is already declared in this context",
                variable
            )));
        }
    }
    if pattern.length.is_some() {
        return Err(ExecutionError::SemanticError(
            "Variable length relationships cannot be created".to_string(),
        ));
    }
    let rel_type = match pattern.types.as_slice() {
        [rel_type] => rel_type.clone(),
        _ => {
            return Err(ExecutionError::SemanticError(
                "Exactly one relationship type must be specified for CREATE".to_string(),
            ))
        }
    };
    let (from, to) = match pattern.direction {
        Direction::Outgoing => (previous, next),
        Direction::Incoming => (next, previous),
        Direction::Both if merging => (previous, next),
        Direction::Both => {
            return Err(ExecutionError::SemanticError(
                "Only directed relationships are supported in CREATE".to_string(),
            ))
        }
    };

    let mut edge = Edge::generate(from.id.clone(), to.id.clone(), rel_type);
    let mut written = 0;
    if let Some(properties) = &pattern.properties {
        for (key, value) in storable(evaluate_property_map(ctx, row, properties)?)? {
            edge.set_property(key, value);
            written += 1;
        }
    }
    ctx.counters.relationships_created += 1;
    ctx.counters.properties_set += written;
    ctx.record(Mutation::CreateEdge(edge.clone()));
    if let Some(variable) = &pattern.variable {
        row.insert(variable.clone(), Value::Edge(edge.clone()));
    }
    Ok(edge)
}

/// Non-null entries of a property map, rejecting values that cannot be stored
fn storable(properties: BTreeMap<String, Value>) -> ExecResult<Vec<(String, Value)>> {
    let mut out = Vec::with_capacity(properties.len());
    for (key, value) in properties {
        check_storable(&key, &value)?;
        if !value.is_null() {
            out.push((key, value));
        }
    }
    Ok(out)
}

fn check_storable(key: &str, value: &Value) -> ExecResult<()> {
    if value.is_storable() {
        Ok(())
    } else {
        Err(ExecutionError::TypeError(format!(
            "Property values can only be of primitive types or arrays thereof, got {} for '{}'",
            value.type_name(),
            key
        )))
    }
}

/// Entries a SET `=` or `+=` takes from its right-hand side
fn assignment_map(ctx: &ExecutionContext, row: &Record, expression: &Expression) -> ExecResult<BTreeMap<String, Value>> {
    let value = evaluate(ctx, row, expression)?;
    if value.is_null() {
        return Ok(BTreeMap::new());
    }
    properties_of(&value).ok_or_else(|| {
        ExecutionError::TypeError(format!(
            "Expected a map, node or relationship to assign properties from, got {}",
            value.type_name()
        ))
    })
}

/// Property updates shared by nodes and relationships
fn assign(
    ctx: &mut ExecutionContext,
    row: &Record,
    item: &SetItem,
    properties: &mut HashMap<String, Value>,
) -> ExecResult<()> {
    match item {
        SetItem::Property { key, value, .. } => {
            let value = evaluate(ctx, row, value)?;
            check_storable(key, &value)?;
            if value.is_null() {
                properties.remove(key);
            } else {
                properties.insert(key.clone(), value);
            }
            ctx.counters.properties_set += 1;
        }
        SetItem::Replace { value, .. } => {
            let map = assignment_map(ctx, row, value)?;
            let entries = storable(map)?;
            ctx.counters.properties_set += properties.len() + entries.len();
            properties.clear();
            properties.extend(entries);
        }
        SetItem::Merge { value, .. } => {
            let map = assignment_map(ctx, row, value)?;
            for (key, value) in map {
                check_storable(&key, &value)?;
                if value.is_null() {
                    properties.remove(&key);
                } else {
                    properties.insert(key, value);
                }
                ctx.counters.properties_set += 1;
            }
        }
        SetItem::Labels { .. } => {}
    }
    Ok(())
}

fn apply_set_item(ctx: &mut ExecutionContext, row: &mut Record, item: &SetItem) -> ExecResult<()> {
    let variable = item.variable();
    let target = row
        .get(variable)
        .cloned()
        .ok_or_else(|| ExecutionError::SemanticError(format!("Variable `{}` not defined", variable)))?;
    match target {
        Value::Null => Ok(()),
        Value::Node(node) => {
            let mut node = match ctx.view().node(&node.id) {
                Some(node) => node.clone(),
                None => return Ok(()),
            };
            if let SetItem::Labels { labels, .. } = item {
                for label in labels {
                    if node.add_label(label.clone()) {
                        ctx.counters.labels_added += 1;
                    }
                }
            } else {
                let mut properties = std::mem::take(&mut node.properties);
                assign(ctx, row, item, &mut properties)?;
                node.properties = properties;
            }
            ctx.view().check_unique(&node)?;
            ctx.record(Mutation::UpdateNode(node.clone()));
            row.insert(variable.to_string(), Value::Node(node));
            Ok(())
        }
        Value::Edge(edge) => {
            if let SetItem::Labels { .. } = item {
                return Err(ExecutionError::TypeError(format!(
                    "Cannot set labels on relationship `{}`",
                    variable
                )));
            }
            let mut edge = match ctx.view().edge(&edge.id) {
                Some(edge) => edge.clone(),
                None => return Ok(()),
            };
            let mut properties = std::mem::take(&mut edge.properties);
            assign(ctx, row, item, &mut properties)?;
            edge.properties = properties;
            ctx.record(Mutation::UpdateEdge(edge.clone()));
            row.insert(variable.to_string(), Value::Edge(edge));
            Ok(())
        }
        other => Err(ExecutionError::TypeError(format!(
            "Expected `{}` to be a node or relationship, but it was a {}",
            variable,
            other.type_name()
        ))),
    }
}

fn apply_remove_item(ctx: &mut ExecutionContext, row: &Record, item: &RemoveItem) -> ExecResult<()> {
    let variable = match item {
        RemoveItem::Property { variable, .. } | RemoveItem::Labels { variable, .. } => variable,
    };
    let target = row
        .get(variable)
        .ok_or_else(|| ExecutionError::SemanticError(format!("Variable `{}` not defined", variable)))?;
    match (target, item) {
        (Value::Null, _) => Ok(()),
        (Value::Node(node), _) => {
            let mut node = match ctx.view().node(&node.id) {
                Some(node) => node.clone(),
                None => return Ok(()),
            };
            let changed = match item {
                RemoveItem::Property { key, .. } => {
                    let removed = node.remove_property(key).is_some();
                    if removed {
                        ctx.counters.properties_set += 1;
                    }
                    removed
                }
                RemoveItem::Labels { labels, .. } => {
                    let mut removed = false;
                    for label in labels {
                        if node.remove_label(label) {
                            ctx.counters.labels_removed += 1;
                            removed = true;
                        }
                    }
                    removed
                }
            };
            if changed {
                ctx.record(Mutation::UpdateNode(node));
            }
            Ok(())
        }
        (Value::Edge(edge), RemoveItem::Property { key, .. }) => {
            let mut edge = match ctx.view().edge(&edge.id) {
                Some(edge) => edge.clone(),
                None => return Ok(()),
            };
            if edge.remove_property(key).is_some() {
                ctx.counters.properties_set += 1;
                ctx.record(Mutation::UpdateEdge(edge));
            }
            Ok(())
        }
        (Value::Edge(_), RemoveItem::Labels { .. }) => Err(ExecutionError::TypeError(format!(
            "Cannot remove labels from relationship `{}`",
            variable
        ))),
        (other, _) => Err(ExecutionError::TypeError(format!(
            "Expected `{}` to be a node or relationship, but it was a {}",
            variable,
            other.type_name()
        ))),
    }
}

fn execute_delete(ctx: &mut ExecutionContext, clause: &DeleteClause, rows: Vec<Record>) -> ExecResult<Vec<Record>> {
    let mut undetached = Vec::new();
    for row in &rows {
        ctx.check_cancelled()?;
        for expression in &clause.expressions {
            let value = evaluate(ctx, row, expression)?;
            delete_value(ctx, value, clause.detach, &mut undetached)?;
        }
    }
    // relationships may be deleted later in the same clause, so connectivity
    // is only checked once every row has been processed
    for id in undetached {
        if ctx.view().degree(&id) > 0 {
            return Err(ExecutionError::ConstraintViolation(format!(
                "Cannot delete node<{}>, because it still has relationships. To delete this node, you must first delete its relationships.",
                id
            )));
        }
    }
    Ok(rows)
}

fn delete_value(
    ctx: &mut ExecutionContext,
    value: Value,
    detach: bool,
    undetached: &mut Vec<String>,
) -> ExecResult<()> {
    match value {
        Value::Null => Ok(()),
        Value::Node(node) => {
            if ctx.view().node(&node.id).is_none() {
                return Ok(());
            }
            if detach {
                let edges: Vec<String> = ctx
                    .view()
                    .relationships(&node.id)
                    .iter()
                    .map(|e| e.id.clone())
                    .collect();
                for id in edges {
                    ctx.counters.relationships_deleted += 1;
                    ctx.record(Mutation::DeleteEdge(id));
                }
            } else {
                undetached.push(node.id.clone());
            }
            ctx.counters.nodes_deleted += 1;
            ctx.record(Mutation::DeleteNode(node.id));
            Ok(())
        }
        Value::Edge(edge) => {
            if ctx.view().edge(&edge.id).is_some() {
                ctx.counters.relationships_deleted += 1;
                ctx.record(Mutation::DeleteEdge(edge.id));
            }
            Ok(())
        }
        Value::Path(path) => {
            for edge in path.edges {
                delete_value(ctx, Value::Edge(edge), detach, undetached)?;
            }
            for node in path.nodes {
                delete_value(ctx, Value::Node(node), detach, undetached)?;
            }
            Ok(())
        }
        Value::List(items) => {
            for item in items {
                delete_value(ctx, item, detach, undetached)?;
            }
            Ok(())
        }
        other => Err(ExecutionError::TypeError(format!(
            "Expected a node, relationship or path to delete, got {}",
            other.type_name()
        ))),
    }
}

fn execute_foreach(ctx: &mut ExecutionContext, clause: &ForeachClause, rows: &[Record]) -> ExecResult<()> {
    for row in rows {
        let items = match evaluate(ctx, row, &clause.list)? {
            Value::Null => continue,
            Value::List(items) => items,
            other => {
                return Err(ExecutionError::TypeError(format!(
                    "FOREACH expects a list, got {}",
                    other.type_name()
                )))
            }
        };
        for item in items {
            ctx.check_cancelled()?;
            let mut inner = row.clone();
            inner.insert(clause.variable.clone(), item);
            let mut body = vec![inner];
            for nested in &clause.body {
                body = execute_update(ctx, nested, body)?;
            }
        }
    }
    Ok(())
}

// ==============================================================================
// Schema commands
// ==============================================================================

/// Run an index or constraint command. Definitions are checked against the
/// committed schema; the change itself is buffered like any other mutation.
pub fn execute_schema(ctx: &mut ExecutionContext, command: &SchemaCommand) -> ExecResult<QueryOutput> {
    match command {
        SchemaCommand::ShowIndexes => return Ok(QueryOutput::from_procedure(show_indexes(ctx))),
        SchemaCommand::ShowConstraints => {
            return Ok(QueryOutput::from_procedure(show_constraints(ctx)))
        }
        SchemaCommand::CreateIndex {
            name,
            if_not_exists,
            label,
            properties,
        } => {
            let name = name
                .clone()
                .unwrap_or_else(|| IndexDefinition::default_name("index", label, properties));
            create_index(
                ctx,
                IndexDefinition::property(name, label.clone(), properties.clone()),
                *if_not_exists,
            )?;
        }
        SchemaCommand::CreateFulltextIndex {
            name,
            if_not_exists,
            label,
            properties,
        } => {
            create_index(
                ctx,
                IndexDefinition::fulltext(name.clone(), label.clone(), properties.clone()),
                *if_not_exists,
            )?;
        }
        SchemaCommand::CreateVectorIndex {
            name,
            if_not_exists,
            label,
            property,
            options,
        } => {
            let options = match options {
                Some(expression) => evaluate_property_map(ctx, &Record::new(), expression)?,
                None => BTreeMap::new(),
            };
            let config = VectorIndexConfig::from_options(&options, ctx.vector_exact_threshold)?;
            create_index(
                ctx,
                IndexDefinition::vector(name.clone(), label.clone(), property.clone(), config),
                *if_not_exists,
            )?;
        }
        SchemaCommand::CreateConstraint {
            name,
            if_not_exists,
            label,
            property,
        } => {
            let name = name.clone().unwrap_or_else(|| {
                IndexDefinition::default_name("constraint", label, std::slice::from_ref(property))
            });
            let constraints = &ctx.state.constraints;
            if constraints.get(&name).is_some() || constraints.find(label, property).is_some() {
                if *if_not_exists {
                    return Ok(QueryOutput::default());
                }
                return Err(ExecutionError::SemanticError(format!(
                    "An equivalent constraint already exists or the name `{}` is taken",
                    name
                )));
            }
            ctx.counters.constraints_added += 1;
            ctx.record(Mutation::CreateConstraint(ConstraintDefinition::unique(
                name,
                label.clone(),
                property.clone(),
            )));
        }
        SchemaCommand::DropIndex { name, if_exists } => {
            match ctx.state.indexes.definition(name) {
                None if *if_exists => return Ok(QueryOutput::default()),
                None => {
                    return Err(ExecutionError::NotFound(format!(
                        "Unable to drop index called `{}`. There is no such index.",
                        name
                    )))
                }
                Some(definition) => {
                    if let Some(owner) = &definition.owning_constraint {
                        return Err(ExecutionError::SemanticError(format!(
                            "Unable to drop index `{}`: it belongs to constraint `{}`",
                            name, owner
                        )));
                    }
                }
            }
            ctx.counters.indexes_removed += 1;
            ctx.record(Mutation::DropIndex(name.clone()));
        }
        SchemaCommand::DropConstraint { name, if_exists } => {
            if ctx.state.constraints.get(name).is_none() {
                if *if_exists {
                    return Ok(QueryOutput::default());
                }
                return Err(ExecutionError::NotFound(format!(
                    "Unable to drop constraint `{}`. There is no such constraint.",
                    name
                )));
            }
            ctx.counters.constraints_removed += 1;
            ctx.record(Mutation::DropConstraint(name.clone()));
        }
    }
    Ok(QueryOutput::default())
}

fn create_index(ctx: &mut ExecutionContext, definition: IndexDefinition, if_not_exists: bool) -> ExecResult<()> {
    let indexes = &ctx.state.indexes;
    let conflict = if indexes.definition(&definition.name).is_some() {
        Some(format!("An index named `{}` already exists", definition.name))
    } else {
        indexes
            .find_equivalent(&definition.label, &definition.kind)
            .map(|existing| format!("An equivalent index already exists: `{}`", existing.name))
    };
    if let Some(message) = conflict {
        if if_not_exists {
            return Ok(());
        }
        return Err(ExecutionError::SemanticError(message));
    }
    if let IndexKind::Vector { config, .. } = &definition.kind {
        debug!(
            "Vector index '{}' with {} dimensions",
            definition.name, config.dimensions
        );
    }
    ctx.counters.indexes_added += 1;
    ctx.record(Mutation::CreateIndex(definition));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse_query;
    use crate::ast::Statement;
    use crate::exec::context::CancellationToken;
    use crate::functions::FunctionRegistry;
    use crate::storage::{GraphState, StorageManager};
    use crate::txn::TransactionManager;
    use std::sync::Arc;

    /// Runs statements in one transaction over an initially empty graph
    struct Harness {
        state: GraphState,
        manager: TransactionManager,
        txn: crate::txn::Transaction,
        functions: FunctionRegistry,
    }

    impl Harness {
        fn new() -> Self {
            let manager = TransactionManager::new(Arc::new(StorageManager::in_memory()), None);
            let txn = manager.begin(None);
            Self {
                state: GraphState::new(),
                manager,
                txn,
                functions: FunctionRegistry::new(),
            }
        }

        fn run_with(&mut self, text: &str, params: HashMap<String, Value>) -> ExecResult<QueryOutput> {
            let cancel = CancellationToken::new();
            let mut ctx = ExecutionContext::new(&self.state, &mut self.txn, &params, &self.functions, &cancel);
            match parse_query(text).unwrap().statement {
                Statement::Query(query) => execute_query(&mut ctx, &query),
                Statement::Schema(command) => execute_schema(&mut ctx, &command),
                other => panic!("unexpected statement {:?}", other),
            }
        }

        fn run(&mut self, text: &str) -> QueryOutput {
            self.run_with(text, HashMap::new()).unwrap()
        }

        /// Apply buffered mutations to the committed state
        fn settle(&mut self) {
            let mutations = self.txn.log().mutations().to_vec();
            self.state.apply_all(&mutations).unwrap();
            self.txn = self.manager.begin(None);
        }
    }

    fn strings(output: &QueryOutput, column: usize) -> Vec<String> {
        output
            .rows
            .iter()
            .map(|r| match &r[column] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }

    fn social() -> Harness {
        let mut h = Harness::new();
        h.run(
            "CREATE (a:Person {name: 'Ann', age: 30})-[:KNOWS]->(b:Person {name: 'Bob', age: 25}), \
             (b)-[:KNOWS]->(c:Person {name: 'Cid', age: 35}), (a)-[:LIVES_IN]->(:City {name: 'Oslo'})",
        );
        h
    }

    #[test]
    fn test_create_then_match_sees_writes() {
        let mut h = social();
        let out = h.run("MATCH (p:Person) RETURN p.name AS name ORDER BY name");
        assert_eq!(out.columns, vec!["name"]);
        assert_eq!(strings(&out, 0), vec!["Ann", "Bob", "Cid"]);
        assert_eq!(h.run("MATCH ()-[r:KNOWS]->() RETURN r").rows.len(), 2);
    }

    #[test]
    fn test_create_counters() {
        let mut h = Harness::new();
        let cancel = CancellationToken::new();
        let params = HashMap::new();
        let mut ctx = ExecutionContext::new(&h.state, &mut h.txn, &params, &h.functions, &cancel);
        let query = match parse_query("CREATE (:A:B {x: 1, y: null})-[:R {w: 2}]->(:C)").unwrap().statement {
            Statement::Query(q) => q,
            _ => unreachable!(),
        };
        execute_query(&mut ctx, &query).unwrap();
        assert_eq!(ctx.counters.nodes_created, 2);
        assert_eq!(ctx.counters.labels_added, 3);
        assert_eq!(ctx.counters.relationships_created, 1);
        assert_eq!(ctx.counters.properties_set, 2);
    }

    #[test]
    fn test_aggregation_and_grouping() {
        let mut h = social();
        let out = h.run("MATCH (p:Person) RETURN count(*) AS n, avg(p.age) AS mean, collect(p.name) AS names");
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0][0], Value::Integer(3));
        assert_eq!(out.rows[0][1], Value::Float(30.0));

        let out = h.run(
            "MATCH (a:Person)-[:KNOWS]->(b) RETURN a.name AS who, count(b) AS friends ORDER BY who",
        );
        assert_eq!(strings(&out, 0), vec!["Ann", "Bob"]);

        let out = h.run("MATCH (x:Missing) RETURN count(x) AS n");
        assert_eq!(out.rows, vec![vec![Value::Integer(0)]]);
        let out = h.run("MATCH (x:Missing) RETURN x.name AS name, count(x) AS n");
        assert!(out.rows.is_empty());
    }

    #[test]
    fn test_order_skip_limit_distinct() {
        let mut h = social();
        let out = h.run("MATCH (p:Person) RETURN p.name AS name ORDER BY p.age DESC SKIP 1 LIMIT 1");
        assert_eq!(strings(&out, 0), vec!["Ann"]);

        let out = h.run("MATCH (p:Person)-[:KNOWS]-() RETURN DISTINCT p.name AS name ORDER BY name");
        assert_eq!(strings(&out, 0), vec!["Ann", "Bob", "Cid"]);

        let err = h.run_with("MATCH (p) RETURN p LIMIT -1", HashMap::new()).unwrap_err();
        assert!(matches!(err, ExecutionError::SemanticError(_)));
    }

    #[test]
    fn test_with_where_and_unwind() {
        let mut h = social();
        let out = h.run(
            "MATCH (p:Person) WITH p.name AS name, p.age AS age WHERE age > 26 RETURN name ORDER BY name",
        );
        assert_eq!(strings(&out, 0), vec!["Ann", "Cid"]);

        let out = h.run("UNWIND [1, 2, null] AS x RETURN x");
        assert_eq!(out.rows.len(), 3);
        assert!(h.run("UNWIND null AS x RETURN x").rows.is_empty());
    }

    #[test]
    fn test_optional_match_binds_nulls() {
        let mut h = social();
        let out = h.run(
            "MATCH (p:Person) OPTIONAL MATCH (p)-[:LIVES_IN]->(c:City) RETURN p.name AS name, c.name AS city ORDER BY name",
        );
        assert_eq!(out.rows.len(), 3);
        assert_eq!(out.rows[0][1], Value::from("Oslo"));
        assert_eq!(out.rows[1][1], Value::Null);
    }

    #[test]
    fn test_set_remove_and_merge() {
        let mut h = social();
        h.run("MATCH (p:Person {name: 'Ann'}) SET p.age = 31, p:Admin REMOVE p.missing");
        let out = h.run("MATCH (p:Admin) RETURN p.age");
        assert_eq!(out.rows, vec![vec![Value::Integer(31)]]);

        h.run("MATCH (p:Person {name: 'Bob'}) SET p += {nick: 'B'} REMOVE p:Person");
        assert_eq!(h.run("MATCH (p:Person) RETURN p").rows.len(), 2);

        h.run("MERGE (c:City {name: 'Oslo'}) ON MATCH SET c.seen = true ON CREATE SET c.seen = false");
        h.run("MERGE (c:City {name: 'Rome'}) ON MATCH SET c.seen = true ON CREATE SET c.seen = false");
        let out = h.run("MATCH (c:City) RETURN c.name, c.seen ORDER BY c.name");
        assert_eq!(
            out.rows,
            vec![
                vec![Value::from("Oslo"), Value::Boolean(true)],
                vec![Value::from("Rome"), Value::Boolean(false)],
            ]
        );

        let err = h.run_with("MERGE (c:City {name: null})", HashMap::new()).unwrap_err();
        assert!(matches!(err, ExecutionError::SemanticError(_)));
    }

    #[test]
    fn test_delete_requires_detach() {
        let mut h = social();
        h.settle();
        let err = h.run_with("MATCH (p:Person {name: 'Bob'}) DELETE p", HashMap::new()).unwrap_err();
        assert!(matches!(err, ExecutionError::ConstraintViolation(_)));

        let mut h = social();
        h.settle();
        h.run("MATCH (p:Person {name: 'Bob'}) DETACH DELETE p");
        assert_eq!(h.run("MATCH (p:Person) RETURN p").rows.len(), 2);
        assert!(h.run("MATCH ()-[r:KNOWS]->() RETURN r").rows.is_empty());

        // deleting the relationships first in the same clause is fine
        h.run("MATCH (c:City)<-[r]-(p) DELETE r, c");
        assert!(h.run("MATCH (c:City) RETURN c").rows.is_empty());
    }

    #[test]
    fn test_foreach_and_union() {
        let mut h = Harness::new();
        h.run("FOREACH (x IN [1, 2, 3] | CREATE (:N {v: x}))");
        assert_eq!(h.run("MATCH (n:N) RETURN n.v").rows.len(), 3);

        let out = h.run("MATCH (n:N) RETURN n.v AS v UNION MATCH (n:N) WHERE n.v < 3 RETURN n.v AS v");
        assert_eq!(out.rows.len(), 3);
        let out = h.run("MATCH (n:N) RETURN n.v AS v UNION ALL MATCH (n:N) WHERE n.v < 3 RETURN n.v AS v");
        assert_eq!(out.rows.len(), 5);
    }

    #[test]
    fn test_exists_and_count_subqueries() {
        let mut h = social();
        let out = h.run(
            "MATCH (p:Person) WHERE EXISTS { MATCH (p)-[:KNOWS]->() } RETURN p.name AS name ORDER BY name",
        );
        assert_eq!(strings(&out, 0), vec!["Ann", "Bob"]);

        let out = h.run(
            "MATCH (p:Person) RETURN p.name AS name, COUNT { MATCH (p)-[:KNOWS]-() } AS degree ORDER BY name",
        );
        let degrees: Vec<Value> = out.rows.iter().map(|r| r[1].clone()).collect();
        assert_eq!(degrees, vec![Value::Integer(1), Value::Integer(2), Value::Integer(1)]);
    }

    #[test]
    fn test_return_star_sorted() {
        let mut h = social();
        let out = h.run("MATCH (b:Person {name: 'Bob'})<-[r]-(a) RETURN *");
        assert_eq!(out.columns, vec!["a", "b", "r"]);
    }

    #[test]
    fn test_call_yield_where() {
        let mut h = social();
        h.settle();
        let out = h.run("CALL db.labels() YIELD label AS l WHERE l <> 'City' RETURN l ORDER BY l");
        assert_eq!(strings(&out, 0), vec!["Person"]);
        let out = h.run("CALL db.labels()");
        assert_eq!(out.columns, vec!["label"]);
        assert_eq!(out.rows.len(), 2);
    }

    #[test]
    fn test_schema_commands() {
        let mut h = social();
        h.settle();
        h.run("CREATE INDEX person_name FOR (p:Person) ON (p.name)");
        h.settle();
        let err = h
            .run_with("CREATE INDEX other FOR (p:Person) ON (p.name)", HashMap::new())
            .unwrap_err();
        assert!(matches!(err, ExecutionError::SemanticError(_)));
        h.run("CREATE INDEX other IF NOT EXISTS FOR (p:Person) ON (p.name)");
        assert!(h.txn.log().mutations().is_empty());

        h.run("CREATE CONSTRAINT unique_name FOR (p:City) REQUIRE p.name IS UNIQUE");
        h.settle();
        let err = h.run_with("CREATE (:City {name: 'Oslo'})", HashMap::new()).unwrap_err();
        assert!(matches!(err, ExecutionError::ConstraintViolation(_)));

        let err = h.run_with("DROP INDEX unique_name_index", HashMap::new()).unwrap_err();
        assert!(matches!(err, ExecutionError::SemanticError(_)));
        h.run("DROP INDEX missing IF EXISTS");
        let out = h.run("SHOW INDEXES");
        assert_eq!(out.rows.len(), 2);
    }
}
