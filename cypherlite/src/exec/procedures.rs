// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Built-in procedures reachable through CALL
//!
//! Introspection procedures describe the schema and the data visible to the
//! calling transaction. The index query procedures rank committed index
//! contents together with the nodes the transaction created, changed or
//! deleted.

use crate::ast::{CallClause, YieldItems};
use crate::exec::context::ExecutionContext;
use crate::exec::error::ExecutionError;
use crate::storage::indexes::hybrid::{fuse_hybrid, HybridWeights};
use crate::storage::Value;

/// Rows produced by a procedure, in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcedureOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

const PROCEDURES: &[(&str, &[&str])] = &[
    ("db.labels", &["label"]),
    ("db.relationshipTypes", &["relationshipType"]),
    ("db.propertyKeys", &["propertyKey"]),
    ("db.indexes", INDEX_COLUMNS),
    ("db.constraints", CONSTRAINT_COLUMNS),
    ("db.index.vector.queryNodes", &["node", "score"]),
    ("db.index.fulltext.queryNodes", &["node", "score"]),
    ("db.index.hybrid.queryNodes", &["node", "score"]),
];

const INDEX_COLUMNS: &[&str] = &[
    "name",
    "type",
    "entityType",
    "labelsOrTypes",
    "properties",
    "state",
    "owningConstraint",
];

const CONSTRAINT_COLUMNS: &[&str] = &[
    "name",
    "type",
    "entityType",
    "labelsOrTypes",
    "properties",
    "ownedIndex",
];

/// Candidate depth multiplier for each side of a hybrid search
const HYBRID_DEPTH: usize = 3;

fn lookup(name: &str) -> Option<(&'static str, &'static [&'static str])> {
    PROCEDURES
        .iter()
        .find(|(procedure, _)| procedure.eq_ignore_ascii_case(name))
        .copied()
}

pub fn is_known_procedure(name: &str) -> bool {
    lookup(name).is_some()
}

/// Output columns of a procedure
pub fn output_columns(name: &str) -> Option<&'static [&'static str]> {
    lookup(name).map(|(_, columns)| columns)
}

/// Variables a CALL clause introduces
pub fn yielded_columns(call: &CallClause) -> Vec<String> {
    match &call.yield_items {
        Some(YieldItems::Items(items)) => items.iter().map(|i| i.variable().to_string()).collect(),
        Some(YieldItems::All) | None => output_columns(&call.procedure)
            .map(|columns| columns.iter().map(|c| c.to_string()).collect())
            .unwrap_or_default(),
    }
}

/// Run a procedure with evaluated arguments
pub fn call_procedure(
    ctx: &ExecutionContext,
    name: &str,
    args: &[Value],
) -> Result<ProcedureOutput, ExecutionError> {
    let (canonical, columns) = lookup(name).ok_or_else(|| {
        ExecutionError::SemanticError(format!(
            "There is no procedure with the name `{}` registered for this database instance",
            name
        ))
    })?;
    let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    let rows = match canonical {
        "db.labels" => single_column(labels(ctx)),
        "db.relationshipTypes" => single_column(relationship_types(ctx)),
        "db.propertyKeys" => single_column(property_keys(ctx)),
        "db.indexes" => return Ok(show_indexes(ctx)),
        "db.constraints" => return Ok(show_constraints(ctx)),
        "db.index.vector.queryNodes" => vector_query(ctx, args)?,
        "db.index.fulltext.queryNodes" => fulltext_query(ctx, args)?,
        "db.index.hybrid.queryNodes" => hybrid_query(ctx, args)?,
        _ => Vec::new(),
    };
    Ok(ProcedureOutput { columns, rows })
}

fn single_column(values: Vec<String>) -> Vec<Vec<Value>> {
    values.into_iter().map(|v| vec![Value::String(v)]).collect()
}

fn labels(ctx: &ExecutionContext) -> Vec<String> {
    let view = ctx.view();
    let mut labels: Vec<String> = view
        .node_ids()
        .iter()
        .filter_map(|id| view.node(id))
        .flat_map(|node| node.labels.iter().cloned())
        .collect();
    labels.sort();
    labels.dedup();
    labels
}

fn relationship_types(ctx: &ExecutionContext) -> Vec<String> {
    let view = ctx.view();
    let mut types: Vec<String> = view
        .edge_ids()
        .iter()
        .filter_map(|id| view.edge(id))
        .map(|edge| edge.rel_type.clone())
        .collect();
    types.sort();
    types.dedup();
    types
}

fn property_keys(ctx: &ExecutionContext) -> Vec<String> {
    let view = ctx.view();
    let node_keys = view
        .node_ids()
        .into_iter()
        .filter_map(|id| view.node(&id))
        .flat_map(|node| node.properties.keys().cloned());
    let edge_keys = view
        .edge_ids()
        .into_iter()
        .filter_map(|id| view.edge(&id))
        .flat_map(|edge| edge.properties.keys().cloned());
    let mut keys: Vec<String> = node_keys.chain(edge_keys).collect();
    keys.sort();
    keys.dedup();
    keys
}

fn strings(values: Vec<String>) -> Value {
    Value::List(values.into_iter().map(Value::String).collect())
}

/// Rows of `SHOW INDEXES` and `db.indexes()`, by name
pub fn show_indexes(ctx: &ExecutionContext) -> ProcedureOutput {
    let mut definitions = ctx.state.indexes.definitions();
    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    let rows = definitions
        .into_iter()
        .map(|definition| {
            vec![
                Value::String(definition.name.clone()),
                Value::from(definition.kind.type_name()),
                Value::from("NODE"),
                strings(vec![definition.label.clone()]),
                strings(definition.kind.properties()),
                Value::from("ONLINE"),
                definition
                    .owning_constraint
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            ]
        })
        .collect();
    ProcedureOutput {
        columns: INDEX_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows,
    }
}

/// Rows of `SHOW CONSTRAINTS` and `db.constraints()`, by name
pub fn show_constraints(ctx: &ExecutionContext) -> ProcedureOutput {
    let mut definitions = ctx.state.constraints.definitions();
    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    let rows = definitions
        .into_iter()
        .map(|constraint| {
            vec![
                Value::String(constraint.name.clone()),
                Value::from("UNIQUENESS"),
                Value::from("NODE"),
                strings(vec![constraint.label.clone()]),
                strings(vec![constraint.property.clone()]),
                Value::String(constraint.backing_index_name()),
            ]
        })
        .collect();
    ProcedureOutput {
        columns: CONSTRAINT_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows,
    }
}

fn argument<'v>(args: &'v [Value], index: usize, procedure: &str) -> Result<&'v Value, ExecutionError> {
    args.get(index).ok_or_else(|| {
        ExecutionError::SemanticError(format!(
            "Procedure call does not provide the required number of arguments: {}",
            procedure
        ))
    })
}

fn string_argument(args: &[Value], index: usize, procedure: &str) -> Result<String, ExecutionError> {
    match argument(args, index, procedure)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(ExecutionError::TypeError(format!(
            "{} expects a string argument at position {} but got {}",
            procedure,
            index + 1,
            other.type_name()
        ))),
    }
}

fn count_argument(args: &[Value], index: usize, procedure: &str) -> Result<usize, ExecutionError> {
    match argument(args, index, procedure)? {
        Value::Integer(n) if *n >= 0 => Ok(*n as usize),
        other => Err(ExecutionError::TypeError(format!(
            "{} expects a non-negative integer at position {} but got {}",
            procedure,
            index + 1,
            other
        ))),
    }
}

fn vector_argument(args: &[Value], index: usize, procedure: &str) -> Result<Vec<f32>, ExecutionError> {
    let value = argument(args, index, procedure)?;
    value.to_vector().ok_or_else(|| {
        ExecutionError::TypeError(format!(
            "{} expects a list of numbers at position {} but got {}",
            procedure,
            index + 1,
            value.type_name()
        ))
    })
}

/// Attach the visible node to each hit
fn node_rows(ctx: &ExecutionContext, hits: Vec<(String, f64)>) -> Vec<Vec<Value>> {
    let view = ctx.view();
    ctx.hit(hits.len() as u64);
    hits.into_iter()
        .filter_map(|(id, score)| {
            view.node(&id)
                .map(|node| vec![Value::Node(node.clone()), Value::Float(score)])
        })
        .collect()
}

fn vector_query(ctx: &ExecutionContext, args: &[Value]) -> Result<Vec<Vec<Value>>, ExecutionError> {
    let procedure = "db.index.vector.queryNodes";
    let name = string_argument(args, 0, procedure)?;
    let k = count_argument(args, 1, procedure)?;
    let query = vector_argument(args, 2, procedure)?;
    let hits = ctx.view().vector_search(&name, &query, k)?;
    Ok(node_rows(
        ctx,
        hits.into_iter().map(|h| (h.key, h.score)).collect(),
    ))
}

fn fulltext_query(ctx: &ExecutionContext, args: &[Value]) -> Result<Vec<Vec<Value>>, ExecutionError> {
    let procedure = "db.index.fulltext.queryNodes";
    let name = string_argument(args, 0, procedure)?;
    let query = string_argument(args, 1, procedure)?;
    let limit = match args.get(2) {
        Some(_) => count_argument(args, 2, procedure)?,
        None => usize::MAX,
    };
    let hits = ctx.view().fulltext_search(&name, &query, limit)?;
    Ok(node_rows(ctx, hits))
}

fn hybrid_query(ctx: &ExecutionContext, args: &[Value]) -> Result<Vec<Vec<Value>>, ExecutionError> {
    let procedure = "db.index.hybrid.queryNodes";
    let vector_index = string_argument(args, 0, procedure)?;
    let fulltext_index = string_argument(args, 1, procedure)?;
    let text = string_argument(args, 2, procedure)?;
    let vector = vector_argument(args, 3, procedure)?;
    let k = count_argument(args, 4, procedure)?;

    let depth = k.saturating_mul(HYBRID_DEPTH).max(k);
    let view = ctx.view();
    let text_ranking: Vec<String> = view
        .fulltext_search(&fulltext_index, &text, depth)?
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    let vector_ranking: Vec<String> = view
        .vector_search(&vector_index, &vector, depth)?
        .into_iter()
        .map(|hit| hit.key)
        .collect();
    let fused = fuse_hybrid(
        text_ranking,
        vector_ranking,
        HybridWeights::adaptive(&text),
        k,
    );
    Ok(node_rows(
        ctx,
        fused.into_iter().map(|s| (s.node_id, s.score)).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::context::CancellationToken;
    use crate::functions::FunctionRegistry;
    use crate::storage::indexes::{IndexDefinition, SimilarityMetric, VectorIndexConfig, VectorIndexKind};
    use crate::storage::{ApplyMode, ConstraintDefinition, GraphState, Mutation, Node, StorageManager};
    use crate::txn::TransactionManager;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn state() -> GraphState {
        let mut state = GraphState::new();
        let mut a = Node::with_labels("a".into(), vec!["Person".into()]);
        a.set_property("name".into(), Value::from("Ann"));
        let mut b = Node::with_labels("b".into(), vec!["City".into()]);
        b.set_property("zip".into(), Value::from("1000"));
        state
            .apply_all(&[Mutation::CreateNode(a), Mutation::CreateNode(b)])
            .unwrap();
        state
            .apply(
                &Mutation::CreateConstraint(ConstraintDefinition::unique("person_name", "Person", "name")),
                ApplyMode::Checked,
            )
            .unwrap();
        state
            .apply(
                &Mutation::CreateIndex(IndexDefinition::fulltext("docs", "Person", vec!["name".into()])),
                ApplyMode::Checked,
            )
            .unwrap();
        state
    }

    #[test]
    fn test_introspection_sees_transaction_writes() {
        let state = state();
        let manager = TransactionManager::new(Arc::new(StorageManager::in_memory()), None);
        let mut txn = manager.begin(None);
        txn.record(Mutation::CreateNode(Node::with_labels("c".into(), vec!["Animal".into()])));
        let params = HashMap::new();
        let functions = FunctionRegistry::new();
        let cancel = CancellationToken::new();
        let ctx = ExecutionContext::new(&state, &mut txn, &params, &functions, &cancel);

        let labels = call_procedure(&ctx, "db.labels", &[]).unwrap();
        assert_eq!(labels.columns, vec!["label"]);
        let names: Vec<&str> = labels.rows.iter().filter_map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["Animal", "City", "Person"]);

        let keys = call_procedure(&ctx, "DB.PROPERTYKEYS", &[]).unwrap();
        assert_eq!(keys.rows.len(), 2);
    }

    #[test]
    fn test_schema_listings() {
        let state = state();
        let manager = TransactionManager::new(Arc::new(StorageManager::in_memory()), None);
        let mut txn = manager.begin(None);
        let params = HashMap::new();
        let functions = FunctionRegistry::new();
        let cancel = CancellationToken::new();
        let ctx = ExecutionContext::new(&state, &mut txn, &params, &functions, &cancel);

        let indexes = show_indexes(&ctx);
        let names: Vec<&Value> = indexes.rows.iter().map(|r| &r[0]).collect();
        assert_eq!(names, vec![&Value::from("docs"), &Value::from("person_name_index")]);
        assert_eq!(indexes.rows[1][6], Value::from("person_name"));

        let constraints = show_constraints(&ctx);
        assert_eq!(constraints.rows.len(), 1);
        assert_eq!(constraints.rows[0][1], Value::from("UNIQUENESS"));
    }

    #[test]
    fn test_unknown_procedure_and_bad_arguments() {
        let state = state();
        let manager = TransactionManager::new(Arc::new(StorageManager::in_memory()), None);
        let mut txn = manager.begin(None);
        let params = HashMap::new();
        let functions = FunctionRegistry::new();
        let cancel = CancellationToken::new();
        let ctx = ExecutionContext::new(&state, &mut txn, &params, &functions, &cancel);

        assert!(!is_known_procedure("db.nothing"));
        assert!(matches!(
            call_procedure(&ctx, "db.nothing", &[]),
            Err(ExecutionError::SemanticError(_))
        ));
        assert!(matches!(
            call_procedure(&ctx, "db.index.fulltext.queryNodes", &[Value::Integer(1)]),
            Err(ExecutionError::TypeError(_))
        ));
        let hits = call_procedure(
            &ctx,
            "db.index.fulltext.queryNodes",
            &[Value::from("docs"), Value::from("ann")],
        )
        .unwrap();
        assert_eq!(hits.rows.len(), 1);
    }

    fn doc(id: &str, embedding: [f64; 2]) -> Node {
        let mut node = Node::with_labels(id.into(), vec!["Doc".into()]);
        node.set_property(
            "embedding".into(),
            Value::List(embedding.iter().map(|v| Value::Float(*v)).collect()),
        );
        node
    }

    fn hit_ids(output: &ProcedureOutput) -> Vec<String> {
        output
            .rows
            .iter()
            .filter_map(|row| row[0].as_node().map(|n| n.id.clone()))
            .collect()
    }

    #[test]
    fn test_index_queries_see_transaction_writes() {
        let mut state = state();
        state
            .apply(
                &Mutation::CreateIndex(IndexDefinition::vector(
                    "emb",
                    "Doc",
                    "embedding",
                    VectorIndexConfig::new(2, SimilarityMetric::Cosine)
                        .with_kind(VectorIndexKind::Exact),
                )),
                ApplyMode::Checked,
            )
            .unwrap();
        state
            .apply_all(&[
                Mutation::CreateNode(doc("d1", [1.0, 0.0])),
                Mutation::CreateNode(doc("d2", [0.0, 1.0])),
            ])
            .unwrap();

        let manager = TransactionManager::new(Arc::new(StorageManager::in_memory()), None);
        let mut txn = manager.begin(None);
        let mut zed = Node::with_labels("z".into(), vec!["Person".into()]);
        zed.set_property("name".into(), Value::from("Zed fresh"));
        txn.record(Mutation::CreateNode(zed));
        let mut renamed = Node::with_labels("a".into(), vec!["Person".into()]);
        renamed.set_property("name".into(), Value::from("Bea"));
        txn.record(Mutation::UpdateNode(renamed));
        txn.record(Mutation::CreateNode(doc("d3", [0.9, 0.1])));
        txn.record(Mutation::DeleteNode("d1".into()));

        let params = HashMap::new();
        let functions = FunctionRegistry::new();
        let cancel = CancellationToken::new();
        let ctx = ExecutionContext::new(&state, &mut txn, &params, &functions, &cancel);

        let fresh = call_procedure(
            &ctx,
            "db.index.fulltext.queryNodes",
            &[Value::from("docs"), Value::from("fresh")],
        )
        .unwrap();
        assert_eq!(hit_ids(&fresh), vec!["z"]);
        let stale = call_procedure(
            &ctx,
            "db.index.fulltext.queryNodes",
            &[Value::from("docs"), Value::from("ann")],
        )
        .unwrap();
        assert!(stale.rows.is_empty());

        // d1 is deleted in the transaction, so both slots are still filled
        let nearest = call_procedure(
            &ctx,
            "db.index.vector.queryNodes",
            &[
                Value::from("emb"),
                Value::Integer(2),
                Value::List(vec![Value::Float(1.0), Value::Float(0.0)]),
            ],
        )
        .unwrap();
        assert_eq!(hit_ids(&nearest), vec!["d3", "d2"]);
    }
}
