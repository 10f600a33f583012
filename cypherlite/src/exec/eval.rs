// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Expression evaluation
//!
//! Evaluation follows three-valued logic: comparisons involving null yield
//! null, and a null predicate filters a row out. Aggregate calls are never
//! evaluated here; the projection computes them per group and hands their
//! results in through [`evaluate_with_aggregates`], keyed by the call's
//! rendered text.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;

use crate::ast::{
    BinaryOperator, Expression, Literal, MapProjectionItem, Quantifier, UnaryOperator,
};
use crate::exec::context::{ExecutionContext, Record};
use crate::exec::error::ExecutionError;
use crate::functions::FunctionContext;
use crate::storage::{Edge, Node, Value};

type EvalResult = Result<Value, ExecutionError>;

/// Compiled `=~` patterns, anchored to match the whole string
static REGEX_CACHE: Lazy<RwLock<HashMap<String, Arc<Regex>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Evaluate `expression` against one row
pub fn evaluate(ctx: &ExecutionContext, row: &Record, expression: &Expression) -> EvalResult {
    Evaluator {
        ctx,
        aggregates: None,
    }
    .eval(row, expression)
}

/// Evaluate a projection item whose aggregate calls were computed already
pub fn evaluate_with_aggregates(
    ctx: &ExecutionContext,
    row: &Record,
    expression: &Expression,
    aggregates: &HashMap<String, Value>,
) -> EvalResult {
    Evaluator {
        ctx,
        aggregates: Some(aggregates),
    }
    .eval(row, expression)
}

/// Evaluate a WHERE predicate; null and false both reject the row
pub fn evaluate_predicate(
    ctx: &ExecutionContext,
    row: &Record,
    expression: &Expression,
) -> Result<bool, ExecutionError> {
    match evaluate(ctx, row, expression)? {
        Value::Boolean(b) => Ok(b),
        Value::Null => Ok(false),
        other => Err(ExecutionError::TypeError(format!(
            "Expected a boolean predicate but got {}",
            other.type_name()
        ))),
    }
}

/// Key under which an aggregate call's result is looked up
pub fn aggregate_key(expression: &Expression) -> String {
    expression.to_string()
}

/// The latest image of a node, including this transaction's writes
pub fn current_node(ctx: &ExecutionContext, node: &Node) -> Node {
    ctx.view().node(&node.id).cloned().unwrap_or_else(|| node.clone())
}

pub fn current_edge(ctx: &ExecutionContext, edge: &Edge) -> Edge {
    ctx.view().edge(&edge.id).cloned().unwrap_or_else(|| edge.clone())
}

/// Replace entity snapshots inside `value` with their latest images
pub fn refresh(ctx: &ExecutionContext, value: Value) -> Value {
    match value {
        Value::Node(node) => Value::Node(current_node(ctx, &node)),
        Value::Edge(edge) => Value::Edge(current_edge(ctx, &edge)),
        Value::List(items) => Value::List(items.into_iter().map(|v| refresh(ctx, v)).collect()),
        Value::Map(map) => Value::Map(map.into_iter().map(|(k, v)| (k, refresh(ctx, v))).collect()),
        other => other,
    }
}

/// Evaluate an inline property map (`{k: v}` or `$param`) into key/value pairs
pub fn evaluate_property_map(
    ctx: &ExecutionContext,
    row: &Record,
    expression: &Expression,
) -> Result<BTreeMap<String, Value>, ExecutionError> {
    match evaluate(ctx, row, expression)? {
        Value::Map(map) => Ok(map),
        Value::Null => Ok(BTreeMap::new()),
        other => Err(ExecutionError::TypeError(format!(
            "Expected a map of properties but got {}",
            other.type_name()
        ))),
    }
}

/// Properties of a node, relationship or map value
pub fn properties_of(value: &Value) -> Option<BTreeMap<String, Value>> {
    match value {
        Value::Node(node) => Some(
            node.properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        Value::Edge(edge) => Some(
            edge.properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        Value::Map(map) => Some(map.clone()),
        _ => None,
    }
}

struct Evaluator<'c, 'a> {
    ctx: &'c ExecutionContext<'a>,
    aggregates: Option<&'c HashMap<String, Value>>,
}

impl<'c, 'a> Evaluator<'c, 'a> {
    fn eval(&self, row: &Record, expression: &Expression) -> EvalResult {
        match expression {
            Expression::Literal(literal) => Ok(literal_value(literal)),
            Expression::Parameter(name) => self.ctx.parameter(name).cloned(),
            Expression::Variable(name) => row.get(name).cloned().ok_or_else(|| {
                ExecutionError::SemanticError(format!("Variable `{}` not defined", name))
            }),
            Expression::Property(target, key) => {
                let target = self.eval(row, target)?;
                self.property(&target, key)
            }
            Expression::Index(target, index) => {
                let target = self.eval(row, target)?;
                let index = self.eval(row, index)?;
                self.index(&target, &index)
            }
            Expression::Slice { target, from, to } => {
                let target = self.eval(row, target)?;
                let from = from.as_ref().map(|e| self.eval(row, e)).transpose()?;
                let to = to.as_ref().map(|e| self.eval(row, e)).transpose()?;
                slice(&target, from.as_ref(), to.as_ref())
            }
            Expression::List(items) => items
                .iter()
                .map(|item| self.eval(row, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expression::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(row, value)?);
                }
                Ok(Value::Map(map))
            }
            Expression::Unary(op, operand) => {
                let value = self.eval(row, operand)?;
                unary(*op, value)
            }
            Expression::Binary(op, left, right) => self.binary(row, *op, left, right),
            Expression::IsNull {
                expression,
                negated,
            } => {
                let is_null = self.eval(row, expression)?.is_null();
                Ok(Value::Boolean(is_null != *negated))
            }
            Expression::HasLabels(target, labels) => match self.eval(row, target)? {
                Value::Null => Ok(Value::Null),
                Value::Node(node) => {
                    let node = current_node(self.ctx, &node);
                    Ok(Value::Boolean(labels.iter().all(|l| node.has_label(l))))
                }
                other => Err(ExecutionError::TypeError(format!(
                    "Expected a node for a label check but got {}",
                    other.type_name()
                ))),
            },
            Expression::FunctionCall {
                name, arguments, ..
            } => {
                if expression.is_aggregate_call() {
                    return self.aggregate(expression);
                }
                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.eval(row, argument)?);
                }
                let view = self.ctx.view();
                let context = FunctionContext::with_graph(values, view);
                Ok(self.ctx.functions.invoke(name, &context)?)
            }
            Expression::CountStar => self.aggregate(expression),
            Expression::Case {
                operand,
                alternatives,
                default,
            } => self.case(row, operand.as_deref(), alternatives, default.as_deref()),
            Expression::ListComprehension {
                variable,
                list,
                predicate,
                projection,
            } => {
                let items = match self.eval(row, list)? {
                    Value::Null => return Ok(Value::Null),
                    Value::List(items) => items,
                    other => return Err(expected_list(&other)),
                };
                let mut scope = row.clone();
                let mut out = Vec::new();
                for item in items {
                    scope.insert(variable.clone(), item.clone());
                    if let Some(predicate) = predicate {
                        if !truthy(&self.eval(&scope, predicate)?) {
                            continue;
                        }
                    }
                    match projection {
                        Some(projection) => out.push(self.eval(&scope, projection)?),
                        None => out.push(item),
                    }
                }
                Ok(Value::List(out))
            }
            Expression::Quantified {
                quantifier,
                variable,
                list,
                predicate,
            } => self.quantified(row, *quantifier, variable, list, predicate),
            Expression::MapProjection { variable, items } => {
                self.map_projection(row, variable, items)
            }
            Expression::PatternPredicate(element) => {
                let found = crate::exec::pattern::pattern_exists(self.ctx, row, element)?;
                Ok(Value::Boolean(found))
            }
            Expression::Exists(query) => {
                let rows = crate::exec::executor::run_subquery(self.ctx, query, row, Some(1))?;
                Ok(Value::Boolean(!rows.is_empty()))
            }
            Expression::CountSubquery(query) => {
                let rows = crate::exec::executor::run_subquery(self.ctx, query, row, None)?;
                Ok(Value::Integer(rows.len() as i64))
            }
        }
    }

    fn aggregate(&self, expression: &Expression) -> EvalResult {
        let key = aggregate_key(expression);
        self.aggregates
            .and_then(|values| values.get(&key))
            .cloned()
            .ok_or_else(|| {
                ExecutionError::SemanticError(format!(
                    "Aggregate {} is only allowed in WITH and RETURN",
                    key
                ))
            })
    }

    fn property(&self, target: &Value, key: &str) -> EvalResult {
        match target {
            Value::Null => Ok(Value::Null),
            Value::Node(node) => {
                self.ctx.hit(1);
                let view = self.ctx.view();
                let node = view.node(&node.id).unwrap_or(node);
                Ok(node.get_property(key).cloned().unwrap_or(Value::Null))
            }
            Value::Edge(edge) => {
                self.ctx.hit(1);
                let view = self.ctx.view();
                let edge = view.edge(&edge.id).unwrap_or(edge);
                Ok(edge.get_property(key).cloned().unwrap_or(Value::Null))
            }
            Value::Map(map) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
            other => Err(ExecutionError::TypeError(format!(
                "Type mismatch: expected a map, node or relationship but was {} when reading '{}'",
                other.type_name(),
                key
            ))),
        }
    }

    fn index(&self, target: &Value, index: &Value) -> EvalResult {
        match (target, index) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::List(items), Value::Integer(i)) => {
                let len = items.len() as i64;
                let position = if *i < 0 { len + i } else { *i };
                if position < 0 || position >= len {
                    Ok(Value::Null)
                } else {
                    Ok(items[position as usize].clone())
                }
            }
            (Value::List(_), other) => Err(ExecutionError::TypeError(format!(
                "List index must be an integer, got {}",
                other.type_name()
            ))),
            (Value::Map(_) | Value::Node(_) | Value::Edge(_), Value::String(key)) => {
                self.property(target, key)
            }
            (other, _) => Err(ExecutionError::TypeError(format!(
                "Cannot index into {}",
                other.type_name()
            ))),
        }
    }

    fn binary(
        &self,
        row: &Record,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
    ) -> EvalResult {
        match op {
            BinaryOperator::And => {
                let l = as_ternary(self.eval(row, left)?)?;
                if l == Some(false) {
                    return Ok(Value::Boolean(false));
                }
                let r = as_ternary(self.eval(row, right)?)?;
                Ok(match (l, r) {
                    (_, Some(false)) => Value::Boolean(false),
                    (Some(true), Some(true)) => Value::Boolean(true),
                    _ => Value::Null,
                })
            }
            BinaryOperator::Or => {
                let l = as_ternary(self.eval(row, left)?)?;
                if l == Some(true) {
                    return Ok(Value::Boolean(true));
                }
                let r = as_ternary(self.eval(row, right)?)?;
                Ok(match (l, r) {
                    (_, Some(true)) => Value::Boolean(true),
                    (Some(false), Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                })
            }
            BinaryOperator::Xor => {
                let l = as_ternary(self.eval(row, left)?)?;
                let r = as_ternary(self.eval(row, right)?)?;
                Ok(match (l, r) {
                    (Some(a), Some(b)) => Value::Boolean(a != b),
                    _ => Value::Null,
                })
            }
            _ => {
                let l = self.eval(row, left)?;
                let r = self.eval(row, right)?;
                binary_values(op, l, r)
            }
        }
    }

    fn case(
        &self,
        row: &Record,
        operand: Option<&Expression>,
        alternatives: &[(Expression, Expression)],
        default: Option<&Expression>,
    ) -> EvalResult {
        match operand {
            Some(operand) => {
                let subject = self.eval(row, operand)?;
                for (when, then) in alternatives {
                    let candidate = self.eval(row, when)?;
                    if subject.equals(&candidate) == Some(true) {
                        return self.eval(row, then);
                    }
                }
            }
            None => {
                for (when, then) in alternatives {
                    if truthy(&self.eval(row, when)?) {
                        return self.eval(row, then);
                    }
                }
            }
        }
        match default {
            Some(default) => self.eval(row, default),
            None => Ok(Value::Null),
        }
    }

    fn quantified(
        &self,
        row: &Record,
        quantifier: Quantifier,
        variable: &str,
        list: &Expression,
        predicate: &Expression,
    ) -> EvalResult {
        let items = match self.eval(row, list)? {
            Value::Null => return Ok(Value::Null),
            Value::List(items) => items,
            other => return Err(expected_list(&other)),
        };
        let mut scope = row.clone();
        let (mut matched, mut failed, mut unknown) = (0usize, 0usize, 0usize);
        for item in items {
            scope.insert(variable.to_string(), item);
            match as_ternary(self.eval(&scope, predicate)?)? {
                Some(true) => matched += 1,
                Some(false) => failed += 1,
                None => unknown += 1,
            }
        }
        let result = match quantifier {
            Quantifier::Any if matched > 0 => Some(true),
            Quantifier::All if failed > 0 => Some(false),
            Quantifier::None if matched > 0 => Some(false),
            Quantifier::Single if matched > 1 => Some(false),
            _ if unknown > 0 => None,
            Quantifier::Any => Some(false),
            Quantifier::All | Quantifier::None => Some(true),
            Quantifier::Single => Some(matched == 1),
        };
        Ok(result.map(Value::Boolean).unwrap_or(Value::Null))
    }

    fn map_projection(
        &self,
        row: &Record,
        variable: &str,
        items: &[MapProjectionItem],
    ) -> EvalResult {
        let subject = row.get(variable).cloned().ok_or_else(|| {
            ExecutionError::SemanticError(format!("Variable `{}` not defined", variable))
        })?;
        if subject.is_null() {
            return Ok(Value::Null);
        }
        let subject = refresh(self.ctx, subject);
        let properties = properties_of(&subject).ok_or_else(|| {
            ExecutionError::TypeError(format!(
                "Map projection requires a map, node or relationship but got {}",
                subject.type_name()
            ))
        })?;

        let mut out = BTreeMap::new();
        for item in items {
            match item {
                MapProjectionItem::Property(key) => {
                    out.insert(
                        key.clone(),
                        properties.get(key).cloned().unwrap_or(Value::Null),
                    );
                }
                MapProjectionItem::AllProperties => {
                    out.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                MapProjectionItem::Literal(key, expression) => {
                    out.insert(key.clone(), self.eval(row, expression)?);
                }
                MapProjectionItem::Variable(name) => {
                    let value = row.get(name).cloned().unwrap_or(Value::Null);
                    out.insert(name.clone(), value);
                }
            }
        }
        Ok(Value::Map(out))
    }
}

pub(crate) fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Integer(i) => Value::Integer(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
    }
}

/// True only for boolean true
pub fn truthy(value: &Value) -> bool {
    matches!(value, Value::Boolean(true))
}

fn as_ternary(value: Value) -> Result<Option<bool>, ExecutionError> {
    match value {
        Value::Boolean(b) => Ok(Some(b)),
        Value::Null => Ok(None),
        other => Err(ExecutionError::TypeError(format!(
            "Expected a boolean but got {}",
            other.type_name()
        ))),
    }
}

fn expected_list(value: &Value) -> ExecutionError {
    ExecutionError::TypeError(format!("Expected a list but got {}", value.type_name()))
}

fn overflow() -> ExecutionError {
    ExecutionError::RuntimeError("integer overflow".to_string())
}

fn unary(op: UnaryOperator, value: Value) -> EvalResult {
    match (op, value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOperator::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (UnaryOperator::Minus, Value::Integer(i)) => {
            i.checked_neg().map(Value::Integer).ok_or_else(overflow)
        }
        (UnaryOperator::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOperator::Plus, v @ (Value::Integer(_) | Value::Float(_))) => Ok(v),
        (op, other) => Err(ExecutionError::TypeError(format!(
            "Cannot apply {:?} to {}",
            op,
            other.type_name()
        ))),
    }
}

/// String form used when concatenating with `+`
fn concat_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn binary_values(op: BinaryOperator, l: Value, r: Value) -> EvalResult {
    use BinaryOperator::*;
    match op {
        Equal => Ok(ternary(l.equals(&r))),
        NotEqual => Ok(ternary(l.equals(&r).map(|b| !b))),
        LessThan => Ok(ternary(l.compare(&r).map(|o| o == Ordering::Less))),
        LessEqual => Ok(ternary(l.compare(&r).map(|o| o != Ordering::Greater))),
        GreaterThan => Ok(ternary(l.compare(&r).map(|o| o == Ordering::Greater))),
        GreaterEqual => Ok(ternary(l.compare(&r).map(|o| o != Ordering::Less))),
        In => membership(&l, &r),
        StartsWith | EndsWith | Contains => Ok(match (l.as_str(), r.as_str()) {
            (Some(a), Some(b)) => Value::Boolean(match op {
                StartsWith => a.starts_with(b),
                EndsWith => a.ends_with(b),
                _ => a.contains(b),
            }),
            _ => Value::Null,
        }),
        RegexMatch => match (l.as_str(), r.as_str()) {
            (Some(text), Some(pattern)) => Ok(Value::Boolean(compiled_regex(pattern)?.is_match(text))),
            _ => Ok(Value::Null),
        },
        Add => add(l, r),
        Subtract | Multiply | Divide | Modulo | Power => arithmetic(op, l, r),
        And | Or | Xor => Err(ExecutionError::RuntimeError(format!(
            "{} must be evaluated lazily",
            op.symbol()
        ))),
    }
}

fn ternary(value: Option<bool>) -> Value {
    value.map(Value::Boolean).unwrap_or(Value::Null)
}

fn membership(item: &Value, list: &Value) -> EvalResult {
    let items = match list {
        Value::Null => return Ok(Value::Null),
        Value::List(items) => items,
        other => return Err(expected_list(other)),
    };
    let mut unknown = false;
    for candidate in items {
        match item.equals(candidate) {
            Some(true) => return Ok(Value::Boolean(true)),
            Some(false) => {}
            None => unknown = true,
        }
    }
    Ok(if unknown {
        Value::Null
    } else {
        Value::Boolean(false)
    })
}

fn compiled_regex(pattern: &str) -> Result<Arc<Regex>, ExecutionError> {
    if let Some(regex) = REGEX_CACHE.read().get(pattern) {
        return Ok(regex.clone());
    }
    let regex = Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| ExecutionError::RuntimeError(format!("Invalid regular expression: {}", e)))?;
    let regex = Arc::new(regex);
    REGEX_CACHE
        .write()
        .insert(pattern.to_string(), regex.clone());
    Ok(regex)
}

fn add(l: Value, r: Value) -> EvalResult {
    match (l, r) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(a), Value::Integer(b)) => {
            a.checked_add(b).map(Value::Integer).ok_or_else(overflow)
        }
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (Value::List(mut a), item) => {
            a.push(item);
            Ok(Value::List(a))
        }
        (item, Value::List(b)) => {
            let mut out = Vec::with_capacity(b.len() + 1);
            out.push(item);
            out.extend(b);
            Ok(Value::List(out))
        }
        (a, b) if a.is_number() && b.is_number() => Ok(Value::Float(
            a.as_float().unwrap_or(0.0) + b.as_float().unwrap_or(0.0),
        )),
        (a @ Value::String(_), b) | (a, b @ Value::String(_))
            if matches!(
                (&a, &b),
                (
                    Value::String(_) | Value::Integer(_) | Value::Float(_) | Value::Boolean(_),
                    Value::String(_) | Value::Integer(_) | Value::Float(_) | Value::Boolean(_)
                )
            ) =>
        {
            Ok(Value::String(format!("{}{}", concat_text(&a), concat_text(&b))))
        }
        (a, b) => Err(ExecutionError::TypeError(format!(
            "Cannot add {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn arithmetic(op: BinaryOperator, l: Value, r: Value) -> EvalResult {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if !l.is_number() || !r.is_number() {
        return Err(ExecutionError::TypeError(format!(
            "Cannot apply {} to {} and {}",
            op.symbol(),
            l.type_name(),
            r.type_name()
        )));
    }
    if let (Value::Integer(a), Value::Integer(b)) = (&l, &r) {
        let (a, b) = (*a, *b);
        return match op {
            BinaryOperator::Subtract => a.checked_sub(b).map(Value::Integer).ok_or_else(overflow),
            BinaryOperator::Multiply => a.checked_mul(b).map(Value::Integer).ok_or_else(overflow),
            BinaryOperator::Divide | BinaryOperator::Modulo if b == 0 => {
                Err(ExecutionError::RuntimeError("/ by zero".to_string()))
            }
            BinaryOperator::Divide => a.checked_div(b).map(Value::Integer).ok_or_else(overflow),
            BinaryOperator::Modulo => a.checked_rem(b).map(Value::Integer).ok_or_else(overflow),
            _ => Ok(Value::Float((a as f64).powf(b as f64))),
        };
    }
    let (a, b) = (l.as_float().unwrap_or(0.0), r.as_float().unwrap_or(0.0));
    Ok(Value::Float(match op {
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => a / b,
        BinaryOperator::Modulo => a % b,
        _ => a.powf(b),
    }))
}

fn slice(target: &Value, from: Option<&Value>, to: Option<&Value>) -> EvalResult {
    let items = match target {
        Value::Null => return Ok(Value::Null),
        Value::List(items) => items,
        other => return Err(expected_list(other)),
    };
    if from.map(Value::is_null).unwrap_or(false) || to.map(Value::is_null).unwrap_or(false) {
        return Ok(Value::Null);
    }
    let len = items.len() as i64;
    let bound = |value: Option<&Value>, default: i64| -> Result<i64, ExecutionError> {
        match value {
            None => Ok(default),
            Some(Value::Integer(i)) => Ok(if *i < 0 { (len + i).max(0) } else { (*i).min(len) }),
            Some(other) => Err(ExecutionError::TypeError(format!(
                "List slice bounds must be integers, got {}",
                other.type_name()
            ))),
        }
    };
    let start = bound(from, 0)?;
    let end = bound(to, len)?;
    if start >= end {
        return Ok(Value::List(Vec::new()));
    }
    Ok(Value::List(items[start as usize..end as usize].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse_expression;
    use crate::exec::context::CancellationToken;
    use crate::functions::FunctionRegistry;
    use crate::storage::GraphState;
    use crate::storage::StorageManager;
    use crate::txn::TransactionManager;
    use std::sync::Arc as StdArc;

    fn eval_with(text: &str, row: &Record, params: &HashMap<String, Value>) -> EvalResult {
        let manager = TransactionManager::new(StdArc::new(StorageManager::in_memory()), None);
        let mut txn = manager.begin(None);
        let state = GraphState::new();
        let functions = FunctionRegistry::new();
        let cancel = CancellationToken::new();
        let ctx = ExecutionContext::new(&state, &mut txn, params, &functions, &cancel);
        let expression = parse_expression(text).unwrap();
        evaluate(&ctx, row, &expression)
    }

    fn eval(text: &str) -> Value {
        eval_with(text, &Record::new(), &HashMap::new()).unwrap()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Value::Integer(7));
        assert_eq!(eval("7 / 2"), Value::Integer(3));
        assert_eq!(eval("7.0 / 2"), Value::Float(3.5));
        assert_eq!(eval("2 ^ 3"), Value::Float(8.0));
        assert_eq!(eval("-(3 % 2)"), Value::Integer(-1));
        assert_eq!(eval("'a' + 1"), Value::from("a1"));
        assert_eq!(eval("[1] + 2"), Value::from(vec![1i64, 2]));
        assert_eq!(eval("null + 1"), Value::Null);
        assert!(eval_with("1 / 0", &Record::new(), &HashMap::new()).is_err());
        assert!(eval_with("9223372036854775807 + 1", &Record::new(), &HashMap::new()).is_err());
    }

    #[test]
    fn test_three_valued_logic() {
        assert_eq!(eval("null = null"), Value::Null);
        assert_eq!(eval("null OR true"), Value::Boolean(true));
        assert_eq!(eval("null AND false"), Value::Boolean(false));
        assert_eq!(eval("null AND true"), Value::Null);
        assert_eq!(eval("1 < 'a'"), Value::Null);
        assert_eq!(eval("2 IN [1, null]"), Value::Null);
        assert_eq!(eval("1 IN [1, null]"), Value::Boolean(true));
        assert_eq!(eval("1 = 1.0"), Value::Boolean(true));
        assert_eq!(eval("null IS NULL"), Value::Boolean(true));
    }

    #[test]
    fn test_case_never_matches_null() {
        assert_eq!(eval("CASE null WHEN null THEN 1 ELSE 2 END"), Value::Integer(2));
        assert_eq!(eval("CASE 2 WHEN 1 THEN 'a' WHEN 2 THEN 'b' END"), Value::from("b"));
        assert_eq!(eval("CASE WHEN 1 > 2 THEN 'a' END"), Value::Null);
    }

    #[test]
    fn test_lists_and_strings() {
        assert_eq!(eval("[1, 2, 3][-1]"), Value::Integer(3));
        assert_eq!(eval("[1, 2, 3][5]"), Value::Null);
        assert_eq!(eval("[1, 2, 3, 4][1..3]"), Value::from(vec![2i64, 3]));
        assert_eq!(eval("[x IN range(1, 5) WHERE x % 2 = 0 | x * 10]"), Value::from(vec![20i64, 40]));
        assert_eq!(eval("any(x IN [1, 2] WHERE x > 1)"), Value::Boolean(true));
        assert_eq!(eval("all(x IN [1, 2] WHERE x > 1)"), Value::Boolean(false));
        assert_eq!(eval("none(x IN [] WHERE x > 1)"), Value::Boolean(true));
        assert_eq!(eval("single(x IN [1, 2, 3] WHERE x = 2)"), Value::Boolean(true));
        assert_eq!(eval("'hello' STARTS WITH 'he'"), Value::Boolean(true));
        assert_eq!(eval("'hello' =~ 'h.*o'"), Value::Boolean(true));
        assert_eq!(eval("'hello' =~ 'ell'"), Value::Boolean(false));
        assert_eq!(eval("{a: 1}.a"), Value::Integer(1));
        assert_eq!(eval("toUpper('abc')"), Value::from("ABC"));
    }

    #[test]
    fn test_parameters_and_variables() {
        let mut params = HashMap::new();
        params.insert("limit".to_string(), Value::Integer(3));
        let mut row = Record::new();
        let mut node = Node::new("n1".to_string());
        node.set_property("name".to_string(), Value::from("Ann"));
        row.insert("n".to_string(), Value::Node(node));

        assert_eq!(eval_with("$limit + 1", &row, &params).unwrap(), Value::Integer(4));
        assert_eq!(eval_with("n.name", &row, &params).unwrap(), Value::from("Ann"));
        assert_eq!(eval_with("n.missing", &row, &params).unwrap(), Value::Null);
        assert!(matches!(
            eval_with("$nope", &row, &params),
            Err(ExecutionError::SemanticError(_))
        ));
        let projected = eval_with("n {.name, extra: 1}", &row, &params).unwrap();
        let map = projected.as_map().unwrap();
        assert_eq!(map.get("name"), Some(&Value::from("Ann")));
        assert_eq!(map.get("extra"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_aggregate_outside_projection_fails() {
        assert!(matches!(
            eval_with("count(1)", &Record::new(), &HashMap::new()),
            Err(ExecutionError::SemanticError(_))
        ));
    }
}
