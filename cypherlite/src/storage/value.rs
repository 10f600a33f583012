// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Value type system for graph properties and query results
//!
//! Property values are restricted to scalars and lists of scalars. Query
//! evaluation additionally produces maps, graph entities and paths.

use crate::storage::types::{Edge, Node};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A path through the graph: `nodes.len() == edges.len() + 1`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathValue {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl PathValue {
    /// Create a zero-length path starting at `start`
    pub fn new(start: Node) -> Self {
        Self {
            nodes: vec![start],
            edges: Vec::new(),
        }
    }

    /// Append one hop to the path
    pub fn push(&mut self, edge: Edge, node: Node) {
        self.edges.push(edge);
        self.nodes.push(node);
    }

    /// Number of relationships in the path
    pub fn length(&self) -> usize {
        self.edges.len()
    }

    pub fn start(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn end(&self) -> Option<&Node> {
        self.nodes.last()
    }
}

/// Value types supported by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Node(Node),
    Edge(Edge),
    Path(PathValue),
}

impl Value {
    /// Numeric view of the value, integers widen to f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view of the value, floats with no fractional part narrow
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_edge(&self) -> Option<&Edge> {
        match self {
            Value::Edge(edge) => Some(edge),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&PathValue> {
        match self {
            Value::Path(path) => Some(path),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Interpret a list of numbers as a dense float vector
    pub fn to_vector(&self) -> Option<Vec<f32>> {
        let list = self.as_list()?;
        list.iter()
            .map(|v| v.as_float().map(|f| f as f32))
            .collect()
    }

    /// Whether the value may be stored as a node or relationship property
    pub fn is_storable(&self) -> bool {
        match self {
            Value::Null
            | Value::Boolean(_)
            | Value::Integer(_)
            | Value::Float(_)
            | Value::String(_) => true,
            Value::List(items) => items.iter().all(|item| {
                matches!(
                    item,
                    Value::Boolean(_) | Value::Integer(_) | Value::Float(_) | Value::String(_)
                )
            }),
            _ => false,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::List(_) => "LIST",
            Value::Map(_) => "MAP",
            Value::Node(_) => "NODE",
            Value::Edge(_) => "RELATIONSHIP",
            Value::Path(_) => "PATH",
        }
    }

    /// Ternary equality: `None` when either side is null
    pub fn equals(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(a), Value::Integer(b)) => Some(a == b),
            (a, b) if a.is_number() && b.is_number() => {
                Some(a.as_float() == b.as_float())
            }
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Some(false);
                }
                let mut saw_null = false;
                for (x, y) in a.iter().zip(b) {
                    match x.equals(y) {
                        Some(false) => return Some(false),
                        None => saw_null = true,
                        Some(true) => {}
                    }
                }
                if saw_null {
                    None
                } else {
                    Some(true)
                }
            }
            (Value::Map(a), Value::Map(b)) => {
                if a.len() != b.len() || a.keys().ne(b.keys()) {
                    return Some(false);
                }
                let mut saw_null = false;
                for (x, y) in a.values().zip(b.values()) {
                    match x.equals(y) {
                        Some(false) => return Some(false),
                        None => saw_null = true,
                        Some(true) => {}
                    }
                }
                if saw_null {
                    None
                } else {
                    Some(true)
                }
            }
            (a, b) => Some(a == b),
        }
    }

    /// Ordering comparison for `<`, `>` and friends: `None` when the
    /// operands are null or not mutually comparable
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (a, b) if a.is_number() && b.is_number() => {
                a.as_float()?.partial_cmp(&b.as_float()?)
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        other => return Some(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    fn order_rank(&self) -> u8 {
        match self {
            Value::Map(_) => 0,
            Value::Node(_) => 1,
            Value::Edge(_) => 2,
            Value::List(_) => 3,
            Value::Path(_) => 4,
            Value::String(_) => 5,
            Value::Boolean(_) => 6,
            Value::Integer(_) | Value::Float(_) => 7,
            Value::Null => 8,
        }
    }

    /// Total ordering used by ORDER BY. Values of different kinds sort by
    /// kind, nulls sort last in ascending order.
    pub fn order_cmp(&self, other: &Value) -> Ordering {
        let (ra, rb) = (self.order_rank(), other.order_rank());
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (a, b) if a.is_number() && b.is_number() => a
                .as_float()
                .zip(b.as_float())
                .map(|(x, y)| x.total_cmp(&y))
                .unwrap_or(Ordering::Equal),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.order_cmp(y) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Map(a), Value::Map(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b) {
                    match ka.cmp(kb).then_with(|| va.order_cmp(vb)) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Node(a), Value::Node(b)) => a.id.cmp(&b.id),
            (Value::Edge(a), Value::Edge(b)) => a.id.cmp(&b.id),
            (Value::Path(a), Value::Path(b)) => a.length().cmp(&b.length()),
            _ => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }

    /// Convert into a JSON value for export
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Node(node) => {
                let mut object = serde_json::Map::new();
                object.insert("id".to_string(), Json::String(node.id.clone()));
                object.insert(
                    "labels".to_string(),
                    Json::Array(node.labels.iter().cloned().map(Json::String).collect()),
                );
                object.insert("properties".to_string(), properties_to_json(&node.properties));
                Json::Object(object)
            }
            Value::Edge(edge) => {
                let mut object = serde_json::Map::new();
                object.insert("id".to_string(), Json::String(edge.id.clone()));
                object.insert("type".to_string(), Json::String(edge.rel_type.clone()));
                object.insert("source".to_string(), Json::String(edge.from_node.clone()));
                object.insert("target".to_string(), Json::String(edge.to_node.clone()));
                object.insert("properties".to_string(), properties_to_json(&edge.properties));
                Json::Object(object)
            }
            Value::Path(path) => Json::Array(
                path.nodes
                    .iter()
                    .map(|n| Value::Node(n.clone()).to_json())
                    .collect(),
            ),
        }
    }

    /// Convert from a JSON value. Integral numbers become integers.
    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Boolean(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Serialize a property map with keys in sorted order
pub fn properties_to_json(
    properties: &std::collections::HashMap<String, Value>,
) -> serde_json::Value {
    let sorted: BTreeMap<&String, &Value> = properties.iter().collect();
    serde_json::Value::Object(
        sorted
            .into_iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a.id == b.id,
            (Value::Edge(a), Value::Edge(b)) => a.id == b.id,
            (Value::Path(a), Value::Path(b)) => {
                a.nodes.len() == b.nodes.len()
                    && a.nodes.iter().zip(&b.nodes).all(|(x, y)| x.id == y.id)
                    && a.edges.iter().zip(&b.edges).all(|(x, y)| x.id == y.id)
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::List(list) => {
                write!(f, "[")?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Node(node) => {
                write!(f, "(")?;
                for label in &node.labels {
                    write!(f, ":{}", label)?;
                }
                write!(f, " {{id: {}}})", node.id)
            }
            Value::Edge(edge) => write!(
                f,
                "[:{} {{id: {}}}]",
                edge.rel_type, edge.id
            ),
            Value::Path(path) => {
                for (i, node) in path.nodes.iter().enumerate() {
                    if i > 0 {
                        if let Some(edge) = path.edges.get(i - 1) {
                            write!(f, "-[:{}]-", edge.rel_type)?;
                        }
                    }
                    write!(f, "({})", node.id)?;
                }
                Ok(())
            }
        }
    }
}

/// Convert from Rust primitive types to Value
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(vec: Vec<T>) -> Self {
        Value::List(vec.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Node(node)
    }
}

impl From<Edge> for Value {
    fn from(edge: Edge) -> Self {
        Value::Edge(edge)
    }
}

impl From<PathValue> for Value {
    fn from(path: PathValue) -> Self {
        Value::Path(path)
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0.hash(state),
            Value::Boolean(b) => {
                1.hash(state);
                b.hash(state);
            }
            Value::Integer(i) => {
                2.hash(state);
                i.hash(state);
            }
            Value::Float(n) => {
                3.hash(state);
                // Handle NaN and signed zero consistently with PartialEq
                if n.is_nan() {
                    "NaN".hash(state);
                } else if *n == 0.0 {
                    0u64.hash(state);
                } else {
                    n.to_bits().hash(state);
                }
            }
            Value::String(s) => {
                4.hash(state);
                s.hash(state);
            }
            Value::List(list) => {
                5.hash(state);
                list.len().hash(state);
                for item in list {
                    item.hash(state);
                }
            }
            Value::Map(map) => {
                6.hash(state);
                for (key, value) in map {
                    key.hash(state);
                    value.hash(state);
                }
            }
            Value::Node(node) => {
                7.hash(state);
                node.id.hash(state);
            }
            Value::Edge(edge) => {
                8.hash(state);
                edge.id.hash(state);
            }
            Value::Path(path) => {
                9.hash(state);
                for node in &path.nodes {
                    node.id.hash(state);
                }
                for edge in &path.edges {
                    edge.id.hash(state);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_aware_equality() {
        assert_eq!(Value::Integer(1).equals(&Value::Float(1.0)), Some(true));
        assert_eq!(Value::Null.equals(&Value::Null), None);
        assert_eq!(Value::from("a").equals(&Value::Integer(1)), Some(false));
        assert_eq!(
            Value::List(vec![Value::Integer(1), Value::Null])
                .equals(&Value::List(vec![Value::Integer(2), Value::Null])),
            Some(false)
        );
    }

    #[test]
    fn test_order_cmp_sorts_nulls_last() {
        let mut values = vec![
            Value::Null,
            Value::Integer(3),
            Value::Float(1.5),
            Value::Integer(2),
        ];
        values.sort_by(|a, b| a.order_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::Float(1.5),
                Value::Integer(2),
                Value::Integer(3),
                Value::Null
            ]
        );
    }

    #[test]
    fn test_compare_incomparable_types() {
        assert_eq!(Value::from("a").compare(&Value::Integer(1)), None);
        assert_eq!(
            Value::Integer(1).compare(&Value::Float(2.0)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_json_integers_stay_integers() {
        let json: serde_json::Value = serde_json::json!({"a": 1, "b": 1.5, "c": [true, "x"]});
        let value = Value::from_json(&json);
        let map = value.as_map().unwrap();
        assert_eq!(map.get("a"), Some(&Value::Integer(1)));
        assert_eq!(map.get("b"), Some(&Value::Float(1.5)));
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_storable_values() {
        assert!(Value::from(vec![1i64, 2, 3]).is_storable());
        assert!(!Value::Map(BTreeMap::new()).is_storable());
        assert!(!Value::List(vec![Value::List(vec![])]).is_storable());
    }

    #[test]
    fn test_to_vector() {
        let v = Value::List(vec![Value::Integer(1), Value::Float(0.5)]);
        assert_eq!(v.to_vector(), Some(vec![1.0, 0.5]));
        assert_eq!(Value::from("x").to_vector(), None);
    }
}
