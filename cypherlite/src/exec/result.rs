// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query execution results for graph databases

use crate::plan::PlanDescription;
use crate::storage::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Counts of the changes a statement made
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCounters {
    pub nodes_created: usize,
    pub nodes_deleted: usize,
    pub relationships_created: usize,
    pub relationships_deleted: usize,
    pub properties_set: usize,
    pub labels_added: usize,
    pub labels_removed: usize,
    pub indexes_added: usize,
    pub indexes_removed: usize,
    pub constraints_added: usize,
    pub constraints_removed: usize,
}

impl QueryCounters {
    /// Whether the statement changed anything
    pub fn contains_updates(&self) -> bool {
        self.total() > 0
    }

    /// Total number of changes, reported as `rows_affected`
    pub fn total(&self) -> usize {
        self.nodes_created
            + self.nodes_deleted
            + self.relationships_created
            + self.relationships_deleted
            + self.properties_set
            + self.labels_added
            + self.labels_removed
            + self.indexes_added
            + self.indexes_removed
            + self.constraints_added
            + self.constraints_removed
    }

    pub fn add(&mut self, other: &QueryCounters) {
        self.nodes_created += other.nodes_created;
        self.nodes_deleted += other.nodes_deleted;
        self.relationships_created += other.relationships_created;
        self.relationships_deleted += other.relationships_deleted;
        self.properties_set += other.properties_set;
        self.labels_added += other.labels_added;
        self.labels_removed += other.labels_removed;
        self.indexes_added += other.indexes_added;
        self.indexes_removed += other.indexes_removed;
        self.constraints_added += other.constraints_added;
        self.constraints_removed += other.constraints_removed;
    }
}

/// Query execution result for graph queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Column names in RETURN order (e.g., ["p.name", "age"])
    pub variables: Vec<String>,
    pub execution_time_ms: u64,
    pub rows_affected: usize,
    /// Operator tree for EXPLAIN and PROFILE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanDescription>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub counters: QueryCounters,
}

impl QueryResult {
    /// Create a new empty query result
    pub fn new() -> Self {
        Self::default()
    }

    /// Result with the given columns and no rows
    pub fn with_columns(variables: Vec<String>) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    /// Add a warning to the query result
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column across all rows
    pub fn column(&self, name: &str) -> Vec<&Value> {
        self.rows
            .iter()
            .filter_map(|row| row.get_value(name))
            .collect()
    }

    /// The only value of a single-row, single-column result
    pub fn single_value(&self) -> Option<&Value> {
        match (self.rows.as_slice(), self.variables.len()) {
            ([row], 1) => row.get_value_at_position(0),
            _ => None,
        }
    }

    /// Rows as JSON objects keyed by column, in column order
    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let mut object = serde_json::Map::new();
                for (name, value) in self.variables.iter().zip(&row.positional_values) {
                    object.insert(name.clone(), value.to_json());
                }
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }
}

/// Single result row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Row {
    /// Values keyed by column name
    pub values: HashMap<String, Value>,
    /// Values in column order
    pub positional_values: Vec<Value>,
}

impl Row {
    /// Create a new empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a row from positional values with column names
    pub fn from_positional(values: Vec<Value>, variables: &[String]) -> Self {
        let named_values = variables
            .iter()
            .cloned()
            .zip(values.iter().cloned())
            .collect();
        Self {
            values: named_values,
            positional_values: values,
        }
    }

    /// Add a value to the row (both named and positional)
    pub fn add_value(&mut self, name: String, value: Value) {
        self.values.insert(name, value.clone());
        self.positional_values.push(value);
    }

    /// Get a value by column name
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Get a value by position
    pub fn get_value_at_position(&self, position: usize) -> Option<&Value> {
        self.positional_values.get(position)
    }
}

/// Rows are equal when their values are equal position by position. Nulls
/// are equal to each other, which is what DISTINCT and UNION need.
impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.positional_values == other.positional_values
    }
}

impl Eq for Row {}

impl Hash for Row {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.positional_values.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_row_identity_is_positional() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let r1 = Row::from_positional(vec![Value::Integer(1), Value::Null], &columns);
        let r2 = Row::from_positional(vec![Value::Integer(1), Value::Null], &columns);
        let r3 = Row::from_positional(vec![Value::Integer(2), Value::Null], &columns);
        let set: HashSet<Row> = [r1.clone(), r2, r3].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(r1.get_value("a"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_counters_total() {
        let mut counters = QueryCounters {
            nodes_created: 2,
            properties_set: 3,
            ..Default::default()
        };
        counters.add(&QueryCounters {
            labels_added: 1,
            ..Default::default()
        });
        assert_eq!(counters.total(), 6);
        assert!(counters.contains_updates());
    }

    #[test]
    fn test_single_value_and_json() {
        let columns = vec!["n".to_string()];
        let mut result = QueryResult::with_columns(columns.clone());
        result.rows.push(Row::from_positional(vec![Value::from("x")], &columns));
        assert_eq!(result.single_value(), Some(&Value::from("x")));
        assert_eq!(result.to_json(), serde_json::json!([{"n": "x"}]));
    }
}
