// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Generic function trait for query execution
//!
//! This module defines the core Function trait that all scalar functions
//! implement. Aggregates are stateful and live in `aggregate_functions`.

use crate::storage::Value;
use crate::txn::GraphView;

/// Error type for function execution
#[derive(Debug, thiserror::Error)]
pub enum FunctionError {
    #[error("Invalid argument count: expected {expected}, got {actual}")]
    InvalidArgumentCount { expected: String, actual: usize },

    #[error("Invalid argument type: {message}")]
    InvalidArgumentType { message: String },

    #[error("Function execution failed: {message}")]
    ExecutionError { message: String },

    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },
}

impl FunctionError {
    pub fn argument_type(function: &str, expected: &str, found: &Value) -> Self {
        FunctionError::InvalidArgumentType {
            message: format!(
                "{}() expected {} but got {}",
                function,
                expected,
                found.type_name()
            ),
        }
    }
}

/// Result type for function execution
pub type FunctionResult<T> = Result<T, FunctionError>;

/// Function execution context
pub struct FunctionContext<'a> {
    /// Evaluated arguments
    pub arguments: Vec<Value>,
    /// Read view of the graph for functions that resolve entities
    pub graph: Option<GraphView<'a>>,
}

impl<'a> FunctionContext<'a> {
    pub fn new(arguments: Vec<Value>) -> Self {
        Self {
            arguments,
            graph: None,
        }
    }

    pub fn with_graph(arguments: Vec<Value>, graph: GraphView<'a>) -> Self {
        Self {
            arguments,
            graph: Some(graph),
        }
    }

    /// Get a specific argument by index
    pub fn get_argument(&self, index: usize) -> FunctionResult<&Value> {
        self.arguments
            .get(index)
            .ok_or_else(|| FunctionError::InvalidArgumentCount {
                expected: format!("at least {}", index + 1),
                actual: self.arguments.len(),
            })
    }

    /// Optional trailing argument; null counts as absent
    pub fn optional_argument(&self, index: usize) -> Option<&Value> {
        self.arguments.get(index).filter(|v| !v.is_null())
    }

    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    /// True if any argument is null
    pub fn any_null(&self) -> bool {
        self.arguments.iter().any(Value::is_null)
    }

    /// Numeric argument, integers widen
    pub fn float_argument(&self, function: &str, index: usize) -> FunctionResult<f64> {
        let value = self.get_argument(index)?;
        value
            .as_float()
            .ok_or_else(|| FunctionError::argument_type(function, "a number", value))
    }

    pub fn integer_argument(&self, function: &str, index: usize) -> FunctionResult<i64> {
        let value = self.get_argument(index)?;
        value
            .as_integer()
            .ok_or_else(|| FunctionError::argument_type(function, "an integer", value))
    }

    pub fn string_argument(&self, function: &str, index: usize) -> FunctionResult<&str> {
        let value = self.get_argument(index)?;
        value
            .as_str()
            .ok_or_else(|| FunctionError::argument_type(function, "a string", value))
    }
}

/// Core trait for all scalar functions
pub trait Function: Send + Sync + std::fmt::Debug {
    /// Get the name of the function
    fn name(&self) -> &str;

    /// Get the function description
    fn description(&self) -> &str;

    /// Minimum number of arguments
    fn argument_count(&self) -> usize;

    /// Maximum number of arguments; `None` when variadic
    fn max_arguments(&self) -> Option<usize> {
        if self.is_variadic() {
            None
        } else {
            Some(self.argument_count())
        }
    }

    /// Execute the function with the given context
    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value>;

    /// Get the return type of the function
    fn return_type(&self) -> &str;

    /// Whether this function needs a graph view to resolve entities
    fn graph_context_required(&self) -> bool {
        false
    }

    /// Check if this function accepts a variable number of arguments
    fn is_variadic(&self) -> bool {
        false
    }
}
