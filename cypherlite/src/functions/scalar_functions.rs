// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Null handling, type conversion and clock functions
//!
//! - coalesce: Returns the first non-null argument
//! - toInteger / toFloat / toBoolean: Lenient conversions, null when the
//!   input cannot be converted
//! - timestamp: Milliseconds since the Unix epoch

use super::function_trait::{Function, FunctionContext, FunctionError, FunctionResult};
use crate::storage::Value;

// ==============================================================================
// COALESCE FUNCTION
// ==============================================================================

/// coalesce function - returns the first non-null expression from a list
#[derive(Debug)]
pub struct CoalesceFunction;

impl CoalesceFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for CoalesceFunction {
    fn name(&self) -> &str {
        "coalesce"
    }

    fn description(&self) -> &str {
        "Returns the first non-null value in the argument list"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn is_variadic(&self) -> bool {
        true
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        Ok(context
            .arguments
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn return_type(&self) -> &str {
        "Any"
    }
}

// ==============================================================================
// TOINTEGER FUNCTION
// ==============================================================================

/// toInteger function - truncates floats and parses strings
#[derive(Debug)]
pub struct ToIntegerFunction;

impl ToIntegerFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for ToIntegerFunction {
    fn name(&self) -> &str {
        "toInteger"
    }

    fn description(&self) -> &str {
        "Converts a number, boolean or string to an integer"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        Ok(match context.get_argument(0)? {
            Value::Null => Value::Null,
            Value::Integer(i) => Value::Integer(*i),
            Value::Float(f) if f.is_finite() => Value::Integer(f.trunc() as i64),
            Value::Float(_) => Value::Null,
            Value::Boolean(b) => Value::Integer(i64::from(*b)),
            Value::String(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(i) => Value::Integer(i),
                    Err(_) => s
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| Value::Integer(f.trunc() as i64))
                        .unwrap_or(Value::Null),
                }
            }
            other => {
                return Err(FunctionError::argument_type(
                    self.name(),
                    "a number, boolean or string",
                    other,
                ))
            }
        })
    }

    fn return_type(&self) -> &str {
        "Integer"
    }
}

// ==============================================================================
// TOFLOAT FUNCTION
// ==============================================================================

/// toFloat function - widens integers and parses strings
#[derive(Debug)]
pub struct ToFloatFunction;

impl ToFloatFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for ToFloatFunction {
    fn name(&self) -> &str {
        "toFloat"
    }

    fn description(&self) -> &str {
        "Converts a number or string to a float"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        Ok(match context.get_argument(0)? {
            Value::Null => Value::Null,
            Value::Integer(i) => Value::Float(*i as f64),
            Value::Float(f) => Value::Float(*f),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or(Value::Null),
            other => {
                return Err(FunctionError::argument_type(
                    self.name(),
                    "a number or string",
                    other,
                ))
            }
        })
    }

    fn return_type(&self) -> &str {
        "Float"
    }
}

// ==============================================================================
// TOBOOLEAN FUNCTION
// ==============================================================================

/// toBoolean function - accepts "true"/"false" in any case and integers
#[derive(Debug)]
pub struct ToBooleanFunction;

impl ToBooleanFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for ToBooleanFunction {
    fn name(&self) -> &str {
        "toBoolean"
    }

    fn description(&self) -> &str {
        "Converts a string, integer or boolean to a boolean"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        Ok(match context.get_argument(0)? {
            Value::Null => Value::Null,
            Value::Boolean(b) => Value::Boolean(*b),
            Value::Integer(i) => Value::Boolean(*i != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                _ => Value::Null,
            },
            other => {
                return Err(FunctionError::argument_type(
                    self.name(),
                    "a string, integer or boolean",
                    other,
                ))
            }
        })
    }

    fn return_type(&self) -> &str {
        "Boolean"
    }
}

// ==============================================================================
// TIMESTAMP FUNCTION
// ==============================================================================

/// timestamp() - current time in epoch milliseconds
#[derive(Debug)]
pub struct TimestampFunction;

impl TimestampFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for TimestampFunction {
    fn name(&self) -> &str {
        "timestamp"
    }

    fn description(&self) -> &str {
        "Returns the number of milliseconds since 1970-01-01T00:00:00Z"
    }

    fn argument_count(&self) -> usize {
        0
    }

    fn execute(&self, _context: &FunctionContext) -> FunctionResult<Value> {
        Ok(Value::Integer(chrono::Utc::now().timestamp_millis()))
    }

    fn return_type(&self) -> &str {
        "Integer"
    }
}
