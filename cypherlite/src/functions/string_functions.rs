// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Consolidated string function implementations
//!
//! This module contains all string manipulation functions:
//! - toUpper / toLower: case conversion
//! - trim / ltrim / rtrim: whitespace removal
//! - substring / left / right: extraction by character position
//! - replace / split: search based rewriting
//! - toString: scalar to string conversion
//!
//! A null argument yields null.

use super::function_trait::{Function, FunctionContext, FunctionError, FunctionResult};
use crate::storage::Value;

fn string_or_null<'a>(
    context: &'a FunctionContext,
    function: &str,
) -> FunctionResult<Option<&'a str>> {
    let value = context.get_argument(0)?;
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_str()
        .map(Some)
        .ok_or_else(|| FunctionError::argument_type(function, "a string", value))
}

// ==============================================================================
// TOUPPER FUNCTION
// ==============================================================================

/// toUpper function - converts string values to uppercase
#[derive(Debug)]
pub struct ToUpperFunction;

impl ToUpperFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for ToUpperFunction {
    fn name(&self) -> &str {
        "toUpper"
    }

    fn description(&self) -> &str {
        "Converts string values to uppercase"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        Ok(string_or_null(context, self.name())?
            .map(|s| Value::String(s.to_uppercase()))
            .unwrap_or(Value::Null))
    }

    fn return_type(&self) -> &str {
        "String"
    }
}

// ==============================================================================
// TOLOWER FUNCTION
// ==============================================================================

/// toLower function - converts string values to lowercase
#[derive(Debug)]
pub struct ToLowerFunction;

impl ToLowerFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for ToLowerFunction {
    fn name(&self) -> &str {
        "toLower"
    }

    fn description(&self) -> &str {
        "Converts string values to lowercase"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        Ok(string_or_null(context, self.name())?
            .map(|s| Value::String(s.to_lowercase()))
            .unwrap_or(Value::Null))
    }

    fn return_type(&self) -> &str {
        "String"
    }
}

// ==============================================================================
// TRIM FUNCTIONS
// ==============================================================================

#[derive(Debug, Clone, Copy)]
pub enum TrimMode {
    Both,
    Leading,
    Trailing,
}

/// trim, ltrim and rtrim - remove surrounding whitespace
#[derive(Debug)]
pub struct TrimFunction {
    mode: TrimMode,
}

impl TrimFunction {
    pub fn new(mode: TrimMode) -> Self {
        Self { mode }
    }
}

impl Function for TrimFunction {
    fn name(&self) -> &str {
        match self.mode {
            TrimMode::Both => "trim",
            TrimMode::Leading => "ltrim",
            TrimMode::Trailing => "rtrim",
        }
    }

    fn description(&self) -> &str {
        "Removes whitespace from the start, end or both ends of a string"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        let Some(s) = string_or_null(context, self.name())? else {
            return Ok(Value::Null);
        };
        let trimmed = match self.mode {
            TrimMode::Both => s.trim(),
            TrimMode::Leading => s.trim_start(),
            TrimMode::Trailing => s.trim_end(),
        };
        Ok(Value::String(trimmed.to_string()))
    }

    fn return_type(&self) -> &str {
        "String"
    }
}

// ==============================================================================
// SUBSTRING FUNCTION
// ==============================================================================

/// substring(original, start [, length]) with a 0-based start
#[derive(Debug)]
pub struct SubstringFunction;

impl SubstringFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for SubstringFunction {
    fn name(&self) -> &str {
        "substring"
    }

    fn description(&self) -> &str {
        "Extracts a substring starting at a 0-based character offset"
    }

    fn argument_count(&self) -> usize {
        2
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(3)
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        let Some(s) = string_or_null(context, self.name())? else {
            return Ok(Value::Null);
        };
        let start = context.integer_argument(self.name(), 1)?;
        if start < 0 {
            return Err(FunctionError::ExecutionError {
                message: format!("substring() start must not be negative, got {}", start),
            });
        }
        let length = match context.optional_argument(2) {
            Some(_) => {
                let length = context.integer_argument(self.name(), 2)?;
                if length < 0 {
                    return Err(FunctionError::ExecutionError {
                        message: format!("substring() length must not be negative, got {}", length),
                    });
                }
                length as usize
            }
            None => usize::MAX,
        };
        Ok(Value::String(
            s.chars().skip(start as usize).take(length).collect(),
        ))
    }

    fn return_type(&self) -> &str {
        "String"
    }
}

// ==============================================================================
// LEFT / RIGHT FUNCTIONS
// ==============================================================================

/// left(s, n) and right(s, n)
#[derive(Debug)]
pub struct SideFunction {
    from_left: bool,
}

impl SideFunction {
    pub fn left() -> Self {
        Self { from_left: true }
    }

    pub fn right() -> Self {
        Self { from_left: false }
    }
}

impl Function for SideFunction {
    fn name(&self) -> &str {
        if self.from_left {
            "left"
        } else {
            "right"
        }
    }

    fn description(&self) -> &str {
        "Returns the leftmost or rightmost characters of a string"
    }

    fn argument_count(&self) -> usize {
        2
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        let Some(s) = string_or_null(context, self.name())? else {
            return Ok(Value::Null);
        };
        let n = context.integer_argument(self.name(), 1)?;
        if n < 0 {
            return Err(FunctionError::ExecutionError {
                message: format!("{}() length must not be negative, got {}", self.name(), n),
            });
        }
        let n = n as usize;
        let result: String = if self.from_left {
            s.chars().take(n).collect()
        } else {
            let total = s.chars().count();
            s.chars().skip(total.saturating_sub(n)).collect()
        };
        Ok(Value::String(result))
    }

    fn return_type(&self) -> &str {
        "String"
    }
}

// ==============================================================================
// REPLACE FUNCTION
// ==============================================================================

/// replace(original, search, replacement)
#[derive(Debug)]
pub struct ReplaceFunction;

impl ReplaceFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for ReplaceFunction {
    fn name(&self) -> &str {
        "replace"
    }

    fn description(&self) -> &str {
        "Replaces every occurrence of a search string"
    }

    fn argument_count(&self) -> usize {
        3
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        if context.any_null() {
            return Ok(Value::Null);
        }
        let original = context.string_argument(self.name(), 0)?;
        let search = context.string_argument(self.name(), 1)?;
        let replacement = context.string_argument(self.name(), 2)?;
        if search.is_empty() {
            return Ok(Value::String(original.to_string()));
        }
        Ok(Value::String(original.replace(search, replacement)))
    }

    fn return_type(&self) -> &str {
        "String"
    }
}

// ==============================================================================
// SPLIT FUNCTION
// ==============================================================================

/// split(original, delimiter) returns a list of strings
#[derive(Debug)]
pub struct SplitFunction;

impl SplitFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for SplitFunction {
    fn name(&self) -> &str {
        "split"
    }

    fn description(&self) -> &str {
        "Splits a string on every occurrence of a delimiter"
    }

    fn argument_count(&self) -> usize {
        2
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        if context.any_null() {
            return Ok(Value::Null);
        }
        let original = context.string_argument(self.name(), 0)?;
        let delimiter = context.string_argument(self.name(), 1)?;
        let parts: Vec<Value> = if delimiter.is_empty() {
            original
                .chars()
                .map(|c| Value::String(c.to_string()))
                .collect()
        } else {
            original
                .split(delimiter)
                .map(|part| Value::String(part.to_string()))
                .collect()
        };
        Ok(Value::List(parts))
    }

    fn return_type(&self) -> &str {
        "List<String>"
    }
}

// ==============================================================================
// TOSTRING FUNCTION
// ==============================================================================

/// toString(value) for scalars
#[derive(Debug)]
pub struct ToStringFunction;

impl ToStringFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for ToStringFunction {
    fn name(&self) -> &str {
        "toString"
    }

    fn description(&self) -> &str {
        "Converts an integer, float, boolean or string to a string"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        let value = context.get_argument(0)?;
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Integer(_) | Value::Float(_) | Value::Boolean(_) => {
                Ok(Value::String(value.to_string()))
            }
            other => Err(FunctionError::argument_type(
                self.name(),
                "a scalar value",
                other,
            )),
        }
    }

    fn return_type(&self) -> &str {
        "String"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(function: &dyn Function, args: Vec<Value>) -> Value {
        function.execute(&FunctionContext::new(args)).unwrap()
    }

    #[test]
    fn test_case_and_trim() {
        assert_eq!(
            call(&ToUpperFunction::new(), vec![Value::from("abc")]),
            Value::from("ABC")
        );
        assert_eq!(call(&ToLowerFunction::new(), vec![Value::Null]), Value::Null);
        assert_eq!(
            call(&TrimFunction::new(TrimMode::Leading), vec![Value::from("  x ")]),
            Value::from("x ")
        );
        assert!(ToUpperFunction::new()
            .execute(&FunctionContext::new(vec![Value::Integer(1)]))
            .is_err());
    }

    #[test]
    fn test_substring_left_right() {
        let s = Value::from("hello");
        assert_eq!(
            call(&SubstringFunction::new(), vec![s.clone(), Value::Integer(1), Value::Integer(3)]),
            Value::from("ell")
        );
        assert_eq!(
            call(&SubstringFunction::new(), vec![s.clone(), Value::Integer(10)]),
            Value::from("")
        );
        assert_eq!(
            call(&SideFunction::left(), vec![s.clone(), Value::Integer(2)]),
            Value::from("he")
        );
        assert_eq!(
            call(&SideFunction::right(), vec![s, Value::Integer(10)]),
            Value::from("hello")
        );
    }

    #[test]
    fn test_replace_split_to_string() {
        assert_eq!(
            call(
                &ReplaceFunction::new(),
                vec![Value::from("a-b-c"), Value::from("-"), Value::from("+")]
            ),
            Value::from("a+b+c")
        );
        assert_eq!(
            call(&SplitFunction::new(), vec![Value::from("a,b"), Value::from(",")]),
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(
            call(&ToStringFunction::new(), vec![Value::Float(1.0)]),
            Value::from("1.0")
        );
        assert_eq!(
            call(&ToStringFunction::new(), vec![Value::Boolean(true)]),
            Value::from("true")
        );
    }
}
