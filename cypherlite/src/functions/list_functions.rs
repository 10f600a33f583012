// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! List operations
//!
//! This module implements the list functions:
//! - size: length of a list or string
//! - reverse: reversed list or string
//! - head / last / tail: list access
//! - range: inclusive integer ranges with an optional step

use super::function_trait::{Function, FunctionContext, FunctionError, FunctionResult};
use crate::storage::Value;

/// size function: number of list elements or string characters
#[derive(Debug)]
pub struct SizeFunction;

impl SizeFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for SizeFunction {
    fn name(&self) -> &str {
        "size"
    }

    fn description(&self) -> &str {
        "Returns the number of elements in a list or characters in a string"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "Integer"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        match context.get_argument(0)? {
            Value::Null => Ok(Value::Null),
            Value::List(items) => Ok(Value::Integer(items.len() as i64)),
            Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
            other => Err(FunctionError::argument_type(
                self.name(),
                "a list or string",
                other,
            )),
        }
    }
}

/// reverse function: reverses a list or a string
#[derive(Debug)]
pub struct ReverseFunction;

impl ReverseFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for ReverseFunction {
    fn name(&self) -> &str {
        "reverse"
    }

    fn description(&self) -> &str {
        "Reverses the order of elements in a list or characters in a string"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "Any"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        match context.get_argument(0)? {
            Value::Null => Ok(Value::Null),
            Value::List(items) => Ok(Value::List(items.iter().rev().cloned().collect())),
            Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
            other => Err(FunctionError::argument_type(
                self.name(),
                "a list or string",
                other,
            )),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ListAccess {
    Head,
    Last,
    Tail,
}

/// head, last and tail
#[derive(Debug)]
pub struct ListAccessFunction {
    access: ListAccess,
}

impl ListAccessFunction {
    pub fn new(access: ListAccess) -> Self {
        Self { access }
    }
}

impl Function for ListAccessFunction {
    fn name(&self) -> &str {
        match self.access {
            ListAccess::Head => "head",
            ListAccess::Last => "last",
            ListAccess::Tail => "tail",
        }
    }

    fn description(&self) -> &str {
        "Returns the first element, the last element or all but the first element of a list"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "Any"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        let items = match context.get_argument(0)? {
            Value::Null => return Ok(Value::Null),
            Value::List(items) => items,
            other => return Err(FunctionError::argument_type(self.name(), "a list", other)),
        };
        Ok(match self.access {
            ListAccess::Head => items.first().cloned().unwrap_or(Value::Null),
            ListAccess::Last => items.last().cloned().unwrap_or(Value::Null),
            ListAccess::Tail => Value::List(items.iter().skip(1).cloned().collect()),
        })
    }
}

/// range(start, end [, step]) with an inclusive end
#[derive(Debug)]
pub struct RangeFunction;

impl RangeFunction {
    pub fn new() -> Self {
        Self
    }
}

/// Upper bound on generated elements
const MAX_RANGE_LEN: i64 = 10_000_000;

impl Function for RangeFunction {
    fn name(&self) -> &str {
        "range"
    }

    fn description(&self) -> &str {
        "Returns the integers from start to end inclusive, advancing by step"
    }

    fn argument_count(&self) -> usize {
        2
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(3)
    }

    fn return_type(&self) -> &str {
        "List<Integer>"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        let start = context.integer_argument(self.name(), 0)?;
        let end = context.integer_argument(self.name(), 1)?;
        let step = if context.argument_count() > 2 {
            context.integer_argument(self.name(), 2)?
        } else {
            1
        };
        if step == 0 {
            return Err(FunctionError::ExecutionError {
                message: "range() step must not be zero".to_string(),
            });
        }
        let span = end.saturating_sub(start);
        if span.signum() == -step.signum() && span != 0 {
            return Ok(Value::List(Vec::new()));
        }
        if span / step >= MAX_RANGE_LEN {
            return Err(FunctionError::ExecutionError {
                message: format!("range() would produce more than {} elements", MAX_RANGE_LEN),
            });
        }
        let mut items = Vec::new();
        let mut current = start;
        while (step > 0 && current <= end) || (step < 0 && current >= end) {
            items.push(Value::Integer(current));
            match current.checked_add(step) {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(Value::List(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Value {
        Value::List(values.iter().map(|i| Value::Integer(*i)).collect())
    }

    fn call(function: &dyn Function, args: Vec<Value>) -> FunctionResult<Value> {
        function.execute(&FunctionContext::new(args))
    }

    #[test]
    fn test_size_and_reverse() {
        assert_eq!(call(&SizeFunction::new(), vec![ints(&[1, 2, 3])]).unwrap(), Value::Integer(3));
        assert_eq!(call(&SizeFunction::new(), vec![Value::from("héllo")]).unwrap(), Value::Integer(5));
        assert_eq!(call(&ReverseFunction::new(), vec![ints(&[1, 2])]).unwrap(), ints(&[2, 1]));
        assert_eq!(
            call(&ReverseFunction::new(), vec![Value::from("abc")]).unwrap(),
            Value::from("cba")
        );
    }

    #[test]
    fn test_head_last_tail() {
        let list = ints(&[1, 2, 3]);
        assert_eq!(
            call(&ListAccessFunction::new(ListAccess::Head), vec![list.clone()]).unwrap(),
            Value::Integer(1)
        );
        assert_eq!(
            call(&ListAccessFunction::new(ListAccess::Last), vec![list.clone()]).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            call(&ListAccessFunction::new(ListAccess::Tail), vec![list]).unwrap(),
            ints(&[2, 3])
        );
        assert_eq!(
            call(&ListAccessFunction::new(ListAccess::Head), vec![ints(&[])]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_range() {
        assert_eq!(
            call(&RangeFunction::new(), vec![Value::Integer(0), Value::Integer(3)]).unwrap(),
            ints(&[0, 1, 2, 3])
        );
        assert_eq!(
            call(
                &RangeFunction::new(),
                vec![Value::Integer(10), Value::Integer(0), Value::Integer(-5)]
            )
            .unwrap(),
            ints(&[10, 5, 0])
        );
        assert_eq!(
            call(&RangeFunction::new(), vec![Value::Integer(5), Value::Integer(1)]).unwrap(),
            ints(&[])
        );
        assert!(call(
            &RangeFunction::new(),
            vec![Value::Integer(0), Value::Integer(1), Value::Integer(0)]
        )
        .is_err());
    }
}
