// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Consolidated aggregate function implementations
//!
//! This module contains all aggregate/statistical functions:
//! - count: Counts non-null values, or rows for `count(*)`
//! - sum: Integer sum when every input is an integer, float otherwise
//! - avg: Arithmetic mean
//! - min / max: Extremes under the ORDER BY ordering
//! - collect: List of non-null values
//! - stDev: Sample standard deviation
//!
//! Aggregates are stateful accumulators fed one value per row. Nulls are
//! ignored by every aggregate. `DISTINCT` wraps an accumulator so each
//! distinct value is fed once.

use std::cmp::Ordering;
use std::collections::HashSet;

use super::function_trait::{FunctionError, FunctionResult};
use crate::storage::Value;

/// True if `name` is an aggregate function, ignoring case
pub fn is_aggregate(name: &str) -> bool {
    crate::ast::is_aggregate_function(name)
}

/// Stateful accumulator for one aggregate within one group
pub trait Aggregator: Send + std::fmt::Debug {
    /// Feed one row's argument value
    fn update(&mut self, value: &Value) -> FunctionResult<()>;

    /// Final result for the group
    fn finish(&self) -> Value;
}

/// Create an accumulator for `name`, or `None` if it is not an aggregate
pub fn new_aggregator(name: &str, distinct: bool) -> Option<Box<dyn Aggregator>> {
    let inner: Box<dyn Aggregator> = match name.to_ascii_lowercase().as_str() {
        "count" => Box::new(CountAggregator::default()),
        "sum" => Box::new(SumAggregator::default()),
        "avg" => Box::new(AvgAggregator::default()),
        "min" => Box::new(ExtremeAggregator::new(Ordering::Less)),
        "max" => Box::new(ExtremeAggregator::new(Ordering::Greater)),
        "collect" => Box::new(CollectAggregator::default()),
        "stdev" => Box::new(StDevAggregator::default()),
        _ => return None,
    };
    Some(if distinct {
        Box::new(DistinctAggregator {
            seen: HashSet::new(),
            inner,
        })
    } else {
        inner
    })
}

/// Accumulator for `count(*)`, which counts rows including nulls
pub fn count_star() -> Box<dyn Aggregator> {
    Box::new(CountStarAggregator::default())
}

// ==============================================================================
// COUNT
// ==============================================================================

#[derive(Debug, Default)]
struct CountAggregator {
    count: i64,
}

impl Aggregator for CountAggregator {
    fn update(&mut self, value: &Value) -> FunctionResult<()> {
        if !value.is_null() {
            self.count += 1;
        }
        Ok(())
    }

    fn finish(&self) -> Value {
        Value::Integer(self.count)
    }
}

#[derive(Debug, Default)]
struct CountStarAggregator {
    count: i64,
}

impl Aggregator for CountStarAggregator {
    fn update(&mut self, _value: &Value) -> FunctionResult<()> {
        self.count += 1;
        Ok(())
    }

    fn finish(&self) -> Value {
        Value::Integer(self.count)
    }
}

// ==============================================================================
// SUM / AVG
// ==============================================================================

fn numeric(function: &str, value: &Value) -> FunctionResult<()> {
    if value.is_number() {
        Ok(())
    } else {
        Err(FunctionError::argument_type(function, "a number", value))
    }
}

#[derive(Debug, Default)]
struct SumAggregator {
    integer: i64,
    float: f64,
    saw_float: bool,
}

impl Aggregator for SumAggregator {
    fn update(&mut self, value: &Value) -> FunctionResult<()> {
        if value.is_null() {
            return Ok(());
        }
        numeric("sum", value)?;
        match value {
            Value::Integer(i) if !self.saw_float => match self.integer.checked_add(*i) {
                Some(sum) => self.integer = sum,
                None => {
                    self.saw_float = true;
                    self.float = self.integer as f64 + *i as f64;
                }
            },
            other => {
                if !self.saw_float {
                    self.saw_float = true;
                    self.float = self.integer as f64;
                }
                self.float += other.as_float().unwrap_or(0.0);
            }
        }
        Ok(())
    }

    fn finish(&self) -> Value {
        if self.saw_float {
            Value::Float(self.float)
        } else {
            Value::Integer(self.integer)
        }
    }
}

#[derive(Debug, Default)]
struct AvgAggregator {
    sum: f64,
    count: u64,
}

impl Aggregator for AvgAggregator {
    fn update(&mut self, value: &Value) -> FunctionResult<()> {
        if value.is_null() {
            return Ok(());
        }
        numeric("avg", value)?;
        self.sum += value.as_float().unwrap_or(0.0);
        self.count += 1;
        Ok(())
    }

    fn finish(&self) -> Value {
        if self.count == 0 {
            Value::Null
        } else {
            Value::Float(self.sum / self.count as f64)
        }
    }
}

// ==============================================================================
// MIN / MAX
// ==============================================================================

#[derive(Debug)]
struct ExtremeAggregator {
    /// Ordering a new value must have against the current one to replace it
    wins_when: Ordering,
    current: Option<Value>,
}

impl ExtremeAggregator {
    fn new(wins_when: Ordering) -> Self {
        Self {
            wins_when,
            current: None,
        }
    }
}

impl Aggregator for ExtremeAggregator {
    fn update(&mut self, value: &Value) -> FunctionResult<()> {
        if value.is_null() {
            return Ok(());
        }
        let replace = match &self.current {
            None => true,
            Some(current) => value.order_cmp(current) == self.wins_when,
        };
        if replace {
            self.current = Some(value.clone());
        }
        Ok(())
    }

    fn finish(&self) -> Value {
        self.current.clone().unwrap_or(Value::Null)
    }
}

// ==============================================================================
// COLLECT
// ==============================================================================

#[derive(Debug, Default)]
struct CollectAggregator {
    items: Vec<Value>,
}

impl Aggregator for CollectAggregator {
    fn update(&mut self, value: &Value) -> FunctionResult<()> {
        if !value.is_null() {
            self.items.push(value.clone());
        }
        Ok(())
    }

    fn finish(&self) -> Value {
        Value::List(self.items.clone())
    }
}

// ==============================================================================
// STDEV
// ==============================================================================

/// Sample standard deviation using Welford's update
#[derive(Debug, Default)]
struct StDevAggregator {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Aggregator for StDevAggregator {
    fn update(&mut self, value: &Value) -> FunctionResult<()> {
        if value.is_null() {
            return Ok(());
        }
        numeric("stDev", value)?;
        let x = value.as_float().unwrap_or(0.0);
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
        Ok(())
    }

    fn finish(&self) -> Value {
        if self.count < 2 {
            Value::Float(0.0)
        } else {
            Value::Float((self.m2 / (self.count - 1) as f64).sqrt())
        }
    }
}

// ==============================================================================
// DISTINCT
// ==============================================================================

#[derive(Debug)]
struct DistinctAggregator {
    seen: HashSet<Value>,
    inner: Box<dyn Aggregator>,
}

impl Aggregator for DistinctAggregator {
    fn update(&mut self, value: &Value) -> FunctionResult<()> {
        if value.is_null() || !self.seen.insert(value.clone()) {
            return Ok(());
        }
        self.inner.update(value)
    }

    fn finish(&self) -> Value {
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(name: &str, distinct: bool, values: &[Value]) -> Value {
        let mut agg = new_aggregator(name, distinct).unwrap();
        for v in values {
            agg.update(v).unwrap();
        }
        agg.finish()
    }

    #[test]
    fn test_count_and_collect_skip_nulls() {
        let values = [Value::Integer(1), Value::Null, Value::Integer(1)];
        assert_eq!(run("count", false, &values), Value::Integer(2));
        assert_eq!(run("COUNT", true, &values), Value::Integer(1));
        assert_eq!(
            run("collect", false, &values),
            Value::List(vec![Value::Integer(1), Value::Integer(1)])
        );
        let mut star = count_star();
        for v in &values {
            star.update(v).unwrap();
        }
        assert_eq!(star.finish(), Value::Integer(3));
    }

    #[test]
    fn test_sum_and_avg() {
        assert_eq!(run("sum", false, &[]), Value::Integer(0));
        assert_eq!(
            run("sum", false, &[Value::Integer(2), Value::Integer(3)]),
            Value::Integer(5)
        );
        assert_eq!(
            run("sum", false, &[Value::Integer(2), Value::Float(0.5)]),
            Value::Float(2.5)
        );
        assert_eq!(run("avg", false, &[]), Value::Null);
        assert_eq!(
            run("avg", false, &[Value::Integer(1), Value::Integer(2)]),
            Value::Float(1.5)
        );
        let mut sum = new_aggregator("sum", false).unwrap();
        assert!(sum.update(&Value::from("x")).is_err());
    }

    #[test]
    fn test_min_max_stdev() {
        let values = [Value::Integer(3), Value::Float(1.5), Value::Null, Value::Integer(7)];
        assert_eq!(run("min", false, &values), Value::Float(1.5));
        assert_eq!(run("max", false, &values), Value::Integer(7));
        assert_eq!(run("max", false, &[]), Value::Null);
        assert_eq!(run("stdev", false, &[Value::Integer(4)]), Value::Float(0.0));
        let sd = run(
            "stDev",
            false,
            &[2, 4, 4, 4, 5, 5, 7, 9].map(Value::Integer),
        );
        assert!((sd.as_float().unwrap() - 2.138089935).abs() < 1e-6);
    }

    #[test]
    fn test_is_aggregate() {
        assert!(is_aggregate("Collect"));
        assert!(!is_aggregate("toUpper"));
        assert!(new_aggregator("toUpper", false).is_none());
    }
}
