// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Mathematical function implementations
//!
//! This module contains the standard numeric functions:
//! - abs: Absolute value, preserving integer type
//! - ceil / floor / round: Rounding, returning floats
//! - sign: Sign as an integer
//! - sqrt, exp, log, log10, sin, cos, tan: Float transcendental functions
//! - atan2: Two argument arctangent
//! - pi / e: Mathematical constants
//! - rand: Uniform random float in [0, 1)
//!
//! A null argument yields null.

use super::function_trait::{Function, FunctionContext, FunctionError, FunctionResult};
use crate::storage::Value;

fn numeric_or_null<'a>(
    context: &'a FunctionContext,
    function: &str,
) -> FunctionResult<Option<&'a Value>> {
    let value = context.get_argument(0)?;
    match value {
        Value::Null => Ok(None),
        Value::Integer(_) | Value::Float(_) => Ok(Some(value)),
        other => Err(FunctionError::argument_type(function, "a number", other)),
    }
}

// ==============================================================================
// ABS FUNCTION
// ==============================================================================

/// abs function - returns absolute value
#[derive(Debug)]
pub struct AbsFunction;

impl AbsFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for AbsFunction {
    fn name(&self) -> &str {
        "abs"
    }

    fn description(&self) -> &str {
        "Returns the absolute value of a number"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "Number"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        match numeric_or_null(context, self.name())? {
            None => Ok(Value::Null),
            Some(Value::Integer(i)) => i
                .checked_abs()
                .map(Value::Integer)
                .ok_or_else(|| FunctionError::ExecutionError {
                    message: "abs() integer overflow".to_string(),
                }),
            Some(value) => Ok(Value::Float(value.as_float().unwrap_or(0.0).abs())),
        }
    }
}

// ==============================================================================
// CEIL / FLOOR FUNCTIONS
// ==============================================================================

/// ceil and floor - round towards positive or negative infinity
#[derive(Debug)]
pub struct CeilFloorFunction {
    ceil: bool,
}

impl CeilFloorFunction {
    pub fn ceil() -> Self {
        Self { ceil: true }
    }

    pub fn floor() -> Self {
        Self { ceil: false }
    }
}

impl Function for CeilFloorFunction {
    fn name(&self) -> &str {
        if self.ceil {
            "ceil"
        } else {
            "floor"
        }
    }

    fn description(&self) -> &str {
        "Rounds a number up or down to the nearest integral float"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "Float"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        let Some(value) = numeric_or_null(context, self.name())? else {
            return Ok(Value::Null);
        };
        let x = value.as_float().unwrap_or(0.0);
        Ok(Value::Float(if self.ceil { x.ceil() } else { x.floor() }))
    }
}

// ==============================================================================
// ROUND FUNCTION
// ==============================================================================

/// round(x [, precision]) - half away from zero
#[derive(Debug)]
pub struct RoundFunction;

impl RoundFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for RoundFunction {
    fn name(&self) -> &str {
        "round"
    }

    fn description(&self) -> &str {
        "Rounds a number to the nearest integral value or to a given precision"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn max_arguments(&self) -> Option<usize> {
        Some(2)
    }

    fn return_type(&self) -> &str {
        "Float"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        let Some(value) = numeric_or_null(context, self.name())? else {
            return Ok(Value::Null);
        };
        let x = value.as_float().unwrap_or(0.0);
        let precision = match context.optional_argument(1) {
            Some(_) => context.integer_argument(self.name(), 1)?,
            None => 0,
        };
        if precision == 0 {
            return Ok(Value::Float(x.round()));
        }
        let factor = 10f64.powi(precision.clamp(-15, 15) as i32);
        Ok(Value::Float((x * factor).round() / factor))
    }
}

// ==============================================================================
// SIGN FUNCTION
// ==============================================================================

/// sign function - returns -1, 0 or 1
#[derive(Debug)]
pub struct SignFunction;

impl SignFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for SignFunction {
    fn name(&self) -> &str {
        "sign"
    }

    fn description(&self) -> &str {
        "Returns the signum of a number: -1, 0 or 1"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "Integer"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        Ok(match numeric_or_null(context, self.name())? {
            None => Value::Null,
            Some(Value::Integer(i)) => Value::Integer(i.signum()),
            Some(value) => {
                let x = value.as_float().unwrap_or(0.0);
                Value::Integer(if x > 0.0 {
                    1
                } else if x < 0.0 {
                    -1
                } else {
                    0
                })
            }
        })
    }
}

// ==============================================================================
// UNARY FLOAT FUNCTIONS
// ==============================================================================

/// Single argument float function such as sqrt, exp, log or the
/// trigonometric functions
#[derive(Debug)]
pub struct UnaryFloatFunction {
    name: &'static str,
    description: &'static str,
    apply: fn(f64) -> f64,
}

impl UnaryFloatFunction {
    pub fn new(name: &'static str, description: &'static str, apply: fn(f64) -> f64) -> Self {
        Self {
            name,
            description,
            apply,
        }
    }

    pub fn sqrt() -> Self {
        Self::new("sqrt", "Returns the square root of a number", f64::sqrt)
    }

    pub fn exp() -> Self {
        Self::new("exp", "Returns e raised to the power of a number", f64::exp)
    }

    pub fn log() -> Self {
        Self::new("log", "Returns the natural logarithm of a number", f64::ln)
    }

    pub fn log10() -> Self {
        Self::new("log10", "Returns the base 10 logarithm of a number", f64::log10)
    }

    pub fn sin() -> Self {
        Self::new("sin", "Returns the sine of an angle in radians", f64::sin)
    }

    pub fn cos() -> Self {
        Self::new("cos", "Returns the cosine of an angle in radians", f64::cos)
    }

    pub fn tan() -> Self {
        Self::new("tan", "Returns the tangent of an angle in radians", f64::tan)
    }
}

impl Function for UnaryFloatFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "Float"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        Ok(match numeric_or_null(context, self.name)? {
            None => Value::Null,
            Some(value) => Value::Float((self.apply)(value.as_float().unwrap_or(0.0))),
        })
    }
}

// ==============================================================================
// ATAN2 FUNCTION
// ==============================================================================

/// atan2(y, x)
#[derive(Debug)]
pub struct Atan2Function;

impl Atan2Function {
    pub fn new() -> Self {
        Self
    }
}

impl Function for Atan2Function {
    fn name(&self) -> &str {
        "atan2"
    }

    fn description(&self) -> &str {
        "Returns the arctangent of y/x in radians"
    }

    fn argument_count(&self) -> usize {
        2
    }

    fn return_type(&self) -> &str {
        "Float"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        if context.any_null() {
            return Ok(Value::Null);
        }
        let y = context.float_argument(self.name(), 0)?;
        let x = context.float_argument(self.name(), 1)?;
        Ok(Value::Float(y.atan2(x)))
    }
}

// ==============================================================================
// CONSTANTS
// ==============================================================================

/// Zero argument constant such as pi() and e()
#[derive(Debug)]
pub struct ConstantFunction {
    name: &'static str,
    value: f64,
}

impl ConstantFunction {
    pub fn pi() -> Self {
        Self {
            name: "pi",
            value: std::f64::consts::PI,
        }
    }

    pub fn e() -> Self {
        Self {
            name: "e",
            value: std::f64::consts::E,
        }
    }
}

impl Function for ConstantFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Returns a mathematical constant"
    }

    fn argument_count(&self) -> usize {
        0
    }

    fn return_type(&self) -> &str {
        "Float"
    }

    fn execute(&self, _context: &FunctionContext) -> FunctionResult<Value> {
        Ok(Value::Float(self.value))
    }
}

// ==============================================================================
// RAND FUNCTION
// ==============================================================================

/// rand() - uniform float in [0, 1)
#[derive(Debug)]
pub struct RandFunction;

impl RandFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for RandFunction {
    fn name(&self) -> &str {
        "rand"
    }

    fn description(&self) -> &str {
        "Returns a random float between 0 (inclusive) and 1 (exclusive)"
    }

    fn argument_count(&self) -> usize {
        0
    }

    fn return_type(&self) -> &str {
        "Float"
    }

    fn execute(&self, _context: &FunctionContext) -> FunctionResult<Value> {
        Ok(Value::Float(fastrand::f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(function: &dyn Function, args: Vec<Value>) -> Value {
        function.execute(&FunctionContext::new(args)).unwrap()
    }

    #[test]
    fn test_abs_preserves_integers() {
        assert_eq!(call(&AbsFunction::new(), vec![Value::Integer(-3)]), Value::Integer(3));
        assert_eq!(call(&AbsFunction::new(), vec![Value::Float(-2.5)]), Value::Float(2.5));
        assert_eq!(call(&AbsFunction::new(), vec![Value::Null]), Value::Null);
        assert!(AbsFunction::new()
            .execute(&FunctionContext::new(vec![Value::from("x")]))
            .is_err());
    }

    #[test]
    fn test_rounding() {
        assert_eq!(call(&CeilFloorFunction::ceil(), vec![Value::Float(1.2)]), Value::Float(2.0));
        assert_eq!(call(&CeilFloorFunction::floor(), vec![Value::Integer(3)]), Value::Float(3.0));
        assert_eq!(call(&RoundFunction::new(), vec![Value::Float(2.5)]), Value::Float(3.0));
        assert_eq!(
            call(&RoundFunction::new(), vec![Value::Float(3.14159), Value::Integer(2)]),
            Value::Float(3.14)
        );
    }

    #[test]
    fn test_sign_and_transcendental() {
        assert_eq!(call(&SignFunction::new(), vec![Value::Float(-0.5)]), Value::Integer(-1));
        assert_eq!(call(&SignFunction::new(), vec![Value::Integer(0)]), Value::Integer(0));
        assert_eq!(call(&UnaryFloatFunction::sqrt(), vec![Value::Integer(16)]), Value::Float(4.0));
        assert_eq!(call(&UnaryFloatFunction::log10(), vec![Value::Integer(100)]), Value::Float(2.0));
        let angle = call(&Atan2Function::new(), vec![Value::Float(1.0), Value::Float(1.0)]);
        assert!((angle.as_float().unwrap() - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
    }

    #[test]
    fn test_constants_and_rand() {
        assert_eq!(call(&ConstantFunction::pi(), vec![]), Value::Float(std::f64::consts::PI));
        for _ in 0..100 {
            let r = call(&RandFunction::new(), vec![]).as_float().unwrap();
            assert!((0.0..1.0).contains(&r));
        }
    }
}
