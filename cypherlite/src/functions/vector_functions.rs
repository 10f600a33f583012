// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Vector similarity and geographic distance functions
//!
//! Similarity functions accept lists of numbers. Vectors of different
//! lengths, or arguments that are not numeric lists, score 0.0 rather than
//! failing the query. Geographic functions work in metres on a spherical
//! earth.

use std::collections::BTreeMap;

use super::function_trait::{Function, FunctionContext, FunctionError, FunctionResult};
use crate::storage::indexes::vector::{cosine, euclidean};
use crate::storage::Value;

/// Mean earth radius used by the haversine formula
pub const EARTH_RADIUS_METRES: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VectorMeasure {
    CosineSimilarity,
    EuclideanSimilarity,
    EuclideanDistance,
}

// ==============================================================================
// VECTOR SIMILARITY FUNCTIONS
// ==============================================================================

/// cosine and euclidean similarity plus euclidean distance
#[derive(Debug)]
pub struct VectorFunction {
    name: &'static str,
    measure: VectorMeasure,
}

impl VectorFunction {
    pub fn new(name: &'static str, measure: VectorMeasure) -> Self {
        Self { name, measure }
    }
}

impl Function for VectorFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        match self.measure {
            VectorMeasure::CosineSimilarity => "Cosine similarity of two vectors",
            VectorMeasure::EuclideanSimilarity => "Euclidean similarity 1 / (1 + d) of two vectors",
            VectorMeasure::EuclideanDistance => "Euclidean distance between two vectors",
        }
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
        let a = context.get_argument(0)?.to_vector();
        let b = context.get_argument(1)?.to_vector();
        let (a, b) = match (a, b) {
            (Some(a), Some(b)) if a.len() == b.len() && !a.is_empty() => (a, b),
            _ => return Ok(Value::Float(0.0)),
        };
        let score = match self.measure {
            VectorMeasure::CosineSimilarity => cosine(&a, &b) as f64,
            VectorMeasure::EuclideanSimilarity => 1.0 / (1.0 + euclidean(&a, &b) as f64),
            VectorMeasure::EuclideanDistance => euclidean(&a, &b) as f64,
        };
        Ok(Value::Float(score))
    }
}

// ==============================================================================
// GEOGRAPHIC FUNCTIONS
// ==============================================================================

/// Great circle distance in metres between two coordinates in degrees
pub fn haversine_metres(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METRES * a.sqrt().atan2((1.0 - a).sqrt())
}

/// haversine(lat1, lon1, lat2, lon2)
#[derive(Debug)]
pub struct HaversineFunction;

impl HaversineFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for HaversineFunction {
    fn name(&self) -> &str {
        "haversine"
    }

    fn description(&self) -> &str {
        "Great circle distance in metres between two latitude/longitude pairs"
    }

    fn argument_count(&self) -> usize {
        4
    }

    fn return_type(&self) -> &str {
        "Float"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        if context.any_null() {
            return Ok(Value::Null);
        }
        let lat1 = context.float_argument(self.name(), 0)?;
        let lon1 = context.float_argument(self.name(), 1)?;
        let lat2 = context.float_argument(self.name(), 2)?;
        let lon2 = context.float_argument(self.name(), 3)?;
        Ok(Value::Float(haversine_metres(lat1, lon1, lat2, lon2)))
    }
}

fn coordinate(map: &BTreeMap<String, Value>, long: &str, short: &str) -> Option<f64> {
    map.get(long)
        .or_else(|| map.get(short))
        .and_then(Value::as_float)
}

/// Extract (latitude, longitude) from a point map
fn point_coordinates(function: &str, value: &Value) -> FunctionResult<(f64, f64)> {
    let map = value
        .as_map()
        .ok_or_else(|| FunctionError::argument_type(function, "a point map", value))?;
    let lat = coordinate(map, "latitude", "y");
    let lon = coordinate(map, "longitude", "x");
    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok((lat, lon)),
        _ => Err(FunctionError::InvalidArgumentType {
            message: format!("{}() requires points with latitude and longitude", function),
        }),
    }
}

/// point({latitude, longitude}) builds a normalized point map
#[derive(Debug)]
pub struct PointFunction;

impl PointFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for PointFunction {
    fn name(&self) -> &str {
        "point"
    }

    fn description(&self) -> &str {
        "Builds a geographic point from a map with latitude and longitude"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "Map"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        let value = context.get_argument(0)?;
        if value.is_null() {
            return Ok(Value::Null);
        }
        let (lat, lon) = point_coordinates(self.name(), value)?;
        if !(-90.0..=90.0).contains(&lat) {
            return Err(FunctionError::ExecutionError {
                message: format!("latitude {} is out of range", lat),
            });
        }
        let mut point = BTreeMap::new();
        point.insert("latitude".to_string(), Value::Float(lat));
        point.insert("longitude".to_string(), Value::Float(lon));
        Ok(Value::Map(point))
    }
}

/// distance(point1, point2) in metres
#[derive(Debug)]
pub struct DistanceFunction;

impl DistanceFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for DistanceFunction {
    fn name(&self) -> &str {
        "distance"
    }

    fn description(&self) -> &str {
        "Great circle distance in metres between two points"
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
        let (lat1, lon1) = point_coordinates(self.name(), context.get_argument(0)?)?;
        let (lat2, lon2) = point_coordinates(self.name(), context.get_argument(1)?)?;
        Ok(Value::Float(haversine_metres(lat1, lon1, lat2, lon2)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(values: &[f64]) -> Value {
        Value::List(values.iter().map(|f| Value::Float(*f)).collect())
    }

    fn score(measure: VectorMeasure, a: Value, b: Value) -> f64 {
        VectorFunction::new("f", measure)
            .execute(&FunctionContext::new(vec![a, b]))
            .unwrap()
            .as_float()
            .unwrap()
    }

    #[test]
    fn test_vector_similarity() {
        let a = floats(&[1.0, 0.0]);
        let b = floats(&[0.0, 1.0]);
        assert!((score(VectorMeasure::CosineSimilarity, a.clone(), a.clone()) - 1.0).abs() < 1e-6);
        assert!(score(VectorMeasure::CosineSimilarity, a.clone(), b.clone()).abs() < 1e-6);
        let d = score(VectorMeasure::EuclideanDistance, a.clone(), b.clone());
        assert!((d - 2f64.sqrt()).abs() < 1e-6);
        let s = score(VectorMeasure::EuclideanSimilarity, a, b);
        assert!((s - 1.0 / (1.0 + 2f64.sqrt())).abs() < 1e-6);
    }

    #[test]
    fn test_length_mismatch_scores_zero() {
        let integers = Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        assert_eq!(
            score(VectorMeasure::CosineSimilarity, floats(&[1.0, 2.0]), integers),
            0.0
        );
        assert_eq!(
            score(VectorMeasure::EuclideanSimilarity, floats(&[1.0]), Value::from("x")),
            0.0
        );
    }

    #[test]
    fn test_geographic_distance() {
        // London to Paris is roughly 344 km
        let d = haversine_metres(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((d - 343_500.0).abs() < 2_000.0, "distance was {}", d);

        let mut london = BTreeMap::new();
        london.insert("latitude".to_string(), Value::Float(51.5074));
        london.insert("longitude".to_string(), Value::Float(-0.1278));
        let p1 = PointFunction::new()
            .execute(&FunctionContext::new(vec![Value::Map(london)]))
            .unwrap();
        let same = DistanceFunction::new()
            .execute(&FunctionContext::new(vec![p1.clone(), p1]))
            .unwrap();
        assert_eq!(same, Value::Float(0.0));
    }
}
