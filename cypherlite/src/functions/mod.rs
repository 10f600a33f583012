// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Function execution system for query processing
//!
//! This module provides a generic function execution framework. Simply add new
//! functions by implementing the Function trait and registering them.
//! Aggregates are not registry entries; they are created per group through
//! [`new_aggregator`].

mod aggregate_functions;
mod function_trait;
mod graph_functions;
mod list_functions;
mod mathematical_functions;
mod scalar_functions;
mod string_functions;
mod vector_functions;

pub use aggregate_functions::{count_star, is_aggregate, new_aggregator, Aggregator};
pub use function_trait::{Function, FunctionContext, FunctionError, FunctionResult};

use std::collections::HashMap;

use list_functions::ListAccess;
use string_functions::TrimMode;
use vector_functions::VectorMeasure;

/// Registry of all available scalar functions
#[derive(Debug)]
pub struct FunctionRegistry {
    functions: HashMap<String, Box<dyn Function + 'static>>,
}

impl FunctionRegistry {
    /// Create a new function registry with default functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };

        // Entity and path functions
        registry.add(Box::new(graph_functions::IdFunction::id()));
        registry.add(Box::new(graph_functions::IdFunction::element_id()));
        registry.add(Box::new(graph_functions::LabelsFunction::new()));
        registry.add(Box::new(graph_functions::TypeFunction::new()));
        registry.add(Box::new(graph_functions::PropertiesFunction::new()));
        registry.add(Box::new(graph_functions::KeysFunction::new()));
        registry.add(Box::new(graph_functions::EndpointFunction::start_node()));
        registry.add(Box::new(graph_functions::EndpointFunction::end_node()));
        registry.add(Box::new(graph_functions::NodesFunction::new()));
        registry.add(Box::new(graph_functions::RelationshipsFunction::new()));
        registry.add(Box::new(graph_functions::LengthFunction::new()));

        // Null handling, conversion and clock
        registry.add(Box::new(scalar_functions::CoalesceFunction::new()));
        registry.add(Box::new(scalar_functions::ToIntegerFunction::new()));
        registry.add(Box::new(scalar_functions::ToFloatFunction::new()));
        registry.add(Box::new(scalar_functions::ToBooleanFunction::new()));
        registry.add(Box::new(scalar_functions::TimestampFunction::new()));

        // Mathematical functions
        registry.add(Box::new(mathematical_functions::AbsFunction::new()));
        registry.add(Box::new(mathematical_functions::CeilFloorFunction::ceil()));
        registry.add(Box::new(mathematical_functions::CeilFloorFunction::floor()));
        registry.add(Box::new(mathematical_functions::RoundFunction::new()));
        registry.add(Box::new(mathematical_functions::SignFunction::new()));
        registry.add(Box::new(mathematical_functions::UnaryFloatFunction::sqrt()));
        registry.add(Box::new(mathematical_functions::UnaryFloatFunction::exp()));
        registry.add(Box::new(mathematical_functions::UnaryFloatFunction::log()));
        registry.add(Box::new(mathematical_functions::UnaryFloatFunction::log10()));
        registry.add(Box::new(mathematical_functions::UnaryFloatFunction::sin()));
        registry.add(Box::new(mathematical_functions::UnaryFloatFunction::cos()));
        registry.add(Box::new(mathematical_functions::UnaryFloatFunction::tan()));
        registry.add(Box::new(mathematical_functions::Atan2Function::new()));
        registry.add(Box::new(mathematical_functions::ConstantFunction::pi()));
        registry.add(Box::new(mathematical_functions::ConstantFunction::e()));
        registry.add(Box::new(mathematical_functions::RandFunction::new()));

        // String functions
        registry.add(Box::new(string_functions::ToUpperFunction::new()));
        registry.add(Box::new(string_functions::ToLowerFunction::new()));
        registry.add(Box::new(string_functions::TrimFunction::new(TrimMode::Both)));
        registry.add(Box::new(string_functions::TrimFunction::new(TrimMode::Leading)));
        registry.add(Box::new(string_functions::TrimFunction::new(TrimMode::Trailing)));
        registry.add(Box::new(string_functions::SubstringFunction::new()));
        registry.add(Box::new(string_functions::ReplaceFunction::new()));
        registry.add(Box::new(string_functions::SplitFunction::new()));
        registry.add(Box::new(string_functions::SideFunction::left()));
        registry.add(Box::new(string_functions::SideFunction::right()));
        registry.add(Box::new(string_functions::ToStringFunction::new()));

        // List functions
        registry.add(Box::new(list_functions::SizeFunction::new()));
        registry.add(Box::new(list_functions::ReverseFunction::new()));
        registry.add(Box::new(list_functions::ListAccessFunction::new(ListAccess::Head)));
        registry.add(Box::new(list_functions::ListAccessFunction::new(ListAccess::Last)));
        registry.add(Box::new(list_functions::ListAccessFunction::new(ListAccess::Tail)));
        registry.add(Box::new(list_functions::RangeFunction::new()));

        // Vector and geographic functions
        for (name, measure) in [
            ("vector.similarity.cosine", VectorMeasure::CosineSimilarity),
            ("cosineSimilarity", VectorMeasure::CosineSimilarity),
            ("vector.similarity.euclidean", VectorMeasure::EuclideanSimilarity),
            ("euclideanSimilarity", VectorMeasure::EuclideanSimilarity),
            ("euclideanDistance", VectorMeasure::EuclideanDistance),
        ] {
            registry.add(Box::new(vector_functions::VectorFunction::new(name, measure)));
        }
        registry.add(Box::new(vector_functions::HaversineFunction::new()));
        registry.add(Box::new(vector_functions::PointFunction::new()));
        registry.add(Box::new(vector_functions::DistanceFunction::new()));

        registry
    }

    fn add(&mut self, function: Box<dyn Function + 'static>) {
        let name = function.name().to_string();
        self.register(&name, function);
    }

    /// Register a new function
    pub fn register(&mut self, name: &str, function: Box<dyn Function + 'static>) {
        self.functions.insert(name.to_uppercase(), function);
    }

    /// Get a function by name
    pub fn get(&self, name: &str) -> Option<&dyn Function> {
        self.functions.get(&name.to_uppercase()).map(|f| f.as_ref())
    }

    /// Check if a scalar function exists
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_uppercase())
    }

    /// True for scalar functions and aggregates
    pub fn is_known(&self, name: &str) -> bool {
        self.has_function(name) || is_aggregate(name)
    }

    /// Canonical names of all scalar functions, sorted
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .values()
            .map(|f| f.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Look up, arity-check and execute a scalar function
    pub fn invoke(&self, name: &str, context: &FunctionContext) -> FunctionResult<crate::storage::Value> {
        let function = self
            .get(name)
            .ok_or_else(|| FunctionError::UnknownFunction {
                name: name.to_string(),
            })?;
        let actual = context.argument_count();
        let min = function.argument_count();
        let max = function.max_arguments();
        let in_range = actual >= min && max.map(|max| actual <= max).unwrap_or(true);
        if !in_range {
            let expected = match max {
                Some(max) if max == min => min.to_string(),
                Some(max) => format!("{} to {}", min, max),
                None => format!("at least {}", min),
            };
            return Err(FunctionError::InvalidArgumentCount { expected, actual });
        }
        function.execute(context)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
