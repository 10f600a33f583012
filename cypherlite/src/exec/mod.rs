// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query execution engine
//!
//! Executes validated statements clause by clause against a transaction's
//! view of the graph and produces query results.

pub mod context;
pub mod error;
pub mod eval;
pub mod executor;
pub mod pattern;
pub mod procedures;
pub mod result;

// Re-export the main types for convenience
pub use context::{CancellationToken, ExecutionContext};
pub use error::ExecutionError;
pub use executor::{execute_query, execute_schema, QueryOutput};
pub use result::{QueryCounters, QueryResult, Row};
