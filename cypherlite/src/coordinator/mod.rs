// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query Coordinator - Central orchestration for query execution
//!
//! The QueryCoordinator provides a unified entry point for query execution,
//! properly coordinating all database components (sessions, storage,
//! durability, execution and extensions).

pub mod config;
pub mod query_coordinator;

pub use config::{ConfigError, DatabaseConfig};
pub use query_coordinator::{
    DatabaseStats, QueryCoordinator, QueryInfo, QueryOptions, QueryType, SessionInfo,
};

// Re-export types needed for the public API
pub use crate::exec::{QueryResult, Row};
