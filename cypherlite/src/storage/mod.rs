// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph storage engine
//!
//! This module provides:
//! - Value type system for graph properties
//! - In-memory graph storage with adjacency lists
//! - Composite, vector and fulltext secondary indexes
//! - Uniqueness constraints
//! - Mutations with inverse-based undo
//! - Pluggable storage backends over key-value drivers

pub mod backend;
pub mod constraints;
pub mod graph_cache;
pub mod graph_state;
pub mod indexes;
pub mod mutation;
pub mod persistent;
pub mod storage_manager;
pub mod types;
pub mod value;

pub use backend::{KvBackend, StorageBackend};
pub use constraints::ConstraintDefinition;
pub use graph_cache::GraphCache;
pub use graph_state::{GraphImage, GraphState};
pub use mutation::{ApplyMode, Mutation};
pub use persistent::StorageType;
pub use storage_manager::StorageManager;
pub use types::{Edge, GraphError, Node, StorageError};
pub use value::{PathValue, Value};
