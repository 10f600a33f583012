// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Secondary indexing system
//!
//! This module provides:
//! - Composite property indexes keyed by (label, property, value) digests
//! - Exact and HNSW vector indexes
//! - A TF-IDF fulltext index with boolean and phrase queries
//! - Reciprocal rank fusion for hybrid ranking
//!
//! Index contents are always derived from node state and rebuilt on recovery.

pub mod composite;
pub mod errors;
pub mod fulltext;
pub mod hnsw;
pub mod hybrid;
pub mod manager;
pub mod traits;
pub mod types;
pub mod vector;

// Re-export core types
pub use errors::*;
pub use manager::*;
pub use types::*;
