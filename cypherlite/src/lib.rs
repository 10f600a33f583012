// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CypherLite - An embeddable Cypher-compatible graph database
//!
//! CypherLite stores property graphs (labelled nodes, typed relationships
//! and arbitrary properties) and queries them with a documented subset of
//! Cypher.
//!
//! # Features
//!
//! - **Cypher Queries**: MATCH, OPTIONAL MATCH, CREATE, MERGE, SET, REMOVE,
//!   DELETE, WITH, UNWIND, FOREACH, UNION, CALL, EXPLAIN and PROFILE
//! - **Transactions**: Buffered writes with read-your-writes and atomic commit
//! - **Durability**: Segmented write-ahead log, snapshots, compaction and
//!   crash recovery, with an optional Sled key-value mirror
//! - **Indexes**: Composite property, vector (exact and HNSW), fulltext and
//!   hybrid ranking, plus uniqueness constraints
//! - **Extensions**: Request and commit hooks and a bounded event bus
//!
//! # Usage
//!
//! ```no_run
//! use cypherlite::QueryCoordinator;
//! use std::collections::HashMap;
//!
//! let db = QueryCoordinator::from_path("./mydb").unwrap();
//! db.execute("CREATE (:Person {name: 'Ann'})-[:KNOWS]->(:Person {name: 'Bob'})", HashMap::new())
//!     .unwrap();
//! let result = db
//!     .execute("MATCH (a:Person)-[:KNOWS]->(b) RETURN a.name, b.name", HashMap::new())
//!     .unwrap();
//! for row in &result.rows {
//!     println!("{:?}", row.positional_values);
//! }
//! ```

// Public modules - exposed to external users
pub mod coordinator;
pub mod events;

// Internal modules - only visible within cypherlite crate
pub(crate) mod ast;
pub(crate) mod exec;
pub(crate) mod functions;
pub(crate) mod interchange;
pub(crate) mod plan;
pub(crate) mod storage;
pub(crate) mod txn;

// Re-export the public API - QueryCoordinator is the entry point
pub use coordinator::{
    ConfigError, DatabaseConfig, DatabaseStats, QueryCoordinator, QueryInfo, QueryOptions,
    QueryResult, QueryType, Row, SessionInfo,
};
pub use events::{
    Extension, ExtensionDescriptor, ExtensionError, EventSubscriber, GraphEvent,
    EXTENSION_API_VERSION,
};
pub use exec::{CancellationToken, ExecutionError, QueryCounters};
pub use interchange::ImportReport;
pub use plan::PlanDescription;

// Re-export value and storage types needed for inspecting results and
// configuring the database
pub use storage::{Edge, Mutation, Node, PathValue, StorageType, Value};
pub use txn::{
    CompactionConfig, CompactionReport, RecoveryBase, RecoveryReport, SyncMode, TransactionId,
    TransactionStatistics, WalConfig,
};

/// CypherLite version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CypherLite crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
