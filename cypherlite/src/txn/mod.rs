// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction management and durability
//!
//! # Features
//! - Private mutation buffers with read-your-writes overlays
//! - Atomic commit to graph state, indexes and the write-ahead log
//! - Segmented WAL with configurable sync modes
//! - Snapshots and snapshot-and-truncate compaction
//! - Crash recovery from the newest valid base image plus WAL replay

pub mod compaction;
pub mod log;
pub mod manager;
pub mod recovery;
pub mod snapshot;
pub mod state;
pub mod view;
pub mod wal;

pub use compaction::{CompactionConfig, CompactionManager, CompactionReport, Compactor};
pub use manager::{CommitOutcome, Transaction, TransactionManager, TransactionStatistics};
pub use recovery::{RecoveryBase, RecoveryManager, RecoveryReport};
pub use snapshot::SnapshotStore;
pub use state::TransactionId;
pub use view::GraphView;
pub use wal::{PersistentWAL, SyncMode, WalConfig};
