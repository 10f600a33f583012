// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! WAL Recovery Manager for crash recovery and replay operations
//!
//! Recovery starts from a base image (the newest valid snapshot or the
//! key-value backend's image, whichever reflects the higher sequence), then
//! replays the operations of every transaction whose commit record lies
//! above that base. Transactions without a commit record are discarded.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::snapshot::{SnapshotError, SnapshotStore};
use super::state::TransactionId;
use super::wal::{WALEntryType, WALError, WALRecord, WalScan};
use crate::storage::{
    ApplyMode, GraphError, GraphImage, GraphState, Mutation, StorageError, StorageManager,
};

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("WAL read failed: {0}")]
    WALRead(#[from] WALError),

    #[error("Snapshot load failed: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Storage error during recovery: {0}")]
    Storage(#[from] StorageError),

    #[error("Base image could not be loaded: {0}")]
    BaseImage(#[from] GraphError),
}

/// Where the recovered state started from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryBase {
    Empty,
    Snapshot,
    KeyValue,
}

/// Summary of a recovery run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub base: RecoveryBase,
    /// Sequence reflected by the base image
    pub base_seq: u64,
    /// Boundary of the snapshot used, if one was loaded
    pub snapshot_seq: Option<u64>,
    pub records_read: usize,
    pub transactions_replayed: usize,
    pub operations_replayed: usize,
    /// Operations that could not be applied and were skipped
    pub operations_skipped: usize,
    /// Transactions without a commit record, discarded
    pub incomplete_transactions: usize,
    pub torn_tail: bool,
    /// Highest sequence number known after recovery
    pub last_seq: u64,
    pub duration_ms: u64,
}

impl RecoveryReport {
    pub fn new() -> Self {
        Self {
            base: RecoveryBase::Empty,
            base_seq: 0,
            snapshot_seq: None,
            records_read: 0,
            transactions_replayed: 0,
            operations_replayed: 0,
            operations_skipped: 0,
            incomplete_transactions: 0,
            torn_tail: false,
            last_seq: 0,
            duration_ms: 0,
        }
    }
}

impl Default for RecoveryReport {
    fn default() -> Self {
        Self::new()
    }
}

/// A transaction whose commit record was found
struct CommittedTransaction {
    transaction_id: TransactionId,
    commit_seq: u64,
    operations: Vec<WALRecord>,
}

/// Recovery Manager for WAL-based crash recovery
pub struct RecoveryManager<'a> {
    storage: &'a StorageManager,
    snapshots: Option<&'a SnapshotStore>,
}

impl<'a> RecoveryManager<'a> {
    pub fn new(storage: &'a StorageManager, snapshots: Option<&'a SnapshotStore>) -> Self {
        Self { storage, snapshots }
    }

    /// Rebuild committed state from the base image and the scanned log
    pub fn recover(&self, scan: WalScan) -> Result<RecoveryReport, RecoveryError> {
        let started = Instant::now();
        let mut report = RecoveryReport::new();
        report.records_read = scan.records.len();
        report.torn_tail = scan.torn_tail;

        let (mut state, kv_seq) = self.load_base(&mut report)?;

        // Phase 1: Analysis - find committed transactions above the base
        let committed = Self::analysis_phase(scan.records, report.base_seq, &mut report);

        // Phase 2: Redo - replay committed transactions in commit order
        let replayed = self.redo_phase(&mut state, committed, &mut report)?;

        if report.transactions_replayed > 0 {
            state.indexes.rebuild_all(&state.graph).map_err(GraphError::from)?;
        }

        // Bring a key-value backend up to date with what was recovered
        if report.base == RecoveryBase::KeyValue {
            for (mutations, seq) in &replayed {
                self.storage.backend().persist(mutations, *seq)?;
            }
        } else if report.last_seq > kv_seq {
            self.storage
                .backend()
                .store_image(&state.to_image(), report.last_seq)?;
        }

        self.storage.install(state);
        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Recovery complete: base {:?} at seq {}, {} records read, {} transactions replayed, {} incomplete discarded, torn tail: {}",
            report.base,
            report.base_seq,
            report.records_read,
            report.transactions_replayed,
            report.incomplete_transactions,
            report.torn_tail
        );
        Ok(report)
    }

    /// Pick the base image with the higher sequence
    fn load_base(&self, report: &mut RecoveryReport) -> Result<(GraphState, u64), RecoveryError> {
        let snapshot = match self.snapshots {
            Some(store) => store.load_latest()?,
            None => None,
        };
        let kv = self.storage.backend().load()?;
        let kv_seq = kv.as_ref().map(|(_, seq)| *seq).unwrap_or(0);
        report.snapshot_seq = snapshot.as_ref().map(|s| s.seq);

        let (base, image, seq) = match (snapshot, kv) {
            (Some(snapshot), Some((image, seq))) if seq >= snapshot.seq => {
                (RecoveryBase::KeyValue, image, seq)
            }
            (Some(snapshot), _) => (RecoveryBase::Snapshot, snapshot.image, snapshot.seq),
            (None, Some((image, seq))) => (RecoveryBase::KeyValue, image, seq),
            (None, None) => (RecoveryBase::Empty, GraphImage::default(), 0),
        };
        debug!("Recovery base {:?} at seq {}", base, seq);

        report.base = base;
        report.base_seq = seq;
        report.last_seq = seq;
        Ok((GraphState::from_image(image)?, kv_seq))
    }

    fn analysis_phase(
        records: Vec<WALRecord>,
        base_seq: u64,
        report: &mut RecoveryReport,
    ) -> Vec<CommittedTransaction> {
        let mut in_progress: HashMap<TransactionId, Vec<WALRecord>> = HashMap::new();
        let mut committed = Vec::new();

        for record in records {
            report.last_seq = report.last_seq.max(record.seq);
            match record.entry_type {
                WALEntryType::TransactionOperation => {
                    in_progress
                        .entry(record.transaction_id)
                        .or_default()
                        .push(record);
                }
                WALEntryType::TransactionCommit => {
                    let operations = in_progress
                        .remove(&record.transaction_id)
                        .unwrap_or_default();
                    if record.seq > base_seq {
                        committed.push(CommittedTransaction {
                            transaction_id: record.transaction_id,
                            commit_seq: record.seq,
                            operations,
                        });
                    }
                }
            }
        }

        report.incomplete_transactions = in_progress.len();
        for (txn_id, operations) in &in_progress {
            debug!(
                "Discarding {} operations of uncommitted transaction {}",
                operations.len(),
                txn_id
            );
        }
        committed
    }

    fn redo_phase(
        &self,
        state: &mut GraphState,
        committed: Vec<CommittedTransaction>,
        report: &mut RecoveryReport,
    ) -> Result<Vec<(Vec<Mutation>, u64)>, RecoveryError> {
        let mut replayed = Vec::with_capacity(committed.len());
        for transaction in committed {
            debug!(
                "Replaying committed transaction {} (seq {})",
                transaction.transaction_id, transaction.commit_seq
            );
            let mut mutations = Vec::with_capacity(transaction.operations.len());
            for record in &transaction.operations {
                let mutation = match record.mutation() {
                    Ok(mutation) => mutation,
                    Err(e) => {
                        warn!("Skipping undecodable WAL record {}: {}", record.seq, e);
                        report.operations_skipped += 1;
                        continue;
                    }
                };
                match state.apply(&mutation, ApplyMode::Replay) {
                    Ok(_) => report.operations_replayed += 1,
                    Err(e) => {
                        warn!(
                            "Skipping WAL record {} ({}): {}",
                            record.seq,
                            mutation.describe(),
                            e
                        );
                        report.operations_skipped += 1;
                    }
                }
                mutations.push(mutation);
            }
            report.transactions_replayed += 1;
            replayed.push((mutations, transaction.commit_seq));
        }
        Ok(replayed)
    }
}
