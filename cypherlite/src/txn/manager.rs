// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction manager implementation
//!
//! Transactions buffer their mutations privately. Commit applies the buffer
//! to committed state under the store write lock, appends it to the WAL
//! before the lock is released, and then mirrors it into the backend.
//! Backend writes are ordered by a mutex acquired before the write lock is
//! dropped, so the backend sees batches in WAL order.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;

use super::log::TransactionLog;
use super::state::{TransactionId, TransactionState};
use super::view::GraphView;
use super::wal::PersistentWAL;
use crate::storage::{GraphState, Mutation, StorageError, StorageManager};

/// A transaction handle owned by its caller
#[derive(Debug, Clone)]
pub struct Transaction {
    state: TransactionState,
    log: TransactionLog,
}

impl Transaction {
    fn new(session_id: Option<String>) -> Self {
        let state = TransactionState::new(session_id);
        let log = TransactionLog::new(state.id);
        Self { state, log }
    }

    pub fn id(&self) -> TransactionId {
        self.state.id
    }

    pub fn state(&self) -> &TransactionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn log(&self) -> &TransactionLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut TransactionLog {
        &mut self.log
    }

    /// Buffer a mutation
    pub fn record(&mut self, mutation: Mutation) {
        self.log.record(mutation);
    }

    /// Read view of `committed` with this transaction's writes layered on top
    pub fn view<'a>(&'a self, committed: &'a GraphState) -> GraphView<'a> {
        GraphView::new(committed, Some(self.log.overlay()))
    }
}

/// Result of a successful commit
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub transaction_id: TransactionId,
    /// Sequence of the commit record, absent without a WAL or for an empty
    /// transaction
    pub seq: Option<u64>,
    pub mutations: Vec<Mutation>,
}

/// Transaction statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionStatistics {
    pub started_transactions: u64,
    pub committed_transactions: u64,
    pub rolled_back_transactions: u64,
    pub failed_transactions: u64,
}

/// Transaction manager handles the lifecycle of all transactions
pub struct TransactionManager {
    storage: Arc<StorageManager>,
    wal: Option<Arc<PersistentWAL>>,
    /// Orders backend mirroring by commit sequence
    mirror: Mutex<()>,
    /// Set after a backend write fails; later batches are not mirrored so
    /// the backend never skips a sequence. Recovery resynchronizes it.
    backend_stale: AtomicBool,
    started: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    failed: AtomicU64,
}

impl TransactionManager {
    pub fn new(storage: Arc<StorageManager>, wal: Option<Arc<PersistentWAL>>) -> Self {
        Self {
            storage,
            wal,
            mirror: Mutex::new(()),
            backend_stale: AtomicBool::new(false),
            started: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            rolled_back: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    pub fn wal(&self) -> Option<&Arc<PersistentWAL>> {
        self.wal.as_ref()
    }

    /// Start a new transaction
    pub fn begin(&self, session_id: Option<String>) -> Transaction {
        self.started.fetch_add(1, Ordering::Relaxed);
        let transaction = Transaction::new(session_id);
        debug!("Started transaction {}", transaction.id());
        transaction
    }

    /// Commit the buffered mutations atomically.
    ///
    /// On a constraint, endpoint or connectivity failure every applied
    /// mutation is undone and committed state is left unchanged. A WAL
    /// append failure is undone the same way and reported as a durability
    /// error. Either way the transaction ends as failed.
    pub fn commit(&self, transaction: &mut Transaction) -> Result<CommitOutcome, StorageError> {
        if !transaction.is_active() {
            return Err(StorageError::InvalidOperation(format!(
                "Transaction {} is not active",
                transaction.id()
            )));
        }
        let transaction_id = transaction.id();
        debug!(
            "Committing transaction {} with {} mutations (~{} bytes)",
            transaction_id,
            transaction.log.len(),
            transaction.log.estimated_size_bytes()
        );
        let mutations = transaction.log.take();
        if mutations.is_empty() {
            transaction.state.commit(None);
            self.committed.fetch_add(1, Ordering::Relaxed);
            return Ok(CommitOutcome {
                transaction_id,
                seq: None,
                mutations,
            });
        }

        let mut state = self.storage.write();
        let inverses = match state.apply_all(&mutations) {
            Ok(inverses) => inverses,
            Err(e) => {
                drop(state);
                return Err(self.fail(transaction, StorageError::Graph(e)));
            }
        };

        let seq = match &self.wal {
            Some(wal) => match wal.append_transaction(transaction_id, &mutations) {
                Ok(seq) => Some(seq),
                Err(e) => {
                    state.undo(inverses);
                    drop(state);
                    error!("WAL append failed for {}: {}", transaction_id, e);
                    return Err(self.fail(
                        transaction,
                        StorageError::DurabilityError(e.to_string()),
                    ));
                }
            },
            None => None,
        };

        let mirror = self.mirror.lock();
        drop(state);
        if let Some(seq) = seq {
            self.mirror_to_backend(&mutations, seq);
        }
        drop(mirror);

        transaction.state.commit(seq);
        self.committed.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Committed {} with {} mutations at seq {:?}",
            transaction_id,
            mutations.len(),
            seq
        );
        Ok(CommitOutcome {
            transaction_id,
            seq,
            mutations,
        })
    }

    fn mirror_to_backend(&self, mutations: &[Mutation], seq: u64) {
        if self.backend_stale.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.storage.backend().persist(mutations, seq) {
            self.backend_stale.store(true, Ordering::Release);
            error!(
                "Backend write failed at seq {}; the WAL remains authoritative until the next open: {}",
                seq, e
            );
        }
    }

    fn fail(&self, transaction: &mut Transaction, error: StorageError) -> StorageError {
        transaction.state.fail(error.to_string());
        self.failed.fetch_add(1, Ordering::Relaxed);
        warn!("Transaction {} failed: {}", transaction.id(), error);
        error
    }

    /// Discard the buffered mutations
    pub fn rollback(&self, transaction: &mut Transaction) {
        if !transaction.is_active() {
            return;
        }
        let discarded = transaction.log.take();
        transaction.state.rollback();
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Rolled back {} discarding {} mutations",
            transaction.id(),
            discarded.len()
        );
    }

    /// Whether a backend write failed since open
    pub fn backend_stale(&self) -> bool {
        self.backend_stale.load(Ordering::Acquire)
    }

    pub fn statistics(&self) -> TransactionStatistics {
        TransactionStatistics {
            started_transactions: self.started.load(Ordering::Relaxed),
            committed_transactions: self.committed.load(Ordering::Relaxed),
            rolled_back_transactions: self.rolled_back.load(Ordering::Relaxed),
            failed_transactions: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("durable", &self.wal.is_some())
            .field("statistics", &self.statistics())
            .finish()
    }
}
