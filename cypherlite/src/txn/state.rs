// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction state management
//!
//! This module defines the transaction state and lifecycle management.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_TRANSACTION_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Generate a new transaction ID. IDs are based on system time and are
    /// strictly increasing within the process.
    pub fn new() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let mut last = LAST_TRANSACTION_ID.load(Ordering::Relaxed);
        loop {
            let next = timestamp.max(last + 1);
            match LAST_TRANSACTION_ID.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return TransactionId(next),
                Err(current) => last = current,
            }
        }
    }

    /// Get the underlying ID value
    pub fn id(&self) -> u64 {
        self.0
    }

    /// Create TransactionId from u64 (used by WAL decoding)
    pub fn from_u64(id: u64) -> Self {
        TransactionId(id)
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction lifecycle states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Transaction is active and can perform operations
    Active,
    /// Transaction has been committed successfully
    Committed,
    /// Transaction has been rolled back
    RolledBack,
    /// Transaction is in an error state
    Failed(String),
}

impl TransactionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Committed => "committed",
            TransactionStatus::RolledBack => "rolled back",
            TransactionStatus::Failed(_) => "failed",
        }
    }
}

/// Lifecycle metadata of a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionState {
    /// Unique transaction identifier
    pub id: TransactionId,
    /// Session ID that owns this transaction
    pub session_id: Option<String>,
    /// Current transaction status
    pub status: TransactionStatus,
    /// Timestamp when transaction started
    pub start_time: SystemTime,
    /// Timestamp when transaction ended (if applicable)
    pub end_time: Option<SystemTime>,
    /// WAL sequence of the commit record, once committed
    pub commit_seq: Option<u64>,
}

impl TransactionState {
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            id: TransactionId::new(),
            session_id,
            status: TransactionStatus::Active,
            start_time: SystemTime::now(),
            end_time: None,
            commit_seq: None,
        }
    }

    /// Mark transaction as committed
    pub fn commit(&mut self, seq: Option<u64>) {
        self.status = TransactionStatus::Committed;
        self.commit_seq = seq;
        self.end_time = Some(SystemTime::now());
    }

    /// Mark transaction as rolled back
    pub fn rollback(&mut self) {
        self.status = TransactionStatus::RolledBack;
        self.end_time = Some(SystemTime::now());
    }

    /// Mark transaction as failed with error message
    pub fn fail(&mut self, error: String) {
        self.status = TransactionStatus::Failed(error);
        self.end_time = Some(SystemTime::now());
    }

    /// Check if transaction is active
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Get transaction duration
    pub fn duration(&self) -> std::time::Duration {
        let end_time = self.end_time.unwrap_or_else(SystemTime::now);
        end_time.duration_since(self.start_time).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_ids_increase() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert!(b > a);
        assert_eq!(TransactionId::from_u64(a.id()), a);
    }

    #[test]
    fn test_lifecycle() {
        let mut state = TransactionState::new(Some("s1".to_string()));
        assert!(state.is_active());
        state.commit(Some(7));
        assert_eq!(state.status, TransactionStatus::Committed);
        assert_eq!(state.commit_seq, Some(7));
        assert!(state.end_time.is_some());

        let mut failed = TransactionState::new(None);
        failed.fail("boom".to_string());
        assert!(!failed.is_active());
    }
}
