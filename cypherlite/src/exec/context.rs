// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution context and cancellation
//!
//! An `ExecutionContext` lives for one statement. It borrows the committed
//! state under the caller's read guard and the transaction that buffers the
//! statement's writes, so every read goes through [`ExecutionContext::view`]
//! and sees the transaction's own uncommitted changes.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::exec::error::ExecutionError;
use crate::exec::result::QueryCounters;
use crate::functions::FunctionRegistry;
use crate::plan::{Profile, Slot, StageStats};
use crate::storage::{GraphState, Mutation, Value};
use crate::txn::{GraphView, Transaction};

/// Variable bindings of one row flowing through the clause pipeline
pub type Record = HashMap<String, Value>;

/// Cooperative cancellation: an explicit flag plus an optional deadline.
/// Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Copy sharing this token's flag with a deadline no later than `timeout`
    pub fn child_with_timeout(&self, timeout: Option<Duration>) -> Self {
        let deadline = match (self.deadline, timeout.map(|t| Instant::now() + t)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            cancelled: self.cancelled.clone(),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    /// `Aborted` once cancelled or past the deadline
    pub fn check(&self) -> Result<(), ExecutionError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(ExecutionError::Aborted("query was cancelled".to_string()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ExecutionError::Aborted(
                    "query exceeded its timeout".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Per-statement execution state
pub struct ExecutionContext<'a> {
    pub state: &'a GraphState,
    pub txn: &'a mut Transaction,
    pub params: &'a HashMap<String, Value>,
    pub functions: &'a FunctionRegistry,
    pub cancel: &'a CancellationToken,
    /// Dimension threshold handed to new `auto` vector indexes
    pub vector_exact_threshold: usize,
    pub counters: QueryCounters,
    pub warnings: Vec<String>,
    /// Present while running under PROFILE
    pub profile: Option<&'a Profile>,
    db_hits: Cell<u64>,
    /// Nesting level of subqueries and FOREACH bodies; only the outermost
    /// level is profiled
    depth: Cell<usize>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        state: &'a GraphState,
        txn: &'a mut Transaction,
        params: &'a HashMap<String, Value>,
        functions: &'a FunctionRegistry,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            state,
            txn,
            params,
            functions,
            cancel,
            vector_exact_threshold: 1_000,
            counters: QueryCounters::default(),
            warnings: Vec::new(),
            profile: None,
            db_hits: Cell::new(0),
            depth: Cell::new(0),
        }
    }

    pub fn with_profile(mut self, profile: &'a Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_vector_exact_threshold(mut self, threshold: usize) -> Self {
        self.vector_exact_threshold = threshold;
        self
    }

    /// Committed state with this transaction's writes layered on top
    pub fn view(&self) -> GraphView<'_> {
        self.txn.view(self.state)
    }

    /// Buffer a mutation in the transaction
    pub fn record(&mut self, mutation: Mutation) {
        self.txn.record(mutation);
    }

    pub fn check_cancelled(&self) -> Result<(), ExecutionError> {
        self.cancel.check()
    }

    /// Count storage accesses for PROFILE
    pub fn hit(&self, n: u64) {
        self.db_hits.set(self.db_hits.get() + n);
    }

    pub fn db_hits(&self) -> u64 {
        self.db_hits.get()
    }

    /// Whether stage statistics are being collected at this nesting level
    pub fn profiling(&self) -> bool {
        self.profile.is_some() && self.depth.get() == 0
    }

    pub fn record_stage(&self, slot: Slot, stats: StageStats) {
        if self.depth.get() == 0 {
            if let Some(profile) = self.profile {
                profile.record(slot, stats);
            }
        }
    }

    pub fn record_time(&self, part: usize, clause: usize, elapsed_ms: f64) {
        if self.depth.get() == 0 {
            if let Some(profile) = self.profile {
                profile.record_time(part, clause, elapsed_ms);
            }
        }
    }

    pub fn enter_nested(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    pub fn leave_nested(&self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }

    pub fn add_warning(&mut self, warning: String) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    pub fn parameter(&self, name: &str) -> Result<&Value, ExecutionError> {
        self.params
            .get(name)
            .ok_or_else(|| ExecutionError::SemanticError(format!("Expected parameter(s): {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(matches!(token.check(), Err(ExecutionError::Aborted(_))));
    }

    #[test]
    fn test_deadline_expires() {
        let token = CancellationToken::with_timeout(Duration::from_millis(0));
        assert!(token.is_cancelled());
        let child = CancellationToken::new().child_with_timeout(Some(Duration::from_secs(60)));
        assert!(!child.is_cancelled());
    }
}
