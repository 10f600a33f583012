// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Runtime statistics collected by PROFILE
//!
//! The executor records rows and db hits per (query part, clause, stage).
//! Every operator in a plan carries the slot it was built for, so applying
//! a profile is a lookup per operator.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::PlanDescription;

/// Position of an operator in the executed query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub part: usize,
    pub clause: usize,
    pub stage: usize,
}

impl Slot {
    pub fn new(part: usize, clause: usize, stage: usize) -> Self {
        Self {
            part,
            clause,
            stage,
        }
    }
}

/// Rows produced and storage accesses made by one stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub rows: u64,
    pub db_hits: u64,
}

impl StageStats {
    pub fn add(&mut self, other: StageStats) {
        self.rows += other.rows;
        self.db_hits += other.db_hits;
    }
}

/// Collected statistics of one profiled statement
#[derive(Debug, Default)]
pub struct Profile {
    stages: RefCell<HashMap<Slot, StageStats>>,
    clause_time_ms: RefCell<HashMap<(usize, usize), f64>>,
    total_time_ms: Cell<Option<f64>>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, slot: Slot, stats: StageStats) {
        self.stages.borrow_mut().entry(slot).or_default().add(stats);
    }

    pub fn record_time(&self, part: usize, clause: usize, elapsed_ms: f64) {
        *self
            .clause_time_ms
            .borrow_mut()
            .entry((part, clause))
            .or_insert(0.0) += elapsed_ms;
    }

    /// Wall time of the whole statement, reported on the plan root
    pub fn record_total_time(&self, elapsed_ms: f64) {
        self.total_time_ms.set(Some(elapsed_ms));
    }

    pub fn stats(&self, slot: Slot) -> StageStats {
        self.stages.borrow().get(&slot).copied().unwrap_or_default()
    }

    /// Fill actual rows, db hits and time into every slotted operator
    pub fn apply(&self, plan: &mut PlanDescription) {
        if let Some(slot) = plan.slot {
            let stats = self.stats(slot);
            plan.rows = Some(stats.rows);
            plan.db_hits = Some(stats.db_hits);
            if plan.timed {
                plan.time_ms = self
                    .clause_time_ms
                    .borrow()
                    .get(&(slot.part, slot.clause))
                    .copied();
            }
        }
        for child in &mut plan.children {
            self.apply(child);
        }
    }

    /// Fill the whole plan, then the unslotted root. The root hands rows to
    /// the caller without touching storage, so its own db hits are zero.
    pub fn apply_root(&self, plan: &mut PlanDescription, rows_returned: u64) {
        self.apply(plan);
        if plan.slot.is_none() {
            plan.rows = Some(rows_returned);
            plan.db_hits = Some(0);
            if plan.timed {
                plan.time_ms = self.total_time_ms.get();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_fills_slotted_operators() {
        let profile = Profile::new();
        let slot = Slot::new(0, 0, 0);
        profile.record(slot, StageStats { rows: 2, db_hits: 5 });
        profile.record(slot, StageStats { rows: 1, db_hits: 1 });
        profile.record_time(0, 0, 1.5);

        let mut leaf = PlanDescription::new("NodeByLabelScan", "n:Person");
        leaf.slot = Some(slot);
        leaf.timed = true;
        let mut root = PlanDescription::new("ProduceResults", "n");
        root.children.push(leaf);

        profile.apply(&mut root);
        let leaf = &root.children[0];
        assert_eq!(leaf.rows, Some(3));
        assert_eq!(leaf.db_hits, Some(6));
        assert_eq!(leaf.time_ms, Some(1.5));
        assert_eq!(root.rows, None);
    }

    #[test]
    fn test_apply_root_reports_returned_rows_and_total_time() {
        let profile = Profile::new();
        let slot = Slot::new(0, 0, 0);
        profile.record(slot, StageStats { rows: 4, db_hits: 9 });
        profile.record_total_time(2.25);

        let mut leaf = PlanDescription::new("NodeByLabelScan", "n:Person");
        leaf.slot = Some(slot);
        let mut root = PlanDescription::new("ProduceResults", "n");
        root.timed = true;
        root.children.push(leaf);

        profile.apply_root(&mut root, 4);
        assert_eq!(root.rows, Some(4));
        assert_eq!(root.db_hits, Some(0));
        assert_eq!(root.time_ms, Some(2.25));
        assert_eq!(root.children[0].db_hits, Some(9));
        assert_eq!(root.children[0].time_ms, None);
    }
}
