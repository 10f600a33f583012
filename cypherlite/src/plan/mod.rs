// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query plan descriptions for EXPLAIN and PROFILE
//!
//! The planner turns a validated statement into a tree of operators with
//! estimated cardinalities. Execution does not interpret this tree; instead
//! the executor and planner share the access path choice in [`access`] and
//! the stage layout below, so PROFILE can attach measured rows and db hits to
//! the operators EXPLAIN shows.

pub mod access;
pub mod cost;
pub mod planner;
pub mod profile;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use planner::plan_statement;
pub use profile::{Profile, Slot, StageStats};

/// Stage of a WITH/RETURN that projects or aggregates
pub const PROJECTION_STAGE: usize = 0;
pub const DISTINCT_STAGE: usize = 1;
pub const SORT_STAGE: usize = 2;
pub const SKIP_STAGE: usize = 3;
pub const LIMIT_STAGE: usize = 4;
/// WHERE following a WITH
pub const WITH_FILTER_STAGE: usize = 5;

/// One operator of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDescription {
    pub operator: String,
    pub details: String,
    /// Variables in scope after this operator
    pub identifiers: Vec<String>,
    pub estimated_rows: f64,
    pub estimated_db_hits: f64,
    /// Measured by PROFILE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_hits: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<f64>,
    #[serde(default)]
    pub children: Vec<PlanDescription>,
    #[serde(skip)]
    pub slot: Option<Slot>,
    /// Whether the clause's elapsed time is reported on this operator
    #[serde(skip)]
    pub timed: bool,
}

impl PlanDescription {
    pub fn new(operator: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            details: details.into(),
            identifiers: Vec::new(),
            estimated_rows: 0.0,
            estimated_db_hits: 0.0,
            rows: None,
            db_hits: None,
            time_ms: None,
            children: Vec::new(),
            slot: None,
            timed: false,
        }
    }

    /// First operator named `operator`, depth first
    pub fn find(&self, operator: &str) -> Option<&PlanDescription> {
        if self.operator == operator {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(operator))
    }

    /// Operator names in pre-order
    pub fn operators(&self) -> Vec<&str> {
        let mut names = vec![self.operator.as_str()];
        for child in &self.children {
            names.extend(child.operators());
        }
        names
    }

    /// Sum of the estimated db hits of the whole tree
    pub fn total_estimated_db_hits(&self) -> f64 {
        self.estimated_db_hits
            + self
                .children
                .iter()
                .map(PlanDescription::total_estimated_db_hits)
                .sum::<f64>()
    }

    /// Sum of measured db hits, when profiled
    pub fn total_db_hits(&self) -> u64 {
        self.db_hits.unwrap_or(0) + self.children.iter().map(PlanDescription::total_db_hits).sum::<u64>()
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{}+{}", "| ".repeat(depth), self.operator)?;
        if !self.details.is_empty() {
            write!(f, " [{}]", self.details)?;
        }
        write!(
            f,
            " est_rows={:.0} est_hits={:.0}",
            self.estimated_rows, self.estimated_db_hits
        )?;
        if let Some(rows) = self.rows {
            write!(f, " rows={}", rows)?;
        }
        if let Some(hits) = self.db_hits {
            write!(f, " db_hits={}", hits)?;
        }
        if let Some(time) = self.time_ms {
            write!(f, " time={:.3}ms", time)?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.render(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for PlanDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}
