// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Core traits for the vector indexing tiers

use super::{IndexError, SimilarityMetric};

/// A single nearest-neighbor result
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub key: String,
    /// Metric-specific similarity, higher is better
    pub score: f64,
    /// Metric-specific distance, lower is better
    pub distance: f64,
}

/// Operations shared by every nearest-neighbor index
pub trait NearestNeighborIndex: Send + Sync {
    /// Insert or replace the vector stored under `key`
    fn add(&mut self, key: &str, vector: &[f32]) -> Result<(), IndexError>;

    /// Remove `key`, returns whether it was present
    fn remove(&mut self, key: &str) -> bool;

    /// The `k` entries closest to `query`, best first
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>, IndexError>;

    /// Number of live entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimensions(&self) -> usize;

    fn metric(&self) -> SimilarityMetric;

    /// Snapshot of all live entries, used when switching tiers
    fn entries(&self) -> Vec<(String, Vec<f32>)>;
}
