// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Vector similarity indexes
//!
//! `BruteForceIndex` compares the query against every stored vector and is
//! exact. `VectorIndex` wraps either tier and, in `Auto` mode, promotes an
//! exact index to HNSW once it grows past the configured threshold.

use super::hnsw::HnswIndex;
use super::traits::{NearestNeighborIndex, VectorHit};
use super::{IndexError, SimilarityMetric, VectorIndexConfig, VectorIndexKind};
use log::debug;
use rayon::prelude::*;
use std::collections::BTreeMap;

impl SimilarityMetric {
    /// Distance between two equal-length vectors, lower is closer
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            SimilarityMetric::Cosine => 1.0 - cosine(a, b),
            SimilarityMetric::Euclidean => euclidean(a, b),
            SimilarityMetric::DotProduct => -dot(a, b),
        }
    }

    /// Convert a distance back into the similarity reported to callers
    pub fn score(&self, distance: f32) -> f64 {
        match self {
            SimilarityMetric::Cosine => 1.0 - distance as f64,
            SimilarityMetric::Euclidean => 1.0 / (1.0 + distance as f64),
            SimilarityMetric::DotProduct => -(distance as f64),
        }
    }
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

pub(crate) fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn check_dimensions(expected: usize, vector: &[f32]) -> Result<(), IndexError> {
    if vector.len() != expected {
        return Err(IndexError::DimensionMismatch {
            expected,
            got: vector.len(),
        });
    }
    Ok(())
}

/// Exact index: full comparison against every stored vector
#[derive(Debug, Clone)]
pub struct BruteForceIndex {
    dimensions: usize,
    metric: SimilarityMetric,
    vectors: BTreeMap<String, Vec<f32>>,
}

impl BruteForceIndex {
    pub fn new(dimensions: usize, metric: SimilarityMetric) -> Self {
        Self {
            dimensions,
            metric,
            vectors: BTreeMap::new(),
        }
    }
}

impl NearestNeighborIndex for BruteForceIndex {
    fn add(&mut self, key: &str, vector: &[f32]) -> Result<(), IndexError> {
        check_dimensions(self.dimensions, vector)?;
        self.vectors.insert(key.to_string(), vector.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> bool {
        self.vectors.remove(key).is_some()
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>, IndexError> {
        check_dimensions(self.dimensions, query)?;
        let metric = self.metric;
        let mut scored: Vec<(f32, &String)> = self
            .vectors
            .par_iter()
            .map(|(key, vector)| (metric.distance(query, vector), key))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, key)| VectorHit {
                key: key.clone(),
                score: metric.score(distance),
                distance: distance as f64,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    fn entries(&self) -> Vec<(String, Vec<f32>)> {
        self.vectors
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Tiered vector index selected by [`VectorIndexConfig::kind`]
pub struct VectorIndex {
    config: VectorIndexConfig,
    inner: Box<dyn NearestNeighborIndex>,
    promoted: bool,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("config", &self.config)
            .field("len", &self.inner.len())
            .field("hnsw", &self.uses_hnsw())
            .finish()
    }
}

impl VectorIndex {
    pub fn new(config: VectorIndexConfig) -> Self {
        let inner: Box<dyn NearestNeighborIndex> = match config.kind {
            VectorIndexKind::Hnsw => Box::new(HnswIndex::new(
                config.dimensions,
                config.metric,
                config.hnsw.clone(),
            )),
            VectorIndexKind::Exact | VectorIndexKind::Auto => {
                Box::new(BruteForceIndex::new(config.dimensions, config.metric))
            }
        };
        let promoted = config.kind == VectorIndexKind::Hnsw;
        Self {
            config,
            inner,
            promoted,
        }
    }

    pub fn config(&self) -> &VectorIndexConfig {
        &self.config
    }

    /// Whether searches currently go through the HNSW tier
    pub fn uses_hnsw(&self) -> bool {
        self.promoted
    }

    pub fn add(&mut self, key: &str, vector: &[f32]) -> Result<(), IndexError> {
        self.inner.add(key, vector)?;
        if self.config.kind == VectorIndexKind::Auto
            && !self.promoted
            && self.inner.len() > self.config.exact_threshold
        {
            self.promote()?;
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.inner.remove(key)
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>, IndexError> {
        self.inner.search(query, k)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn promote(&mut self) -> Result<(), IndexError> {
        debug!(
            "Promoting vector index to HNSW at {} entries",
            self.inner.len()
        );
        let mut hnsw = HnswIndex::new(
            self.config.dimensions,
            self.config.metric,
            self.config.hnsw.clone(),
        );
        for (key, vector) in self.inner.entries() {
            hnsw.add(&key, &vector)?;
        }
        self.inner = Box::new(hnsw);
        self.promoted = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vectors() -> Vec<(String, Vec<f32>)> {
        vec![
            ("item1".to_string(), vec![1.0, 0.0, 0.0]),
            ("item2".to_string(), vec![0.0, 1.0, 0.0]),
            ("item3".to_string(), vec![0.0, 0.0, 1.0]),
            ("item4".to_string(), vec![0.7, 0.7, 0.0]),
            ("item5".to_string(), vec![0.0, 0.6, 0.8]),
        ]
    }

    #[test]
    fn test_brute_force_self_match_cosine() {
        let mut index = BruteForceIndex::new(3, SimilarityMetric::Cosine);
        for (key, vector) in sample_vectors() {
            index.add(&key, &vector).unwrap();
        }
        let hits = index.search(&[0.0, 0.0, 1.0], 3).unwrap();
        assert_eq!(hits[0].key, "item3");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].key, "item5");
    }

    #[test]
    fn test_brute_force_self_match_euclidean() {
        let mut index = BruteForceIndex::new(3, SimilarityMetric::Euclidean);
        for (key, vector) in sample_vectors() {
            index.add(&key, &vector).unwrap();
        }
        let hits = index.search(&[0.7, 0.7, 0.0], 1).unwrap();
        assert_eq!(hits[0].key, "item4");
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = BruteForceIndex::new(3, SimilarityMetric::Cosine);
        match index.add("x", &[1.0, 2.0]) {
            Err(IndexError::DimensionMismatch { expected, got }) => {
                assert_eq!((expected, got), (3, 2))
            }
            other => panic!("Expected DimensionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_auto_index_promotes_to_hnsw() {
        let config = VectorIndexConfig::new(3, SimilarityMetric::Cosine).with_exact_threshold(3);
        let mut index = VectorIndex::new(config);
        for (key, vector) in sample_vectors() {
            index.add(&key, &vector).unwrap();
        }
        assert!(index.uses_hnsw());
        assert_eq!(index.len(), 5);
        let hits = index.search(&[0.0, 0.0, 1.0], 1).unwrap();
        assert_eq!(hits[0].key, "item3");
    }

    #[test]
    fn test_zero_vector_cosine_is_zero() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
