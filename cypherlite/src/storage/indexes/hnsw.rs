// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Hierarchical navigable small-world (HNSW) index
//!
//! Each vector is assigned a random top layer drawn from an exponential
//! distribution. Search descends greedily through the upper layers and runs
//! a beam search of width `ef` on layer 0. Removal leaves a tombstone so the
//! graph stays navigable; the graph is rebuilt once tombstones outnumber
//! live entries.

use super::traits::{NearestNeighborIndex, VectorHit};
use super::{HnswParams, IndexError, SimilarityMetric};
use log::debug;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

const MAX_LEVEL: usize = 16;
const MIN_TOMBSTONES_FOR_REBUILD: usize = 32;

#[derive(Debug, Clone)]
struct HnswNode {
    key: String,
    vector: Vec<f32>,
    /// neighbors[level] = slots linked on that level
    neighbors: Vec<Vec<usize>>,
    deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    distance: f32,
    slot: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.slot.cmp(&other.slot))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Approximate nearest-neighbor index
#[derive(Debug, Clone)]
pub struct HnswIndex {
    dimensions: usize,
    metric: SimilarityMetric,
    params: HnswParams,
    nodes: Vec<HnswNode>,
    slots: HashMap<String, usize>,
    entry_point: Option<usize>,
    max_level: usize,
    level_mult: f64,
    rng: fastrand::Rng,
    tombstones: usize,
}

impl HnswIndex {
    pub fn new(dimensions: usize, metric: SimilarityMetric, params: HnswParams) -> Self {
        let level_mult = 1.0 / (params.m.max(2) as f64).ln();
        let rng = fastrand::Rng::with_seed(params.seed);
        Self {
            dimensions,
            metric,
            params,
            nodes: Vec::new(),
            slots: HashMap::new(),
            entry_point: None,
            max_level: 0,
            level_mult,
            rng,
            tombstones: 0,
        }
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    fn max_connections(&self, level: usize) -> usize {
        if level == 0 {
            self.params.m * 2
        } else {
            self.params.m
        }
    }

    fn random_level(&mut self) -> usize {
        let uniform = 1.0 - self.rng.f64();
        let level = (-uniform.ln() * self.level_mult).floor() as usize;
        level.min(MAX_LEVEL)
    }

    fn distance_to(&self, query: &[f32], slot: usize) -> f32 {
        self.metric.distance(query, &self.nodes[slot].vector)
    }

    /// Beam search on one layer. Returns up to `ef` candidates sorted closest first.
    fn search_layer(&self, query: &[f32], entry: &[usize], ef: usize, level: usize) -> Vec<Candidate> {
        let mut visited: HashSet<usize> = entry.iter().copied().collect();
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut best: BinaryHeap<Candidate> = BinaryHeap::new();

        for &slot in entry {
            let candidate = Candidate {
                distance: self.distance_to(query, slot),
                slot,
            };
            frontier.push(Reverse(candidate));
            best.push(candidate);
        }

        while let Some(Reverse(current)) = frontier.pop() {
            if let Some(worst) = best.peek() {
                if best.len() >= ef && current.distance > worst.distance {
                    break;
                }
            }

            let links = match self.nodes[current.slot].neighbors.get(level) {
                Some(links) => links,
                None => continue,
            };
            for &neighbor in links {
                if !visited.insert(neighbor) {
                    continue;
                }
                let candidate = Candidate {
                    distance: self.distance_to(query, neighbor),
                    slot: neighbor,
                };
                let admit = best.len() < ef
                    || best
                        .peek()
                        .map(|worst| candidate.distance < worst.distance)
                        .unwrap_or(true);
                if admit {
                    frontier.push(Reverse(candidate));
                    best.push(candidate);
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        best.into_sorted_vec()
    }

    fn greedy_descend(&self, query: &[f32], mut entry: usize, from: usize, to: usize) -> usize {
        for level in (to..=from).rev() {
            if let Some(closest) = self.search_layer(query, &[entry], 1, level).first() {
                entry = closest.slot;
            }
        }
        entry
    }

    /// Keep the `limit` links of `slot` on `level` that are closest to it
    fn prune(&mut self, slot: usize, level: usize, limit: usize) {
        let base = self.nodes[slot].vector.clone();
        let mut links: Vec<Candidate> = self.nodes[slot].neighbors[level]
            .iter()
            .map(|&n| Candidate {
                distance: self.metric.distance(&base, &self.nodes[n].vector),
                slot: n,
            })
            .collect();
        links.sort();
        links.truncate(limit);
        self.nodes[slot].neighbors[level] = links.into_iter().map(|c| c.slot).collect();
    }

    fn insert_new(&mut self, key: &str, vector: &[f32]) {
        let level = self.random_level();
        let slot = self.nodes.len();
        self.nodes.push(HnswNode {
            key: key.to_string(),
            vector: vector.to_vec(),
            neighbors: vec![Vec::new(); level + 1],
            deleted: false,
        });
        self.slots.insert(key.to_string(), slot);

        let entry = match self.entry_point {
            Some(entry) => entry,
            None => {
                self.entry_point = Some(slot);
                self.max_level = level;
                return;
            }
        };

        let mut nearest = if level < self.max_level {
            self.greedy_descend(vector, entry, self.max_level, level + 1)
        } else {
            entry
        };

        for lc in (0..=level.min(self.max_level)).rev() {
            let candidates =
                self.search_layer(vector, &[nearest], self.params.ef_construction, lc);
            let selected: Vec<usize> = candidates
                .iter()
                .filter(|c| c.slot != slot && !self.nodes[c.slot].deleted)
                .take(self.params.m)
                .map(|c| c.slot)
                .collect();

            let limit = self.max_connections(lc);
            for &neighbor in &selected {
                if self.nodes[neighbor].neighbors.len() <= lc {
                    continue;
                }
                self.nodes[neighbor].neighbors[lc].push(slot);
                if self.nodes[neighbor].neighbors[lc].len() > limit {
                    self.prune(neighbor, lc, limit);
                }
            }
            self.nodes[slot].neighbors[lc] = selected;

            if let Some(closest) = candidates.first() {
                nearest = closest.slot;
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(slot);
        }
    }

    fn reassign_entry_point(&mut self) {
        let best = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.deleted)
            .max_by_key(|(slot, n)| (n.neighbors.len(), Reverse(*slot)));
        match best {
            Some((slot, node)) => {
                self.entry_point = Some(slot);
                self.max_level = node.neighbors.len() - 1;
            }
            None => {
                self.entry_point = None;
                self.max_level = 0;
            }
        }
    }

    /// Rebuild the graph from live entries, dropping tombstones
    pub fn rebuild(&mut self) {
        let live = self.entries();
        debug!(
            "Rebuilding HNSW graph: {} live, {} tombstones",
            live.len(),
            self.tombstones
        );
        self.nodes.clear();
        self.slots.clear();
        self.entry_point = None;
        self.max_level = 0;
        self.tombstones = 0;
        self.rng = fastrand::Rng::with_seed(self.params.seed);
        for (key, vector) in live {
            self.insert_new(&key, &vector);
        }
    }
}

impl NearestNeighborIndex for HnswIndex {
    fn add(&mut self, key: &str, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        self.remove(key);
        self.insert_new(key, vector);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> bool {
        let slot = match self.slots.remove(key) {
            Some(slot) => slot,
            None => return false,
        };
        self.nodes[slot].deleted = true;
        self.tombstones += 1;

        if self.entry_point == Some(slot) {
            self.reassign_entry_point();
        }
        if self.tombstones >= MIN_TOMBSTONES_FOR_REBUILD && self.tombstones > self.slots.len() {
            self.rebuild();
        }
        true
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }
        let entry = match self.entry_point {
            Some(entry) if k > 0 => entry,
            _ => return Ok(Vec::new()),
        };

        let entry = if self.max_level > 0 {
            self.greedy_descend(query, entry, self.max_level, 1)
        } else {
            entry
        };
        let ef = self.params.ef_search.max(k) + self.tombstones.min(self.params.ef_search);
        let found = self.search_layer(query, &[entry], ef, 0);

        Ok(found
            .into_iter()
            .filter(|c| !self.nodes[c.slot].deleted)
            .take(k)
            .map(|c| VectorHit {
                key: self.nodes[c.slot].key.clone(),
                score: self.metric.score(c.distance),
                distance: c.distance as f64,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    fn entries(&self) -> Vec<(String, Vec<f32>)> {
        self.nodes
            .iter()
            .filter(|n| !n.deleted)
            .map(|n| (n.key.clone(), n.vector.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::indexes::vector::BruteForceIndex;

    fn random_vectors(count: usize, dims: usize, seed: u64) -> Vec<(String, Vec<f32>)> {
        let mut rng = fastrand::Rng::with_seed(seed);
        (0..count)
            .map(|i| {
                let v: Vec<f32> = (0..dims).map(|_| rng.f32() * 2.0 - 1.0).collect();
                (format!("v{}", i), v)
            })
            .collect()
    }

    #[test]
    fn test_self_match_is_top_ranked() {
        let mut index = HnswIndex::new(8, SimilarityMetric::Cosine, HnswParams::default());
        let vectors = random_vectors(300, 8, 7);
        for (key, vector) in &vectors {
            index.add(key, vector).unwrap();
        }
        for (key, vector) in vectors.iter().step_by(37) {
            let hits = index.search(vector, 1).unwrap();
            assert_eq!(&hits[0].key, key);
            assert!((hits[0].score - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_recall_against_brute_force() {
        let params = HnswParams::default().with_ef_search(100);
        let mut hnsw = HnswIndex::new(8, SimilarityMetric::Euclidean, params);
        let mut exact = BruteForceIndex::new(8, SimilarityMetric::Euclidean);
        for (key, vector) in random_vectors(400, 8, 11) {
            hnsw.add(&key, &vector).unwrap();
            exact.add(&key, &vector).unwrap();
        }

        let mut found = 0;
        let mut total = 0;
        for (_, query) in random_vectors(20, 8, 99) {
            let truth: HashSet<String> = exact
                .search(&query, 10)
                .unwrap()
                .into_iter()
                .map(|h| h.key)
                .collect();
            let approx = hnsw.search(&query, 10).unwrap();
            total += truth.len();
            found += approx.iter().filter(|h| truth.contains(&h.key)).count();
        }
        let recall = found as f64 / total as f64;
        assert!(recall >= 0.8, "recall too low: {}", recall);
    }

    #[test]
    fn test_remove_hides_entry_and_rebuilds() {
        let mut index = HnswIndex::new(4, SimilarityMetric::Euclidean, HnswParams::default());
        let vectors = random_vectors(100, 4, 3);
        for (key, vector) in &vectors {
            index.add(key, vector).unwrap();
        }
        for (key, _) in vectors.iter().take(60) {
            assert!(index.remove(key));
        }
        assert_eq!(index.len(), 40);
        assert!(!index.remove("v0"));

        let (key, vector) = &vectors[80];
        let hits = index.search(vector, 5).unwrap();
        assert_eq!(&hits[0].key, key);
        assert!(hits.iter().all(|h| h.key != "v0"));
    }

    #[test]
    fn test_empty_index_search() {
        let index = HnswIndex::new(2, SimilarityMetric::Cosine, HnswParams::default());
        assert!(index.search(&[1.0, 0.0], 3).unwrap().is_empty());
    }
}
