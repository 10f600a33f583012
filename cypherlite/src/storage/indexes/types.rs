// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Type definitions for the indexing system

use super::IndexError;
use crate::storage::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Similarity metric used by vector indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
}

impl FromStr for SimilarityMetric {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(SimilarityMetric::Cosine),
            "euclidean" | "l2" => Ok(SimilarityMetric::Euclidean),
            "dot" | "dot_product" | "dotproduct" | "inner_product" => {
                Ok(SimilarityMetric::DotProduct)
            }
            other => Err(IndexError::config(format!(
                "Unknown similarity metric: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Cosine => write!(f, "cosine"),
            SimilarityMetric::Euclidean => write!(f, "euclidean"),
            SimilarityMetric::DotProduct => write!(f, "dot_product"),
        }
    }
}

/// Which vector search tier backs an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VectorIndexKind {
    /// Full pairwise comparison
    Exact,
    /// Hierarchical navigable small-world graph
    Hnsw,
    /// Exact until the index grows past a threshold, then HNSW
    #[default]
    Auto,
}

impl FromStr for VectorIndexKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" | "flat" | "brute_force" => Ok(VectorIndexKind::Exact),
            "hnsw" => Ok(VectorIndexKind::Hnsw),
            "auto" => Ok(VectorIndexKind::Auto),
            other => Err(IndexError::config(format!(
                "Unknown vector index type: {}",
                other
            ))),
        }
    }
}

/// HNSW construction and search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Maximum connections per node on upper layers (layer 0 allows 2*m)
    pub m: usize,
    /// Candidate list size while inserting
    pub ef_construction: usize,
    /// Candidate list size while searching
    pub ef_search: usize,
    /// Seed for level generation
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 128,
            ef_search: 64,
            seed: 0x5eed,
        }
    }
}

impl HnswParams {
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m.max(2);
        self
    }

    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef.max(1);
        self
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Vector index configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    pub dimensions: usize,
    pub metric: SimilarityMetric,
    pub kind: VectorIndexKind,
    pub hnsw: HnswParams,
    /// Size at which an `Auto` index switches from exact to HNSW
    pub exact_threshold: usize,
}

impl VectorIndexConfig {
    pub fn new(dimensions: usize, metric: SimilarityMetric) -> Self {
        Self {
            dimensions,
            metric,
            kind: VectorIndexKind::Auto,
            hnsw: HnswParams::default(),
            exact_threshold: 1_000,
        }
    }

    pub fn with_kind(mut self, kind: VectorIndexKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_hnsw(mut self, hnsw: HnswParams) -> Self {
        self.hnsw = hnsw;
        self
    }

    pub fn with_exact_threshold(mut self, threshold: usize) -> Self {
        self.exact_threshold = threshold;
        self
    }

    /// Build a configuration from a Cypher `OPTIONS {...}` map.
    ///
    /// Accepts both flat keys (`dimensions`, `similarity`) and the nested
    /// `indexConfig: {`vector.dimensions`: ..}` form.
    pub fn from_options(
        options: &BTreeMap<String, Value>,
        exact_threshold: usize,
    ) -> Result<Self, IndexError> {
        let mut flat: BTreeMap<String, Value> = BTreeMap::new();
        for (key, value) in options {
            if let Value::Map(nested) = value {
                for (k, v) in nested {
                    flat.insert(normalize_option_key(k), v.clone());
                }
            } else {
                flat.insert(normalize_option_key(key), value.clone());
            }
        }

        let dimensions = flat
            .get("dimensions")
            .and_then(Value::as_integer)
            .filter(|d| *d > 0)
            .ok_or_else(|| IndexError::config("vector index requires positive 'dimensions'"))?
            as usize;

        let metric = match flat.get("similarity").or_else(|| flat.get("metric")) {
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(IndexError::config(format!(
                    "similarity must be a string, got {}",
                    other.type_name()
                )))
            }
            None => SimilarityMetric::Cosine,
        };

        let kind = match flat.get("type") {
            Some(Value::String(s)) => s.parse()?,
            _ => VectorIndexKind::Auto,
        };

        let mut hnsw = HnswParams::default();
        if let Some(m) = flat.get("m").and_then(Value::as_integer) {
            hnsw = hnsw.with_m(m.max(0) as usize);
        }
        if let Some(ef) = flat.get("ef_construction").and_then(Value::as_integer) {
            hnsw = hnsw.with_ef_construction(ef.max(0) as usize);
        }
        if let Some(ef) = flat.get("ef_search").and_then(Value::as_integer) {
            hnsw = hnsw.with_ef_search(ef.max(0) as usize);
        }

        Ok(Self::new(dimensions, metric)
            .with_kind(kind)
            .with_hnsw(hnsw)
            .with_exact_threshold(exact_threshold))
    }
}

fn normalize_option_key(key: &str) -> String {
    let key = key.trim_start_matches("vector.").trim_start_matches("hnsw.");
    match key {
        "similarity_function" | "similarityFunction" => "similarity".to_string(),
        "efConstruction" => "ef_construction".to_string(),
        "efSearch" => "ef_search".to_string(),
        "indexType" => "type".to_string(),
        other => other.to_string(),
    }
}

/// Kind of secondary index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexKind {
    /// Composite property index over one or more properties
    Property { properties: Vec<String> },
    /// TF-IDF keyword index over string properties
    Fulltext { properties: Vec<String> },
    /// Nearest-neighbor index over a list-of-floats property
    Vector {
        property: String,
        config: VectorIndexConfig,
    },
}

impl IndexKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            IndexKind::Property { .. } => "RANGE",
            IndexKind::Fulltext { .. } => "FULLTEXT",
            IndexKind::Vector { .. } => "VECTOR",
        }
    }

    pub fn properties(&self) -> Vec<String> {
        match self {
            IndexKind::Property { properties } | IndexKind::Fulltext { properties } => {
                properties.clone()
            }
            IndexKind::Vector { property, .. } => vec![property.clone()],
        }
    }
}

/// Persisted definition of an index. Index contents are always derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub label: String,
    pub kind: IndexKind,
    /// Set when the index backs a uniqueness constraint
    pub owning_constraint: Option<String>,
}

impl IndexDefinition {
    pub fn property(name: impl Into<String>, label: impl Into<String>, properties: Vec<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: IndexKind::Property { properties },
            owning_constraint: None,
        }
    }

    pub fn fulltext(name: impl Into<String>, label: impl Into<String>, properties: Vec<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: IndexKind::Fulltext { properties },
            owning_constraint: None,
        }
    }

    pub fn vector(
        name: impl Into<String>,
        label: impl Into<String>,
        property: impl Into<String>,
        config: VectorIndexConfig,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: IndexKind::Vector {
                property: property.into(),
                config,
            },
            owning_constraint: None,
        }
    }

    /// Default name in the style `index_person_name_age`
    pub fn default_name(prefix: &str, label: &str, properties: &[String]) -> String {
        let mut name = format!("{}_{}", prefix, label.to_lowercase());
        for property in properties {
            name.push('_');
            name.push_str(&property.to_lowercase());
        }
        name
    }
}

/// A scored hit returned by vector, fulltext and hybrid search
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredNode {
    pub node_id: String,
    pub score: f64,
}
