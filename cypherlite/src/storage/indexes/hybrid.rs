// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Hybrid ranking via reciprocal rank fusion (RRF)
//!
//! Each ranked list contributes `weight / (k + rank)` to every item it
//! contains, with 1-based ranks. Items are returned by fused score.

use super::fulltext::FulltextQuery;
use super::ScoredNode;
use std::collections::HashMap;

/// Fusion constant controlling how strongly top ranks dominate
pub const RRF_K: f64 = 60.0;

/// Queries with at most this many terms are treated as keyword lookups
const SHORT_QUERY_TERMS: usize = 3;

/// Queries with at least this many terms are treated as natural language
const LONG_QUERY_TERMS: usize = 8;

/// Relative weights of the fulltext and vector signals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    pub text: f64,
    pub vector: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            text: 0.5,
            vector: 0.5,
        }
    }
}

impl HybridWeights {
    /// Pick weights from the shape of the query text: short or structured
    /// queries lean on keywords, long prose leans on embeddings.
    pub fn adaptive(query_text: &str) -> Self {
        let terms = super::fulltext::tokenize(query_text).len();
        let structured = FulltextQuery::parse(query_text)
            .map(|q| q.is_structured())
            .unwrap_or(false);

        if structured || terms <= SHORT_QUERY_TERMS {
            Self {
                text: 0.7,
                vector: 0.3,
            }
        } else if terms >= LONG_QUERY_TERMS {
            Self {
                text: 0.3,
                vector: 0.7,
            }
        } else {
            Self::default()
        }
    }
}

/// Fuse ranked id lists. `lists` pairs each best-first ranking with its weight.
pub fn reciprocal_rank_fusion(lists: &[(Vec<String>, f64)], k: f64) -> Vec<ScoredNode> {
    let mut fused: HashMap<&str, f64> = HashMap::new();
    for (ranking, weight) in lists {
        for (index, id) in ranking.iter().enumerate() {
            let rank = index as f64 + 1.0;
            *fused.entry(id.as_str()).or_insert(0.0) += weight / (k + rank);
        }
    }

    let mut results: Vec<ScoredNode> = fused
        .into_iter()
        .map(|(id, score)| ScoredNode {
            node_id: id.to_string(),
            score,
        })
        .collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });
    results
}

/// Fuse a fulltext ranking and a vector ranking, keeping the top `limit`
pub fn fuse_hybrid(
    text_ranking: Vec<String>,
    vector_ranking: Vec<String>,
    weights: HybridWeights,
    limit: usize,
) -> Vec<ScoredNode> {
    let mut fused = reciprocal_rank_fusion(
        &[(text_ranking, weights.text), (vector_ranking, weights.vector)],
        RRF_K,
    );
    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rrf_scores() {
        let fused = reciprocal_rank_fusion(
            &[(ids(&["a", "b"]), 1.0), (ids(&["b", "c"]), 1.0)],
            RRF_K,
        );
        assert_eq!(fused[0].node_id, "b");
        let expected_b = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((fused[0].score - expected_b).abs() < 1e-12);
        assert_eq!(fused[1].node_id, "a");
        assert!((fused[1].score - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_weights_shift_ranking() {
        let text = ids(&["t1", "t2"]);
        let vector = ids(&["v1", "v2"]);
        let text_heavy = fuse_hybrid(
            text.clone(),
            vector.clone(),
            HybridWeights { text: 0.9, vector: 0.1 },
            3,
        );
        assert_eq!(text_heavy[0].node_id, "t1");

        let vector_heavy = fuse_hybrid(text, vector, HybridWeights { text: 0.1, vector: 0.9 }, 3);
        assert_eq!(vector_heavy[0].node_id, "v1");
    }

    #[test]
    fn test_adaptive_weights() {
        assert_eq!(HybridWeights::adaptive("graph database").text, 0.7);
        assert_eq!(HybridWeights::adaptive("\"exact phrase\" here now and more").text, 0.7);
        assert_eq!(
            HybridWeights::adaptive("how do I find all the people who know someone in paris").vector,
            0.7
        );
        assert_eq!(
            HybridWeights::adaptive("find people living near paris today"),
            HybridWeights::default()
        );
    }
}
