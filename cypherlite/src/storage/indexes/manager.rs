// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Index manager
//!
//! Owns every secondary index and keeps them in step with node changes. The
//! manager lives inside the locked graph state, so index maintenance happens
//! under the same write lock as the data change it reflects.

use log::{debug, info};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::composite::CompositeIndex;
use super::fulltext::FulltextIndex;
use super::traits::VectorHit;
use super::vector::VectorIndex;
use super::{IndexDefinition, IndexError, IndexKind};
use crate::storage::types::Node;
use crate::storage::{GraphCache, Value};

/// Manager for all indexes in the system
#[derive(Debug, Default)]
pub struct IndexManager {
    definitions: BTreeMap<String, IndexDefinition>,
    composite: HashMap<String, CompositeIndex>,
    vector: HashMap<String, VectorIndex>,
    fulltext: HashMap<String, FulltextIndex>,
}

impl IndexManager {
    /// Create a new index manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index and populate it from the current graph
    pub fn create_index(
        &mut self,
        definition: IndexDefinition,
        graph: &GraphCache,
    ) -> Result<(), IndexError> {
        if self.definitions.contains_key(&definition.name) {
            return Err(IndexError::AlreadyExists(definition.name));
        }
        if definition.kind.properties().is_empty() {
            return Err(IndexError::config(format!(
                "index '{}' must cover at least one property",
                definition.name
            )));
        }

        info!(
            "Creating {} index '{}' on :{}({})",
            definition.kind.type_name(),
            definition.name,
            definition.label,
            definition.kind.properties().join(", ")
        );

        let name = definition.name.clone();
        match &definition.kind {
            IndexKind::Property { properties } => {
                self.composite.insert(
                    name.clone(),
                    CompositeIndex::new(definition.label.clone(), properties.clone()),
                );
            }
            IndexKind::Fulltext { .. } => {
                self.fulltext.insert(name.clone(), FulltextIndex::new());
            }
            IndexKind::Vector { config, .. } => {
                self.vector
                    .insert(name.clone(), VectorIndex::new(config.clone()));
            }
        }
        self.definitions.insert(name.clone(), definition);

        for node_id in graph.node_ids_by_label(&self.definitions[&name].label) {
            if let Some(node) = graph.get_node(&node_id) {
                self.update_one(&name, &node_id, Some(node));
            }
        }
        debug!("Index '{}' populated", name);
        Ok(())
    }

    /// Drop an index by name
    pub fn drop_index(&mut self, name: &str) -> Result<IndexDefinition, IndexError> {
        let definition = self
            .definitions
            .remove(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;
        self.composite.remove(name);
        self.vector.remove(name);
        self.fulltext.remove(name);
        info!("Dropped index '{}'", name);
        Ok(definition)
    }

    pub fn definition(&self, name: &str) -> Option<&IndexDefinition> {
        self.definitions.get(name)
    }

    /// All index definitions, ordered by name
    pub fn definitions(&self) -> Vec<IndexDefinition> {
        self.definitions.values().cloned().collect()
    }

    /// An existing index with the same label and kind, if any
    pub fn find_equivalent(&self, label: &str, kind: &IndexKind) -> Option<&IndexDefinition> {
        self.definitions
            .values()
            .find(|d| d.label == label && d.kind.type_name() == kind.type_name() && d.kind.properties() == kind.properties())
    }

    /// Number of entries held by an index
    pub fn entry_count(&self, name: &str) -> usize {
        if let Some(index) = self.composite.get(name) {
            index.len()
        } else if let Some(index) = self.vector.get(name) {
            index.len()
        } else if let Some(index) = self.fulltext.get(name) {
            index.len()
        } else {
            0
        }
    }

    /// Bring every index in line with a node change. `None` means the node
    /// did not exist before (`old`) or no longer exists (`new`).
    pub fn node_changed(&mut self, node_id: &str, old: Option<&Node>, new: Option<&Node>) {
        let affected: Vec<String> = self
            .definitions
            .values()
            .filter(|d| {
                old.map(|n| n.has_label(&d.label)).unwrap_or(false)
                    || new.map(|n| n.has_label(&d.label)).unwrap_or(false)
            })
            .map(|d| d.name.clone())
            .collect();
        for name in affected {
            self.update_one(&name, node_id, new);
        }
    }

    fn update_one(&mut self, name: &str, node_id: &str, node: Option<&Node>) {
        let definition = match self.definitions.get(name) {
            Some(definition) => definition,
            None => return,
        };
        let node = node.filter(|n| n.has_label(&definition.label));

        match &definition.kind {
            IndexKind::Property { .. } => {
                if let Some(index) = self.composite.get_mut(name) {
                    index.update(node_id, node);
                }
            }
            IndexKind::Fulltext { properties } => {
                if let Some(index) = self.fulltext.get_mut(name) {
                    let text = node.map(|n| document_text(n, properties)).unwrap_or_default();
                    index.index_document(node_id, &text);
                }
            }
            IndexKind::Vector { property, config } => {
                if let Some(index) = self.vector.get_mut(name) {
                    index.remove(node_id);
                    let vector = node
                        .and_then(|n| n.get_property(property))
                        .and_then(Value::to_vector);
                    if let Some(vector) = vector {
                        if vector.len() == config.dimensions {
                            if let Err(e) = index.add(node_id, &vector) {
                                debug!("Skipping vector for node {}: {}", node_id, e);
                            }
                        } else {
                            debug!(
                                "Skipping node {} in vector index '{}': expected {} dimensions, got {}",
                                node_id,
                                name,
                                config.dimensions,
                                vector.len()
                            );
                        }
                    }
                }
            }
        }
    }

    /// Drop all index contents and rebuild them from `graph`
    pub fn rebuild_all(&mut self, graph: &GraphCache) -> Result<(), IndexError> {
        let definitions: Vec<IndexDefinition> = self.definitions.values().cloned().collect();
        self.definitions.clear();
        self.composite.clear();
        self.vector.clear();
        self.fulltext.clear();
        for definition in definitions {
            self.create_index(definition, graph)?;
        }
        Ok(())
    }

    /// The property index on `label` that covers the longest leading run of
    /// `available` properties. Returns the index name and the run length.
    pub fn best_property_index(&self, label: &str, available: &[&str]) -> Option<(String, usize)> {
        self.composite
            .iter()
            .filter(|(_, index)| index.label() == label)
            .map(|(name, index)| {
                let covered = index
                    .properties()
                    .iter()
                    .take_while(|p| available.contains(&p.as_str()))
                    .count();
                (name.clone(), covered)
            })
            .filter(|(_, covered)| *covered > 0)
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
    }

    /// Property names of a composite index in key order
    pub fn property_index_columns(&self, name: &str) -> Option<Vec<String>> {
        self.composite.get(name).map(|i| i.properties().to_vec())
    }

    /// Node ids whose leading indexed properties equal `values`, verified
    /// against the graph so digest collisions never leak through
    pub fn lookup_property(
        &self,
        name: &str,
        graph: &GraphCache,
        values: &[Value],
    ) -> Result<Vec<String>, IndexError> {
        let index = self
            .composite
            .get(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;
        Ok(index
            .lookup_prefix(values)
            .into_iter()
            .filter(|id| {
                graph
                    .get_node(id)
                    .map(|node| index.matches(node, values))
                    .unwrap_or(false)
            })
            .collect())
    }

    /// k-nearest-neighbor search on a vector index
    pub fn vector_search(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<VectorHit>, IndexError> {
        self.vector
            .get(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?
            .search(query, k)
    }

    /// Ranked fulltext search
    pub fn fulltext_search(
        &self,
        name: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, IndexError> {
        self.fulltext
            .get(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?
            .search(query, limit)
    }

    /// k-nearest-neighbor search as seen by a transaction that changed the
    /// nodes in `changes` (`None` images are deletions). Committed hits on
    /// changed nodes are replaced by exact scores of their new images.
    pub fn vector_search_with_changes<'n>(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
        changes: &[(&'n str, Option<&'n Node>)],
    ) -> Result<Vec<VectorHit>, IndexError> {
        if changes.is_empty() {
            return self.vector_search(name, query, k);
        }
        let (label, property, config) = match self.definitions.get(name).map(|d| (&d.label, &d.kind)) {
            Some((label, IndexKind::Vector { property, config })) => (label, property, config),
            _ => return Err(IndexError::NotFound(name.to_string())),
        };
        let committed = self.vector_search(name, query, k.saturating_add(changes.len()))?;

        let changed: HashSet<&str> = changes.iter().map(|(id, _)| *id).collect();
        let mut hits: Vec<VectorHit> = committed
            .into_iter()
            .filter(|hit| !changed.contains(hit.key.as_str()))
            .collect();
        for &(id, image) in changes {
            let vector = image
                .filter(|node| node.has_label(label))
                .and_then(|node| node.get_property(property))
                .and_then(Value::to_vector)
                .filter(|v| v.len() == config.dimensions);
            if let Some(vector) = vector {
                let distance = config.metric.distance(query, &vector);
                hits.push(VectorHit {
                    key: id.to_string(),
                    score: config.metric.score(distance),
                    distance: distance as f64,
                });
            }
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Fulltext search as seen by a transaction that changed the nodes in
    /// `changes`. Term statistics include the uncommitted documents.
    pub fn fulltext_search_with_changes<'n>(
        &self,
        name: &str,
        query: &str,
        limit: usize,
        changes: &[(&'n str, Option<&'n Node>)],
    ) -> Result<Vec<(String, f64)>, IndexError> {
        let index = self
            .fulltext
            .get(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;
        let (label, properties) = match self.definitions.get(name).map(|d| (&d.label, &d.kind)) {
            Some((label, IndexKind::Fulltext { properties })) => (label, properties),
            _ => return Err(IndexError::NotFound(name.to_string())),
        };

        let mut patched: Option<FulltextIndex> = None;
        for &(id, image) in changes {
            let image = image.filter(|node| node.has_label(label));
            if image.is_none() && !index.contains(id) {
                continue;
            }
            let text = image.map(|n| document_text(n, properties)).unwrap_or_default();
            patched
                .get_or_insert_with(|| index.clone())
                .index_document(id, &text);
        }
        patched.as_ref().unwrap_or(index).search(query, limit)
    }
}

/// Concatenate the string content of the indexed properties
fn document_text(node: &Node, properties: &[String]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for property in properties {
        match node.get_property(property) {
            Some(Value::String(s)) => parts.push(s.clone()),
            Some(Value::List(items)) => parts.extend(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string)),
            ),
            _ => {}
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::indexes::{SimilarityMetric, VectorIndexConfig};

    fn doc(id: &str, title: &str, embedding: Vec<f64>) -> Node {
        let mut node = Node::with_labels(id.to_string(), vec!["Doc".to_string()]);
        node.set_property("title".to_string(), Value::from(title));
        node.set_property(
            "embedding".to_string(),
            Value::List(embedding.into_iter().map(Value::Float).collect()),
        );
        node
    }

    fn sample_graph() -> GraphCache {
        let mut graph = GraphCache::new();
        graph.add_node(doc("d1", "graph databases", vec![1.0, 0.0])).unwrap();
        graph.add_node(doc("d2", "vector search", vec![0.0, 1.0])).unwrap();
        graph
    }

    #[test]
    fn test_indexes_populate_from_existing_data() {
        let graph = sample_graph();
        let mut manager = IndexManager::new();
        manager
            .create_index(
                IndexDefinition::property("doc_title", "Doc", vec!["title".to_string()]),
                &graph,
            )
            .unwrap();
        manager
            .create_index(
                IndexDefinition::fulltext("doc_text", "Doc", vec!["title".to_string()]),
                &graph,
            )
            .unwrap();
        manager
            .create_index(
                IndexDefinition::vector(
                    "doc_vec",
                    "Doc",
                    "embedding",
                    VectorIndexConfig::new(2, SimilarityMetric::Cosine),
                ),
                &graph,
            )
            .unwrap();

        assert_eq!(
            manager
                .lookup_property("doc_title", &graph, &[Value::from("vector search")])
                .unwrap(),
            vec!["d2".to_string()]
        );
        assert_eq!(manager.fulltext_search("doc_text", "graph", 5).unwrap()[0].0, "d1");
        assert_eq!(manager.vector_search("doc_vec", &[0.0, 1.0], 1).unwrap()[0].key, "d2");
    }

    #[test]
    fn test_node_changes_are_tracked() {
        let graph = sample_graph();
        let mut manager = IndexManager::new();
        manager
            .create_index(
                IndexDefinition::fulltext("doc_text", "Doc", vec!["title".to_string()]),
                &graph,
            )
            .unwrap();

        let old = graph.get_node("d1").cloned();
        let new = doc("d1", "relational tables", vec![1.0, 0.0]);
        manager.node_changed("d1", old.as_ref(), Some(&new));
        assert!(manager.fulltext_search("doc_text", "graph", 5).unwrap().is_empty());

        manager.node_changed("d1", Some(&new), None);
        assert!(manager.fulltext_search("doc_text", "relational", 5).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_and_missing_indexes() {
        let graph = sample_graph();
        let mut manager = IndexManager::new();
        let definition = IndexDefinition::property("idx", "Doc", vec!["title".to_string()]);
        manager.create_index(definition.clone(), &graph).unwrap();
        assert_eq!(
            manager.create_index(definition, &graph),
            Err(IndexError::AlreadyExists("idx".to_string()))
        );
        assert!(matches!(
            manager.drop_index("nope"),
            Err(IndexError::NotFound(_))
        ));
    }

    #[test]
    fn test_best_property_index_prefers_longest_prefix() {
        let graph = GraphCache::new();
        let mut manager = IndexManager::new();
        manager
            .create_index(
                IndexDefinition::property("by_name", "Person", vec!["name".to_string()]),
                &graph,
            )
            .unwrap();
        manager
            .create_index(
                IndexDefinition::property(
                    "by_name_age",
                    "Person",
                    vec!["name".to_string(), "age".to_string()],
                ),
                &graph,
            )
            .unwrap();
        assert_eq!(
            manager.best_property_index("Person", &["age", "name"]),
            Some(("by_name_age".to_string(), 2))
        );
        assert_eq!(manager.best_property_index("Person", &["age"]), None);
    }
}
