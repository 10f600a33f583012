// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pluggable storage backends
//!
//! A backend receives every committed batch after it has been made durable
//! in the WAL. `MemoryBackend` keeps nothing of its own; `KvBackend` mirrors
//! nodes, edges and schema definitions into key-value trees and records the
//! WAL sequence it reflects so recovery only replays what it is missing.

use crate::storage::constraints::ConstraintDefinition;
use crate::storage::graph_state::GraphImage;
use crate::storage::indexes::IndexDefinition;
use crate::storage::mutation::Mutation;
use crate::storage::persistent::{BoxedDriver, StorageTree, StorageType};
use crate::storage::types::{Edge, Node, StorageError};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

const NODES_TREE: &str = "nodes";
const EDGES_TREE: &str = "edges";
const SCHEMA_TREE: &str = "schema";
const META_TREE: &str = "meta";

const APPLIED_SEQ_KEY: &[u8] = b"applied_seq";
const INDEX_PREFIX: &str = "index:";
const CONSTRAINT_PREFIX: &str = "constraint:";

/// Interface shared by all storage backends
pub trait StorageBackend: Send + Sync {
    fn storage_type(&self) -> StorageType;

    /// The persisted image and the WAL sequence it reflects, if any
    fn load(&self) -> Result<Option<(GraphImage, u64)>, StorageError>;

    /// Mirror one committed batch whose commit record carries `seq`
    fn persist(&self, mutations: &[Mutation], seq: u64) -> Result<(), StorageError>;

    /// Replace everything stored with `image`
    fn store_image(&self, image: &GraphImage, seq: u64) -> Result<(), StorageError>;

    fn flush(&self) -> Result<(), StorageError>;
}

/// Backend that keeps no state outside the graph cache
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl MemoryBackend {
    pub fn new() -> Self {
        Self
    }
}

impl StorageBackend for MemoryBackend {
    fn storage_type(&self) -> StorageType {
        StorageType::Memory
    }

    fn load(&self) -> Result<Option<(GraphImage, u64)>, StorageError> {
        Ok(None)
    }

    fn persist(&self, _mutations: &[Mutation], _seq: u64) -> Result<(), StorageError> {
        Ok(())
    }

    fn store_image(&self, _image: &GraphImage, _seq: u64) -> Result<(), StorageError> {
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Backend mirroring committed state into key-value trees
pub struct KvBackend {
    driver: BoxedDriver,
    nodes: Box<dyn StorageTree>,
    edges: Box<dyn StorageTree>,
    schema: Box<dyn StorageTree>,
    meta: Box<dyn StorageTree>,
}

impl KvBackend {
    pub fn new(driver: BoxedDriver) -> Result<Self, StorageError> {
        let nodes = driver.open_tree(NODES_TREE)?;
        let edges = driver.open_tree(EDGES_TREE)?;
        let schema = driver.open_tree(SCHEMA_TREE)?;
        let meta = driver.open_tree(META_TREE)?;
        info!("Opened {} key-value backend", driver.storage_type());
        Ok(Self {
            driver,
            nodes,
            edges,
            schema,
            meta,
        })
    }

    /// Sequence of the last batch mirrored, 0 when nothing has been stored
    pub fn applied_seq(&self) -> Result<u64, StorageError> {
        match self.meta.get(APPLIED_SEQ_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StorageError::PersistenceError("corrupt applied_seq record".to_string())
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    fn read_tree<T: DeserializeOwned>(
        tree: &dyn StorageTree,
        prefix: Option<&str>,
    ) -> Result<Vec<T>, StorageError> {
        let mut items = Vec::new();
        for entry in tree.iter()? {
            let (key, value) = entry?;
            if let Some(prefix) = prefix {
                if !key.starts_with(prefix.as_bytes()) {
                    continue;
                }
            }
            items.push(decode(&value)?);
        }
        Ok(items)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| StorageError::PersistenceError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::PersistenceError(e.to_string()))
}

/// Final state of each touched key within one batch
#[derive(Default)]
struct TreeChanges {
    keys: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl TreeChanges {
    fn put(&mut self, key: &str, value: Vec<u8>) {
        self.keys.insert(key.as_bytes().to_vec(), Some(value));
    }

    fn delete(&mut self, key: &str) {
        self.keys.insert(key.as_bytes().to_vec(), None);
    }

    fn write_to(&self, tree: &dyn StorageTree) -> Result<(), StorageError> {
        if self.keys.is_empty() {
            return Ok(());
        }
        let mut inserts: Vec<(&[u8], &[u8])> = Vec::new();
        let mut removals: Vec<&[u8]> = Vec::new();
        for (key, value) in &self.keys {
            match value {
                Some(value) => inserts.push((key.as_slice(), value.as_slice())),
                None => removals.push(key.as_slice()),
            }
        }
        tree.apply_batch(&inserts, &removals)?;
        Ok(())
    }
}

impl StorageBackend for KvBackend {
    fn storage_type(&self) -> StorageType {
        self.driver.storage_type()
    }

    fn load(&self) -> Result<Option<(GraphImage, u64)>, StorageError> {
        let seq = self.applied_seq()?;
        if seq == 0 && self.nodes.is_empty()? && self.schema.is_empty()? {
            return Ok(None);
        }
        let image = GraphImage {
            nodes: Self::read_tree::<Node>(self.nodes.as_ref(), None)?,
            edges: Self::read_tree::<Edge>(self.edges.as_ref(), None)?,
            indexes: Self::read_tree::<IndexDefinition>(self.schema.as_ref(), Some(INDEX_PREFIX))?,
            constraints: Self::read_tree::<ConstraintDefinition>(
                self.schema.as_ref(),
                Some(CONSTRAINT_PREFIX),
            )?,
        };
        debug!(
            "Loaded key-value image: {} nodes, {} relationships at seq {}",
            image.nodes.len(),
            image.edges.len(),
            seq
        );
        Ok(Some((image, seq)))
    }

    fn persist(&self, mutations: &[Mutation], seq: u64) -> Result<(), StorageError> {
        let mut nodes = TreeChanges::default();
        let mut edges = TreeChanges::default();
        let mut schema = TreeChanges::default();

        for mutation in mutations {
            match mutation {
                Mutation::CreateNode(node) | Mutation::UpdateNode(node) => {
                    nodes.put(&node.id, encode(node)?)
                }
                Mutation::DeleteNode(id) => nodes.delete(id),
                Mutation::CreateEdge(edge) | Mutation::UpdateEdge(edge) => {
                    edges.put(&edge.id, encode(edge)?)
                }
                Mutation::DeleteEdge(id) => edges.delete(id),
                Mutation::CreateIndex(definition) => schema.put(
                    &format!("{}{}", INDEX_PREFIX, definition.name),
                    encode(definition)?,
                ),
                Mutation::DropIndex(name) => schema.delete(&format!("{}{}", INDEX_PREFIX, name)),
                Mutation::CreateConstraint(constraint) => {
                    schema.put(
                        &format!("{}{}", CONSTRAINT_PREFIX, constraint.name),
                        encode(constraint)?,
                    );
                    let mut backing = IndexDefinition::property(
                        constraint.backing_index_name(),
                        constraint.label.clone(),
                        vec![constraint.property.clone()],
                    );
                    backing.owning_constraint = Some(constraint.name.clone());
                    schema.put(
                        &format!("{}{}", INDEX_PREFIX, backing.name),
                        encode(&backing)?,
                    );
                }
                Mutation::DropConstraint(name) => {
                    schema.delete(&format!("{}{}", CONSTRAINT_PREFIX, name));
                    schema.delete(&format!("{}{}_index", INDEX_PREFIX, name));
                }
            }
        }

        nodes.write_to(self.nodes.as_ref())?;
        edges.write_to(self.edges.as_ref())?;
        schema.write_to(self.schema.as_ref())?;
        self.meta.insert(APPLIED_SEQ_KEY, &seq.to_be_bytes())?;
        Ok(())
    }

    fn store_image(&self, image: &GraphImage, seq: u64) -> Result<(), StorageError> {
        self.nodes.clear()?;
        self.edges.clear()?;
        self.schema.clear()?;

        let mut nodes = TreeChanges::default();
        for node in &image.nodes {
            nodes.put(&node.id, encode(node)?);
        }
        let mut edges = TreeChanges::default();
        for edge in &image.edges {
            edges.put(&edge.id, encode(edge)?);
        }
        let mut schema = TreeChanges::default();
        for definition in &image.indexes {
            schema.put(&format!("{}{}", INDEX_PREFIX, definition.name), encode(definition)?);
        }
        for constraint in &image.constraints {
            schema.put(
                &format!("{}{}", CONSTRAINT_PREFIX, constraint.name),
                encode(constraint)?,
            );
        }

        nodes.write_to(self.nodes.as_ref())?;
        edges.write_to(self.edges.as_ref())?;
        schema.write_to(self.schema.as_ref())?;
        self.meta.insert(APPLIED_SEQ_KEY, &seq.to_be_bytes())?;
        self.flush()?;
        info!(
            "Stored key-value image of {} nodes and {} relationships at seq {}",
            image.nodes.len(),
            image.edges.len(),
            seq
        );
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.driver.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for KvBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvBackend")
            .field("storage_type", &self.driver.storage_type())
            .finish_non_exhaustive()
    }
}
