// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory storage driver implementation for testing

use super::traits::{StorageDriver, StorageTree, TreeIter};
use super::types::{StorageResult, StorageType};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// In-memory storage driver for testing
#[derive(Default)]
pub struct MemoryStorageDriver {
    trees: Arc<RwLock<HashMap<String, Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>>>>,
}

/// In-memory tree implementation, ordered like an on-disk tree
pub struct MemoryTree {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStorageDriver {
    /// Create a new memory storage driver
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageTree for MemoryTree {
    fn insert(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn remove(&self, key: &[u8]) -> StorageResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.data.write().clear();
        Ok(())
    }

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.data.read().is_empty())
    }

    fn iter(&self) -> StorageResult<TreeIter<'_>> {
        let data = self.data.read();
        let items: Vec<_> = data
            .iter()
            .map(|(k, v)| Ok((k.clone(), v.clone())))
            .collect();
        Ok(Box::new(items.into_iter()))
    }

    fn apply_batch(&self, inserts: &[(&[u8], &[u8])], removals: &[&[u8]]) -> StorageResult<()> {
        let mut data = self.data.write();
        for (key, value) in inserts {
            data.insert(key.to_vec(), value.to_vec());
        }
        for key in removals {
            data.remove(*key);
        }
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        // No-op for memory storage
        Ok(())
    }
}

impl StorageDriver for MemoryStorageDriver {
    type Tree = Box<dyn StorageTree>;

    fn open<P: AsRef<Path>>(_path: P) -> StorageResult<Self> {
        Ok(Self::new())
    }

    fn open_tree(&self, name: &str) -> StorageResult<Self::Tree> {
        let mut trees = self.trees.write();
        let data = trees
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(BTreeMap::new())))
            .clone();
        Ok(Box::new(MemoryTree { data }) as Box<dyn StorageTree>)
    }

    fn list_trees(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self.trees.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn flush(&self) -> StorageResult<()> {
        // No-op for memory storage
        Ok(())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trees_share_data() {
        let driver = MemoryStorageDriver::new();
        let a = driver.open_tree("nodes").unwrap();
        a.insert(b"k1", b"v1").unwrap();

        let b = driver.open_tree("nodes").unwrap();
        assert_eq!(b.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(driver.list_trees().unwrap(), vec!["nodes".to_string()]);
    }

    #[test]
    fn test_apply_batch() {
        let driver = MemoryStorageDriver::new();
        let tree = driver.open_tree("t").unwrap();
        tree.insert(b"old", b"x").unwrap();
        tree.apply_batch(
            &[(&b"b"[..], &b"2"[..]), (&b"a"[..], &b"1"[..])],
            &[&b"old"[..]],
        )
        .unwrap();

        let keys: Vec<Vec<u8>> = tree.iter().unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
