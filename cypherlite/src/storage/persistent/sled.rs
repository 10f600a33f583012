// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Sled storage driver implementation

use super::traits::{StorageDriver, StorageTree, TreeIter};
use super::types::{StorageDriverError, StorageResult, StorageType};
use std::path::Path;

/// Sled driver implementation
pub struct SledDriver {
    db: sled::Db,
}

/// Sled tree wrapper that implements StorageTree trait
pub struct SledTree {
    tree: sled::Tree,
}

fn backend_error(e: sled::Error) -> StorageDriverError {
    StorageDriverError::BackendSpecific(e.to_string())
}

impl StorageTree for SledTree {
    fn insert(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.tree.insert(key, value).map_err(backend_error)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.tree
            .get(key)
            .map_err(backend_error)
            .map(|opt| opt.map(|v| v.to_vec()))
    }

    fn remove(&self, key: &[u8]) -> StorageResult<()> {
        self.tree.remove(key).map_err(backend_error)?;
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.tree.clear().map_err(backend_error)
    }

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.tree.is_empty())
    }

    fn iter(&self) -> StorageResult<TreeIter<'_>> {
        let iter = self.tree.iter().map(|result| {
            result
                .map(|(k, v)| (k.to_vec(), v.to_vec()))
                .map_err(backend_error)
        });
        Ok(Box::new(iter))
    }

    fn apply_batch(&self, inserts: &[(&[u8], &[u8])], removals: &[&[u8]]) -> StorageResult<()> {
        let mut batch = sled::Batch::default();
        for (key, value) in inserts {
            batch.insert(*key, *value);
        }
        for key in removals {
            batch.remove(*key);
        }
        self.tree.apply_batch(batch).map_err(backend_error)
    }

    fn flush(&self) -> StorageResult<()> {
        self.tree.flush().map_err(backend_error)?;
        Ok(())
    }
}

impl StorageDriver for SledDriver {
    type Tree = Box<dyn StorageTree>;

    fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = sled::open(path).map_err(backend_error)?;
        Ok(SledDriver { db })
    }

    fn open_tree(&self, name: &str) -> StorageResult<Self::Tree> {
        let tree = self.db.open_tree(name).map_err(backend_error)?;
        Ok(Box::new(SledTree { tree }) as Box<dyn StorageTree>)
    }

    fn list_trees(&self) -> StorageResult<Vec<String>> {
        let tree_names = self
            .db
            .tree_names()
            .into_iter()
            .map(|name| String::from_utf8_lossy(&name).to_string())
            .collect();
        Ok(tree_names)
    }

    fn flush(&self) -> StorageResult<()> {
        self.db.flush().map_err(backend_error)?;
        Ok(())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Sled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sled_tree_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let driver = SledDriver::open(temp_dir.path()).unwrap();
            let tree = driver.open_tree("nodes").unwrap();
            tree.apply_batch(&[(&b"n1"[..], &b"alice"[..])], &[])
                .unwrap();
            driver.flush().unwrap();
        }
        let driver = SledDriver::open(temp_dir.path()).unwrap();
        let tree = driver.open_tree("nodes").unwrap();
        assert_eq!(tree.get(b"n1").unwrap(), Some(b"alice".to_vec()));
    }
}
