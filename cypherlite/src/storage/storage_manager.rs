// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Storage Manager - owns committed state and the backend mirroring it
//!
//! Architecture:
//! - State: graph cache, indexes and constraints behind one `RwLock`
//! - Backend: `MemoryBackend` or `KvBackend`, written after the WAL
//!
//! Queries take the read lock; commits take the write lock briefly.

use crate::storage::backend::{KvBackend, MemoryBackend, StorageBackend};
use crate::storage::graph_state::{GraphImage, GraphState};
use crate::storage::persistent::create_storage_driver;
use crate::storage::{StorageError, StorageType};
use log::{debug, info};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::path::Path;

/// Storage manager shared by the transaction manager and the executor
pub struct StorageManager {
    state: RwLock<GraphState>,
    backend: Box<dyn StorageBackend>,
}

impl StorageManager {
    /// Storage that lives only in memory
    pub fn in_memory() -> Self {
        Self::with_backend(Box::new(MemoryBackend::new()))
    }

    pub fn with_backend(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            state: RwLock::new(GraphState::new()),
            backend,
        }
    }

    /// Open the backend selected by `storage_type`. Key-value backends keep
    /// their files under `path`.
    pub fn open<P: AsRef<Path>>(path: P, storage_type: StorageType) -> Result<Self, StorageError> {
        info!(
            "Creating storage manager with storage type {} at {:?}",
            storage_type,
            path.as_ref()
        );
        let backend: Box<dyn StorageBackend> = match storage_type {
            StorageType::Memory => Box::new(MemoryBackend::new()),
            StorageType::Sled => {
                std::fs::create_dir_all(path.as_ref())
                    .map_err(|e| StorageError::PersistenceError(e.to_string()))?;
                let driver = create_storage_driver(storage_type, path.as_ref())?;
                Box::new(KvBackend::new(driver)?)
            }
        };
        Ok(Self::with_backend(backend))
    }

    /// Shared access to committed state
    pub fn read(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read()
    }

    /// Exclusive access to committed state
    pub fn write(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.state.write()
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub fn storage_type(&self) -> StorageType {
        self.backend.storage_type()
    }

    /// Replace committed state wholesale, as recovery does
    pub fn install(&self, state: GraphState) {
        *self.state.write() = state;
    }

    /// Consistent image of committed state taken under the read lock
    pub fn image(&self) -> GraphImage {
        self.state.read().to_image()
    }

    pub fn shutdown(&self) -> Result<(), StorageError> {
        debug!("Flushing storage backend during shutdown");
        self.backend.flush()
    }
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("storage_type", &self.backend.storage_type())
            .finish_non_exhaustive()
    }
}
