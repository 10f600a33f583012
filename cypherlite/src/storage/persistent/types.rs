// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Backend selection and key-value driver errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage backend selection
///
/// `Memory` keeps committed state only in the graph cache and relies on the
/// WAL and snapshots for durability. `Sled` additionally mirrors every commit
/// into an embedded key-value store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Sled - Pure Rust embedded database
    Sled,

    /// Memory - graph cache plus WAL/snapshots
    Memory,
}

impl Default for StorageType {
    fn default() -> Self {
        StorageType::Memory
    }
}

impl std::str::FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sled" | "kv" => Ok(StorageType::Sled),
            "memory" => Ok(StorageType::Memory),
            _ => Err(format!(
                "Unknown storage type: {}. Valid options: sled, memory",
                s
            )),
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StorageType::Sled => "sled",
            StorageType::Memory => "memory",
        };
        write!(f, "{}", name)
    }
}

/// Failures of the key-value layer, converted from the engine's own errors
/// at the driver boundary
#[derive(Error, Debug)]
pub enum StorageDriverError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// Engine-specific failure reported by sled
    #[error("Storage driver error: {0}")]
    BackendSpecific(String),

    /// The requested driver is not compiled in
    #[error("Unsupported storage driver: {0}")]
    Unsupported(String),
}

impl From<bincode::Error> for StorageDriverError {
    fn from(e: bincode::Error) -> Self {
        StorageDriverError::SerializationError(e.to_string())
    }
}

impl From<StorageDriverError> for crate::storage::StorageError {
    fn from(e: StorageDriverError) -> Self {
        crate::storage::StorageError::PersistenceError(e.to_string())
    }
}

/// Result type for storage driver operations
pub type StorageResult<T> = Result<T, StorageDriverError>;
