// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Database configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::storage::StorageType;
use crate::txn::{CompactionConfig, WalConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for opening a database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Directory holding the WAL, snapshots and key-value files. Without it
    /// the database lives only in memory.
    pub data_dir: Option<PathBuf>,

    /// Backend mirroring committed state
    pub storage_type: StorageType,

    /// Write-ahead log segments and sync mode
    pub wal: WalConfig,

    /// Background snapshot-and-truncate
    pub compaction: CompactionConfig,

    /// Default per-query timeout
    pub query_timeout_ms: Option<u64>,

    /// Undelivered events held before new ones are dropped
    pub event_queue_capacity: usize,

    /// Vector indexes in `auto` mode stay exact below this many entries
    pub vector_exact_threshold: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            storage_type: StorageType::Memory,
            wal: WalConfig::default(),
            compaction: CompactionConfig::default(),
            query_timeout_ms: None,
            event_queue_capacity: 1024,
            vector_exact_threshold: 1_000,
        }
    }
}

impl DatabaseConfig {
    /// Volatile database with no data directory
    pub fn in_memory() -> Self {
        Self {
            compaction: CompactionConfig::disabled(),
            ..Self::default()
        }
    }

    /// Durable database under `path`
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            data_dir: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_data_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.data_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    pub fn with_wal(mut self, wal: WalConfig) -> Self {
        self.wal = wal;
        self
    }

    pub fn with_compaction(mut self, compaction: CompactionConfig) -> Self {
        self.compaction = compaction;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    pub fn with_vector_exact_threshold(mut self, threshold: usize) -> Self {
        self.vector_exact_threshold = threshold;
        self
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_type == StorageType::Sled && self.data_dir.is_none() {
            return Err(ConfigError::Invalid(
                "the sled backend needs a data_dir".to_string(),
            ));
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_queue_capacity must be positive".to_string(),
            ));
        }
        if self.wal.max_segment_bytes == 0 || self.wal.max_segment_records == 0 {
            return Err(ConfigError::Invalid(
                "WAL segment limits must be positive".to_string(),
            ));
        }
        if self.compaction.enabled && self.compaction.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "compaction interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
