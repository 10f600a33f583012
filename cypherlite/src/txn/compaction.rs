// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Snapshot-and-truncate compaction of the write-ahead log
//!
//! A compaction pass captures committed state and the last WAL sequence
//! under the read lock, writes the snapshot, then drops every WAL record the
//! snapshot already covers. The pass runs on demand or from a timer thread.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::snapshot::{Snapshot, SnapshotError, SnapshotStore};
use super::wal::{PersistentWAL, WALError};
use crate::storage::StorageManager;

#[derive(Error, Debug)]
pub enum CompactionError {
    #[error("Compaction WAL error: {0}")]
    Wal(#[from] WALError),

    #[error("Compaction snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    pub enabled: bool,
    /// Time between background passes
    pub interval_ms: u64,
    /// Number of snapshot files kept on disk
    pub snapshot_retention: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5 * 60 * 1000,
            snapshot_retention: 2,
        }
    }
}

impl CompactionConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_snapshot_retention(mut self, retention: usize) -> Self {
        self.snapshot_retention = retention;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Outcome of one compaction pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    /// Sequence boundary captured by the snapshot
    pub snapshot_seq: u64,
    pub nodes: usize,
    pub relationships: usize,
    pub records_kept: usize,
    pub segments_removed: usize,
    pub wal_bytes_before: u64,
    pub wal_bytes_after: u64,
    pub snapshots_pruned: usize,
    pub duration_ms: u64,
}

/// Runs compaction passes. Passes are serialized by an internal mutex.
pub struct Compactor {
    storage: Arc<StorageManager>,
    wal: Arc<PersistentWAL>,
    snapshots: Arc<SnapshotStore>,
    running: Mutex<()>,
}

impl Compactor {
    pub fn new(
        storage: Arc<StorageManager>,
        wal: Arc<PersistentWAL>,
        snapshots: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            storage,
            wal,
            snapshots,
            running: Mutex::new(()),
        }
    }

    pub fn compact(&self) -> Result<CompactionReport, CompactionError> {
        let _running = self.running.lock();
        let started = Instant::now();

        // Appends happen under the store write lock, so the sequence read
        // here matches the image exactly
        let (image, boundary) = {
            let state = self.storage.read();
            (state.to_image(), self.wal.last_seq())
        };

        let snapshot = Snapshot::new(boundary, image);
        self.snapshots.write(&snapshot)?;
        let rewrite = self.wal.truncate_through(boundary)?;
        let pruned = match self.snapshots.prune() {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!("Failed to prune old snapshots: {}", e);
                0
            }
        };

        let report = CompactionReport {
            snapshot_seq: boundary,
            nodes: snapshot.image.nodes.len(),
            relationships: snapshot.image.edges.len(),
            records_kept: rewrite.records_kept,
            segments_removed: rewrite.segments_removed,
            wal_bytes_before: rewrite.bytes_before,
            wal_bytes_after: rewrite.bytes_after,
            snapshots_pruned: pruned,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Compaction at seq {}: WAL {} -> {} bytes, {} segments removed, {} snapshots pruned",
            report.snapshot_seq,
            report.wal_bytes_before,
            report.wal_bytes_after,
            report.segments_removed,
            report.snapshots_pruned
        );
        Ok(report)
    }
}

pub enum CompactionMessage {
    Shutdown,
}

/// Background thread running compaction on a fixed interval
pub struct CompactionManager {
    sender: Sender<CompactionMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CompactionManager {
    pub fn spawn(compactor: Arc<Compactor>, config: &CompactionConfig) -> Self {
        let (sender, receiver) = mpsc::channel();
        if !config.enabled {
            return Self {
                sender,
                handle: Mutex::new(None),
            };
        }

        let interval = config.interval();
        let handle = thread::spawn(move || Self::compaction_loop(compactor, receiver, interval));
        debug!("Started compaction thread with interval {:?}", interval);
        Self {
            sender,
            handle: Mutex::new(Some(handle)),
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    pub fn shutdown(&self) {
        if let Some(handle) = self.handle.lock().take() {
            let _ = self.sender.send(CompactionMessage::Shutdown);
            if handle.join().is_err() {
                warn!("Compaction thread panicked");
            }
        }
    }

    fn compaction_loop(
        compactor: Arc<Compactor>,
        receiver: Receiver<CompactionMessage>,
        interval: Duration,
    ) {
        loop {
            match receiver.recv_timeout(interval) {
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    // A failed pass leaves the previous snapshot and log in
                    // place; the next tick tries again
                    if let Err(e) = compactor.compact() {
                        error!("Background compaction failed: {}", e);
                    }
                }
                Ok(CompactionMessage::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                    break;
                }
            }
        }
    }
}

impl Drop for CompactionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
