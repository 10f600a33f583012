// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Point-in-time snapshots of committed state
//!
//! File layout: magic (4 bytes), CRC32 of the body (4 bytes), body length
//! (8 bytes), then the bincode body. Files are written to a temporary path,
//! synced and renamed so a reader never sees a partial snapshot.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::wal::sync_dir;
use crate::storage::GraphImage;

/// Version written into new snapshots. Newer versions are refused on load.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

const SNAPSHOT_MAGIC: u32 = 0x50_41_4E_53;
const SNAPSHOT_HEADER_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding error: {0}")]
    Encoding(String),

    #[error("Snapshot {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Snapshot {path} has format version {found}, newest supported is {supported}")]
    UnsupportedVersion {
        path: String,
        found: u32,
        supported: u32,
    },
}

/// A complete image of committed state as of a WAL sequence number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    /// Every record with `seq <= self.seq` is reflected in the image
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub image: GraphImage,
}

impl Snapshot {
    pub fn new(seq: u64, image: GraphImage) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            seq,
            created_at: Utc::now(),
            image,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        let body = bincode::serialize(self).map_err(|e| SnapshotError::Encoding(e.to_string()))?;
        let mut bytes = Vec::with_capacity(SNAPSHOT_HEADER_SIZE + body.len());
        bytes.extend_from_slice(&SNAPSHOT_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8], path: &Path) -> Result<Self, SnapshotError> {
        let corrupt = |reason: &str| SnapshotError::Corrupt {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };
        if bytes.len() < SNAPSHOT_HEADER_SIZE {
            return Err(corrupt("file too small"));
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[0..4]);
        if u32::from_le_bytes(word) != SNAPSHOT_MAGIC {
            return Err(corrupt("invalid magic number"));
        }
        word.copy_from_slice(&bytes[4..8]);
        let checksum = u32::from_le_bytes(word);
        let mut long = [0u8; 8];
        long.copy_from_slice(&bytes[8..16]);
        let body_len = u64::from_le_bytes(long) as usize;

        let body = &bytes[SNAPSHOT_HEADER_SIZE..];
        if body.len() != body_len {
            return Err(corrupt("length mismatch"));
        }
        if crc32fast::hash(body) != checksum {
            return Err(corrupt("checksum mismatch"));
        }
        let snapshot: Snapshot =
            bincode::deserialize(body).map_err(|e| corrupt(&e.to_string()))?;
        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                path: path.display().to_string(),
                found: snapshot.format_version,
                supported: SNAPSHOT_FORMAT_VERSION,
            });
        }
        Ok(snapshot)
    }
}

fn snapshot_file_name(seq: u64) -> String {
    format!("snapshot_{:020}.snap", seq)
}

fn parse_snapshot_seq(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("snapshot_")
        .and_then(|s| s.strip_suffix(".snap"))
        .and_then(|s| s.parse::<u64>().ok())
}

/// Directory of snapshot files
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    retention: usize,
}

impl SnapshotStore {
    /// Open `db_path/snapshots`, removing leftovers of interrupted writes
    pub fn open(db_path: &Path, retention: usize) -> Result<Self, SnapshotError> {
        let dir = db_path.join("snapshots");
        fs::create_dir_all(&dir)?;
        for entry in fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "tmp").unwrap_or(false) {
                info!("Removing stray temporary snapshot {}", path.display());
                fs::remove_file(&path)?;
            }
        }
        Ok(Self {
            dir,
            retention: retention.max(1),
        })
    }

    /// Snapshot files ordered by sequence, oldest first
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>, SnapshotError> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.dir)?.flatten() {
            if let Some(seq) = entry.file_name().to_str().and_then(parse_snapshot_seq) {
                snapshots.push((seq, entry.path()));
            }
        }
        snapshots.sort_by_key(|(seq, _)| *seq);
        Ok(snapshots)
    }

    /// Persist a snapshot via temp file, fsync and rename
    pub fn write(&self, snapshot: &Snapshot) -> Result<PathBuf, SnapshotError> {
        let bytes = snapshot.encode()?;
        let final_path = self.dir.join(snapshot_file_name(snapshot.seq));
        let temp_path = self
            .dir
            .join(format!("{}.tmp", snapshot_file_name(snapshot.seq)));
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &final_path)?;
        sync_dir(&self.dir);
        info!(
            "Wrote snapshot at seq {} ({} nodes, {} relationships, {} bytes)",
            snapshot.seq,
            snapshot.image.nodes.len(),
            snapshot.image.edges.len(),
            bytes.len()
        );
        Ok(final_path)
    }

    /// Newest snapshot that decodes, passes its checksum and has a
    /// supported version. Damaged snapshots are skipped.
    pub fn load_latest(&self) -> Result<Option<Snapshot>, SnapshotError> {
        for (seq, path) in self.list()?.into_iter().rev() {
            let bytes = fs::read(&path)?;
            match Snapshot::decode(&bytes, &path) {
                Ok(snapshot) => {
                    debug!("Loaded snapshot {} at seq {}", path.display(), seq);
                    return Ok(Some(snapshot));
                }
                Err(e) => warn!("Skipping snapshot {}: {}", path.display(), e),
            }
        }
        Ok(None)
    }

    /// Delete all but the newest `retention` snapshots
    pub fn prune(&self) -> Result<usize, SnapshotError> {
        let snapshots = self.list()?;
        if snapshots.len() <= self.retention {
            return Ok(0);
        }
        let excess = snapshots.len() - self.retention;
        for (_, path) in snapshots.iter().take(excess) {
            fs::remove_file(path)?;
            debug!("Pruned snapshot {}", path.display());
        }
        Ok(excess)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
