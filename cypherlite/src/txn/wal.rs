// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Write-Ahead Log (WAL) implementation with persistent storage
//!
//! Committed transactions are appended as a run of operation records
//! followed by a commit record, all in one buffered write. Records carry a
//! gap-free global sequence number and a CRC32 so a torn tail can be told
//! apart from valid data on recovery.
//!
//! Segment files are named `wal_NNNNNN.log` and start with a 64 byte header.

use std::fs::{self, create_dir_all, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::state::TransactionId;
use crate::storage::Mutation;

/// Magic number to identify WAL files and records
const WAL_MAGIC: u32 = 0x4C_57_59_43;
/// Current WAL format version
const WAL_VERSION: u16 = 1;
/// Size of the segment file header
pub const SEGMENT_HEADER_SIZE: usize = 64;
/// Fixed bytes before the payload: magic, type, txn, seq, ts, op, len
const RECORD_PREFIX_SIZE: usize = 4 + 1 + 8 + 8 + 8 + 1 + 4;
/// Trailing checksum
const RECORD_CHECKSUM_SIZE: usize = 4;
/// Upper bound on a single payload, larger lengths are treated as corruption
const MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

/// How appends reach stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// `sync_data` after every append
    WriteThrough,
    /// Flush to the OS per append, `sync_data` from a timer thread
    Batched { interval: Duration },
    /// Flush to the OS only
    None,
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::WriteThrough
    }
}

/// WAL settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    pub sync_mode: SyncMode,
    /// Rotate once a segment would grow past this many bytes
    pub max_segment_bytes: u64,
    /// Rotate once a segment holds this many records
    pub max_segment_records: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::WriteThrough,
            max_segment_bytes: 64 * 1024 * 1024,
            max_segment_records: 100_000,
        }
    }
}

impl WalConfig {
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    pub fn with_max_segment_bytes(mut self, bytes: u64) -> Self {
        self.max_segment_bytes = bytes;
        self
    }

    pub fn with_max_segment_records(mut self, records: u64) -> Self {
        self.max_segment_records = records;
        self
    }
}

/// WAL entry types for binary format
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WALEntryType {
    TransactionOperation = 2,
    TransactionCommit = 3,
}

/// A single WAL record
#[derive(Debug, Clone, PartialEq)]
pub struct WALRecord {
    pub entry_type: WALEntryType,
    pub transaction_id: TransactionId,
    /// Global sequence number across all transactions
    pub seq: u64,
    /// Nanoseconds since the UNIX epoch
    pub timestamp: u64,
    /// `Mutation::op_code` for operations, 0 for commit markers
    pub op_code: u8,
    /// bincode-encoded `Mutation` for operations, empty for commit markers
    pub payload: Vec<u8>,
}

/// Why a record could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordDecodeError {
    /// The buffer ends before the record does
    Incomplete,
    /// The bytes are present but invalid
    Corrupt(String),
}

impl WALRecord {
    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }

    pub fn operation(
        transaction_id: TransactionId,
        seq: u64,
        mutation: &Mutation,
    ) -> Result<Self, WALError> {
        let payload =
            bincode::serialize(mutation).map_err(|e| WALError::Serialization(e.to_string()))?;
        Ok(Self {
            entry_type: WALEntryType::TransactionOperation,
            transaction_id,
            seq,
            timestamp: Self::now(),
            op_code: mutation.op_code(),
            payload,
        })
    }

    pub fn commit(transaction_id: TransactionId, seq: u64) -> Self {
        Self {
            entry_type: WALEntryType::TransactionCommit,
            transaction_id,
            seq,
            timestamp: Self::now(),
            op_code: 0,
            payload: Vec::new(),
        }
    }

    /// Decode the payload of an operation record
    pub fn mutation(&self) -> Result<Mutation, WALError> {
        bincode::deserialize(&self.payload).map_err(|e| WALError::Serialization(e.to_string()))
    }

    pub fn encoded_len(&self) -> usize {
        RECORD_PREFIX_SIZE + self.payload.len() + RECORD_CHECKSUM_SIZE
    }

    /// Serialize the record
    ///
    /// Binary Format:
    /// - Magic (4 bytes)
    /// - Entry Type (1 byte)
    /// - Transaction ID (8 bytes)
    /// - Sequence (8 bytes)
    /// - Timestamp (8 bytes)
    /// - Op code (1 byte)
    /// - Payload Length (4 bytes)
    /// - Payload (variable)
    /// - Checksum (4 bytes): CRC32 of everything before it
    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        let start = buffer.len();
        buffer.extend_from_slice(&WAL_MAGIC.to_le_bytes());
        buffer.push(self.entry_type as u8);
        buffer.extend_from_slice(&self.transaction_id.id().to_le_bytes());
        buffer.extend_from_slice(&self.seq.to_le_bytes());
        buffer.extend_from_slice(&self.timestamp.to_le_bytes());
        buffer.push(self.op_code);
        buffer.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buffer.extend_from_slice(&self.payload);
        let checksum = crc32fast::hash(&buffer[start..]);
        buffer.extend_from_slice(&checksum.to_le_bytes());
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buffer);
        buffer
    }

    /// Decode one record from the front of `data`, returning it with its length
    pub fn decode(data: &[u8]) -> Result<(Self, usize), RecordDecodeError> {
        if data.len() < RECORD_PREFIX_SIZE {
            return Err(RecordDecodeError::Incomplete);
        }
        let magic = read_u32(data, 0);
        if magic != WAL_MAGIC {
            return Err(RecordDecodeError::Corrupt("invalid magic number".to_string()));
        }
        let entry_type = match data[4] {
            2 => WALEntryType::TransactionOperation,
            3 => WALEntryType::TransactionCommit,
            other => {
                return Err(RecordDecodeError::Corrupt(format!(
                    "invalid entry type {}",
                    other
                )))
            }
        };
        let transaction_id = TransactionId::from_u64(read_u64(data, 5));
        let seq = read_u64(data, 13);
        let timestamp = read_u64(data, 21);
        let op_code = data[29];
        let payload_len = read_u32(data, 30) as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(RecordDecodeError::Corrupt(format!(
                "payload length {} out of range",
                payload_len
            )));
        }

        let total = RECORD_PREFIX_SIZE + payload_len + RECORD_CHECKSUM_SIZE;
        if data.len() < total {
            return Err(RecordDecodeError::Incomplete);
        }
        let checksum_offset = total - RECORD_CHECKSUM_SIZE;
        let expected = read_u32(data, checksum_offset);
        if crc32fast::hash(&data[..checksum_offset]) != expected {
            return Err(RecordDecodeError::Corrupt("checksum mismatch".to_string()));
        }

        Ok((
            Self {
                entry_type,
                transaction_id,
                seq,
                timestamp,
                op_code,
                payload: data[RECORD_PREFIX_SIZE..checksum_offset].to_vec(),
            },
            total,
        ))
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Segment file header
fn create_segment_header() -> Vec<u8> {
    let mut header = Vec::with_capacity(SEGMENT_HEADER_SIZE);
    header.extend_from_slice(&WAL_MAGIC.to_le_bytes());
    header.extend_from_slice(&WAL_VERSION.to_le_bytes());
    header.extend_from_slice(&WALRecord::now().to_le_bytes());
    // Reserved space to pad the header to 64 bytes
    header.resize(SEGMENT_HEADER_SIZE, 0);
    header
}

fn segment_file_name(number: u64) -> String {
    format!("wal_{:06}.log", number)
}

fn parse_segment_number(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("wal_")
        .and_then(|s| s.strip_suffix(".log"))
        .and_then(|s| s.parse::<u64>().ok())
}

/// Contents of one segment as far as it could be decoded
#[derive(Debug)]
pub struct SegmentRead {
    pub number: u64,
    pub records: Vec<WALRecord>,
    /// Length of the valid prefix of the file
    pub valid_len: u64,
    /// The segment ended in an incomplete or corrupt record
    pub torn: bool,
}

/// Read every decodable record of a segment, stopping at the first bad one
pub fn read_segment(path: &Path, number: u64) -> Result<SegmentRead, WALError> {
    let mut file = File::open(path)
        .map_err(|e| WALError::IOError(format!("Failed to open WAL file: {}", e)))?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)
        .map_err(|e| WALError::IOError(format!("Failed to read WAL file: {}", e)))?;

    if buffer.len() < SEGMENT_HEADER_SIZE || read_u32(&buffer, 0) != WAL_MAGIC {
        return Ok(SegmentRead {
            number,
            records: Vec::new(),
            valid_len: 0,
            torn: true,
        });
    }

    let mut records = Vec::new();
    let mut offset = SEGMENT_HEADER_SIZE;
    let mut torn = false;
    while offset < buffer.len() {
        match WALRecord::decode(&buffer[offset..]) {
            Ok((record, len)) => {
                records.push(record);
                offset += len;
            }
            Err(e) => {
                debug!(
                    "Segment {} ends in a torn record at offset {}: {:?}",
                    number, offset, e
                );
                torn = true;
                break;
            }
        }
    }

    Ok(SegmentRead {
        number,
        records,
        valid_len: offset as u64,
        torn,
    })
}

/// Result of scanning the log on open
#[derive(Debug, Default)]
pub struct WalScan {
    /// Records of all segments in order, duplicates by seq removed
    pub records: Vec<WALRecord>,
    /// A torn tail was found and cut off
    pub torn_tail: bool,
    /// Number of segment files read
    pub segments: usize,
}

/// Segment currently open for appends
struct WalWriter {
    writer: Option<BufWriter<File>>,
    file_number: u64,
    file_size: u64,
    file_records: u64,
    /// Last sequence number handed out
    last_seq: u64,
    /// Data flushed to the OS but not yet synced
    dirty: bool,
}

impl WalWriter {
    fn sync(&mut self) -> Result<(), WALError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| WALError::IOError(format!("Failed to flush WAL: {}", e)))?;
            writer
                .get_mut()
                .sync_data()
                .map_err(|e| WALError::IOError(format!("Failed to sync WAL: {}", e)))?;
        }
        self.dirty = false;
        Ok(())
    }
}

enum SyncMessage {
    Shutdown,
}

struct SyncThread {
    sender: Sender<SyncMessage>,
    handle: thread::JoinHandle<()>,
}

/// Write-Ahead Log manager with persistent storage
pub struct PersistentWAL {
    /// Directory where WAL files are stored
    wal_dir: PathBuf,
    config: WalConfig,
    inner: Arc<Mutex<WalWriter>>,
    sync_thread: Mutex<Option<SyncThread>>,
}

impl PersistentWAL {
    /// Open the WAL under `db_path/wal`, scanning what is already there.
    ///
    /// Stray temporary files from an interrupted rewrite are deleted and a
    /// torn tail on the last segment is truncated. Appends always go to a
    /// fresh segment.
    pub fn open(db_path: &Path, config: WalConfig) -> Result<(Self, WalScan), WALError> {
        let wal_dir = db_path.join("wal");
        create_dir_all(&wal_dir)
            .map_err(|e| WALError::IOError(format!("Failed to create WAL directory: {}", e)))?;

        remove_temp_files(&wal_dir)?;
        let scan = scan_segments(&wal_dir)?;
        let last_seq = scan.records.last().map(|r| r.seq).unwrap_or(0);
        let last_number = list_segments(&wal_dir)?
            .last()
            .map(|(n, _)| *n)
            .unwrap_or(0);

        let wal = Self {
            wal_dir,
            config,
            inner: Arc::new(Mutex::new(WalWriter {
                writer: None,
                file_number: last_number,
                file_size: 0,
                file_records: 0,
                last_seq,
                dirty: false,
            })),
            sync_thread: Mutex::new(None),
        };
        {
            let mut inner = wal.inner.lock();
            wal.rotate(&mut inner)?;
        }
        wal.start_sync_thread();

        info!(
            "Opened WAL at {:?}: {} records in {} segments, last seq {}",
            wal.wal_dir,
            scan.records.len(),
            scan.segments,
            last_seq
        );
        Ok((wal, scan))
    }

    fn start_sync_thread(&self) {
        let interval = match self.config.sync_mode {
            SyncMode::Batched { interval } => interval,
            _ => return,
        };
        let (sender, receiver) = mpsc::channel();
        let weak = Arc::downgrade(&self.inner);
        let handle = thread::spawn(move || Self::sync_loop(weak, receiver, interval));
        *self.sync_thread.lock() = Some(SyncThread { sender, handle });
    }

    fn sync_loop(inner: Weak<Mutex<WalWriter>>, receiver: Receiver<SyncMessage>, interval: Duration) {
        loop {
            let shutdown = match receiver.recv_timeout(interval) {
                Ok(SyncMessage::Shutdown) => true,
                Err(mpsc::RecvTimeoutError::Timeout) => false,
                Err(mpsc::RecvTimeoutError::Disconnected) => true,
            };
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let mut writer = inner.lock();
            if writer.dirty {
                if let Err(e) = writer.sync() {
                    error!("Batched WAL sync failed: {}", e);
                }
            }
            if shutdown {
                break;
            }
        }
    }

    /// Make sure new sequence numbers start above `seq`
    pub fn ensure_sequence_at_least(&self, seq: u64) {
        let mut inner = self.inner.lock();
        if inner.last_seq < seq {
            inner.last_seq = seq;
        }
    }

    /// Last sequence number handed out
    pub fn last_seq(&self) -> u64 {
        self.inner.lock().last_seq
    }

    /// Append the operations of a transaction followed by its commit
    /// record. Returns the sequence number of the commit record.
    pub fn append_transaction(
        &self,
        transaction_id: TransactionId,
        mutations: &[Mutation],
    ) -> Result<u64, WALError> {
        let mut inner = self.inner.lock();

        let mut buffer = Vec::new();
        let mut seq = inner.last_seq;
        for mutation in mutations {
            seq += 1;
            WALRecord::operation(transaction_id, seq, mutation)?.encode_into(&mut buffer);
        }
        seq += 1;
        WALRecord::commit(transaction_id, seq).encode_into(&mut buffer);
        let record_count = mutations.len() as u64 + 1;

        let over_bytes =
            inner.file_size + buffer.len() as u64 > self.config.max_segment_bytes;
        let over_records = inner.file_records + record_count > self.config.max_segment_records;
        if inner.writer.is_none() || (inner.file_records > 0 && (over_bytes || over_records)) {
            self.rotate(&mut inner)?;
        }

        if let Err(e) = self.write_buffer(&mut inner, &buffer) {
            error!("WAL append for {} failed: {}", transaction_id, e);
            self.abandon_segment(&mut inner);
            return Err(e);
        }

        inner.last_seq = seq;
        inner.file_size += buffer.len() as u64;
        inner.file_records += record_count;
        debug!(
            "Appended {} records for {} (commit seq {})",
            record_count, transaction_id, seq
        );
        Ok(seq)
    }

    fn write_buffer(&self, inner: &mut WalWriter, buffer: &[u8]) -> Result<(), WALError> {
        let writer = inner
            .writer
            .as_mut()
            .ok_or_else(|| WALError::IOError("No active WAL file".to_string()))?;
        writer
            .write_all(buffer)
            .map_err(|e| WALError::IOError(format!("Failed to write WAL entry: {}", e)))?;
        writer
            .flush()
            .map_err(|e| WALError::IOError(format!("Failed to flush WAL: {}", e)))?;
        match self.config.sync_mode {
            SyncMode::WriteThrough => inner.sync()?,
            SyncMode::Batched { .. } => inner.dirty = true,
            SyncMode::None => {}
        }
        Ok(())
    }

    /// Cut a failed partial write off the segment and force a rotation, so
    /// later records never sit behind garbage
    fn abandon_segment(&self, inner: &mut WalWriter) {
        if let Some(writer) = inner.writer.take() {
            match writer.into_inner() {
                Ok(file) => {
                    if let Err(e) = file.set_len(inner.file_size) {
                        warn!("Could not truncate WAL segment after failed write: {}", e);
                    }
                }
                Err(e) => warn!("Could not recover WAL file after failed write: {}", e),
            }
        }
    }

    /// Rotate to a new WAL file
    fn rotate(&self, inner: &mut WalWriter) -> Result<(), WALError> {
        if let Some(mut old_writer) = inner.writer.take() {
            old_writer
                .flush()
                .map_err(|e| WALError::IOError(format!("Failed to flush old WAL: {}", e)))?;
            old_writer
                .get_mut()
                .sync_all()
                .map_err(|e| WALError::IOError(format!("Failed to sync old WAL: {}", e)))?;
        }

        inner.file_number += 1;
        let file_path = self.wal_dir.join(segment_file_name(inner.file_number));
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&file_path)
            .map_err(|e| WALError::IOError(format!("Failed to create WAL file: {}", e)))?;

        let mut writer = BufWriter::new(file);
        let header = create_segment_header();
        writer
            .write_all(&header)
            .map_err(|e| WALError::IOError(format!("Failed to write WAL header: {}", e)))?;
        writer
            .flush()
            .map_err(|e| WALError::IOError(format!("Failed to flush WAL header: {}", e)))?;
        writer
            .get_mut()
            .sync_all()
            .map_err(|e| WALError::IOError(format!("Failed to sync WAL header: {}", e)))?;
        sync_dir(&self.wal_dir);

        inner.writer = Some(writer);
        inner.file_size = header.len() as u64;
        inner.file_records = 0;
        debug!("Rotated to WAL segment {}", file_path.display());
        Ok(())
    }

    /// Ensure all appended data is on stable storage
    pub fn sync(&self) -> Result<(), WALError> {
        self.inner.lock().sync()
    }

    /// Segment files with their numbers, in order
    pub fn segments(&self) -> Result<Vec<(u64, PathBuf)>, WALError> {
        list_segments(&self.wal_dir)
    }

    /// Total bytes held by segment files
    pub fn size_bytes(&self) -> Result<u64, WALError> {
        let mut total = 0;
        for (_, path) in self.segments()? {
            total += fs::metadata(&path)
                .map_err(|e| WALError::IOError(format!("Failed to stat WAL file: {}", e)))?
                .len();
        }
        Ok(total)
    }

    /// Read every record currently in the log
    #[cfg(test)]
    pub fn read_all(&self) -> Result<Vec<WALRecord>, WALError> {
        self.sync()?;
        Ok(scan_segments_readonly(&self.wal_dir)?.records)
    }

    /// Drop every record with `seq <= boundary`.
    ///
    /// Surviving records are written to a new segment as a temporary file,
    /// synced and renamed into place before the old segments are deleted.
    /// A crash before the rename leaves the old log intact; a crash after it
    /// leaves duplicates that recovery skips by sequence number.
    pub fn truncate_through(&self, boundary: u64) -> Result<RewriteStats, WALError> {
        let mut inner = self.inner.lock();
        inner.sync()?;

        let old_segments = list_segments(&self.wal_dir)?;
        let bytes_before = total_size(&old_segments);
        let mut kept = Vec::new();
        let mut last_seen = 0u64;
        for (number, path) in &old_segments {
            let read = read_segment(path, *number)?;
            for record in read.records {
                if record.seq > last_seen {
                    last_seen = record.seq;
                    if record.seq > boundary {
                        kept.push(record);
                    }
                }
            }
        }

        let new_number = inner.file_number + 1;
        let final_path = self.wal_dir.join(segment_file_name(new_number));
        let temp_path = self
            .wal_dir
            .join(format!("{}.tmp", segment_file_name(new_number)));

        let mut contents = create_segment_header();
        for record in &kept {
            record.encode_into(&mut contents);
        }
        {
            let mut file = File::create(&temp_path)
                .map_err(|e| WALError::IOError(format!("Failed to create WAL rewrite: {}", e)))?;
            file.write_all(&contents)
                .map_err(|e| WALError::IOError(format!("Failed to write WAL rewrite: {}", e)))?;
            file.sync_all()
                .map_err(|e| WALError::IOError(format!("Failed to sync WAL rewrite: {}", e)))?;
        }
        fs::rename(&temp_path, &final_path)
            .map_err(|e| WALError::IOError(format!("Failed to install WAL rewrite: {}", e)))?;
        sync_dir(&self.wal_dir);

        inner.writer = None;
        for (_, path) in &old_segments {
            if let Err(e) = fs::remove_file(path) {
                warn!("Failed to remove obsolete WAL segment {}: {}", path.display(), e);
            }
        }
        sync_dir(&self.wal_dir);

        let file = OpenOptions::new()
            .append(true)
            .open(&final_path)
            .map_err(|e| WALError::IOError(format!("Failed to reopen WAL file: {}", e)))?;
        inner.writer = Some(BufWriter::new(file));
        inner.file_number = new_number;
        inner.file_size = contents.len() as u64;
        inner.file_records = kept.len() as u64;

        let stats = RewriteStats {
            records_kept: kept.len(),
            segments_removed: old_segments.len(),
            bytes_before,
            bytes_after: contents.len() as u64,
        };
        info!(
            "WAL truncated through seq {}: kept {} records, removed {} segments",
            boundary, stats.records_kept, stats.segments_removed
        );
        Ok(stats)
    }

    /// Stop the sync thread and sync outstanding data
    pub fn close(&self) -> Result<(), WALError> {
        if let Some(sync_thread) = self.sync_thread.lock().take() {
            let _ = sync_thread.sender.send(SyncMessage::Shutdown);
            if sync_thread.handle.join().is_err() {
                warn!("WAL sync thread panicked");
            }
        }
        self.sync()
    }
}

impl Drop for PersistentWAL {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close WAL cleanly: {}", e);
        }
    }
}

impl std::fmt::Debug for PersistentWAL {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentWAL")
            .field("wal_dir", &self.wal_dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Outcome of a log rewrite
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub records_kept: usize,
    pub segments_removed: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

fn total_size(segments: &[(u64, PathBuf)]) -> u64 {
    segments
        .iter()
        .filter_map(|(_, path)| fs::metadata(path).ok())
        .map(|m| m.len())
        .sum()
}

fn list_segments(wal_dir: &Path) -> Result<Vec<(u64, PathBuf)>, WALError> {
    let mut segments = Vec::new();
    let entries = fs::read_dir(wal_dir)
        .map_err(|e| WALError::IOError(format!("Failed to list WAL directory: {}", e)))?;
    for entry in entries.flatten() {
        if let Some(number) = entry.file_name().to_str().and_then(parse_segment_number) {
            segments.push((number, entry.path()));
        }
    }
    segments.sort_by_key(|(n, _)| *n);
    Ok(segments)
}

fn remove_temp_files(dir: &Path) -> Result<(), WALError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| WALError::IOError(format!("Failed to list directory: {}", e)))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e == "tmp").unwrap_or(false) {
            info!("Removing stray temporary file {}", path.display());
            fs::remove_file(&path)
                .map_err(|e| WALError::IOError(format!("Failed to remove temp file: {}", e)))?;
        }
    }
    Ok(())
}

/// Read all segments without modifying them
#[cfg(test)]
fn scan_segments_readonly(wal_dir: &Path) -> Result<WalScan, WALError> {
    let segments = list_segments(wal_dir)?;
    let mut scan = WalScan {
        segments: segments.len(),
        ..Default::default()
    };
    let mut last_seen = 0u64;
    for (number, path) in &segments {
        let read = read_segment(path, *number)?;
        scan.torn_tail |= read.torn;
        for record in read.records {
            if record.seq > last_seen {
                last_seen = record.seq;
                scan.records.push(record);
            }
        }
    }
    Ok(scan)
}

/// Read all segments, truncating a torn tail off the last one
fn scan_segments(wal_dir: &Path) -> Result<WalScan, WALError> {
    let segments = list_segments(wal_dir)?;
    let mut scan = WalScan {
        segments: segments.len(),
        ..Default::default()
    };
    let mut last_seen = 0u64;
    for (index, (number, path)) in segments.iter().enumerate() {
        let read = read_segment(path, *number)?;
        if read.torn {
            let is_last = index + 1 == segments.len();
            if is_last {
                scan.torn_tail = true;
                truncate_segment(path, read.valid_len)?;
            } else {
                warn!(
                    "WAL segment {} is damaged after {} records; continuing with the next segment",
                    number,
                    read.records.len()
                );
            }
        }
        for record in read.records {
            if record.seq > last_seen {
                last_seen = record.seq;
                scan.records.push(record);
            }
        }
    }
    Ok(scan)
}

fn truncate_segment(path: &Path, valid_len: u64) -> Result<(), WALError> {
    if valid_len < SEGMENT_HEADER_SIZE as u64 {
        warn!("Removing WAL segment {} with a damaged header", path.display());
        return fs::remove_file(path)
            .map_err(|e| WALError::IOError(format!("Failed to remove WAL file: {}", e)));
    }
    warn!(
        "Truncating torn tail of {} at byte {}",
        path.display(),
        valid_len
    );
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| WALError::IOError(format!("Failed to open WAL file: {}", e)))?;
    file.set_len(valid_len)
        .map_err(|e| WALError::IOError(format!("Failed to truncate WAL file: {}", e)))?;
    file.sync_all()
        .map_err(|e| WALError::IOError(format!("Failed to sync WAL file: {}", e)))
}

/// Persist directory entries after a create, rename or delete
pub(crate) fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = File::open(dir) {
            let _ = handle.sync_all();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
}

/// WAL-specific errors
#[derive(Debug)]
pub enum WALError {
    IOError(String),
    Serialization(String),
}

impl std::fmt::Display for WALError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WALError::IOError(msg) => write!(f, "WAL IO Error: {}", msg),
            WALError::Serialization(msg) => write!(f, "WAL Serialization Error: {}", msg),
        }
    }
}

impl std::error::Error for WALError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Node;
    use tempfile::TempDir;

    fn create(id: &str) -> Mutation {
        Mutation::CreateNode(Node::new(id.to_string()))
    }

    fn open(dir: &TempDir, config: WalConfig) -> (PersistentWAL, WalScan) {
        PersistentWAL::open(dir.path(), config).unwrap()
    }

    #[test]
    fn test_record_encoding() {
        let record = WALRecord::operation(TransactionId::from_u64(9), 4, &create("n1")).unwrap();
        let bytes = record.encode();
        assert_eq!(bytes.len(), record.encoded_len());

        let (decoded, len) = WALRecord::decode(&bytes).unwrap();
        assert_eq!(len, bytes.len());
        assert_eq!(decoded, record);
        assert_eq!(decoded.mutation().unwrap(), create("n1"));

        assert_eq!(
            WALRecord::decode(&bytes[..bytes.len() - 1]).unwrap_err(),
            RecordDecodeError::Incomplete
        );
        let mut flipped = bytes.clone();
        flipped[RECORD_PREFIX_SIZE] ^= 0xFF;
        assert!(matches!(
            WALRecord::decode(&flipped),
            Err(RecordDecodeError::Corrupt(_))
        ));
    }

    #[test]
    fn test_append_and_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let (wal, scan) = open(&dir, WalConfig::default());
            assert!(scan.records.is_empty());
            let seq = wal
                .append_transaction(TransactionId::new(), &[create("a"), create("b")])
                .unwrap();
            assert_eq!(seq, 3);
            let seq = wal
                .append_transaction(TransactionId::new(), &[create("c")])
                .unwrap();
            assert_eq!(seq, 5);
        }
        let (wal, scan) = open(&dir, WalConfig::default());
        assert!(!scan.torn_tail);
        let seqs: Vec<u64> = scan.records.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert_eq!(wal.last_seq(), 5);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let segment = {
            let (wal, _) = open(&dir, WalConfig::default());
            wal.append_transaction(TransactionId::new(), &[create("a")])
                .unwrap();
            wal.segments().unwrap().last().unwrap().1.clone()
        };
        {
            let mut file = OpenOptions::new().append(true).open(&segment).unwrap();
            let partial = WALRecord::commit(TransactionId::new(), 3).encode();
            file.write_all(&partial[..10]).unwrap();
        }
        let valid_len = fs::metadata(&segment).unwrap().len() - 10;

        let (_wal, scan) = open(&dir, WalConfig::default());
        assert!(scan.torn_tail);
        assert_eq!(scan.records.len(), 2);
        assert_eq!(fs::metadata(&segment).unwrap().len(), valid_len);
    }

    #[test]
    fn test_rotation_by_record_count() {
        let dir = TempDir::new().unwrap();
        let (wal, _) = open(&dir, WalConfig::default().with_max_segment_records(4));
        for i in 0..5 {
            wal.append_transaction(TransactionId::new(), &[create(&format!("n{}", i))])
                .unwrap();
        }
        assert!(wal.segments().unwrap().len() >= 3);
        assert_eq!(wal.read_all().unwrap().len(), 10);
    }

    #[test]
    fn test_truncate_through() {
        let dir = TempDir::new().unwrap();
        let (wal, _) = open(&dir, WalConfig::default().with_max_segment_records(2));
        for i in 0..4 {
            wal.append_transaction(TransactionId::new(), &[create(&format!("n{}", i))])
                .unwrap();
        }
        let stats = wal.truncate_through(6).unwrap();
        assert_eq!(stats.records_kept, 2);
        assert_eq!(wal.segments().unwrap().len(), 1);

        let seq = wal
            .append_transaction(TransactionId::new(), &[create("late")])
            .unwrap();
        assert_eq!(seq, 10);
        drop(wal);

        let (_wal, scan) = open(&dir, WalConfig::default());
        let seqs: Vec<u64> = scan.records.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_stray_temp_file_removed() {
        let dir = TempDir::new().unwrap();
        let wal_dir = dir.path().join("wal");
        fs::create_dir_all(&wal_dir).unwrap();
        let temp = wal_dir.join("wal_000009.log.tmp");
        fs::write(&temp, b"partial").unwrap();

        let (_wal, scan) = open(&dir, WalConfig::default());
        assert!(!temp.exists());
        assert!(scan.records.is_empty());
    }

    #[test]
    fn test_batched_sync_mode() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::default().with_sync_mode(SyncMode::Batched {
            interval: Duration::from_millis(5),
        });
        let (wal, _) = open(&dir, config);
        wal.append_transaction(TransactionId::new(), &[create("a")])
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        wal.close().unwrap();
        assert_eq!(wal.read_all().unwrap().len(), 2);
    }
}
