//! Snapshot and compaction tests

#[path = "testutils/mod.rs"]
mod testutils;

use std::time::{Duration, Instant};

use cypherlite::{CompactionConfig, RecoveryBase, WalConfig};
use serial_test::serial;
use testutils::test_fixture::{wal_segments, TestFixture};

const HEADER_ONLY_SEGMENT: u64 = 64;

fn write_batch(fixture: &TestFixture, tag: &str, count: usize) {
    for i in 0..count {
        fixture.assert_query_succeeds(&format!(
            "CREATE (:Reading {{tag: '{}', i: {}, value: {}}})",
            tag,
            i,
            i as f64 * 0.5
        ));
    }
}

#[test]
fn test_compaction_loses_no_data() {
    let mut fixture = TestFixture::with_config(|config| {
        config
            .with_wal(WalConfig::default().with_max_segment_records(10))
            .with_compaction(CompactionConfig::disabled())
    })
    .expect("Failed to create test fixture");

    write_batch(&fixture, "before", 50);
    fixture.assert_query_succeeds("CREATE INDEX reading_tag FOR (r:Reading) ON (r.tag)");
    fixture.assert_query_succeeds(
        "MATCH (a:Reading {i: 1}), (b:Reading {i: 2}) CREATE (a)-[:FOLLOWED_BY]->(b)",
    );
    assert!(wal_segments(&fixture.wal_dir()).len() > 1);

    let report = fixture.coordinator().compact().expect("compaction failed");
    assert_eq!(report.nodes, 50);
    assert_eq!(report.relationships, 1);
    assert!(report.segments_removed > 1);
    assert!(report.wal_bytes_after < report.wal_bytes_before);
    assert_eq!(wal_segments(&fixture.wal_dir()).len(), 1);

    write_batch(&fixture, "after", 5);
    fixture.reopen().expect("Failed to reopen database");

    let recovery = fixture.coordinator().recovery_report().cloned().unwrap();
    assert_eq!(recovery.base, RecoveryBase::Snapshot);
    assert_eq!(recovery.snapshot_seq, Some(report.snapshot_seq));
    assert_eq!(recovery.transactions_replayed, 5);

    assert_eq!(fixture.count("MATCH (r:Reading) RETURN count(r)"), 55);
    assert_eq!(fixture.count("MATCH ()-[f:FOLLOWED_BY]->() RETURN count(f)"), 1);
    let plan = fixture
        .coordinator()
        .explain_query("MATCH (r:Reading) WHERE r.tag = 'after' RETURN r")
        .unwrap();
    assert!(plan.find("NodeIndexSeek").is_some());
}

#[test]
fn test_old_snapshots_are_pruned() {
    let fixture = TestFixture::with_config(|config| {
        config.with_compaction(CompactionConfig::disabled().with_snapshot_retention(2))
    })
    .expect("Failed to create test fixture");

    let mut pruned = 0;
    for round in 0..4 {
        write_batch(&fixture, &format!("round{}", round), 3);
        pruned += fixture.coordinator().compact().unwrap().snapshots_pruned;
    }
    assert_eq!(pruned, 2);

    let snapshots = std::fs::read_dir(fixture.data_dir().join("snapshots"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".snap"))
        .count();
    assert_eq!(snapshots, 2);
}

#[test]
#[serial]
fn test_background_compaction_bounds_wal() {
    let mut fixture = TestFixture::with_config(|config| {
        config.with_compaction(CompactionConfig::default().with_interval_ms(100))
    })
    .expect("Failed to create test fixture");

    // Keep writing across many intervals; a timer pass shows up as the log
    // shrinking between two observations
    let started = Instant::now();
    let mut previous = fixture.wal_size();
    let mut shrinks = 0;
    let mut total_written = 0;
    while started.elapsed() < Duration::from_millis(1_500) {
        write_batch(&fixture, "stream", 10);
        total_written += 10;
        let size = fixture.wal_size();
        if size < previous {
            shrinks += 1;
        }
        previous = size;
    }
    assert!(shrinks >= 1, "WAL never shrank while writing");

    // Once writes stop, the next pass folds everything into a snapshot and
    // leaves a single empty segment
    let deadline = Instant::now() + Duration::from_secs(5);
    while fixture.wal_size() > HEADER_ONLY_SEGMENT && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(fixture.wal_size(), HEADER_ONLY_SEGMENT);

    fixture.reopen().expect("Failed to reopen database");
    let recovery = fixture.coordinator().recovery_report().cloned().unwrap();
    assert_eq!(recovery.base, RecoveryBase::Snapshot);
    assert_eq!(recovery.transactions_replayed, 0);
    assert_eq!(
        fixture.count("MATCH (r:Reading) RETURN count(r)"),
        total_written as i64
    );
}
