//! End-to-end scenarios
//!
//! Each test drives a durable database through the public QueryCoordinator
//! API only: create data, query it, and where relevant restart.

#[path = "testutils/mod.rs"]
mod testutils;

use std::time::{Duration, Instant};

use cypherlite::{CompactionConfig, ExecutionError, Value, WalConfig};
use serial_test::serial;
use testutils::test_fixture::TestFixture;

#[test]
fn test_knows_relationship_returns_single_row() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");

    fixture.assert_query_succeeds("CREATE (:Person {name: 'Alice'}), (:Person {name: 'Bob'})");
    fixture.assert_query_succeeds(
        "MATCH (a:Person {name: 'Alice'}), (b:Person {name: 'Bob'}) CREATE (a)-[:KNOWS]->(b)",
    );

    let result =
        fixture.assert_query_succeeds("MATCH (a:Person)-[:KNOWS]->(b:Person) RETURN a.name, b.name");
    assert_eq!(result.variables, vec!["a.name", "b.name"]);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(
        result.rows[0].positional_values,
        vec![Value::from("Alice"), Value::from("Bob")]
    );
}

#[test]
fn test_uncommitted_transaction_is_absent_after_crash() {
    let mut fixture = TestFixture::new().expect("Failed to create test fixture");
    fixture.assert_query_succeeds("UNWIND range(1, 3) AS i CREATE (:Existing {i: i})");
    let before = fixture.node_count();

    fixture.assert_query_succeeds("BEGIN");
    let created = fixture.assert_query_succeeds("UNWIND range(1, 1000) AS i CREATE (:Pending {i: i})");
    assert_eq!(created.counters.nodes_created, 1000);
    assert_eq!(fixture.count("MATCH (p:Pending) RETURN count(p)"), 1000);

    fixture.crash_and_reopen().expect("Failed to reopen database");

    assert_eq!(fixture.node_count(), before);
    assert_eq!(fixture.count("MATCH (p:Pending) RETURN count(p)"), 0);
}

fn write_round(fixture: &TestFixture, round: usize) {
    for i in 0..40 {
        fixture.assert_query_succeeds(&format!(
            "CREATE (:Event {{round: {}, i: {}}})",
            round, i
        ));
    }
}

#[test]
#[serial]
fn test_compaction_keeps_log_bounded() {
    let wal = || WalConfig::default().with_max_segment_records(32);

    // Size of one round's log with nothing compacting it
    let reference = TestFixture::with_config(|config| {
        config
            .with_wal(wal())
            .with_compaction(CompactionConfig::disabled())
    })
    .expect("Failed to create test fixture");
    write_round(&reference, 0);
    let round_bytes = reference.wal_size();

    let fixture = TestFixture::with_config(|config| {
        config
            .with_wal(wal())
            .with_compaction(CompactionConfig::default().with_interval_ms(50))
    })
    .expect("Failed to create test fixture");

    // After each round, wait for the timer to fold the round into a snapshot
    let mut peaks = Vec::new();
    for round in 0..6 {
        write_round(&fixture, round);
        let peak = fixture.wal_size();
        peaks.push(peak);

        let deadline = Instant::now() + Duration::from_secs(5);
        while fixture.wal_size() >= peak && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(fixture.wal_size() < peak, "no background pass after round {}", round);
    }

    // Growth would show as peaks rising across rounds
    for peak in &peaks {
        assert!(*peak <= round_bytes * 2, "WAL grew across intervals: {:?}", peaks);
    }
    assert_eq!(fixture.count("MATCH (e:Event) RETURN count(e)"), 240);
}

#[test]
fn test_unique_email_second_transaction_fails() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    fixture.assert_query_succeeds(
        "CREATE CONSTRAINT person_email FOR (p:Person) REQUIRE p.email IS UNIQUE",
    );

    fixture.assert_query_succeeds("BEGIN");
    fixture.assert_query_succeeds("CREATE (:Person {name: 'First', email: 'same@example.com'})");
    fixture.assert_query_succeeds("COMMIT");

    fixture.assert_query_succeeds("BEGIN");
    fixture.assert_query_succeeds("CREATE (:Person {name: 'Other', email: 'other@example.com'})");
    let err = fixture
        .query("CREATE (:Person {name: 'Second', email: 'same@example.com'})")
        .unwrap_err();
    assert!(matches!(err, ExecutionError::ConstraintViolation(_)), "{:?}", err);

    // The violation ended the whole transaction
    assert!(matches!(
        fixture.query("COMMIT"),
        Err(ExecutionError::TransactionError(_))
    ));

    let result = fixture
        .assert_query_succeeds("MATCH (p:Person) RETURN p.name AS name ORDER BY name");
    assert_eq!(result.column("name"), vec![&Value::from("First")]);
}

fn embeddings() -> Vec<Vec<f64>> {
    vec![
        vec![1.0, 0.0, 0.0, 0.0],
        vec![0.0, 1.0, 0.0, 0.0],
        vec![0.2, 0.1, 0.9, 0.3],
        vec![0.0, 0.0, 0.1, 1.0],
        vec![0.7, 0.7, 0.0, 0.0],
    ]
}

fn nearest_to_item_three(index_options: &str) {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    for (i, embedding) in embeddings().iter().enumerate() {
        let values: Vec<String> = embedding.iter().map(|x| format!("{:.1}", x)).collect();
        fixture.assert_query_succeeds(&format!(
            "CREATE (:Item {{item: {}, embedding: [{}]}})",
            i + 1,
            values.join(", ")
        ));
    }
    fixture.assert_query_succeeds(&format!(
        "CREATE VECTOR INDEX item_embedding FOR (i:Item) ON (i.embedding) OPTIONS {}",
        index_options
    ));

    let result = fixture.assert_query_succeeds(
        "MATCH (q:Item {item: 3})
         CALL db.index.vector.queryNodes('item_embedding', 5, q.embedding) YIELD node, score
         RETURN node.item AS item, score",
    );
    assert_eq!(result.rows.len(), 5);
    assert_eq!(result.rows[0].get_value("item"), Some(&Value::Integer(3)));
    let best = result.rows[0].get_value("score").and_then(Value::as_float).unwrap();
    for row in &result.rows[1..] {
        let score = row.get_value("score").and_then(Value::as_float).unwrap();
        assert!(score <= best);
    }
}

#[test]
fn test_vector_self_query_ranks_first_exact() {
    nearest_to_item_three("{dimensions: 4, similarity: 'cosine', type: 'exact'}");
}

#[test]
fn test_vector_self_query_ranks_first_hnsw() {
    nearest_to_item_three(
        "{indexConfig: {`vector.dimensions`: 4, `vector.similarity_function`: 'cosine', type: 'hnsw'}}",
    );
}
