//! Cypher surface tests through the public API

#[path = "testutils/mod.rs"]
mod testutils;

use std::collections::HashMap;

use cypherlite::{ExecutionError, QueryCoordinator, QueryType, Value};
use testutils::test_fixture::TestFixture;

#[test]
fn test_created_node_found_by_id_and_by_property() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    let created = fixture.assert_query_succeeds("CREATE (n {name: 'Alice'}) RETURN id(n) AS id, n");
    let id = created.rows[0]
        .get_value("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .expect("id is a string");
    let node = created.rows[0].get_value("n").and_then(Value::as_node).unwrap();
    assert_eq!(node.id, id);

    let mut params = HashMap::new();
    params.insert("id".to_string(), Value::String(id.clone()));
    let by_id = fixture
        .query_with_params("MATCH (n) WHERE id(n) = $id RETURN n.name AS name", params)
        .unwrap();
    assert_eq!(by_id.column("name"), vec![&Value::from("Alice")]);

    let by_property = fixture.assert_query_succeeds("MATCH (n {name: 'Alice'}) RETURN n");
    assert_eq!(by_property.rows.len(), 1);
    let found = by_property.rows[0].get_value("n").and_then(Value::as_node).unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.get_property("name"), Some(&Value::from("Alice")));
}

#[test]
fn test_paths_and_aggregation() {
    let fixture = TestFixture::with_people().expect("Failed to create test fixture");

    let result = fixture.assert_query_succeeds(
        "MATCH p = shortestPath((a:Person {name: 'Alice'})-[:KNOWS*]->(c:Person {name: 'Carol'}))
         RETURN length(p) AS hops, [n IN nodes(p) | n.name] AS names",
    );
    assert_eq!(result.rows[0].get_value("hops"), Some(&Value::Integer(2)));
    assert_eq!(
        result.rows[0].get_value("names"),
        Some(&Value::List(vec![
            Value::from("Alice"),
            Value::from("Bob"),
            Value::from("Carol")
        ]))
    );

    let result = fixture.assert_query_succeeds(
        "MATCH (p:Person)-[:WORKS_AT]->(c:Company)
         RETURN c.name AS company, count(p) AS staff, collect(p.name) AS names",
    );
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get_value("staff"), Some(&Value::Integer(2)));

    fixture.assert_first_value(
        "MATCH (p:Person) RETURN max(p.age) - min(p.age) AS spread",
        "spread",
        Value::Integer(12),
    );
}

#[test]
fn test_merge_is_idempotent() {
    let fixture = TestFixture::with_people().expect("Failed to create test fixture");
    for _ in 0..3 {
        fixture.assert_query_succeeds(
            "MATCH (a:Person {name: 'Alice'}), (c:Person {name: 'Carol'})
             MERGE (a)-[r:KNOWS]->(c) ON CREATE SET r.since = 2024",
        );
    }
    assert_eq!(
        fixture.count("MATCH (:Person {name: 'Alice'})-[r:KNOWS]->() RETURN count(r)"),
        2
    );
}

#[test]
fn test_query_results_report_columns_and_counters() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    let result = fixture.assert_query_succeeds(
        "CREATE (a:City:Capital {name: 'Oslo'})-[:ROAD {km: 520}]->(b:City {name: 'Bergen'})",
    );
    assert!(result.rows.is_empty());
    assert_eq!(result.counters.nodes_created, 2);
    assert_eq!(result.counters.relationships_created, 1);
    assert_eq!(result.counters.labels_added, 3);
    assert_eq!(result.counters.properties_set, 3);

    let result = fixture.assert_query_succeeds(
        "MATCH (a:City)-[r:ROAD]->(b) RETURN a.name AS from, b.name AS to, r.km AS km",
    );
    assert_eq!(result.variables, vec!["from", "to", "km"]);
    let json = result.to_json();
    assert_eq!(json[0]["km"], serde_json::json!(520));

    let removed = fixture.assert_query_succeeds("MATCH (c:City) DETACH DELETE c");
    assert_eq!(removed.counters.nodes_deleted, 2);
    assert_eq!(removed.counters.relationships_deleted, 1);
}

#[test]
fn test_errors_are_classified() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");

    match fixture.query("MATCH (n:Person RETURN n") {
        Err(ExecutionError::SyntaxError { line, column, .. }) => {
            assert_eq!(line, 1);
            assert!(column > 1);
        }
        other => panic!("expected a syntax error, got {:?}", other),
    }
    assert!(matches!(
        fixture.query("RETURN nosuchfunction(1)"),
        Err(ExecutionError::SemanticError(_))
    ));
    assert!(matches!(
        fixture.query("RETURN x"),
        Err(ExecutionError::SemanticError(_))
    ));
    assert!(matches!(
        fixture.query("RETURN 'a' + true - 1"),
        Err(ExecutionError::TypeError(_))
    ));
    assert!(matches!(
        fixture.query("CALL db.nothing()"),
        Err(ExecutionError::SemanticError(_))
    ));
}

#[test]
fn test_sessions_are_isolated() {
    let db = QueryCoordinator::in_memory().unwrap();
    let writer = db.create_simple_session("writer").unwrap();
    let reader = db.create_simple_session("reader").unwrap();

    db.begin_transaction(&writer).unwrap();
    db.process_query("CREATE (:Draft {v: 1})", &writer).unwrap();
    let seen = db.process_query("MATCH (d:Draft) RETURN count(d)", &reader).unwrap();
    assert_eq!(seen.single_value(), Some(&Value::Integer(0)));

    let infos = db.sessions();
    assert_eq!(infos.len(), 2);
    assert!(infos.iter().any(|s| s.name == "writer" && s.in_transaction));

    db.close_session(&writer).unwrap();
    let seen = db.process_query("MATCH (d:Draft) RETURN count(d)", &reader).unwrap();
    assert_eq!(seen.single_value(), Some(&Value::Integer(0)));
    assert!(matches!(
        db.process_query("RETURN 1", &writer),
        Err(ExecutionError::NotFound(_))
    ));
}

#[test]
fn test_explain_profile_and_analyze() {
    let fixture = TestFixture::with_people().expect("Failed to create test fixture");

    let explained = fixture.assert_query_succeeds("EXPLAIN MATCH (p:Person)-[:KNOWS]->(q) RETURN q");
    assert!(explained.rows.is_empty());
    let plan = explained.plan.expect("EXPLAIN returns a plan");
    assert_eq!(plan.operator, "ProduceResults");
    assert!(plan.find("NodeByLabelScan").is_some());

    let profiled = fixture.assert_query_succeeds("PROFILE MATCH (p:Person)-[:KNOWS]->(q) RETURN q");
    assert_eq!(profiled.rows.len(), 2);
    let root = profiled.plan.expect("PROFILE returns a plan");
    assert_eq!(root.operator, "ProduceResults");
    assert_eq!(root.rows, Some(2));
    assert_eq!(root.db_hits, Some(0));
    assert!(root.time_ms.map(|ms| ms >= 0.0).unwrap_or(false));
    assert!(root.find("NodeByLabelScan").and_then(|p| p.db_hits).unwrap_or(0) > 0);

    let info = fixture.coordinator().analyze_query("CREATE (:X)").unwrap();
    assert_eq!(info.query_type, QueryType::Write);
    assert!(!info.is_read_only);
    assert!(!info.uses_aggregation);

    let info = fixture
        .coordinator()
        .analyze_query("MATCH (p:Person) RETURN p.name AS name, count (p) AS n")
        .unwrap();
    assert_eq!(info.query_type, QueryType::Read);
    assert!(info.uses_aggregation);
    assert!(info.is_deterministic);
}

#[test]
fn test_stats_reflect_graph() {
    let fixture = TestFixture::with_people().expect("Failed to create test fixture");
    fixture.assert_query_succeeds("CREATE INDEX person_name FOR (p:Person) ON (p.name)");
    let stats = fixture.coordinator().stats();
    assert_eq!(stats.node_count, 4);
    assert_eq!(stats.relationship_count, 4);
    assert_eq!(stats.label_counts.get("Person"), Some(&3));
    assert_eq!(stats.relationship_type_counts.get("KNOWS"), Some(&2));
    assert_eq!(stats.index_count, 1);
    assert!(stats.wal_last_seq.unwrap_or(0) > 0);
    assert!(stats.transactions.committed_transactions >= 2);
}
