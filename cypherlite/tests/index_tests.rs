//! Index behaviour through the query surface
//!
//! Indexes only accelerate lookups: every query must return the same rows
//! with and without them.

#[path = "testutils/mod.rs"]
mod testutils;

use std::collections::BTreeSet;

use cypherlite::Value;
use testutils::test_fixture::TestFixture;

fn ids(fixture: &TestFixture, query: &str) -> BTreeSet<String> {
    fixture
        .assert_query_succeeds(query)
        .column("id")
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn populate_people(fixture: &TestFixture) {
    fixture.assert_query_succeeds(
        "UNWIND range(0, 199) AS i
         CREATE (:Person {city: ['Oslo', 'Rome', 'Lima', 'Kyiv'][i % 4], age: 20 + i % 7, serial: i})",
    );
    // A few nodes missing one of the indexed properties
    fixture.assert_query_succeeds("CREATE (:Person {city: 'Oslo'}), (:Person {age: 22})");
}

#[test]
fn test_index_and_label_scan_agree() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    populate_people(&fixture);

    let queries = [
        "MATCH (p:Person) WHERE p.city = 'Oslo' RETURN id(p) AS id",
        "MATCH (p:Person {city: 'Rome', age: 23}) RETURN id(p) AS id",
        "MATCH (p:Person) WHERE p.city = 'Lima' AND p.age = 24 RETURN id(p) AS id",
        "MATCH (p:Person) WHERE p.city = 'Nowhere' RETURN id(p) AS id",
    ];
    let scanned: Vec<BTreeSet<String>> = queries.iter().map(|q| ids(&fixture, q)).collect();
    for query in &queries {
        let plan = fixture.coordinator().explain_query(query).unwrap();
        assert!(plan.find("NodeIndexSeek").is_none());
    }

    fixture.assert_query_succeeds("CREATE INDEX person_city_age FOR (p:Person) ON (p.city, p.age)");

    for (query, expected) in queries.iter().zip(&scanned) {
        let plan = fixture.coordinator().explain_query(query).unwrap();
        assert!(plan.find("NodeIndexSeek").is_some(), "no seek for {}\n{}", query, plan);
        assert_eq!(&ids(&fixture, query), expected, "mismatch for {}", query);
    }
    assert_eq!(scanned[0].len(), 51);
}

#[test]
fn test_index_follows_updates_and_deletes() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    fixture.assert_query_succeeds("CREATE INDEX person_city FOR (p:Person) ON (p.city)");
    populate_people(&fixture);

    fixture.assert_query_succeeds("MATCH (p:Person {city: 'Kyiv'}) WHERE p.serial < 40 SET p.city = 'Oslo'");
    fixture.assert_query_succeeds("MATCH (p:Person {city: 'Rome'}) WHERE p.serial >= 100 DELETE p");
    fixture.assert_query_succeeds("MATCH (p:Person {city: 'Lima'}) REMOVE p.city");

    for city in ["Oslo", "Rome", "Lima", "Kyiv"] {
        let seek = ids(
            &fixture,
            &format!("MATCH (p:Person) WHERE p.city = '{}' RETURN id(p) AS id", city),
        );
        // Same predicate, but on a label the index does not cover
        let scan = ids(
            &fixture,
            &format!(
                "MATCH (p) WHERE p:Person AND p.city + '' = '{}' RETURN id(p) AS id",
                city
            ),
        );
        assert_eq!(seek, scan, "mismatch for {}", city);
    }
    fixture.assert_first_value(
        "MATCH (p:Person) WHERE p.city = 'Lima' RETURN count(p) AS n",
        "n",
        Value::Integer(0),
    );
}

fn vector_literal(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{:.6}", v)).collect();
    format!("[{}]", parts.join(", "))
}

/// Deterministic, well separated embeddings
fn embedding(i: usize, dimensions: usize) -> Vec<f64> {
    let mut rng = fastrand::Rng::with_seed(i as u64 * 7919 + 13);
    (0..dimensions).map(|_| rng.f64() * 2.0 - 1.0).collect()
}

fn self_match(similarity: &str, kind: &str) {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    let dimensions = 8;
    let count = 60;
    fixture.assert_query_succeeds(&format!(
        "CREATE VECTOR INDEX doc_embedding FOR (d:Doc) ON (d.embedding)
         OPTIONS {{dimensions: {}, similarity: '{}', type: '{}', m: 8, ef_construction: 64, ef_search: 64}}",
        dimensions, similarity, kind
    ));
    for i in 0..count {
        fixture.assert_query_succeeds(&format!(
            "CREATE (:Doc {{n: {}, embedding: {}}})",
            i,
            vector_literal(&embedding(i, dimensions))
        ));
    }

    for i in 0..count {
        let result = fixture.assert_query_succeeds(&format!(
            "CALL db.index.vector.queryNodes('doc_embedding', 3, {}) YIELD node, score
             RETURN node.n AS n, score",
            vector_literal(&embedding(i, dimensions))
        ));
        assert_eq!(result.rows.len(), 3);
        assert_eq!(
            result.rows[0].get_value("n"),
            Some(&Value::Integer(i as i64)),
            "{} {} index did not return item {} first",
            kind,
            similarity,
            i
        );
    }
}

#[test]
fn test_vector_self_match_cosine_exact() {
    self_match("cosine", "exact");
}

#[test]
fn test_vector_self_match_cosine_hnsw() {
    self_match("cosine", "hnsw");
}

#[test]
fn test_vector_self_match_euclidean_exact() {
    self_match("euclidean", "exact");
}

#[test]
fn test_vector_self_match_euclidean_hnsw() {
    self_match("euclidean", "hnsw");
}

#[test]
fn test_vector_index_rejects_wrong_dimensions() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    fixture.assert_query_succeeds(
        "CREATE VECTOR INDEX emb FOR (d:Doc) ON (d.embedding) OPTIONS {dimensions: 3}",
    );
    assert!(fixture
        .query("CALL db.index.vector.queryNodes('emb', 1, [1.0, 2.0]) YIELD node RETURN node")
        .is_err());
    assert!(fixture
        .query("CALL db.index.vector.queryNodes('missing', 1, [1.0, 2.0, 3.0]) YIELD node RETURN node")
        .is_err());
}

#[test]
fn test_fulltext_and_hybrid_queries() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    fixture.assert_query_succeeds(
        "CREATE (:Article {title: 'Graph databases', body: 'Nodes and relationships stored natively', embedding: [1.0, 0.0]}),
                (:Article {title: 'Cooking pasta', body: 'Boil water, add salt', embedding: [0.0, 1.0]}),
                (:Article {title: 'Vector search', body: 'Nearest neighbour graphs for embeddings', embedding: [0.8, 0.2]})",
    );
    fixture.assert_query_succeeds(
        "CREATE FULLTEXT INDEX article_text FOR (a:Article) ON EACH [a.title, a.body]",
    );
    fixture.assert_query_succeeds(
        "CREATE VECTOR INDEX article_embedding FOR (a:Article) ON (a.embedding) OPTIONS {dimensions: 2}",
    );

    let result = fixture.assert_query_succeeds(
        "CALL db.index.fulltext.queryNodes('article_text', 'pasta') YIELD node, score
         RETURN node.title AS title",
    );
    assert_eq!(result.column("title"), vec![&Value::from("Cooking pasta")]);

    let result = fixture.assert_query_succeeds(
        "CALL db.index.fulltext.queryNodes('article_text', 'graph OR graphs') YIELD node, score
         RETURN node.title AS title ORDER BY title",
    );
    assert_eq!(
        result.column("title"),
        vec![&Value::from("Graph databases"), &Value::from("Vector search")]
    );

    let result = fixture.assert_query_succeeds(
        "CALL db.index.hybrid.queryNodes('article_embedding', 'article_text', 'graph', [1.0, 0.0], 2)
         YIELD node, score RETURN node.title AS title",
    );
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0].get_value("title"), Some(&Value::from("Graph databases")));
}

#[test]
fn test_index_procedures_read_own_writes() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    fixture.assert_query_succeeds(
        "CREATE (:Item {t: 'old words', embedding: [1.0, 0.0]}), (:Item {t: 'other words', embedding: [0.0, 1.0]})",
    );
    fixture.assert_query_succeeds("CREATE FULLTEXT INDEX item_text FOR (i:Item) ON EACH [i.t]");
    fixture.assert_query_succeeds(
        "CREATE VECTOR INDEX item_embedding FOR (i:Item) ON (i.embedding) OPTIONS {dimensions: 2, type: 'exact'}",
    );

    fixture.assert_query_succeeds("BEGIN");
    fixture.assert_query_succeeds("CREATE (:Item {t: 'fresh words', embedding: [0.9, 0.1]})");
    fixture.assert_query_succeeds("MATCH (i:Item {t: 'old words'}) DELETE i");

    let fresh = fixture.count(
        "CALL db.index.fulltext.queryNodes('item_text', 'fresh') YIELD node RETURN count(node)",
    );
    assert_eq!(fresh, 1);
    let result = fixture.assert_query_succeeds(
        "CALL db.index.vector.queryNodes('item_embedding', 2, [1.0, 0.0]) YIELD node
         RETURN node.t AS t",
    );
    assert_eq!(
        result.column("t"),
        vec![&Value::from("fresh words"), &Value::from("other words")]
    );

    fixture.assert_query_succeeds("ROLLBACK");
    assert_eq!(
        fixture.count("CALL db.index.fulltext.queryNodes('item_text', 'fresh') YIELD node RETURN count(node)"),
        0
    );
    fixture.assert_first_value(
        "CALL db.index.vector.queryNodes('item_embedding', 1, [1.0, 0.0]) YIELD node RETURN node.t AS t",
        "t",
        Value::from("old words"),
    );
}
