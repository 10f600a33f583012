//! Test fixture for CypherLite integration tests
//!
//! Provides isolated database instances using ONLY the public QueryCoordinator API.

use cypherlite::{DatabaseConfig, ExecutionError, QueryCoordinator, QueryResult, StorageType, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Route engine logs to the test harness; repeated calls are no-ops
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Test fixture with an isolated, durable database instance
pub struct TestFixture {
    coordinator: Option<Arc<QueryCoordinator>>,
    session_id: String,
    config: DatabaseConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestFixture {
    /// Create a fixture with default settings and background compaction off
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_config(|config| {
            config.with_compaction(cypherlite::CompactionConfig::disabled())
        })
    }

    /// Create a fixture, letting the caller adjust the configuration. The
    /// data directory is always a fresh temporary one.
    pub fn with_config(
        configure: impl FnOnce(DatabaseConfig) -> DatabaseConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        init_logging();
        let temp_dir = tempfile::tempdir()?;
        let db_path = temp_dir.path().join("cypherlite_test");
        let config = configure(DatabaseConfig::default()).with_data_dir(&db_path);

        let coordinator = QueryCoordinator::open(config.clone())?;
        let session_id = coordinator.create_simple_session("test")?;

        Ok(TestFixture {
            coordinator: Some(coordinator),
            session_id,
            config,
            _temp_dir: temp_dir,
        })
    }

    /// Create a fixture holding a small social graph
    pub fn with_people() -> Result<Self, Box<dyn std::error::Error>> {
        let fixture = Self::new()?;
        fixture.query(
            "CREATE (alice:Person {name: 'Alice', age: 34, email: 'alice@example.com'}),
                    (bob:Person {name: 'Bob', age: 41, email: 'bob@example.com'}),
                    (carol:Person {name: 'Carol', age: 29}),
                    (acme:Company {name: 'Acme'}),
                    (alice)-[:KNOWS {since: 2015}]->(bob),
                    (bob)-[:KNOWS {since: 2019}]->(carol),
                    (alice)-[:WORKS_AT]->(acme),
                    (carol)-[:WORKS_AT]->(acme)",
        )?;
        Ok(fixture)
    }

    pub fn coordinator(&self) -> &Arc<QueryCoordinator> {
        self.coordinator
            .as_ref()
            .unwrap_or_else(|| panic!("database is closed"))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config
            .data_dir
            .clone()
            .unwrap_or_else(|| panic!("fixture always has a data dir"))
    }

    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir().join("wal")
    }

    /// Execute a query in the fixture's session
    pub fn query(&self, query_text: &str) -> Result<QueryResult, ExecutionError> {
        self.coordinator().process_query(query_text, &self.session_id)
    }

    pub fn query_with_params(
        &self,
        query_text: &str,
        params: HashMap<String, Value>,
    ) -> Result<QueryResult, ExecutionError> {
        self.coordinator()
            .process_query_with_params(query_text, params, &self.session_id)
    }

    /// Execute query and assert success
    pub fn assert_query_succeeds(&self, query: &str) -> QueryResult {
        self.query(query)
            .unwrap_or_else(|e| panic!("Query failed: {}\nError: {}", query, e))
    }

    /// Execute query and assert failure
    pub fn assert_query_fails(&self, query: &str, expected_error: &str) -> ExecutionError {
        match self.query(query) {
            Ok(_) => panic!("Query should have failed: {}", query),
            Err(e) => {
                assert!(
                    e.to_string().contains(expected_error),
                    "Expected error containing '{}', got: {}",
                    expected_error,
                    e
                );
                e
            }
        }
    }

    /// Assert first value
    pub fn assert_first_value(&self, query: &str, column: &str, expected: Value) {
        let result = self.assert_query_succeeds(query);
        assert!(!result.rows.is_empty(), "Query returned no rows: {}", query);

        let actual = result.rows[0]
            .values
            .get(column)
            .unwrap_or_else(|| panic!("Column '{}' not found", column));

        assert_eq!(
            actual, &expected,
            "Column '{}': expected {:?}, got {:?}",
            column, expected, actual
        );
    }

    /// Single integer returned by a `RETURN count(...)` style query
    pub fn count(&self, query: &str) -> i64 {
        let result = self.assert_query_succeeds(query);
        result
            .single_value()
            .and_then(Value::as_integer)
            .unwrap_or_else(|| panic!("Query did not return a single integer: {}", query))
    }

    pub fn node_count(&self) -> i64 {
        self.count("MATCH (n) RETURN count(n)")
    }

    /// Shut the database down cleanly and open it again on the same directory
    pub fn reopen(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.shutdown()?;
        }
        self.open_again()
    }

    /// Abandon the running database without shutting it down, as a process
    /// crash would, then open the directory again
    pub fn crash_and_reopen(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(coordinator) = self.coordinator.take() {
            std::mem::forget(coordinator);
        }
        self.open_again()
    }

    fn open_again(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let coordinator = self.open_coordinator()?;
        self.session_id = coordinator.create_simple_session("test")?;
        self.coordinator = Some(coordinator);
        Ok(())
    }

    /// Sled drops its file lock from a background thread, so a sled-backed
    /// reopen retries for a short while
    fn open_coordinator(&self) -> Result<Arc<QueryCoordinator>, ExecutionError> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match QueryCoordinator::open(self.config.clone()) {
                Err(_) if self.config.storage_type == StorageType::Sled && Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                result => return result,
            }
        }
    }

    /// Highest numbered WAL segment file
    pub fn last_wal_segment(&self) -> Option<PathBuf> {
        wal_segments(&self.wal_dir()).pop()
    }

    pub fn wal_size(&self) -> u64 {
        wal_segments(&self.wal_dir())
            .iter()
            .filter_map(|path| std::fs::metadata(path).ok())
            .map(|meta| meta.len())
            .sum()
    }
}

impl Drop for TestFixture {
    fn drop(&mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            let _ = coordinator.shutdown();
        }
    }
}

/// WAL segment files sorted by name, which is also sequence order
pub fn wal_segments(wal_dir: &Path) -> Vec<PathBuf> {
    let mut segments: Vec<PathBuf> = std::fs::read_dir(wal_dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.file_name()
                        .and_then(|name| name.to_str())
                        .map(|name| name.starts_with("wal_") && name.ends_with(".log"))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default();
    segments.sort();
    segments
}
