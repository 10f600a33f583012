// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query Coordinator - orchestration for CypherLite query execution
//!
//! The coordinator is the database context object. It is built once by
//! [`QueryCoordinator::open`], shared by `Arc`, and wires together storage,
//! the write-ahead log, recovery, compaction, transactions, extension hooks
//! and the event bus.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::config::DatabaseConfig;
use crate::ast::keywords::calls_any;
use crate::ast::parser::parse_query;
use crate::ast::{SchemaCommand, Statement, TransactionCommand, AGGREGATE_FUNCTIONS};
use crate::ast::validator::{validate_statement, ValidationSettings};
use crate::events::{
    ActionInfo, EventBus, Extension, ExtensionDescriptor, ExtensionError, ExtensionRegistry,
    GraphEvent, RequestInfo,
};
use crate::exec::procedures::is_known_procedure;
use crate::exec::{
    execute_query, execute_schema, CancellationToken, ExecutionContext, ExecutionError,
    QueryCounters, QueryOutput, QueryResult, Row,
};
use crate::functions::FunctionRegistry;
use crate::interchange::{GraphDocument, ImportReport};
use crate::plan::{plan_statement, PlanDescription, Profile};
use crate::storage::{StorageManager, StorageType, Value};
use crate::txn::{
    CommitOutcome, CompactionManager, CompactionReport, Compactor, PersistentWAL,
    RecoveryManager, RecoveryReport, SnapshotStore, Transaction, TransactionManager,
    TransactionStatistics,
};

type ExecResult<T> = Result<T, ExecutionError>;

/// Kind of statement a query text holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    Read,
    Write,
    Schema,
    Transaction,
    Explain,
    Profile,
}

/// Functions whose result changes between runs
const NONDETERMINISTIC_FUNCTIONS: &[&str] = &["rand", "timestamp"];

/// Information about a query without running it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryInfo {
    pub query_type: QueryType,
    /// Whether running the statement can change the database
    pub is_read_only: bool,
    /// The text calls an aggregate such as `count (n)` or `collect(x)`
    pub uses_aggregation: bool,
    /// Repeated runs over the same data give the same rows
    pub is_deterministic: bool,
}

/// Per-call execution options
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Overrides the configured query timeout
    pub timeout: Option<Duration>,
    /// Token the caller can cancel from another thread
    pub cancellation: Option<CancellationToken>,
}

impl QueryOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Snapshot of database-wide counters
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub node_count: usize,
    pub relationship_count: usize,
    pub label_counts: HashMap<String, usize>,
    pub relationship_type_counts: HashMap<String, usize>,
    pub index_count: usize,
    pub constraint_count: usize,
    pub storage_type: StorageType,
    /// Last WAL sequence, absent without a data directory
    pub wal_last_seq: Option<u64>,
    pub wal_size_bytes: Option<u64>,
    pub active_sessions: usize,
    pub transactions: TransactionStatistics,
    pub events_published: u64,
    pub events_dropped: u64,
}

/// Public view of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub in_transaction: bool,
}

struct Session {
    name: String,
    created_at: DateTime<Utc>,
    transaction: Option<Transaction>,
}

/// Durable components, present when a data directory is configured
struct Durability {
    compactor: Arc<Compactor>,
    compaction: CompactionManager,
    recovery: RecoveryReport,
}

/// Statement results before they are turned into a `QueryResult`
struct Execution {
    output: QueryOutput,
    counters: QueryCounters,
    warnings: Vec<String>,
    plan: Option<PlanDescription>,
}

/// Query Coordinator - orchestrates query execution with session management
///
/// This is the main entry point for embedding CypherLite. It handles:
/// - Opening, recovering and shutting down the database
/// - Sessions and explicit transactions
/// - Parsing, validation and execution of Cypher statements
/// - Import/export, compaction and extension hooks
pub struct QueryCoordinator {
    config: DatabaseConfig,
    storage: Arc<StorageManager>,
    transactions: TransactionManager,
    functions: FunctionRegistry,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    extensions: RwLock<ExtensionRegistry>,
    events: EventBus,
    durability: Option<Durability>,
    closed: AtomicBool,
}

impl QueryCoordinator {
    /// Open a database with the given configuration
    ///
    /// With a data directory this opens the write-ahead log and snapshot
    /// store, recovers committed state, and starts background compaction.
    ///
    /// # Arguments
    /// * `config` - Database settings
    ///
    /// # Returns
    /// * `Ok(Arc<QueryCoordinator>)` - Initialized coordinator ready for use
    /// * `Err(ExecutionError)` - Invalid configuration or a failed recovery
    ///
    /// # Example
    /// ```no_run
    /// use cypherlite::{DatabaseConfig, QueryCoordinator};
    ///
    /// let config = DatabaseConfig::at("./mydb");
    /// let db = QueryCoordinator::open(config).expect("Failed to open database");
    /// db.execute("CREATE (:Person {name: 'Ann'})", Default::default()).unwrap();
    /// ```
    pub fn open(config: DatabaseConfig) -> ExecResult<Arc<Self>> {
        config.validate().map_err(storage_error)?;

        let (storage, wal, durability) = match &config.data_dir {
            None => (Arc::new(StorageManager::in_memory()), None, None),
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(storage_error)?;
                let storage = Arc::new(
                    StorageManager::open(dir.join("kv"), config.storage_type)
                        .map_err(storage_error)?,
                );
                let (wal, scan) = PersistentWAL::open(dir, config.wal.clone()).map_err(storage_error)?;
                let snapshots = SnapshotStore::open(dir, config.compaction.snapshot_retention)
                    .map_err(storage_error)?;
                let recovery = RecoveryManager::new(&storage, Some(&snapshots))
                    .recover(scan)
                    .map_err(storage_error)?;
                wal.ensure_sequence_at_least(recovery.last_seq);

                let wal = Arc::new(wal);
                let compactor = Arc::new(Compactor::new(
                    storage.clone(),
                    wal.clone(),
                    Arc::new(snapshots),
                ));
                let compaction = CompactionManager::spawn(compactor.clone(), &config.compaction);
                (
                    storage,
                    Some(wal),
                    Some(Durability {
                        compactor,
                        compaction,
                        recovery,
                    }),
                )
            }
        };

        let events = EventBus::new(config.event_queue_capacity).map_err(storage_error)?;
        let transactions = TransactionManager::new(storage.clone(), wal);
        info!(
            "Opened CypherLite database ({}, {})",
            storage.storage_type(),
            match &config.data_dir {
                Some(dir) => format!("data dir {}", dir.display()),
                None => "in memory".to_string(),
            }
        );

        Ok(Arc::new(Self {
            config,
            storage,
            transactions,
            functions: FunctionRegistry::new(),
            sessions: RwLock::new(HashMap::new()),
            extensions: RwLock::new(ExtensionRegistry::new()),
            events,
            durability,
            closed: AtomicBool::new(false),
        }))
    }

    /// Open a durable database from a directory path (Simplified API)
    ///
    /// # Arguments
    /// * `db_path` - Path to the database directory
    ///
    /// # Example
    /// ```no_run
    /// use cypherlite::QueryCoordinator;
    ///
    /// let coordinator = QueryCoordinator::from_path("./mydb")
    ///     .expect("Failed to initialize database");
    ///
    /// let session_id = coordinator.create_simple_session("user")
    ///     .expect("Failed to create session");
    ///
    /// let result = coordinator.process_query("MATCH (n) RETURN n", &session_id)
    ///     .expect("Failed to execute query");
    /// ```
    pub fn from_path(db_path: impl AsRef<Path>) -> ExecResult<Arc<Self>> {
        Self::open(DatabaseConfig::at(db_path))
    }

    /// Open a volatile database that keeps nothing on disk
    pub fn in_memory() -> ExecResult<Arc<Self>> {
        Self::open(DatabaseConfig::in_memory())
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Create a session (Simplified API)
    ///
    /// Sessions carry explicit transactions between calls. Queries run
    /// without a session auto-commit.
    ///
    /// # Arguments
    /// * `name` - Label for the session, used in logs
    ///
    /// # Returns
    /// * `Ok(String)` - Session ID for use with `process_query()`
    ///
    /// # Example
    /// ```no_run
    /// # use cypherlite::QueryCoordinator;
    /// # let coordinator = QueryCoordinator::in_memory().unwrap();
    /// let session_id = coordinator.create_simple_session("user")
    ///     .expect("Failed to create session");
    /// ```
    pub fn create_simple_session(&self, name: impl Into<String>) -> ExecResult<String> {
        self.ensure_open()?;
        let name = name.into();
        let id = uuid::Uuid::new_v4().to_string();
        debug!("Created session {} for {}", id, name);
        self.sessions.write().insert(
            id.clone(),
            Arc::new(Mutex::new(Session {
                name,
                created_at: Utc::now(),
                transaction: None,
            })),
        );
        Ok(id)
    }

    /// Close a session, rolling back its open transaction
    pub fn close_session(&self, session_id: &str) -> ExecResult<()> {
        let session = self
            .sessions
            .write()
            .remove(session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        let mut session = session.lock();
        if let Some(mut transaction) = session.transaction.take() {
            warn!(
                "Session {} closed with an open transaction; rolling back {}",
                session_id,
                transaction.id()
            );
            self.transactions.rollback(&mut transaction);
        }
        debug!("Closed session {} ({})", session_id, session.name);
        Ok(())
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .read()
            .iter()
            .map(|(id, session)| {
                let session = session.lock();
                SessionInfo {
                    id: id.clone(),
                    name: session.name.clone(),
                    created_at: session.created_at,
                    in_transaction: session.transaction.is_some(),
                }
            })
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sessions
    }

    /// Execute a query within a session
    ///
    /// This is the main entry point for query execution.
    ///
    /// # Arguments
    /// * `query_text` - The Cypher statement to execute
    /// * `session_id` - Session ID for the query
    ///
    /// # Returns
    /// * `Ok(QueryResult)` - Query result on success
    /// * `Err(ExecutionError)` - Syntax, semantic, constraint or storage failure
    pub fn process_query(&self, query_text: &str, session_id: &str) -> ExecResult<QueryResult> {
        self.process_query_with_options(
            query_text,
            &HashMap::new(),
            Some(session_id),
            QueryOptions::default(),
        )
    }

    /// Execute a parameterized query within a session
    ///
    /// # Example
    /// ```no_run
    /// # use cypherlite::{QueryCoordinator, Value};
    /// # use std::collections::HashMap;
    /// # let coordinator = QueryCoordinator::in_memory().unwrap();
    /// # let session_id = coordinator.create_simple_session("user").unwrap();
    /// let mut params = HashMap::new();
    /// params.insert("name".to_string(), Value::String("Ann".to_string()));
    /// let result = coordinator
    ///     .process_query_with_params("MATCH (p:Person {name: $name}) RETURN p", params, &session_id)
    ///     .unwrap();
    /// ```
    pub fn process_query_with_params(
        &self,
        query_text: &str,
        params: HashMap<String, Value>,
        session_id: &str,
    ) -> ExecResult<QueryResult> {
        self.process_query_with_options(query_text, &params, Some(session_id), QueryOptions::default())
    }

    /// Execute a query outside any session; writes auto-commit
    pub fn execute(&self, query_text: &str, params: HashMap<String, Value>) -> ExecResult<QueryResult> {
        self.process_query_with_options(query_text, &params, None, QueryOptions::default())
    }

    /// Execute a query with a timeout or a caller-held cancellation token
    ///
    /// # Arguments
    /// * `query_text` - The Cypher statement to execute
    /// * `params` - Values for `$name` parameters
    /// * `session_id` - Session to run in, or `None` to auto-commit
    /// * `options` - Timeout and cancellation
    ///
    /// # Returns
    /// * `Err(ExecutionError::Aborted)` - The query was cancelled or timed out;
    ///   its writes are discarded
    pub fn process_query_with_options(
        &self,
        query_text: &str,
        params: &HashMap<String, Value>,
        session_id: Option<&str>,
        options: QueryOptions,
    ) -> ExecResult<QueryResult> {
        self.ensure_open()?;
        let started = Instant::now();
        self.extensions
            .read()
            .check_request(&RequestInfo {
                query: query_text,
                session_id,
                params,
            })
            .map_err(rejected)?;

        let statement = parse_query(query_text)?.statement;
        self.validate(&statement, params)?;

        let cancel = options
            .cancellation
            .unwrap_or_default()
            .child_with_timeout(options.timeout.or_else(|| self.config.query_timeout()));

        let mut result = match session_id {
            Some(id) => {
                let session = self.session(id)?;
                let mut session = session.lock();
                self.run_in_session(&statement, params, id, &mut session, &cancel)?
            }
            None => self.run_statement(&statement, params, None, &cancel)?,
        };
        result.execution_time_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    fn validate(&self, statement: &Statement, params: &HashMap<String, Value>) -> ExecResult<()> {
        let parameters: HashSet<String> = params.keys().cloned().collect();
        let is_known_function = |name: &str| self.functions.is_known(name);
        let settings = ValidationSettings {
            is_known_function: &is_known_function,
            is_known_procedure: &is_known_procedure,
            parameters: Some(&parameters),
        };
        validate_statement(statement, &settings)?;
        Ok(())
    }

    fn run_in_session(
        &self,
        statement: &Statement,
        params: &HashMap<String, Value>,
        session_id: &str,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> ExecResult<QueryResult> {
        if let Statement::Transaction(command) = statement {
            match command {
                TransactionCommand::Begin => self.begin_in(session_id, session)?,
                TransactionCommand::Commit => self.commit_in(session_id, session)?,
                TransactionCommand::Rollback => self.rollback_in(session_id, session)?,
            }
            return Ok(QueryResult::new());
        }

        let Some(transaction) = session.transaction.as_mut() else {
            return self.run_statement(statement, params, Some(session_id), cancel);
        };
        if matches!(statement.inner(), Statement::Schema(command) if !is_show(command)) {
            return Err(ExecutionError::TransactionError(
                "Schema commands cannot run inside an explicit transaction".to_string(),
            ));
        }
        if let Statement::Explain(_) = statement {
            return Ok(self.explain_statement(statement, params));
        }

        let savepoint = transaction.log().savepoint();
        match self.execute_in(statement, transaction, params, cancel) {
            Ok(execution) => Ok(into_result(execution)),
            Err(ExecutionError::ConstraintViolation(message)) => {
                if let Some(mut transaction) = session.transaction.take() {
                    self.transactions.rollback(&mut transaction);
                }
                Err(ExecutionError::ConstraintViolation(message))
            }
            Err(e) => {
                transaction.log_mut().rollback_to(savepoint);
                Err(e)
            }
        }
    }

    /// Run one statement in its own transaction
    fn run_statement(
        &self,
        statement: &Statement,
        params: &HashMap<String, Value>,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> ExecResult<QueryResult> {
        match statement {
            Statement::Transaction(_) => {
                return Err(ExecutionError::TransactionError(
                    "Transaction control requires a session".to_string(),
                ))
            }
            Statement::Explain(_) => return Ok(self.explain_statement(statement, params)),
            _ => {}
        }

        let mut transaction = self.transactions.begin(session_id.map(str::to_string));
        let execution = match self.execute_in(statement, &mut transaction, params, cancel) {
            Ok(execution) => execution,
            Err(e) => {
                self.transactions.rollback(&mut transaction);
                return Err(e);
            }
        };
        if let Err(e) = cancel.check() {
            self.transactions.rollback(&mut transaction);
            return Err(e);
        }
        self.commit(&mut transaction, session_id)?;
        Ok(into_result(execution))
    }

    /// Execute against the transaction's view under the store read lock
    fn execute_in(
        &self,
        statement: &Statement,
        transaction: &mut Transaction,
        params: &HashMap<String, Value>,
        cancel: &CancellationToken,
    ) -> ExecResult<Execution> {
        let state = self.storage.read();
        let profile = Profile::new();
        let mut plan = match statement {
            Statement::Profile(_) => Some(plan_statement(&state, statement, params)),
            _ => None,
        };

        let mut ctx = ExecutionContext::new(&state, transaction, params, &self.functions, cancel)
            .with_vector_exact_threshold(self.config.vector_exact_threshold);
        if plan.is_some() {
            ctx = ctx.with_profile(&profile);
        }
        let started = Instant::now();
        let output = match statement.inner() {
            Statement::Query(query) => execute_query(&mut ctx, query)?,
            Statement::Schema(command) => execute_schema(&mut ctx, command)?,
            other => {
                return Err(ExecutionError::SemanticError(format!(
                    "Statement cannot be executed here: {:?}",
                    other
                )))
            }
        };
        let counters = ctx.counters.clone();
        let warnings = std::mem::take(&mut ctx.warnings);
        drop(ctx);

        if let Some(plan) = plan.as_mut() {
            profile.record_total_time(started.elapsed().as_secs_f64() * 1000.0);
            profile.apply_root(plan, output.rows.len() as u64);
        }
        Ok(Execution {
            output,
            counters,
            warnings,
            plan,
        })
    }

    fn explain_statement(&self, statement: &Statement, params: &HashMap<String, Value>) -> QueryResult {
        let state = self.storage.read();
        let mut result = QueryResult::new();
        result.plan = Some(plan_statement(&state, statement, params));
        result
    }

    /// Commit through the extension hooks, then publish the change events
    fn commit(
        &self,
        transaction: &mut Transaction,
        session_id: Option<&str>,
    ) -> ExecResult<CommitOutcome> {
        let extensions = self.extensions.read();
        if !transaction.log().is_empty() {
            let action = ActionInfo {
                transaction_id: transaction.id(),
                session_id,
                mutations: transaction.log().mutations(),
            };
            if let Err(e) = extensions.check_action(&action) {
                self.transactions.rollback(transaction);
                return Err(rejected(e));
            }
        }

        let outcome = self.transactions.commit(transaction)?;
        if !outcome.mutations.is_empty() {
            let action = ActionInfo {
                transaction_id: outcome.transaction_id,
                session_id,
                mutations: &outcome.mutations,
            };
            extensions.notify_action(&action, outcome.seq);
            self.events.publish_all(GraphEvent::for_commit(
                outcome.transaction_id,
                outcome.seq,
                &outcome.mutations,
            ));
        }
        Ok(outcome)
    }

    /// Start an explicit transaction in a session
    pub fn begin_transaction(&self, session_id: &str) -> ExecResult<()> {
        self.ensure_open()?;
        let session = self.session(session_id)?;
        let mut session = session.lock();
        self.begin_in(session_id, &mut session)
    }

    /// Commit the session's explicit transaction
    ///
    /// A failed commit ends the transaction; none of its writes are applied.
    pub fn commit_transaction(&self, session_id: &str) -> ExecResult<()> {
        self.ensure_open()?;
        let session = self.session(session_id)?;
        let mut session = session.lock();
        self.commit_in(session_id, &mut session)
    }

    /// Discard the session's explicit transaction
    pub fn rollback_transaction(&self, session_id: &str) -> ExecResult<()> {
        let session = self.session(session_id)?;
        let mut session = session.lock();
        self.rollback_in(session_id, &mut session)
    }

    fn begin_in(&self, session_id: &str, session: &mut Session) -> ExecResult<()> {
        if session.transaction.is_some() {
            return Err(ExecutionError::TransactionError(
                "A transaction is already active in this session".to_string(),
            ));
        }
        session.transaction = Some(self.transactions.begin(Some(session_id.to_string())));
        Ok(())
    }

    fn commit_in(&self, session_id: &str, session: &mut Session) -> ExecResult<()> {
        let mut transaction = session.transaction.take().ok_or_else(no_transaction)?;
        self.commit(&mut transaction, Some(session_id))?;
        Ok(())
    }

    fn rollback_in(&self, _session_id: &str, session: &mut Session) -> ExecResult<()> {
        let mut transaction = session.transaction.take().ok_or_else(no_transaction)?;
        self.transactions.rollback(&mut transaction);
        Ok(())
    }

    /// Describe how a statement would run without running it
    ///
    /// # Example
    /// ```no_run
    /// # use cypherlite::QueryCoordinator;
    /// # let coordinator = QueryCoordinator::in_memory().unwrap();
    /// let plan = coordinator.explain_query("MATCH (p:Person) RETURN p.name").unwrap();
    /// println!("{}", plan);
    /// ```
    pub fn explain_query(&self, query_text: &str) -> ExecResult<PlanDescription> {
        let statement = parse_query(query_text)?.statement;
        let params = HashMap::new();
        let is_known_function = |name: &str| self.functions.is_known(name);
        let settings = ValidationSettings {
            is_known_function: &is_known_function,
            is_known_procedure: &is_known_procedure,
            parameters: None,
        };
        validate_statement(&statement, &settings)?;
        let state = self.storage.read();
        Ok(plan_statement(&state, &statement, &params))
    }

    /// Classify a query without executing it
    ///
    /// # Returns
    /// * `Ok(QueryInfo)` - The statement kind and whether it is read-only
    /// * `Err(ExecutionError)` - The query does not parse
    pub fn analyze_query(&self, query_text: &str) -> ExecResult<QueryInfo> {
        let statement = parse_query(query_text)?.statement;
        let is_read_only = match statement.inner() {
            Statement::Query(query) => !query.is_updating(),
            Statement::Schema(command) => is_show(command),
            Statement::Transaction(_) => true,
            Statement::Explain(_) | Statement::Profile(_) => true,
        };
        let query_type = match &statement {
            Statement::Explain(_) => QueryType::Explain,
            Statement::Profile(_) => QueryType::Profile,
            Statement::Schema(_) => QueryType::Schema,
            Statement::Transaction(_) => QueryType::Transaction,
            Statement::Query(_) if is_read_only => QueryType::Read,
            Statement::Query(_) => QueryType::Write,
        };
        Ok(QueryInfo {
            query_type,
            is_read_only,
            uses_aggregation: calls_any(query_text, AGGREGATE_FUNCTIONS),
            is_deterministic: !calls_any(query_text, NONDETERMINISTIC_FUNCTIONS),
        })
    }

    /// Load nodes and relationships from a JSON document in one transaction
    ///
    /// Ids in the document are kept. Either everything is imported or
    /// nothing is.
    pub fn import_json(&self, text: &str) -> ExecResult<ImportReport> {
        self.ensure_open()?;
        let document = GraphDocument::parse(text)?;
        let mut transaction = self.transactions.begin(None);
        let prepared = {
            let state = self.storage.read();
            document.into_mutations(&transaction.view(&state))
        };
        let (mutations, report) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.transactions.rollback(&mut transaction);
                return Err(e.into());
            }
        };
        for mutation in mutations {
            transaction.record(mutation);
        }
        self.commit(&mut transaction, None)?;
        info!(
            "Imported {} nodes and {} relationships",
            report.nodes_imported, report.relationships_imported
        );
        Ok(report)
    }

    /// Every node and relationship as JSON, sorted by id
    pub fn export_json(&self) -> ExecResult<String> {
        let document = GraphDocument::from_state(&self.storage.read());
        document
            .to_json_string()
            .map_err(|e| ExecutionError::RuntimeError(e.to_string()))
    }

    /// Snapshot committed state and truncate the WAL behind it
    pub fn compact(&self) -> ExecResult<CompactionReport> {
        self.ensure_open()?;
        let durability = self.durability.as_ref().ok_or_else(|| {
            ExecutionError::StorageError("Compaction needs a data directory".to_string())
        })?;
        durability.compactor.compact().map_err(storage_error)
    }

    /// What recovery found when the database was opened
    pub fn recovery_report(&self) -> Option<&RecoveryReport> {
        self.durability.as_ref().map(|d| &d.recovery)
    }

    pub fn stats(&self) -> DatabaseStats {
        let (graph, index_count, constraint_count) = {
            let state = self.storage.read();
            (
                state.graph.stats(),
                state.indexes.definitions().len(),
                state.constraints.definitions().len(),
            )
        };
        let wal = self.transactions.wal();
        DatabaseStats {
            node_count: graph.node_count,
            relationship_count: graph.edge_count,
            label_counts: graph.label_counts,
            relationship_type_counts: graph.type_counts,
            index_count,
            constraint_count,
            storage_type: self.storage.storage_type(),
            wal_last_seq: wal.map(|w| w.last_seq()),
            wal_size_bytes: wal.and_then(|w| w.size_bytes().ok()),
            active_sessions: self.sessions.read().len(),
            transactions: self.transactions.statistics(),
            events_published: self.events.published_count(),
            events_dropped: self.events.dropped_count(),
        }
    }

    /// Register an extension's hooks and event subscriber
    pub fn register_extension(
        &self,
        extension: Arc<dyn Extension>,
    ) -> Result<ExtensionDescriptor, ExtensionError> {
        self.extensions
            .write()
            .register(extension.as_ref(), &self.events)
    }

    pub fn extensions(&self) -> Vec<ExtensionDescriptor> {
        self.extensions.read().descriptors().to_vec()
    }

    /// Roll back open transactions and stop background work
    ///
    /// Later calls are rejected. Calling this again does nothing.
    pub fn shutdown(&self) -> ExecResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let sessions: Vec<_> = self.sessions.write().drain().collect();
        for (id, session) in sessions {
            if let Some(mut transaction) = session.lock().transaction.take() {
                debug!("Rolling back open transaction of session {}", id);
                self.transactions.rollback(&mut transaction);
            }
        }
        if let Some(durability) = &self.durability {
            durability.compaction.shutdown();
        }
        self.events.shutdown();
        if let Some(wal) = self.transactions.wal() {
            wal.close().map_err(storage_error)?;
        }
        self.storage.shutdown()?;
        info!("CypherLite database shut down");
        Ok(())
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> ExecResult<()> {
        if self.is_shutdown() {
            return Err(ExecutionError::StorageError(
                "The database has been shut down".to_string(),
            ));
        }
        Ok(())
    }

    fn session(&self, session_id: &str) -> ExecResult<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| session_not_found(session_id))
    }
}

impl Drop for QueryCoordinator {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Database did not shut down cleanly: {}", e);
        }
    }
}

impl std::fmt::Debug for QueryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCoordinator")
            .field("data_dir", &self.config.data_dir)
            .field("storage", &self.storage)
            .field("transactions", &self.transactions)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

fn into_result(execution: Execution) -> QueryResult {
    let Execution {
        output,
        counters,
        warnings,
        plan,
    } = execution;
    let mut result = QueryResult::with_columns(output.columns);
    result.rows = output
        .rows
        .into_iter()
        .map(|values| Row::from_positional(values, &result.variables))
        .collect();
    result.rows_affected = counters.total();
    result.counters = counters;
    result.warnings = warnings;
    result.plan = plan;
    result
}

fn is_show(command: &SchemaCommand) -> bool {
    matches!(command, SchemaCommand::ShowIndexes | SchemaCommand::ShowConstraints)
}

fn storage_error(error: impl std::fmt::Display) -> ExecutionError {
    ExecutionError::StorageError(error.to_string())
}

fn rejected(error: ExtensionError) -> ExecutionError {
    ExecutionError::Rejected(error.to_string())
}

fn session_not_found(session_id: &str) -> ExecutionError {
    ExecutionError::NotFound(format!("Session not found: {}", session_id))
}

fn no_transaction() -> ExecutionError {
    ExecutionError::TransactionError("No transaction is active in this session".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{PreActionHook, PreRequestHook};

    fn db() -> Arc<QueryCoordinator> {
        QueryCoordinator::in_memory().unwrap()
    }

    fn count(db: &QueryCoordinator, query: &str) -> i64 {
        db.execute(query, HashMap::new())
            .unwrap()
            .single_value()
            .and_then(Value::as_integer)
            .unwrap()
    }

    #[test]
    fn test_auto_commit_and_counters() {
        let db = db();
        let result = db
            .execute("CREATE (:Person {name: 'Ann'})-[:KNOWS]->(:Person {name: 'Bob'})", HashMap::new())
            .unwrap();
        assert_eq!(result.counters.nodes_created, 2);
        assert_eq!(result.counters.relationships_created, 1);
        assert_eq!(result.rows_affected, result.counters.total());
        assert_eq!(count(&db, "MATCH (p:Person) RETURN count(p)"), 2);
    }

    #[test]
    fn test_session_transaction_isolation_and_rollback() {
        let db = db();
        let session = db.create_simple_session("writer").unwrap();
        db.process_query("BEGIN", &session).unwrap();
        db.process_query("CREATE (:Temp)", &session).unwrap();

        let own = db.process_query("MATCH (t:Temp) RETURN count(t)", &session).unwrap();
        assert_eq!(own.single_value(), Some(&Value::Integer(1)));
        assert_eq!(count(&db, "MATCH (t:Temp) RETURN count(t)"), 0);

        db.process_query("ROLLBACK", &session).unwrap();
        assert_eq!(count(&db, "MATCH (t:Temp) RETURN count(t)"), 0);

        db.begin_transaction(&session).unwrap();
        db.process_query("CREATE (:Temp)", &session).unwrap();
        db.commit_transaction(&session).unwrap();
        assert_eq!(count(&db, "MATCH (t:Temp) RETURN count(t)"), 1);
    }

    #[test]
    fn test_transaction_commands_need_session_and_state() {
        let db = db();
        assert!(matches!(
            db.execute("BEGIN", HashMap::new()),
            Err(ExecutionError::TransactionError(_))
        ));
        let session = db.create_simple_session("s").unwrap();
        assert!(matches!(
            db.process_query("COMMIT", &session),
            Err(ExecutionError::TransactionError(_))
        ));
        db.begin_transaction(&session).unwrap();
        assert!(matches!(
            db.begin_transaction(&session),
            Err(ExecutionError::TransactionError(_))
        ));
        assert!(matches!(
            db.process_query("CREATE INDEX FOR (p:Person) ON (p.name)", &session),
            Err(ExecutionError::TransactionError(_))
        ));
        assert!(matches!(
            db.process_query("MATCH (n) RETURN n", "missing"),
            Err(ExecutionError::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_statement_keeps_earlier_writes_of_transaction() {
        let db = db();
        let session = db.create_simple_session("s").unwrap();
        db.begin_transaction(&session).unwrap();
        db.process_query("CREATE (:Kept)", &session).unwrap();
        assert!(db
            .process_query("CREATE (:Dropped) WITH 1 AS x RETURN 1 / 0", &session)
            .is_err());
        db.commit_transaction(&session).unwrap();
        assert_eq!(count(&db, "MATCH (k:Kept) RETURN count(k)"), 1);
        assert_eq!(count(&db, "MATCH (d:Dropped) RETURN count(d)"), 0);
    }

    #[test]
    fn test_constraint_violation_rolls_back() {
        let db = db();
        db.execute(
            "CREATE CONSTRAINT person_email FOR (p:Person) REQUIRE p.email IS UNIQUE",
            HashMap::new(),
        )
        .unwrap();
        db.execute("CREATE (:Person {email: 'a@x'})", HashMap::new()).unwrap();
        let err = db
            .execute("CREATE (:Person {email: 'b@x'}), (:Person {email: 'a@x'})", HashMap::new())
            .unwrap_err();
        assert!(matches!(err, ExecutionError::ConstraintViolation(_)));
        assert_eq!(count(&db, "MATCH (p:Person) RETURN count(p)"), 1);
    }

    #[test]
    fn test_parameters_and_validation() {
        let db = db();
        let mut params = HashMap::new();
        params.insert("name".to_string(), Value::String("Ann".into()));
        db.execute("CREATE (:Person {name: $name})", params.clone()).unwrap();
        let result = db
            .execute("MATCH (p:Person {name: $name}) RETURN p.name AS name", params)
            .unwrap();
        assert_eq!(result.variables, vec!["name"]);
        assert_eq!(result.rows[0].get_value("name"), Some(&Value::String("Ann".into())));

        assert!(matches!(
            db.execute("MATCH (p) RETURN p.name = $missing", HashMap::new()),
            Err(ExecutionError::SemanticError(_))
        ));
        assert!(matches!(
            db.execute("MATCH (n RETURN n", HashMap::new()),
            Err(ExecutionError::SyntaxError { .. })
        ));
    }

    #[test]
    fn test_explain_and_profile() {
        let db = db();
        db.execute("UNWIND range(1, 5) AS i CREATE (:N {i: i})", HashMap::new())
            .unwrap();

        let explained = db.execute("EXPLAIN MATCH (n:N) RETURN n", HashMap::new()).unwrap();
        assert!(explained.rows.is_empty());
        let plan = explained.plan.unwrap();
        assert!(plan.find("NodeByLabelScan").is_some());
        assert!(plan.rows.is_none());

        let profiled = db
            .execute("PROFILE MATCH (n:N) WHERE n.i > 2 RETURN n.i", HashMap::new())
            .unwrap();
        assert_eq!(profiled.rows.len(), 3);
        let plan = profiled.plan.unwrap();
        assert_eq!(plan.rows, Some(3));
        assert_eq!(plan.db_hits, Some(0));
        assert!(plan.time_ms.is_some());
        assert_eq!(plan.find("NodeByLabelScan").and_then(|p| p.rows), Some(5));

        let direct = db.explain_query("MATCH (n:N) RETURN n").unwrap();
        assert_eq!(direct.operator, "ProduceResults");
    }

    #[test]
    fn test_analyze_query() {
        let db = db();
        let read = db.analyze_query("MATCH (n) RETURN n").unwrap();
        assert_eq!(read.query_type, QueryType::Read);
        assert!(read.is_read_only);
        let write = db.analyze_query("MATCH (n) SET n.x = 1").unwrap();
        assert_eq!(write.query_type, QueryType::Write);
        assert!(!write.is_read_only);
        let show = db.analyze_query("SHOW INDEXES").unwrap();
        assert_eq!(show.query_type, QueryType::Schema);
        assert!(show.is_read_only);
        assert_eq!(
            db.analyze_query("PROFILE CREATE (n)").unwrap(),
            QueryInfo {
                query_type: QueryType::Profile,
                is_read_only: false,
                uses_aggregation: false,
                is_deterministic: true,
            }
        );

        let grouped = db
            .analyze_query("MATCH (p:Person) RETURN p.city, COUNT (p) AS n, rand() AS r")
            .unwrap();
        assert!(grouped.uses_aggregation);
        assert!(!grouped.is_deterministic);
        let plain = db
            .analyze_query("MATCH (c:Count) RETURN c.count, c.rand")
            .unwrap();
        assert!(!plain.uses_aggregation);
        assert!(plain.is_deterministic);
    }

    #[test]
    fn test_cancellation_and_timeout() {
        let db = db();
        db.execute("UNWIND range(1, 50) AS i CREATE (:N {i: i})", HashMap::new())
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let err = db
            .process_query_with_options(
                "MATCH (a:N), (b:N) CREATE (a)-[:T]->(b)",
                &HashMap::new(),
                None,
                QueryOptions::default().with_cancellation(token),
            )
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Aborted(_)));

        let err = db
            .process_query_with_options(
                "MATCH (a:N), (b:N), (c:N) RETURN count(*)",
                &HashMap::new(),
                None,
                QueryOptions::default().with_timeout(Duration::from_nanos(1)),
            )
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Aborted(_)));
        assert_eq!(count(&db, "MATCH ()-[r:T]->() RETURN count(r)"), 0);
    }

    struct Guard;

    impl PreRequestHook for Guard {
        fn before_request(&self, request: &RequestInfo<'_>) -> Result<(), String> {
            if request.query.contains("Secret") {
                Err("label not permitted".to_string())
            } else {
                Ok(())
            }
        }
    }

    impl PreActionHook for Guard {
        fn before_commit(&self, action: &ActionInfo<'_>) -> Result<(), String> {
            if action.mutations.len() > 2 {
                Err("too many changes".to_string())
            } else {
                Ok(())
            }
        }
    }

    impl Extension for Guard {
        fn descriptor(&self) -> ExtensionDescriptor {
            ExtensionDescriptor::new("guard", "1.0.0")
        }

        fn pre_request(&self) -> Option<Arc<dyn PreRequestHook>> {
            Some(Arc::new(Guard))
        }

        fn pre_action(&self) -> Option<Arc<dyn PreActionHook>> {
            Some(Arc::new(Guard))
        }
    }

    #[test]
    fn test_extension_hooks_can_veto() {
        let db = db();
        db.register_extension(Arc::new(Guard)).unwrap();
        assert_eq!(db.extensions()[0].name, "guard");

        assert!(matches!(
            db.execute("MATCH (s:Secret) RETURN s", HashMap::new()),
            Err(ExecutionError::Rejected(_))
        ));
        assert!(matches!(
            db.execute("CREATE (:A), (:B), (:C)", HashMap::new()),
            Err(ExecutionError::Rejected(_))
        ));
        assert_eq!(count(&db, "MATCH (n) RETURN count(n)"), 0);
        db.execute("CREATE (:A), (:B)", HashMap::new()).unwrap();
        assert_eq!(count(&db, "MATCH (n) RETURN count(n)"), 2);
    }

    #[test]
    fn test_import_export_round_trip() {
        let db = db();
        let report = db
            .import_json(
                r#"{"nodes":[{"id":"a","labels":["P"],"properties":{"name":"Ann"}},{"id":"b","labels":["P"]}],
                    "relationships":[{"id":"r","type":"KNOWS","startNode":"a","endNode":"b"}]}"#,
            )
            .unwrap();
        assert_eq!(report.nodes_imported, 2);
        assert_eq!(report.relationships_imported, 1);

        let result = db
            .execute("MATCH (a:P {name: 'Ann'})-[:KNOWS]->(b) RETURN b", HashMap::new())
            .unwrap();
        assert_eq!(result.rows[0].get_value("b").and_then(Value::as_node).map(|n| n.id.as_str()), Some("b"));

        let exported = db.export_json().unwrap();
        let copy = QueryCoordinator::in_memory().unwrap();
        copy.import_json(&exported).unwrap();
        assert_eq!(copy.export_json().unwrap(), exported);

        assert!(matches!(db.import_json(&exported), Err(ExecutionError::ImportError(_))));
        assert_eq!(count(&db, "MATCH (n) RETURN count(n)"), 2);
    }

    #[test]
    fn test_shutdown_rejects_later_calls() {
        let db = db();
        let session = db.create_simple_session("s").unwrap();
        db.begin_transaction(&session).unwrap();
        db.shutdown().unwrap();
        db.shutdown().unwrap();
        assert!(db.is_shutdown());
        assert!(db.execute("RETURN 1", HashMap::new()).is_err());
        assert!(db.compact().is_err());
    }
}
