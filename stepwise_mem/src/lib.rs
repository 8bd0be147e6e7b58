//! # Stepwise memory executor
//!
//! An in-memory [`SqlExecutor`], primarily for testing code built on
//! `stepwise_core` without a database.
//!
//! The executor does not interpret SQL. It understands the statements of one
//! migration tracking table (created, read, inserted into and deleted from
//! exactly as a real database would), records every other statement it is
//! given, and can be told to fail statements or return canned rows.
//!
//! ```ignore
//! use stepwise_core::migrations::Migrator;
//! use stepwise_mem::InMemoryExecutor;
//!
//! let executor = InMemoryExecutor::new();
//! let migrator = Migrator::new(executor.clone(), "migrations")?;
//! migrator.migrate(None).await?;
//!
//! assert_eq!(executor.applied_versions().await, vec![1, 2]);
//! ```

#![deny(missing_docs)]

mod transaction;

pub use transaction::InMemoryTransaction;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use stepwise_core::executor::SqlExecutor;
use stepwise_core::migrations::MigrationTable;
use stepwise_core::statement::Statement;
use stepwise_core::value::{Row, Value};
use tokio::sync::Mutex;

/// Errors raised by the in-memory executor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InMemoryExecutorError {
    /// The statement contained a marker registered with
    /// [`InMemoryExecutor::fail_on`].
    #[error("Statement rejected: contains failure marker {0:?}")]
    Injected(String),

    /// A migration version was recorded twice.
    #[error("Duplicate key value violates primary key: version {0} is already recorded")]
    DuplicateVersion(i64),

    /// The tracking table was used before being created.
    #[error("Relation {0:?} does not exist")]
    UndefinedTable(String),

    /// A tracking-table statement was given the wrong parameters.
    #[error("Unexpected parameters for: {0}")]
    BadParameters(String),
}

#[derive(Debug, Clone)]
pub(crate) struct TrackingRow {
    pub(crate) name: String,
    pub(crate) applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    pub(crate) tracking_created: bool,
    pub(crate) tracking: BTreeMap<i64, TrackingRow>,
    pub(crate) executed: Vec<Statement>,
    pub(crate) failures: Vec<String>,
    pub(crate) responses: Vec<(String, Vec<Row>)>,
}

impl State {
    pub(crate) fn check_failure(&self, sql: &str) -> Result<(), InMemoryExecutorError> {
        match self.failures.iter().find(|marker| sql.contains(marker.as_str())) {
            Some(marker) => Err(InMemoryExecutorError::Injected(marker.clone())),
            None => Ok(()),
        }
    }

    pub(crate) fn response(&self, sql: &str) -> Vec<Row> {
        self.responses
            .iter()
            .find(|(marker, _)| sql.contains(marker.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }

    fn tracking_rows(&self) -> Vec<Row> {
        self.tracking
            .iter()
            .map(|(version, row)| {
                Row::new()
                    .with("version", *version)
                    .with("name", row.name.clone())
                    .with("applied_at", row.applied_at)
            })
            .collect()
    }
}

/// A tracking-table statement recognized by the executor.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TrackingOp {
    Create,
    Select,
    Record { version: i64, name: String },
    Remove { version: i64 },
}

pub(crate) fn parse_tracking(
    table: &MigrationTable,
    sql: &str,
    params: &[Value],
) -> Result<Option<TrackingOp>, InMemoryExecutorError> {
    let bad = || InMemoryExecutorError::BadParameters(sql.to_string());
    let op = if sql == table.create_sql() {
        TrackingOp::Create
    } else if sql == table.select_applied_sql() {
        TrackingOp::Select
    } else if sql == table.insert_sql() {
        match params {
            [version, name] => TrackingOp::Record {
                version: version.as_i64().ok_or_else(bad)?,
                name: name.as_str().ok_or_else(bad)?.to_string(),
            },
            _ => return Err(bad()),
        }
    } else if sql == table.delete_sql() {
        match params {
            [version] => TrackingOp::Remove {
                version: version.as_i64().ok_or_else(bad)?,
            },
            _ => return Err(bad()),
        }
    } else {
        return Ok(None);
    };
    Ok(Some(op))
}

/// An in-memory [`SqlExecutor`].
///
/// Clones share state, so a test can keep one handle for inspection while
/// another is moved into a migrator.
#[derive(Debug, Clone)]
pub struct InMemoryExecutor {
    pub(crate) state: Arc<Mutex<State>>,
    pub(crate) lock: Arc<Mutex<()>>,
    pub(crate) table: MigrationTable,
}

impl Default for InMemoryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryExecutor {
    /// An executor tracking migrations in `schema_migrations`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            lock: Arc::new(Mutex::new(())),
            table: MigrationTable::default(),
        }
    }

    /// Understands `table` as the migration tracking table instead.
    pub fn with_tracking_table(mut self, table: MigrationTable) -> Self {
        self.table = table;
        self
    }

    /// Fails every later statement whose SQL contains `marker`.
    pub async fn fail_on(&self, marker: impl Into<String>) {
        self.state.lock().await.failures.push(marker.into());
    }

    /// Removes all failure markers.
    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    /// Returns `rows` for every later statement whose SQL contains `marker`.
    pub async fn respond_to(&self, marker: impl Into<String>, rows: Vec<Row>) {
        self.state.lock().await.responses.push((marker.into(), rows));
    }

    /// Statements run so far, excluding tracking-table statements.
    ///
    /// Statements from transactions appear once the transaction commits.
    pub async fn executed(&self) -> Vec<Statement> {
        self.state.lock().await.executed.clone()
    }

    /// Versions in the tracking table, ascending.
    pub async fn applied_versions(&self) -> Vec<i64> {
        self.state.lock().await.tracking.keys().copied().collect()
    }

    /// Marks `version` as applied without running anything. Creates the
    /// tracking table if needed.
    pub async fn seed_applied(&self, version: i64, name: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.tracking_created = true;
        state.tracking.insert(
            version,
            TrackingRow {
                name: name.into(),
                applied_at: Utc::now(),
            },
        );
    }

    async fn run(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, InMemoryExecutorError> {
        let mut state = self.state.lock().await;
        state.check_failure(sql)?;

        match parse_tracking(&self.table, sql, params)? {
            Some(op) => apply_tracking(&mut state, &self.table, op),
            None => {
                log::debug!("InMemoryExecutor executing: {sql}");
                state.executed.push(Statement::with_params(sql, params.to_vec()));
                Ok(state.response(sql))
            }
        }
    }
}

pub(crate) fn apply_tracking(
    state: &mut State,
    table: &MigrationTable,
    op: TrackingOp,
) -> Result<Vec<Row>, InMemoryExecutorError> {
    if op != TrackingOp::Create && !state.tracking_created {
        return Err(InMemoryExecutorError::UndefinedTable(table.name().to_string()));
    }
    match op {
        TrackingOp::Create => {
            state.tracking_created = true;
            Ok(Vec::new())
        }
        TrackingOp::Select => Ok(state.tracking_rows()),
        TrackingOp::Record { version, name } => {
            if state.tracking.contains_key(&version) {
                return Err(InMemoryExecutorError::DuplicateVersion(version));
            }
            state.tracking.insert(
                version,
                TrackingRow {
                    name,
                    applied_at: Utc::now(),
                },
            );
            Ok(Vec::new())
        }
        TrackingOp::Remove { version } => {
            state.tracking.remove(&version);
            Ok(Vec::new())
        }
    }
}

#[async_trait]
impl SqlExecutor for InMemoryExecutor {
    type Error = InMemoryExecutorError;
    type Transaction = InMemoryTransaction;

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Self::Error> {
        self.run(sql, params).await
    }

    async fn execute_script(&self, sql: &str) -> Result<(), Self::Error> {
        self.run(sql, &[]).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Self::Transaction, Self::Error> {
        let lock = self.lock.clone().lock_owned().await;
        let shadow = {
            let state = self.state.lock().await;
            State {
                tracking_created: state.tracking_created,
                tracking: state.tracking.clone(),
                ..State::default()
            }
        };
        Ok(InMemoryTransaction::new(self.clone(), shadow, lock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::executor::SqlTransaction;

    #[tokio::test]
    async fn records_statements_and_scripted_rows() {
        let executor = InMemoryExecutor::new();
        executor
            .respond_to("FROM users", vec![Row::new().with("id", 1)])
            .await;

        let rows = executor
            .execute("SELECT id FROM users WHERE id = $1", &[Value::Int(1)])
            .await
            .unwrap();
        assert_eq!(rows, vec![Row::new().with("id", 1)]);
        executor.execute_script("VACUUM").await.unwrap();

        let executed = executor.executed().await;
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[0].params, vec![Value::Int(1)]);
        assert_eq!(executed[1].sql, "VACUUM");
    }

    #[tokio::test]
    async fn tracking_table_must_exist_before_use() {
        let executor = InMemoryExecutor::new();
        let table = MigrationTable::default();
        assert_eq!(
            executor.execute(&table.select_applied_sql(), &[]).await,
            Err(InMemoryExecutorError::UndefinedTable(
                "schema_migrations".into()
            ))
        );

        executor.execute_script(&table.create_sql()).await.unwrap();
        assert!(executor
            .execute(&table.select_applied_sql(), &[])
            .await
            .unwrap()
            .is_empty());
        assert!(executor.executed().await.is_empty());
    }

    #[tokio::test]
    async fn failure_markers() {
        let executor = InMemoryExecutor::new();
        executor.fail_on("DROP").await;
        assert_eq!(
            executor.execute_script("DROP TABLE users").await,
            Err(InMemoryExecutorError::Injected("DROP".into()))
        );
        executor.clear_failures().await;
        assert!(executor.execute_script("DROP TABLE users").await.is_ok());
    }

    #[tokio::test]
    async fn transactions_apply_on_commit_only() {
        let executor = InMemoryExecutor::new();
        let table = MigrationTable::default();
        executor.execute_script(&table.create_sql()).await.unwrap();

        let mut tx = executor.begin().await.unwrap();
        tx.execute_script("CREATE TABLE a (id INT)").await.unwrap();
        table.record(&mut tx, 1, "a").await.unwrap();
        tx.rollback().await.unwrap();
        assert!(executor.applied_versions().await.is_empty());
        assert!(executor.executed().await.is_empty());

        let mut tx = executor.begin().await.unwrap();
        tx.execute_script("CREATE TABLE a (id INT)").await.unwrap();
        table.record(&mut tx, 1, "a").await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(executor.applied_versions().await, vec![1]);
        assert_eq!(executor.executed().await.len(), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_changes() {
        let executor = InMemoryExecutor::new();
        let table = MigrationTable::default();
        executor.execute_script(&table.create_sql()).await.unwrap();
        {
            let mut tx = executor.begin().await.unwrap();
            table.record(&mut tx, 7, "seven").await.unwrap();
        }
        assert!(executor.applied_versions().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_versions_are_rejected() {
        let executor = InMemoryExecutor::new();
        let table = MigrationTable::default();
        executor.seed_applied(3, "three").await;

        let mut tx = executor.begin().await.unwrap();
        assert_eq!(
            table.record(&mut tx, 3, "again").await,
            Err(InMemoryExecutorError::DuplicateVersion(3))
        );
    }

    #[tokio::test]
    async fn conflicting_commit_changes_nothing() {
        let executor = InMemoryExecutor::new();
        let table = MigrationTable::default();
        executor.execute_script(&table.create_sql()).await.unwrap();

        let mut tx = executor.begin().await.unwrap();
        tx.execute_script("CREATE TABLE five (id INT)").await.unwrap();
        table.record(&mut tx, 5, "five").await.unwrap();
        table.record(&mut tx, 6, "six").await.unwrap();

        executor
            .execute(&table.insert_sql(), &[Value::Int(6), Value::from("other")])
            .await
            .unwrap();

        assert_eq!(
            tx.commit().await,
            Err(InMemoryExecutorError::DuplicateVersion(6))
        );
        assert_eq!(executor.applied_versions().await, vec![6]);
        assert!(executor.executed().await.is_empty());
    }

    #[tokio::test]
    async fn custom_tracking_table() {
        let table = MigrationTable::new("app_migrations").unwrap();
        let executor = InMemoryExecutor::new().with_tracking_table(table.clone());
        executor.execute_script(&table.create_sql()).await.unwrap();
        executor
            .execute_script(&MigrationTable::default().create_sql())
            .await
            .unwrap();
        assert_eq!(executor.executed().await.len(), 1);
    }
}
