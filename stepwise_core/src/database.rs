//! A thin facade pairing an executor with the statement builders.

use crate::executor::{BoxError, SqlExecutor, SqlTransaction};
use crate::migrations::{MigrationError, Migrator};
use crate::statement::{
    CreateHypertable, CreateIndex, EnableCompression, InsertStatement, SelectStatement,
    Statement, StatementError, add_compression_policy, add_retention_policy,
};
use crate::value::{IntoRow, Record, Row, Value};
use std::path::PathBuf;

/// Rows per `INSERT` when a batch is split.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Errors returned by [`Database`].
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The statement could not be built.
    #[error(transparent)]
    Statement(#[from] StatementError),

    /// The executor rejected the statement.
    #[error("Query failed: {0}")]
    Execute(#[source] BoxError),

    /// A result row did not have the expected shape.
    #[error("Unexpected result row: missing text column {0:?}")]
    Decode(String),
}

fn execute_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> DatabaseError {
    DatabaseError::Execute(Box::new(e))
}

/// Convenience operations over a [`SqlExecutor`].
#[derive(Debug, Clone)]
pub struct Database<E> {
    executor: E,
    batch_size: usize,
}

impl<E: SqlExecutor> Database<E> {
    /// Wraps an executor.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets the number of rows per `INSERT` used by the batch operations.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// The wrapped executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// A migrator for `directory` sharing this database's executor.
    pub fn migrator(&self, directory: impl Into<PathBuf>) -> Result<Migrator<E>, MigrationError>
    where
        E: Clone,
    {
        Migrator::new(self.executor.clone(), directory)
    }

    /// Runs a parameterized statement and returns its rows.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        self.executor
            .execute(sql, params)
            .await
            .map_err(execute_error)
    }

    /// Runs unparameterized, possibly multi-statement SQL.
    pub async fn execute_script(&self, sql: &str) -> Result<(), DatabaseError> {
        self.executor
            .execute_script(sql)
            .await
            .map_err(execute_error)
    }

    /// Runs a built statement.
    pub async fn run(&self, statement: &Statement) -> Result<Vec<Row>, DatabaseError> {
        log::debug!("Executing: {}", statement.sql);
        self.executor
            .execute_statement(statement)
            .await
            .map_err(execute_error)
    }

    /// Inserts one row into `public.<table>`, using the row's own columns.
    pub async fn insert(&self, table: &str, row: impl IntoRow) -> Result<(), DatabaseError> {
        let row = row.into_row();
        let statement = InsertStatement::new(table)
            .columns(row.columns())
            .build(&row)?;
        self.run(&statement).await?;
        Ok(())
    }

    /// Inserts `rows` with `insert`, split into statements of at most the
    /// configured batch size, all inside one transaction.
    ///
    /// Returns the number of rows sent. An empty input sends nothing.
    pub async fn insert_batch(
        &self,
        insert: &InsertStatement,
        rows: &[Row],
    ) -> Result<usize, DatabaseError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let statements = insert.build_chunks(rows, self.batch_size)?;

        let mut tx = self.executor.begin().await.map_err(execute_error)?;
        for statement in &statements {
            tx.execute(&statement.sql, &statement.params)
                .await
                .map_err(execute_error)?;
        }
        tx.commit().await.map_err(execute_error)?;

        log::debug!(
            "Inserted {} rows in {} statements",
            rows.len(),
            statements.len()
        );
        Ok(rows.len())
    }

    /// Inserts typed records into `public.<table>`.
    pub async fn insert_records<T, I>(&self, table: &str, records: I) -> Result<usize, DatabaseError>
    where
        T: Record,
        I: IntoIterator<Item = T>,
    {
        let rows: Vec<Row> = records.into_iter().map(IntoRow::into_row).collect();
        let insert = InsertStatement::new(table).columns(T::COLUMNS.iter().copied());
        self.insert_batch(&insert, &rows).await
    }

    /// Runs a select.
    pub async fn select(&self, select: &SelectStatement) -> Result<Vec<Row>, DatabaseError> {
        self.run(&select.build()?).await
    }

    /// Creates an index.
    pub async fn create_index(&self, index: &CreateIndex) -> Result<(), DatabaseError> {
        self.run(&index.build()?).await?;
        Ok(())
    }

    /// Turns a table into a TimescaleDB hypertable.
    pub async fn create_hypertable(&self, hypertable: &CreateHypertable) -> Result<(), DatabaseError> {
        self.run(&hypertable.build()?).await?;
        Ok(())
    }

    /// Enables TimescaleDB compression on a hypertable.
    pub async fn enable_compression(
        &self,
        compression: &EnableCompression,
    ) -> Result<(), DatabaseError> {
        self.run(&compression.build()?).await?;
        Ok(())
    }

    /// Compresses chunks older than `compress_after`, e.g. `"7 days"`.
    pub async fn add_compression_policy(
        &self,
        schema: &str,
        table: &str,
        compress_after: &str,
    ) -> Result<(), DatabaseError> {
        self.run(&add_compression_policy(schema, table, compress_after)?)
            .await?;
        Ok(())
    }

    /// Drops chunks older than `drop_after`, e.g. `"90 days"`.
    pub async fn add_retention_policy(
        &self,
        schema: &str,
        table: &str,
        drop_after: &str,
    ) -> Result<(), DatabaseError> {
        self.run(&add_retention_policy(schema, table, drop_after)?)
            .await?;
        Ok(())
    }

    /// User schemas, sorted. `pg_*` and `information_schema` are left out.
    pub async fn list_schemas(&self) -> Result<Vec<String>, DatabaseError> {
        let rows = self
            .execute(
                "SELECT schema_name::text AS schema_name FROM information_schema.schemata WHERE schema_name NOT LIKE 'pg_%' AND schema_name != 'information_schema' ORDER BY schema_name",
                &[],
            )
            .await?;
        text_column(&rows, "schema_name")
    }

    /// Whether schema `name` exists.
    pub async fn schema_exists(&self, name: &str) -> Result<bool, DatabaseError> {
        let rows = self
            .execute(
                "SELECT 1 FROM information_schema.schemata WHERE schema_name = $1",
                &[Value::from(name)],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    /// Base tables in `schema`, sorted.
    pub async fn list_tables(&self, schema: &str) -> Result<Vec<String>, DatabaseError> {
        let rows = self
            .execute(
                "SELECT table_name::text AS table_name FROM information_schema.tables WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name",
                &[Value::from(schema)],
            )
            .await?;
        text_column(&rows, "table_name")
    }

    /// Whether `schema.name` exists.
    pub async fn table_exists(&self, schema: &str, name: &str) -> Result<bool, DatabaseError> {
        let rows = self
            .execute(
                "SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2",
                &[Value::from(schema), Value::from(name)],
            )
            .await?;
        Ok(!rows.is_empty())
    }
}

fn text_column(rows: &[Row], column: &str) -> Result<Vec<String>, DatabaseError> {
    rows.iter()
        .map(|row| {
            row.get(column)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| DatabaseError::Decode(column.to_string()))
        })
        .collect()
}
