//! The seam between the core and a SQL driver.
//!
//! Everything in this crate that talks to a database does so through
//! [`SqlExecutor`]. Migrations bind their body and the tracking-table write
//! into one [`SqlTransaction`].

use crate::statement::Statement;
use crate::value::{Row, Value};
use async_trait::async_trait;

/// Boxed error used where executor errors of different backends meet.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Something that can run SQL and hand out transactions.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Error produced by this executor and its transactions.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Transaction handle returned by [`SqlExecutor::begin`].
    type Transaction: SqlTransaction<Error = Self::Error>;

    /// Runs one parameterized statement.
    ///
    /// Returns the result rows, or an empty vector for statements without a
    /// result set.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Self::Error>;

    /// Runs unparameterized SQL that may contain several statements.
    async fn execute_script(&self, sql: &str) -> Result<(), Self::Error>;

    /// Opens a transaction.
    async fn begin(&self) -> Result<Self::Transaction, Self::Error>;

    /// Runs a built [`Statement`].
    async fn execute_statement(&self, statement: &Statement) -> Result<Vec<Row>, Self::Error> {
        self.execute(&statement.sql, &statement.params).await
    }
}

/// A unit of work opened by [`SqlExecutor::begin`].
///
/// Dropping a transaction without calling [`SqlTransaction::commit`] rolls it
/// back.
#[async_trait]
pub trait SqlTransaction: Send {
    /// Error produced by the transaction.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs one parameterized statement inside the transaction.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Self::Error>;

    /// Runs unparameterized, possibly multi-statement SQL inside the
    /// transaction.
    async fn execute_script(&mut self, sql: &str) -> Result<(), Self::Error>;

    /// Commits the transaction.
    async fn commit(self) -> Result<(), Self::Error>;

    /// Rolls the transaction back.
    async fn rollback(self) -> Result<(), Self::Error>;
}
