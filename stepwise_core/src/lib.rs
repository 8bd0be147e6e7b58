//! # Stepwise core
//!
//! Driver-independent building blocks: SQL values, identifier validation,
//! statement builders, the executor traits and the file-based migration
//! engine.

#![deny(missing_docs)]

pub mod database;
pub mod executor;
pub mod migrations;
pub mod statement;
pub mod validation;
pub mod value;

pub mod prelude {
    //! The prelude module for the `stepwise_core` crate.
    pub use super::database::{Database, DatabaseError};
    pub use super::executor::{BoxError, SqlExecutor, SqlTransaction};
    pub use super::migrations::{
        AppliedMigration, Migration, MigrationError, MigrationStatus, MigrationTable, Migrator,
    };
    pub use super::statement::{
        CreateHypertable, CreateIndex, EnableCompression, InsertStatement, SelectStatement,
        Statement, StatementError,
    };
    pub use super::validation::{
        IdentifierError, IndexMethod, validate_identifier, validate_identifiers,
        validate_index_method, validate_interval,
    };
    pub use super::value::{IntoRow, Record, Row, Value};
}
