//! SQL statement construction.
//!
//! Every builder here produces a [`Statement`]: SQL text plus the parameters
//! bound to its `$n` placeholders. Identifiers are validated and interpolated;
//! data values only ever travel in [`Statement::params`]. Validation happens
//! before any text is produced, so a failing build never yields a partial
//! statement.

mod ddl;
mod insert;
mod select;

pub use ddl::{
    CreateHypertable, CreateIndex, EnableCompression, add_compression_policy,
    add_retention_policy,
};
pub use insert::InsertStatement;
pub use select::SelectStatement;

use crate::validation::IdentifierError;
use crate::value::Value;

/// Largest number of bind parameters a single Postgres statement accepts.
pub const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// Schema used when a builder is not given one.
pub const DEFAULT_SCHEMA: &str = "public";

/// SQL text together with its bound parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// The SQL text, using `$1`, `$2`, ... placeholders.
    pub sql: String,
    /// Parameters for the placeholders, positionally.
    pub params: Vec<Value>,
}

impl Statement {
    /// A statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A statement with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Errors produced while building a statement.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StatementError {
    /// An identifier, interval or index method failed validation.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    /// An INSERT was built without columns.
    #[error("INSERT requires at least one column")]
    NoColumns,

    /// A batch INSERT was built without rows.
    #[error("batch INSERT requires at least one row")]
    EmptyBatch,

    /// The statement would bind more parameters than Postgres accepts.
    #[error("statement binds {0} parameters, Postgres accepts at most {MAX_BIND_PARAMS}")]
    TooManyParameters(usize),

    /// A chunked build was asked for zero rows per statement.
    #[error("rows per statement must be greater than zero")]
    InvalidChunkSize,
}

/// Renders `count` numbered placeholders starting at `$first`.
pub(crate) fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|n| format!("${n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered_from_first() {
        assert_eq!(placeholders(1, 3), "$1, $2, $3");
        assert_eq!(placeholders(4, 2), "$4, $5");
        assert_eq!(placeholders(1, 0), "");
    }
}
