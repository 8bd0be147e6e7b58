use super::{DEFAULT_SCHEMA, Statement, StatementError};
use crate::validation::validate_identifier;
use crate::value::Value;

/// Builder for simple single-table `SELECT` statements.
///
/// Clauses are always rendered in the order
/// `SELECT … FROM … [WHERE …] [ORDER BY …] [LIMIT …] [OFFSET …]`.
#[derive(Debug, Clone, Default)]
pub struct SelectStatement {
    table: String,
    schema: String,
    columns: Vec<String>,
    filter: Option<(String, Vec<Value>)>,
    order_by: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectStatement {
    /// Selects from `table` in the `public` schema.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            ..Default::default()
        }
    }

    /// Sets the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Restricts the selected columns. Without this the statement selects `*`.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a `WHERE` clause (without the keyword).
    ///
    /// The clause is trusted SQL. Values belong in `params`, referenced from
    /// the clause as `$1`, `$2`, ...
    pub fn filter(mut self, clause: impl Into<String>, params: Vec<Value>) -> Self {
        self.filter = Some((clause.into(), params));
        self
    }

    /// Adds an `ORDER BY` clause (without the keyword). Trusted SQL.
    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    /// Adds `LIMIT`.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Adds `OFFSET`.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Validates identifiers and renders the statement.
    pub fn build(&self) -> Result<Statement, StatementError> {
        validate_identifier(&self.table)?;
        validate_identifier(&self.schema)?;
        for column in &self.columns {
            validate_identifier(column)?;
        }

        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {projection} FROM {}.{}", self.schema, self.table);
        let mut params = Vec::new();

        if let Some((clause, values)) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
            params.extend(values.iter().cloned());
        }
        if let Some(order_by) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        Ok(Statement::with_params(sql, params))
    }
}
