//! Index and TimescaleDB statements.

use super::{DEFAULT_SCHEMA, Statement, StatementError};
use crate::validation::{validate_identifier, validate_index_method, validate_interval};
use crate::value::Value;

/// Builder for `CREATE INDEX`.
#[derive(Debug, Clone)]
pub struct CreateIndex {
    table: String,
    schema: String,
    columns: Vec<String>,
    name: Option<String>,
    method: String,
    unique: bool,
    if_not_exists: bool,
}

impl CreateIndex {
    /// Index on `table` over `columns`, btree, `IF NOT EXISTS`.
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            columns: columns.into_iter().map(Into::into).collect(),
            name: None,
            method: "btree".to_string(),
            unique: false,
            if_not_exists: true,
        }
    }

    /// Sets the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Names the index. Defaults to `idx_<table>_<columns>`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the access method (`btree`, `hash`, `gist`, `spgist`, `gin`, `brin`).
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Makes the index unique.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Toggles `IF NOT EXISTS`.
    pub fn if_not_exists(mut self, if_not_exists: bool) -> Self {
        self.if_not_exists = if_not_exists;
        self
    }

    /// Validates and renders the statement.
    pub fn build(&self) -> Result<Statement, StatementError> {
        validate_identifier(&self.table)?;
        validate_identifier(&self.schema)?;
        if self.columns.is_empty() {
            return Err(StatementError::NoColumns);
        }
        for column in &self.columns {
            validate_identifier(column)?;
        }
        if let Some(name) = &self.name {
            validate_identifier(name)?;
        }
        let method = validate_index_method(&self.method)?;

        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("idx_{}_{}", self.table, self.columns.join("_")));
        let unique = if self.unique { "UNIQUE " } else { "" };
        let if_not_exists = if self.if_not_exists {
            "IF NOT EXISTS "
        } else {
            ""
        };

        Ok(Statement::new(format!(
            "CREATE {unique}INDEX {if_not_exists}{name} ON {}.{} USING {method} ({})",
            self.schema,
            self.table,
            self.columns.join(", ")
        )))
    }
}

/// Builder for TimescaleDB's `create_hypertable`.
#[derive(Debug, Clone)]
pub struct CreateHypertable {
    table: String,
    schema: String,
    time_column: String,
    chunk_time_interval: String,
    if_not_exists: bool,
    migrate_data: bool,
}

impl CreateHypertable {
    /// Hypertable on `table` partitioned by `time_column`, 1 day chunks.
    pub fn new(table: impl Into<String>, time_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            time_column: time_column.into(),
            chunk_time_interval: "1 day".to_string(),
            if_not_exists: true,
            migrate_data: true,
        }
    }

    /// Sets the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Sets the chunk interval, e.g. `"1 week"`.
    pub fn chunk_time_interval(mut self, interval: impl Into<String>) -> Self {
        self.chunk_time_interval = interval.into();
        self
    }

    /// Toggles `if_not_exists`.
    pub fn if_not_exists(mut self, if_not_exists: bool) -> Self {
        self.if_not_exists = if_not_exists;
        self
    }

    /// Toggles `migrate_data`.
    pub fn migrate_data(mut self, migrate_data: bool) -> Self {
        self.migrate_data = migrate_data;
        self
    }

    /// Validates and renders the statement.
    pub fn build(&self) -> Result<Statement, StatementError> {
        validate_identifier(&self.table)?;
        validate_identifier(&self.schema)?;
        validate_identifier(&self.time_column)?;
        let interval = validate_interval(&self.chunk_time_interval)?;

        Ok(Statement::with_params(
            format!(
                "SELECT * FROM create_hypertable($1::regclass, $2::name, chunk_time_interval => INTERVAL '{interval}', if_not_exists => {}, migrate_data => {})",
                sql_bool(self.if_not_exists),
                sql_bool(self.migrate_data)
            ),
            vec![
                relation(&self.schema, &self.table),
                Value::Text(self.time_column.clone()),
            ],
        ))
    }
}

/// `SELECT add_retention_policy(...)`: drop chunks older than `drop_after`.
pub fn add_retention_policy(
    schema: &str,
    table: &str,
    drop_after: &str,
) -> Result<Statement, StatementError> {
    policy("add_retention_policy", "drop_after", schema, table, drop_after)
}

/// `SELECT add_compression_policy(...)`: compress chunks older than
/// `compress_after`.
pub fn add_compression_policy(
    schema: &str,
    table: &str,
    compress_after: &str,
) -> Result<Statement, StatementError> {
    policy(
        "add_compression_policy",
        "compress_after",
        schema,
        table,
        compress_after,
    )
}

fn policy(
    function: &str,
    argument: &str,
    schema: &str,
    table: &str,
    interval: &str,
) -> Result<Statement, StatementError> {
    validate_identifier(table)?;
    validate_identifier(schema)?;
    let interval = validate_interval(interval)?;
    Ok(Statement::with_params(
        format!("SELECT {function}($1::regclass, {argument} => INTERVAL '{interval}')"),
        vec![relation(schema, table)],
    ))
}

/// Builder for `ALTER TABLE … SET (timescaledb.compress, …)`.
#[derive(Debug, Clone)]
pub struct EnableCompression {
    table: String,
    schema: String,
    segment_by: Vec<String>,
    order_by: Vec<String>,
}

impl EnableCompression {
    /// Enables compression on `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            segment_by: Vec::new(),
            order_by: Vec::new(),
        }
    }

    /// Sets the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Columns to segment compressed data by.
    pub fn segment_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.segment_by = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Ordering of compressed data, e.g. `["ts DESC"]`.
    pub fn order_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Validates and renders the statement.
    pub fn build(&self) -> Result<Statement, StatementError> {
        validate_identifier(&self.table)?;
        validate_identifier(&self.schema)?;
        for column in &self.segment_by {
            validate_identifier(column)?;
        }
        for entry in &self.order_by {
            validate_order_entry(entry)?;
        }

        let mut settings = vec!["timescaledb.compress".to_string()];
        if !self.segment_by.is_empty() {
            settings.push(format!(
                "timescaledb.compress_segmentby = '{}'",
                self.segment_by.join(",")
            ));
        }
        if !self.order_by.is_empty() {
            settings.push(format!(
                "timescaledb.compress_orderby = '{}'",
                self.order_by.join(",")
            ));
        }
        Ok(Statement::new(format!(
            "ALTER TABLE {}.{} SET ({})",
            self.schema,
            self.table,
            settings.join(", ")
        )))
    }
}

/// `column [ASC|DESC] [NULLS FIRST|LAST]`
fn validate_order_entry(entry: &str) -> Result<(), StatementError> {
    let mut words = entry.split_whitespace();
    let column = words.next().unwrap_or_default();
    validate_identifier(column)?;
    let rest: Vec<String> = words.map(str::to_uppercase).collect();
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
    match rest.as_slice() {
        []
        | ["ASC" | "DESC"]
        | ["NULLS", "FIRST" | "LAST"]
        | ["ASC" | "DESC", "NULLS", "FIRST" | "LAST"] => Ok(()),
        _ => Err(crate::validation::IdentifierError::Invalid(entry.to_string()).into()),
    }
}

fn relation(schema: &str, table: &str) -> Value {
    Value::Text(format!("{schema}.{table}"))
}

fn sql_bool(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}
