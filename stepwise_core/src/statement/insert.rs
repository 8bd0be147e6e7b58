use super::{DEFAULT_SCHEMA, MAX_BIND_PARAMS, Statement, StatementError, placeholders};
use crate::validation::validate_identifier;
use crate::value::{Row, Value};

/// Builder for single-row and multi-row `INSERT` statements.
///
/// ```
/// use stepwise_core::statement::InsertStatement;
/// use stepwise_core::value::Row;
///
/// let insert = InsertStatement::new("users").columns(["name", "email"]);
/// let stmt = insert
///     .build(&Row::new().with("name", "Alice").with("email", "a@x"))
///     .unwrap();
/// assert_eq!(stmt.sql, "INSERT INTO public.users (name, email) VALUES ($1, $2)");
/// ```
#[derive(Debug, Clone)]
pub struct InsertStatement {
    table: String,
    schema: String,
    columns: Vec<String>,
    on_conflict: Option<String>,
}

impl InsertStatement {
    /// Starts an insert into `table` in the `public` schema.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            columns: Vec::new(),
            on_conflict: None,
        }
    }

    /// Sets the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Sets the target columns. Row values are read in this order.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Appends `ON CONFLICT <clause>`, e.g. `"(email) DO NOTHING"`.
    ///
    /// The clause is trusted SQL and is not validated.
    pub fn on_conflict(mut self, clause: impl Into<String>) -> Self {
        self.on_conflict = Some(clause.into());
        self
    }

    /// The configured columns.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    fn validate(&self) -> Result<(), StatementError> {
        validate_identifier(&self.table)?;
        validate_identifier(&self.schema)?;
        if self.columns.is_empty() {
            return Err(StatementError::NoColumns);
        }
        for column in &self.columns {
            validate_identifier(column)?;
        }
        Ok(())
    }

    fn render(&self, groups: Vec<String>) -> String {
        let conflict = self
            .on_conflict
            .as_deref()
            .map(|clause| format!(" ON CONFLICT {clause}"))
            .unwrap_or_default();
        format!(
            "INSERT INTO {}.{} ({}) VALUES {}{}",
            self.schema,
            self.table,
            self.columns.join(", "),
            groups.join(", "),
            conflict
        )
    }

    fn row_params<'a>(&'a self, row: &'a Row) -> impl Iterator<Item = Value> + 'a {
        self.columns.iter().map(|column| row.get_or_null(column))
    }

    /// Builds a single-row insert. Columns missing from `row` bind `NULL`.
    pub fn build(&self, row: &Row) -> Result<Statement, StatementError> {
        self.validate()?;
        let group = format!("({})", placeholders(1, self.columns.len()));
        Ok(Statement::with_params(
            self.render(vec![group]),
            self.row_params(row).collect(),
        ))
    }

    /// Builds one insert carrying every row.
    ///
    /// Parameters are flattened row-major: row 0's columns, then row 1's, and
    /// so on, matching the placeholder groups.
    pub fn build_batch(&self, rows: &[Row]) -> Result<Statement, StatementError> {
        self.validate()?;
        if rows.is_empty() {
            return Err(StatementError::EmptyBatch);
        }
        let width = self.columns.len();
        let total = width * rows.len();
        if total > MAX_BIND_PARAMS {
            return Err(StatementError::TooManyParameters(total));
        }

        let mut groups = Vec::with_capacity(rows.len());
        let mut params = Vec::with_capacity(total);
        for (index, row) in rows.iter().enumerate() {
            groups.push(format!("({})", placeholders(index * width + 1, width)));
            params.extend(self.row_params(row));
        }
        Ok(Statement::with_params(self.render(groups), params))
    }

    /// Splits `rows` into statements of at most `rows_per_statement` rows.
    ///
    /// An empty input yields no statements.
    pub fn build_chunks(
        &self,
        rows: &[Row],
        rows_per_statement: usize,
    ) -> Result<Vec<Statement>, StatementError> {
        if rows_per_statement == 0 {
            return Err(StatementError::InvalidChunkSize);
        }
        self.validate()?;
        rows.chunks(rows_per_statement)
            .map(|chunk| self.build_batch(chunk))
            .collect()
    }
}
