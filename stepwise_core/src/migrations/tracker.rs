use super::MigrationError;
use crate::executor::{BoxError, SqlExecutor, SqlTransaction};
use crate::validation::validate_identifier;
use crate::value::{Row, Value};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default name of the tracking table.
pub const DEFAULT_MIGRATION_TABLE: &str = "schema_migrations";

/// Record of a migration that has been applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedMigration {
    /// The version number of the migration.
    pub version: i64,
    /// The name of the migration.
    pub name: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

/// The table recording which migrations have been applied.
///
/// All reads and writes go through the executor; nothing is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTable {
    name: String,
}

impl Default for MigrationTable {
    fn default() -> Self {
        Self {
            name: DEFAULT_MIGRATION_TABLE.to_string(),
        }
    }
}

impl MigrationTable {
    /// A tracking table called `name`. The name must be a plain identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, MigrationError> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self { name })
    }

    /// The table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `CREATE TABLE IF NOT EXISTS` for the tracking table.
    pub fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (version INTEGER PRIMARY KEY, name TEXT NOT NULL, applied_at TIMESTAMPTZ NOT NULL DEFAULT now())",
            self.name
        )
    }

    /// Reads every applied migration, ascending by version.
    pub fn select_applied_sql(&self) -> String {
        format!(
            "SELECT version, name, applied_at FROM {} ORDER BY version",
            self.name
        )
    }

    /// Records a migration. Binds `$1` version, `$2` name.
    pub fn insert_sql(&self) -> String {
        format!("INSERT INTO {} (version, name) VALUES ($1, $2)", self.name)
    }

    /// Forgets a migration. Binds `$1` version.
    pub fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE version = $1", self.name)
    }

    /// Creates the table if it does not exist yet.
    pub async fn ensure<E: SqlExecutor>(&self, executor: &E) -> Result<(), MigrationError> {
        executor
            .execute_script(&self.create_sql())
            .await
            .map_err(|e| MigrationError::Tracking(Box::new(e)))
    }

    /// Every applied migration, ascending by version.
    pub async fn applied<E: SqlExecutor>(
        &self,
        executor: &E,
    ) -> Result<Vec<AppliedMigration>, MigrationError> {
        self.ensure(executor).await?;
        let rows = executor
            .execute(&self.select_applied_sql(), &[])
            .await
            .map_err(|e| MigrationError::Tracking(Box::new(e)))?;
        rows.iter()
            .map(decode_applied)
            .collect::<Result<_, _>>()
            .map_err(MigrationError::Tracking)
    }

    /// Applied versions, ascending.
    pub async fn applied_versions<E: SqlExecutor>(
        &self,
        executor: &E,
    ) -> Result<Vec<i64>, MigrationError> {
        Ok(self
            .applied(executor)
            .await?
            .into_iter()
            .map(|applied| applied.version)
            .collect())
    }

    /// Records `version` as applied inside `tx`.
    pub async fn record<T: SqlTransaction>(
        &self,
        tx: &mut T,
        version: i64,
        name: &str,
    ) -> Result<(), T::Error> {
        log::debug!("Recording migration {version} in {}", self.name);
        tx.execute(&self.insert_sql(), &[Value::Int(version), Value::from(name)])
            .await?;
        Ok(())
    }

    /// Removes `version` inside `tx`.
    pub async fn remove<T: SqlTransaction>(&self, tx: &mut T, version: i64) -> Result<(), T::Error> {
        log::debug!("Removing migration {version} from {}", self.name);
        tx.execute(&self.delete_sql(), &[Value::Int(version)])
            .await?;
        Ok(())
    }
}

fn decode_applied(row: &Row) -> Result<AppliedMigration, BoxError> {
    let version = row
        .get("version")
        .and_then(Value::as_i64)
        .ok_or("tracking row has no integer version")?;
    let name = row
        .get("name")
        .and_then(Value::as_str)
        .ok_or("tracking row has no name")?
        .to_string();
    let applied_at = row
        .get("applied_at")
        .and_then(Value::as_timestamp)
        .ok_or("tracking row has no applied_at timestamp")?;
    Ok(AppliedMigration {
        version,
        name,
        applied_at,
    })
}
