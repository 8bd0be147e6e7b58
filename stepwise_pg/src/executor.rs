//! [`SqlExecutor`] backed by a sqlx [`PgPool`].

use crate::config::{PgConfig, PgConfigError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgColumn, PgRow, PgTypeInfo};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo, ValueRef};
use stepwise_core::executor::{SqlExecutor, SqlTransaction};
use stepwise_core::value::{Row, Value};
use uuid::Uuid;

/// Errors returned by [`PgExecutor`] and [`PgTransaction`].
#[derive(Debug, thiserror::Error)]
pub enum PgExecutorError {
    /// The driver or the server reported an error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A result column has a type with no [`Value`] counterpart.
    #[error("Column {column:?} has unsupported type {type_name}; cast it in the query")]
    UnsupportedType {
        /// Column name as reported by the server
        column: String,
        /// Postgres type name
        type_name: String,
    },
}

/// Runs statements against a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    /// Wraps an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool from `config` and wraps it.
    pub async fn connect(config: &PgConfig) -> Result<Self, PgConfigError> {
        Ok(Self::new(config.connect().await?))
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<PgPool> for PgExecutor {
    fn from(pool: PgPool) -> Self {
        Self::new(pool)
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    type Error = PgExecutorError;
    type Transaction = PgTransaction;

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Self::Error> {
        log::trace!("Executing: {sql}");
        let rows = bind_all(sql, params).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute_script(&self, sql: &str) -> Result<(), Self::Error> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Self::Transaction, Self::Error> {
        Ok(PgTransaction::new(self.pool.begin().await?))
    }
}

/// A Postgres transaction.
///
/// Access to the underlying transaction is provided via `Deref` and `DerefMut`,
/// allowing use as a sqlx executor (e.g., `&mut **tx`).
pub struct PgTransaction(sqlx::Transaction<'static, Postgres>);

impl PgTransaction {
    /// Creates a new PgTransaction wrapper.
    pub fn new(tx: sqlx::Transaction<'static, Postgres>) -> Self {
        Self(tx)
    }
}

#[async_trait]
impl SqlTransaction for PgTransaction {
    type Error = PgExecutorError;

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Self::Error> {
        log::trace!("Executing in transaction: {sql}");
        let rows = bind_all(sql, params).fetch_all(&mut *self.0).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute_script(&mut self, sql: &str) -> Result<(), Self::Error> {
        sqlx::Executor::execute(&mut *self.0, sqlx::raw_sql(sql)).await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), Self::Error> {
        self.0.commit().await.map_err(Into::into)
    }

    async fn rollback(self) -> Result<(), Self::Error> {
        self.0.rollback().await.map_err(Into::into)
    }
}

impl std::ops::Deref for PgTransaction {
    type Target = sqlx::Transaction<'static, Postgres>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for PgTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// A `NULL` sent without a parameter type, so the server infers it from
/// context the way it does for a literal `NULL`.
struct UntypedNull;

impl sqlx::Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl sqlx::Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

fn bind_all<'q>(sql: &'q str, params: &'q [Value]) -> Query<'q, Postgres, PgArguments> {
    params.iter().fold(sqlx::query(sql), |query, value| match value {
        Value::Null => query.bind(UntypedNull),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Json(v) => query.bind(sqlx::types::Json(v)),
        Value::Uuid(v) => query.bind(*v),
        Value::Date(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
        Value::TimestampTz(v) => query.bind(*v),
        Value::Bytes(v) => query.bind(v.as_slice()),
    })
}

fn decode_row(row: &PgRow) -> Result<Row, PgExecutorError> {
    let mut out = Row::new();
    for column in row.columns() {
        out.insert(column.name(), decode_value(row, column)?);
    }
    Ok(out)
}

fn decode_value(row: &PgRow, column: &PgColumn) -> Result<Value, PgExecutorError> {
    let index = column.ordinal();
    let value = match column.type_info().name() {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.into(),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.into(),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.into(),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.into(),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.into(),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.into(),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row.try_get::<Option<String>, _>(index)?.into(),
        "JSON" | "JSONB" => row.try_get::<Option<serde_json::Value>, _>(index)?.into(),
        "UUID" => row.try_get::<Option<Uuid>, _>(index)?.into(),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(index)?.into(),
        "TIMESTAMP" => row.try_get::<Option<NaiveDateTime>, _>(index)?.into(),
        "TIMESTAMPTZ" => row.try_get::<Option<DateTime<Utc>>, _>(index)?.into(),
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(index)?.into(),
        "VOID" => Value::Null,
        other => {
            if row.try_get_raw(index)?.is_null() {
                Value::Null
            } else {
                return Err(PgExecutorError::UnsupportedType {
                    column: column.name().to_string(),
                    type_name: other.to_string(),
                });
            }
        }
    };
    Ok(value)
}
