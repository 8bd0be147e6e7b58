//! Session-level advisory lock for coordinating migration runs.
//!
//! The Migrator itself never locks. Deployments that start several
//! processes against one database can hold a [`MigrationLock`] around
//! `migrate()` or `rollback()` so only one of them touches the schema at a
//! time.
//!
//! The lock key is hashed with MD5 into two `int4` halves, giving a 64-bit
//! key space without colliding with integer keys chosen by hand.

use crate::PgExecutorError;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

/// Key used when the caller has no reason to pick one.
pub const DEFAULT_LOCK_KEY: &str = "stepwise_migrations";

/// An acquired advisory lock, pinned to one pooled connection.
///
/// Call [`MigrationLock::release`] when done. A lock dropped without being
/// released closes its connection instead of returning it to the pool, which
/// ends the session and frees the lock.
pub struct MigrationLock {
    conn: Option<PoolConnection<Postgres>>,
    key: String,
}

impl MigrationLock {
    /// Waits until the lock for `key` is free, then takes it.
    pub async fn acquire(pool: &PgPool, key: &str) -> Result<Self, PgExecutorError> {
        let mut conn = pool.acquire().await?;
        log::debug!("Waiting for migration lock '{}'", key);
        sqlx::query(
            r#"
            SELECT pg_advisory_lock(
                ('x' || substr(md5($1), 1, 8))::bit(32)::int,
                ('x' || substr(md5($1), 9, 8))::bit(32)::int
            )
            "#,
        )
        .bind(key)
        .execute(&mut *conn)
        .await?;

        log::info!("Acquired migration lock '{}'", key);
        Ok(Self {
            conn: Some(conn),
            key: key.to_string(),
        })
    }

    /// Takes the lock for `key` if nobody holds it.
    ///
    /// Returns `None` when another session holds the lock.
    pub async fn try_acquire(pool: &PgPool, key: &str) -> Result<Option<Self>, PgExecutorError> {
        let mut conn = pool.acquire().await?;
        let result: (bool,) = sqlx::query_as(
            r#"
            SELECT pg_try_advisory_lock(
                ('x' || substr(md5($1), 1, 8))::bit(32)::int,
                ('x' || substr(md5($1), 9, 8))::bit(32)::int
            )
            "#,
        )
        .bind(key)
        .fetch_one(&mut *conn)
        .await?;

        if !result.0 {
            log::info!("Migration lock '{}' is held by another session", key);
            return Ok(None);
        }

        log::info!("Acquired migration lock '{}'", key);
        Ok(Some(Self {
            conn: Some(conn),
            key: key.to_string(),
        }))
    }

    /// The key this lock was taken for.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the lock and returns the connection to the pool.
    ///
    /// Returns `true` if the lock was released, `false` if it wasn't held.
    pub async fn release(mut self) -> Result<bool, PgExecutorError> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(false);
        };
        let result: Result<(bool,), sqlx::Error> = sqlx::query_as(
            r#"
            SELECT pg_advisory_unlock(
                ('x' || substr(md5($1), 1, 8))::bit(32)::int,
                ('x' || substr(md5($1), 9, 8))::bit(32)::int
            )
            "#,
        )
        .bind(&self.key)
        .fetch_one(&mut *conn)
        .await;

        match result {
            Ok((released,)) => {
                log::info!("Released migration lock '{}'", self.key);
                Ok(released)
            }
            Err(e) => {
                conn.close_on_drop();
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for MigrationLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationLock")
            .field("key", &self.key)
            .field("held", &self.conn.is_some())
            .finish()
    }
}

impl Drop for MigrationLock {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            log::warn!(
                "MigrationLock '{}' dropped without release(). Closing its connection to free the lock.",
                self.key
            );
            conn.close_on_drop();
        }
    }
}
