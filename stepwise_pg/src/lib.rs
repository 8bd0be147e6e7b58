//! # Stepwise postgres backend
//!
//! A [`SqlExecutor`](stepwise_core::executor::SqlExecutor) over a sqlx
//! [`PgPool`](sqlx::PgPool), connection settings read from URLs or the
//! environment, and an advisory lock for serializing migration runs.
//!
//! ```rust,ignore
//! use stepwise_core::migrations::Migrator;
//! use stepwise_pg::{MigrationLock, PgConfig, PgExecutor, DEFAULT_LOCK_KEY};
//!
//! let pool = PgConfig::from_env()?.connect().await?;
//! let lock = MigrationLock::acquire(&pool, DEFAULT_LOCK_KEY).await?;
//! let applied = Migrator::new(PgExecutor::new(pool), "migrations")?
//!     .migrate(None)
//!     .await?;
//! lock.release().await?;
//! ```

#![deny(missing_docs)]

/// Connection and pool settings
pub mod config;

/// The executor implementation for postgres
pub mod executor;

/// Advisory locking around migration runs
pub mod lock;

pub use config::{PgConfig, PgConfigError};
pub use executor::{PgExecutor, PgExecutorError, PgTransaction};
pub use lock::{DEFAULT_LOCK_KEY, MigrationLock};
