//! # Stepwise
//!
//! File-based SQL migrations and a validated statement builder for Postgres.
//!
//! The engine lives in `stepwise_core` and is driver independent. Enable the
//! `postgres` feature for the sqlx backend or `in-memory` for an executor
//! that needs no database.

#![deny(missing_docs)]

#[cfg(feature = "derive")]
/// Proc-macros for the `stepwise` crate.
pub mod derive {
    //! Contains proc-macros for the `stepwise` crate.
    pub use stepwise_derive::*;
}

#[cfg(feature = "in-memory")]
/// In-memory executor for tests and development.
pub mod mem {
    //! Contains the in-memory executor.
    pub use stepwise_mem::*;
}

#[cfg(feature = "postgres")]
/// Postgres executor, configuration and migration lock.
pub mod pg {
    //! Contains the sqlx Postgres backend.
    pub use stepwise_pg::*;
}

pub use stepwise_core::{database, executor, migrations, statement, validation, value};

pub mod prelude {
    //! The prelude module for the `stepwise` crate.
    pub use stepwise_core::prelude::*;

    #[cfg(feature = "derive")]
    pub use super::derive::*;
    #[cfg(feature = "in-memory")]
    pub use super::mem::{InMemoryExecutor, InMemoryExecutorError};
    #[cfg(feature = "postgres")]
    pub use super::pg::{MigrationLock, PgConfig, PgExecutor};
}
