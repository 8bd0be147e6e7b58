//! File-based SQL migrations.
//!
//! Migrations are plain SQL files named `NNN_description.sql` living in one
//! directory. Each file may carry an `-- UP` and a `-- DOWN` section:
//!
//! ```sql
//! -- UP
//! CREATE TABLE users (id SERIAL PRIMARY KEY, name TEXT NOT NULL);
//!
//! -- DOWN
//! DROP TABLE users;
//! ```
//!
//! A file without an `-- UP` marker is applied in full. Applied versions are
//! tracked in a table (`schema_migrations` by default); every migration runs
//! in its own transaction together with its tracking-table write.
//!
//! # Usage
//!
//! ```rust,ignore
//! use stepwise_core::migrations::Migrator;
//!
//! let migrator = Migrator::new(executor, "migrations")?;
//!
//! // Run all pending migrations
//! let applied = migrator.migrate(None).await?;
//! println!("Applied {} migrations", applied.len());
//!
//! // Undo the last one
//! migrator.rollback(1).await?;
//! ```

mod file;
mod section;
mod tracker;

pub use file::{Migration, parse_filename, sanitize_name};
pub use section::{Section, extract_section};
pub use tracker::{AppliedMigration, DEFAULT_MIGRATION_TABLE, MigrationTable};

use crate::executor::{BoxError, SqlExecutor, SqlTransaction};
use crate::validation::IdentifierError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The migrations directory does not exist.
    #[error("Migrations directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// The tracking table name is not a valid identifier.
    #[error("Invalid migration table name: {0}")]
    InvalidTable(#[from] IdentifierError),

    /// A file name does not follow `NNN_description.sql`.
    #[error("Invalid migration filename: {0}. Expected format: NNN_description.sql")]
    InvalidFilename(String),

    /// A migration failed to apply. Its transaction was rolled back.
    #[error("Migration {version:03}_{name} failed: {source}")]
    ApplyFailed {
        /// The version of the migration that failed.
        version: i64,
        /// The name of the migration.
        name: String,
        /// Versions applied earlier in the same call, which stay applied.
        applied: Vec<i64>,
        /// The underlying failure.
        source: BoxError,
    },

    /// An applied version has no file in the migrations directory.
    #[error("Migration file for version {0} not found")]
    MissingFile(i64),

    /// A migration has no usable `-- DOWN` section.
    #[error("No DOWN section in migration {version:03}_{name}")]
    MissingDownSection {
        /// The version of the migration.
        version: i64,
        /// The name of the migration.
        name: String,
    },

    /// A migration failed to roll back. Its transaction was rolled back.
    #[error("Rollback of migration {version:03}_{name} failed: {source}")]
    RollbackFailed {
        /// The version of the migration that failed.
        version: i64,
        /// The name of the migration.
        name: String,
        /// Versions rolled back earlier in the same call, which stay rolled back.
        rolled_back: Vec<i64>,
        /// The underlying failure.
        source: BoxError,
    },

    /// Reading or writing a migration file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying failure.
        source: std::io::Error,
    },

    /// Creating or reading the tracking table failed.
    #[error("Migration tracking table error: {0}")]
    Tracking(#[source] BoxError),

    /// A name passed to [`Migrator::create`] has nothing left after
    /// sanitizing.
    #[error("Invalid migration name: {0:?}")]
    InvalidName(String),

    /// The highest version on disk leaves no room for another migration.
    #[error("No version left after {}", i64::MAX)]
    VersionOverflow,
}

/// Applied and pending migrations at one point in time.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Applied migrations, ascending by version.
    pub applied: Vec<AppliedMigration>,
    /// Pending migrations, ascending by version.
    pub pending: Vec<Migration>,
}

impl MigrationStatus {
    /// Number of applied migrations.
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// Number of pending migrations.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Applies and rolls back the migrations of one directory.
///
/// The migrator holds no state besides its configuration: every call scans
/// the directory and reads the tracking table again.
#[derive(Debug, Clone)]
pub struct Migrator<E> {
    executor: E,
    directory: PathBuf,
    table: MigrationTable,
}

impl<E: SqlExecutor> Migrator<E> {
    /// Creates a migrator for `directory`, which must exist.
    pub fn new(executor: E, directory: impl Into<PathBuf>) -> Result<Self, MigrationError> {
        let directory = directory.into();
        if !directory.is_dir() {
            return Err(MigrationError::DirectoryNotFound(directory));
        }
        Ok(Self {
            executor,
            directory,
            table: MigrationTable::default(),
        })
    }

    /// Tracks applied migrations in `table` instead of `schema_migrations`.
    pub fn with_table(mut self, table: impl Into<String>) -> Result<Self, MigrationError> {
        self.table = MigrationTable::new(table)?;
        Ok(self)
    }

    /// The executor migrations run on.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// The migrations directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The tracking table.
    pub fn table(&self) -> &MigrationTable {
        &self.table
    }

    fn io_error(&self, source: std::io::Error) -> MigrationError {
        MigrationError::Io {
            path: self.directory.clone(),
            source,
        }
    }

    /// Lists the migrations in the directory, ascending by version.
    ///
    /// Files whose names do not parse are skipped with a warning. Files
    /// sharing a version are all kept, in file name order.
    pub async fn discover(&self) -> Result<Vec<Migration>, MigrationError> {
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(|e| self.io_error(e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| self.io_error(e))? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
                continue;
            }
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if is_file {
                paths.push(path);
            }
        }
        paths.sort();

        let mut migrations = Vec::with_capacity(paths.len());
        for path in paths {
            match Migration::from_path(&path) {
                Ok(migration) => migrations.push(migration),
                Err(e) => log::warn!("Skipping {}: {e}", path.display()),
            }
        }
        migrations.sort_by_key(Migration::version);
        Ok(migrations)
    }

    /// Every applied migration, ascending by version.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        self.table.applied(&self.executor).await
    }

    /// Migrations on disk that are not applied, ascending by version, up to
    /// and including `target` when given.
    pub async fn pending(&self, target: Option<i64>) -> Result<Vec<Migration>, MigrationError> {
        let applied: HashSet<i64> = self
            .table
            .applied_versions(&self.executor)
            .await?
            .into_iter()
            .collect();

        Ok(self
            .discover()
            .await?
            .into_iter()
            .filter(|m| !applied.contains(&m.version()))
            .filter(|m| target.is_none_or(|target| m.version() <= target))
            .collect())
    }

    /// Returns the highest applied version (0 if no migrations applied).
    pub async fn current_version(&self) -> Result<i64, MigrationError> {
        Ok(self
            .applied()
            .await?
            .last()
            .map(|applied| applied.version)
            .unwrap_or(0))
    }

    /// Applied and pending migrations.
    ///
    /// The two lists are read one after the other, not atomically.
    pub async fn status(&self) -> Result<MigrationStatus, MigrationError> {
        let applied = self.applied().await?;
        let pending = self.pending(None).await?;
        Ok(MigrationStatus { applied, pending })
    }

    /// Runs pending migrations up to `target` (all when `None`).
    ///
    /// Each migration runs in its own transaction together with its tracking
    /// row. The first failure stops the run; migrations applied before it stay
    /// committed and are listed in [`MigrationError::ApplyFailed`].
    ///
    /// Returns the migrations applied, in order.
    pub async fn migrate(&self, target: Option<i64>) -> Result<Vec<Migration>, MigrationError> {
        self.table.ensure(&self.executor).await?;
        let pending = self.pending(target).await?;
        if pending.is_empty() {
            log::debug!("No pending migrations in {}", self.directory.display());
            return Ok(pending);
        }

        let mut applied: Vec<Migration> = Vec::with_capacity(pending.len());
        for migration in pending {
            log::info!("Running migration {migration}...");

            if let Err(source) = self.apply(&migration).await {
                log::warn!("Migration {migration} failed: {source}");
                return Err(MigrationError::ApplyFailed {
                    version: migration.version(),
                    name: migration.name().to_string(),
                    applied: applied.iter().map(Migration::version).collect(),
                    source,
                });
            }

            log::info!("Migration {migration} applied successfully");
            applied.push(migration);
        }

        Ok(applied)
    }

    async fn apply(&self, migration: &Migration) -> Result<(), BoxError> {
        let sql = migration.up_sql().await?;
        let mut tx = self.executor.begin().await?;
        if sql.is_empty() {
            log::debug!("Migration {migration} has an empty UP section");
        } else {
            tx.execute_script(&sql).await?;
        }
        self.table
            .record(&mut tx, migration.version(), migration.name())
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Rolls back the last `steps` applied migrations, newest first.
    ///
    /// Every file and `-- DOWN` section is resolved before anything runs, so
    /// [`MigrationError::MissingFile`] and [`MigrationError::MissingDownSection`]
    /// leave the database untouched. Each rollback then runs the DOWN section
    /// and removes its tracking row in one transaction. The first failure
    /// stops the run; migrations rolled back before it stay rolled back and
    /// are listed in [`MigrationError::RollbackFailed`].
    ///
    /// Returns the tracking records removed, in the order processed.
    pub async fn rollback(&self, steps: usize) -> Result<Vec<AppliedMigration>, MigrationError> {
        let applied = self.applied().await?;
        let available = self.discover().await?;

        let mut plan = Vec::new();
        for entry in applied.into_iter().rev().take(steps) {
            let migration = available
                .iter()
                .find(|m| m.version() == entry.version)
                .ok_or(MigrationError::MissingFile(entry.version))?;
            let down = migration.down_sql().await?;
            plan.push((entry, migration, down));
        }

        let mut rolled_back: Vec<AppliedMigration> = Vec::with_capacity(plan.len());
        for (entry, migration, down) in plan {
            log::info!("Rolling back migration {migration}...");

            if let Err(source) = self.revert(migration, &down).await {
                log::warn!("Rollback of migration {migration} failed: {source}");
                return Err(MigrationError::RollbackFailed {
                    version: migration.version(),
                    name: migration.name().to_string(),
                    rolled_back: rolled_back.iter().map(|r| r.version).collect(),
                    source,
                });
            }

            log::info!("Migration {migration} rolled back");
            rolled_back.push(entry);
        }

        Ok(rolled_back)
    }

    async fn revert(&self, migration: &Migration, down: &str) -> Result<(), BoxError> {
        let mut tx = self.executor.begin().await?;
        tx.execute_script(down).await?;
        self.table.remove(&mut tx, migration.version()).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Writes a new, empty migration file named after `name` and returns its
    /// path. The tracking table is not touched.
    ///
    /// The version is one past the highest version on disk.
    pub async fn create(&self, name: &str) -> Result<PathBuf, MigrationError> {
        let safe_name = sanitize_name(name);
        if safe_name.is_empty() {
            return Err(MigrationError::InvalidName(name.to_string()));
        }

        let version = self
            .discover()
            .await?
            .iter()
            .map(Migration::version)
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or(MigrationError::VersionOverflow)?;
        let path = self.directory.join(format!("{version:03}_{safe_name}.sql"));
        let content = format!(
            "-- Migration: {safe_name}\n-- Created: {}\n\n-- UP\n-- Write your migration SQL here\n\n-- DOWN\n-- Write your rollback SQL here (optional)\n",
            chrono::Utc::now().to_rfc3339()
        );

        let io_error = |source| MigrationError::Io {
            path: path.clone(),
            source,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(io_error)?;
        file.write_all(content.as_bytes()).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)?;

        log::info!("Created migration {}", path.display());
        Ok(path)
    }
}
