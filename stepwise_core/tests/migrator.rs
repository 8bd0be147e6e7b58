use std::path::Path;
use stepwise_core::migrations::{MigrationError, MigrationTable, Migrator, sanitize_name};
use stepwise_mem::{InMemoryExecutor, InMemoryExecutorError};
use tempfile::TempDir;

fn write(dir: &Path, file: &str, sql: &str) {
    std::fs::write(dir.join(file), sql).unwrap();
}

/// Two migrations that can both be rolled back.
fn users_dir() -> TempDir {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "001_create_users.sql",
        "-- UP\nCREATE TABLE users (id SERIAL PRIMARY KEY, name TEXT NOT NULL);\n\n-- DOWN\nDROP TABLE users;\n",
    );
    write(
        dir.path(),
        "002_add_email.sql",
        "-- UP\nALTER TABLE users ADD COLUMN email TEXT;\n\n-- DOWN\nALTER TABLE users DROP COLUMN email;\n",
    );
    dir
}

fn versions<T>(items: &[T], version: impl Fn(&T) -> i64) -> Vec<i64> {
    items.iter().map(version).collect()
}

#[tokio::test]
async fn missing_directory_is_rejected() {
    let result = Migrator::new(InMemoryExecutor::new(), "/definitely/not/here");
    assert!(matches!(result, Err(MigrationError::DirectoryNotFound(_))));
}

#[tokio::test]
async fn invalid_table_name_is_rejected() {
    let dir = users_dir();
    let result = Migrator::new(InMemoryExecutor::new(), dir.path())
        .unwrap()
        .with_table("schema migrations");
    assert!(matches!(result, Err(MigrationError::InvalidTable(_))));
}

#[tokio::test]
async fn migrate_then_rollback_one() {
    let dir = users_dir();
    let executor = InMemoryExecutor::new();
    let migrator = Migrator::new(executor.clone(), dir.path()).unwrap();

    let applied = migrator.migrate(None).await.unwrap();
    assert_eq!(versions(&applied, |m| m.version()), vec![1, 2]);
    assert_eq!(applied[0].name(), "create_users");
    assert_eq!(executor.applied_versions().await, vec![1, 2]);
    assert_eq!(
        executor.executed().await[0].sql,
        "CREATE TABLE users (id SERIAL PRIMARY KEY, name TEXT NOT NULL);"
    );

    let rolled_back = migrator.rollback(1).await.unwrap();
    assert_eq!(versions(&rolled_back, |m| m.version), vec![2]);
    assert_eq!(rolled_back[0].name, "add_email");
    assert_eq!(executor.applied_versions().await, vec![1]);
    assert_eq!(
        executor.executed().await.last().unwrap().sql,
        "ALTER TABLE users DROP COLUMN email;"
    );
}

#[tokio::test]
async fn migrate_is_idempotent() {
    let dir = users_dir();
    let migrator = Migrator::new(InMemoryExecutor::new(), dir.path()).unwrap();

    assert_eq!(migrator.migrate(None).await.unwrap().len(), 2);
    assert!(migrator.pending(None).await.unwrap().is_empty());
    assert!(migrator.migrate(None).await.unwrap().is_empty());
    assert_eq!(migrator.current_version().await.unwrap(), 2);
}

#[tokio::test]
async fn pending_is_stable_between_calls() {
    let dir = users_dir();
    let migrator = Migrator::new(InMemoryExecutor::new(), dir.path()).unwrap();

    let first = migrator.pending(None).await.unwrap();
    let second = migrator.pending(None).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(versions(&first, |m| m.version()), vec![1, 2]);
}

#[tokio::test]
async fn migrate_stops_at_target() {
    let dir = users_dir();
    let migrator = Migrator::new(InMemoryExecutor::new(), dir.path()).unwrap();

    let applied = migrator.migrate(Some(1)).await.unwrap();
    assert_eq!(versions(&applied, |m| m.version()), vec![1]);
    assert_eq!(
        versions(&migrator.pending(None).await.unwrap(), |m| m.version()),
        vec![2]
    );
    assert!(migrator.pending(Some(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn rollback_is_left_inverse_of_migrate() {
    let dir = users_dir();
    write(
        dir.path(),
        "003_add_index.sql",
        "-- UP\nCREATE INDEX idx_users_email ON users (email);\n-- DOWN\nDROP INDEX idx_users_email;\n",
    );
    let executor = InMemoryExecutor::new();
    let migrator = Migrator::new(executor.clone(), dir.path()).unwrap();
    migrator.migrate(Some(1)).await.unwrap();
    migrator.migrate(None).await.unwrap();

    let rolled_back = migrator.rollback(2).await.unwrap();
    assert_eq!(versions(&rolled_back, |m| m.version), vec![3, 2]);
    assert_eq!(executor.applied_versions().await, vec![1]);
    assert_eq!(
        versions(&migrator.pending(None).await.unwrap(), |m| m.version()),
        vec![2, 3]
    );
}

#[tokio::test]
async fn rollback_more_steps_than_applied() {
    let dir = users_dir();
    let migrator = Migrator::new(InMemoryExecutor::new(), dir.path()).unwrap();
    migrator.migrate(None).await.unwrap();

    assert_eq!(migrator.rollback(10).await.unwrap().len(), 2);
    assert!(migrator.rollback(1).await.unwrap().is_empty());
    assert_eq!(migrator.current_version().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_migration_leaves_no_trace_and_halts() {
    let dir = users_dir();
    write(dir.path(), "003_broken.sql", "-- UP\nBROKEN STATEMENT;\n-- DOWN\nSELECT 1;\n");
    write(dir.path(), "004_after.sql", "CREATE TABLE after_broken (id INT);");
    let executor = InMemoryExecutor::new();
    executor.fail_on("BROKEN").await;
    let migrator = Migrator::new(executor.clone(), dir.path()).unwrap();

    let err = migrator.migrate(None).await.unwrap_err();
    match &err {
        MigrationError::ApplyFailed {
            version,
            name,
            applied,
            ..
        } => {
            assert_eq!(*version, 3);
            assert_eq!(name, "broken");
            assert_eq!(applied, &vec![1, 2]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("Migration 003_broken failed: "));
    assert_eq!(executor.applied_versions().await, vec![1, 2]);
    assert!(
        executor
            .executed()
            .await
            .iter()
            .all(|s| !s.sql.contains("after_broken"))
    );

    executor.clear_failures().await;
    let applied = migrator.migrate(None).await.unwrap();
    assert_eq!(versions(&applied, |m| m.version()), vec![3, 4]);
}

#[tokio::test]
async fn file_without_markers_is_applied_whole() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "1_seed.sql", "INSERT INTO settings VALUES (1);\n");
    let executor = InMemoryExecutor::new();
    let migrator = Migrator::new(executor.clone(), dir.path()).unwrap();

    migrator.migrate(None).await.unwrap();
    assert_eq!(
        executor.executed().await[0].sql,
        "INSERT INTO settings VALUES (1);\n"
    );

    let err = migrator.rollback(1).await.unwrap_err();
    assert!(matches!(
        err,
        MigrationError::MissingDownSection { version: 1, .. }
    ));
    assert_eq!(executor.applied_versions().await, vec![1]);
}

#[tokio::test]
async fn rollback_requires_the_file() {
    let dir = users_dir();
    let executor = InMemoryExecutor::new();
    executor.seed_applied(9, "gone").await;
    let migrator = Migrator::new(executor.clone(), dir.path()).unwrap();

    let err = migrator.rollback(1).await.unwrap_err();
    assert!(matches!(err, MigrationError::MissingFile(9)));
    assert_eq!(err.to_string(), "Migration file for version 9 not found");
}

#[tokio::test]
async fn missing_down_section_stops_rollback_before_any_change() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "001_a.sql", "CREATE TABLE a (id INT);\n");
    write(
        dir.path(),
        "002_b.sql",
        "-- UP\nCREATE TABLE b (id INT);\n-- DOWN\nDROP TABLE b;\n",
    );
    let executor = InMemoryExecutor::new();
    let migrator = Migrator::new(executor.clone(), dir.path()).unwrap();
    migrator.migrate(None).await.unwrap();

    let err = migrator.rollback(2).await.unwrap_err();
    assert!(matches!(
        err,
        MigrationError::MissingDownSection { version: 1, .. }
    ));
    assert_eq!(executor.applied_versions().await, vec![1, 2]);
    assert!(
        executor
            .executed()
            .await
            .iter()
            .all(|statement| statement.sql != "DROP TABLE b;")
    );
}

#[tokio::test]
async fn missing_file_stops_rollback_before_any_change() {
    let dir = users_dir();
    let executor = InMemoryExecutor::new();
    let migrator = Migrator::new(executor.clone(), dir.path()).unwrap();
    migrator.migrate(None).await.unwrap();
    std::fs::remove_file(dir.path().join("001_create_users.sql")).unwrap();

    let err = migrator.rollback(2).await.unwrap_err();
    assert!(matches!(err, MigrationError::MissingFile(1)));
    assert_eq!(executor.applied_versions().await, vec![1, 2]);
}

#[tokio::test]
async fn failed_rollback_reports_progress() {
    let dir = users_dir();
    let executor = InMemoryExecutor::new();
    let migrator = Migrator::new(executor.clone(), dir.path()).unwrap();
    migrator.migrate(None).await.unwrap();
    executor.fail_on("DROP TABLE users").await;

    let err = migrator.rollback(2).await.unwrap_err();
    match err {
        MigrationError::RollbackFailed {
            version,
            rolled_back,
            source,
            ..
        } => {
            assert_eq!(version, 1);
            assert_eq!(rolled_back, vec![2]);
            assert_eq!(
                source.downcast_ref::<InMemoryExecutorError>(),
                Some(&InMemoryExecutorError::Injected("DROP TABLE users".into()))
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(executor.applied_versions().await, vec![1]);
}

#[tokio::test]
async fn duplicate_versions_fail_at_apply_time() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "003_a.sql", "SELECT 'a';");
    write(dir.path(), "003_b.sql", "SELECT 'b';");
    let executor = InMemoryExecutor::new();
    let migrator = Migrator::new(executor.clone(), dir.path()).unwrap();

    let discovered = migrator.discover().await.unwrap();
    assert_eq!(discovered.len(), 2);
    assert_eq!(discovered[0].name(), "a");

    let err = migrator.migrate(None).await.unwrap_err();
    assert!(matches!(
        err,
        MigrationError::ApplyFailed { version: 3, ref name, .. } if name == "b"
    ));
    assert_eq!(executor.applied_versions().await, vec![3]);
}

#[tokio::test]
async fn discovery_skips_malformed_files() {
    let dir = users_dir();
    write(dir.path(), "README.md", "docs");
    write(dir.path(), "notes.sql", "SELECT 1;");
    write(dir.path(), "010_later.sql", "SELECT 10;");
    std::fs::create_dir(dir.path().join("005_directory.sql")).unwrap();
    let migrator = Migrator::new(InMemoryExecutor::new(), dir.path()).unwrap();

    let discovered = migrator.discover().await.unwrap();
    assert_eq!(versions(&discovered, |m| m.version()), vec![1, 2, 10]);
}

#[tokio::test]
async fn status_reports_both_sides() {
    let dir = users_dir();
    let migrator = Migrator::new(InMemoryExecutor::new(), dir.path()).unwrap();
    migrator.migrate(Some(1)).await.unwrap();

    let status = migrator.status().await.unwrap();
    assert_eq!(status.applied_count(), 1);
    assert_eq!(status.pending_count(), 1);
    assert_eq!(status.applied[0].name, "create_users");
    assert_eq!(status.pending[0].to_string(), "002_add_email");
}

#[tokio::test]
async fn custom_tracking_table() {
    let dir = users_dir();
    let executor = InMemoryExecutor::new()
        .with_tracking_table(MigrationTable::new("app_migrations").unwrap());
    let migrator = Migrator::new(executor.clone(), dir.path())
        .unwrap()
        .with_table("app_migrations")
        .unwrap();

    migrator.migrate(None).await.unwrap();
    assert_eq!(executor.applied_versions().await, vec![1, 2]);
    assert_eq!(migrator.table().name(), "app_migrations");
}

#[tokio::test]
async fn create_then_discover_round_trip() {
    let dir = users_dir();
    let executor = InMemoryExecutor::new();
    let migrator = Migrator::new(executor.clone(), dir.path()).unwrap();

    let path = migrator.create("Add Posts-Table").await.unwrap();
    assert_eq!(path.file_name().unwrap(), "003_add_posts_table.sql");

    let discovered = migrator.discover().await.unwrap();
    assert_eq!(discovered.len(), 3);
    let created = discovered.last().unwrap();
    assert_eq!(created.version(), 3);
    assert_eq!(created.name(), sanitize_name("Add Posts-Table"));

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("-- Migration: add_posts_table\n-- Created: "));
    assert!(content.contains("\n-- UP\n"));
    assert!(content.contains("\n-- DOWN\n"));
    assert!(executor.applied_versions().await.is_empty());
}

#[tokio::test]
async fn create_in_empty_directory_starts_at_one() {
    let dir = tempfile::tempdir().unwrap();
    let migrator = Migrator::new(InMemoryExecutor::new(), dir.path()).unwrap();

    let path = migrator.create("init").await.unwrap();
    assert_eq!(path.file_name().unwrap(), "001_init.sql");
    assert!(matches!(
        migrator.create("").await,
        Err(MigrationError::InvalidName(_))
    ));
}

#[tokio::test]
async fn created_migration_can_be_applied_and_rolled_back() {
    let dir = tempfile::tempdir().unwrap();
    let executor = InMemoryExecutor::new();
    let migrator = Migrator::new(executor.clone(), dir.path()).unwrap();
    migrator.create("init").await.unwrap();

    assert_eq!(migrator.migrate(None).await.unwrap().len(), 1);
    assert_eq!(migrator.rollback(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn create_refuses_to_overflow_versions() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "9223372036854775807_big.sql", "SELECT 1;\n");
    let migrator = Migrator::new(InMemoryExecutor::new(), dir.path()).unwrap();

    assert!(matches!(
        migrator.create("next").await,
        Err(MigrationError::VersionOverflow)
    ));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}
