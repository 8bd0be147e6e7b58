//! # Migrations without a database
//!
//! Writes two migrations into a temporary directory, applies them with the
//! in-memory executor, inspects the status and rolls the last one back.
//!
//! Run with `RUST_LOG=info` to see the migrator's progress messages.

use stepwise::prelude::*;
use stepwise_mem::InMemoryExecutor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let executor = InMemoryExecutor::new();
    let migrator = Migrator::new(executor.clone(), dir.path())?;

    let first = migrator.create("create users").await?;
    std::fs::write(
        &first,
        "-- UP\nCREATE TABLE users (id SERIAL PRIMARY KEY, name TEXT NOT NULL);\n\n-- DOWN\nDROP TABLE users;\n",
    )?;
    let second = migrator.create("add email").await?;
    std::fs::write(
        &second,
        "-- UP\nALTER TABLE users ADD COLUMN email TEXT;\n\n-- DOWN\nALTER TABLE users DROP COLUMN email;\n",
    )?;

    for migration in migrator.migrate(None).await? {
        println!("applied {migration}");
    }

    let status = migrator.status().await?;
    println!(
        "{} applied, {} pending, current version {}",
        status.applied_count(),
        status.pending_count(),
        migrator.current_version().await?
    );

    for migration in migrator.rollback(1).await? {
        println!("rolled back {:03}_{}", migration.version, migration.name);
    }

    let db = Database::new(executor.clone());
    let insert = InsertStatement::new("users").columns(["name", "email"]);
    let rows = vec![
        Row::new().with("name", "Alice").with("email", "alice@example.com"),
        Row::new().with("name", "Bob").with("email", Value::Null),
    ];
    db.insert_batch(&insert, &rows).await?;

    for statement in executor.executed().await {
        println!("{}", statement.sql);
    }
    Ok(())
}
