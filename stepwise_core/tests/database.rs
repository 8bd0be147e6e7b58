use stepwise_core::database::{Database, DatabaseError};
use stepwise_core::statement::{
    CreateHypertable, CreateIndex, EnableCompression, InsertStatement, SelectStatement,
    StatementError,
};
use stepwise_core::validation::IdentifierError;
use stepwise_core::value::{Row, Value};
use stepwise_derive::Record;
use stepwise_mem::InMemoryExecutor;

#[derive(Record)]
struct Reading {
    device_id: i64,
    temperature: f64,
}

fn rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| Row::new().with("name", format!("user{i}")))
        .collect()
}

#[tokio::test]
async fn insert_uses_row_columns() {
    let executor = InMemoryExecutor::new();
    let db = Database::new(executor.clone());

    db.insert("users", Row::new().with("name", "Alice").with("email", "a@x"))
        .await
        .unwrap();

    let executed = executor.executed().await;
    assert_eq!(
        executed[0].sql,
        "INSERT INTO public.users (name, email) VALUES ($1, $2)"
    );
    assert_eq!(executed[0].params, vec![Value::from("Alice"), Value::from("a@x")]);
}

#[tokio::test]
async fn insert_batch_splits_into_chunks() {
    let executor = InMemoryExecutor::new();
    let db = Database::new(executor.clone()).with_batch_size(2);
    let insert = InsertStatement::new("users").columns(["name"]);

    assert_eq!(db.insert_batch(&insert, &rows(5)).await.unwrap(), 5);

    let executed = executor.executed().await;
    assert_eq!(executed.len(), 3);
    assert_eq!(
        executed[2].sql,
        "INSERT INTO public.users (name) VALUES ($1)"
    );
    assert_eq!(executed[2].params, vec![Value::from("user4")]);
}

#[tokio::test]
async fn failed_batch_is_not_logged() {
    let executor = InMemoryExecutor::new();
    let db = Database::new(executor.clone()).with_batch_size(1);
    executor.fail_on("INSERT INTO public.users").await;
    let insert = InsertStatement::new("users").columns(["name"]);

    assert!(matches!(
        db.insert_batch(&insert, &rows(3)).await,
        Err(DatabaseError::Execute(_))
    ));
    assert!(executor.executed().await.is_empty());
}

#[tokio::test]
async fn empty_batch_sends_nothing() {
    let executor = InMemoryExecutor::new();
    let db = Database::new(executor.clone());
    let insert = InsertStatement::new("users").columns(["name"]);

    assert_eq!(db.insert_batch(&insert, &[]).await.unwrap(), 0);
    assert!(executor.executed().await.is_empty());
}

#[tokio::test]
async fn insert_records_uses_derived_columns() {
    let executor = InMemoryExecutor::new();
    let db = Database::new(executor.clone());

    let count = db
        .insert_records(
            "readings",
            vec![
                Reading {
                    device_id: 1,
                    temperature: 20.5,
                },
                Reading {
                    device_id: 2,
                    temperature: 21.0,
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(count, 2);

    let executed = executor.executed().await;
    assert_eq!(
        executed[0].sql,
        "INSERT INTO public.readings (device_id, temperature) VALUES ($1, $2), ($3, $4)"
    );
}

#[tokio::test]
async fn invalid_identifiers_never_reach_the_executor() {
    let executor = InMemoryExecutor::new();
    let db = Database::new(executor.clone());

    let err = db
        .insert("users; DROP TABLE users", Row::new().with("name", "x"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DatabaseError::Statement(StatementError::Identifier(IdentifierError::Invalid(_)))
    ));
    assert!(
        db.add_retention_policy("public", "logs", "forever")
            .await
            .is_err()
    );
    assert!(executor.executed().await.is_empty());
}

#[tokio::test]
async fn select_returns_executor_rows() {
    let executor = InMemoryExecutor::new();
    executor
        .respond_to(
            "FROM public.users",
            vec![Row::new().with("id", 1).with("name", "Alice")],
        )
        .await;
    let db = Database::new(executor.clone());

    let rows = db
        .select(
            &SelectStatement::new("users")
                .columns(["id", "name"])
                .filter("id = $1", vec![1.into()])
                .limit(1),
        )
        .await
        .unwrap();
    assert_eq!(rows[0].get("name"), Some(&Value::from("Alice")));
    assert_eq!(
        executor.executed().await[0].sql,
        "SELECT id, name FROM public.users WHERE id = $1 LIMIT 1"
    );
}

#[tokio::test]
async fn timescale_helpers() {
    let executor = InMemoryExecutor::new();
    let db = Database::new(executor.clone());

    db.create_index(&CreateIndex::new("readings", ["device_id"]))
        .await
        .unwrap();
    db.create_hypertable(&CreateHypertable::new("readings", "recorded_at"))
        .await
        .unwrap();
    db.enable_compression(&EnableCompression::new("readings").segment_by(["device_id"]))
        .await
        .unwrap();
    db.add_compression_policy("public", "readings", "7 days")
        .await
        .unwrap();
    db.add_retention_policy("public", "readings", "1 year")
        .await
        .unwrap();

    let executed = executor.executed().await;
    assert_eq!(executed.len(), 5);
    assert_eq!(
        executed[1].params,
        vec![Value::from("public.readings"), Value::from("recorded_at")]
    );
    assert_eq!(
        executed[4].sql,
        "SELECT add_retention_policy($1::regclass, drop_after => INTERVAL '1 year')"
    );
}

#[tokio::test]
async fn introspection_queries() {
    let executor = InMemoryExecutor::new();
    executor
        .respond_to(
            "FROM information_schema.tables WHERE table_schema = $1 AND table_type",
            vec![
                Row::new().with("table_name", "posts"),
                Row::new().with("table_name", "users"),
            ],
        )
        .await;
    executor
        .respond_to(
            "FROM information_schema.schemata WHERE schema_name = $1",
            vec![Row::new().with("?column?", 1)],
        )
        .await;
    let db = Database::new(executor.clone());

    assert_eq!(db.list_tables("public").await.unwrap(), vec!["posts", "users"]);
    assert!(db.schema_exists("public").await.unwrap());
    assert!(!db.table_exists("public", "missing").await.unwrap());
    assert_eq!(
        executor.executed().await[2].params,
        vec![Value::from("public"), Value::from("missing")]
    );
}

#[tokio::test]
async fn migrator_shares_the_executor() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("001_init.sql"),
        "-- UP\nCREATE TABLE t (id INT);\n-- DOWN\nDROP TABLE t;\n",
    )
    .unwrap();
    let executor = InMemoryExecutor::new();
    let db = Database::new(executor.clone());

    db.migrator(dir.path()).unwrap().migrate(None).await.unwrap();
    assert_eq!(executor.applied_versions().await, vec![1]);
}
