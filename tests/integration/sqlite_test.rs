//! SQLite connector and schema provider tests.

use super::common::sales_database;
use pretty_assertions::assert_eq;
use razorx::db::{Connector, SchemaProvider, SqliteConnector, SqliteSchemaProvider};
use razorx::error::AppError;
use razorx::pipeline::{ExecutionOutcome, Statement, StatementExecutor};
use serde_json::json;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[tokio::test]
async fn test_schema_describes_tables_keys_and_samples() {
    let (_dir, path) = sales_database().await;
    let provider = SqliteSchemaProvider::new(&path, 2);

    let snapshot = provider.fetch_schema().await.unwrap();
    let text = snapshot.as_str();

    assert!(text.contains("Table: regions"));
    assert!(text.contains("Table: sales"));
    assert!(text.contains("  - amount (REAL)"));
    assert!(text.contains("  Primary Key(s): id"));
    assert!(text.contains("  Foreign Key: region_id references regions(id)"));
    assert!(text.contains("Sample Rows:"));
    assert!(text.contains(r#"{"id":1,"name":"north"}"#));
}

#[tokio::test]
async fn test_schema_sample_rows_are_capped() {
    let (_dir, path) = sales_database().await;
    let schema = SqliteSchemaProvider::new(&path, 1).introspect().await.unwrap();

    let sales = schema.tables.iter().find(|t| t.name == "sales").unwrap();
    assert_eq!(sales.sample_rows.len(), 1);
    assert_eq!(sales.columns.len(), 4);
}

#[tokio::test]
async fn test_schema_of_empty_database_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.db");
    std::fs::File::create(&path).unwrap();

    let err = SqliteSchemaProvider::new(&path, 2)
        .fetch_schema()
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Schema(_)));
    assert!(err.to_string().contains("No tables found"));
}

#[tokio::test]
async fn test_schema_of_missing_database_is_a_schema_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.db");

    let err = SqliteSchemaProvider::new(&path, 2)
        .fetch_schema()
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Schema(_)));
    assert!(err.to_string().contains("Database file not found"));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_missing_database_file_is_not_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.db");

    let connector = SqliteConnector::new(&path, 100);
    let err = connector.open().await.err().unwrap();

    assert!(matches!(err, AppError::Connection(_)));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_failing_statement_does_not_affect_siblings() {
    let (_dir, path) = sales_database().await;
    let connector = SqliteConnector::new(&path, 100);
    let executor = StatementExecutor::new(Duration::from_secs(5), false);

    let statements = vec![
        Statement::new("SELECT COUNT(*) AS n FROM sales;"),
        Statement::new("SELECT * FROM nope;"),
        Statement::new("SELECT SUM(amount) AS total FROM sales WHERE region_id = 1;"),
    ];

    let outcomes = executor.run(&connector, &statements).await.unwrap();

    assert_eq!(outcomes.len(), 3);
    match &outcomes[0] {
        ExecutionOutcome::Rows(rows) => assert_eq!(rows[0]["n"], json!(3)),
        other => panic!("expected rows, got {other:?}"),
    }
    assert_eq!(outcomes[1], ExecutionOutcome::failure("no such table: nope"));
    match &outcomes[2] {
        ExecutionOutcome::Rows(rows) => assert_eq!(rows[0]["total"], json!(30.5)),
        other => panic!("expected rows, got {other:?}"),
    }
}

#[tokio::test]
async fn test_writes_are_visible_to_later_statements() {
    let (_dir, path) = sales_database().await;
    let connector = SqliteConnector::new(&path, 100);
    let executor = StatementExecutor::new(Duration::from_secs(5), false);

    let statements = vec![
        Statement::new("INSERT INTO regions (id, name) VALUES (3, 'east');"),
        Statement::new("SELECT name FROM regions WHERE id = 3;"),
    ];

    let outcomes = executor.run(&connector, &statements).await.unwrap();

    assert_eq!(outcomes[0], ExecutionOutcome::Rows(vec![]));
    match &outcomes[1] {
        ExecutionOutcome::Rows(rows) => assert_eq!(rows[0]["name"], json!("east")),
        other => panic!("expected rows, got {other:?}"),
    }
}

#[tokio::test]
async fn test_read_only_blocks_writes_against_real_database() {
    let (_dir, path) = sales_database().await;
    let connector = SqliteConnector::new(&path, 100);
    let executor = StatementExecutor::new(Duration::from_secs(5), true);

    let statements = vec![
        Statement::new("DELETE FROM sales;"),
        Statement::new("SELECT COUNT(*) AS n FROM sales;"),
    ];

    let outcomes = executor.run(&connector, &statements).await.unwrap();

    assert!(outcomes[0].is_failure());
    match &outcomes[1] {
        ExecutionOutcome::Rows(rows) => assert_eq!(rows[0]["n"], json!(3)),
        other => panic!("expected rows, got {other:?}"),
    }
}

#[tokio::test]
async fn test_runaway_statement_does_not_starve_siblings() {
    let (_dir, path) = sales_database().await;
    let connector = SqliteConnector::new(&path, 100);
    let executor = StatementExecutor::new(Duration::from_secs(1), false);

    let statements = vec![
        Statement::new(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
             SELECT count(*) FROM c WHERE x < 0;",
        ),
        Statement::new("SELECT 1 AS one;"),
    ];

    let started = Instant::now();
    let outcomes = tokio::time::timeout(
        Duration::from_secs(10),
        executor.run(&connector, &statements),
    )
    .await
    .expect("execution finishes and releases the session")
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        outcomes,
        vec![
            ExecutionOutcome::failure("Query timed out after 1 seconds"),
            ExecutionOutcome::Rows(vec![json!({ "one": 1 })
                .as_object()
                .cloned()
                .unwrap()]),
        ]
    );
}

#[tokio::test]
async fn test_read_only_connector_blocks_what_the_classifier_lets_through() {
    let (_dir, path) = sales_database().await;
    let connector = SqliteConnector::new(&path, 100).read_only(true);
    // Classification off: the engine alone must refuse the write.
    let executor = StatementExecutor::new(Duration::from_secs(5), false);

    let statements = vec![
        Statement::new("INSERT INTO regions (id, name) VALUES (9, 'west');"),
        Statement::new("SELECT COUNT(*) AS n FROM regions;"),
    ];

    let outcomes = executor.run(&connector, &statements).await.unwrap();

    match &outcomes[0] {
        ExecutionOutcome::Failure(message) => assert!(message.contains("readonly")),
        other => panic!("expected a failure, got {other:?}"),
    }
    match &outcomes[1] {
        ExecutionOutcome::Rows(rows) => assert_eq!(rows[0]["n"], json!(2)),
        other => panic!("expected rows, got {other:?}"),
    }
}
