//! Shared fixtures for integration tests.

use razorx::db::{SqliteConnector, SqliteSchemaProvider};
use razorx::llm::MockLlmClient;
use razorx::pipeline::{Pipeline, StatementExecutor};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Creates `sales.db` in a fresh temporary directory.
pub async fn sales_database() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sales.db");

    let mut conn = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .connect()
        .await
        .unwrap();

    for sql in [
        "CREATE TABLE regions (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        "CREATE TABLE sales (id INTEGER PRIMARY KEY, region_id INTEGER REFERENCES regions(id), amount REAL, note TEXT)",
        "INSERT INTO regions (id, name) VALUES (1, 'north'), (2, 'south')",
        "INSERT INTO sales (region_id, amount, note) VALUES (1, 10.5, 'first'), (1, 20.0, NULL), (2, 5.0, 'third')",
    ] {
        sqlx::query(sql).execute(&mut conn).await.unwrap();
    }
    conn.close().await.unwrap();

    (dir, path)
}

/// A pipeline over a real database whose generator answers from `responses`.
///
/// The refiner echoes the candidates it is given.
pub fn sqlite_pipeline(path: &PathBuf, responses: &[(&str, &str)]) -> Pipeline {
    let generator = responses
        .iter()
        .fold(MockLlmClient::new(), |client, (pattern, response)| {
            client.with_response(*pattern, *response)
        });

    Pipeline::new(
        Arc::new(SqliteSchemaProvider::new(path, 2)),
        Arc::new(generator),
        Arc::new(MockLlmClient::new()),
        Arc::new(SqliteConnector::new(path, 1000)),
        StatementExecutor::new(Duration::from_secs(5), false),
    )
}
