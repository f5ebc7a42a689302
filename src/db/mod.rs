//! Database abstraction layer for razorx.
//!
//! Provides trait-based interfaces for the two database capabilities the
//! pipeline consumes: a schema snapshot and per-request statement execution.

mod mock;
mod schema;
mod sqlite;

pub use mock::{MockConnector, MockSession};
pub use schema::{Column, ForeignKey, Schema, SqliteSchemaProvider, StaticSchemaProvider, Table};
pub use sqlite::{SqliteConnector, SqliteSession};

use crate::error::Result;
use crate::pipeline::SchemaSnapshot;
use async_trait::async_trait;
use std::time::Duration;

/// One result row, column name to value, in select-list order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Produces a textual description of the target database.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Introspects the database. Never cached.
    async fn fetch_schema(&self) -> Result<SchemaSnapshot>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// Opens database sessions. Shared by all requests.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a session for one request. Failure is a `Connection` error.
    async fn open(&self) -> Result<Box<dyn DatabaseSession>>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// A request-scoped handle to the database.
///
/// `close` consumes the session so it can only be released once.
#[async_trait]
pub trait DatabaseSession: Send {
    /// Executes one statement and returns its rows.
    ///
    /// Statements that produce no result set return an empty list. A
    /// statement still running after `timeout` is stopped and fails with
    /// [`timeout_message`], leaving the session usable.
    async fn execute(&mut self, sql: &str, timeout: Duration) -> Result<Vec<Row>>;

    /// Releases the underlying connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Failure text for a statement stopped at its deadline.
pub fn timeout_message(timeout: Duration) -> String {
    format!("Query timed out after {} seconds", timeout.as_secs())
}
