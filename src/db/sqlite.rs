//! SQLite connector implementation.
//!
//! Provides `SqliteConnector`, which opens one `sqlx` connection per request,
//! and `SqliteSession`, which runs generated statements on it.

use crate::db::{timeout_message, Connector, DatabaseSession, Row};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use futures::{StreamExt, TryStreamExt};
use serde_json::{Number, Value as JsonValue};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column as _, ConnectOptions, Connection, Row as _, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT_SECS: u64 = 5;

/// Virtual machine steps between deadline checks.
const PROGRESS_STEPS: i32 = 1000;

/// Opens a connection to an existing SQLite file.
///
/// The file is never created; a missing file is a `Connection` error. A
/// read-only connection makes the engine refuse every write.
pub(crate) async fn open_connection(path: &Path, read_only: bool) -> Result<SqliteConnection> {
    if !path.is_file() {
        return Err(AppError::connection(format!(
            "Database file not found: {}",
            path.display()
        )));
    }

    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false)
        .read_only(read_only)
        .busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))
        .connect()
        .await
        .map_err(|e| {
            AppError::connection(format!("Cannot open {}: {}", path.display(), e))
        })
}

/// Opens per-request sessions on a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
    max_rows: usize,
    read_only: bool,
}

impl SqliteConnector {
    /// Creates a connector for the given file, capping result sets at `max_rows`.
    pub fn new(path: impl Into<PathBuf>, max_rows: usize) -> Self {
        Self {
            path: path.into(),
            max_rows,
            read_only: false,
        }
    }

    /// Opens every session read-only.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    async fn open(&self) -> Result<Box<dyn DatabaseSession>> {
        let start = Instant::now();
        let conn = open_connection(&self.path, self.read_only).await?;
        debug!(
            path = %self.path.display(),
            read_only = self.read_only,
            open_ms = start.elapsed().as_millis() as u64,
            "Opened database session"
        );

        Ok(Box::new(SqliteSession {
            conn,
            max_rows: self.max_rows,
        }))
    }

    fn describe(&self) -> String {
        if self.read_only {
            format!("sqlite:{} (read-only)", self.path.display())
        } else {
            format!("sqlite:{}", self.path.display())
        }
    }
}

/// A single SQLite connection owned by one request.
#[derive(Debug)]
pub struct SqliteSession {
    conn: SqliteConnection,
    max_rows: usize,
}

impl SqliteSession {
    /// Installs or clears the interrupt deadline on the connection.
    ///
    /// Past the deadline the engine aborts the running statement between
    /// virtual machine steps, so the connection is free for the next one.
    async fn set_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        let mut handle = self
            .conn
            .lock_handle()
            .await
            .map_err(|e| AppError::connection(format!("Failed to lock connection: {e}")))?;
        match deadline {
            Some(deadline) => {
                handle.set_progress_handler(PROGRESS_STEPS, move || Instant::now() < deadline)
            }
            None => handle.remove_progress_handler(),
        }
        Ok(())
    }

    async fn fetch_rows(&mut self, sql: &str) -> std::result::Result<Vec<SqliteRow>, sqlx::Error> {
        sqlx::query(sql)
            .persistent(false)
            .fetch(&mut self.conn)
            .take(self.max_rows.saturating_add(1))
            .try_collect()
            .await
    }
}

#[async_trait]
impl DatabaseSession for SqliteSession {
    async fn execute(&mut self, sql: &str, timeout: Duration) -> Result<Vec<Row>> {
        let deadline = Instant::now() + timeout;
        self.set_deadline(Some(deadline)).await?;
        let fetched = self.fetch_rows(sql).await;
        self.set_deadline(None).await?;

        let rows = match fetched {
            Ok(rows) => rows,
            Err(_) if Instant::now() >= deadline => {
                return Err(AppError::query(timeout_message(timeout)));
            }
            Err(e) => return Err(AppError::query(format_query_error(e))),
        };

        let was_truncated = rows.len() > self.max_rows;
        if was_truncated {
            warn!(
                max_rows = self.max_rows,
                "Result set exceeds max_rows, truncating"
            );
        }

        Ok(rows.iter().take(self.max_rows).map(convert_row).collect())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| AppError::connection(format!("Failed to close database: {e}")))
    }
}

/// Converts a sqlx SqliteRow into an ordered JSON object.
pub(crate) fn convert_row(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| (col.name().to_string(), convert_value(row, i)))
        .collect()
}

/// Converts one value by its runtime storage class, not the declared type.
///
/// Expression columns (`SUM(amount)`, `strftime(...)`) carry no declared type,
/// so the checked `try_get` would refuse them.
fn convert_value(row: &SqliteRow, index: usize) -> JsonValue {
    let storage_class = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return JsonValue::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return JsonValue::Null,
    };

    match storage_class.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => row
            .try_get_unchecked::<i64, _>(index)
            .map(JsonValue::from)
            .unwrap_or(JsonValue::Null),

        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => row
            .try_get_unchecked::<f64, _>(index)
            .ok()
            .and_then(Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),

        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(|bytes| JsonValue::String(base64::engine::general_purpose::STANDARD.encode(bytes)))
            .unwrap_or(JsonValue::Null),

        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null),
    }
}

/// Returns the engine's own message for database errors, verbatim.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}
