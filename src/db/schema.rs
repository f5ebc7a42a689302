//! Database schema types and snapshot providers.
//!
//! Represents the structure of a SQLite database (tables, columns, keys and a
//! few sample rows) and renders it as the text handed to the language model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, warn};

use crate::db::sqlite::{convert_row, open_connection};
use crate::db::{Row, SchemaProvider};
use crate::error::{AppError, Result};
use crate::pipeline::SchemaSnapshot;

/// Represents the complete schema of a database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    /// All user tables, in catalog order.
    pub tables: Vec<Table>,
}

impl Schema {
    /// Formats the schema for inclusion in a prompt.
    ///
    /// ```text
    /// Table: sales
    ///   - id (INTEGER)
    ///   Primary Key(s): id
    ///   Foreign Key: region_id references regions(id)
    ///   Sample Rows:
    ///     {"id":1}
    /// ```
    pub fn format_for_llm(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            table.write_for_llm(&mut out);
        }
        out
    }
}

/// Represents a database table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Columns in declaration order.
    pub columns: Vec<Column>,

    /// Column names that form the primary key, in key order.
    pub primary_key: Vec<String>,

    /// Outgoing foreign keys.
    pub foreign_keys: Vec<ForeignKey>,

    /// A few rows showing what the data looks like.
    #[serde(default)]
    pub sample_rows: Vec<Row>,
}

impl Table {
    /// Creates a new table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn write_for_llm(&self, out: &mut String) {
        // Writing to a String cannot fail.
        let _ = writeln!(out, "Table: {}", self.name);
        for column in &self.columns {
            let _ = writeln!(out, "  - {} ({})", column.name, column.data_type);
        }
        if !self.primary_key.is_empty() {
            let _ = writeln!(out, "  Primary Key(s): {}", self.primary_key.join(", "));
        }
        for fk in &self.foreign_keys {
            let _ = writeln!(
                out,
                "  Foreign Key: {} references {}({})",
                fk.from_column,
                fk.to_table,
                fk.to_column.as_deref().unwrap_or("")
            );
        }
        if !self.sample_rows.is_empty() {
            out.push_str("  Sample Rows:\n");
            for row in &self.sample_rows {
                let json = serde_json::to_string(row).unwrap_or_default();
                let _ = writeln!(out, "    {json}");
            }
        }
    }
}

/// Represents a column in a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared type (e.g., "INTEGER", "VARCHAR(255)"); empty if undeclared.
    pub data_type: String,
}

impl Column {
    /// Creates a new column with the given name and declared type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Represents a foreign key from one column to another table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Source column name.
    pub from_column: String,

    /// Target table name.
    pub to_table: String,

    /// Target column; `None` when the key implicitly references the primary key.
    pub to_column: Option<String>,
}

impl ForeignKey {
    /// Creates a new foreign key relationship.
    pub fn new(
        from_column: impl Into<String>,
        to_table: impl Into<String>,
        to_column: Option<String>,
    ) -> Self {
        Self {
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column,
        }
    }
}

/// Introspects a SQLite file on every call.
#[derive(Debug, Clone)]
pub struct SqliteSchemaProvider {
    path: PathBuf,
    sample_rows: usize,
}

impl SqliteSchemaProvider {
    /// Creates a provider including up to `sample_rows` rows per table.
    pub fn new(path: impl Into<PathBuf>, sample_rows: usize) -> Self {
        Self {
            path: path.into(),
            sample_rows,
        }
    }

    /// Reads the full schema. Any failure, opening included, is a `Schema` error.
    pub async fn introspect(&self) -> Result<Schema> {
        let mut conn = open_connection(&self.path, true)
            .await
            .map_err(|e| AppError::schema(e.message()))?;
        let result = self.introspect_with(&mut conn).await;

        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to close schema connection");
        }

        result
    }

    async fn introspect_with(&self, conn: &mut SqliteConnection) -> Result<Schema> {
        let table_names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::schema(format!("Failed to fetch tables: {e}")))?;

        if table_names.is_empty() {
            return Err(AppError::schema("No tables found in the database"));
        }

        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            tables.push(self.fetch_table(conn, name).await?);
        }

        Ok(Schema { tables })
    }

    async fn fetch_table(&self, conn: &mut SqliteConnection, name: String) -> Result<Table> {
        let column_rows: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT name, type, pk FROM pragma_table_info(?1) ORDER BY cid")
                .bind(&name)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| {
                    AppError::schema(format!("Failed to fetch columns for {name}: {e}"))
                })?;

        let mut key_columns: Vec<(i64, String)> = column_rows
            .iter()
            .filter(|(_, _, pk)| *pk > 0)
            .map(|(column, _, pk)| (*pk, column.clone()))
            .collect();
        key_columns.sort();
        let primary_key = key_columns.into_iter().map(|(_, column)| column).collect();

        let columns = column_rows
            .into_iter()
            .map(|(column, data_type, _)| Column::new(column, data_type))
            .collect();

        let foreign_keys = sqlx::query_as::<_, (String, String, Option<String>)>(
            r#"SELECT "from", "table", "to" FROM pragma_foreign_key_list(?1) ORDER BY id, seq"#,
        )
        .bind(&name)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::schema(format!("Failed to fetch foreign keys for {name}: {e}")))?
        .into_iter()
        .map(|(from, table, to)| ForeignKey::new(from, table, to))
        .collect();

        let sample_rows = self.fetch_sample_rows(conn, &name).await?;

        Ok(Table {
            name,
            columns,
            primary_key,
            foreign_keys,
            sample_rows,
        })
    }

    async fn fetch_sample_rows(&self, conn: &mut SqliteConnection, table: &str) -> Result<Vec<Row>> {
        if self.sample_rows == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            quote_identifier(table),
            self.sample_rows
        );
        let rows = sqlx::query(&sql)
            .persistent(false)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| AppError::schema(format!("Failed to sample {table}: {e}")))?;

        Ok(rows.iter().map(convert_row).collect())
    }
}

#[async_trait]
impl SchemaProvider for SqliteSchemaProvider {
    async fn fetch_schema(&self) -> Result<SchemaSnapshot> {
        let start = Instant::now();
        let schema = self.introspect().await?;
        debug!(
            tables = schema.tables.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "Fetched schema"
        );
        Ok(SchemaSnapshot::new(schema.format_for_llm()))
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

/// Quotes a SQLite identifier, doubling embedded quotes.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Returns a fixed snapshot. Used by tests and offline runs.
#[derive(Debug, Clone)]
pub struct StaticSchemaProvider {
    snapshot: std::result::Result<String, String>,
}

impl StaticSchemaProvider {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            snapshot: Ok(text.into()),
        }
    }

    /// A provider whose every fetch fails with a `Schema` error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            snapshot: Err(message.into()),
        }
    }
}

#[async_trait]
impl SchemaProvider for StaticSchemaProvider {
    async fn fetch_schema(&self) -> Result<SchemaSnapshot> {
        match &self.snapshot {
            Ok(text) => Ok(SchemaSnapshot::new(text.clone())),
            Err(message) => Err(AppError::schema(message.clone())),
        }
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}
