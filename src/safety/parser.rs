//! SQL parsing and classification logic.
//!
//! Uses sqlparser-rs with the SQLite dialect. Anything the parser rejects is
//! classified as destructive.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use crate::error::{AppError, Result};

use super::{ClassificationResult, SafetyLevel, StatementType};

type Classification = (SafetyLevel, StatementType);

/// SQL classifier that parses and classifies statements.
#[derive(Debug)]
pub struct SqlClassifier {
    dialect: SQLiteDialect,
}

impl Default for SqlClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlClassifier {
    /// Creates a new SQL classifier.
    pub fn new() -> Self {
        Self {
            dialect: SQLiteDialect {},
        }
    }

    /// Classifies a SQL string.
    ///
    /// Unparsable SQL is classified as destructive with a warning.
    pub fn classify(&self, sql: &str) -> ClassificationResult {
        match self.parse_and_classify(sql) {
            Ok(result) => result,
            Err(e) => ClassificationResult::with_warning(
                SafetyLevel::Destructive,
                StatementType::Unknown,
                format!("Could not parse SQL: {}", e.message()),
            ),
        }
    }

    fn parse_and_classify(&self, sql: &str) -> Result<ClassificationResult> {
        let statements = Parser::parse_sql(&self.dialect, sql)
            .map_err(|e| AppError::query(format!("SQL parse error: {}", e)))?;

        match statements.as_slice() {
            [] => Ok(ClassificationResult::with_warning(
                SafetyLevel::Destructive,
                StatementType::Unknown,
                "Empty SQL statement",
            )),
            [single] => {
                let (level, stmt_type) = classify_statement(single);
                Ok(ClassificationResult::new(level, stmt_type))
            }
            many => {
                let (level, stmt_type) = many
                    .iter()
                    .map(classify_statement)
                    .fold((SafetyLevel::Safe, StatementType::Unknown), most_dangerous);
                Ok(ClassificationResult::new(
                    level,
                    StatementType::Multiple(Box::new(stmt_type)),
                ))
            }
        }
    }
}

/// Keeps the more dangerous of two classifications; ties keep the first.
fn most_dangerous(current: Classification, candidate: Classification) -> Classification {
    if candidate.0 > current.0 {
        candidate
    } else {
        current
    }
}

/// Classifies a single parsed statement.
fn classify_statement(statement: &Statement) -> Classification {
    match statement {
        // Query: may contain data-modifying CTEs, so recurse
        Statement::Query(query) => classify_query(query),
        Statement::Explain {
            analyze, statement, ..
        } => {
            if *analyze {
                // EXPLAIN ANALYZE executes the statement
                let (inner_level, _) = classify_statement(statement);
                (inner_level, StatementType::Explain)
            } else {
                (SafetyLevel::Safe, StatementType::Explain)
            }
        }
        Statement::ShowTables { .. } => (SafetyLevel::Safe, StatementType::Show),
        Statement::ShowColumns { .. } => (SafetyLevel::Safe, StatementType::Show),

        // Mutating: data modification
        Statement::Insert(_) => (SafetyLevel::Mutating, StatementType::Insert),
        Statement::Update { .. } => (SafetyLevel::Mutating, StatementType::Update),
        Statement::Merge { .. } => (SafetyLevel::Mutating, StatementType::Merge),

        // Destructive: data loss or schema changes
        Statement::Delete(_) => (SafetyLevel::Destructive, StatementType::Delete),
        Statement::Drop { .. } => (SafetyLevel::Destructive, StatementType::Drop),
        Statement::Truncate { .. } => (SafetyLevel::Destructive, StatementType::Truncate),
        Statement::AlterTable { .. } => (SafetyLevel::Destructive, StatementType::Alter),
        Statement::AlterIndex { .. } => (SafetyLevel::Destructive, StatementType::Alter),
        Statement::AlterView { .. } => (SafetyLevel::Destructive, StatementType::Alter),
        Statement::CreateTable { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateIndex { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateView { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::CreateVirtualTable { .. } => {
            (SafetyLevel::Destructive, StatementType::Create)
        }
        Statement::Grant { .. } => (SafetyLevel::Destructive, StatementType::Grant),
        Statement::Revoke { .. } => (SafetyLevel::Destructive, StatementType::Revoke),

        // ATTACH, PRAGMA, VACUUM and the rest are refused in read-only mode
        _ => (SafetyLevel::Destructive, StatementType::Unknown),
    }
}

/// Classifies a Query by recursively inspecting for data-modifying operations.
fn classify_query(query: &Query) -> Classification {
    let ctes = query
        .with
        .iter()
        .flat_map(|with| with.cte_tables.iter())
        .map(|cte| classify_query(&cte.query));

    ctes.chain(std::iter::once(classify_set_expr(&query.body)))
        .fold((SafetyLevel::Safe, StatementType::Select), most_dangerous)
}

/// Classifies a SetExpr, detecting mutations and recursing into nested queries.
fn classify_set_expr(set_expr: &SetExpr) -> Classification {
    match set_expr {
        SetExpr::Delete(stmt) => classify_statement(stmt),
        SetExpr::Update(stmt) => classify_statement(stmt),
        SetExpr::Insert(stmt) => classify_statement(stmt),
        SetExpr::Merge(stmt) => classify_statement(stmt),
        SetExpr::Query(query) => classify_query(query),
        SetExpr::Select(select) => classify_select(select),
        // UNION, INTERSECT, EXCEPT
        SetExpr::SetOperation { left, right, .. } => {
            most_dangerous(classify_set_expr(left), classify_set_expr(right))
        }
        SetExpr::Values(_) | SetExpr::Table(_) => (SafetyLevel::Safe, StatementType::Select),
    }
}

fn classify_select(select: &Select) -> Classification {
    select
        .from
        .iter()
        .map(classify_table_with_joins)
        .fold((SafetyLevel::Safe, StatementType::Select), most_dangerous)
}

fn classify_table_with_joins(twj: &TableWithJoins) -> Classification {
    std::iter::once(&twj.relation)
        .chain(twj.joins.iter().map(|join| &join.relation))
        .map(classify_table_factor)
        .fold((SafetyLevel::Safe, StatementType::Select), most_dangerous)
}

/// Recurses into derived tables (subqueries).
fn classify_table_factor(factor: &TableFactor) -> Classification {
    match factor {
        TableFactor::Derived { subquery, .. } => classify_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => classify_table_with_joins(table_with_joins),
        _ => (SafetyLevel::Safe, StatementType::Select),
    }
}
