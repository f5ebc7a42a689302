//! Per-statement isolated execution.
//!
//! Every statement gets its own outcome. A failure, timeout or read-only
//! refusal is recorded as a value and the loop moves on.
//!
//! Sessions stop a statement at its timeout themselves. If a session overruns
//! that by the grace period it is abandoned: it is dropped without waiting and
//! the remaining statements run on a freshly opened session.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::db::{timeout_message, Connector, DatabaseSession};
use crate::error::Result;
use crate::pipeline::{ExecutionOutcome, Statement};
use crate::safety::SqlClassifier;

/// Extra time a session gets past the statement timeout, and the bound on
/// releasing a session.
const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Runs extracted statements, one session per request.
#[derive(Debug)]
pub struct StatementExecutor {
    query_timeout: Duration,
    grace: Duration,
    read_only: bool,
    classifier: SqlClassifier,
}

impl StatementExecutor {
    pub fn new(query_timeout: Duration, read_only: bool) -> Self {
        Self {
            query_timeout,
            grace: DEFAULT_GRACE,
            read_only,
            classifier: SqlClassifier::new(),
        }
    }

    /// Sets how long an overrunning session or a release may take.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Opens a session, executes statements sequentially in extraction order
    /// and releases the session.
    ///
    /// Returns exactly one outcome per statement, at the same index. Only the
    /// first open is fatal; a later reopen failure becomes that statement's
    /// outcome. A failing or slow release is logged and never discards the
    /// outcomes.
    pub async fn run(
        &self,
        connector: &dyn Connector,
        statements: &[Statement],
    ) -> Result<Vec<ExecutionOutcome>> {
        let start = Instant::now();
        let mut session = Some(connector.open().await?);
        let mut outcomes = Vec::with_capacity(statements.len());

        for (index, statement) in statements.iter().enumerate() {
            if session.is_none() {
                match connector.open().await {
                    Ok(fresh) => {
                        info!(index, "Reopened database session");
                        session = Some(fresh);
                    }
                    Err(e) => {
                        warn!(index, error = %e, "Failed to reopen database session");
                        outcomes.push(ExecutionOutcome::failure(e.message()));
                        continue;
                    }
                }
            }

            let Some(current) = session.as_mut() else {
                continue;
            };
            let (outcome, healthy) = self.execute_one(current.as_mut(), index, statement).await;
            outcomes.push(outcome);

            if !healthy {
                warn!(index, "Abandoning database session that overran its timeout");
                session = None;
            }
        }

        if let Some(session) = session {
            self.release(session).await;
        }
        debug!(execute_ms = start.elapsed().as_millis() as u64, "Session released");

        Ok(outcomes)
    }

    async fn release(&self, session: Box<dyn DatabaseSession>) {
        match tokio::time::timeout(self.grace, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to release database session"),
            Err(_) => warn!(
                grace_ms = self.grace.as_millis() as u64,
                "Releasing database session timed out"
            ),
        }
    }

    /// Runs one statement. The flag is false when the session overran its
    /// timeout and must not be reused.
    async fn execute_one(
        &self,
        session: &mut dyn DatabaseSession,
        index: usize,
        statement: &Statement,
    ) -> (ExecutionOutcome, bool) {
        let classification = self.classifier.classify(statement.as_str());
        debug!(
            index,
            level = %classification.level,
            statement_type = %classification.statement_type,
            "Classified statement"
        );

        if self.read_only && !classification.is_read_only() {
            warn!(
                index,
                statement_type = %classification.statement_type,
                warning = classification.warning.as_deref().unwrap_or(""),
                "Refusing statement in read-only mode"
            );
            let outcome = ExecutionOutcome::failure(format!(
                "Statement blocked in read-only mode ({})",
                classification.statement_type
            ));
            return (outcome, true);
        }

        let start = Instant::now();
        let result = tokio::time::timeout(
            self.query_timeout + self.grace,
            session.execute(statement.as_str(), self.query_timeout),
        )
        .await;
        let query_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(rows)) => {
                info!(index, rows = rows.len(), query_ms, "Statement executed");
                (ExecutionOutcome::Rows(rows), true)
            }
            Ok(Err(e)) => {
                warn!(index, query_ms, error = %e, "Statement failed");
                (ExecutionOutcome::failure(e.message()), true)
            }
            Err(_) => {
                warn!(index, query_ms, "Statement did not stop at its timeout");
                (ExecutionOutcome::failure(timeout_message(self.query_timeout)), false)
            }
        }
    }
}
