//! Mock connector for testing.
//!
//! Scripts per-statement rows or errors and records how sessions are used,
//! so tests can check isolation and release without a database file.

use super::{timeout_message, Connector, DatabaseSession, Row};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Scripted {
    Rows(Vec<Row>),
    Error(String),
    Hang,
    Stuck,
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

/// A connector whose sessions answer from a script.
///
/// A statement containing a scripted pattern gets that answer; anything else
/// returns no rows. Clones share their counters.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    script: Vec<(String, Scripted)>,
    fail_open: Option<String>,
    fail_close: bool,
    hang_close: bool,
    counters: Arc<Counters>,
}

impl MockConnector {
    /// Creates a connector whose sessions return no rows for everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements containing `pattern` return `rows`.
    pub fn with_rows(mut self, pattern: impl Into<String>, rows: Vec<Row>) -> Self {
        self.script.push((pattern.into(), Scripted::Rows(rows)));
        self
    }

    /// Statements containing `pattern` fail with `message`.
    pub fn with_error(mut self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.script
            .push((pattern.into(), Scripted::Error(message.into())));
        self
    }

    /// Statements containing `pattern` run until their timeout stops them.
    pub fn with_hang(mut self, pattern: impl Into<String>) -> Self {
        self.script.push((pattern.into(), Scripted::Hang));
        self
    }

    /// Statements containing `pattern` ignore their timeout and never finish.
    pub fn with_stuck(mut self, pattern: impl Into<String>) -> Self {
        self.script.push((pattern.into(), Scripted::Stuck));
        self
    }

    /// Every `open` fails with a `Connection` error.
    pub fn failing_open(mut self, message: impl Into<String>) -> Self {
        self.fail_open = Some(message.into());
        self
    }

    /// Every `close` fails after counting the release.
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Every `close` counts the release and then never finishes.
    pub fn hanging_close(mut self) -> Self {
        self.hang_close = true;
        self
    }

    /// Number of sessions opened.
    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Number of sessions released.
    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.counters
            .executed
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self) -> Result<Box<dyn DatabaseSession>> {
        if let Some(message) = &self.fail_open {
            return Err(AppError::connection(message.clone()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            script: self.script.clone(),
            fail_close: self.fail_close,
            hang_close: self.hang_close,
            counters: Arc::clone(&self.counters),
        }))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

/// Session handed out by [`MockConnector`].
#[derive(Debug)]
pub struct MockSession {
    script: Vec<(String, Scripted)>,
    fail_close: bool,
    hang_close: bool,
    counters: Arc<Counters>,
}

#[async_trait]
impl DatabaseSession for MockSession {
    async fn execute(&mut self, sql: &str, timeout: Duration) -> Result<Vec<Row>> {
        if let Ok(mut log) = self.counters.executed.lock() {
            log.push(sql.to_string());
        }

        let scripted = self
            .script
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, answer)| answer.clone());

        match scripted {
            Some(Scripted::Rows(rows)) => Ok(rows),
            Some(Scripted::Error(message)) => Err(AppError::query(message)),
            Some(Scripted::Hang) => {
                tokio::time::sleep(timeout).await;
                Err(AppError::query(timeout_message(timeout)))
            }
            Some(Scripted::Stuck) => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        if self.hang_close {
            std::future::pending::<()>().await;
        }
        if self.fail_close {
            return Err(AppError::connection("mock close failure"));
        }
        Ok(())
    }
}
