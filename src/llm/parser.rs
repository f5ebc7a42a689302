//! Response parsing for LLM outputs.
//!
//! The grammar is line oriented with two mutually exclusive tags:
//! `REASON:` at the start of the response rejects the question, otherwise
//! every line starting with `SQLQUERY:` carries one statement. Untagged lines
//! are dropped.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use super::prompt::{REASON_SENTINEL, SQL_SENTINEL};
use crate::pipeline::{GenerationResult, Statement};

/// Matches a response wrapped entirely in one markdown code fence.
fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)\A```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\z")
            .expect("fence pattern is valid")
    })
}

/// Removes a surrounding markdown code fence, if any.
///
/// Returns the trimmed inner text.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match fence_regex().captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Classifies raw generation output as a rejection or as candidates.
///
/// Total: never fails. Candidates are passed on unparsed.
pub fn classify_response(raw: &str) -> GenerationResult {
    let text = strip_code_fence(raw);

    match text.strip_prefix(REASON_SENTINEL) {
        Some(reason) => GenerationResult::Rejected {
            reason: reason.trim().to_string(),
        },
        None => GenerationResult::Candidates {
            statements: text.to_string(),
        },
    }
}

/// Extracts tagged statements from refined text, in order.
///
/// Each line is trimmed; lines starting with [`SQL_SENTINEL`] are kept with
/// the sentinel and at most one following space removed. Every other line is
/// discarded. An empty result is valid.
pub fn extract_statements(text: &str) -> Vec<Statement> {
    let mut statements = Vec::new();
    let mut discarded = 0usize;

    for line in text.lines() {
        let line = line.trim();
        match line.strip_prefix(SQL_SENTINEL) {
            Some(rest) => {
                let sql = rest.strip_prefix(' ').unwrap_or(rest);
                statements.push(Statement::new(sql));
            }
            None if !line.is_empty() => discarded += 1,
            None => {}
        }
    }

    if discarded > 0 {
        debug!(
            discarded,
            kept = statements.len(),
            "Dropped untagged lines from model output"
        );
    }

    statements
}
