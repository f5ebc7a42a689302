//! Request-scoped values that flow through the pipeline.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::db::Row;
use crate::error::{AppError, Result};

/// The user's natural-language question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question(String);

impl Question {
    /// Creates a question from raw text, trimming surrounding whitespace.
    ///
    /// Blank text is rejected before any external capability is called.
    pub fn new(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::invalid_input("Transcription is empty"));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Textual description of the database, fetched fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSnapshot(String);

impl SchemaSnapshot {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Classification of raw generation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    /// The model declined; the reason is passed to the client verbatim.
    Rejected { reason: String },
    /// Raw, unparsed candidate text to hand to the refiner.
    Candidates { statements: String },
}

/// One SQL statement extracted from a tagged line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Statement(String);

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of running one statement. Failures are values, never errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Rows(Vec<Row>),
    Failure(String),
}

impl ExecutionOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// The aggregated result of a completed request.
///
/// `statements[i]` is paired with `outcomes[i]`. Fields are private so the
/// pairing cannot be broken after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResponse {
    question: Question,
    statements: Vec<Statement>,
    outcomes: Vec<ExecutionOutcome>,
}

impl PipelineResponse {
    /// Pairs statements with their outcomes.
    ///
    /// Fails if the two sequences differ in length.
    pub fn new(
        question: Question,
        statements: Vec<Statement>,
        outcomes: Vec<ExecutionOutcome>,
    ) -> Result<Self> {
        if statements.len() != outcomes.len() {
            return Err(AppError::internal(format!(
                "{} statements but {} outcomes",
                statements.len(),
                outcomes.len()
            )));
        }
        Ok(Self {
            question,
            statements,
            outcomes,
        })
    }

    pub fn question(&self) -> &Question {
        &self.question
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn outcomes(&self) -> &[ExecutionOutcome] {
        &self.outcomes
    }

    /// Number of statements whose outcome is a failure.
    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }
}

/// One `{query, rows}` or `{query, error}` entry of the wire format.
struct OutcomeEntry<'a> {
    statement: &'a Statement,
    outcome: &'a ExecutionOutcome,
}

impl Serialize for OutcomeEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("query", self.statement)?;
        match self.outcome {
            ExecutionOutcome::Rows(rows) => map.serialize_entry("rows", rows)?,
            ExecutionOutcome::Failure(message) => map.serialize_entry("error", message)?,
        }
        map.end()
    }
}

impl Serialize for PipelineResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let outcomes: Vec<OutcomeEntry<'_>> = self
            .statements
            .iter()
            .zip(&self.outcomes)
            .map(|(statement, outcome)| OutcomeEntry { statement, outcome })
            .collect();

        let mut state = serializer.serialize_struct("PipelineResponse", 3)?;
        state.serialize_field("transcription", self.question.as_str())?;
        state.serialize_field("statements", &self.statements)?;
        state.serialize_field("outcomes", &outcomes)?;
        state.end()
    }
}

/// Terminal outcome of a pipeline run that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The generator declined the question.
    Rejected { reason: String },
    Completed(PipelineResponse),
}

/// Per-request state machine position, used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    SchemaFetched,
    Generated,
    Rejected,
    Refined,
    Extracted,
    Executed,
    Completed,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::SchemaFetched => "schema_fetched",
            Self::Generated => "generated",
            Self::Rejected => "rejected",
            Self::Refined => "refined",
            Self::Extracted => "extracted",
            Self::Executed => "executed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
