//! The question-to-results pipeline.
//!
//! Stages run strictly in order for one request:
//! schema fetch, generation, classification, refinement, extraction,
//! execution, aggregation. A rejection ends the run early and is not an
//! error; a failure in schema fetch, generation, refinement or opening the
//! database is fatal for the request.

mod executor;
mod store;
mod types;

pub use executor::StatementExecutor;
pub use store::ResultStore;
pub use types::{
    ExecutionOutcome, GenerationResult, PipelineOutcome, PipelineResponse, PipelineStage,
    Question, SchemaSnapshot, Statement,
};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::{Connector, SchemaProvider, SqliteConnector, SqliteSchemaProvider};
use crate::error::{AppError, Result};
use crate::llm::{
    build_generation_prompt, build_refinement_prompt, classify_response, create_client,
    extract_statements, LlmClient, Message,
};

/// Everything one pipeline run needs. Shared by all requests.
pub struct Pipeline {
    schema: Arc<dyn SchemaProvider>,
    generator: Arc<dyn LlmClient>,
    refiner: Arc<dyn LlmClient>,
    connector: Arc<dyn Connector>,
    executor: StatementExecutor,
    store: Option<ResultStore>,
    stage_timeout: Duration,
}

impl Pipeline {
    /// Assembles a pipeline from its capabilities.
    pub fn new(
        schema: Arc<dyn SchemaProvider>,
        generator: Arc<dyn LlmClient>,
        refiner: Arc<dyn LlmClient>,
        connector: Arc<dyn Connector>,
        executor: StatementExecutor,
    ) -> Self {
        Self {
            schema,
            generator,
            refiner,
            connector,
            executor,
            store: None,
            stage_timeout: Duration::from_secs(120),
        }
    }

    /// Persists every completed response to `store`.
    pub fn with_store(mut self, store: ResultStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Bounds schema fetch, generation and refinement.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Builds the SQLite-backed pipeline described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let schema = SqliteSchemaProvider::new(&config.database.path, config.database.sample_rows);
        let connector = SqliteConnector::new(&config.database.path, config.database.max_rows)
            .read_only(config.database.read_only);
        let executor = StatementExecutor::new(
            Duration::from_secs(config.database.query_timeout_secs),
            config.database.read_only,
        );

        let mut pipeline = Self::new(
            Arc::new(schema),
            create_client(&config.generation)?,
            create_client(&config.refinement)?,
            Arc::new(connector),
            executor,
        )
        .with_stage_timeout(Duration::from_secs(config.pipeline.stage_timeout_secs));

        if let Some(path) = &config.server.results_path {
            pipeline = pipeline.with_store(ResultStore::new(path));
        }

        info!(
            schema = %pipeline.schema.describe(),
            generator = %pipeline.generator.describe(),
            refiner = %pipeline.refiner.describe(),
            database = %pipeline.connector.describe(),
            read_only = config.database.read_only,
            "Pipeline ready"
        );

        Ok(pipeline)
    }

    /// Runs the pipeline for one question.
    pub async fn run(&self, question: &str) -> Result<PipelineOutcome> {
        let start = Instant::now();
        let result = self.run_stages(question).await;
        let total_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(PipelineOutcome::Rejected { reason }) => {
                info!(stage = %PipelineStage::Rejected, total_ms, reason = %reason, "Question rejected");
            }
            Ok(PipelineOutcome::Completed(response)) => {
                info!(
                    stage = %PipelineStage::Completed,
                    total_ms,
                    statements = response.statements().len(),
                    failures = response.failure_count(),
                    "Pipeline completed"
                );
            }
            Err(e) => {
                error!(stage = %PipelineStage::Failed, total_ms, error = %e, "Pipeline failed");
            }
        }

        result
    }

    async fn run_stages(&self, question: &str) -> Result<PipelineOutcome> {
        let question = Question::new(question)?;
        info!(stage = %PipelineStage::Received, question = %question, "Question received");

        let schema = self
            .bounded("schema fetch", AppError::Schema, self.schema.fetch_schema())
            .await?;
        debug!(stage = %PipelineStage::SchemaFetched, schema_bytes = schema.as_str().len(), "Schema fetched");

        let prompt = build_generation_prompt(&schema, &question);
        let raw = self
            .bounded(
                "generation",
                AppError::Generation,
                complete_trimmed(self.generator.as_ref(), prompt),
            )
            .await?;
        debug!(stage = %PipelineStage::Generated, response_bytes = raw.len(), "Generation returned");

        let candidates = match classify_response(&raw) {
            GenerationResult::Rejected { reason } => {
                return Ok(PipelineOutcome::Rejected { reason });
            }
            GenerationResult::Candidates { statements } => statements,
        };

        let prompt = build_refinement_prompt(&schema, &question, &candidates);
        let refined = self
            .bounded(
                "refinement",
                AppError::Generation,
                complete_trimmed(self.refiner.as_ref(), prompt),
            )
            .await?;
        debug!(stage = %PipelineStage::Refined, response_bytes = refined.len(), "Refinement returned");

        let statements = extract_statements(&refined);
        info!(stage = %PipelineStage::Extracted, statements = statements.len(), "Statements extracted");

        let outcomes = self
            .executor
            .run(self.connector.as_ref(), &statements)
            .await?;
        debug!(stage = %PipelineStage::Executed, outcomes = outcomes.len(), "Statements executed");

        let response = PipelineResponse::new(question, statements, outcomes)?;
        self.persist(&response).await;

        Ok(PipelineOutcome::Completed(response))
    }

    async fn persist(&self, response: &PipelineResponse) {
        let Some(store) = &self.store else {
            return;
        };
        match store.save(response).await {
            Ok(()) => debug!(path = %store.path().display(), "Results written"),
            Err(e) => warn!(path = %store.path().display(), error = %e, "Failed to write results"),
        }
    }

    /// Applies the stage timeout; expiry becomes an error of the stage's kind.
    async fn bounded<T>(
        &self,
        stage: &str,
        kind: fn(String) -> AppError,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.stage_timeout, fut)
            .await
            .map_err(|_| {
                kind(format!(
                    "{stage} timed out after {} seconds",
                    self.stage_timeout.as_secs()
                ))
            })?
    }
}

/// Sends one user message and trims the reply.
async fn complete_trimmed(client: &dyn LlmClient, prompt: String) -> Result<String> {
    let reply = client.complete(&[Message::user(prompt)]).await?;
    Ok(reply.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockConnector, Row, StaticSchemaProvider};
    use crate::llm::MockLlmClient;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const SCHEMA: &str = "Table: sales\n  - id (INTEGER)\n  - amount (REAL)\n";

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    struct Harness {
        generator: MockLlmClient,
        refiner: MockLlmClient,
        connector: MockConnector,
    }

    impl Harness {
        fn new(generator: MockLlmClient, refiner: MockLlmClient) -> Self {
            Self {
                generator,
                refiner,
                connector: MockConnector::new()
                    .with_rows("FROM sales", vec![row(json!({"id": 1, "amount": 9.5}))])
                    .with_error("nosuchtable", "no such table: nosuchtable"),
            }
        }

        fn pipeline(&self) -> Pipeline {
            Pipeline::new(
                Arc::new(StaticSchemaProvider::new(SCHEMA)),
                Arc::new(self.generator.clone()),
                Arc::new(self.refiner.clone()),
                Arc::new(self.connector.clone()),
                StatementExecutor::new(Duration::from_secs(5), false),
            )
        }
    }

    #[tokio::test]
    async fn test_rejection_skips_refinement_and_execution() {
        let harness = Harness::new(
            MockLlmClient::new().with_response("QUESTION", "REASON: question is personal"),
            MockLlmClient::new(),
        );

        let outcome = harness.pipeline().run("What is my password?").await.unwrap();

        assert_eq!(
            outcome,
            PipelineOutcome::Rejected {
                reason: "question is personal".to_string()
            }
        );
        assert_eq!(harness.generator.calls(), 1);
        assert_eq!(harness.refiner.calls(), 0);
        assert_eq!(harness.connector.opened(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_positions() {
        let harness = Harness::new(
            MockLlmClient::new().with_response(
                "QUESTION",
                "SQLQUERY: SELECT * FROM sales;\nSQLQUERY: SELECT * FROM nosuchtable;",
            ),
            MockLlmClient::new(),
        );

        let outcome = harness.pipeline().run("show me everything").await.unwrap();

        let PipelineOutcome::Completed(response) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(
            response.outcomes(),
            &[
                ExecutionOutcome::Rows(vec![row(json!({"id": 1, "amount": 9.5}))]),
                ExecutionOutcome::failure("no such table: nosuchtable"),
            ]
        );
        assert_eq!(response.statements()[1].as_str(), "SELECT * FROM nosuchtable;");
        assert_eq!(harness.refiner.calls(), 1);
        assert_eq!(harness.connector.opened(), 1);
        assert_eq!(harness.connector.closed(), 1);
    }

    #[tokio::test]
    async fn test_refiner_output_is_what_runs() {
        let harness = Harness::new(
            MockLlmClient::new().with_response("QUESTION", "SQLQUERY: SELEC * FROM sales"),
            MockLlmClient::new().with_response(
                "CANDIDATE QUERIES",
                "Fixed it:\nSQLQUERY: SELECT * FROM sales;",
            ),
        );

        let outcome = harness.pipeline().run("all sales").await.unwrap();

        let PipelineOutcome::Completed(response) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(response.statements(), &[Statement::new("SELECT * FROM sales;")]);
        assert_eq!(harness.connector.executed(), vec!["SELECT * FROM sales;"]);
    }

    #[tokio::test]
    async fn test_no_tagged_lines_is_empty_success() {
        let harness = Harness::new(
            MockLlmClient::new().with_response("QUESTION", "SQLQUERY: SELECT 1;"),
            MockLlmClient::new().with_response("CANDIDATE QUERIES", "Nothing useful here."),
        );

        let outcome = harness.pipeline().run("anything").await.unwrap();

        let PipelineOutcome::Completed(response) = outcome else {
            panic!("expected completion");
        };
        assert!(response.statements().is_empty());
        assert!(response.outcomes().is_empty());
        assert_eq!(harness.connector.closed(), harness.connector.opened());
    }

    #[tokio::test]
    async fn test_generation_failure_is_fatal() {
        let harness = Harness::new(
            MockLlmClient::new().failing("service unavailable"),
            MockLlmClient::new(),
        );

        let err = harness.pipeline().run("total sales").await.unwrap_err();

        assert!(matches!(err, AppError::Generation(_)));
        assert_eq!(harness.refiner.calls(), 0);
        assert_eq!(harness.connector.opened(), 0);
    }

    #[tokio::test]
    async fn test_refinement_failure_has_no_fallback() {
        let harness = Harness::new(
            MockLlmClient::new().with_response("QUESTION", "SQLQUERY: SELECT * FROM sales;"),
            MockLlmClient::new().failing("rate limited"),
        );

        let err = harness.pipeline().run("total sales").await.unwrap_err();

        assert!(matches!(err, AppError::Generation(_)));
        assert_eq!(harness.connector.opened(), 0);
    }

    #[tokio::test]
    async fn test_schema_failure_is_fatal() {
        let generator = MockLlmClient::new();
        let pipeline = Pipeline::new(
            Arc::new(StaticSchemaProvider::failing("No tables found in the database")),
            Arc::new(generator.clone()),
            Arc::new(MockLlmClient::new()),
            Arc::new(MockConnector::new()),
            StatementExecutor::new(Duration::from_secs(5), false),
        );

        let err = pipeline.run("total sales").await.unwrap_err();

        assert!(matches!(err, AppError::Schema(_)));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_connection_failure_is_fatal() {
        let generator =
            MockLlmClient::new().with_response("QUESTION", "SQLQUERY: SELECT * FROM sales;");
        let pipeline = Pipeline::new(
            Arc::new(StaticSchemaProvider::new(SCHEMA)),
            Arc::new(generator),
            Arc::new(MockLlmClient::new()),
            Arc::new(MockConnector::new().failing_open("unable to open database file")),
            StatementExecutor::new(Duration::from_secs(5), false),
        );

        let err = pipeline.run("total sales").await.unwrap_err();

        assert!(matches!(err, AppError::Connection(_)));
    }

    #[tokio::test]
    async fn test_failed_release_still_returns_results() {
        let connector = MockConnector::new()
            .with_rows("FROM sales", vec![row(json!({"id": 1}))])
            .failing_close();
        let pipeline = Pipeline::new(
            Arc::new(StaticSchemaProvider::new(SCHEMA)),
            Arc::new(MockLlmClient::new().with_response("QUESTION", "SQLQUERY: SELECT * FROM sales;")),
            Arc::new(MockLlmClient::new()),
            Arc::new(connector.clone()),
            StatementExecutor::new(Duration::from_secs(5), false),
        );

        let outcome = pipeline.run("sales").await.unwrap();

        assert!(matches!(outcome, PipelineOutcome::Completed(_)));
        assert_eq!(connector.closed(), 1);
    }

    #[tokio::test]
    async fn test_blank_question_calls_nothing() {
        let harness = Harness::new(MockLlmClient::new(), MockLlmClient::new());

        let err = harness.pipeline().run("   ").await.unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(harness.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_stage_timeout_is_fatal_generation_error() {
        struct Stalled;

        #[async_trait::async_trait]
        impl LlmClient for Stalled {
            async fn complete(&self, _messages: &[Message]) -> Result<String> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }

            fn describe(&self) -> String {
                "stalled".to_string()
            }
        }

        let pipeline = Pipeline::new(
            Arc::new(StaticSchemaProvider::new(SCHEMA)),
            Arc::new(Stalled),
            Arc::new(MockLlmClient::new()),
            Arc::new(MockConnector::new()),
            StatementExecutor::new(Duration::from_secs(5), false),
        )
        .with_stage_timeout(Duration::from_millis(50));

        let err = pipeline.run("total sales").await.unwrap_err();

        assert!(matches!(err, AppError::Generation(_)));
        assert!(err.message().contains("generation timed out"));
    }

    #[tokio::test]
    async fn test_completed_response_is_persisted() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sql_results.json");
        let harness = Harness::new(
            MockLlmClient::new().with_response("QUESTION", "SQLQUERY: SELECT * FROM sales;"),
            MockLlmClient::new(),
        );
        let pipeline = harness.pipeline().with_store(ResultStore::new(&path));

        pipeline.run("sales").await.unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["statements"], json!(["SELECT * FROM sales;"]));
    }
}
