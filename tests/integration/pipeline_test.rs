//! End-to-end pipeline tests over a real SQLite database.

use super::common::{sales_database, sqlite_pipeline};
use pretty_assertions::assert_eq;
use razorx::error::AppError;
use razorx::pipeline::{PipelineOutcome, ResultStore};
use serde_json::json;
use tempfile::TempDir;

const TOTALS_RESPONSE: &str = "SQLQUERY: SELECT regions.name, SUM(sales.amount) AS total FROM sales JOIN regions ON sales.region_id = regions.id GROUP BY regions.name ORDER BY regions.name;\nSQLQUERY: SELECT * FROM refunds;\nSQLQUERY: SELECT COUNT(*) AS n FROM sales WHERE note IS NULL;";

#[tokio::test]
async fn test_question_to_results() {
    let (_dir, path) = sales_database().await;
    let pipeline = sqlite_pipeline(&path, &[("totals per region", TOTALS_RESPONSE)]);

    let outcome = pipeline.run("  Show totals per region  ").await.unwrap();
    let PipelineOutcome::Completed(response) = outcome else {
        panic!("expected a completed run");
    };

    assert_eq!(response.question().as_str(), "Show totals per region");
    assert_eq!(response.statements().len(), 3);
    assert_eq!(response.failure_count(), 1);

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(
        body,
        json!({
            "transcription": "Show totals per region",
            "statements": [
                "SELECT regions.name, SUM(sales.amount) AS total FROM sales JOIN regions ON sales.region_id = regions.id GROUP BY regions.name ORDER BY regions.name;",
                "SELECT * FROM refunds;",
                "SELECT COUNT(*) AS n FROM sales WHERE note IS NULL;"
            ],
            "outcomes": [
                {
                    "query": "SELECT regions.name, SUM(sales.amount) AS total FROM sales JOIN regions ON sales.region_id = regions.id GROUP BY regions.name ORDER BY regions.name;",
                    "rows": [
                        { "name": "north", "total": 30.5 },
                        { "name": "south", "total": 5.0 }
                    ]
                },
                {
                    "query": "SELECT * FROM refunds;",
                    "error": "no such table: refunds"
                },
                {
                    "query": "SELECT COUNT(*) AS n FROM sales WHERE note IS NULL;",
                    "rows": [{ "n": 1 }]
                }
            ]
        })
    );
}

#[tokio::test]
async fn test_rejected_question_runs_nothing() {
    let (_dir, path) = sales_database().await;
    let pipeline = sqlite_pipeline(
        &path,
        &[("weather", "REASON: The schema has no weather data.")],
    );

    let outcome = pipeline.run("What is the weather tomorrow?").await.unwrap();
    assert_eq!(
        outcome,
        PipelineOutcome::Rejected {
            reason: "The schema has no weather data.".to_string()
        }
    );
}

#[tokio::test]
async fn test_missing_database_fails_the_request() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gone.db");
    let pipeline = sqlite_pipeline(&path, &[("anything", "SQLQUERY: SELECT 1;")]);

    let err = pipeline.run("anything at all").await.unwrap_err();
    assert!(matches!(err, AppError::Schema(_)));
}

#[tokio::test]
async fn test_completed_run_is_persisted() {
    let (dir, path) = sales_database().await;
    let results = dir.path().join("results.json");
    let pipeline = sqlite_pipeline(&path, &[("how many sales", "SQLQUERY: SELECT COUNT(*) AS n FROM sales;")])
        .with_store(ResultStore::new(&results));

    pipeline.run("How many sales are there?").await.unwrap();

    let saved: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&results).unwrap()).unwrap();
    assert_eq!(saved["transcription"], json!("How many sales are there?"));
    assert_eq!(saved["outcomes"][0]["rows"], json!([{ "n": 3 }]));
}
