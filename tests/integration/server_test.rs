//! HTTP surface tests against a server bound to an ephemeral port.

use super::common::{sales_database, sqlite_pipeline};
use pretty_assertions::assert_eq;
use razorx::config::ServerConfig;
use razorx::server::{AppState, HttpServer};
use razorx::transcribe::StaticTranscriber;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::oneshot;

const SPOKEN: &str = "how many sales are there";

struct TestServer {
    base: String,
    client: reqwest::Client,
    upload_dir: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    _dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let (dir, path) = sales_database().await;
        let upload_dir = dir.path().join("uploads");

        let pipeline = sqlite_pipeline(
            &path,
            &[
                (SPOKEN, "SQLQUERY: SELECT COUNT(*) AS n FROM sales;"),
                ("poem", "REASON: That is not a question about the data."),
            ],
        );
        let state = AppState::new(
            Arc::new(pipeline),
            Arc::new(StaticTranscriber::new(SPOKEN)),
            upload_dir.clone(),
        );

        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            upload_dir: upload_dir.clone(),
            max_upload_bytes: 1024,
            ..ServerConfig::default()
        };
        let server = HttpServer::bind(&config, state).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server.run_until(async move {
            let _ = rx.await;
        }));

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            upload_dir,
            shutdown: Some(tx),
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post_execute(&self, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url("/execute"))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn post_audio(&self, path: &str, content_type: &str, body: &'static [u8]) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url(path))
            .header("content-type", content_type)
            .body(body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    fn staged_files(&self) -> usize {
        std::fs::read_dir(&self.upload_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;

    let response = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_execute_returns_statements_and_outcomes() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post_execute(json!({ "transcription": "How many sales are there" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "transcription": "How many sales are there",
            "statements": ["SELECT COUNT(*) AS n FROM sales;"],
            "outcomes": [
                { "query": "SELECT COUNT(*) AS n FROM sales;", "rows": [{ "n": 3 }] }
            ]
        })
    );
}

#[tokio::test]
async fn test_execute_rejection_is_bad_request() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post_execute(json!({ "transcription": "write me a poem" }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "error": "Query not generated",
            "reason": "That is not a question about the data."
        })
    );
}

#[tokio::test]
async fn test_execute_blank_transcription_is_bad_request() {
    let server = TestServer::start().await;

    let (status, body) = server.post_execute(json!({ "transcription": "   " })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Transcription is empty" }));
}

#[tokio::test]
async fn test_execute_missing_field_is_bad_request() {
    let server = TestServer::start().await;

    let (status, body) = server.post_execute(json!({ "question": "hi" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("transcription"));
}

#[tokio::test]
async fn test_transcribe_returns_text_and_removes_upload() {
    let server = TestServer::start().await;

    let (status, body) = server.post_audio("/transcribe", "audio/wav", b"RIFF....WAVE").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "transcription": SPOKEN }));
    assert_eq!(server.staged_files(), 0);
}

#[tokio::test]
async fn test_transcribe_rejects_non_audio() {
    let server = TestServer::start().await;

    let (status, body) = server.post_audio("/transcribe", "text/plain", b"hello").await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body, json!({ "error": "Only audio files are allowed" }));
}

#[tokio::test]
async fn test_transcribe_rejects_empty_body() {
    let server = TestServer::start().await;

    let (status, body) = server.post_audio("/transcribe", "audio/webm", b"").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No audio uploaded" }));
}

#[tokio::test]
async fn test_oversized_upload_is_refused() {
    let server = TestServer::start().await;

    let (status, _) = server
        .post_audio("/transcribe", "audio/wav", &[0u8; 4096])
        .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_upload_transcribes_and_runs_pipeline() {
    let server = TestServer::start().await;

    let (status, body) = server.post_audio("/upload", "audio/mpeg", b"ID3....").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transcription"], json!(SPOKEN));
    assert_eq!(body["outcomes"][0]["rows"], json!([{ "n": 3 }]));
    assert_eq!(server.staged_files(), 0);
}
