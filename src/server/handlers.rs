//! Route handlers.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::error::ApiError;
use super::AppState;
use crate::pipeline::PipelineOutcome;
use crate::transcribe::{extension_for, StagedAudio};

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub transcription: String,
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub transcription: String,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn transcribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let transcription = transcribe_upload(&state, &headers, body).await?;
    Ok(Json(TranscribeResponse { transcription }))
}

pub async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    run_pipeline(&state, &request.transcription).await
}

/// Transcribes the audio body, then runs the pipeline on the text.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let transcription = transcribe_upload(&state, &headers, body).await?;
    run_pipeline(&state, &transcription).await
}

async fn run_pipeline(state: &AppState, question: &str) -> Result<Response, ApiError> {
    match state.pipeline.run(question).await? {
        PipelineOutcome::Rejected { reason } => Err(ApiError::Rejected { reason }),
        PipelineOutcome::Completed(response) => Ok(Json(response).into_response()),
    }
}

/// Validates, stages, transcribes and discards one audio body.
async fn transcribe_upload(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<String, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    if let Some(ct) = content_type {
        if !ct.trim().to_ascii_lowercase().starts_with("audio/") {
            return Err(ApiError::UnsupportedMediaType(
                "Only audio files are allowed".to_string(),
            ));
        }
    }
    if body.is_empty() {
        return Err(ApiError::BadRequest("No audio uploaded".to_string()));
    }

    let bytes = body.len();
    let staged = StagedAudio::stage(&state.upload_dir, body.to_vec(), extension_for(content_type))
        .await?;
    info!(path = %staged.path().display(), bytes, "Audio staged");

    let result = state.transcriber.transcribe(&staged).await;
    staged.discard();

    let transcription = result?;
    info!(transcription = %transcription, "Audio transcribed");
    Ok(transcription)
}
