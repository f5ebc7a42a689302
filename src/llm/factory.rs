//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating the client of a stage.

use std::sync::Arc;

use crate::config::LlmStageConfig;
use crate::error::{AppError, Result};
use crate::llm::{
    LlmClient, LlmProvider, MockLlmClient, OllamaClient, OllamaConfig, OpenAiClient, OpenAiConfig,
};

/// Creates the LLM client described by a stage configuration.
///
/// For the OpenAI-compatible provider the API key is resolved in order:
/// 1. `api_key` in the stage section
/// 2. The environment variable named by `api_key_env` (default `GROQ_API_KEY`)
pub fn create_client(stage: &LlmStageConfig) -> Result<Arc<dyn LlmClient>> {
    let provider = stage.provider()?;
    match provider {
        LlmProvider::OpenAi => {
            let key = stage.resolve_api_key().ok_or_else(|| {
                AppError::config(format!(
                    "No API key configured. Set api_key or the {} environment variable.",
                    stage.api_key_env
                ))
            })?;
            let config = OpenAiConfig::new(key, stage.model_for(provider))
                .with_endpoint(stage.endpoint_for(provider))
                .with_timeout(stage.timeout_secs);
            Ok(Arc::new(OpenAiClient::new(config)?))
        }
        LlmProvider::Ollama => {
            let config = OllamaConfig::new(stage.model_for(provider))
                .with_url(stage.endpoint_for(provider))
                .with_timeout(stage.timeout_secs);
            Ok(Arc::new(OllamaClient::new(config)?))
        }
        LlmProvider::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}
