//! OpenAI-compatible LLM client implementation.
//!
//! Speaks the chat completions protocol shared by OpenAI, Groq and most
//! hosted inference services. The endpoint URL is configurable per stage.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::DEFAULT_CHAT_URL;
use crate::error::{AppError, Result};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// OpenAI-compatible client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for bearer authentication.
    pub api_key: String,
    /// Model to use (e.g., "llama-3.3-70b-versatile").
    pub model: String,
    /// Full chat completions URL.
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    /// Creates a new config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            endpoint: DEFAULT_CHAT_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Sets the chat completions endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// OpenAI-compatible LLM client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiClient {
    /// Creates a new client with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::generation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Converts internal messages to the wire format.
    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| ChatMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    /// Maps an unsuccessful API response to a readable error.
    fn parse_error(status: reqwest::StatusCode, body: &str) -> AppError {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return AppError::generation("Authentication failed. Check the configured API key.");
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return AppError::generation("Rate limited. Please wait and try again.");
        }

        if let Ok(error_response) = serde_json::from_str::<ChatErrorResponse>(body) {
            return AppError::generation(format!(
                "Chat API error ({}): {}",
                status, error_response.error.message
            ));
        }

        AppError::generation(format!("Chat API error ({}): {}", status, body))
    }

    /// Maps a transport failure to a readable error.
    fn request_error(error: reqwest::Error) -> AppError {
        if error.is_timeout() {
            AppError::generation("Request timed out.")
        } else if error.is_connect() {
            AppError::generation("Failed to connect to the chat API. Check your network.")
        } else {
            AppError::generation(format!("Request failed: {}", error))
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: Self::convert_messages(messages),
            stream: false,
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::generation(format!("Failed to read response: {}", e)))?;

        debug!(
            model = %self.config.model,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Chat API responded"
        );

        if !status.is_success() {
            return Err(Self::parse_error(status, &body));
        }

        let response: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::generation(format!("Failed to parse response: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::generation("No response content from chat API"))
    }

    fn describe(&self) -> String {
        format!("openai:{}", self.config.model)
    }
}

// Chat completions API types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatErrorResponse {
    error: ChatError,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    message: String,
}
