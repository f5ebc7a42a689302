//! Mock LLM client for testing.
//!
//! Provides deterministic responses based on prompt patterns.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::llm::prompt::{CANDIDATES_HEADER, REASON_SENTINEL};
use crate::llm::types::{last_user_content, Message};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned responses based on prompt patterns.
///
/// Without a matching pattern it behaves like a pass-through refiner: a
/// refinement prompt gets its candidate block echoed back, anything else is
/// rejected.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response).
    custom_responses: Vec<(String, String)>,
    /// When set, every call fails with this message.
    failure: Option<String>,
    /// Number of completed or failed calls.
    calls: Arc<AtomicUsize>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the prompt contains `pattern` (case-insensitive), the mock
    /// returns `response`. Earlier mappings win.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses
            .push((pattern.into(), response.into()));
        self
    }

    /// Makes every call fail with a generation error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Returns how many times `complete` was called, across clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn mock_response(&self, prompt: &str) -> String {
        let prompt_lower = prompt.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if prompt_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        if let Some((_, candidates)) = prompt.split_once(CANDIDATES_HEADER) {
            return candidates.trim().to_string();
        }

        format!("{REASON_SENTINEL} The mock model has no answer for this question.")
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.failure {
            return Err(AppError::generation(message.clone()));
        }

        Ok(self.mock_response(last_user_content(messages)))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
