//! Configuration management for razorx.
//!
//! Handles loading configuration from TOML files and environment variables,
//! with one language-model section per pipeline stage.

use crate::error::{AppError, Result};
use crate::llm::ollama::{DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL};
use crate::llm::LlmProvider;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Default OpenAI-compatible chat completions endpoint (Groq).
pub const DEFAULT_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Default model for the OpenAI-compatible provider.
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.3-70b-versatile";

/// Main configuration structure for razorx.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Target database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Pipeline-wide settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Model used to generate candidate statements.
    #[serde(default)]
    pub generation: LlmStageConfig,

    /// Model used to correct candidate statements.
    #[serde(default)]
    pub refinement: LlmStageConfig,

    /// Speech-to-text subprocess settings.
    #[serde(default)]
    pub transcription: TranscriptionConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory where uploaded audio is staged while it is transcribed.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Where to write the latest aggregated result for downstream tooling.
    #[serde(default)]
    pub results_path: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json_logs: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            results_path: None,
            json_logs: false,
        }
    }
}

impl ServerConfig {
    /// Returns the `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Target database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. It must already exist.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Per-statement execution timeout.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Maximum rows returned per statement.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Sample rows per table included in the schema snapshot.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,

    /// Refuse to run anything but read-only statements.
    #[serde(default)]
    pub read_only: bool,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("database.db")
}

fn default_query_timeout_secs() -> u64 {
    30
}

fn default_max_rows() -> usize {
    1000
}

fn default_sample_rows() -> usize {
    3
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            query_timeout_secs: default_query_timeout_secs(),
            max_rows: default_max_rows(),
            sample_rows: default_sample_rows(),
            read_only: false,
        }
    }
}

/// Pipeline-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound for schema fetch, generation and refinement.
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
}

fn default_stage_timeout_secs() -> u64 {
    120
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout_secs(),
        }
    }
}

/// Language-model configuration for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmStageConfig {
    /// Provider: "openai", "ollama" or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name. Unset means the provider's default.
    #[serde(default)]
    pub model: Option<String>,

    /// Service endpoint. For "openai" this is the full chat completions URL,
    /// for "ollama" the server base URL. Unset means the provider's default.
    #[serde(default)]
    pub base_url: Option<String>,

    /// API key (not recommended to store in config).
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable consulted when `api_key` is unset.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    60
}

impl Default for LlmStageConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            api_key: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmStageConfig {
    /// Parses the configured provider name.
    pub fn provider(&self) -> Result<LlmProvider> {
        self.provider.parse().map_err(AppError::config)
    }

    /// The configured model, or the provider's default.
    pub fn model_for(&self, provider: LlmProvider) -> String {
        match (&self.model, provider) {
            (Some(model), _) if !model.trim().is_empty() => model.clone(),
            (_, LlmProvider::Ollama) => DEFAULT_OLLAMA_MODEL.to_string(),
            (_, LlmProvider::OpenAi | LlmProvider::Mock) => DEFAULT_CHAT_MODEL.to_string(),
        }
    }

    /// The configured endpoint, or the provider's default.
    pub fn endpoint_for(&self, provider: LlmProvider) -> String {
        match (&self.base_url, provider) {
            (Some(url), _) if !url.trim().is_empty() => url.clone(),
            (_, LlmProvider::Ollama) => DEFAULT_OLLAMA_URL.to_string(),
            (_, LlmProvider::OpenAi | LlmProvider::Mock) => DEFAULT_CHAT_URL.to_string(),
        }
    }

    /// Resolves the API key: explicit value first, then the named env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }

    fn validate(&self, section: &str) -> Result<()> {
        let provider = self.provider()?;
        if provider != LlmProvider::Mock {
            let endpoint = self.endpoint_for(provider);
            Url::parse(&endpoint).map_err(|e| {
                AppError::config(format!(
                    "Invalid base_url '{endpoint}' in [{section}]: {e}"
                ))
            })?;
        }
        if self.timeout_secs == 0 {
            return Err(AppError::config(format!(
                "timeout_secs in [{section}] must be greater than zero"
            )));
        }
        Ok(())
    }
}

/// Speech-to-text subprocess configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Interpreter or executable to run.
    #[serde(default = "default_transcription_program")]
    pub program: String,

    /// Script passed as the first argument, before the audio path.
    #[serde(default = "default_transcription_script")]
    pub script: Option<PathBuf>,

    #[serde(default = "default_transcription_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_transcription_program() -> String {
    "python".to_string()
}

fn default_transcription_script() -> Option<PathBuf> {
    Some(PathBuf::from("whisper/transcribe.py"))
}

fn default_transcription_timeout_secs() -> u64 {
    300
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            program: default_transcription_program(),
            script: default_transcription_script(),
            timeout_secs: default_transcription_timeout_secs(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("razorx")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            AppError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies `PORT` and `GROQ_API_URL` from the environment.
    ///
    /// `GROQ_API_URL` only fills OpenAI-compatible stages with no endpoint.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse() {
                self.server.port = port;
            }
        }
        if let Ok(url) = std::env::var("GROQ_API_URL") {
            for stage in [&mut self.generation, &mut self.refinement] {
                let openai = matches!(stage.provider(), Ok(LlmProvider::OpenAi));
                if openai && stage.base_url.is_none() {
                    stage.base_url = Some(url.clone());
                }
            }
        }
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        self.generation.validate("generation")?;
        self.refinement.validate("refinement")?;

        if self.database.max_rows == 0 {
            return Err(AppError::config("max_rows in [database] must be at least 1"));
        }
        if self.database.query_timeout_secs == 0 {
            return Err(AppError::config(
                "query_timeout_secs in [database] must be greater than zero",
            ));
        }
        if self.pipeline.stage_timeout_secs == 0 {
            return Err(AppError::config(
                "stage_timeout_secs in [pipeline] must be greater than zero",
            ));
        }
        if self.transcription.timeout_secs == 0 {
            return Err(AppError::config(
                "timeout_secs in [transcription] must be greater than zero",
            ));
        }
        Ok(())
    }
}
