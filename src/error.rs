//! Error types for razorx.
//!
//! Defines the main error enum used throughout the service. A rejected
//! question is not an error: it is a normal pipeline outcome.

use thiserror::Error;

/// Main error type for razorx operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Speech-to-text failures (subprocess missing, non-zero exit, empty output).
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Schema snapshot could not be produced.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Language-model service errors during generation or refinement.
    #[error("Generation error: {0}")]
    Generation(String),

    /// Database unreachable or could not be opened.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single statement failed to execute.
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (invalid config file, missing API key, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Client supplied something the pipeline cannot work with.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal application errors (I/O, unexpected states).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Creates a transcription error with the given message.
    pub fn transcription(msg: impl Into<String>) -> Self {
        Self::Transcription(msg.into())
    }

    /// Creates a schema error with the given message.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Creates a generation service error with the given message.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an invalid input error with the given message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transcription(_) => "Transcription Error",
            Self::Schema(_) => "Schema Error",
            Self::Generation(_) => "Generation Error",
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::InvalidInput(_) => "Invalid Input",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the bare message without the category prefix.
    ///
    /// Used when an error is turned into a per-statement failure value.
    pub fn message(&self) -> &str {
        match self {
            Self::Transcription(m)
            | Self::Schema(m)
            | Self::Generation(m)
            | Self::Connection(m)
            | Self::Query(m)
            | Self::Config(m)
            | Self::InvalidInput(m)
            | Self::Internal(m) => m,
        }
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;
