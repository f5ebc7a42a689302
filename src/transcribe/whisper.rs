//! Whisper transcription through a subprocess.
//!
//! Runs `<program> [script] <audio path>` and reads the transcription from
//! stdout. The child is killed if it outlives the timeout.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{StagedAudio, Transcriber};
use crate::config::TranscriptionConfig;
use crate::error::{AppError, Result};

/// Transcriber backed by an external command.
#[derive(Debug, Clone)]
pub struct WhisperCommandTranscriber {
    program: String,
    script: Option<PathBuf>,
    timeout: Duration,
}

impl WhisperCommandTranscriber {
    pub fn new(program: impl Into<String>, script: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            script,
            timeout,
        }
    }

    pub fn from_config(config: &TranscriptionConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.script.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn command(&self, audio: &StagedAudio) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(script) = &self.script {
            command.arg(script);
        }
        command
            .arg(audio.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Transcriber for WhisperCommandTranscriber {
    async fn transcribe(&self, audio: &StagedAudio) -> Result<String> {
        let start = Instant::now();
        let child = self.command(audio).spawn().map_err(|e| {
            AppError::transcription(format!("Failed to start {}: {e}", self.program))
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AppError::transcription(format!(
                    "Transcription timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::transcription(format!("Failed to read transcriber output: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!(stderr = %stderr.trim(), "Transcriber wrote to stderr");
        }

        if !output.status.success() {
            return Err(AppError::transcription(format!(
                "Transcriber exited with {}",
                output.status
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(AppError::transcription("Transcription produced no text"));
        }

        debug!(
            transcribe_ms = start.elapsed().as_millis() as u64,
            chars = text.chars().count(),
            "Audio transcribed"
        );
        Ok(text)
    }

    fn describe(&self) -> String {
        match &self.script {
            Some(script) => format!("{} {}", self.program, script.display()),
            None => self.program.clone(),
        }
    }
}
