//! Speech-to-text capability.
//!
//! Uploaded audio is staged as a temporary file in the upload directory,
//! handed to a [`Transcriber`], and discarded afterwards.

mod whisper;

pub use whisper::WhisperCommandTranscriber;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// Converts recorded audio into question text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes the staged file. Blank output is an error.
    async fn transcribe(&self, audio: &StagedAudio) -> Result<String>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// An uploaded audio body written to disk for the transcriber.
///
/// The file is removed when this value is dropped or discarded, so it never
/// outlives the request that staged it.
#[derive(Debug)]
pub struct StagedAudio {
    file: NamedTempFile,
}

impl StagedAudio {
    /// Writes `bytes` to a new file in `dir`, creating `dir` if needed.
    ///
    /// `extension` (without the dot) helps decoders that sniff file names.
    pub async fn stage(dir: &Path, bytes: Vec<u8>, extension: &str) -> Result<Self> {
        let dir = dir.to_path_buf();
        let suffix = format!(".{extension}");

        tokio::task::spawn_blocking(move || -> Result<Self> {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::internal(format!("Cannot create upload dir {}: {e}", dir.display()))
            })?;
            let mut file = tempfile::Builder::new()
                .prefix("upload-")
                .suffix(&suffix)
                .tempfile_in(&dir)
                .map_err(|e| AppError::internal(format!("Cannot stage upload: {e}")))?;
            std::io::Write::write_all(&mut file, &bytes)
                .map_err(|e| AppError::internal(format!("Cannot write upload: {e}")))?;
            Ok(Self { file })
        })
        .await
        .map_err(|e| AppError::internal(format!("Upload writer panicked: {e}")))?
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Removes the staged file now, logging instead of failing.
    pub fn discard(self) {
        let path: PathBuf = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!(path = %path.display(), "Discarded staged audio"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to discard staged audio"),
        }
    }
}

/// Maps an audio MIME type to a file extension.
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let subtype = content_type
        .and_then(|ct| ct.split(';').next())
        .and_then(|essence| essence.trim().strip_prefix("audio/"))
        .unwrap_or("");
    match subtype.to_ascii_lowercase().as_str() {
        "wav" | "x-wav" | "wave" => "wav",
        "mpeg" | "mp3" => "mp3",
        "ogg" => "ogg",
        "webm" => "webm",
        "mp4" | "m4a" | "x-m4a" => "m4a",
        "flac" | "x-flac" => "flac",
        _ => "bin",
    }
}

/// Returns the same text for every file. Used by tests and demos.
#[derive(Debug, Clone)]
pub struct StaticTranscriber {
    text: String,
}

impl StaticTranscriber {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl Transcriber for StaticTranscriber {
    async fn transcribe(&self, audio: &StagedAudio) -> Result<String> {
        debug!(path = %audio.path().display(), "Static transcription");
        let text = self.text.trim();
        if text.is_empty() {
            return Err(AppError::transcription("Transcription produced no text"));
        }
        Ok(text.to_string())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}
