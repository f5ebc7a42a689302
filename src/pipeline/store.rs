//! Atomic persistence of the latest aggregated result.
//!
//! Downstream report tooling reads the file while requests keep landing, so
//! the content is written to a sibling temp file and renamed into place.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{AppError, Result};
use crate::pipeline::PipelineResponse;

/// Writes completed responses to a fixed path.
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the file with `response`. Readers see the old or the new
    /// content, never a partial write.
    pub async fn save(&self, response: &PipelineResponse) -> Result<()> {
        let json = serde_json::to_vec_pretty(response)
            .map_err(|e| AppError::internal(format!("Failed to serialize results: {e}")))?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| AppError::internal(format!("Result writer panicked: {e}")))?
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(|e| {
        AppError::internal(format!("Failed to create temp file in {}: {e}", dir.display()))
    })?;
    file.write_all(contents)
        .and_then(|()| file.as_file().sync_all())
        .map_err(|e| AppError::internal(format!("Failed to write results: {e}")))?;
    file.persist(path).map_err(|e| {
        AppError::internal(format!("Failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}
