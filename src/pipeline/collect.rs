//! Output collection: locate and read the file the engine produced.
//!
//! The engine contract is one `*.{format}` file per job, written directly
//! into the output directory. Anything else is an anomaly: zero files is a
//! contract violation ([`OcrJobError::NoOutputProduced`]), several files are
//! logged and resolved by taking the lexicographically first name so the
//! choice never depends on directory iteration order.

use crate::error::OcrJobError;
use crate::format::OutputFormat;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The engine's output, read into memory.
#[derive(Debug, Clone)]
pub struct CollectedOutput {
    pub path: PathBuf,
    pub content: String,
    /// How many matching files were present (normally 1).
    pub candidates: usize,
}

/// All regular files directly under `dir` whose extension is `format`,
/// sorted by file name.
pub async fn find_outputs(dir: &Path, format: OutputFormat) -> Result<Vec<PathBuf>, OcrJobError> {
    let read_err = |e| OcrJobError::ResultReadFailed {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_err)?;
    let mut matches = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let path = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        let ext_matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == format.extension());
        if is_file && ext_matches {
            matches.push(path);
        }
    }
    matches.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(matches)
}

/// Select the single output file and read it as UTF-8 text.
pub async fn collect_output(
    dir: &Path,
    format: OutputFormat,
) -> Result<CollectedOutput, OcrJobError> {
    let candidates = find_outputs(dir, format).await?;
    let Some(path) = candidates.first().cloned() else {
        return Err(OcrJobError::NoOutputProduced {
            dir: dir.to_path_buf(),
            format,
        });
    };

    if candidates.len() > 1 {
        warn!(
            "Engine produced {} '*.{}' files in {}; using {}",
            candidates.len(),
            format,
            dir.display(),
            path.display()
        );
    }

    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| OcrJobError::ResultReadFailed {
            path: path.clone(),
            source: e,
        })?;
    debug!("Read {} bytes from {}", content.len(), path.display());

    Ok(CollectedOutput {
        path,
        content,
        candidates: candidates.len(),
    })
}
