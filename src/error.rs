//! Error types for the edgequake-ocrjob library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OcrJobError`]: **Fatal for the job**: the conversion did not produce
//!   a result (unsupported input, engine crash, timeout, missing output).
//!   Returned as the `Err` half of a job's result.
//!
//! * [`CleanupWarning`]: **Non-fatal**: a temporary artifact could not be
//!   removed after the job finished. The job's outcome was already decided,
//!   so these are logged and collected in
//!   [`crate::convert::CompletedJob::warnings`] but never escalated.
//!
//! Every fatal error maps onto a coarse [`ErrorKind`] so callers (and the
//! CLI's `--json` mode) can branch on the class of failure without matching
//! every variant.

use crate::format::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input or requested output format is not supported. Detected before any
    /// process is spawned.
    UnsupportedFormat,
    /// The engine exceeded its time budget and was killed.
    Timeout,
    /// The engine exited non-zero or could not be started.
    EngineFailure,
    /// The engine exited zero but left no matching output file.
    NoOutputProduced,
    /// The caller cancelled the job while the engine was running.
    Cancelled,
    /// The input could not be obtained (missing file, bad URL, bad image).
    Input,
    /// Local filesystem I/O failed while staging or reading artifacts.
    Io,
    /// The job configuration is invalid.
    Config,
    /// Unexpected internal error.
    Internal,
}

/// All fatal errors returned by the edgequake-ocrjob library.
///
/// Cleanup failures use [`CleanupWarning`] and are never propagated here.
#[derive(Debug, Error)]
pub enum OcrJobError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Input extension is not one of png, jpg, jpeg, pdf, tiff, bmp.
    #[error(
        "Unsupported input format '{extension}' for '{path}'\nSupported formats: png, jpg, jpeg, pdf, tiff, bmp"
    )]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// Requested output format is not one of md, json, html, csv.
    #[error("Unsupported output format '{format}'\nSupported formats: md, json, html, csv")]
    UnsupportedOutputFormat { format: String },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The engine ran past its time budget and was forcibly terminated.
    #[error("Processing timeout (exceeded {budget_ms}ms); the OCR engine was terminated")]
    Timeout { budget_ms: u64 },

    /// The engine exited with a non-zero status. `message` is its stderr.
    #[error("{message}")]
    EngineFailure { status: Option<i32>, message: String },

    /// The engine process could not be started at all.
    #[error("Failed to start OCR engine '{program}': {source}\nCheck that it is installed and on PATH.")]
    EngineSpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine exited zero but wrote no `*.{format}` file.
    #[error("No output file generated: engine wrote no '*.{format}' file in '{dir}'")]
    NoOutputProduced { dir: PathBuf, format: OutputFormat },

    /// The job was cancelled while the engine was running.
    #[error("Job cancelled; the OCR engine was terminated")]
    Cancelled,

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is neither a readable path nor an HTTP/HTTPS URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// A session was asked to run before any input was supplied.
    #[error("No input selected: upload, paste, or name a file first")]
    NoInputSelected,

    /// Pasted image bytes could not be decoded.
    #[error("Pasted data is not a decodable image: {detail}")]
    InvalidImage { detail: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create a temporary artifact.
    #[error("Failed to create temporary artifact '{path}': {source}")]
    ArtifactWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not read the engine's output file as UTF-8 text.
    #[error("Failed to read result '{path}': {source}")]
    ResultReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write the result to the requested destination.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrJobError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OcrJobError::UnsupportedFormat { .. } | OcrJobError::UnsupportedOutputFormat { .. } => {
                ErrorKind::UnsupportedFormat
            }
            OcrJobError::Timeout { .. } => ErrorKind::Timeout,
            OcrJobError::EngineFailure { .. } | OcrJobError::EngineSpawnFailed { .. } => {
                ErrorKind::EngineFailure
            }
            OcrJobError::NoOutputProduced { .. } => ErrorKind::NoOutputProduced,
            OcrJobError::Cancelled => ErrorKind::Cancelled,
            OcrJobError::FileNotFound { .. }
            | OcrJobError::PermissionDenied { .. }
            | OcrJobError::InvalidInput { .. }
            | OcrJobError::NoInputSelected
            | OcrJobError::InvalidImage { .. }
            | OcrJobError::DownloadFailed { .. }
            | OcrJobError::DownloadTimeout { .. } => ErrorKind::Input,
            OcrJobError::ArtifactWriteFailed { .. }
            | OcrJobError::ResultReadFailed { .. }
            | OcrJobError::OutputWriteFailed { .. } => ErrorKind::Io,
            OcrJobError::InvalidConfig(_) => ErrorKind::Config,
            OcrJobError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a user may reasonably retry the same job.
    ///
    /// Nothing is retried automatically; this only informs the caller's UI.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Timeout | ErrorKind::EngineFailure | ErrorKind::Cancelled
        )
    }
}

/// A non-fatal failure to remove a temporary artifact.
///
/// Produced by [`crate::store::ArtifactStore::release`]. The job's result is
/// unaffected.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Failed to cleanup temp files at '{path}': {detail}")]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub detail: String,
}
