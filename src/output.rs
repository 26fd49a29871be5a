//! Result types returned to callers.

use crate::error::{ErrorKind, OcrJobError};
use crate::format::OutputFormat;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A successful conversion: the engine's output file, read into memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Exact UTF-8 contents of the produced file.
    pub content: String,
    /// Effective output format.
    pub format: OutputFormat,
    /// File name the engine chose (the file itself is gone after cleanup).
    pub output_file: String,
    pub stats: JobStats,
}

/// Timing and bookkeeping for one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    /// Wall-clock time spent inside the engine process.
    pub engine_duration_ms: u64,
    /// Wall-clock time for the whole job, allocation through read.
    pub total_duration_ms: u64,
    /// Number of files matching the format; more than 1 is an engine anomaly.
    pub output_candidates: usize,
}

/// Serialisable `{error_kind, message}` view of a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub error_kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<&OcrJobError> for JobFailure {
    fn from(err: &OcrJobError) -> Self {
        Self {
            error_kind: err.kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Suggested download filename: `{original-stem}_{YYYYmmdd}_ocr.{format}`.
pub fn download_filename(original_name: &str, format: OutputFormat, date: NaiveDate) -> String {
    let stem = Path::new(original_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    format!("{}_{}_ocr.{}", stem, date.format("%Y%m%d"), format.extension())
}

/// [`download_filename`] dated today in local time.
pub fn download_filename_today(original_name: &str, format: OutputFormat) -> String {
    download_filename(original_name, format, Local::now().date_naive())
}
