//! Input validation: gate which artifacts are eligible for conversion.
//!
//! Runs before anything is spawned so an unsupported file never costs an
//! engine start-up (which for a Python OCR stack is several seconds of model
//! loading).

use crate::error::OcrJobError;
use crate::format::{extension_of, InputFormat};
use std::path::Path;

pub use crate::format::is_supported_format;

/// Validate that `path` has a supported input extension.
pub fn validate_input(path: &Path) -> Result<InputFormat, OcrJobError> {
    InputFormat::from_path(path).ok_or_else(|| OcrJobError::UnsupportedFormat {
        path: path.to_path_buf(),
        extension: extension_of(path),
    })
}
