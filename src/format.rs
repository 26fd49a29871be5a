//! Input and output format sets.
//!
//! The OCR engine accepts a fixed set of raster/PDF inputs and renders to one
//! of four text formats. Both sets are closed enums so an unsupported value
//! is rejected at parse time instead of reaching the engine's command line.

use crate::error::OcrJobError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// File formats the engine can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Png,
    Jpg,
    Jpeg,
    Pdf,
    Tiff,
    Bmp,
}

impl InputFormat {
    /// Every supported input format, in display order.
    pub const ALL: [InputFormat; 6] = [
        InputFormat::Png,
        InputFormat::Jpg,
        InputFormat::Jpeg,
        InputFormat::Pdf,
        InputFormat::Tiff,
        InputFormat::Bmp,
    ];

    /// Lowercase extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            InputFormat::Png => "png",
            InputFormat::Jpg => "jpg",
            InputFormat::Jpeg => "jpeg",
            InputFormat::Pdf => "pdf",
            InputFormat::Tiff => "tiff",
            InputFormat::Bmp => "bmp",
        }
    }

    /// Look up a format by extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }

    /// Derive the format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Text formats the engine can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown (`md`). Default.
    #[default]
    #[serde(rename = "md")]
    Markdown,
    Json,
    Html,
    Csv,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Markdown,
        OutputFormat::Json,
        OutputFormat::Html,
        OutputFormat::Csv,
    ];

    /// Extension of the file the engine writes, and the value passed to `-f`.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
            OutputFormat::Html => "html",
            OutputFormat::Csv => "csv",
        }
    }

    /// Human-readable name, e.g. for a format picker.
    pub fn label(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "Markdown",
            OutputFormat::Json => "JSON",
            OutputFormat::Html => "HTML",
            OutputFormat::Csv => "CSV",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = OcrJobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            "html" => Ok(OutputFormat::Html),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(OcrJobError::UnsupportedOutputFormat {
                format: s.to_string(),
            }),
        }
    }
}

/// Lowercased extension of `path` without the leading dot, or `""`.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Check if a path's extension is a supported input format.
///
/// Pure string check; the file is never opened.
pub fn is_supported_format(path: impl AsRef<Path>) -> bool {
    InputFormat::from_path(path.as_ref()).is_some()
}
