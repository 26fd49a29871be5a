//! Artifact store: collision-free temporary locations with deterministic release.
//!
//! Every job stages its input and receives its output under a shared temp
//! root (default `./temp`). The root is created lazily and never removed by
//! this crate; per-artifact names carry a process-wide monotonic stamp so
//! concurrent and back-to-back jobs never collide, without taking any lock.
//!
//! ## Naming
//!
//! ```text
//! temp/
//!  ├─ 20261019_142501_123456_photo.jpg     input   (<stamp>_<original name>)
//!  └─ output_20261019_142501_123457/       output  (output_<stamp>)
//!      └─ 20261019_142501_123456_photo.md
//! ```
//!
//! ## Release semantics
//!
//! [`ArtifactStore::release`] is idempotent and never fatal. A path that is
//! already gone is a no-op; any other failure is logged at `warn` level and
//! handed back as a [`CleanupWarning`] because the job's outcome has already
//! been decided by the time cleanup runs.

use crate::error::{CleanupWarning, OcrJobError};
use crate::format::{extension_of, InputFormat};
use chrono::{DateTime, Local, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Default temp root, relative to the working directory.
pub const DEFAULT_TEMP_ROOT: &str = "./temp";

static RE_UNSAFE_NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w.\-]+").unwrap());

/// Last stamp handed out, in microseconds since the Unix epoch.
static LAST_STAMP_MICROS: AtomicI64 = AtomicI64::new(0);

/// Where an artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// An uploaded file or a local file copied into the store.
    Uploaded,
    /// An image pasted from the clipboard.
    Pasted,
    /// A document fetched from an HTTP/HTTPS URL.
    Downloaded,
    /// A directory the engine writes its output into.
    GeneratedOutput,
}

/// A temporary file or directory owned by exactly one job.
///
/// Not `Clone`: ownership moves into the job that consumes it, and the job
/// hands it back to [`ArtifactStore::release_artifact`] exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    origin: ArtifactOrigin,
}

impl Artifact {
    pub(crate) fn new(path: PathBuf, origin: ArtifactOrigin) -> Self {
        Self { path, origin }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> ArtifactOrigin {
        self.origin
    }

    /// Input format derived from the extension, if it is a supported one.
    pub fn format(&self) -> Option<InputFormat> {
        InputFormat::from_path(&self.path)
    }

    /// Lowercased extension without the leading dot.
    pub fn extension(&self) -> String {
        extension_of(&self.path)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// Allocates and releases job artifacts under a shared temp root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new(DEFAULT_TEMP_ROOT)
    }
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn ensure_root(&self) -> Result<(), OcrJobError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| OcrJobError::ArtifactWriteFailed {
                path: self.root.clone(),
                source: e,
            })
    }

    /// Build a fresh input path `<root>/<stamp>_<original name>`.
    ///
    /// Creates the temp root if absent. Only the final component of
    /// `original_name` is kept, and characters outside `[\w.-]` are replaced
    /// so a hostile upload name cannot escape the root.
    pub async fn allocate_input_location(
        &self,
        original_name: &str,
    ) -> Result<PathBuf, OcrJobError> {
        self.ensure_root().await?;
        let name = sanitize_name(original_name);
        Ok(self.root.join(format!("{}_{}", next_stamp(), name)))
    }

    /// Stage `bytes` as a new input artifact.
    ///
    /// Uses create-new semantics: an existing file is never overwritten.
    pub async fn write_input(
        &self,
        original_name: &str,
        bytes: &[u8],
        origin: ArtifactOrigin,
    ) -> Result<Artifact, OcrJobError> {
        let path = self.allocate_input_location(original_name).await?;
        let write_err = |e| OcrJobError::ArtifactWriteFailed {
            path: path.clone(),
            source: e,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(write_err)?;
        file.write_all(bytes).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;

        debug!("Staged {:?} input ({} bytes): {}", origin, bytes.len(), path.display());
        Ok(Artifact::new(path, origin))
    }

    /// Create a fresh, empty `<root>/output_<stamp>` directory.
    pub async fn allocate_output_directory(&self) -> Result<Artifact, OcrJobError> {
        self.ensure_root().await?;
        let path = self.root.join(format!("output_{}", next_stamp()));
        // create_dir (not create_dir_all): fails instead of reusing a directory.
        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| OcrJobError::ArtifactWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        debug!("Allocated output directory: {}", path.display());
        Ok(Artifact::new(path, ArtifactOrigin::GeneratedOutput))
    }

    /// Remove an artifact from disk.
    ///
    /// Directories lose their immediate children first, then the directory
    /// itself. A missing path is not an error.
    pub async fn release(&self, path: impl AsRef<Path>) -> Result<(), CleanupWarning> {
        let path = path.as_ref();
        let result = release_path(path).await;
        match &result {
            Ok(()) => debug!("Released artifact: {}", path.display()),
            Err(w) => warn!("{}", w),
        }
        result
    }

    /// Release an owned artifact, consuming it.
    pub async fn release_artifact(&self, artifact: Artifact) -> Result<(), CleanupWarning> {
        self.release(&artifact.path).await
    }
}

async fn release_path(path: &Path) -> Result<(), CleanupWarning> {
    let warning = |e: std::io::Error| CleanupWarning {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };

    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(warning(e)),
    };

    if !meta.is_dir() {
        return ignore_not_found(tokio::fs::remove_file(path).await).map_err(warning);
    }

    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(warning(e)),
    };
    while let Some(entry) = entries.next_entry().await.map_err(warning)? {
        let child = entry.path();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        let removed = if is_dir {
            tokio::fs::remove_dir_all(&child).await
        } else {
            tokio::fs::remove_file(&child).await
        };
        ignore_not_found(removed).map_err(warning)?;
    }
    ignore_not_found(tokio::fs::remove_dir(path).await).map_err(warning)
}

fn ignore_not_found(result: std::io::Result<()>) -> std::io::Result<()> {
    match result {
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Reduce an original file name to a safe single path component.
pub fn sanitize_name(original_name: &str) -> String {
    // Treat both separators as separators regardless of platform: upload
    // names from browsers on Windows arrive with backslashes.
    let last = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned = RE_UNSAFE_NAME_CHARS.replace_all(last, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Next stamp from the process-wide monotonic clock.
///
/// Format `YYYYmmdd_HHMMSS_ffffff` in local time. Each call returns a value
/// at least one microsecond later than the previous call, even if the wall
/// clock stalls or several jobs start within the same microsecond.
pub fn next_stamp() -> String {
    let micros = next_stamp_micros();
    let at = DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or_else(Utc::now);
    at.with_timezone(&Local)
        .format("%Y%m%d_%H%M%S_%6f")
        .to_string()
}

fn next_stamp_micros() -> i64 {
    let now = Utc::now().timestamp_micros();
    let mut last = LAST_STAMP_MICROS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_STAMP_MICROS.compare_exchange_weak(
            last,
            next,
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}
