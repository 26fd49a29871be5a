//! Input resolution: normalise an upload, a paste, a local path, or a URL
//! into an input [`Artifact`] owned by the job.
//!
//! ## Why copy local files into the store?
//!
//! A job releases its input artifact when it finishes. Staging a private
//! copy under the temp root means that release only ever deletes what the
//! job created, never the user's original document. Extensions are validated
//! *before* anything is staged, so an unsupported file leaves no trace.

use crate::error::OcrJobError;
use crate::pipeline::{encode, validate};
use crate::store::{Artifact, ArtifactOrigin, ArtifactStore};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-disk name for pasted images.
pub const PASTED_FILE_NAME: &str = "pasted.png";

/// User-facing name for pasted images (stem feeds the download filename).
pub const PASTED_DISPLAY_NAME: &str = "pasted_image.png";

/// An input artifact plus the name the user knows it by.
#[derive(Debug)]
pub struct ResolvedInput {
    pub artifact: Artifact,
    pub original_name: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or HTTP/HTTPS URL into a staged input artifact.
pub async fn resolve_input(
    store: &ArtifactStore,
    input: &str,
    timeout_secs: u64,
) -> Result<ResolvedInput, OcrJobError> {
    if is_url(input) {
        download_url(store, input, timeout_secs).await
    } else if input.trim().is_empty() {
        Err(OcrJobError::InvalidInput {
            input: input.to_string(),
        })
    } else {
        stage_local(store, Path::new(input)).await
    }
}

/// Stage uploaded bytes under their original file name.
pub async fn ingest_upload(
    store: &ArtifactStore,
    original_name: &str,
    bytes: &[u8],
) -> Result<ResolvedInput, OcrJobError> {
    validate::validate_input(Path::new(original_name))?;
    let artifact = store
        .write_input(original_name, bytes, ArtifactOrigin::Uploaded)
        .await?;
    Ok(ResolvedInput {
        artifact,
        original_name: original_name.to_string(),
    })
}

/// Stage a pasted clipboard image as PNG.
pub async fn ingest_pasted_image(
    store: &ArtifactStore,
    bytes: Vec<u8>,
) -> Result<ResolvedInput, OcrJobError> {
    let png = tokio::task::spawn_blocking(move || encode::normalise_to_png(&bytes))
        .await
        .map_err(|e| OcrJobError::Internal(format!("Image decode task panicked: {e}")))??;

    let artifact = store
        .write_input(PASTED_FILE_NAME, &png, ArtifactOrigin::Pasted)
        .await?;
    Ok(ResolvedInput {
        artifact,
        original_name: PASTED_DISPLAY_NAME.to_string(),
    })
}

/// Stage a pasted `data:image/...;base64,` URI (or bare base64) as PNG.
pub async fn ingest_pasted_data_url(
    store: &ArtifactStore,
    data_url: &str,
) -> Result<ResolvedInput, OcrJobError> {
    let bytes = encode::decode_data_url(data_url)?;
    ingest_pasted_image(store, bytes).await
}

/// Copy a local file into the store.
async fn stage_local(store: &ArtifactStore, path: &Path) -> Result<ResolvedInput, OcrJobError> {
    validate::validate_input(path)?;

    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        IoErrorKind::NotFound => OcrJobError::FileNotFound {
            path: path.to_path_buf(),
        },
        IoErrorKind::PermissionDenied => OcrJobError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => OcrJobError::InvalidInput {
            input: format!("{} ({e})", path.display()),
        },
    })?;

    let original_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let artifact = store
        .write_input(&original_name, &bytes, ArtifactOrigin::Uploaded)
        .await?;
    debug!(
        "Staged local input {} as {}",
        path.display(),
        artifact.path().display()
    );
    Ok(ResolvedInput {
        artifact,
        original_name,
    })
}

/// Download a URL into the store.
async fn download_url(
    store: &ArtifactStore,
    url: &str,
    timeout_secs: u64,
) -> Result<ResolvedInput, OcrJobError> {
    info!("Downloading input from: {}", url);

    let filename = extract_filename(url).ok_or_else(|| OcrJobError::InvalidInput {
        input: url.to_string(),
    })?;
    // Reject before spending bandwidth on a file the engine cannot read.
    validate::validate_input(&PathBuf::from(&filename))?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OcrJobError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            OcrJobError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrJobError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(OcrJobError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            OcrJobError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrJobError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    let artifact = store
        .write_input(&filename, &bytes, ArtifactOrigin::Downloaded)
        .await?;
    info!("Downloaded to: {}", artifact.path().display());

    Ok(ResolvedInput {
        artifact,
        original_name: filename,
    })
}

/// Last non-empty path segment of the URL, if it has an extension.
fn extract_filename(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() || !last.contains('.') {
        return None;
    }
    Some(last.to_string())
}
