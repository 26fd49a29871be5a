//! Pasted-image normalisation: clipboard data → PNG bytes.
//!
//! Clipboard pastes arrive in whatever encoding the source application chose
//! (PNG from screenshots, JPEG or BMP from some browsers), and web frontends
//! often hand them over as `data:image/...;base64,` URIs. The engine accepts
//! all of those, but re-encoding to PNG gives every pasted artifact one
//! predictable name and extension, and rejects garbage before an engine
//! start-up is wasted on it.

use crate::error::OcrJobError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Cursor;
use tracing::debug;

/// Decode arbitrary image bytes and re-encode them as PNG.
///
/// CPU-bound; callers on an async runtime should wrap this in
/// `spawn_blocking`.
pub fn normalise_to_png(bytes: &[u8]) -> Result<Vec<u8>, OcrJobError> {
    let img = image::load_from_memory(bytes).map_err(|e| OcrJobError::InvalidImage {
        detail: e.to_string(),
    })?;

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| OcrJobError::InvalidImage {
            detail: format!("PNG encoding failed: {e}"),
        })?;

    debug!(
        "Normalised pasted image {}x{} → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Decode a `data:<mime>;base64,<payload>` URI, or a bare base64 payload.
pub fn decode_data_url(data: &str) -> Result<Vec<u8>, OcrJobError> {
    let data = data.trim();
    let payload = match data.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',').ok_or_else(|| OcrJobError::InvalidImage {
                detail: "data URL has no ',' separator".into(),
            })?;
            if !header.ends_with(";base64") {
                return Err(OcrJobError::InvalidImage {
                    detail: format!("data URL is not base64-encoded ({header})"),
                });
            }
            payload
        }
        None => data,
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).map_err(|e| OcrJobError::InvalidImage {
        detail: format!("invalid base64: {e}"),
    })
}
