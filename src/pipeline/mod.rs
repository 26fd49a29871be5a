//! Pipeline stages for one OCR job.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the engine can be swapped for a test double without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ validate ──▶ engine ──▶ collect
//! (upload/   (extension)  (subprocess,  (*.{format} in
//!  paste/URL)             time budget)   output dir)
//! ```
//!
//! 1. [`input`]: stage an upload, a local file, a URL download, or a
//!    pasted image as an input artifact
//! 2. [`validate`]: accept only png, jpg, jpeg, pdf, tiff, bmp, before any
//!    process is spawned
//! 3. [`engine`]: run the OCR command with captured output, killing its
//!    process group when it exits, times out, or is cancelled
//! 4. [`collect`]: find the single output file and read it as UTF-8
//!
//! [`encode`] supports `input`: it re-encodes pasted clipboard data as PNG.

pub mod collect;
pub mod encode;
pub mod engine;
pub mod input;
pub mod validate;
