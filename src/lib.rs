//! # edgequake-ocrjob
//!
//! Run an external OCR engine (`yomitoku` by default) over images and PDFs,
//! one bounded, self-cleaning job at a time.
//!
//! ## What a job guarantees
//!
//! * Unsupported inputs are rejected by extension before any process starts.
//! * The engine runs as a subprocess with captured output and a wall-clock
//!   budget (300 s by default). Its whole process group is killed once the
//!   job ends, so forked workers never outlive it.
//! * The result is the exact text of the single `*.{format}` file the engine
//!   writes, read into memory.
//! * Every temporary artifact (staged input, output directory) is released
//!   once the result is in memory, on every exit path. Cleanup failures are
//!   warnings, never job failures.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload / paste / path / URL
//!  │
//!  ├─ 1. Input     stage a private copy under the temp root
//!  ├─ 2. Validate  png, jpg, jpeg, pdf, tiff, bmp
//!  ├─ 3. Engine    <engine> <input> -f <fmt> -o <dir> --figure_letter
//!  ├─ 4. Collect   read the one *.{fmt} file
//!  └─ 5. Cleanup   release output dir, then input
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocrjob::{convert, JobConfig, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = JobConfig::default();
//!     let output = convert("receipt.jpg", OutputFormat::Markdown, &config).await?;
//!     println!("{}", output.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocrjob` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ocrjob = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancellationToken;
pub use config::{JobConfig, JobConfigBuilder};
pub use convert::{
    convert, convert_artifact, convert_sync, convert_to_file, run, write_atomic, CompletedJob,
    ConversionRequest, JobOutcome,
};
pub use error::{CleanupWarning, ErrorKind, OcrJobError};
pub use format::{is_supported_format, InputFormat, OutputFormat};
pub use job::{JobState, JobTracker};
pub use output::{
    download_filename, download_filename_today, ConversionOutput, JobFailure, JobStats,
};
pub use progress::{
    ChannelProgressSink, JobProgress, JobProgressSink, NoopProgressSink, ProgressCallback,
};
pub use session::Session;
pub use store::{Artifact, ArtifactOrigin, ArtifactStore};
pub use stream::{
    convert_stream, convert_stream_from_bytes, convert_stream_pasted, JobEvent, JobEventStream,
    StreamingJob,
};
