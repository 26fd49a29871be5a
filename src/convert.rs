//! Job orchestration: run one OCR conversion end-to-end.
//!
//! ## Two layers
//!
//! * [`run`] is the orchestrator proper. It allocates an output directory,
//!   drives the engine under a time budget, reports progress, and reads the
//!   produced file. It never deletes anything: the allocated output
//!   directory is handed back inside [`JobOutcome`] on every path, including
//!   timeouts and spawn failures, so the caller can always release it.
//!
//! * [`convert_artifact`] / [`convert`] are the owning callers. They take
//!   ownership of the input artifact, call [`run`], and release the output
//!   directory and the input exactly once, after the result is in memory.
//!   Cleanup failures are downgraded to [`CleanupWarning`]s.
//!
//! ```text
//! convert ─▶ resolve input ─▶ validate ─▶ run ─▶ release output dir ─▶ release input
//!                                          │
//!                                          ├─ allocate output dir      (Allocating)
//!                                          ├─ 0.2 running conversion   (Running)
//!                                          ├─ engine ⏱ time budget
//!                                          ├─ 0.8 processing results
//!                                          ├─ collect *.{format}
//!                                          └─ 1.0 complete             (Succeeded)
//! ```

use crate::cancel::CancellationToken;
use crate::config::JobConfig;
use crate::error::{CleanupWarning, OcrJobError};
use crate::format::OutputFormat;
use crate::job::{JobState, JobTracker};
use crate::output::{ConversionOutput, JobStats};
use crate::pipeline::engine::{self, EngineInvocation};
use crate::pipeline::{collect, input, validate};
use crate::progress::{JobProgress, JobProgressSink, NoopProgressSink};
use crate::store::{Artifact, ArtifactStore};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Immutable description of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub format: OutputFormat,
    pub time_budget: Duration,
}

impl ConversionRequest {
    pub fn new(input: impl Into<PathBuf>, format: OutputFormat, time_budget: Duration) -> Self {
        Self {
            input: input.into(),
            format,
            time_budget,
        }
    }
}

/// What [`run`] hands back: the result, the state history, and the output
/// directory that still has to be released.
#[derive(Debug)]
pub struct JobOutcome {
    pub result: Result<ConversionOutput, OcrJobError>,
    pub tracker: JobTracker,
    output_dir: Option<Artifact>,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        self.tracker.state()
    }

    /// The allocated output directory, if allocation succeeded.
    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_ref().map(Artifact::path)
    }

    /// Take ownership of the output directory for release.
    pub fn take_output_dir(&mut self) -> Option<Artifact> {
        self.output_dir.take()
    }
}

/// A job whose artifacts have been released.
#[derive(Debug)]
pub struct CompletedJob {
    pub result: Result<ConversionOutput, OcrJobError>,
    /// Non-fatal cleanup failures, already logged.
    pub warnings: Vec<CleanupWarning>,
    /// Every state the job visited. Ends in `Cleaned` for any job that got
    /// past validation; a job rejected by validation never left `Idle`.
    pub history: Vec<JobState>,
}

impl CompletedJob {
    pub fn state(&self) -> JobState {
        *self.history.last().unwrap_or(&JobState::Idle)
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<ConversionOutput, OcrJobError> {
        self.result
    }
}

/// Run one conversion job.
///
/// Preconditions: `request.input` passed input validation, and
/// `request.time_budget` is positive. The input is never deleted here.
///
/// Progress is reported synchronously through `progress` in strictly
/// increasing order, and nothing is reported after this function returns.
pub async fn run(
    store: &ArtifactStore,
    request: &ConversionRequest,
    config: &JobConfig,
    progress: &dyn JobProgressSink,
    cancel: Option<&CancellationToken>,
) -> JobOutcome {
    let start = Instant::now();
    let mut tracker = JobTracker::new();
    info!(
        "Starting OCR job: {} -> {}",
        request.input.display(),
        request.format
    );

    tracker.advance(JobState::Allocating);
    let output_dir = match store.allocate_output_directory().await {
        Ok(dir) => dir,
        Err(e) => {
            tracker.advance(JobState::Faulted);
            return JobOutcome {
                result: Err(e),
                tracker,
                output_dir: None,
            };
        }
    };

    tracker.advance(JobState::Running);
    progress.on_progress(&JobProgress::running());

    let result = execute(request, config, output_dir.path(), progress, cancel, start).await;

    let terminal = match &result {
        Ok(_) => JobState::Succeeded,
        Err(e) => JobState::for_error(e),
    };
    tracker.advance(terminal);
    match &result {
        Ok(out) => info!(
            "OCR job succeeded: {} bytes of {} in {}ms",
            out.content.len(),
            out.format,
            out.stats.total_duration_ms
        ),
        Err(e) => warn!("OCR job ended in state {}: {}", terminal, e),
    }

    JobOutcome {
        result,
        tracker,
        output_dir: Some(output_dir),
    }
}

async fn execute(
    request: &ConversionRequest,
    config: &JobConfig,
    output_dir: &Path,
    progress: &dyn JobProgressSink,
    cancel: Option<&CancellationToken>,
    start: Instant,
) -> Result<ConversionOutput, OcrJobError> {
    let invocation =
        EngineInvocation::from_config(config, &request.input, request.format, output_dir);
    let engine_run = engine::run_engine(&invocation, request.time_budget, cancel).await?;

    progress.on_progress(&JobProgress::processing());

    let collected = collect::collect_output(output_dir, request.format).await?;
    progress.on_progress(&JobProgress::complete());

    let output_file = collected
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(ConversionOutput {
        content: collected.content,
        format: request.format,
        output_file,
        stats: JobStats {
            engine_duration_ms: engine_run.duration.as_millis() as u64,
            total_duration_ms: start.elapsed().as_millis() as u64,
            output_candidates: collected.candidates,
        },
    })
}

/// Run a job on an owned input artifact and release every artifact.
///
/// The input is validated first; a rejected input is released without any
/// process being spawned. Otherwise the output directory and then the input
/// are released after [`run`] returns, i.e. after the result has been read
/// into memory.
pub async fn convert_artifact(
    store: &ArtifactStore,
    input: Artifact,
    format: OutputFormat,
    config: &JobConfig,
    cancel: Option<&CancellationToken>,
) -> CompletedJob {
    let mut warnings = Vec::new();

    if let Err(e) = validate::validate_input(input.path()) {
        collect_warning(store.release_artifact(input).await, &mut warnings);
        return CompletedJob {
            result: Err(e),
            warnings,
            history: vec![JobState::Idle],
        };
    }

    let progress: &dyn JobProgressSink = match config.progress_callback.as_deref() {
        Some(cb) => cb,
        None => &NoopProgressSink,
    };

    let request = ConversionRequest::new(input.path(), format, config.time_budget);
    let mut outcome = run(store, &request, config, progress, cancel).await;

    if let Some(dir) = outcome.take_output_dir() {
        collect_warning(store.release_artifact(dir).await, &mut warnings);
    }
    collect_warning(store.release_artifact(input).await, &mut warnings);
    outcome.tracker.advance(JobState::Cleaned);

    CompletedJob {
        result: outcome.result,
        warnings,
        history: outcome.tracker.history().to_vec(),
    }
}

fn collect_warning(released: Result<(), CleanupWarning>, warnings: &mut Vec<CleanupWarning>) {
    if let Err(w) = released {
        warnings.push(w);
    }
}

/// Convert a local image/PDF or an HTTP/HTTPS URL with the OCR engine.
///
/// This is the primary entry point for the library. The input is staged
/// under the configured temp root, converted, and every temporary artifact
/// is removed before this returns. The user's original file is untouched.
///
/// # Errors
/// Any [`OcrJobError`]; cleanup failures are logged, never returned.
pub async fn convert(
    input_str: impl AsRef<str>,
    format: OutputFormat,
    config: &JobConfig,
) -> Result<ConversionOutput, OcrJobError> {
    let store = config.store();
    let resolved =
        input::resolve_input(&store, input_str.as_ref(), config.download_timeout_secs).await?;
    convert_artifact(&store, resolved.artifact, format, config, None)
        .await
        .into_result()
}

/// Convert and write the result directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    format: OutputFormat,
    output_path: impl AsRef<Path>,
    config: &JobConfig,
) -> Result<JobStats, OcrJobError> {
    let output = convert(input_str, format, config).await?;
    write_atomic(output_path.as_ref(), &output.content).await?;
    Ok(output.stats)
}

/// Write `content` to `path` via a sibling `.tmp` file and a rename, creating
/// parent directories as needed.
pub async fn write_atomic(path: &Path, content: &str) -> Result<(), OcrJobError> {
    let write_err = |e| OcrJobError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, content).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    format: OutputFormat,
    config: &JobConfig,
) -> Result<ConversionOutput, OcrJobError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OcrJobError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, format, config))
}
