//! Streaming job API: observe progress events, then the finished job.
//!
//! [`crate::convert::convert`] only returns when the engine is done, which can
//! be minutes for a long PDF. [`convert_stream`] starts the job on a tokio
//! task and hands back a [`StreamingJob`]: a `Stream` of [`JobEvent`]s plus a
//! cancel handle. Progress events arrive in order, and the stream always
//! ends with exactly one [`JobEvent::Finished`] carrying the cleaned-up job.
//!
//! Input resolution happens eagerly, before this returns, so an unsupported
//! or missing file surfaces as an `Err` instead of a stream.

use crate::cancel::CancellationToken;
use crate::config::JobConfig;
use crate::convert::{convert_artifact, CompletedJob};
use crate::error::OcrJobError;
use crate::format::OutputFormat;
use crate::pipeline::input::{self, ResolvedInput};
use crate::progress::{JobProgress, JobProgressSink, ProgressCallback};
use crate::store::ArtifactStore;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::info;

/// One item of a job's event stream.
#[derive(Debug)]
pub enum JobEvent {
    Progress(JobProgress),
    /// Always the last item.
    Finished(CompletedJob),
}

/// A boxed stream of job events.
pub type JobEventStream = Pin<Box<dyn Stream<Item = JobEvent> + Send>>;

/// A job running in the background.
///
/// Dropping it cancels the job: the engine is killed and the artifacts are
/// released even if nobody reads the stream to the end.
pub struct StreamingJob {
    /// Name the user knows the input by; feeds the download filename.
    pub original_name: String,
    pub events: JobEventStream,
    cancel: CancellationToken,
}

impl StreamingJob {
    /// Kill the engine and finish the job as `Cancelled`.
    ///
    /// The stream still yields the final [`JobEvent::Finished`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle that cancels this job, e.g. from a Ctrl-C handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for StreamingJob {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for StreamingJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingJob")
            .field("original_name", &self.original_name)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Forwards progress into the event channel and to any configured callback.
struct EventSink {
    tx: mpsc::UnboundedSender<JobEvent>,
    inner: Option<ProgressCallback>,
}

impl JobProgressSink for EventSink {
    fn on_progress(&self, update: &JobProgress) {
        if let Some(inner) = &self.inner {
            inner.on_progress(update);
        }
        let _ = self.tx.send(JobEvent::Progress(update.clone()));
    }
}

/// Start converting a local path or HTTP/HTTPS URL in the background.
///
/// # Example
/// ```rust,no_run
/// use edgequake_ocrjob::{convert_stream, JobConfig, JobEvent, OutputFormat};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = JobConfig::default();
/// let mut job = convert_stream("scan.png", OutputFormat::Markdown, &config).await?;
/// while let Some(event) = job.events.next().await {
///     match event {
///         JobEvent::Progress(p) => eprintln!("{:>3.0}% {}", p.fraction * 100.0, p.label),
///         JobEvent::Finished(done) => println!("{}", done.into_result()?.content),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn convert_stream(
    input_str: impl AsRef<str>,
    format: OutputFormat,
    config: &JobConfig,
) -> Result<StreamingJob, OcrJobError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming job: {}", input_str);

    let store = config.store();
    let resolved = input::resolve_input(&store, input_str, config.download_timeout_secs).await?;
    Ok(spawn_job(store, resolved, format, config))
}

/// Start converting uploaded bytes in the background.
///
/// `original_name` supplies the extension used for validation.
pub async fn convert_stream_from_bytes(
    original_name: &str,
    bytes: &[u8],
    format: OutputFormat,
    config: &JobConfig,
) -> Result<StreamingJob, OcrJobError> {
    let store = config.store();
    let resolved = input::ingest_upload(&store, original_name, bytes).await?;
    Ok(spawn_job(store, resolved, format, config))
}

/// Start converting a pasted clipboard image in the background.
///
/// The bytes are re-encoded as PNG first; undecodable data is an `Err`.
pub async fn convert_stream_pasted(
    bytes: Vec<u8>,
    format: OutputFormat,
    config: &JobConfig,
) -> Result<StreamingJob, OcrJobError> {
    let store = config.store();
    let resolved = input::ingest_pasted_image(&store, bytes).await?;
    Ok(spawn_job(store, resolved, format, config))
}

fn spawn_job(
    store: ArtifactStore,
    resolved: ResolvedInput,
    format: OutputFormat,
    config: &JobConfig,
) -> StreamingJob {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let mut job_config = config.clone();
    job_config.progress_callback = Some(Arc::new(EventSink {
        tx: tx.clone(),
        inner: config.progress_callback.clone(),
    }));

    let token = cancel.clone();
    let ResolvedInput {
        artifact,
        original_name,
    } = resolved;
    tokio::spawn(async move {
        let job = convert_artifact(&store, artifact, format, &job_config, Some(&token)).await;
        // The receiver may be gone; the job has already cleaned up either way.
        let _ = tx.send(JobEvent::Finished(job));
    });

    StreamingJob {
        original_name,
        events: Box::pin(UnboundedReceiverStream::new(rx)),
        cancel,
    }
}
