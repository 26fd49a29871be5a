//! Progress reporting for a single OCR job.
//!
//! Inject an [`Arc<dyn JobProgressSink>`] via
//! [`crate::config::JobConfigBuilder::progress_callback`] to receive coarse
//! progress updates while the engine runs.
//!
//! A job emits at most three updates, in strictly increasing order:
//!
//! | Fraction | Label                | When                                |
//! |----------|----------------------|-------------------------------------|
//! | 0.2      | `running conversion` | just before the engine is spawned   |
//! | 0.8      | `processing results` | engine exited 0                     |
//! | 1.0      | `complete`           | output file read into memory        |
//!
//! A job that fails stops before reaching 1.0, so "last fraction == 1.0" is
//! exactly "the job succeeded". No update is emitted after the job returns.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocrjob::{JobConfig, JobProgress, JobProgressSink};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Recorder(Mutex<Vec<f32>>);
//!
//! impl JobProgressSink for Recorder {
//!     fn on_progress(&self, update: &JobProgress) {
//!         self.0.lock().unwrap().push(update.fraction);
//!     }
//! }
//!
//! let config = JobConfig::builder()
//!     .progress_callback(Arc::new(Recorder::default()))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Label emitted before the engine is spawned.
pub const LABEL_RUNNING: &str = "running conversion";
/// Label emitted after the engine exits successfully.
pub const LABEL_PROCESSING: &str = "processing results";
/// Label emitted once the result is in memory.
pub const LABEL_COMPLETE: &str = "complete";

/// One progress update: a fraction in `[0, 1]` and a short label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub fraction: f32,
    pub label: String,
}

impl JobProgress {
    /// Build an update, clamping `fraction` into `[0, 1]`.
    pub fn new(fraction: f32, label: impl Into<String>) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            label: label.into(),
        }
    }

    pub(crate) fn running() -> Self {
        Self::new(0.2, LABEL_RUNNING)
    }

    pub(crate) fn processing() -> Self {
        Self::new(0.8, LABEL_PROCESSING)
    }

    pub(crate) fn complete() -> Self {
        Self::new(1.0, LABEL_COMPLETE)
    }

    /// Whether this update marks a finished, successful job.
    pub fn is_complete(&self) -> bool {
        self.fraction >= 1.0
    }
}

/// Receives progress updates from a running job.
///
/// Calls are fire-and-forget: the job never waits on, or inspects, the sink.
/// Implementations must be `Send + Sync` because jobs may run on a different
/// tokio task than the code that installed the sink.
pub trait JobProgressSink: Send + Sync {
    fn on_progress(&self, update: &JobProgress);
}

/// A no-op sink for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressSink;

impl JobProgressSink for NoopProgressSink {
    fn on_progress(&self, _update: &JobProgress) {}
}

/// Forwards every update into an unbounded tokio channel.
///
/// Sending never blocks; if the receiver has been dropped the update is
/// discarded.
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<JobProgress>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::UnboundedSender<JobProgress>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiver it feeds.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl JobProgressSink for ChannelProgressSink {
    fn on_progress(&self, update: &JobProgress) {
        let _ = self.tx.send(update.clone());
    }
}

/// Convenience alias matching the type stored in [`crate::config::JobConfig`].
pub type ProgressCallback = Arc<dyn JobProgressSink>;
