//! Configuration for OCR jobs.
//!
//! Everything a job needs beyond its input and output format lives in
//! [`JobConfig`], built via [`JobConfigBuilder`]. The engine command, the
//! temp root, and the time budget are all configurable so the same code
//! drives the real `yomitoku` binary, a `python -m` invocation, or a test
//! double script.

use crate::error::OcrJobError;
use crate::progress::ProgressCallback;
use crate::store::{ArtifactStore, DEFAULT_TEMP_ROOT};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default engine executable.
pub const DEFAULT_ENGINE: &str = "yomitoku";

/// Default wall-clock budget for one engine run (5 minutes).
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(300);

/// Engine flag requesting figure/illustration letter annotation.
pub const FIGURE_LETTER_FLAG: &str = "--figure_letter";

/// Configuration for an OCR job.
///
/// # Example
/// ```rust
/// use edgequake_ocrjob::JobConfig;
/// use std::time::Duration;
///
/// let config = JobConfig::builder()
///     .engine_program("yomitoku")
///     .temp_root("./temp")
///     .time_budget(Duration::from_secs(120))
///     .build()
///     .unwrap();
/// assert!(config.figure_letter);
/// ```
#[derive(Clone)]
pub struct JobConfig {
    /// Engine executable, resolved through `PATH`. Default: `yomitoku`.
    pub engine_program: String,

    /// Arguments placed before the input path, e.g. `["-m", "yomitoku"]`
    /// when `engine_program` is `python`. Default: empty.
    pub engine_args: Vec<String>,

    /// Pass `--figure_letter` to the engine. Default: true.
    pub figure_letter: bool,

    /// Root directory for temporary input and output artifacts. Default: `./temp`.
    pub temp_root: PathBuf,

    /// Maximum wall-clock time for one engine run. Default: 300 s.
    ///
    /// OCR on a dense multi-page PDF routinely takes over a minute on CPU;
    /// five minutes leaves headroom while still catching a wedged engine.
    pub time_budget: Duration,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress sink. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            engine_program: DEFAULT_ENGINE.to_string(),
            engine_args: Vec::new(),
            figure_letter: true,
            temp_root: PathBuf::from(DEFAULT_TEMP_ROOT),
            time_budget: DEFAULT_TIME_BUDGET,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobConfig")
            .field("engine_program", &self.engine_program)
            .field("engine_args", &self.engine_args)
            .field("figure_letter", &self.figure_letter)
            .field("temp_root", &self.temp_root)
            .field("time_budget", &self.time_budget)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn JobProgressSink>"),
            )
            .finish()
    }
}

impl JobConfig {
    /// Create a new builder for `JobConfig`.
    pub fn builder() -> JobConfigBuilder {
        JobConfigBuilder {
            config: Self::default(),
        }
    }

    /// The artifact store rooted at [`temp_root`](Self::temp_root).
    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.temp_root)
    }
}

/// Builder for [`JobConfig`].
pub struct JobConfigBuilder {
    config: JobConfig,
}

impl fmt::Debug for JobConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl JobConfigBuilder {
    pub fn engine_program(mut self, program: impl Into<String>) -> Self {
        self.config.engine_program = program.into();
        self
    }

    pub fn engine_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.engine_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn figure_letter(mut self, v: bool) -> Self {
        self.config.figure_letter = v;
        self
    }

    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.temp_root = root.into();
        self
    }

    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.config.time_budget = budget;
        self
    }

    pub fn time_budget_secs(mut self, secs: u64) -> Self {
        self.config.time_budget = Duration::from_secs(secs);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<JobConfig, OcrJobError> {
        let c = &self.config;
        if c.engine_program.trim().is_empty() {
            return Err(OcrJobError::InvalidConfig(
                "Engine program must not be empty".into(),
            ));
        }
        if c.time_budget.is_zero() {
            return Err(OcrJobError::InvalidConfig(
                "Time budget must be a positive duration".into(),
            ));
        }
        if c.temp_root.as_os_str().is_empty() {
            return Err(OcrJobError::InvalidConfig(
                "Temp root must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
