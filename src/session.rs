//! Per-user session state for an interactive frontend.
//!
//! A [`Session`] holds what a single user has put on the table: at most one
//! staged input, the selected output format, and the outcome of the last
//! run. Each session owns its own values, so concurrent users never share
//! state.
//!
//! Input lifetime follows the job: replacing the input releases the previous
//! artifact, and [`Session::execute`] hands the input to the job, which
//! releases it on completion. The result survives in memory for display and
//! download.

use crate::cancel::CancellationToken;
use crate::config::JobConfig;
use crate::convert::convert_artifact;
use crate::error::{CleanupWarning, OcrJobError};
use crate::format::OutputFormat;
use crate::output::{download_filename, ConversionOutput, JobFailure};
use crate::pipeline::input::{self, ResolvedInput};
use crate::store::ArtifactStore;
use chrono::{Local, NaiveDate};
use tracing::{debug, info};

/// State of one interactive user.
#[derive(Debug)]
pub struct Session {
    store: ArtifactStore,
    config: JobConfig,
    input: Option<ResolvedInput>,
    output_format: OutputFormat,
    last_result: Option<ConversionOutput>,
    last_failure: Option<JobFailure>,
    last_warnings: Vec<CleanupWarning>,
    /// Original name of the input that produced `last_result`.
    result_name: Option<String>,
}

impl Session {
    pub fn new(config: JobConfig) -> Self {
        Self {
            store: config.store(),
            config,
            input: None,
            output_format: OutputFormat::default(),
            last_result: None,
            last_failure: None,
            last_warnings: Vec::new(),
            result_name: None,
        }
    }

    // ── Input ────────────────────────────────────────────────────────────

    /// Stage uploaded bytes as the current input.
    pub async fn upload(&mut self, original_name: &str, bytes: &[u8]) -> Result<(), OcrJobError> {
        let resolved = input::ingest_upload(&self.store, original_name, bytes).await?;
        self.replace_input(resolved).await;
        Ok(())
    }

    /// Stage a pasted clipboard image as the current input.
    pub async fn paste_image(&mut self, bytes: Vec<u8>) -> Result<(), OcrJobError> {
        let resolved = input::ingest_pasted_image(&self.store, bytes).await?;
        self.replace_input(resolved).await;
        Ok(())
    }

    /// Stage a pasted `data:image/...;base64,` URI as the current input.
    pub async fn paste_data_url(&mut self, data_url: &str) -> Result<(), OcrJobError> {
        let resolved = input::ingest_pasted_data_url(&self.store, data_url).await?;
        self.replace_input(resolved).await;
        Ok(())
    }

    /// Stage a local path or HTTP/HTTPS URL as the current input.
    pub async fn load(&mut self, input_str: &str) -> Result<(), OcrJobError> {
        let resolved =
            input::resolve_input(&self.store, input_str, self.config.download_timeout_secs).await?;
        self.replace_input(resolved).await;
        Ok(())
    }

    async fn replace_input(&mut self, resolved: ResolvedInput) {
        debug!("Session input is now '{}'", resolved.original_name);
        if let Some(previous) = self.input.replace(resolved) {
            if let Err(w) = self.store.release_artifact(previous.artifact).await {
                self.last_warnings.push(w);
            }
        }
    }

    /// Name of the staged input as the user knows it.
    pub fn input_name(&self) -> Option<&str> {
        self.input.as_ref().map(|i| i.original_name.as_str())
    }

    /// Filesystem path of the staged input.
    pub fn input_path(&self) -> Option<&std::path::Path> {
        self.input.as_ref().map(|i| i.artifact.path())
    }

    // ── Format ───────────────────────────────────────────────────────────

    pub fn select_format(&mut self, format: OutputFormat) {
        self.output_format = format;
    }

    /// Parse and select a format such as `"md"` or `"CSV"`.
    pub fn select_format_str(&mut self, format: &str) -> Result<(), OcrJobError> {
        self.output_format = format.parse()?;
        Ok(())
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    // ── Execution ────────────────────────────────────────────────────────

    /// Whether an input is staged and a run would start.
    pub fn can_execute(&self) -> bool {
        self.input.is_some()
    }

    /// Run the staged input through the engine.
    ///
    /// The input is consumed and released whatever the outcome. On success
    /// the output replaces any previous result; on failure the previous
    /// result is cleared and [`last_failure`](Self::last_failure) is set.
    pub async fn execute(
        &mut self,
        cancel: Option<&CancellationToken>,
    ) -> Result<&ConversionOutput, OcrJobError> {
        let ResolvedInput {
            artifact,
            original_name,
        } = self.input.take().ok_or(OcrJobError::NoInputSelected)?;

        info!("Session running '{}' as {}", original_name, self.output_format);
        let job =
            convert_artifact(&self.store, artifact, self.output_format, &self.config, cancel)
                .await;
        self.last_warnings.extend(job.warnings);

        match job.result {
            Ok(output) => {
                self.last_failure = None;
                self.result_name = Some(original_name);
                let output: &ConversionOutput = self.last_result.insert(output);
                Ok(output)
            }
            Err(e) => {
                self.last_result = None;
                self.result_name = None;
                self.last_failure = Some(JobFailure::from(&e));
                Err(e)
            }
        }
    }

    pub fn last_result(&self) -> Option<&ConversionOutput> {
        self.last_result.as_ref()
    }

    pub fn last_failure(&self) -> Option<&JobFailure> {
        self.last_failure.as_ref()
    }

    /// Cleanup failures accumulated by this session.
    pub fn warnings(&self) -> &[CleanupWarning] {
        &self.last_warnings
    }

    /// Suggested download name for the last result, dated today.
    pub fn download_filename(&self) -> Option<String> {
        self.download_filename_on(Local::now().date_naive())
    }

    pub fn download_filename_on(&self, date: NaiveDate) -> Option<String> {
        let result = self.last_result.as_ref()?;
        let name = self.result_name.as_deref()?;
        Some(download_filename(name, result.format, date))
    }

    /// Release the staged input and forget the last outcome.
    pub async fn clear(&mut self) {
        if let Some(previous) = self.input.take() {
            if let Err(w) = self.store.release_artifact(previous.artifact).await {
                self.last_warnings.push(w);
            }
        }
        self.last_result = None;
        self.last_failure = None;
        self.result_name = None;
    }
}
