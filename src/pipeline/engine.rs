//! Engine invocation: run the external OCR command as a bounded subprocess.
//!
//! ## Command line
//!
//! ```text
//! <program> [<engine_args>…] <input> -f <md|json|html|csv> -o <output dir> [--figure_letter]
//! ```
//!
//! stdin is closed and both output streams are captured, so the engine never
//! writes to the caller's terminal.
//!
//! ## Termination
//!
//! On Unix the engine is started in its own process group. Python OCR stacks
//! fork worker processes; killing only the direct child would leave those
//! workers running and holding the output pipes open.
//!
//! * Timeout or cancellation: the whole group receives `SIGKILL`, then the
//!   direct child is killed and reaped so no zombie outlives the call.
//! * Normal exit (any status): the group is killed as well, so a worker that
//!   outlived its parent cannot keep writing into a released output directory.
//! * Abandoned future: `Drop` sends the same group kill.
//!
//! Once the engine is gone both pipes are drained together under one short
//! grace period. Whatever was read before the grace period ends is kept.

use crate::cancel::CancellationToken;
use crate::config::{JobConfig, FIGURE_LETTER_FLAG};
use crate::error::OcrJobError;
use crate::format::OutputFormat;
use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long to wait for the output pipes to drain after the engine exits.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Message used when the engine fails without writing anything to stderr.
pub const UNKNOWN_ENGINE_ERROR: &str = "Unknown error occurred";

/// A fully-specified engine invocation.
#[derive(Debug, Clone)]
pub struct EngineInvocation<'a> {
    pub program: &'a str,
    pub leading_args: &'a [String],
    pub input: &'a Path,
    pub format: OutputFormat,
    pub output_dir: &'a Path,
    pub figure_letter: bool,
}

impl<'a> EngineInvocation<'a> {
    pub fn from_config(
        config: &'a JobConfig,
        input: &'a Path,
        format: OutputFormat,
        output_dir: &'a Path,
    ) -> Self {
        Self {
            program: &config.engine_program,
            leading_args: &config.engine_args,
            input,
            format,
            output_dir,
            figure_letter: config.figure_letter,
        }
    }

    /// Arguments after the program name.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.leading_args.iter().map(OsString::from).collect();
        args.push(self.input.as_os_str().to_owned());
        args.push("-f".into());
        args.push(self.format.extension().into());
        args.push("-o".into());
        args.push(self.output_dir.as_os_str().to_owned());
        if self.figure_letter {
            args.push(FIGURE_LETTER_FLAG.into());
        }
        args
    }
}

/// Captured result of an engine run that exited with status 0.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Run the engine to completion, bounded by `budget`.
///
/// # Errors
/// - [`OcrJobError::EngineSpawnFailed`]: the program could not be started
/// - [`OcrJobError::Timeout`]: `budget` elapsed; the process group was killed
/// - [`OcrJobError::Cancelled`]: `cancel` fired; the process group was killed
/// - [`OcrJobError::EngineFailure`]: non-zero exit; carries stderr
pub async fn run_engine(
    invocation: &EngineInvocation<'_>,
    budget: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<EngineOutput, OcrJobError> {
    let args = invocation.args();
    info!("Running OCR engine: {} {:?}", invocation.program, args);

    let mut command = Command::new(invocation.program);
    command
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let child = command
        .spawn()
        .map_err(|e| OcrJobError::EngineSpawnFailed {
            program: invocation.program.to_string(),
            source: e,
        })?;

    let start = Instant::now();
    let mut process = EngineProcess::new(child);
    let mut stdout = PipeCapture::spawn(process.child.stdout.take());
    let mut stderr = PipeCapture::spawn(process.child.stderr.take());

    let waited = tokio::select! {
        status = process.child.wait() => Waited::Exited(status),
        _ = tokio::time::sleep(budget) => Waited::TimedOut,
        _ = wait_cancelled(cancel) => Waited::Cancelled,
    };

    let status: ExitStatus = match waited {
        Waited::Exited(Ok(status)) => {
            process.mark_reaped();
            process.kill_stragglers().await;
            status
        }
        Waited::Exited(Err(e)) => {
            process.terminate().await;
            abort_readers(&stdout, &stderr);
            return Err(OcrJobError::Internal(format!("Failed to wait on OCR engine: {e}")));
        }
        Waited::TimedOut => {
            warn!(
                "OCR engine exceeded its {}ms budget; terminating",
                budget.as_millis()
            );
            process.terminate().await;
            abort_readers(&stdout, &stderr);
            return Err(OcrJobError::Timeout {
                budget_ms: budget.as_millis() as u64,
            });
        }
        Waited::Cancelled => {
            info!("Job cancelled; terminating OCR engine");
            process.terminate().await;
            abort_readers(&stdout, &stderr);
            return Err(OcrJobError::Cancelled);
        }
    };

    let duration = start.elapsed();
    let (stdout, stderr) = drain(&mut stdout, &mut stderr).await;
    debug!(
        "OCR engine exited with {} after {:?} ({} bytes stdout, {} bytes stderr)",
        status,
        duration,
        stdout.len(),
        stderr.len()
    );

    if !status.success() {
        let message = if stderr.trim().is_empty() {
            UNKNOWN_ENGINE_ERROR.to_string()
        } else {
            stderr
        };
        return Err(OcrJobError::EngineFailure {
            status: status.code(),
            message,
        });
    }

    Ok(EngineOutput {
        stdout,
        stderr,
        duration,
    })
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

async fn wait_cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Bytes read from one engine pipe so far.
///
/// The reader appends chunk by chunk, so aborting it keeps everything
/// already read.
struct PipeCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PipeCapture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                        Err(poisoned) => poisoned.into_inner().extend_from_slice(&chunk[..n]),
                    },
                    Err(e) => {
                        debug!("Engine pipe read ended early: {}", e);
                        break;
                    }
                }
            }
        });
        Self { buf, task }
    }

    fn text(&self) -> String {
        let buf = match self.buf.lock() {
            Ok(buf) => buf,
            Err(poisoned) => poisoned.into_inner(),
        };
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Wait for both readers to hit EOF, together, for at most [`PIPE_DRAIN_GRACE`].
async fn drain(stdout: &mut PipeCapture, stderr: &mut PipeCapture) -> (String, String) {
    let both = async { tokio::join!(&mut stdout.task, &mut stderr.task) };
    let drained = tokio::time::timeout(PIPE_DRAIN_GRACE, both).await;
    match drained {
        Ok((out, err)) => {
            for joined in [out, err] {
                if let Err(e) = joined {
                    warn!("Engine pipe reader failed: {}", e);
                }
            }
        }
        Err(_) => {
            warn!(
                "Engine pipe still open {:?} after exit; keeping output read so far",
                PIPE_DRAIN_GRACE
            );
            abort_readers(stdout, stderr);
        }
    }
    (stdout.text(), stderr.text())
}

fn abort_readers(stdout: &PipeCapture, stderr: &PipeCapture) {
    stdout.task.abort();
    stderr.task.abort();
}

/// Owns the engine child and its process group until it has been reaped.
struct EngineProcess {
    child: Child,
    pid: Option<u32>,
    reaped: bool,
}

impl EngineProcess {
    fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child,
            pid,
            reaped: false,
        }
    }

    fn mark_reaped(&mut self) {
        self.reaped = true;
    }

    /// Kill whatever is left of the group after the child exited on its own.
    ///
    /// An empty group makes `kill` fail, which is ignored.
    async fn kill_stragglers(&self) {
        self.kill_group().await;
    }

    /// Kill the process group and the child, then reap the child.
    async fn terminate(&mut self) {
        self.kill_group().await;
        // kill() sends SIGKILL and waits, which reaps the child.
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill OCR engine (pid {:?}): {}", self.pid, e);
        }
        self.reaped = true;
    }

    #[cfg(unix)]
    async fn kill_group(&self) {
        let Some(pid) = self.pid else {
            return;
        };
        let status = Command::new("kill")
            .args(group_kill_args(pid))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = status {
            debug!("Process-group kill for {} failed: {}", pid, e);
        }
    }

    #[cfg(not(unix))]
    async fn kill_group(&self) {}
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        // Abandoned mid-run. kill_on_drop handles the direct child; take the
        // rest of the group down with it.
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            let _ = std::process::Command::new("kill")
                .args(group_kill_args(pid))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
        }
    }
}

#[cfg(unix)]
fn group_kill_args(pgid: u32) -> [String; 4] {
    [
        "-s".to_string(),
        "KILL".to_string(),
        "--".to_string(),
        format!("-{pgid}"),
    ]
}
