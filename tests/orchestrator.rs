//! Integration tests for the job orchestrator, driven by fake OCR engines.
//!
//! Each fake engine is a small `sh` script written into the test's temp
//! directory and run as `sh <script> <input> -f <fmt> -o <dir> [--figure_letter]`,
//! so inside the script `$1` is the input, `$3` the format and `$5` the
//! output directory.
//!
//! Run with:
//!   cargo test --test orchestrator -- --nocapture

#![cfg(unix)]

use chrono::NaiveDate;
use edgequake_ocrjob::{
    convert, convert_artifact, convert_stream, convert_to_file, run, ArtifactOrigin, ArtifactStore,
    ChannelProgressSink, ConversionRequest, ErrorKind, JobConfig, JobConfigBuilder, JobEvent,
    JobProgress, JobState, NoopProgressSink, OcrJobError, OutputFormat, Session,
};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG` controls the level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Write a fake engine script and return its path.
fn write_engine(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write engine script");
    path
}

/// A config that runs `script` through `sh` with its temp root inside `tmp`.
fn engine_config(tmp: &TempDir, script: &Path) -> JobConfigBuilder {
    JobConfig::builder()
        .engine_program("sh")
        .engine_args([script.to_string_lossy().into_owned()])
        .temp_root(tmp.path().join("temp"))
}

/// Write a user document outside the temp root.
fn user_file(tmp: &TempDir, name: &str) -> PathBuf {
    let path = tmp.path().join(name);
    std::fs::write(&path, b"document-bytes").expect("write input");
    path
}

/// Entries left under the temp root (a missing root counts as empty).
fn leftovers(tmp: &TempDir) -> Vec<PathBuf> {
    match std::fs::read_dir(tmp.path().join("temp")) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Whether `pid` is still running. A zombie counts as dead: `kill -0`
/// succeeds on it until something reaps it.
fn pid_alive(pid: &str) -> bool {
    if Path::new("/proc/self/status").exists() {
        return match std::fs::read_to_string(format!("/proc/{pid}/status")) {
            Ok(status) => !status
                .lines()
                .filter_map(|line| line.strip_prefix("State:"))
                .any(|state| matches!(state.split_whitespace().next(), Some("Z" | "X"))),
            Err(_) => false,
        };
    }
    std::process::Command::new("kill")
        .args(["-0", pid])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Poll until `pid` is gone; SIGKILL delivery is not instantaneous.
async fn wait_until_dead(pid: &str, within: Duration) -> bool {
    let started = Instant::now();
    while pid_alive(pid) {
        if started.elapsed() > within {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}

/// Poll until the script has written a pid into `path`.
async fn read_pid(path: &Path, within: Duration) -> String {
    let started = Instant::now();
    loop {
        if let Ok(pid) = std::fs::read_to_string(path) {
            if !pid.trim().is_empty() {
                return pid.trim().to_string();
            }
        }
        assert!(started.elapsed() < within, "no pid written to {}", path.display());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// An engine that forks a `sleep` worker, records the worker's pid, then runs `rest`.
fn forking_engine(tmp: &TempDir, pid_file: &Path, worker_secs: u32, rest: &str) -> PathBuf {
    write_engine(
        tmp.path(),
        "engine.sh",
        &format!("sleep {worker_secs} &\necho $! > '{}'\n{rest}", pid_file.display()),
    )
}

/// Progress sink that records every update.
fn recording_sink() -> (
    Arc<ChannelProgressSink>,
    tokio::sync::mpsc::UnboundedReceiver<JobProgress>,
) {
    let (sink, rx) = ChannelProgressSink::channel();
    (Arc::new(sink), rx)
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<JobProgress>) -> Vec<JobProgress> {
    let mut out = Vec::new();
    while let Ok(p) = rx.try_recv() {
        out.push(p);
    }
    out
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn photo_to_markdown_succeeds_and_cleans_up() {
    let tmp = TempDir::new().unwrap();
    let args_file = tmp.path().join("args.txt");
    let script = write_engine(
        tmp.path(),
        "engine.sh",
        &format!(
            "printf '%s\\n' \"$@\" > '{}'\nprintf '# Title\\n' > \"$5/photo.md\"",
            args_file.display()
        ),
    );
    let input = user_file(&tmp, "photo.jpg");
    let config = engine_config(&tmp, &script).build().unwrap();

    let output = convert(input.to_str().unwrap(), OutputFormat::Markdown, &config)
        .await
        .expect("conversion should succeed");

    assert_eq!(output.content, "# Title\n");
    assert_eq!(output.format, OutputFormat::Markdown);
    assert_eq!(output.output_file, "photo.md");
    assert_eq!(output.stats.output_candidates, 1);

    // The engine saw: <staged input> -f md -o <dir> --figure_letter
    let args = std::fs::read_to_string(&args_file).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(args.len(), 6, "args: {args:?}");
    assert!(args[0].ends_with("_photo.jpg"), "staged input: {}", args[0]);
    assert_eq!(&args[1..3], ["-f", "md"]);
    assert_eq!(args[3], "-o");
    assert!(
        Path::new(args[4])
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("output_"),
        "output dir: {}",
        args[4]
    );
    assert_eq!(args[5], "--figure_letter");

    assert!(leftovers(&tmp).is_empty(), "left: {:?}", leftovers(&tmp));
    assert!(input.exists(), "the user's file must not be deleted");
}

#[tokio::test]
async fn engine_failure_carries_stderr() {
    let tmp = TempDir::new().unwrap();
    let script = write_engine(tmp.path(), "engine.sh", "printf 'parse error' >&2\nexit 1");
    let input = user_file(&tmp, "doc.pdf");
    let config = engine_config(&tmp, &script).build().unwrap();

    let err = convert(input.to_str().unwrap(), OutputFormat::Csv, &config)
        .await
        .unwrap_err();

    match &err {
        OcrJobError::EngineFailure { status, message } => {
            assert_eq!(*status, Some(1));
            assert_eq!(message, "parse error");
        }
        other => panic!("expected EngineFailure, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::EngineFailure);
    assert!(leftovers(&tmp).is_empty());
}

#[tokio::test]
async fn silent_engine_failure_uses_generic_message() {
    let tmp = TempDir::new().unwrap();
    let script = write_engine(tmp.path(), "engine.sh", "echo '   ' >&2\nexit 2");
    let input = user_file(&tmp, "scan.bmp");
    let config = engine_config(&tmp, &script).build().unwrap();

    let err = convert(input.to_str().unwrap(), OutputFormat::Json, &config)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unknown error occurred");
}

#[tokio::test]
async fn hung_engine_times_out_and_is_killed() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let pid_file = tmp.path().join("engine.pid");
    let script = write_engine(
        tmp.path(),
        "engine.sh",
        &format!("echo $$ > '{}'\nexec sleep 30", pid_file.display()),
    );
    let input = user_file(&tmp, "scan.tiff");
    let config = engine_config(&tmp, &script)
        .time_budget(Duration::from_secs(1))
        .build()
        .unwrap();

    let started = Instant::now();
    let err = convert(input.to_str().unwrap(), OutputFormat::Html, &config)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, OcrJobError::Timeout { budget_ms: 1000 }), "got {err:?}");
    assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    assert!(
        wait_until_dead(pid.trim(), Duration::from_secs(2)).await,
        "engine pid {} still alive",
        pid.trim()
    );
    assert!(leftovers(&tmp).is_empty());
}

#[tokio::test]
async fn unsupported_input_never_spawns_engine() {
    let tmp = TempDir::new().unwrap();
    let marker = tmp.path().join("ran");
    let script = write_engine(
        tmp.path(),
        "engine.sh",
        &format!("touch '{}'", marker.display()),
    );
    let input = user_file(&tmp, "weird.xyz");
    let config = engine_config(&tmp, &script).build().unwrap();

    let err = convert(input.to_str().unwrap(), OutputFormat::Markdown, &config)
        .await
        .unwrap_err();

    assert!(
        matches!(&err, OcrJobError::UnsupportedFormat { extension, .. } if extension == "xyz"),
        "got {err:?}"
    );
    assert!(!marker.exists(), "engine must not run");
    assert!(leftovers(&tmp).is_empty());
}

#[tokio::test]
async fn missing_output_is_no_output_produced() {
    let tmp = TempDir::new().unwrap();
    // Writes the wrong extension only.
    let script = write_engine(tmp.path(), "engine.sh", "printf 'x' > \"$5/page.txt\"");
    let store = ArtifactStore::new(tmp.path().join("temp"));
    let input = store
        .write_input("photo.png", b"png", ArtifactOrigin::Uploaded)
        .await
        .unwrap();
    let config = engine_config(&tmp, &script).build().unwrap();

    let job = convert_artifact(&store, input, OutputFormat::Markdown, &config, None).await;

    assert!(matches!(job.result, Err(OcrJobError::NoOutputProduced { .. })));
    assert!(job.history.contains(&JobState::NoOutput));
    assert_eq!(job.state(), JobState::Cleaned);
    assert!(leftovers(&tmp).is_empty());
}

#[tokio::test]
async fn several_outputs_pick_first_by_name() {
    let tmp = TempDir::new().unwrap();
    let script = write_engine(
        tmp.path(),
        "engine.sh",
        "printf 'B' > \"$5/b.md\"\nprintf 'A' > \"$5/a.md\"\nprintf 'C' > \"$5/c.json\"",
    );
    let input = user_file(&tmp, "photo.jpeg");
    let config = engine_config(&tmp, &script).build().unwrap();

    let output = convert(input.to_str().unwrap(), OutputFormat::Markdown, &config)
        .await
        .unwrap();
    assert_eq!(output.content, "A");
    assert_eq!(output.output_file, "a.md");
    assert_eq!(output.stats.output_candidates, 2);
}

// ── Progress & state ─────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_is_reported_in_order() {
    let tmp = TempDir::new().unwrap();
    let script = write_engine(tmp.path(), "engine.sh", "printf 'ok' > \"$5/out.html\"");
    let input = user_file(&tmp, "scan.png");
    let (sink, mut rx) = recording_sink();
    let config = engine_config(&tmp, &script)
        .progress_callback(sink)
        .build()
        .unwrap();

    convert(input.to_str().unwrap(), OutputFormat::Html, &config)
        .await
        .unwrap();

    let updates = drain(&mut rx);
    let fractions: Vec<f32> = updates.iter().map(|p| p.fraction).collect();
    assert_eq!(fractions, vec![0.2, 0.8, 1.0]);
    let labels: Vec<&str> = updates.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, vec!["running conversion", "processing results", "complete"]);
}

#[tokio::test]
async fn failed_engine_stops_progress_at_running() {
    let tmp = TempDir::new().unwrap();
    let script = write_engine(tmp.path(), "engine.sh", "exit 1");
    let input = user_file(&tmp, "scan.png");
    let (sink, mut rx) = recording_sink();
    let config = engine_config(&tmp, &script)
        .progress_callback(sink)
        .build()
        .unwrap();

    assert!(convert(input.to_str().unwrap(), OutputFormat::Markdown, &config)
        .await
        .is_err());
    let fractions: Vec<f32> = drain(&mut rx).iter().map(|p| p.fraction).collect();
    assert_eq!(fractions, vec![0.2]);
}

#[tokio::test]
async fn run_leaves_cleanup_to_the_caller() {
    let tmp = TempDir::new().unwrap();
    let script = write_engine(tmp.path(), "engine.sh", "printf '{}' > \"$5/r.json\"");
    let store = ArtifactStore::new(tmp.path().join("temp"));
    let input = store
        .write_input("photo.png", b"png", ArtifactOrigin::Uploaded)
        .await
        .unwrap();
    let config = engine_config(&tmp, &script).build().unwrap();
    let request = ConversionRequest::new(input.path(), OutputFormat::Json, config.time_budget);

    let mut outcome = run(&store, &request, &config, &NoopProgressSink, None).await;

    assert_eq!(outcome.result.as_ref().unwrap().content, "{}");
    assert_eq!(
        outcome.tracker.history(),
        &[
            JobState::Idle,
            JobState::Allocating,
            JobState::Running,
            JobState::Succeeded
        ]
    );
    assert!(input.exists(), "run never deletes the input");
    let out_dir = outcome.output_dir().unwrap().to_path_buf();
    assert!(out_dir.join("r.json").exists());

    store.release_artifact(outcome.take_output_dir().unwrap()).await.unwrap();
    // Releasing an already-removed path is a no-op.
    store.release(&out_dir).await.unwrap();
    store.release_artifact(input).await.unwrap();
    assert!(leftovers(&tmp).is_empty());
}

#[tokio::test]
async fn figure_letter_flag_can_be_disabled() {
    let tmp = TempDir::new().unwrap();
    let args_file = tmp.path().join("args.txt");
    let script = write_engine(
        tmp.path(),
        "engine.sh",
        &format!(
            "printf '%s\\n' \"$@\" > '{}'\nprintf 'x' > \"$5/x.csv\"",
            args_file.display()
        ),
    );
    let input = user_file(&tmp, "table.pdf");
    let config = engine_config(&tmp, &script)
        .figure_letter(false)
        .build()
        .unwrap();

    convert(input.to_str().unwrap(), OutputFormat::Csv, &config)
        .await
        .unwrap();
    let args = std::fs::read_to_string(&args_file).unwrap();
    assert_eq!(args.lines().count(), 5);
    assert!(!args.contains("--figure_letter"));
}

#[tokio::test]
async fn concurrent_jobs_do_not_collide() {
    let tmp = TempDir::new().unwrap();
    let script = write_engine(
        tmp.path(),
        "engine.sh",
        "base=$(basename \"$1\")\nprintf '%s' \"$base\" > \"$5/out.md\"",
    );
    let a = user_file(&tmp, "a.png");
    let b = user_file(&tmp, "b.png");
    let config = engine_config(&tmp, &script).build().unwrap();

    let (ra, rb) = tokio::join!(
        convert(a.to_str().unwrap(), OutputFormat::Markdown, &config),
        convert(b.to_str().unwrap(), OutputFormat::Markdown, &config),
    );
    let (ra, rb) = (ra.unwrap(), rb.unwrap());
    assert!(ra.content.ends_with("_a.png"), "got {}", ra.content);
    assert!(rb.content.ends_with("_b.png"), "got {}", rb.content);
    assert!(leftovers(&tmp).is_empty());
}

#[tokio::test]
async fn convert_to_file_writes_result() {
    let tmp = TempDir::new().unwrap();
    let script = write_engine(tmp.path(), "engine.sh", "printf '# Title\\n' > \"$5/p.md\"");
    let input = user_file(&tmp, "photo.jpg");
    let target = tmp.path().join("out/photo.md");
    let config = engine_config(&tmp, &script).build().unwrap();

    convert_to_file(input.to_str().unwrap(), OutputFormat::Markdown, &target, &config)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "# Title\n");
}

// ── Streaming & cancellation ─────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_stream_kills_engine() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let pid_file = tmp.path().join("engine.pid");
    let script = write_engine(
        tmp.path(),
        "engine.sh",
        &format!("echo $$ > '{}'\nexec sleep 30", pid_file.display()),
    );
    let input = user_file(&tmp, "scan.png");
    let config = engine_config(&tmp, &script).build().unwrap();

    let mut job = convert_stream(input.to_str().unwrap(), OutputFormat::Markdown, &config)
        .await
        .unwrap();

    let started = Instant::now();
    let mut finished = None;
    while let Some(event) = job.events.next().await {
        match event {
            JobEvent::Progress(p) => {
                assert_eq!(p.fraction, 0.2);
                // Give the script time to record its pid.
                while !pid_file.exists() && started.elapsed() < Duration::from_secs(5) {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                job.cancel();
            }
            JobEvent::Finished(done) => finished = Some(done),
        }
    }

    let done = finished.expect("stream must end with Finished");
    assert!(matches!(done.result, Err(OcrJobError::Cancelled)));
    assert!(done.history.contains(&JobState::Cancelled));
    assert_eq!(done.state(), JobState::Cleaned);
    assert!(started.elapsed() < Duration::from_secs(10));

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    assert!(wait_until_dead(pid.trim(), Duration::from_secs(2)).await);
    assert!(leftovers(&tmp).is_empty());
}

// ── Forked workers ───────────────────────────────────────────────────────────

#[tokio::test]
async fn forked_worker_is_killed_on_timeout() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let pid_file = tmp.path().join("worker.pid");
    let script = forking_engine(&tmp, &pid_file, 30, "wait");
    let input = user_file(&tmp, "scan.pdf");
    let config = engine_config(&tmp, &script)
        .time_budget(Duration::from_secs(1))
        .build()
        .unwrap();

    let err = convert(input.to_str().unwrap(), OutputFormat::Markdown, &config)
        .await
        .unwrap_err();
    assert!(matches!(err, OcrJobError::Timeout { .. }), "got {err:?}");

    let worker = read_pid(&pid_file, Duration::from_secs(1)).await;
    assert!(
        wait_until_dead(&worker, Duration::from_secs(2)).await,
        "worker {worker} survived the timeout"
    );
    assert!(leftovers(&tmp).is_empty());
}

#[tokio::test]
async fn forked_worker_is_killed_on_cancel() {
    let tmp = TempDir::new().unwrap();
    let pid_file = tmp.path().join("worker.pid");
    let script = forking_engine(&tmp, &pid_file, 30, "wait");
    let input = user_file(&tmp, "scan.png");
    let config = engine_config(&tmp, &script).build().unwrap();

    let mut job = convert_stream(input.to_str().unwrap(), OutputFormat::Markdown, &config)
        .await
        .unwrap();

    let mut worker = None;
    let mut finished = None;
    while let Some(event) = job.events.next().await {
        match event {
            JobEvent::Progress(_) => {
                worker = Some(read_pid(&pid_file, Duration::from_secs(5)).await);
                job.cancel();
            }
            JobEvent::Finished(done) => finished = Some(done),
        }
    }

    let done = finished.expect("stream must end with Finished");
    assert!(matches!(done.result, Err(OcrJobError::Cancelled)));
    let worker = worker.expect("engine reported running");
    assert!(
        wait_until_dead(&worker, Duration::from_secs(2)).await,
        "worker {worker} survived cancellation"
    );
    assert!(leftovers(&tmp).is_empty());
}

#[tokio::test]
async fn forked_worker_does_not_swallow_engine_stderr() {
    let tmp = TempDir::new().unwrap();
    let pid_file = tmp.path().join("worker.pid");
    let script = forking_engine(&tmp, &pid_file, 20, "printf 'parse error' >&2\nexit 1");
    let input = user_file(&tmp, "doc.pdf");
    let config = engine_config(&tmp, &script).build().unwrap();

    let started = Instant::now();
    let err = convert(input.to_str().unwrap(), OutputFormat::Csv, &config)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    match &err {
        OcrJobError::EngineFailure { status, message } => {
            assert_eq!(*status, Some(1));
            assert_eq!(message, "parse error");
        }
        other => panic!("expected EngineFailure, got {other:?}"),
    }
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");

    let worker = read_pid(&pid_file, Duration::from_secs(1)).await;
    assert!(wait_until_dead(&worker, Duration::from_secs(2)).await);
    assert!(leftovers(&tmp).is_empty());
}

#[tokio::test]
async fn lingering_worker_is_killed_after_success() {
    let tmp = TempDir::new().unwrap();
    let pid_file = tmp.path().join("worker.pid");
    let script = forking_engine(&tmp, &pid_file, 20, "printf '# Page' > \"$5/page.md\"");
    let input = user_file(&tmp, "photo.jpg");
    let config = engine_config(&tmp, &script).build().unwrap();

    let started = Instant::now();
    let output = convert(input.to_str().unwrap(), OutputFormat::Markdown, &config)
        .await
        .unwrap();
    assert_eq!(output.content, "# Page");
    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());

    let worker = read_pid(&pid_file, Duration::from_secs(1)).await;
    assert!(
        wait_until_dead(&worker, Duration::from_secs(2)).await,
        "worker {worker} outlived the job"
    );
    assert!(leftovers(&tmp).is_empty());
}

#[tokio::test]
async fn dropped_stream_kills_engine_and_cleans_up() {
    let tmp = TempDir::new().unwrap();
    let pid_file = tmp.path().join("worker.pid");
    let script = forking_engine(&tmp, &pid_file, 30, "wait");
    let input = user_file(&tmp, "scan.png");
    let config = engine_config(&tmp, &script).build().unwrap();

    let mut job = convert_stream(input.to_str().unwrap(), OutputFormat::Markdown, &config)
        .await
        .unwrap();
    match job.events.next().await {
        Some(JobEvent::Progress(p)) => assert_eq!(p.fraction, 0.2),
        other => panic!("expected the running update, got {other:?}"),
    }
    let worker = read_pid(&pid_file, Duration::from_secs(5)).await;
    drop(job);

    assert!(
        wait_until_dead(&worker, Duration::from_secs(5)).await,
        "worker {worker} survived the dropped job"
    );
    let started = Instant::now();
    while !leftovers(&tmp).is_empty() && started.elapsed() < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(leftovers(&tmp).is_empty(), "left: {:?}", leftovers(&tmp));
}

// ── Session ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_upload_execute_download() {
    let tmp = TempDir::new().unwrap();
    let script = write_engine(tmp.path(), "engine.sh", "printf '# Title\\n' > \"$5/photo.md\"");
    let config = engine_config(&tmp, &script).build().unwrap();
    let mut session = Session::new(config);

    session.upload("photo.jpg", b"jpeg").await.unwrap();
    assert!(session.can_execute());

    let content = session.execute(None).await.unwrap().content.clone();
    assert_eq!(content, "# Title\n");
    assert!(!session.can_execute(), "input is consumed by the run");
    assert!(session.last_failure().is_none());

    let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
    assert_eq!(
        session.download_filename_on(day).as_deref(),
        Some("photo_20261019_ocr.md")
    );
    assert!(leftovers(&tmp).is_empty());
}
