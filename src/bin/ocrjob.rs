//! CLI binary for edgequake-ocrjob.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `JobConfig`, runs one job, and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ocrjob::{
    convert_stream, convert_stream_pasted, download_filename_today, write_atomic, JobConfig,
    JobEvent, JobFailure, JobProgress, JobProgressSink, OutputFormat, ProgressCallback,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress sink using indicatif ────────────────────────────────────────

/// Terminal progress sink: one bar from 0 to 100 %, labelled with the
/// job's current stage.
struct CliProgressSink {
    bar: ProgressBar,
}

impl CliProgressSink {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {percent:>3}%  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("OCR");
        bar.set_message("staging input…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn println(&self, line: String) {
        self.bar.println(line);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl JobProgressSink for CliProgressSink {
    fn on_progress(&self, update: &JobProgress) {
        self.bar.set_position((update.fraction * 100.0).round() as u64);
        self.bar.set_message(update.label.clone());
        if update.is_complete() {
            self.bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (Markdown to stdout)
  ocrjob receipt.jpg

  # HTML into a directory; the file is named receipt_YYYYmmdd_ocr.html
  ocrjob receipt.jpg -f html -o results/

  # Explicit output file
  ocrjob scan.pdf -f csv -o tables.csv

  # Convert from URL
  ocrjob https://example.com/docs/invoice.png

  # Paste an image from the clipboard (any decodable format)
  xclip -selection clipboard -t image/png -o | ocrjob --paste

  # Run the engine through Python with a 10-minute budget
  ocrjob --engine python --engine-arg=-m --engine-arg yomitoku --timeout 600 book.pdf

  # JSON report (content, format, timing) or failure ({error_kind, message})
  ocrjob --json page.tiff > report.json

SUPPORTED FORMATS:
  Input    png, jpg, jpeg, pdf, tiff, bmp
  Output   md (default), json, html, csv

ENGINE COMMAND:
  <engine> [<engine-arg>…] <input> -f <format> -o <output dir> [--figure_letter]

  The engine must write exactly one *.<format> file into the output directory
  and exit 0. Anything it prints to stderr becomes the error message on failure.

ENVIRONMENT VARIABLES:
  OCRJOB_ENGINE            Engine executable (default: yomitoku)
  OCRJOB_ENGINE_ARGS       Space-separated arguments placed before the input
  OCRJOB_TEMP_DIR          Temp root for staged inputs and outputs (default: ./temp)
  OCRJOB_TIMEOUT           Engine time budget in seconds (default: 300)
  RUST_LOG                 Override log filtering (e.g. edgequake_ocrjob=debug)
"#;

/// Run an OCR engine over images and PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "ocrjob",
    version,
    about = "Run an OCR engine over images and PDFs",
    long_about = "Run an external OCR engine (yomitoku by default) over an image or PDF \
(local file, URL, or pasted image) with a time budget, and print the recognised text as \
Markdown, JSON, HTML, or CSV. All temporary files are removed when the job ends.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL (png, jpg, jpeg, pdf, tiff, bmp).
    #[arg(required_unless_present = "paste")]
    input: Option<String>,

    /// Read a pasted image from stdin instead of INPUT.
    #[arg(long, conflicts_with = "input")]
    paste: bool,

    /// Output format.
    #[arg(short, long, env = "OCRJOB_FORMAT", value_enum, default_value = "md")]
    format: FormatArg,

    /// Write the result to this file, or into this directory under a
    /// generated name, instead of stdout.
    #[arg(short, long, env = "OCRJOB_OUTPUT")]
    output: Option<PathBuf>,

    /// Engine executable.
    #[arg(long, env = "OCRJOB_ENGINE", default_value = edgequake_ocrjob::config::DEFAULT_ENGINE)]
    engine: String,

    /// Extra engine argument placed before the input (repeatable).
    #[arg(
        long = "engine-arg",
        env = "OCRJOB_ENGINE_ARGS",
        value_delimiter = ' ',
        allow_hyphen_values = true
    )]
    engine_args: Vec<String>,

    /// Do not pass --figure_letter to the engine.
    #[arg(long, env = "OCRJOB_NO_FIGURE_LETTER")]
    no_figure_letter: bool,

    /// Temp root for staged inputs and engine output.
    #[arg(
        long,
        env = "OCRJOB_TEMP_DIR",
        default_value = edgequake_ocrjob::store::DEFAULT_TEMP_ROOT
    )]
    temp_dir: PathBuf,

    /// Engine time budget in seconds.
    #[arg(
        long,
        env = "OCRJOB_TIMEOUT",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "OCRJOB_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output a structured JSON report instead of the raw result.
    #[arg(long, env = "OCRJOB_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "OCRJOB_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCRJOB_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCRJOB_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    #[value(alias = "markdown")]
    Md,
    Json,
    Html,
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Md => OutputFormat::Markdown,
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Html => OutputFormat::Html,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let sink = show_progress.then(CliProgressSink::new);
    let config = build_config(&cli, sink.clone().map(|s| s as ProgressCallback))?;
    let format = OutputFormat::from(cli.format);

    // ── Stage input and start the job ────────────────────────────────────
    let started = if cli.paste {
        let mut bytes = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("Failed to read pasted image from stdin")?;
        convert_stream_pasted(bytes, format, &config).await
    } else {
        let input = cli.input.as_deref().context("No input given")?;
        convert_stream(input, format, &config).await
    };
    let mut job = match started {
        Ok(job) => job,
        Err(e) => {
            if let Some(s) = &sink {
                s.finish();
            }
            if cli.json {
                print_json(&JobFailure::from(&e))?;
            }
            return Err(e).context("Failed to prepare input");
        }
    };

    // Ctrl-C kills the engine; the job still cleans up and reports Cancelled.
    let token = job.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    // ── Wait for the job ─────────────────────────────────────────────────
    let mut finished = None;
    while let Some(event) = job.events.next().await {
        if let JobEvent::Finished(done) = event {
            finished = Some(done);
        }
    }
    if let Some(s) = &sink {
        s.finish();
    }
    let done = finished.context("Job ended without reporting a result")?;

    if !cli.quiet {
        for w in &done.warnings {
            let line = format!("{} {}", cyan("⚠"), w);
            match &sink {
                Some(s) => s.println(line),
                None => eprintln!("{line}"),
            }
        }
    }

    let output = match done.result {
        Ok(output) => output,
        Err(e) => {
            if cli.json {
                print_json(&JobFailure::from(&e))?;
            } else if !cli.quiet {
                eprintln!("{} {}", red("✘"), bold(&format!("{} failed", job.original_name)));
            }
            return Err(e).context("Conversion failed");
        }
    };

    // ── Emit result ──────────────────────────────────────────────────────
    if let Some(ref target) = cli.output {
        let path = if target.is_dir() {
            target.join(download_filename_today(&job.original_name, format))
        } else {
            target.clone()
        };
        write_atomic(&path, &output.content)
            .await
            .context("Failed to write result")?;

        if cli.json {
            print_json(&output)?;
        } else if !cli.quiet {
            eprintln!(
                "{}  {}  {}ms  →  {}",
                green("✔"),
                format.label(),
                output.stats.total_duration_ms,
                bold(&path.display().to_string()),
            );
        }
    } else if cli.json {
        print_json(&output)?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.content.as_bytes())
            .context("Failed to write to stdout")?;
        // Ensure a trailing newline on stdout.
        if !output.content.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }

        if !cli.quiet {
            eprintln!(
                "{} {}  {}",
                green("✔"),
                format.label(),
                dim(&format!(
                    "engine {}ms  /  {}ms total",
                    output.stats.engine_duration_ms, output.stats.total_duration_ms
                )),
            );
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

/// Map CLI args to `JobConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<JobConfig> {
    let mut builder = JobConfig::builder()
        .engine_program(cli.engine.clone())
        .engine_args(cli.engine_args.iter().filter(|a| !a.is_empty()).cloned())
        .figure_letter(!cli.no_figure_letter)
        .temp_root(cli.temp_dir.clone())
        .time_budget_secs(cli.timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
