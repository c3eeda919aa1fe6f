//! code-recorder - record editor sessions and export row logs
//!
//! `record` reads host events as JSON lines on stdin and drives a recorder.
//! `export` replays an existing row log into SRT and JSON files.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use code_recorder::{
    DocumentSnapshot, EditEvent, EnvConfig, ExportFormat, FaultPolicy, Recorder, RecorderConfig,
    RecorderEvent,
};
use edit_log::{ExportOptions, ExportSummary, WriteQueue, export_log, last_elapsed_ms};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "code-recorder")]
#[command(about = "Record editor sessions and export them as timed snapshots")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Record host events read as JSON lines from stdin
    Record {
        /// Workspace root
        #[arg(short, long)]
        workspace: PathBuf,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Replay a row log into export files
    Export {
        /// Row log (.csv)
        log: PathBuf,

        /// Export format; repeat for several (default: all)
        #[arg(short, long, value_enum)]
        format: Vec<FormatArg>,

        /// Output directory (default: next to the log)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Session duration in milliseconds (default: last row time)
        #[arg(long)]
        duration_ms: Option<u64>,

        /// Fail on the first row that does not fit its document
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Srt,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Srt => Self::Srt,
            FormatArg::Json => Self::Json,
        }
    }
}

/// One line of host input.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum HostEvent {
    Start {
        #[serde(default)]
        document: Option<DocumentSnapshot>,
    },
    Focus(DocumentSnapshot),
    Edit(EditEvent),
    Stop,
    Cancel,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    let builder = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Record { workspace, config } => record(&workspace, config.as_deref()),
        Commands::Export {
            log,
            format,
            out,
            duration_ms,
            strict,
        } => export(&log, &format, out, duration_ms, strict),
    }
}

fn print_summary(session: &str, summary: &ExportSummary) -> Result<()> {
    let outputs: Vec<String> = summary
        .outputs
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    let line = serde_json::json!({
        "session": session,
        "changes": summary.changes,
        "durationMs": summary.duration_ms,
        "skippedLines": summary.stats.skipped_lines,
        "faults": summary.stats.faults,
        "outputs": outputs,
    });
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

fn record(workspace: &Path, config: Option<&Path>) -> Result<()> {
    let base = match config {
        Some(path) => RecorderConfig::load(path)?,
        None => RecorderConfig::default(),
    };
    let config = base.apply_env(&EnvConfig::default())?;

    let mut recorder = Recorder::builder()
        .config(config)
        .workspace(workspace)
        .listener(|event| match event {
            RecorderEvent::Notice(notice) => eprintln!("{notice}"),
            RecorderEvent::Started { id } => eprintln!("recording {id}"),
            RecorderEvent::Cancelled { id } => eprintln!("cancelled {id}"),
            RecorderEvent::Stopped { id, summary } => {
                if let Err(err) = print_summary(id.as_str(), summary) {
                    tracing::warn!(error = %err, "Failed to print summary");
                }
            }
        })
        .build();

    for (index, line) in io::stdin().lock().lines().enumerate() {
        let line = line.context("reading host events")?;
        if line.trim().is_empty() {
            continue;
        }
        let event: HostEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(line = index + 1, error = %err, "Ignoring unreadable host event");
                continue;
            }
        };

        // Failures are already surfaced as notices.
        let outcome = match event {
            HostEvent::Start { document } => recorder.start(document.as_ref()).map(drop),
            HostEvent::Focus(doc) => recorder.on_active_document_changed(&doc),
            HostEvent::Edit(edit) => recorder.on_edit_event(&edit).map(drop),
            HostEvent::Stop => recorder.stop().map(drop),
            HostEvent::Cancel => recorder.cancel().map(drop),
        };
        if let Err(err) = outcome {
            tracing::debug!(line = index + 1, error = %err, "Host event not applied");
        }
    }

    if recorder.is_recording() {
        tracing::info!("Input closed while recording; stopping");
        recorder.stop()?;
    }
    Ok(())
}

fn export(
    log: &Path,
    formats: &[FormatArg],
    out: Option<PathBuf>,
    duration_ms: Option<u64>,
    strict: bool,
) -> Result<()> {
    let Some(stem) = log.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        bail!("{} is not a file path", log.display());
    };
    let dir = match out {
        Some(dir) => dir,
        None => log
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
    };

    let duration_ms = match duration_ms {
        Some(ms) => ms,
        None => {
            let file =
                File::open(log).with_context(|| format!("opening row log {}", log.display()))?;
            last_elapsed_ms(BufReader::new(file))?.unwrap_or(0)
        }
    };

    let selected: Vec<ExportFormat> = if formats.is_empty() {
        vec![ExportFormat::Srt, ExportFormat::Json]
    } else {
        formats.iter().copied().map(ExportFormat::from).collect()
    };
    let options = ExportOptions::new(duration_ms)
        .with_formats(selected)
        .with_policy(if strict {
            FaultPolicy::Reject
        } else {
            FaultPolicy::Clamp
        });

    let mut queue = WriteQueue::new(dir, stem.clone());
    for format in &options.formats {
        let target = queue.target(format.file_kind());
        if target.exists() {
            bail!("{} already exists; refusing to append to it", target.display());
        }
    }

    let summary = export_log(log, &options, &mut queue)?;
    print_summary(&stem, &summary)
}
