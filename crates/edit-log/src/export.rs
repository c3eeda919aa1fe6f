//! Subtitle and structured exports of a replayed row log.

use std::fmt;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::queue::{FileKind, WriteQueue};
use crate::replay::{Change, ChangeStream, FaultPolicy, ReplayStats};

/// Export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    /// Timed subtitle blocks (`.srt`).
    #[serde(rename = "SRT", alias = "srt")]
    Srt,
    /// One JSON array of changes (`.json`).
    #[serde(rename = "JSON", alias = "json")]
    Json,
}

impl ExportFormat {
    /// The file kind this format is written to.
    #[must_use]
    pub const fn file_kind(self) -> FileKind {
        match self {
            Self::Srt => FileKind::Subtitles,
            Self::Json => FileKind::Structured,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Srt => "SRT",
            Self::Json => "JSON",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SRT" => Ok(Self::Srt),
            "JSON" => Ok(Self::Json),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// Options for [`export_log`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Session duration; closes the last change.
    pub duration_ms: u64,
    /// Requested formats. May be empty.
    pub formats: Vec<ExportFormat>,
    /// Fault policy for the replay.
    pub policy: FaultPolicy,
}

impl ExportOptions {
    /// Create options with no formats requested.
    #[must_use]
    pub const fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            formats: Vec::new(),
            policy: FaultPolicy::Clamp,
        }
    }

    /// Request a format.
    #[must_use]
    pub fn with_format(mut self, format: ExportFormat) -> Self {
        if !self.formats.contains(&format) {
            self.formats.push(format);
        }
        self
    }

    /// Request several formats.
    #[must_use]
    pub fn with_formats(self, formats: impl IntoIterator<Item = ExportFormat>) -> Self {
        formats.into_iter().fold(self, Self::with_format)
    }

    /// Set the fault policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: FaultPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Check if a format was requested.
    #[must_use]
    pub fn wants(&self, format: ExportFormat) -> bool {
        self.formats.contains(&format)
    }
}

/// Outcome of an export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Number of changes replayed.
    pub changes: usize,
    /// Session duration used for the last change.
    pub duration_ms: u64,
    /// Formats written. Empty when none were requested.
    pub formats: Vec<ExportFormat>,
    /// Files written.
    pub outputs: Vec<PathBuf>,
    /// Replay counters.
    pub stats: ReplayStats,
}

/// Render a millisecond count as `HH:MM:SS,mmm`.
#[must_use]
pub fn format_srt_time(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

#[derive(Serialize)]
struct SubtitlePayload<'a> {
    text: &'a str,
    file: &'a str,
    language: &'a str,
}

/// Render one subtitle block, including the trailing blank line.
pub fn srt_block(change: &Change) -> Result<String> {
    let payload = serde_json::to_string(&SubtitlePayload {
        text: &change.text,
        file: &change.file_path,
        language: &change.language_id,
    })?;
    Ok(format!(
        "{}\n{} --> {}\n{}\n\n",
        change.sequence,
        format_srt_time(change.start_time),
        format_srt_time(change.end_time),
        payload
    ))
}

/// Render the structured export document.
pub fn json_document(changes: &[Change]) -> Result<String> {
    Ok(serde_json::to_string_pretty(changes)?)
}

/// Replay the row log at `log_path` and write the requested exports.
///
/// The log is opened before anything is queued, so a missing log produces
/// no output at all.
pub fn export_log(
    log_path: &Path,
    options: &ExportOptions,
    queue: &mut WriteQueue,
) -> Result<ExportSummary> {
    let stream = ChangeStream::open(log_path, options.duration_ms)?.with_policy(options.policy);
    export_changes(stream, options, queue)
}

/// Write the requested exports for an already-open replay.
///
/// Subtitle blocks are queued and flushed one per closed change; the
/// structured document is written once after the replay finishes. If the
/// replay fails after subtitle blocks were written, the incomplete subtitle
/// file is removed.
pub fn export_changes<R: BufRead>(
    mut stream: ChangeStream<R>,
    options: &ExportOptions,
    queue: &mut WriteQueue,
) -> Result<ExportSummary> {
    let srt = options.wants(ExportFormat::Srt);
    let json = options.wants(ExportFormat::Json);
    if !srt && !json {
        tracing::info!("No export formats requested; replaying without output");
    }

    let mut collected = Vec::new();
    let mut changes = 0;
    for change in &mut stream {
        let change = match change {
            Ok(change) => change,
            Err(err) => {
                if srt && changes > 0 {
                    discard_partial(queue, FileKind::Subtitles);
                }
                return Err(err);
            }
        };
        changes += 1;
        if srt {
            queue.enqueue(srt_block(&change)?, FileKind::Subtitles);
            queue.flush()?;
        }
        if json {
            collected.push(change);
        }
    }

    if json {
        queue.enqueue(json_document(&collected)?, FileKind::Structured);
        queue.flush()?;
    }

    let formats: Vec<ExportFormat> = [ExportFormat::Srt, ExportFormat::Json]
        .into_iter()
        .filter(|f| options.wants(*f))
        .collect();
    let outputs = formats
        .iter()
        .map(|f| queue.target(f.file_kind()))
        .collect();

    tracing::info!(
        changes,
        duration_ms = options.duration_ms,
        skipped = stream.stats().skipped_lines,
        faults = stream.stats().faults,
        "Replay finished"
    );

    Ok(ExportSummary {
        changes,
        duration_ms: options.duration_ms,
        formats,
        outputs,
        stats: stream.stats().clone(),
    })
}

fn discard_partial(queue: &WriteQueue, kind: FileKind) {
    let path = queue.target(kind);
    match fs::remove_file(&path) {
        Ok(()) => tracing::warn!(path = %path.display(), "Removed incomplete export"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Failed to remove incomplete export"
        ),
    }
}
