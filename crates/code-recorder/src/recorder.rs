//! Capture entry points.
//!
//! A [`Recorder`] turns host editor events into rows of the session's row
//! log and, when the session stops, replays the log into the configured
//! exports. Every method runs to completion before returning; hosts feed it
//! one event at a time.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use edit_log::{
    ExportOptions, ExportSummary, FileKind, FileSink, LogError, LogSink, WriteQueue,
    export_log,
};
use serde::{Deserialize, Serialize};

use crate::config::RecorderConfig;
use crate::destination::{self, TemplateVars};
use crate::error::{RecorderError, Result};
use crate::notify::{Listeners, Notification, RecorderEvent};
use crate::session::{Capture, Clock, Session, SessionId, SessionOutcome, SystemClock};

/// The full contents of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Document path.
    pub file: String,
    /// Language identifier.
    #[serde(default)]
    pub language: String,
    /// Full text.
    pub text: String,
}

/// One replaced range in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentChange {
    /// UTF-16 offset of the replaced range.
    pub range_offset: u64,
    /// UTF-16 length of the replaced range.
    pub range_length: u64,
    /// Inserted text.
    pub text: String,
}

/// A burst of changes to one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditEvent {
    /// Document path.
    pub file: String,
    /// Language identifier.
    #[serde(default)]
    pub language: String,
    /// Changes in the order the editor reported them.
    pub changes: Vec<ContentChange>,
}

type SinkFactory = Box<dyn Fn() -> Box<dyn LogSink> + Send + Sync>;

fn file_sink() -> Box<dyn LogSink> {
    Box::new(FileSink)
}

/// Builder for creating recorders.
#[derive(Default)]
pub struct RecorderBuilder {
    config: RecorderConfig,
    workspace: Option<PathBuf>,
    home: Option<PathBuf>,
    clock: Option<Arc<dyn Clock>>,
    sink: Option<SinkFactory>,
    listeners: Listeners,
}

impl fmt::Debug for RecorderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecorderBuilder")
            .field("config", &self.config)
            .field("workspace", &self.workspace)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl RecorderBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: RecorderConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the workspace root.
    #[must_use]
    pub fn workspace(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace = Some(root.into());
        self
    }

    /// Override the home directory used for `${userHome}`.
    #[must_use]
    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Set the clock.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Set the sink used for every session's writes.
    #[must_use]
    pub fn sink<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn LogSink> + Send + Sync + 'static,
    {
        self.sink = Some(Box::new(factory));
        self
    }

    /// Register an event listener.
    #[must_use]
    pub fn listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&RecorderEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Build the recorder.
    #[must_use]
    pub fn build(self) -> Recorder {
        let mut vars = TemplateVars::for_workspace(self.workspace.as_deref());
        if self.home.is_some() {
            vars.home = self.home;
        }
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let sink: SinkFactory = match self.sink {
            Some(sink) => sink,
            None => Box::new(file_sink),
        };

        Recorder {
            config: self.config,
            vars,
            session: Session::new(clock),
            sink,
            queue: None,
            listeners: self.listeners,
        }
    }
}

/// An editor session recorder.
pub struct Recorder {
    config: RecorderConfig,
    vars: TemplateVars,
    session: Session,
    sink: SinkFactory,
    queue: Option<WriteQueue>,
    listeners: Listeners,
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> RecorderBuilder {
        RecorderBuilder::new()
    }

    /// Start a session, recording `active` as the first baseline.
    pub fn start(&mut self, active: Option<&DocumentSnapshot>) -> Result<SessionId> {
        if self.session.is_active() {
            return Err(self.report(RecorderError::AlreadyActive));
        }

        let dir = match destination::resolve(&self.config, &self.vars) {
            Ok(dir) => dir,
            Err(err) => return Err(self.report(err)),
        };
        let begun = self.session.begin(Some(&dir)).map(SessionId::clone);
        let id = match begun {
            Ok(id) => id,
            Err(err) => return Err(self.report(err)),
        };

        let mut queue = WriteQueue::with_sink(&dir, id.as_str(), (self.sink)());
        if let Some(heading) = self.session.encode(Capture::Heading) {
            queue.enqueue(heading, FileKind::Log);
        }
        self.queue = Some(queue);
        if let Some(doc) = active {
            self.enqueue_baseline(doc);
        }
        tracing::info!(session = %id, dir = %dir.display(), "Recording started");
        self.listeners
            .emit(&RecorderEvent::Started { id: id.clone() });

        self.flush()?;
        Ok(id)
    }

    /// Record a burst of content changes, returning the number of rows written.
    pub fn on_edit_event(&mut self, event: &EditEvent) -> Result<usize> {
        if !self.session.is_active() {
            tracing::debug!(file = %event.file, "Edit outside a recording; ignored");
            return Err(RecorderError::NoActiveContext);
        }

        let file = self.relative_path(&event.file);
        let mut rows = 0;
        for change in &event.changes {
            let encoded = self.session.encode(Capture::Content {
                file: &file,
                offset: change.range_offset,
                length: change.range_length,
                text: &change.text,
                language: &event.language,
            });
            if let (Some(row), Some(queue)) = (encoded, self.queue.as_mut()) {
                queue.enqueue(row, FileKind::Log);
                rows += 1;
            }
        }

        self.flush()?;
        Ok(rows)
    }

    /// Record a full baseline of the newly focused document.
    pub fn on_active_document_changed(&mut self, doc: &DocumentSnapshot) -> Result<()> {
        if !self.session.is_active() {
            tracing::debug!(file = %doc.file, "Focus change outside a recording; ignored");
            return Err(RecorderError::NoActiveContext);
        }
        self.enqueue_baseline(doc);
        self.flush()?;
        Ok(())
    }

    /// Stop the session and write the configured exports.
    pub fn stop(&mut self) -> Result<ExportSummary> {
        if !self.session.is_active() {
            return Err(self.report(RecorderError::NotActive));
        }
        self.flush()?;

        let outcome = match self.session.end(false) {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.report(err)),
        };
        let duration_ms = outcome.duration_ms().unwrap_or(0);
        let id = outcome.id().clone();

        let result = match self.queue.as_mut() {
            Some(queue) => {
                let options = ExportOptions::new(duration_ms)
                    .with_formats(self.config.export_formats.iter().copied())
                    .with_policy(self.config.fault_policy());
                let log_path = queue.target(FileKind::Log);
                export_log(&log_path, &options, queue).map_err(RecorderError::from)
            }
            None => Err(RecorderError::NotActive),
        };
        let log_path = self.log_path();
        self.queue = None;
        self.session.teardown();

        match result {
            Ok(summary) => {
                tracing::info!(
                    session = %id,
                    changes = summary.changes,
                    duration_ms,
                    "Recording stopped"
                );
                if summary.formats.is_empty() {
                    let saved = log_path
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    self.listeners.notify(Notification::info(format!(
                        "No export formats selected; the recording was saved to {saved}"
                    )));
                }
                self.listeners.emit(&RecorderEvent::Stopped {
                    id,
                    summary: summary.clone(),
                });
                Ok(summary)
            }
            Err(err) => Err(self.report(err)),
        }
    }

    /// Cancel the session without exporting. Rows already written stay on disk.
    pub fn cancel(&mut self) -> Result<SessionId> {
        if !self.session.is_active() {
            return Err(self.report(RecorderError::NotActive));
        }
        self.force_end()
            .ok_or(RecorderError::NotActive)
    }

    /// Check if a session is recording.
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.session.is_active()
    }

    /// The session state.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Time since the session started.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.session.elapsed()
    }

    /// Path of the active session's row log.
    #[must_use]
    pub fn log_path(&self) -> Option<PathBuf> {
        self.queue.as_ref().map(|q| q.target(FileKind::Log))
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Register an event listener.
    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: Fn(&RecorderEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    fn enqueue_baseline(&mut self, doc: &DocumentSnapshot) {
        let file = self.relative_path(&doc.file);
        let encoded = self.session.encode(Capture::Baseline {
            file: &file,
            text: &doc.text,
            language: &doc.language,
        });
        if let (Some(row), Some(queue)) = (encoded, self.queue.as_mut()) {
            queue.enqueue(row, FileKind::Log);
        }
    }

    fn flush(&mut self) -> Result<()> {
        let Some(queue) = self.queue.as_mut() else {
            return Ok(());
        };
        match queue.flush() {
            Ok(_) => Ok(()),
            Err(err) => Err(self.write_failed(err)),
        }
    }

    /// Surface a failed write. If the destination directory is gone the
    /// session is force-ended.
    fn write_failed(&mut self, err: LogError) -> RecorderError {
        let dir_gone = self
            .queue
            .as_ref()
            .is_some_and(|q| !q.dir().is_dir());
        if dir_gone {
            let dir = self
                .session
                .destination()
                .map(|d| d.display().to_string())
                .unwrap_or_default();
            tracing::error!(dir = %dir, "Recording directory disappeared; cancelling recording");
            self.listeners.notify(Notification::error(format!(
                "Recording directory {dir} no longer exists; the recording was cancelled"
            )));
            self.force_end();
        } else {
            self.listeners
                .notify(Notification::error(format!("Failed to save recording: {err}")));
        }
        RecorderError::from(err)
    }

    fn force_end(&mut self) -> Option<SessionId> {
        let outcome = self.session.end(true).ok()?;
        let dropped = self.queue.take().map_or(0, |mut q| q.clear());
        self.session.teardown();

        let SessionOutcome::Cancelled { id } = outcome else {
            return None;
        };
        tracing::info!(session = %id, dropped, "Recording cancelled");
        self.listeners
            .emit(&RecorderEvent::Cancelled { id: id.clone() });
        Some(id)
    }

    fn report(&self, err: RecorderError) -> RecorderError {
        tracing::warn!(error = %err, "Recorder request failed");
        self.listeners.notify(Notification {
            severity: err.severity(),
            message: err.to_string(),
        });
        err
    }

    /// Path relative to the workspace, with `/` separators.
    fn relative_path(&self, file: &str) -> String {
        let path = Path::new(file);
        match self
            .vars
            .workspace
            .as_deref()
            .and_then(|ws| path.strip_prefix(ws).ok())
        {
            Some(relative) => relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            None => file.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ManualClock;
    use chrono::{TimeZone, Utc};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap())
    }

    #[test]
    fn edits_before_start_have_no_context() {
        let ws = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::builder().workspace(ws.path()).clock(clock()).build();
        let event = EditEvent {
            file: "a.rs".into(),
            language: "rust".into(),
            changes: vec![],
        };
        assert!(matches!(
            recorder.on_edit_event(&event),
            Err(RecorderError::NoActiveContext)
        ));
    }

    #[test]
    fn paths_are_workspace_relative() {
        let ws = tempfile::tempdir().unwrap();
        let recorder = Recorder::builder().workspace(ws.path()).build();
        let inside = ws.path().join("src").join("main.rs");
        assert_eq!(recorder.relative_path(&inside.to_string_lossy()), "src/main.rs");
        assert_eq!(recorder.relative_path("/elsewhere/x.rs"), "/elsewhere/x.rs");
    }

    #[test]
    fn session_files_share_the_session_id() {
        let ws = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::builder().workspace(ws.path()).clock(clock()).build();
        let id = recorder.start(None).unwrap();
        assert_eq!(id.as_str(), "recording_2026_01_02-03_04_05_000");
        assert_eq!(
            recorder.log_path().unwrap(),
            ws.path()
                .join("code-recordings")
                .join("recording_2026_01_02-03_04_05_000.csv")
        );
    }

    #[test]
    fn snapshot_language_defaults_to_empty() {
        let doc: DocumentSnapshot = serde_json::from_str(r#"{"file":"a","text":"b"}"#).unwrap();
        assert_eq!(doc.language, "");
        let event: EditEvent = serde_json::from_str(
            r#"{"file":"a","changes":[{"rangeOffset":1,"rangeLength":2,"text":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(event.changes[0].range_length, 2);
    }
}
