//! Recording session state.
//!
//! A [`Session`] owns the per-recording counters: the row sequence, the start
//! and end timestamps, and the identifier every session file is named after.
//! It is created idle, becomes active on [`Session::begin`], and is reset by
//! [`Session::teardown`] after the session has ended.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use edit_log::{EditRow, FileKind, HEADING, encode_row};

use crate::error::{RecorderError, Result};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock reading `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    /// Set the current time.
    pub fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// Identifier of a session, derived from its start time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Derive the identifier for a session started at `start`.
    #[must_use]
    pub fn from_start(start: DateTime<Utc>) -> Self {
        Self(start.format("recording_%Y_%m_%d-%H_%M_%S_%3f").to_string())
    }

    /// The identifier for a session started at `start` whose files do not
    /// exist yet under `dir`. Collisions get a `_1`, `_2`, ... suffix.
    #[must_use]
    pub fn unclaimed(start: DateTime<Utc>, dir: &Path) -> Self {
        let base = Self::from_start(start);
        if !base.is_claimed(dir) {
            return base;
        }
        let mut suffix = 1_u64;
        loop {
            let id = Self(format!("{base}_{suffix}"));
            if !id.is_claimed(dir) {
                return id;
            }
            suffix += 1;
        }
    }

    /// Check if any session file named after this id exists under `dir`.
    #[must_use]
    pub fn is_claimed(&self, dir: &Path) -> bool {
        [FileKind::Log, FileKind::Subtitles, FileKind::Structured]
            .iter()
            .any(|kind| dir.join(format!("{}.{}", self.0, kind.extension())).exists())
    }

    /// The identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Not recording.
    #[default]
    Idle,
    /// Recording.
    Active,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Stopped normally; exports should be produced.
    Completed {
        /// Session identifier.
        id: SessionId,
        /// Start time.
        start: DateTime<Utc>,
        /// End time.
        end: DateTime<Utc>,
    },
    /// Force-ended; no exports.
    Cancelled {
        /// Session identifier.
        id: SessionId,
    },
}

impl SessionOutcome {
    /// The session identifier.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        match self {
            Self::Completed { id, .. } | Self::Cancelled { id } => id,
        }
    }

    /// Session length in milliseconds, for a completed session.
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        match self {
            Self::Completed { start, end, .. } => {
                Some(u64::try_from((*end - *start).num_milliseconds()).unwrap_or(0))
            }
            Self::Cancelled { .. } => None,
        }
    }
}

/// A captured event to be stamped and encoded.
#[derive(Debug, Clone, Copy)]
pub enum Capture<'a> {
    /// The column header that opens the row log. Not sequenced.
    Heading,
    /// An incremental splice.
    Content {
        /// Document path.
        file: &'a str,
        /// UTF-16 range start.
        offset: u64,
        /// UTF-16 range length.
        length: u64,
        /// Inserted text.
        text: &'a str,
        /// Language identifier.
        language: &'a str,
    },
    /// A full-document baseline.
    Baseline {
        /// Document path.
        file: &'a str,
        /// Full document text.
        text: &'a str,
        /// Language identifier.
        language: &'a str,
    },
}

/// Per-recording state.
pub struct Session {
    clock: Arc<dyn Clock>,
    state: SessionState,
    sequence: u64,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    id: Option<SessionId>,
    destination: Option<PathBuf>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("sequence", &self.sequence)
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("id", &self.id)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl Session {
    /// Create an idle session reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: SessionState::Idle,
            sequence: 0,
            start_time: None,
            end_time: None,
            id: None,
            destination: None,
        }
    }

    /// Start recording into `destination`. The id never names files that
    /// already exist there.
    pub fn begin(&mut self, destination: Option<&Path>) -> Result<&SessionId> {
        if self.is_active() {
            return Err(RecorderError::AlreadyActive);
        }
        let Some(destination) = destination else {
            return Err(RecorderError::no_destination("no destination directory"));
        };

        let start = self.clock.now();
        self.state = SessionState::Active;
        self.sequence = 0;
        self.start_time = Some(start);
        self.end_time = None;
        self.destination = Some(destination.to_path_buf());
        Ok(&*self.id.insert(SessionId::unclaimed(start, destination)))
    }

    /// End the session. A forced end drops the export intent.
    pub fn end(&mut self, forced: bool) -> Result<SessionOutcome> {
        if !self.is_active() {
            return Err(RecorderError::NotActive);
        }
        self.state = SessionState::Idle;

        let (Some(id), Some(start)) = (self.id.clone(), self.start_time) else {
            return Err(RecorderError::NotActive);
        };
        if forced {
            return Ok(SessionOutcome::Cancelled { id });
        }

        let end = self.clock.now().max(start);
        self.end_time = Some(end);
        Ok(SessionOutcome::Completed { id, start, end })
    }

    /// Reset counters and timestamps after the session ended.
    pub fn teardown(&mut self) {
        self.state = SessionState::Idle;
        self.sequence = 0;
        self.start_time = None;
        self.end_time = None;
        self.id = None;
        self.destination = None;
    }

    /// Stamp `capture` with the next sequence number and elapsed time and
    /// encode it as a row. Returns `None` when idle.
    pub fn encode(&mut self, capture: Capture<'_>) -> Option<String> {
        if !self.is_active() {
            return None;
        }
        let elapsed = self.elapsed_ms()?;
        let row = match capture {
            Capture::Heading => return Some(HEADING.to_string()),
            Capture::Content {
                file,
                offset,
                length,
                text,
                language,
            } => EditRow::content(
                self.next_sequence(),
                elapsed,
                file,
                offset,
                length,
                text,
                language,
            ),
            Capture::Baseline {
                file,
                text,
                language,
            } => EditRow::tab(self.next_sequence(), elapsed, file, text, language),
        };
        Some(encode_row(&row))
    }

    const fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Time since the session started.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let start = self.start_time?;
        let end = self.end_time.unwrap_or_else(|| self.clock.now());
        (end - start).max(TimeDelta::zero()).to_std().ok()
    }

    /// Milliseconds since the session started.
    #[must_use]
    pub fn elapsed_ms(&self) -> Option<u64> {
        self.elapsed()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Check if the session is recording.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active)
    }

    /// Last sequence number handed out.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Session identifier, once begun.
    #[must_use]
    pub const fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    /// Start time, once begun.
    #[must_use]
    pub const fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// End time, once ended normally.
    #[must_use]
    pub const fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Directory the session writes into.
    #[must_use]
    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }
}
