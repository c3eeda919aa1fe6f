//! Error types for the recorder.

use std::io;

use edit_log::LogError;
use thiserror::Error;

use crate::notify::Severity;

/// The error type for recorder operations.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// An edit arrived while no session was recording.
    #[error("no active recording to receive edits")]
    NoActiveContext,

    /// No usable destination directory for the session files.
    #[error("no destination for recordings: {reason}")]
    NoDestination {
        /// Why the destination could not be used.
        reason: String,
    },

    /// A session is already recording.
    #[error("a recording is already in progress")]
    AlreadyActive,

    /// No session is recording.
    #[error("no recording in progress")]
    NotActive,

    /// Writing, replaying, or exporting the row log failed.
    #[error(transparent)]
    Log(#[from] LogError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// An I/O error occurred with additional context.
    #[error("{context}: {source}")]
    Io {
        /// What operation was being performed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Result type alias for recorder operations.
pub type Result<T> = std::result::Result<T, RecorderError>;

impl RecorderError {
    /// Create a missing destination error.
    pub fn no_destination(reason: impl Into<String>) -> Self {
        Self::NoDestination {
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io_context(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// How a host should surface this error.
    ///
    /// Lifecycle misuse is informational; everything else is an error.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::NoActiveContext | Self::AlreadyActive | Self::NotActive => Severity::Info,
            _ => Severity::Error,
        }
    }

    /// Check if this is a failed queued write.
    #[must_use]
    pub const fn is_write_failure(&self) -> bool {
        matches!(self, Self::Log(err) if err.is_write_failure())
    }
}
