//! Error types for the edit-log crate.
//!
//! [`LogError`] covers everything that can go wrong while writing, replaying,
//! or exporting a row log. [`MalformedRow`] is the decode failure for a single
//! line; replay skips such lines instead of propagating them.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The error type for row log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// An I/O error occurred with additional context.
    #[error("{context}: {source}")]
    Io {
        /// What operation was being performed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A queued write failed. The task stays at the head of the queue.
    #[error("failed to append to {}: {source}", path.display())]
    WriteFailure {
        /// The target file of the failed write.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A content row's range does not fit the running text buffer.
    #[error(
        "line {line}: row {sequence} splices [{offset}, {offset}+{length}) but only {available} code units are available"
    )]
    ReconstructionFault {
        /// Physical line number in the row log.
        line: usize,
        /// Sequence number of the offending row.
        sequence: u64,
        /// Requested range offset.
        offset: u64,
        /// Requested range length.
        length: u64,
        /// UTF-16 length of the text being spliced (0 when there is no baseline).
        available: u64,
    },

    /// Serializing an export payload failed.
    #[error("failed to serialize export payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type alias for edit-log operations.
pub type Result<T> = std::result::Result<T, LogError>;

impl LogError {
    /// Create an I/O error with context.
    pub fn io_context(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a write failure for the given target.
    pub fn write_failure(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::WriteFailure {
            path: path.into(),
            source,
        }
    }

    /// Check if this is a write failure.
    #[must_use]
    pub const fn is_write_failure(&self) -> bool {
        matches!(self, Self::WriteFailure { .. })
    }
}

/// A row log line that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRow {
    /// The line does not split into the fixed column count.
    #[error("expected {expected} fields, found {found}")]
    FieldCount {
        /// The fixed column count.
        expected: usize,
        /// The number of fields found.
        found: usize,
    },

    /// A numeric column does not parse as an integer.
    #[error("field '{field}' is not an integer: {value:?}")]
    NotAnInteger {
        /// The column name.
        field: &'static str,
        /// The raw field value.
        value: String,
    },

    /// The kind column is not a known row kind.
    #[error("unknown row kind: {0:?}")]
    UnknownKind(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_failure_display_includes_path() {
        let err = LogError::write_failure(
            "/tmp/rec/session.csv",
            io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/rec/session.csv"));
        assert!(msg.contains("access denied"));
        assert!(err.is_write_failure());
    }

    #[test]
    fn io_context_display() {
        let err = LogError::io_context(
            "opening row log",
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(err.to_string(), "opening row log: no such file");
        assert!(!err.is_write_failure());
    }

    #[test]
    fn reconstruction_fault_display() {
        let err = LogError::ReconstructionFault {
            line: 4,
            sequence: 3,
            offset: 10,
            length: 2,
            available: 5,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("line 4: row 3"));
        assert!(msg.contains("only 5 code units"));
    }

    #[test]
    fn malformed_row_display() {
        let err = MalformedRow::NotAnInteger {
            field: "sequence",
            value: "Sequence".to_string(),
        };
        assert!(err.to_string().contains("sequence"));
    }
}
