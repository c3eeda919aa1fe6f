//! Edit row definitions.

use std::fmt;
use std::str::FromStr;

use crate::error::MalformedRow;

/// Kinds of rows in a row log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKind {
    /// Incremental splice against the previous text of the same file.
    Content,
    /// Full-document baseline snapshot.
    Tab,
}

impl RowKind {
    /// Get the kind as it appears in the `Type` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Tab => "tab",
        }
    }
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RowKind {
    type Err = MalformedRow;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("content") {
            Ok(Self::Content)
        } else if s.eq_ignore_ascii_case("tab") {
            Ok(Self::Tab)
        } else {
            Err(MalformedRow::UnknownKind(s.to_string()))
        }
    }
}

/// One logged edit event.
///
/// Offsets are UTF-16 code units into the previous full text of `file_path`,
/// which is what editors built on UTF-16 strings report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRow {
    /// Per-session sequence number, contiguous from 1.
    pub sequence: u64,
    /// Milliseconds since session start.
    pub elapsed_ms: u64,
    /// Path of the edited document, relative to the workspace.
    pub file_path: String,
    /// Start of the replaced range.
    pub range_offset: u64,
    /// Length of the replaced range.
    pub range_length: u64,
    /// Inserted text, or the whole document for a tab row.
    pub text: String,
    /// Language identifier of the document.
    pub language_id: String,
    /// Row kind.
    pub kind: RowKind,
}

impl EditRow {
    /// Create an incremental content row.
    #[must_use]
    pub fn content(
        sequence: u64,
        elapsed_ms: u64,
        file_path: impl Into<String>,
        range_offset: u64,
        range_length: u64,
        text: impl Into<String>,
        language_id: impl Into<String>,
    ) -> Self {
        Self {
            sequence,
            elapsed_ms,
            file_path: file_path.into(),
            range_offset,
            range_length,
            text: text.into(),
            language_id: language_id.into(),
            kind: RowKind::Content,
        }
    }

    /// Create a full-document baseline row.
    #[must_use]
    pub fn tab(
        sequence: u64,
        elapsed_ms: u64,
        file_path: impl Into<String>,
        text: impl Into<String>,
        language_id: impl Into<String>,
    ) -> Self {
        Self {
            sequence,
            elapsed_ms,
            file_path: file_path.into(),
            range_offset: 0,
            range_length: 0,
            text: text.into(),
            language_id: language_id.into(),
            kind: RowKind::Tab,
        }
    }

    /// Check if this row is a baseline snapshot.
    #[must_use]
    pub const fn is_baseline(&self) -> bool {
        matches!(self.kind, RowKind::Tab)
    }
}
