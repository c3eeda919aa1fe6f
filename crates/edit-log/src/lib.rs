//! edit-log: append-only edit log codec and replay engine
//!
//! A recording session is persisted as a CSV row log: one line per edit
//! event, either an incremental splice (`content`) or a full-document
//! baseline (`tab`). This crate writes those rows through an ordered
//! [`WriteQueue`], replays a finished log into timed full-text [`Change`]s,
//! and renders the changes as SRT subtitles or a JSON document.
//!
//! # Example
//!
//! ```
//! use edit_log::{EditRow, HEADING, encode_row, replay};
//!
//! let mut log = String::from(HEADING);
//! log.push_str(&encode_row(&EditRow::tab(1, 0, "main.rs", "fn main() {}", "rust")));
//! log.push_str(&encode_row(&EditRow::content(2, 800, "main.rs", 11, 0, "\n", "rust")));
//!
//! let changes = replay(log.as_bytes(), 2000).unwrap();
//! assert_eq!(changes.len(), 2);
//! assert_eq!(changes[1].text, "fn main() {\n}");
//! assert_eq!(changes[1].end_time, 2000);
//! ```

pub mod codec;
pub mod error;
pub mod export;
pub mod queue;
pub mod replay;
pub mod row;

pub use codec::{HEADING, decode_row, encode_row};
pub use error::{LogError, MalformedRow, Result};
pub use export::{
    ExportFormat, ExportOptions, ExportSummary, export_changes, export_log, format_srt_time,
    json_document, srt_block,
};
pub use queue::{FileKind, FileSink, LogSink, WriteQueue, WriteTask};
pub use replay::{
    Change, ChangeStream, FaultPolicy, ReplayStats, Splice, last_elapsed_ms, replay, splice_utf16,
    utf16_len,
};
pub use row::{EditRow, RowKind};
