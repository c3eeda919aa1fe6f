//! Replay of a row log into full-text changes.
//!
//! [`ChangeStream`] reads the log one line at a time and yields each
//! [`Change`] as soon as the following row closes its interval, so memory use
//! is bounded by the size of the documents being edited rather than the
//! length of the session.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use serde::Serialize;

use crate::codec::{HEADING, decode_row};
use crate::error::{LogError, Result};
use crate::row::{EditRow, RowKind};

/// A reconstructed document state and the interval it was visible for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// Position in the replayed sequence, contiguous from 1.
    pub sequence: u64,
    /// Path of the document.
    #[serde(rename = "file")]
    pub file_path: String,
    /// Milliseconds since session start when this state appeared.
    pub start_time: u64,
    /// Milliseconds since session start when the next state replaced it.
    pub end_time: u64,
    /// Language identifier of the document.
    #[serde(rename = "language")]
    pub language_id: String,
    /// Full document text.
    pub text: String,
}

/// What to do when a content row does not fit the running text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Clamp the range into bounds, log a warning, and keep going.
    #[default]
    Clamp,
    /// Stop the replay with [`LogError::ReconstructionFault`].
    Reject,
}

/// Counters collected while replaying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Rows decoded successfully.
    pub rows: usize,
    /// Lines that did not decode, excluding the heading.
    pub skipped_lines: usize,
    /// Rows dropped because they repeated the pending state.
    pub duplicates: usize,
    /// Content rows whose range had to be clamped.
    pub faults: usize,
    /// Changes yielded.
    pub changes: usize,
}

/// Result of splicing text into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    /// The spliced document.
    pub text: String,
    /// Whether the requested range had to be adjusted to fit.
    pub clamped: bool,
}

/// Replace the UTF-16 range `[offset, offset + length)` of `text` with `insert`.
///
/// Ranges past the end are clamped to the end, and a bound that falls inside
/// a surrogate pair is moved to the next character boundary; both set
/// [`Splice::clamped`].
#[must_use]
pub fn splice_utf16(text: &str, offset: u64, length: u64, insert: &str) -> Splice {
    let (start, start_exact) = byte_index(text, offset);
    let (end, end_exact) = byte_index(text, offset.saturating_add(length));

    let mut spliced = String::with_capacity(text.len() - (end - start) + insert.len());
    spliced.push_str(&text[..start]);
    spliced.push_str(insert);
    spliced.push_str(&text[end..]);

    Splice {
        text: spliced,
        clamped: !(start_exact && end_exact),
    }
}

/// Length of `text` in UTF-16 code units.
#[must_use]
pub fn utf16_len(text: &str) -> u64 {
    text.chars().map(|c| c.len_utf16() as u64).sum()
}

fn byte_index(text: &str, units: u64) -> (usize, bool) {
    let mut seen = 0u64;
    for (index, c) in text.char_indices() {
        if seen >= units {
            return (index, seen == units);
        }
        seen += c.len_utf16() as u64;
    }
    (text.len(), seen == units)
}

/// Lazy replay of a row log.
pub struct ChangeStream<R> {
    lines: Lines<R>,
    line: usize,
    duration_ms: u64,
    policy: FaultPolicy,
    previous: Option<Change>,
    buffers: HashMap<String, String>,
    stats: ReplayStats,
    done: bool,
}

impl ChangeStream<BufReader<File>> {
    /// Open the row log at `path`.
    ///
    /// `duration_ms` closes the interval of the last change.
    pub fn open(path: &Path, duration_ms: u64) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            LogError::io_context(format!("opening row log {}", path.display()), e)
        })?;
        Ok(Self::new(BufReader::new(file), duration_ms))
    }
}

impl<R: BufRead> ChangeStream<R> {
    /// Replay rows read from `reader`.
    #[must_use]
    pub fn new(reader: R, duration_ms: u64) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            duration_ms,
            policy: FaultPolicy::default(),
            previous: None,
            buffers: HashMap::new(),
            stats: ReplayStats::default(),
            done: false,
        }
    }

    /// Set the fault policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: FaultPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Counters collected so far.
    #[must_use]
    pub const fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    /// Apply one row; returns the change it closed, if any.
    fn push_row(&mut self, row: EditRow) -> Result<Option<Change>> {
        let EditRow {
            sequence,
            elapsed_ms,
            file_path,
            range_offset,
            range_length,
            text: inserted,
            language_id,
            kind,
        } = row;

        let text = match kind {
            RowKind::Tab => inserted,
            RowKind::Content => {
                self.splice_into(&file_path, sequence, range_offset, range_length, &inserted)?
            }
        };

        if let Some(previous) = &self.previous {
            if previous.start_time == elapsed_ms
                && previous.file_path == file_path
                && previous.language_id == language_id
                && previous.text == text
            {
                self.stats.duplicates += 1;
                tracing::debug!(line = self.line, sequence, "Dropped duplicate document state");
                return Ok(None);
            }
        }

        self.buffers.insert(file_path.clone(), text.clone());

        let next_sequence = self.previous.as_ref().map_or(1, |p| p.sequence + 1);
        let change = Change {
            sequence: next_sequence,
            file_path,
            start_time: elapsed_ms,
            end_time: elapsed_ms,
            language_id,
            text,
        };

        Ok(self.previous.replace(change).map(|mut closed| {
            closed.end_time = elapsed_ms.max(closed.start_time);
            closed
        }))
    }

    fn splice_into(
        &mut self,
        file_path: &str,
        sequence: u64,
        offset: u64,
        length: u64,
        inserted: &str,
    ) -> Result<String> {
        let base = self.buffers.get(file_path).map(String::as_str);
        let splice = splice_utf16(base.unwrap_or(""), offset, length, inserted);

        if base.is_none() || splice.clamped {
            let fault = LogError::ReconstructionFault {
                line: self.line,
                sequence,
                offset,
                length,
                available: base.map_or(0, utf16_len),
            };
            match self.policy {
                FaultPolicy::Reject => return Err(fault),
                FaultPolicy::Clamp => {
                    self.stats.faults += 1;
                    tracing::warn!(
                        file = file_path,
                        has_baseline = base.is_some(),
                        "{fault}; clamped and continuing"
                    );
                }
            }
        }

        Ok(splice.text)
    }

    fn finish(&mut self) -> Option<Change> {
        self.done = true;
        let mut last = self.previous.take()?;
        last.end_time = self.duration_ms.max(last.start_time);
        self.stats.changes += 1;
        Some(last)
    }
}

impl<R: BufRead> Iterator for ChangeStream<R> {
    type Item = Result<Change>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let Some(line) = self.lines.next() else {
                return self.finish().map(Ok);
            };
            self.line += 1;

            let line = match line {
                Ok(line) => line,
                Err(source) => {
                    self.done = true;
                    return Some(Err(LogError::io_context(
                        format!("reading row log line {}", self.line),
                        source,
                    )));
                }
            };

            if self.line == 1 && line.trim_end() == HEADING.trim_end() {
                continue;
            }

            let row = match decode_row(&line) {
                Ok(row) => row,
                Err(reason) => {
                    self.stats.skipped_lines += 1;
                    tracing::debug!(line = self.line, %reason, "Skipping malformed row");
                    continue;
                }
            };
            self.stats.rows += 1;

            match self.push_row(row) {
                Ok(Some(closed)) => {
                    self.stats.changes += 1;
                    return Some(Ok(closed));
                }
                Ok(None) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Replay everything from `reader` into a vector.
pub fn replay<R: BufRead>(reader: R, duration_ms: u64) -> Result<Vec<Change>> {
    ChangeStream::new(reader, duration_ms).collect()
}

/// Largest elapsed time of any decodable row, or `None` for an empty log.
pub fn last_elapsed_ms<R: BufRead>(reader: R) -> Result<Option<u64>> {
    let mut last = None;
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| {
            LogError::io_context(format!("reading row log line {}", index + 1), e)
        })?;
        if let Ok(row) = decode_row(&line) {
            last = Some(last.map_or(row.elapsed_ms, |l: u64| l.max(row.elapsed_ms)));
        }
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_row;
    use proptest::prelude::*;

    fn log(rows: &[EditRow]) -> String {
        let mut out = String::from(HEADING);
        for row in rows {
            out.push_str(&encode_row(row));
        }
        out
    }

    #[test]
    fn splice_inserts_at_end() {
        let splice = splice_utf16("hello", 5, 0, " world");
        assert_eq!(splice.text, "hello world");
        assert!(!splice.clamped);
    }

    #[test]
    fn splice_replaces_range() {
        assert_eq!(splice_utf16("let x = 1;", 4, 1, "y").text, "let y = 1;");
        assert_eq!(splice_utf16("abcdef", 1, 4, "").text, "af");
    }

    #[test]
    fn splice_counts_utf16_units() {
        // The crab is two UTF-16 code units.
        let splice = splice_utf16("a\u{1F980}b", 3, 1, "c");
        assert_eq!(splice.text, "a\u{1F980}c");
        assert!(!splice.clamped);
    }

    #[test]
    fn splice_clamps_out_of_range() {
        let splice = splice_utf16("abc", 10, 4, "!");
        assert_eq!(splice.text, "abc!");
        assert!(splice.clamped);
    }

    #[test]
    fn splice_inside_surrogate_pair_is_clamped() {
        let splice = splice_utf16("\u{1F980}", 1, 0, "x");
        assert_eq!(splice.text, "\u{1F980}x");
        assert!(splice.clamped);
    }

    #[test]
    fn tab_then_content_reconstructs() {
        let rows = [
            EditRow::tab(1, 0, "a.txt", "hello", "plaintext"),
            EditRow::content(2, 100, "a.txt", 5, 0, " world", "plaintext"),
        ];
        let changes = replay(log(&rows).as_bytes(), 400).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].text, "hello world");
        assert_eq!((changes[0].start_time, changes[0].end_time), (0, 100));
        assert_eq!((changes[1].start_time, changes[1].end_time), (100, 400));
    }

    #[test]
    fn identical_state_at_same_time_is_dropped() {
        let rows = [
            EditRow::tab(1, 0, "a.txt", "abc", "plaintext"),
            EditRow::content(2, 0, "a.txt", 0, 0, "", "plaintext"),
        ];
        let text = log(&rows);
        let mut stream = ChangeStream::new(text.as_bytes(), 50);
        let changes: Vec<_> = stream.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].end_time, 50);
        assert_eq!(stream.stats().duplicates, 1);
    }

    #[test]
    fn same_text_at_later_time_is_kept() {
        let rows = [
            EditRow::tab(1, 0, "a.txt", "abc", "plaintext"),
            EditRow::content(2, 10, "a.txt", 0, 0, "", "plaintext"),
        ];
        assert_eq!(replay(log(&rows).as_bytes(), 20).unwrap().len(), 2);
    }

    #[test]
    fn content_without_baseline_is_clamped() {
        let rows = [EditRow::content(1, 5, "a.txt", 3, 2, "xy", "plaintext")];
        let text = log(&rows);
        let mut stream = ChangeStream::new(text.as_bytes(), 10);
        let changes: Vec<_> = stream.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(changes[0].text, "xy");
        assert_eq!(stream.stats().faults, 1);
    }

    #[test]
    fn reject_policy_stops_on_fault() {
        let rows = [
            EditRow::tab(1, 0, "a.txt", "abc", "plaintext"),
            EditRow::content(2, 5, "a.txt", 7, 0, "!", "plaintext"),
        ];
        let text = log(&rows);
        let mut stream = ChangeStream::new(text.as_bytes(), 10).with_policy(FaultPolicy::Reject);
        assert!(matches!(
            stream.next(),
            Some(Err(LogError::ReconstructionFault {
                sequence: 2,
                offset: 7,
                available: 3,
                ..
            }))
        ));
        assert!(stream.next().is_none());
    }

    #[test]
    fn content_rows_follow_their_own_file() {
        let rows = [
            EditRow::tab(1, 0, "a.txt", "aaa", "plaintext"),
            EditRow::tab(2, 10, "b.txt", "bbb", "plaintext"),
            EditRow::content(3, 20, "a.txt", 3, 0, "!", "plaintext"),
        ];
        let changes = replay(log(&rows).as_bytes(), 30).unwrap();
        assert_eq!(changes[2].text, "aaa!");
        assert_eq!(changes[2].file_path, "a.txt");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mut text = log(&[EditRow::tab(1, 0, "a.txt", "x", "plaintext")]);
        text.push_str("garbage,line\n");
        text.push_str("oops,1,\"a.txt\",0,0,\"y\",plaintext,content\n");
        text.push_str(&encode_row(&EditRow::content(2, 40, "a.txt", 1, 0, "z", "plaintext")));

        let mut stream = ChangeStream::new(text.as_bytes(), 100);
        let changes: Vec<_> = stream.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].text, "xz");
        assert_eq!(stream.stats().skipped_lines, 2);
    }

    #[test]
    fn last_interval_never_ends_before_it_starts() {
        let rows = [EditRow::tab(1, 900, "a.txt", "x", "plaintext")];
        let changes = replay(log(&rows).as_bytes(), 500).unwrap();
        assert_eq!((changes[0].start_time, changes[0].end_time), (900, 900));
    }

    #[test]
    fn empty_log_yields_nothing() {
        assert!(replay(HEADING.as_bytes(), 1000).unwrap().is_empty());
        assert!(replay(&b""[..], 1000).unwrap().is_empty());
    }

    #[test]
    fn last_elapsed_scans_rows() {
        let rows = [
            EditRow::tab(1, 0, "a.txt", "x", "plaintext"),
            EditRow::content(2, 1234, "a.txt", 1, 0, "y", "plaintext"),
        ];
        assert_eq!(last_elapsed_ms(log(&rows).as_bytes()).unwrap(), Some(1234));
        assert_eq!(last_elapsed_ms(HEADING.as_bytes()).unwrap(), None);
    }

    proptest! {
        #[test]
        fn splice_matches_utf16_vector_splice(
            text in "[a-z\u{e9}\u{1F980}]{0,12}",
            insert in "[A-Z\u{1F980}]{0,4}",
            offset in 0u64..30,
            length in 0u64..30,
        ) {
            let units: Vec<u16> = text.encode_utf16().collect();
            let splice = splice_utf16(&text, offset, length, &insert);
            if !splice.clamped {
                let start = offset as usize;
                let end = start + length as usize;
                let mut expected = units[..start].to_vec();
                expected.extend(insert.encode_utf16());
                expected.extend_from_slice(&units[end..]);
                prop_assert_eq!(splice.text.encode_utf16().collect::<Vec<_>>(), expected);
            } else {
                prop_assert!(offset.saturating_add(length) > units.len() as u64 || text.contains('🦀'));
            }
        }

        #[test]
        fn sequences_are_contiguous(texts in prop::collection::vec("[a-c]{0,3}", 1..12)) {
            let mut rows = vec![EditRow::tab(1, 0, "f", "", "plaintext")];
            for (i, t) in texts.iter().enumerate() {
                rows.push(EditRow::tab(i as u64 + 2, i as u64 * 10, "f", t.clone(), "plaintext"));
            }
            let changes = replay(log(&rows).as_bytes(), 10_000).unwrap();
            for (i, change) in changes.iter().enumerate() {
                prop_assert_eq!(change.sequence, i as u64 + 1);
                prop_assert!(change.start_time <= change.end_time);
            }
            for pair in changes.windows(2) {
                prop_assert_eq!(pair[0].end_time, pair[1].start_time);
            }
        }
    }
}
