//! CSV row codec.
//!
//! One edit event is one physical line. The path and text columns are always
//! quoted; newlines, carriage returns, tabs and backslashes inside a quoted
//! field are written as two-character escapes so a row never spans lines, and
//! quotes are doubled.

use crate::error::MalformedRow;
use crate::row::{EditRow, RowKind};

/// The column header written as the first line of every row log.
pub const HEADING: &str = "Sequence,Time,File,RangeOffset,RangeLength,Text,Language,Type\n";

/// Field delimiter.
pub const DELIMITER: char = ',';

/// Number of columns in a row.
pub const FIELD_COUNT: usize = 8;

/// Encode a row as a single newline-terminated line.
#[must_use]
pub fn encode_row(row: &EditRow) -> String {
    let language = if needs_quoting(&row.language_id) {
        quote(&row.language_id)
    } else {
        row.language_id.clone()
    };

    format!(
        "{},{},{},{},{},{},{},{}\n",
        row.sequence,
        row.elapsed_ms,
        quote(&row.file_path),
        row.range_offset,
        row.range_length,
        quote(&row.text),
        language,
        row.kind,
    )
}

/// Decode a single line back into a row.
///
/// The header line fails with [`MalformedRow::NotAnInteger`] on its first
/// column, which is how replay recognizes and skips it.
pub fn decode_row(line: &str) -> Result<EditRow, MalformedRow> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    let fields = split_fields(line);
    if fields.len() != FIELD_COUNT {
        return Err(MalformedRow::FieldCount {
            expected: FIELD_COUNT,
            found: fields.len(),
        });
    }

    let sequence = parse_int("sequence", fields[0])?;
    let elapsed_ms = parse_int("time", fields[1])?;
    let file_path = field_value(fields[2]);
    let range_offset = parse_int("range_offset", fields[3])?;
    let range_length = parse_int("range_length", fields[4])?;
    let text = field_value(fields[5]);
    let language_id = field_value(fields[6]);
    let kind: RowKind = fields[7].trim().parse()?;

    Ok(EditRow {
        sequence,
        elapsed_ms,
        file_path,
        range_offset,
        range_length,
        text,
        language_id,
        kind,
    })
}

/// Escape a field value for use inside a quoted column.
#[must_use]
pub fn escape_field(value: &str) -> String {
    let mut result = String::with_capacity(value.len() + 8);
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                result.push_str("\\r\\n");
            }
            '\r' => result.push_str("\\r"),
            '\n' => result.push_str("\\n"),
            '\t' => result.push_str("\\t"),
            '"' => result.push_str("\"\""),
            c => result.push(c),
        }
    }
    result
}

/// Invert [`escape_field`].
///
/// Unknown backslash sequences are kept verbatim so logs written by older
/// encoders that did not escape backslashes still decode.
#[must_use]
pub fn unescape_field(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if chars.peek() == Some(&'"') => {
                chars.next();
                result.push('"');
            }
            '\\' => match chars.next() {
                Some('\\') => result.push('\\'),
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            },
            c => result.push(c),
        }
    }
    result
}

/// Split a line on delimiters that are not inside a quoted span.
#[must_use]
pub fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::with_capacity(FIELD_COUNT);
    let mut in_quotes = false;
    let mut start = 0;

    for (i, b) in line.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b',' if !in_quotes => {
                fields.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&line[start..]);
    fields
}

fn quote(value: &str) -> String {
    format!("\"{}\"", escape_field(value))
}

fn needs_quoting(value: &str) -> bool {
    value
        .chars()
        .any(|c| matches!(c, ',' | '"' | '\\' | '\n' | '\r' | '\t'))
}

fn field_value(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        unescape_field(&raw[1..raw.len() - 1])
    } else {
        raw.to_string()
    }
}

fn parse_int(field: &'static str, raw: &str) -> Result<u64, MalformedRow> {
    raw.trim()
        .parse()
        .map_err(|_| MalformedRow::NotAnInteger {
            field,
            value: raw.to_string(),
        })
}
