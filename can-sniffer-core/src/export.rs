//! Delimited-text export of the event log
//!
//! Format (one line per retained entry, oldest first):
//!
//! ```text
//! timestamp,identifier,extended,remote,length,payload
//! 1520,0x1A0,0,0,3,01 FF 7C
//! 1533,MARK,0,0,0,Shift FWD
//! ```
//!
//! Annotation text goes into the payload column unmodified, so it may itself
//! contain commas; the parser therefore splits every line into at most six
//! fields.

use crate::types::{
    format_identifier, LogEntry, LogEvent, NormalizedFrame, Payload, Result, SnifferError,
    IDENTIFIER_MASK, MAX_DATA_LEN,
};
use std::io::Write;

/// Header line of every export
pub const CSV_HEADER: &str = "timestamp,identifier,extended,remote,length,payload";

/// Identifier column value marking an annotation line
pub const MARK_SENTINEL: &str = "MARK";

/// One line of an export read back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    pub timestamp_ms: u64,
    pub event: LogEvent,
}

/// Format a single entry as an export line (without line terminator)
pub fn format_entry(entry: &LogEntry) -> String {
    match &entry.event {
        LogEvent::Frame(frame) => format!(
            "{},{},{},{},{},{}",
            entry.timestamp_ms,
            format_identifier(frame.identifier, frame.is_extended),
            frame.is_extended as u8,
            frame.is_remote_request as u8,
            frame.data_length(),
            frame.payload
        ),
        LogEvent::Annotation { text } => {
            format!("{},{},0,0,0,{}", entry.timestamp_ms, MARK_SENTINEL, text)
        }
    }
}

/// Write the header and one line per entry
pub fn write_csv<'a, W, I>(writer: &mut W, entries: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a LogEntry>,
{
    writeln!(writer, "{}", CSV_HEADER)?;
    for entry in entries {
        writeln!(writer, "{}", format_entry(entry))?;
    }
    Ok(())
}

/// Render entries as a complete export document
pub fn to_csv<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    let mut csv = String::with_capacity(64);
    csv.push_str(CSV_HEADER);
    csv.push('\n');
    for entry in entries {
        csv.push_str(&format_entry(entry));
        csv.push('\n');
    }
    csv
}

/// Read an export back
///
/// Blank lines and a leading header line are skipped. Any other malformed line
/// fails the whole parse with its 1-based line number.
pub fn parse_csv(text: &str) -> Result<Vec<ExportRecord>> {
    let mut records = Vec::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim_end_matches('\r');

        if line.trim().is_empty() {
            continue;
        }
        if records.is_empty() && line.starts_with("timestamp,") {
            continue;
        }

        records.push(parse_line(line).map_err(|reason| SnifferError::CsvParse {
            line: line_no,
            reason,
        })?);
    }

    Ok(records)
}

fn parse_line(line: &str) -> std::result::Result<ExportRecord, String> {
    let fields: Vec<&str> = line.splitn(6, ',').collect();
    if fields.len() != 6 {
        return Err(format!("expected 6 fields, found {}", fields.len()));
    }

    let timestamp_ms: u64 = fields[0]
        .trim()
        .parse()
        .map_err(|e| format!("bad timestamp '{}': {}", fields[0], e))?;

    if fields[1].trim() == MARK_SENTINEL {
        return Ok(ExportRecord {
            timestamp_ms,
            event: LogEvent::Annotation {
                text: fields[5].to_string(),
            },
        });
    }

    let identifier = parse_identifier(fields[1].trim())?;
    let is_extended = parse_flag(fields[2], "extended")?;
    let is_remote_request = parse_flag(fields[3], "remote")?;

    let length: usize = fields[4]
        .trim()
        .parse()
        .map_err(|e| format!("bad length '{}': {}", fields[4], e))?;
    if length > MAX_DATA_LEN {
        return Err(format!("length {} exceeds {}", length, MAX_DATA_LEN));
    }

    let bytes = fields[5]
        .split_whitespace()
        .map(|pair| u8::from_str_radix(pair, 16).map_err(|e| format!("bad byte '{}': {}", pair, e)))
        .collect::<std::result::Result<Vec<u8>, String>>()?;
    if bytes.len() != length {
        return Err(format!("length {} but {} payload bytes", length, bytes.len()));
    }

    Ok(ExportRecord {
        timestamp_ms,
        event: LogEvent::Frame(NormalizedFrame {
            timestamp_ms,
            identifier,
            is_extended,
            is_remote_request,
            payload: Payload::from_slice(&bytes),
        }),
    })
}

fn parse_identifier(field: &str) -> std::result::Result<u32, String> {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);
    let identifier =
        u32::from_str_radix(digits, 16).map_err(|e| format!("bad identifier '{}': {}", field, e))?;
    if identifier & !IDENTIFIER_MASK != 0 {
        return Err(format!("identifier '{}' exceeds 29 bits", field));
    }
    Ok(identifier)
}

fn parse_flag(field: &str, name: &str) -> std::result::Result<bool, String> {
    match field.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(format!("bad {} flag '{}'", name, other)),
    }
}
