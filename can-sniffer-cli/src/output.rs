//! Terminal rendering and export files
//!
//! Turns sniffer responses into text or JSON lines and writes exports to
//! timestamped capture files.

use anyhow::{Context, Result};
use can_sniffer_core::export::format_entry;
use can_sniffer_core::report::render_identifiers;
use can_sniffer_core::types::format_identifier;
use can_sniffer_core::{Clock, FrameOutcome, LogEntry, LogEvent, Response, Sniffer, Transceiver};
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Renders sniffer output for the terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct Printer {
    pub json: bool,
    pub echo_frames: bool,
}

impl Printer {
    pub fn new(json: bool, echo_frames: bool) -> Self {
        Self { json, echo_frames }
    }

    /// Capture line for a received frame, if echoing is enabled
    pub fn frame(&self, outcome: &FrameOutcome) -> Option<String> {
        if !self.echo_frames {
            return None;
        }
        let FrameOutcome::Received { frame, sequence, .. } = outcome else {
            return None;
        };

        let entry = LogEntry {
            sequence: *sequence,
            timestamp_ms: frame.timestamp_ms,
            event: LogEvent::Frame(*frame),
        };
        if self.json {
            to_json(&entry)
        } else {
            Some(format_entry(&entry))
        }
    }

    /// Render a command response
    pub fn response(&self, response: &Response) -> String {
        if self.json {
            return self.response_json(response);
        }

        match response {
            Response::SpeedChanged(speed) => format!("CAN initialised at {}\nCounts cleared.", speed),
            Response::SpeedUnchanged(speed) => format!("Already at {}", speed),
            Response::SpeedRejected {
                requested,
                active,
                reason,
            } => format!("Failed to set {}: {} (still at {})", requested, reason, active),
            Response::Detection(report) => report.to_string(),
            Response::Cleared => "Counts cleared.".to_string(),
            Response::Annotated(Some(sequence)) => format!("MARK #{} recorded", sequence),
            Response::Annotated(None) => "Empty mark ignored".to_string(),
            Response::Status(status) => status.to_string(),
            Response::Identifiers(stats) => {
                format!("ID Summary:\n{}", render_identifiers(stats).trim_end())
            }
            Response::Events(entries) => render_events(entries),
            Response::Export(csv) => csv.trim_end().to_string(),
        }
    }

    fn response_json(&self, response: &Response) -> String {
        let value = match response {
            Response::SpeedChanged(speed) => json!({ "result": "speed-changed", "speed": speed }),
            Response::SpeedUnchanged(speed) => json!({ "result": "speed-unchanged", "speed": speed }),
            Response::SpeedRejected {
                requested,
                active,
                reason,
            } => json!({
                "result": "speed-rejected",
                "requested": requested,
                "active": active,
                "reason": reason,
            }),
            Response::Detection(report) => json!(report),
            Response::Cleared => json!({ "result": "cleared" }),
            Response::Annotated(sequence) => json!({ "result": "annotated", "sequence": sequence }),
            Response::Status(status) => json!(status),
            Response::Identifiers(stats) => json!(stats),
            Response::Events(entries) => json!(entries),
            Response::Export(csv) => json!({ "csv": csv }),
        };
        value.to_string()
    }
}

fn to_json<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(text) => Some(text),
        Err(e) => {
            log::error!("Failed to serialize output: {}", e);
            None
        }
    }
}

/// One line per entry: frames with ID, DLC and data, marks highlighted
pub fn render_events(entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return "  (log is empty)".to_string();
    }

    entries
        .iter()
        .map(|entry| match &entry.event {
            LogEvent::Frame(frame) => format!(
                "  #{:<6} {:>10}ms  {}  DLC={}  {}",
                entry.sequence,
                entry.timestamp_ms,
                format_identifier(frame.identifier, frame.is_extended),
                frame.data_length(),
                frame.payload
            ),
            LogEvent::Annotation { text } => format!(
                "  #{:<6} {:>10}ms  >>> {}",
                entry.sequence, entry.timestamp_ms, text
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// File name for an export written at `now`
pub fn export_file_name(now: DateTime<Local>) -> String {
    format!("can_capture_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

/// Write the sniffer's export into `dir`, returning the file path
pub fn save_export<T, C>(sniffer: &Sniffer<T, C>, dir: &Path) -> Result<PathBuf>
where
    T: Transceiver,
    C: Clock,
{
    let path = dir.join(export_file_name(Local::now()));
    write_export(sniffer, &path)?;
    Ok(path)
}

/// Write the sniffer's export to `path`
pub fn write_export<T, C>(sniffer: &Sniffer<T, C>, path: &Path) -> Result<()>
where
    T: Transceiver,
    C: Clock,
{
    let file = File::create(path).with_context(|| format!("Failed to create export file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    sniffer
        .write_export(&mut writer)
        .with_context(|| format!("Failed to write export file: {:?}", path))?;
    writer.flush()?;

    log::info!("Exported {} log entries to {:?}", sniffer.event_log().len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_sniffer_core::{
        parse_csv, BusSpeed, ManualClock, NormalizedFrame, Payload, RawFrame, SnifferConfig,
    };
    use chrono::TimeZone;

    struct OneFrame(Option<RawFrame>);

    impl Transceiver for OneFrame {
        fn configure(&mut self, _speed: BusSpeed) -> can_sniffer_core::Result<()> {
            Ok(())
        }

        fn try_receive(&mut self) -> Option<can_sniffer_core::Result<RawFrame>> {
            self.0.take().map(Ok)
        }
    }

    fn entry(sequence: u64, event: LogEvent) -> LogEntry {
        LogEntry {
            sequence,
            timestamp_ms: 1520,
            event,
        }
    }

    #[test]
    fn test_render_events() {
        let frame = NormalizedFrame {
            timestamp_ms: 1520,
            identifier: 0x1A0,
            is_extended: false,
            is_remote_request: false,
            payload: Payload::from_slice(&[0x01, 0xFF]),
        };
        let entries = vec![
            entry(7, LogEvent::Frame(frame)),
            entry(8, LogEvent::Annotation { text: "Key ON".to_string() }),
        ];

        let text = render_events(&entries);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "  #7            1520ms  0x1A0  DLC=2  01 FF");
        assert_eq!(lines[1], "  #8            1520ms  >>> Key ON");
        assert_eq!(render_events(&[]), "  (log is empty)");
    }

    #[test]
    fn test_json_responses() {
        let printer = Printer::new(true, false);
        let text = printer.response(&Response::Annotated(Some(3)));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["result"], "annotated");
        assert_eq!(value["sequence"], 3);

        let text = printer.response(&Response::SpeedChanged(BusSpeed::Kbps500));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["speed"], "500k");
    }

    #[test]
    fn test_text_responses() {
        let printer = Printer::default();
        assert_eq!(printer.response(&Response::Cleared), "Counts cleared.");
        assert_eq!(printer.response(&Response::Annotated(None)), "Empty mark ignored");
    }

    #[test]
    fn test_frame_echo_only_when_enabled() {
        let outcome = FrameOutcome::Received {
            frame: NormalizedFrame {
                timestamp_ms: 0,
                identifier: 0x10,
                is_extended: false,
                is_remote_request: false,
                payload: Payload::default(),
            },
            sequence: 1,
            table: can_sniffer_core::ObserveOutcome::Inserted,
        };

        assert!(Printer::new(false, false).frame(&outcome).is_none());
        assert_eq!(
            Printer::new(false, true).frame(&outcome).as_deref(),
            Some("0,0x010,0,0,0,")
        );
        assert!(Printer::new(true, true).frame(&outcome).unwrap().contains("\"sequence\":1"));
        assert!(Printer::new(false, true).frame(&FrameOutcome::ReadError).is_none());
    }

    #[test]
    fn test_export_file_name() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(export_file_name(now), "can_capture_20240309_140507.csv");
    }

    #[test]
    fn test_save_export_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let transceiver = OneFrame(Some(RawFrame::new(0x321, false, false, &[9, 8, 7])));
        let mut sniffer = Sniffer::new(SnifferConfig::default(), transceiver, ManualClock::new(0)).unwrap();
        sniffer.step(None);
        sniffer.annotate("Engine START");

        let path = save_export(&sniffer, dir.path()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let records = parse_csv(&text).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(text, sniffer.export_csv());
    }
}
