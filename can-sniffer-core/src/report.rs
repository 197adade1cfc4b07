//! Status and detection reports
//!
//! Plain-text renderings for terminal front ends. Every report type also
//! implements `Serialize` for front ends that want structured output.

use crate::detector::{DetectionReport, LIKELY_MAX_IDENTIFIERS};
use crate::id_table::IdentifierStat;
use crate::types::{format_identifier, BusSpeed};
use serde::Serialize;
use std::fmt::{self, Write};

/// Session status summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Milliseconds since the session started
    pub uptime_ms: u64,
    /// Currently configured bus speed
    pub speed: BusSpeed,
    pub total_messages: u64,
    pub total_errors: u64,
    pub distinct_identifiers: usize,
    /// Entries currently retained by the event log
    pub log_entries: usize,
    /// Highest sequence number issued by the event log
    pub last_sequence: u64,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========== STATUS ==========")?;
        writeln!(f, "Uptime: {} ms", self.uptime_ms)?;
        writeln!(f, "Baud rate: {}", self.speed)?;
        writeln!(f, "Messages received: {}", self.total_messages)?;
        writeln!(f, "Errors: {}", self.total_errors)?;
        writeln!(f, "Unique CAN IDs seen: {}", self.distinct_identifiers)?;
        writeln!(f, "Log entries: {} (last seq {})", self.log_entries, self.last_sequence)?;
        write!(f, "============================")
    }
}

/// One line per identifier, in table order: `0x100: 52 messages  [01 02 03]`
pub fn render_identifiers(stats: &[IdentifierStat]) -> String {
    let mut out = String::new();
    if stats.is_empty() {
        out.push_str("  (no identifiers seen)\n");
        return out;
    }

    for stat in stats {
        // Writing to a String cannot fail
        let _ = writeln!(
            out,
            "  {}: {} messages  [{}]",
            format_identifier(stat.identifier, stat.is_extended),
            stat.occurrence_count,
            stat.last_payload
        );
    }
    out
}

impl fmt::Display for DetectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========== AUTO-SCAN ==========")?;
        for result in &self.results {
            writeln!(
                f,
                "  {}: {} msgs, {} unique IDs, {:.1} repeat rate, {:.0}% errors  {}",
                result.candidate,
                result.message_count,
                result.distinct_identifier_count,
                result.repeat_rate,
                result.error_rate,
                result.verdict
            )?;

            if result.distinct_identifier_count > 0
                && result.distinct_identifier_count <= LIKELY_MAX_IDENTIFIERS
            {
                write!(f, "    IDs:")?;
                for stat in &result.identifiers {
                    write!(
                        f,
                        " {}({})",
                        format_identifier(stat.identifier, stat.is_extended),
                        stat.occurrence_count
                    )?;
                }
                writeln!(f)?;
            }
        }

        writeln!(f)?;
        match self.selected {
            Some(speed) => writeln!(f, "Best match: {}", speed)?,
            None => writeln!(f, "No valid traffic detected at any rate.")?,
        }
        write!(f, "===============================")
    }
}
