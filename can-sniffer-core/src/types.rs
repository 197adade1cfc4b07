//! Core types for the CAN sniffer
//!
//! This module defines the values that flow through the capture core: raw frames
//! as delivered by the transceiver, normalized frames, bus speeds, log entries and
//! the error type shared by every operation.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Result type for sniffer operations
pub type Result<T> = std::result::Result<T, SnifferError>;

/// Bit 31 of the raw identifier field: frame uses a 29-bit identifier
pub const EXTENDED_FLAG: u32 = 0x8000_0000;

/// Bit 30 of the raw identifier field: remote transmission request
pub const REMOTE_FLAG: u32 = 0x4000_0000;

/// Bits 0-28 of the raw identifier field carry the bus address
pub const IDENTIFIER_MASK: u32 = 0x1FFF_FFFF;

/// Maximum payload length of a classic CAN frame
pub const MAX_DATA_LEN: usize = 8;

/// Maximum visible characters kept from an annotation
pub const ANNOTATION_WIDTH: usize = 39;

/// Errors that can occur inside the sniffer core
#[derive(Debug, thiserror::Error)]
pub enum SnifferError {
    #[error("Transceiver rejected {speed}: {reason}")]
    PeripheralConfig { speed: BusSpeed, reason: String },

    #[error("Failed to read frame: {0}")]
    FrameDecode(String),

    #[error("Invalid capture line {line}: {reason}")]
    CsvParse { line: usize, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Bus bit rates the transceiver can be configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusSpeed {
    #[serde(rename = "125k")]
    Kbps125,
    #[serde(rename = "250k")]
    Kbps250,
    #[serde(rename = "500k")]
    Kbps500,
    #[serde(rename = "1m")]
    Mbps1,
}

impl BusSpeed {
    /// Every supported speed, in ascending order
    pub const ALL: [BusSpeed; 4] = [
        BusSpeed::Kbps125,
        BusSpeed::Kbps250,
        BusSpeed::Kbps500,
        BusSpeed::Mbps1,
    ];

    /// Human readable label, e.g. "250 kbps"
    pub fn label(&self) -> &'static str {
        match self {
            BusSpeed::Kbps125 => "125 kbps",
            BusSpeed::Kbps250 => "250 kbps",
            BusSpeed::Kbps500 => "500 kbps",
            BusSpeed::Mbps1 => "1 Mbps",
        }
    }

    /// Nominal bit rate in bits per second
    pub fn bits_per_second(&self) -> u32 {
        match self {
            BusSpeed::Kbps125 => 125_000,
            BusSpeed::Kbps250 => 250_000,
            BusSpeed::Kbps500 => 500_000,
            BusSpeed::Mbps1 => 1_000_000,
        }
    }

    /// Map the numeric menu selector (1-4) to a speed
    pub fn from_selector(selector: char) -> Option<BusSpeed> {
        match selector {
            '1' => Some(BusSpeed::Kbps125),
            '2' => Some(BusSpeed::Kbps250),
            '3' => Some(BusSpeed::Kbps500),
            '4' => Some(BusSpeed::Mbps1),
            _ => None,
        }
    }
}

impl fmt::Display for BusSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for BusSpeed {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        let normalized = normalized.trim_end_matches("bps").trim_end_matches("bit/s");

        match normalized {
            "1" | "125k" | "125" | "125000" => Ok(BusSpeed::Kbps125),
            "2" | "250k" | "250" | "250000" => Ok(BusSpeed::Kbps250),
            "3" | "500k" | "500" | "500000" => Ok(BusSpeed::Kbps500),
            "4" | "1m" | "1000k" | "1000" | "1000000" => Ok(BusSpeed::Mbps1),
            _ => Err(format!("Unknown bus speed: {}", s)),
        }
    }
}

/// A frame exactly as read from the transceiver
///
/// The identifier field carries the extended flag in bit 31 and the remote
/// request flag in bit 30 above the 29-bit address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    /// Identifier field with flag bits
    pub identifier_field: u32,
    /// Reported data length, may exceed 8 on a misbehaving source
    pub data_length: u8,
    /// Receive buffer
    pub data: [u8; MAX_DATA_LEN],
}

impl RawFrame {
    /// Build a raw frame from its parts, setting the flag bits as the transceiver would
    pub fn new(identifier: u32, is_extended: bool, is_remote_request: bool, data: &[u8]) -> Self {
        let mut identifier_field = identifier & IDENTIFIER_MASK;
        if is_extended {
            identifier_field |= EXTENDED_FLAG;
        }
        if is_remote_request {
            identifier_field |= REMOTE_FLAG;
        }

        let mut buffer = [0u8; MAX_DATA_LEN];
        let len = data.len().min(MAX_DATA_LEN);
        buffer[..len].copy_from_slice(&data[..len]);

        Self {
            identifier_field,
            data_length: data.len().min(u8::MAX as usize) as u8,
            data: buffer,
        }
    }
}

/// Up to eight payload bytes together with their length
///
/// Bytes beyond the length are always zero and never exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Payload {
    len: u8,
    bytes: [u8; MAX_DATA_LEN],
}

impl Payload {
    /// Copy at most 8 bytes from `data`
    pub fn from_slice(data: &[u8]) -> Self {
        let len = data.len().min(MAX_DATA_LEN);
        let mut bytes = [0u8; MAX_DATA_LEN];
        bytes[..len].copy_from_slice(&data[..len]);
        Self {
            len: len as u8,
            bytes,
        }
    }

    /// Number of meaningful bytes (0-8)
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The meaningful bytes only
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }
}

impl fmt::Display for Payload {
    /// Space separated uppercase hex pairs, e.g. "01 A2 FF"
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.as_slice().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Canonical record of a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NormalizedFrame {
    /// Milliseconds since the session started
    pub timestamp_ms: u64,
    /// 29-bit bus address with the flag bits stripped
    pub identifier: u32,
    /// True if this is an extended (29-bit) CAN ID
    pub is_extended: bool,
    /// True if this is a remote frame
    pub is_remote_request: bool,
    /// Data bytes, length 0-8
    pub payload: Payload,
}

impl NormalizedFrame {
    /// Get the data length code (DLC) - number of data bytes
    pub fn data_length(&self) -> usize {
        self.payload.len()
    }
}

/// Render an identifier the way captures show it: 3 hex digits for standard
/// frames, 8 for extended frames.
pub fn format_identifier(identifier: u32, is_extended: bool) -> String {
    if is_extended {
        format!("0x{:08X}", identifier)
    } else {
        format!("0x{:03X}", identifier)
    }
}

/// What a log entry records
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LogEvent {
    /// A frame received from the bus
    Frame(NormalizedFrame),
    /// A free-text note inserted by the operator
    Annotation { text: String },
}

/// One slot of the event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Strictly increasing, starts at 1, never reused
    pub sequence: u64,
    /// Milliseconds since the session started
    pub timestamp_ms: u64,
    /// Recorded event
    pub event: LogEvent,
}

impl LogEntry {
    /// The frame carried by this entry, if any
    pub fn frame(&self) -> Option<&NormalizedFrame> {
        match &self.event {
            LogEvent::Frame(frame) => Some(frame),
            LogEvent::Annotation { .. } => None,
        }
    }

    /// The annotation text carried by this entry, if any
    pub fn annotation(&self) -> Option<&str> {
        match &self.event {
            LogEvent::Frame(_) => None,
            LogEvent::Annotation { text } => Some(text),
        }
    }
}
