//! CAN Sniffer Core Library
//!
//! The capture-and-analysis core of a passive, receive-only CAN bus sniffer.
//! It ingests frames from an external transceiver, counts them per identifier,
//! keeps a bounded chronological history with inline operator annotations, and
//! can empirically determine the bus speed when it is unknown.
//!
//! # Architecture
//!
//! - [`normalizer`] turns raw receive fields into a [`NormalizedFrame`]
//! - [`IdentifierTable`] keeps bounded per-identifier counts and last payloads
//! - [`EventLog`] keeps a bounded circular history with global sequence numbers
//! - [`SpeedDetector`] samples candidate speeds and scores what it hears
//! - [`Sniffer`] owns all of the above and is what front ends talk to
//!
//! The library does NOT:
//! - Talk to hardware (that is a [`Transceiver`] implementation's job)
//! - Decode payloads into signals
//! - Persist anything
//! - Transmit on the bus
//!
//! # Example Usage
//!
//! ```no_run
//! use can_sniffer_core::{BusSpeed, Command, Response, Sniffer, SnifferConfig, Transceiver};
//!
//! fn capture<T: Transceiver>(transceiver: T) -> can_sniffer_core::Result<()> {
//!     let config = SnifferConfig::new().with_initial_speed(BusSpeed::Kbps500);
//!     let mut sniffer = Sniffer::with_monotonic_clock(config, transceiver)?;
//!
//!     for _ in 0..10_000 {
//!         sniffer.step(None);
//!     }
//!
//!     sniffer.annotate("Shift FWD");
//!     if let Response::Status(status) = sniffer.execute(Command::Status) {
//!         println!("{}", status);
//!     }
//!     print!("{}", sniffer.export_csv());
//!     Ok(())
//! }
//! ```

// Public modules
pub mod clock;
pub mod config;
pub mod detector;
pub mod event_log;
pub mod export;
pub mod id_table;
pub mod normalizer;
pub mod report;
pub mod sniffer;
pub mod transceiver;
pub mod types;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::SnifferConfig;
pub use detector::{DetectionReport, ScanResult, SpeedDetector, Verdict};
pub use event_log::EventLog;
pub use export::{parse_csv, ExportRecord, CSV_HEADER};
pub use id_table::{IdentifierStat, IdentifierTable, ObserveOutcome};
pub use normalizer::normalize;
pub use report::StatusReport;
pub use sniffer::{Command, FrameOutcome, Response, SessionCounters, Sniffer, StepOutcome};
pub use transceiver::Transceiver;
pub use types::{
    BusSpeed, LogEntry, LogEvent, NormalizedFrame, Payload, RawFrame, Result, SnifferError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
