//! The capture session
//!
//! [`Sniffer`] owns everything that changes while capturing: the identifier
//! table, the event log, the session counters and the transceiver. It is driven
//! one [`Sniffer::step`] at a time. A step handles at most one waiting frame,
//! then at most one command, then the periodic status check, and returns.
//!
//! All mutation goes through `&mut self`, so a front end that wants to issue
//! commands from another thread has to hand them over (for instance through a
//! channel) or wrap the sniffer in a single mutex. The table capacity and the
//! sequence numbering both assume one writer.

use crate::clock::{Clock, MonotonicClock};
use crate::config::SnifferConfig;
use crate::detector::{DetectionReport, SpeedDetector};
use crate::event_log::EventLog;
use crate::export;
use crate::id_table::{IdentifierStat, IdentifierTable, ObserveOutcome};
use crate::normalizer::normalize_raw;
use crate::report::StatusReport;
use crate::transceiver::Transceiver;
use crate::types::{BusSpeed, LogEntry, NormalizedFrame, RawFrame, Result};
use std::io::Write;

/// Receive errors are logged once per this many
const ERROR_LOG_INTERVAL: u64 = 100;

/// Session-wide counters, reset by [`Sniffer::clear_all`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionCounters {
    /// Frames received, including ones the identifier table could not track
    pub total_messages: u64,
    /// Frames that could not be read
    pub total_errors: u64,
    /// Clock reading at session start
    pub session_start_ms: u64,
}

/// Requests a front end can make
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Switch to a bus speed (clears statistics when the speed changes)
    SetSpeed(BusSpeed),
    /// Run speed detection over the configured candidates
    RunDetection,
    /// Clear the identifier table, event log and counters
    Clear,
    /// Add an annotation to the event log
    Annotate(String),
    /// Session status
    Status,
    /// Identifier table snapshot
    Identifiers,
    /// Most recent log entries (configured default when `None`)
    Recent(Option<usize>),
    /// Log entries newer than the given sequence number
    Since(u64),
    /// Full export of the event log
    Export,
}

/// Answer to a [`Command`]
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    SpeedChanged(BusSpeed),
    /// Requested speed was already active
    SpeedUnchanged(BusSpeed),
    /// Transceiver refused the speed; `active` is still in effect
    SpeedRejected {
        requested: BusSpeed,
        active: BusSpeed,
        reason: String,
    },
    Detection(DetectionReport),
    Cleared,
    /// Sequence number of the new entry, `None` for blank text
    Annotated(Option<u64>),
    Status(StatusReport),
    Identifiers(Vec<IdentifierStat>),
    Events(Vec<LogEntry>),
    Export(String),
}

/// What happened to the frame polled during a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Received {
        frame: NormalizedFrame,
        sequence: u64,
        table: ObserveOutcome,
    },
    ReadError,
}

/// Everything a single step produced
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepOutcome {
    pub frame: Option<FrameOutcome>,
    pub response: Option<Response>,
    /// Unsolicited status emitted by the idle check
    pub status: Option<StatusReport>,
}

/// A capture session over one transceiver
pub struct Sniffer<T, C = MonotonicClock> {
    config: SnifferConfig,
    transceiver: T,
    clock: C,
    speed: BusSpeed,
    ids: IdentifierTable,
    log: EventLog,
    counters: SessionCounters,
    last_status_ms: u64,
}

impl<T: Transceiver> Sniffer<T, MonotonicClock> {
    /// Start a session using the system's monotonic clock
    pub fn with_monotonic_clock(config: SnifferConfig, transceiver: T) -> Result<Self> {
        Self::new(config, transceiver, MonotonicClock::new())
    }
}

impl<T: Transceiver, C: Clock> Sniffer<T, C> {
    /// Start a session
    ///
    /// Configures the transceiver for `config.initial_speed`; fails if it refuses.
    pub fn new(config: SnifferConfig, mut transceiver: T, clock: C) -> Result<Self> {
        transceiver.configure(config.initial_speed)?;
        log::info!("CAN initialised at {}", config.initial_speed);

        let now = clock.now_ms();
        Ok(Self {
            speed: config.initial_speed,
            ids: IdentifierTable::with_capacity(config.max_identifiers),
            log: EventLog::with_capacity(config.log_capacity),
            counters: SessionCounters {
                session_start_ms: now,
                ..SessionCounters::default()
            },
            last_status_ms: now,
            config,
            transceiver,
            clock,
        })
    }

    /// Run one scheduling step
    pub fn step(&mut self, command: Option<Command>) -> StepOutcome {
        let frame = self.poll_frame();
        let response = command.map(|command| self.execute(command));
        let status = self.maintenance();

        StepOutcome {
            frame,
            response,
            status,
        }
    }

    /// Read at most one waiting frame
    pub fn poll_frame(&mut self) -> Option<FrameOutcome> {
        match self.transceiver.try_receive()? {
            Ok(raw) => Some(self.record_frame(&raw)),
            Err(e) => {
                self.counters.total_errors = self.counters.total_errors.saturating_add(1);
                if self.counters.total_errors % ERROR_LOG_INTERVAL == 1 {
                    log::warn!(
                        "CAN read error: {} (total errors: {})",
                        e,
                        self.counters.total_errors
                    );
                }
                Some(FrameOutcome::ReadError)
            }
        }
    }

    fn record_frame(&mut self, raw: &RawFrame) -> FrameOutcome {
        let frame = normalize_raw(self.elapsed_ms(), raw);

        self.counters.total_messages = self.counters.total_messages.saturating_add(1);
        let table = self.ids.observe(&frame);
        let sequence = self.log.append_frame(frame);
        log::trace!("Frame 0x{:X} recorded as #{}", frame.identifier, sequence);

        FrameOutcome::Received {
            frame,
            sequence,
            table,
        }
    }

    /// Apply a command
    pub fn execute(&mut self, command: Command) -> Response {
        log::debug!("Command: {:?}", command);

        match command {
            Command::SetSpeed(speed) => match self.set_speed(speed) {
                Ok(true) => Response::SpeedChanged(speed),
                Ok(false) => Response::SpeedUnchanged(speed),
                Err(e) => Response::SpeedRejected {
                    requested: speed,
                    active: self.speed,
                    reason: e.to_string(),
                },
            },
            Command::RunDetection => Response::Detection(self.run_detection()),
            Command::Clear => {
                self.clear_all();
                Response::Cleared
            }
            Command::Annotate(text) => Response::Annotated(self.annotate(&text)),
            Command::Status => Response::Status(self.status()),
            Command::Identifiers => Response::Identifiers(self.identifier_summary()),
            Command::Recent(limit) => {
                let limit = limit.unwrap_or(self.config.recent_limit);
                Response::Events(self.recent_events(limit))
            }
            Command::Since(sequence) => Response::Events(self.log.since(sequence)),
            Command::Export => Response::Export(self.export_csv()),
        }
    }

    /// Emit a status report if messages have arrived and the interval elapsed
    pub fn maintenance(&mut self) -> Option<StatusReport> {
        if self.config.status_interval_ms == 0 || self.counters.total_messages == 0 {
            return None;
        }

        let now = self.clock.now_ms();
        if now.saturating_sub(self.last_status_ms) <= self.config.status_interval_ms {
            return None;
        }

        self.last_status_ms = now;
        Some(self.status())
    }

    /// Current session summary
    pub fn status(&self) -> StatusReport {
        StatusReport {
            uptime_ms: self.elapsed_ms(),
            speed: self.speed,
            total_messages: self.counters.total_messages,
            total_errors: self.counters.total_errors,
            distinct_identifiers: self.ids.len(),
            log_entries: self.log.len(),
            last_sequence: self.log.last_sequence(),
        }
    }

    /// Identifier table in first-observation order
    pub fn identifier_summary(&self) -> Vec<IdentifierStat> {
        self.ids.snapshot()
    }

    /// Up to `max_entries` most recent log entries, oldest first
    pub fn recent_events(&self, max_entries: usize) -> Vec<LogEntry> {
        self.log.tail(max_entries)
    }

    /// The whole retained history as export text
    pub fn export_csv(&self) -> String {
        export::to_csv(self.log.iter())
    }

    /// Stream the export to `writer`
    pub fn write_export<W: Write>(&self, writer: &mut W) -> Result<()> {
        export::write_csv(writer, self.log.iter())
    }

    /// Add an annotation at the current session time
    pub fn annotate(&mut self, text: &str) -> Option<u64> {
        let timestamp = self.elapsed_ms();
        let sequence = self.log.append_annotation(text, timestamp);
        if let Some(sequence) = sequence {
            log::info!("Annotation #{} at {} ms", sequence, timestamp);
        }
        sequence
    }

    /// Switch the transceiver to `speed`
    ///
    /// Returns `Ok(false)` if `speed` is already active. A successful change
    /// clears all statistics, since they were collected at the old speed. On
    /// failure the previous speed is re-applied and remains active.
    pub fn set_speed(&mut self, speed: BusSpeed) -> Result<bool> {
        if speed == self.speed {
            return Ok(false);
        }

        if let Err(e) = self.transceiver.configure(speed) {
            log::warn!("Failed to switch to {}: {}", speed, e);
            self.restore_speed();
            return Err(e);
        }

        log::info!("Bus speed changed {} -> {}", self.speed, speed);
        self.speed = speed;
        self.clear_all();
        Ok(true)
    }

    /// Reset the identifier table, event log and counters
    ///
    /// Log sequence numbering continues from where it was.
    pub fn clear_all(&mut self) {
        self.ids.clear();
        self.log.clear();
        self.counters = SessionCounters {
            session_start_ms: self.clock.now_ms(),
            ..SessionCounters::default()
        };
        log::info!("Counts cleared");
    }

    /// Run speed detection over the configured candidates and window
    pub fn run_detection(&mut self) -> DetectionReport {
        let candidates = self.config.scan_candidates.clone();
        self.run_detection_with(&candidates, self.config.scan_window_ms)
    }

    /// Run speed detection
    ///
    /// Blocks for `candidates.len() x window_ms`; frames and commands are not
    /// serviced meanwhile. On a winner the live configuration switches to it and
    /// all statistics are cleared; otherwise the previous speed is restored.
    pub fn run_detection_with(&mut self, candidates: &[BusSpeed], window_ms: u64) -> DetectionReport {
        let detector = SpeedDetector::new(window_ms, self.config.scan_capacity);
        let report = detector.detect(candidates, &mut self.transceiver, &self.clock);

        match report.selected {
            Some(winner) => match self.transceiver.configure(winner) {
                Ok(()) => {
                    log::info!("Best match: {}", winner);
                    self.speed = winner;
                    self.clear_all();
                }
                Err(e) => {
                    log::error!("Failed to apply detected speed {}: {}", winner, e);
                    self.restore_speed();
                }
            },
            None => {
                log::info!("No valid traffic detected at any rate");
                self.restore_speed();
            }
        }

        report
    }

    fn restore_speed(&mut self) {
        if let Err(e) = self.transceiver.configure(self.speed) {
            log::error!("Failed to restore {}: {}", self.speed, e);
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.clock
            .now_ms()
            .saturating_sub(self.counters.session_start_ms)
    }

    /// Currently configured speed
    pub fn speed(&self) -> BusSpeed {
        self.speed
    }

    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    pub fn identifier_table(&self) -> &IdentifierTable {
        &self.ids
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn config(&self) -> &SnifferConfig {
        &self.config
    }

    pub fn transceiver(&self) -> &T {
        &self.transceiver
    }

    pub fn transceiver_mut(&mut self) -> &mut T {
        &mut self.transceiver
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::SnifferError;
    use std::collections::VecDeque;

    /// Transceiver fed from a queue; rejects speeds listed in `refuse`
    #[derive(Default)]
    struct QueueTransceiver {
        frames: VecDeque<Result<RawFrame>>,
        refuse: Vec<BusSpeed>,
        configured: Vec<BusSpeed>,
    }

    impl Transceiver for QueueTransceiver {
        fn configure(&mut self, speed: BusSpeed) -> Result<()> {
            if self.refuse.contains(&speed) {
                return Err(SnifferError::PeripheralConfig {
                    speed,
                    reason: "refused".to_string(),
                });
            }
            self.configured.push(speed);
            Ok(())
        }

        fn try_receive(&mut self) -> Option<Result<RawFrame>> {
            self.frames.pop_front()
        }
    }

    fn sniffer_with(frames: Vec<RawFrame>) -> Sniffer<QueueTransceiver, ManualClock> {
        let transceiver = QueueTransceiver {
            frames: frames.into_iter().map(Ok).collect(),
            ..Default::default()
        };
        Sniffer::new(SnifferConfig::default(), transceiver, ManualClock::new(1_000)).unwrap()
    }

    #[test]
    fn test_new_configures_initial_speed() {
        let sniffer = sniffer_with(vec![]);
        assert_eq!(sniffer.speed(), BusSpeed::Kbps250);
        assert_eq!(sniffer.transceiver().configured, vec![BusSpeed::Kbps250]);
        assert_eq!(sniffer.counters().session_start_ms, 1_000);
    }

    #[test]
    fn test_new_fails_when_transceiver_refuses() {
        let transceiver = QueueTransceiver {
            refuse: vec![BusSpeed::Kbps250],
            ..Default::default()
        };
        let result = Sniffer::new(SnifferConfig::default(), transceiver, ManualClock::new(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_step_records_frame_with_session_timestamp() {
        let mut sniffer = sniffer_with(vec![RawFrame::new(0x123, false, false, &[1, 2])]);
        sniffer.clock().advance(250);

        let outcome = sniffer.step(None);
        match outcome.frame {
            Some(FrameOutcome::Received { frame, sequence, table }) => {
                assert_eq!(frame.timestamp_ms, 250);
                assert_eq!(sequence, 1);
                assert_eq!(table, ObserveOutcome::Inserted);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(outcome.response.is_none());
        assert_eq!(sniffer.counters().total_messages, 1);

        // Nothing waiting: the step proceeds straight to commands
        let outcome = sniffer.step(Some(Command::Status));
        assert!(outcome.frame.is_none());
        assert!(matches!(outcome.response, Some(Response::Status(_))));
    }

    #[test]
    fn test_read_errors_are_counted_not_logged() {
        let mut sniffer = sniffer_with(vec![]);
        sniffer
            .transceiver_mut()
            .frames
            .push_back(Err(SnifferError::FrameDecode("crc".to_string())));

        assert_eq!(sniffer.step(None).frame, Some(FrameOutcome::ReadError));
        assert_eq!(sniffer.counters().total_errors, 1);
        assert!(sniffer.event_log().is_empty());
    }

    #[test]
    fn test_set_speed_clears_and_same_speed_is_noop() {
        let mut sniffer = sniffer_with(vec![RawFrame::new(0x10, false, false, &[])]);
        sniffer.step(None);

        assert_eq!(
            sniffer.execute(Command::SetSpeed(BusSpeed::Kbps250)),
            Response::SpeedUnchanged(BusSpeed::Kbps250)
        );
        assert_eq!(sniffer.counters().total_messages, 1);

        assert_eq!(
            sniffer.execute(Command::SetSpeed(BusSpeed::Kbps500)),
            Response::SpeedChanged(BusSpeed::Kbps500)
        );
        assert_eq!(sniffer.speed(), BusSpeed::Kbps500);
        assert_eq!(sniffer.counters().total_messages, 0);
        assert!(sniffer.identifier_table().is_empty());
    }

    #[test]
    fn test_rejected_speed_keeps_previous() {
        let mut sniffer = sniffer_with(vec![]);
        sniffer.transceiver_mut().refuse.push(BusSpeed::Mbps1);

        match sniffer.execute(Command::SetSpeed(BusSpeed::Mbps1)) {
            Response::SpeedRejected { requested, active, .. } => {
                assert_eq!(requested, BusSpeed::Mbps1);
                assert_eq!(active, BusSpeed::Kbps250);
            }
            other => panic!("unexpected response: {:?}", other),
        }
        assert_eq!(sniffer.speed(), BusSpeed::Kbps250);
        assert_eq!(sniffer.transceiver().configured.last(), Some(&BusSpeed::Kbps250));
    }

    #[test]
    fn test_periodic_status_requires_traffic() {
        let mut sniffer = sniffer_with(vec![]);
        sniffer.clock().advance(60_000);
        assert!(sniffer.step(None).status.is_none());

        sniffer
            .transceiver_mut()
            .frames
            .push_back(Ok(RawFrame::new(0x1, false, false, &[])));
        let status = sniffer.step(None).status.expect("status after idle interval");
        assert_eq!(status.total_messages, 1);

        // Not again until another interval has passed
        assert!(sniffer.step(None).status.is_none());
        sniffer.clock().advance(30_001);
        assert!(sniffer.step(None).status.is_some());
    }

    #[test]
    fn test_recent_uses_configured_default() {
        let frames = (0..150).map(|i| RawFrame::new(i, false, false, &[])).collect();
        let mut sniffer = sniffer_with(frames);
        for _ in 0..150 {
            sniffer.step(None);
        }

        match sniffer.execute(Command::Recent(None)) {
            Response::Events(events) => {
                assert_eq!(events.len(), 100);
                assert_eq!(events[0].sequence, 51);
            }
            other => panic!("unexpected response: {:?}", other),
        }

        match sniffer.execute(Command::Since(148)) {
            Response::Events(events) => assert_eq!(events.len(), 2),
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
