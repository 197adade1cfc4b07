//! Capture replay transceiver
//!
//! Plays a previously exported capture back as if it were a live bus. Frames
//! come out in file order, optionally paced by their recorded timestamps.
//! Annotation lines in the capture are skipped.
//!
//! The capture was recorded at one bus speed. While the replay is configured for
//! any other speed, every frame that comes due is delivered as a read error, the
//! way a mis-clocked listen-only controller only ever sees bit errors.

use anyhow::{Context, Result};
use can_sniffer_core::{
    parse_csv, BusSpeed, Clock, LogEvent, MonotonicClock, NormalizedFrame, RawFrame,
    SnifferError, Transceiver,
};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

/// A capture file acting as the bus
pub struct ReplayTransceiver<C = MonotonicClock> {
    frames: VecDeque<NormalizedFrame>,
    bus_speed: BusSpeed,
    configured: Option<BusSpeed>,
    realtime: bool,
    clock: C,
    /// Clock reading when playback started
    origin_ms: Option<u64>,
    /// Timestamp of the first frame in the capture
    first_timestamp_ms: u64,
}

impl ReplayTransceiver<MonotonicClock> {
    /// Load a capture file
    pub fn open(path: &Path, bus_speed: BusSpeed, realtime: bool) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read capture file: {:?}", path))?;
        let replay = Self::from_csv(&text, bus_speed, realtime, MonotonicClock::new())
            .with_context(|| format!("Failed to parse capture file: {:?}", path))?;

        log::info!(
            "Replaying {} frames from {:?} recorded at {}",
            replay.remaining(),
            path,
            bus_speed
        );
        Ok(replay)
    }
}

impl<C: Clock> ReplayTransceiver<C> {
    /// Build a replay from capture text
    pub fn from_csv(text: &str, bus_speed: BusSpeed, realtime: bool, clock: C) -> Result<Self> {
        let frames: VecDeque<NormalizedFrame> = parse_csv(text)?
            .into_iter()
            .filter_map(|record| match record.event {
                LogEvent::Frame(frame) => Some(frame),
                LogEvent::Annotation { .. } => None,
            })
            .collect();

        let first_timestamp_ms = frames.front().map(|f| f.timestamp_ms).unwrap_or(0);

        Ok(Self {
            frames,
            bus_speed,
            configured: None,
            realtime,
            clock,
            origin_ms: None,
            first_timestamp_ms,
        })
    }

    /// Frames not yet delivered
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.frames.is_empty()
    }

    /// Speed the capture was recorded at
    pub fn bus_speed(&self) -> BusSpeed {
        self.bus_speed
    }

    fn next_is_due(&mut self, frame_timestamp_ms: u64) -> bool {
        if !self.realtime {
            return true;
        }

        let now = self.clock.now_ms();
        let origin = *self.origin_ms.get_or_insert(now);
        let due = frame_timestamp_ms.saturating_sub(self.first_timestamp_ms);
        now.saturating_sub(origin) >= due
    }
}

impl<C: Clock> Transceiver for ReplayTransceiver<C> {
    fn configure(&mut self, speed: BusSpeed) -> can_sniffer_core::Result<()> {
        log::debug!("Replay configured for {}", speed);
        self.configured = Some(speed);
        Ok(())
    }

    fn try_receive(&mut self) -> Option<can_sniffer_core::Result<RawFrame>> {
        let configured = self.configured?;
        let timestamp = self.frames.front()?.timestamp_ms;
        if !self.next_is_due(timestamp) {
            return None;
        }

        let frame = self.frames.pop_front()?;
        if configured != self.bus_speed {
            return Some(Err(SnifferError::FrameDecode(format!(
                "bit error while sampling at {}",
                configured
            ))));
        }

        Some(Ok(RawFrame::new(
            frame.identifier,
            frame.is_extended,
            frame.is_remote_request,
            frame.payload.as_slice(),
        )))
    }
}
