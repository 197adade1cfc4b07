//! Sniffer configuration types
//!
//! Capacities, the speed detection window and the maintenance interval. Every
//! field has a default matching the reference hardware, so an empty TOML table
//! deserializes into a working configuration.

use crate::types::BusSpeed;
use serde::{Deserialize, Serialize};

/// Default number of distinct identifiers tracked per session
pub const MAX_IDENTIFIERS: usize = 256;

/// Default number of retained log entries
pub const LOG_CAPACITY: usize = 500;

/// Default number of distinct identifiers tracked per detection candidate
pub const SCAN_CAPACITY: usize = 64;

/// Configuration for the sniffer core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnifferConfig {
    /// Speed configured when the session starts
    #[serde(default = "default_speed")]
    pub initial_speed: BusSpeed,

    /// Identifier table capacity; new identifiers beyond it are not tracked
    #[serde(default = "default_max_identifiers")]
    pub max_identifiers: usize,

    /// Event log capacity; the oldest entry is overwritten beyond it
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Sampling window per detection candidate, in milliseconds
    #[serde(default = "default_scan_window")]
    pub scan_window_ms: u64,

    /// Identifier capacity of the scan-local counting table
    #[serde(default = "default_scan_capacity")]
    pub scan_capacity: usize,

    /// Speeds tried by detection, in order
    #[serde(default = "default_candidates")]
    pub scan_candidates: Vec<BusSpeed>,

    /// Idle interval between unsolicited status reports (0 disables them)
    #[serde(default = "default_status_interval")]
    pub status_interval_ms: u64,

    /// Default number of entries returned by a recent-history request
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

fn default_speed() -> BusSpeed {
    BusSpeed::Kbps250
}

fn default_max_identifiers() -> usize {
    MAX_IDENTIFIERS
}

fn default_log_capacity() -> usize {
    LOG_CAPACITY
}

fn default_scan_window() -> u64 {
    5000
}

fn default_scan_capacity() -> usize {
    SCAN_CAPACITY
}

fn default_candidates() -> Vec<BusSpeed> {
    BusSpeed::ALL.to_vec()
}

fn default_status_interval() -> u64 {
    30_000
}

fn default_recent_limit() -> usize {
    100
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            initial_speed: default_speed(),
            max_identifiers: default_max_identifiers(),
            log_capacity: default_log_capacity(),
            scan_window_ms: default_scan_window(),
            scan_capacity: default_scan_capacity(),
            scan_candidates: default_candidates(),
            status_interval_ms: default_status_interval(),
            recent_limit: default_recent_limit(),
        }
    }
}

impl SnifferConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the speed used at session start
    pub fn with_initial_speed(mut self, speed: BusSpeed) -> Self {
        self.initial_speed = speed;
        self
    }

    /// Builder method: set the identifier table capacity
    pub fn with_max_identifiers(mut self, max_identifiers: usize) -> Self {
        self.max_identifiers = max_identifiers;
        self
    }

    /// Builder method: set the event log capacity
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Builder method: set the per-candidate detection window
    pub fn with_scan_window_ms(mut self, window_ms: u64) -> Self {
        self.scan_window_ms = window_ms;
        self
    }

    /// Builder method: set the speeds tried by detection
    pub fn with_scan_candidates(mut self, candidates: Vec<BusSpeed>) -> Self {
        self.scan_candidates = candidates;
        self
    }

    /// Builder method: set the unsolicited status interval
    pub fn with_status_interval_ms(mut self, interval_ms: u64) -> Self {
        self.status_interval_ms = interval_ms;
        self
    }
}
