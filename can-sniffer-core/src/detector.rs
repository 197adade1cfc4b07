//! Bus speed auto-detection
//!
//! Listens at each candidate speed for a fixed window and scores what arrives.
//! At the right speed a bus shows a small, stable set of identifiers repeating at
//! fixed rates. At the wrong speed the controller samples bits at the wrong
//! instants and the "frames" that survive carry essentially random identifiers,
//! so many distinct identifiers with few repeats points at noise.
//!
//! Detection owns the caller for its whole duration (candidates x window): it
//! busy-polls the transceiver and returns only when every candidate has been
//! sampled. There is no cancellation.

use crate::clock::Clock;
use crate::config::SnifferConfig;
use crate::id_table::{IdentifierStat, IdentifierTable};
use crate::normalizer::normalize_raw;
use crate::transceiver::Transceiver;
use crate::types::BusSpeed;
use serde::Serialize;
use std::fmt;

/// Above this many distinct identifiers a sample is treated as line noise
pub const NOISE_IDENTIFIER_THRESHOLD: usize = 30;

/// Score multiplier applied to noisy samples
pub const NOISE_PENALTY: f64 = 0.1;

/// A likely-correct sample has at most this many distinct identifiers...
pub const LIKELY_MAX_IDENTIFIERS: usize = 20;

/// ...each repeating more than this many times on average
pub const LIKELY_MIN_REPEAT_RATE: f64 = 10.0;

/// Classification of one candidate's sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    /// The transceiver rejected the speed; never selected
    InitFailed,
    /// Nothing was received
    NoData,
    /// Few identifiers, high repeat rate
    LikelyCorrect,
    /// Many distinct identifiers
    Noise,
    /// Traffic that fits neither pattern
    Uncertain,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::InitFailed => write!(f, "INIT FAILED"),
            Verdict::NoData => write!(f, "NO DATA"),
            Verdict::LikelyCorrect => write!(f, "LIKELY CORRECT"),
            Verdict::Noise => write!(f, "noise (random IDs)"),
            Verdict::Uncertain => write!(f, "uncertain"),
        }
    }
}

/// Outcome of sampling one candidate speed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub candidate: BusSpeed,
    /// Frames read successfully, including ones whose identifier was not tracked
    pub message_count: u64,
    /// Receive attempts that failed
    pub error_count: u64,
    pub distinct_identifier_count: usize,
    /// Messages per distinct identifier
    pub repeat_rate: f64,
    /// Failed reads as a percentage of all reads
    pub error_rate: f64,
    /// Selection score: the repeat rate, penalised for noise
    pub score: f64,
    pub verdict: Verdict,
    /// Per-identifier counts of the sample, in first-seen order
    pub identifiers: Vec<IdentifierStat>,
}

impl ScanResult {
    /// Result for a candidate the transceiver refused
    pub fn init_failed(candidate: BusSpeed) -> Self {
        Self {
            candidate,
            message_count: 0,
            error_count: 0,
            distinct_identifier_count: 0,
            repeat_rate: 0.0,
            error_rate: 0.0,
            score: 0.0,
            verdict: Verdict::InitFailed,
            identifiers: Vec::new(),
        }
    }

    /// Score a finished sample
    pub fn from_sample(
        candidate: BusSpeed,
        message_count: u64,
        error_count: u64,
        table: &IdentifierTable,
    ) -> Self {
        let distinct = table.len();

        let repeat_rate = if distinct > 0 {
            message_count as f64 / distinct as f64
        } else {
            0.0
        };

        let attempts = message_count + error_count;
        let error_rate = if attempts > 0 {
            error_count as f64 / attempts as f64 * 100.0
        } else {
            0.0
        };

        let mut score = repeat_rate;
        if distinct > NOISE_IDENTIFIER_THRESHOLD {
            score *= NOISE_PENALTY;
        }

        let verdict = if message_count == 0 {
            Verdict::NoData
        } else if distinct <= LIKELY_MAX_IDENTIFIERS && repeat_rate > LIKELY_MIN_REPEAT_RATE {
            Verdict::LikelyCorrect
        } else if distinct > NOISE_IDENTIFIER_THRESHOLD {
            Verdict::Noise
        } else {
            Verdict::Uncertain
        };

        Self {
            candidate,
            message_count,
            error_count,
            distinct_identifier_count: distinct,
            repeat_rate,
            error_rate,
            score,
            verdict,
            identifiers: table.snapshot(),
        }
    }
}

/// Results of a detection run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    /// One result per candidate, in the order tried
    pub results: Vec<ScanResult>,
    /// Winning speed, if any candidate scored above zero
    pub selected: Option<BusSpeed>,
}

/// Samples candidate speeds and picks the most plausible one
#[derive(Debug, Clone)]
pub struct SpeedDetector {
    window_ms: u64,
    scan_capacity: usize,
}

impl SpeedDetector {
    pub fn new(window_ms: u64, scan_capacity: usize) -> Self {
        Self {
            window_ms,
            scan_capacity,
        }
    }

    pub fn from_config(config: &SnifferConfig) -> Self {
        Self::new(config.scan_window_ms, config.scan_capacity)
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Try every candidate in order and select a winner
    ///
    /// Leaves the transceiver configured at the last candidate tried; restoring or
    /// switching the live configuration is the caller's decision.
    pub fn detect<T, C>(&self, candidates: &[BusSpeed], transceiver: &mut T, clock: &C) -> DetectionReport
    where
        T: Transceiver + ?Sized,
        C: Clock + ?Sized,
    {
        log::info!(
            "Speed detection: {} candidates, {} ms each",
            candidates.len(),
            self.window_ms
        );

        let results: Vec<ScanResult> = candidates
            .iter()
            .map(|&candidate| self.sample(candidate, transceiver, clock))
            .collect();

        let selected = Self::select(&results);
        DetectionReport { results, selected }
    }

    /// Sample a single candidate for the configured window
    pub fn sample<T, C>(&self, candidate: BusSpeed, transceiver: &mut T, clock: &C) -> ScanResult
    where
        T: Transceiver + ?Sized,
        C: Clock + ?Sized,
    {
        if let Err(e) = transceiver.configure(candidate) {
            log::warn!("Speed detection: {} skipped: {}", candidate, e);
            return ScanResult::init_failed(candidate);
        }

        let mut table = IdentifierTable::with_capacity(self.scan_capacity);
        let mut message_count: u64 = 0;
        let mut error_count: u64 = 0;

        let start = clock.now_ms();
        loop {
            let elapsed = clock.now_ms().saturating_sub(start);
            if elapsed >= self.window_ms {
                break;
            }

            match transceiver.try_receive() {
                Some(Ok(raw)) => {
                    let frame = normalize_raw(elapsed, &raw);
                    message_count += 1;
                    table.observe(&frame);
                }
                Some(Err(e)) => {
                    error_count += 1;
                    log::trace!("Speed detection: read error at {}: {}", candidate, e);
                }
                None => std::thread::yield_now(),
            }
        }

        let result = ScanResult::from_sample(candidate, message_count, error_count, &table);
        log::info!(
            "  {}: {} msgs, {} unique IDs, {:.1} repeat rate, {:.0}% errors  {}",
            candidate,
            result.message_count,
            result.distinct_identifier_count,
            result.repeat_rate,
            result.error_rate,
            result.verdict
        );
        result
    }

    /// Highest score wins; ties keep the earlier candidate; zero never wins
    pub fn select(results: &[ScanResult]) -> Option<BusSpeed> {
        let mut best: Option<BusSpeed> = None;
        let mut best_score = 0.0;

        for result in results {
            if result.verdict == Verdict::InitFailed {
                continue;
            }
            if result.score > best_score {
                best_score = result.score;
                best = Some(result.candidate);
            }
        }

        best
    }
}
