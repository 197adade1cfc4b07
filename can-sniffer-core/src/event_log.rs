//! Bounded chronological event log
//!
//! A circular buffer of received frames and operator annotations. The buffer
//! fills until it reaches its capacity, after which every append overwrites the
//! oldest entry. Clearing returns it to the filling phase.
//!
//! Each entry gets a sequence number from a counter that starts at 1 and is
//! never reset, not even by [`EventLog::clear`]. Polling clients compare sequence
//! numbers to skip entries they already have and to notice gaps.

use crate::types::{LogEntry, LogEvent, NormalizedFrame, ANNOTATION_WIDTH};

/// Circular log of [`LogEntry`] values
#[derive(Debug, Clone)]
pub struct EventLog {
    /// Storage; grows to `capacity` then is overwritten in place
    slots: Vec<LogEntry>,
    /// Next slot to write once the buffer is full
    head: usize,
    capacity: usize,
    next_sequence: u64,
}

impl EventLog {
    /// Create an empty log retaining at most `capacity` entries (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
            next_sequence: 1,
        }
    }

    /// Record a received frame, returning its sequence number
    pub fn append_frame(&mut self, frame: NormalizedFrame) -> u64 {
        self.push(frame.timestamp_ms, LogEvent::Frame(frame))
    }

    /// Record an operator annotation
    ///
    /// The text is trimmed; whitespace-only text is ignored and consumes no
    /// sequence number. Line breaks and other control characters become spaces
    /// so that one annotation is always one export line. Text longer than
    /// [`ANNOTATION_WIDTH`] characters is truncated.
    pub fn append_annotation(&mut self, text: &str, timestamp_ms: u64) -> Option<u64> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        let text: String = trimmed
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .take(ANNOTATION_WIDTH)
            .collect();

        Some(self.push(timestamp_ms, LogEvent::Annotation { text }))
    }

    fn push(&mut self, timestamp_ms: u64, event: LogEvent) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let entry = LogEntry {
            sequence,
            timestamp_ms,
            event,
        };

        if self.slots.len() < self.capacity {
            self.slots.push(entry);
        } else {
            self.slots[self.head] = entry;
        }
        self.head = (self.head + 1) % self.capacity;

        sequence
    }

    /// Drop every retained entry; sequence numbering continues
    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }

    /// Retained entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> + '_ {
        let start = if self.is_full() { self.head } else { 0 };
        let len = self.slots.len();
        (0..len).map(move |offset| &self.slots[(start + offset) % len])
    }

    /// The most recent `max_entries` entries, oldest first
    pub fn tail(&self, max_entries: usize) -> Vec<LogEntry> {
        let skip = self.len().saturating_sub(max_entries);
        self.iter().skip(skip).cloned().collect()
    }

    /// Retained entries with a sequence number above `sequence`, oldest first
    pub fn since(&self, sequence: u64) -> Vec<LogEntry> {
        self.iter()
            .filter(|entry| entry.sequence > sequence)
            .cloned()
            .collect()
    }

    /// Every retained entry, oldest first
    pub fn export_all(&self) -> Vec<LogEntry> {
        self.iter().cloned().collect()
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True once the log is overwriting its oldest entries
    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Highest sequence number issued so far (0 before the first append)
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }
}
