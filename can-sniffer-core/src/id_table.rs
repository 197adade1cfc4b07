//! Per-identifier frequency table
//!
//! Bounded store of how often each identifier has been seen and what it carried
//! last. Iteration follows first-observation order; reports rely on this.
//!
//! Once the table is full, frames with a new identifier are not tracked. This is
//! a documented capacity policy rather than an error: callers still count those
//! frames in their message totals.

use crate::types::{NormalizedFrame, Payload};
use serde::Serialize;
use std::collections::HashMap;

/// Statistics for one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierStat {
    /// 29-bit bus address
    pub identifier: u32,
    /// Extended flag of the first frame seen with this identifier
    pub is_extended: bool,
    /// Number of frames seen, saturating
    pub occurrence_count: u64,
    /// Payload of the most recent frame
    pub last_payload: Payload,
}

/// Result of [`IdentifierTable::observe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    /// Known identifier; count incremented and payload replaced
    Updated,
    /// First frame with this identifier; entry created with count 1
    Inserted,
    /// New identifier but the table is full; nothing changed
    DroppedCapacity,
}

/// Bounded, insertion-ordered identifier statistics
#[derive(Debug, Clone)]
pub struct IdentifierTable {
    /// Entries in first-observation order
    entries: Vec<IdentifierStat>,
    /// Identifier -> position in `entries`
    index: HashMap<u32, usize>,
    capacity: usize,
}

impl IdentifierTable {
    /// Create an empty table holding at most `capacity` identifiers
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    /// Record one frame
    pub fn observe(&mut self, frame: &NormalizedFrame) -> ObserveOutcome {
        if let Some(&position) = self.index.get(&frame.identifier) {
            let stat = &mut self.entries[position];
            stat.occurrence_count = stat.occurrence_count.saturating_add(1);
            stat.last_payload = frame.payload;
            return ObserveOutcome::Updated;
        }

        if self.is_full() {
            log::trace!(
                "Identifier table full ({}), not tracking 0x{:X}",
                self.capacity,
                frame.identifier
            );
            return ObserveOutcome::DroppedCapacity;
        }

        self.index.insert(frame.identifier, self.entries.len());
        self.entries.push(IdentifierStat {
            identifier: frame.identifier,
            is_extended: frame.is_extended,
            occurrence_count: 1,
            last_payload: frame.payload,
        });
        ObserveOutcome::Inserted
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Entries in first-observation order
    pub fn snapshot(&self) -> Vec<IdentifierStat> {
        self.entries.clone()
    }

    /// Borrowing view of the entries in first-observation order
    pub fn iter(&self) -> impl Iterator<Item = &IdentifierStat> {
        self.entries.iter()
    }

    pub fn get(&self, identifier: u32) -> Option<&IdentifierStat> {
        self.index.get(&identifier).map(|&position| &self.entries[position])
    }

    /// Number of distinct identifiers tracked
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sum of all occurrence counts
    pub fn total_occurrences(&self) -> u64 {
        self.entries
            .iter()
            .fold(0u64, |sum, stat| sum.saturating_add(stat.occurrence_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;

    fn frame(identifier: u32, data: &[u8]) -> NormalizedFrame {
        normalize(0, identifier, data.len() as u8, data)
    }

    #[test]
    fn test_insert_then_update() {
        let mut table = IdentifierTable::with_capacity(4);

        assert_eq!(table.observe(&frame(0x100, &[1])), ObserveOutcome::Inserted);
        assert_eq!(table.observe(&frame(0x100, &[2, 3])), ObserveOutcome::Updated);

        let stat = table.get(0x100).unwrap();
        assert_eq!(stat.occurrence_count, 2);
        assert_eq!(stat.last_payload.as_slice(), &[2, 3]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let mut table = IdentifierTable::with_capacity(8);
        for id in [0x300, 0x100, 0x200, 0x100, 0x300] {
            table.observe(&frame(id, &[]));
        }

        let order: Vec<u32> = table.snapshot().iter().map(|s| s.identifier).collect();
        assert_eq!(order, vec![0x300, 0x100, 0x200]);
    }

    #[test]
    fn test_capacity_drop_leaves_entries_untouched() {
        let mut table = IdentifierTable::with_capacity(2);
        table.observe(&frame(0x1, &[0x11]));
        table.observe(&frame(0x2, &[0x22]));
        let before = table.snapshot();

        assert_eq!(table.observe(&frame(0x3, &[0x33])), ObserveOutcome::DroppedCapacity);
        assert_eq!(table.snapshot(), before);
        assert!(table.get(0x3).is_none());

        // Known identifiers still update once full
        assert_eq!(table.observe(&frame(0x1, &[0x44])), ObserveOutcome::Updated);
        assert_eq!(table.total_occurrences(), 3);
    }

    #[test]
    fn test_count_saturates() {
        let mut table = IdentifierTable::with_capacity(1);
        table.observe(&frame(0x7, &[]));
        table.entries[0].occurrence_count = u64::MAX;

        assert_eq!(table.observe(&frame(0x7, &[])), ObserveOutcome::Updated);
        assert_eq!(table.get(0x7).unwrap().occurrence_count, u64::MAX);
    }

    #[test]
    fn test_clear() {
        let mut table = IdentifierTable::with_capacity(2);
        table.observe(&frame(0x1, &[]));
        table.observe(&frame(0x2, &[]));
        table.clear();

        assert!(table.is_empty());
        assert_eq!(table.observe(&frame(0x3, &[])), ObserveOutcome::Inserted);
    }
}
