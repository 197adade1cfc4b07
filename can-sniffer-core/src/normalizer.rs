//! Frame normalization
//!
//! Splits the transceiver's identifier field into address and flags and bounds the
//! payload to the classic CAN maximum.

use crate::types::{
    NormalizedFrame, Payload, RawFrame, EXTENDED_FLAG, IDENTIFIER_MASK, MAX_DATA_LEN, REMOTE_FLAG,
};

/// Turn raw receive fields into a [`NormalizedFrame`]
///
/// A reported length above 8 is clamped to 8 and a warning is logged; correctly
/// functioning hardware never reports one. Bytes missing from `raw_bytes` for the
/// reported length read as zero.
pub fn normalize(
    timestamp_ms: u64,
    raw_identifier_field: u32,
    raw_data_length: u8,
    raw_bytes: &[u8],
) -> NormalizedFrame {
    let identifier = raw_identifier_field & IDENTIFIER_MASK;

    let mut length = raw_data_length as usize;
    if length > MAX_DATA_LEN {
        log::warn!(
            "Frame 0x{:X} reported {} data bytes, clamping to {}",
            identifier,
            length,
            MAX_DATA_LEN
        );
        length = MAX_DATA_LEN;
    }

    let mut bytes = [0u8; MAX_DATA_LEN];
    let available = length.min(raw_bytes.len());
    bytes[..available].copy_from_slice(&raw_bytes[..available]);

    NormalizedFrame {
        timestamp_ms,
        identifier,
        is_extended: raw_identifier_field & EXTENDED_FLAG != 0,
        is_remote_request: raw_identifier_field & REMOTE_FLAG != 0,
        payload: Payload::from_slice(&bytes[..length]),
    }
}

/// Normalize a [`RawFrame`] received at `timestamp_ms`
pub fn normalize_raw(timestamp_ms: u64, raw: &RawFrame) -> NormalizedFrame {
    normalize(timestamp_ms, raw.identifier_field, raw.data_length, &raw.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_frame() {
        let frame = normalize(12, 0x123, 3, &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(frame.timestamp_ms, 12);
        assert_eq!(frame.identifier, 0x123);
        assert!(!frame.is_extended);
        assert!(!frame.is_remote_request);
        assert_eq!(frame.payload.as_slice(), &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_flag_bits_are_stripped() {
        let frame = normalize(0, 0x8000_0000 | 0x4000_0000 | 0x18DA_F110, 0, &[]);
        assert_eq!(frame.identifier, 0x18DA_F110);
        assert!(frame.is_extended);
        assert!(frame.is_remote_request);
        assert_eq!(frame.data_length(), 0);
    }

    #[test]
    fn test_bit_29_is_not_part_of_the_address() {
        let frame = normalize(0, 0x2000_0100, 0, &[]);
        assert_eq!(frame.identifier, 0x100);
    }

    #[test]
    fn test_over_length_is_clamped() {
        let frame = normalize(0, 0x10, 15, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(frame.data_length(), 8);
        assert_eq!(frame.payload.as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_short_buffer_reads_as_zero() {
        let frame = normalize(0, 0x10, 4, &[9, 9]);
        assert_eq!(frame.payload.as_slice(), &[9, 9, 0, 0]);
    }

    #[test]
    fn test_normalize_raw() {
        let raw = RawFrame::new(0x7E8, false, false, &[0x02, 0x41]);
        let frame = normalize_raw(40, &raw);
        assert_eq!(frame.identifier, 0x7E8);
        assert_eq!(frame.payload.as_slice(), &[0x02, 0x41]);
    }
}
