//! Fuzz entry points for frer-core
//!
//! To use with cargo-fuzz:
//! 1. Install cargo-fuzz: cargo install cargo-fuzz
//! 2. Call these from fuzz targets: cargo fuzz run fuzz_decode

use frer_core::{rtag, AnalysisAggregator};

pub fn fuzz_decode(data: &[u8]) {
    // Decoding arbitrary bytes must never panic
    let _ = rtag::decode(data);
    let _ = rtag::decode_payload(data);
}

/// Treat the input as a capture: 16-bit length prefixes, then frame bytes
pub fn fuzz_observe(data: &[u8]) {
    let mut aggregator = AnalysisAggregator::new();
    let mut rest = data;

    while rest.len() >= 2 {
        let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        rest = &rest[2..];
        let take = len.min(rest.len());
        let _ = aggregator.observe(&rest[..take]);
        rest = &rest[take..];
    }

    let report = aggregator.finalize();
    assert!(report.tagged_frames <= report.total_frames);
    assert!(report.duplicate_frames <= report.tagged_frames);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuzz_decode_empty() {
        fuzz_decode(&[]);
    }

    #[test]
    fn test_fuzz_decode_random() {
        fuzz_decode(&[0x81, 0x00, 0x89, 0x3D]);
    }

    #[test]
    fn test_fuzz_observe_empty() {
        fuzz_observe(&[]);
    }

    #[test]
    fn test_fuzz_observe_random() {
        fuzz_observe(&[0xFF; 1024]);
    }

    #[test]
    fn test_fuzz_observe_truncated_length() {
        fuzz_observe(&[0x00, 0x40, 0x81, 0x00]);
    }
}
