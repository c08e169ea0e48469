//! Property-based tests using proptest

use frer_core::{
    constants::RTAG_ETHERTYPE,
    rtag::{decode, decode_payload, encode},
    tracker::StreamTracker,
    AnalysisAggregator, MacAddr, RTag, TrafficGenerator,
};
use proptest::prelude::*;

fn vlan_frame(inner: &[u8]) -> Vec<u8> {
    let mut frame = vec![0xFF; 6];
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 1]);
    frame.extend_from_slice(&[0x81, 0x00, 0xC0, 0x64]);
    frame.extend_from_slice(inner);
    frame
}

proptest! {
    #[test]
    fn prop_round_trip_encode_decode(sequence in any::<u16>(), stream_id in any::<u16>()) {
        let tag = encode(sequence, stream_id);
        let decoded = decode_payload(&tag).unwrap();

        prop_assert_eq!(decoded, RTag { ether_type: RTAG_ETHERTYPE, sequence, stream_id });

        let frame = vlan_frame(&tag);
        prop_assert_eq!(decode(frame.as_slice()), Some(decoded));
    }

    #[test]
    fn prop_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
        // Should never panic, even on random data
        let _ = decode(data.as_slice());
    }

    #[test]
    fn prop_counters_bounded(
        frames in prop::collection::vec((any::<u16>(), 0u16..4, any::<bool>()), 0..512)
    ) {
        let mut agg = AnalysisAggregator::new();
        for (sequence, stream_id, tagged) in frames {
            let mut inner = encode(sequence, stream_id).to_vec();
            if !tagged {
                inner[0] = 0x08;
            }
            agg.observe(&vlan_frame(&inner));
        }

        let report = agg.finalize();
        prop_assert!(report.duplicate_frames <= report.tagged_frames);
        prop_assert!(report.tagged_frames <= report.total_frames);
        let per_stream: u64 = report.streams.values().map(|s| s.frame_count).sum();
        prop_assert_eq!(per_stream, report.tagged_frames);
    }

    #[test]
    fn prop_in_order_stream_has_no_gaps(start in any::<u16>(), len in 1usize..3000) {
        // Consecutive sequences, possibly wrapping, never produce a gap
        let mut tracker = StreamTracker::new(1);
        for i in 0..len {
            tracker.observe(start.wrapping_add(i as u16));
        }
        prop_assert_eq!(tracker.state().gap_count, 0);
        prop_assert_eq!(tracker.state().duplicate_count, 0);
    }

    #[test]
    fn prop_single_drop_is_one_gap(len in 3u16..500, drop_at in 1u16..499) {
        prop_assume!(drop_at < len - 1);
        let mut tracker = StreamTracker::new(1);
        for seq in (0..len).filter(|&s| s != drop_at) {
            tracker.observe(seq);
        }
        prop_assert_eq!(tracker.state().gap_count, 1);
        prop_assert_eq!(tracker.state().largest_gap, 1);
    }

    #[test]
    fn prop_duplicates_counted_exactly(len in 1u16..300, copies in 1usize..4) {
        let mut agg = AnalysisAggregator::new();
        let mut gen = TrafficGenerator::new(MacAddr::ZERO);
        for _ in 0..len {
            let frame = gen.next_frame(1, MacAddr::BROADCAST, 100, 20);
            for _ in 0..copies {
                agg.observe(&frame);
            }
        }

        let report = agg.finalize();
        prop_assert_eq!(report.duplicate_frames, u64::from(len) * (copies as u64 - 1));
        prop_assert_eq!(report.gap_events, 0);
        prop_assert_eq!(report.unique_sequences, u64::from(len));
    }
}
