//! Per-stream sequence tracking: duplicate and gap detection

use crate::constants::{GAP_NOISE_THRESHOLD, SEQUENCE_SPACE};
use serde::{Deserialize, Serialize};

#[cfg(feature = "logging")]
use tracing::debug;

const WORD_BITS: usize = u64::BITS as usize;

/// Set of 16-bit sequence numbers backed by a fixed 8 KiB bitmap.
///
/// Membership never expires during a run.
#[derive(Clone)]
pub struct SequenceSet {
    words: Box<[u64]>,
    len: usize,
}

impl SequenceSet {
    /// Empty set
    pub fn new() -> Self {
        Self {
            words: vec![0u64; SEQUENCE_SPACE / WORD_BITS].into_boxed_slice(),
            len: 0,
        }
    }

    /// Insert a sequence number, returning `true` if it was not present
    #[inline]
    pub fn insert(&mut self, sequence: u16) -> bool {
        let (word, mask) = Self::locate(sequence);
        let fresh = self.words[word] & mask == 0;
        if fresh {
            self.words[word] |= mask;
            self.len += 1;
        }
        fresh
    }

    /// Membership test
    #[inline]
    pub fn contains(&self, sequence: u16) -> bool {
        let (word, mask) = Self::locate(sequence);
        self.words[word] & mask != 0
    }

    /// Number of distinct sequences
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been inserted
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn locate(sequence: u16) -> (usize, u64) {
        let bit = sequence as usize;
        (bit / WORD_BITS, 1u64 << (bit % WORD_BITS))
    }
}

impl Default for SequenceSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceSet").field("len", &self.len).finish()
    }
}

/// Classification of one received sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// First time this sequence was seen on the stream
    New,
    /// The sequence was already seen on the stream
    Duplicate,
}

/// Result of feeding one sequence number to a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// The sequence number received
    pub sequence: u16,

    /// New or duplicate
    pub outcome: Outcome,

    /// Number of sequences skipped, when a gap below the noise threshold was seen
    pub gap: Option<u16>,
}

impl Observation {
    /// Whether this frame repeated an already-seen sequence
    pub fn is_duplicate(&self) -> bool {
        self.outcome == Outcome::Duplicate
    }
}

/// Mutable state of one stream
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    /// Sequences observed so far
    pub seen: SequenceSet,

    /// Sequence of the most recent frame, duplicate or not
    pub last_sequence: Option<u16>,

    /// Frames received on this stream
    pub frame_count: u64,

    /// Frames whose sequence was already seen
    pub duplicate_count: u64,

    /// Gap events below the noise threshold
    pub gap_count: u64,

    /// Smallest sequence inserted into `seen`
    pub min_sequence: Option<u16>,

    /// Largest sequence inserted into `seen`
    pub max_sequence: Option<u16>,

    /// Largest single gap recorded
    pub largest_gap: u16,

    /// Sum of all recorded gap magnitudes
    pub missing_estimate: u64,
}

/// Sequence state machine for a single stream
#[derive(Debug, Clone)]
pub struct StreamTracker {
    stream_id: u16,
    gap_noise_threshold: u16,
    state: StreamState,
}

impl StreamTracker {
    /// Tracker with the default noise threshold
    pub fn new(stream_id: u16) -> Self {
        Self::with_threshold(stream_id, GAP_NOISE_THRESHOLD)
    }

    /// Tracker with a custom noise threshold
    pub fn with_threshold(stream_id: u16, gap_noise_threshold: u16) -> Self {
        Self {
            stream_id,
            gap_noise_threshold,
            state: StreamState::default(),
        }
    }

    /// Stream this tracker belongs to
    pub fn stream_id(&self) -> u16 {
        self.stream_id
    }

    /// Current state
    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// Feed the next received sequence number.
    ///
    /// `last_sequence` moves to `sequence` even when the frame is a
    /// duplicate, so a duplicate re-bases gap detection for the next frame.
    pub fn observe(&mut self, sequence: u16) -> Observation {
        let s = &mut self.state;
        s.frame_count += 1;

        let outcome = if s.seen.insert(sequence) {
            s.min_sequence = Some(s.min_sequence.map_or(sequence, |m| m.min(sequence)));
            s.max_sequence = Some(s.max_sequence.map_or(sequence, |m| m.max(sequence)));
            Outcome::New
        } else {
            s.duplicate_count += 1;
            Outcome::Duplicate
        };

        let mut gap = None;
        if let Some(last) = s.last_sequence {
            let expected = last.wrapping_add(1);
            if sequence != expected {
                let distance = sequence.wrapping_sub(expected);
                if distance < self.gap_noise_threshold {
                    s.gap_count += 1;
                    s.largest_gap = s.largest_gap.max(distance);
                    s.missing_estimate += u64::from(distance);
                    gap = Some(distance);

                    #[cfg(feature = "logging")]
                    debug!(
                        "Stream {}: expected {} got {} ({} missing)",
                        self.stream_id, expected, sequence, distance
                    );
                }
            }
        }

        s.last_sequence = Some(sequence);

        Observation {
            sequence,
            outcome,
            gap,
        }
    }

    /// Derived statistics for reporting
    pub fn summary(&self) -> StreamSummary {
        let s = &self.state;
        let unique = s.seen.len() as u64;

        let sequence_range = match (s.min_sequence, s.max_sequence) {
            (Some(min), Some(max)) => Some(u32::from(max) - u32::from(min) + 1),
            _ => None,
        };

        let loss_rate = sequence_range
            .filter(|_| unique > 0)
            .map(|range| (range as f64 - unique as f64) / range as f64);

        let duplication_rate = if s.frame_count > 0 {
            s.duplicate_count as f64 / s.frame_count as f64
        } else {
            0.0
        };

        StreamSummary {
            stream_id: self.stream_id,
            frame_count: s.frame_count,
            unique_sequences: unique,
            duplicate_count: s.duplicate_count,
            gap_count: s.gap_count,
            largest_gap: s.largest_gap,
            missing_estimate: s.missing_estimate,
            min_sequence: s.min_sequence,
            max_sequence: s.max_sequence,
            last_sequence: s.last_sequence,
            sequence_range,
            duplication_rate,
            loss_rate,
        }
    }
}

/// Snapshot of one stream for a run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSummary {
    /// Stream identifier
    pub stream_id: u16,
    /// Frames received
    pub frame_count: u64,
    /// Distinct sequences received
    pub unique_sequences: u64,
    /// Duplicated frames
    pub duplicate_count: u64,
    /// Gap events
    pub gap_count: u64,
    /// Largest gap recorded
    pub largest_gap: u16,
    /// Sum of recorded gap magnitudes
    pub missing_estimate: u64,
    /// Smallest sequence seen
    pub min_sequence: Option<u16>,
    /// Largest sequence seen
    pub max_sequence: Option<u16>,
    /// Most recent sequence
    pub last_sequence: Option<u16>,
    /// `max - min + 1`
    pub sequence_range: Option<u32>,
    /// `duplicate_count / frame_count`
    pub duplication_rate: f64,
    /// `(range - unique) / range`, absent for an empty stream
    pub loss_rate: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(tracker: &mut StreamTracker, seqs: &[u16]) -> Vec<Observation> {
        seqs.iter().map(|&s| tracker.observe(s)).collect()
    }

    #[test]
    fn test_sequence_set() {
        let mut set = SequenceSet::new();
        assert!(set.is_empty());
        assert!(set.insert(0));
        assert!(set.insert(65535));
        assert!(!set.insert(0));
        assert!(set.contains(65535));
        assert!(!set.contains(64));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_first_frame_never_a_gap() {
        let mut tracker = StreamTracker::new(1);
        let obs = tracker.observe(500);
        assert_eq!(obs.outcome, Outcome::New);
        assert_eq!(obs.gap, None);
        assert_eq!(tracker.state().gap_count, 0);
    }

    #[test]
    fn test_duplicate_idempotence() {
        let mut tracker = StreamTracker::new(1);
        let obs = feed(&mut tracker, &[9, 9]);

        assert_eq!(obs[1].outcome, Outcome::Duplicate);
        let s = tracker.state();
        assert_eq!(s.duplicate_count, 1);
        assert_eq!(s.seen.len(), 1);
        assert_eq!(s.frame_count, 2);
        assert_eq!(s.gap_count, 0);
    }

    #[test]
    fn test_gap_detection() {
        let mut tracker = StreamTracker::new(1);
        let obs = feed(&mut tracker, &[5, 7]);

        assert_eq!(obs[0].gap, None);
        assert_eq!(obs[1].gap, Some(1));
        assert_eq!(tracker.state().gap_count, 1);
        assert_eq!(tracker.state().largest_gap, 1);
    }

    #[test]
    fn test_wraparound_is_not_a_gap() {
        let mut tracker = StreamTracker::new(1);
        let obs = feed(&mut tracker, &[65534, 65535, 0, 1]);

        assert!(obs.iter().all(|o| o.gap.is_none()));
        assert_eq!(tracker.state().gap_count, 0);
        assert_eq!(tracker.state().seen.len(), 4);
    }

    #[test]
    fn test_gap_across_wraparound() {
        let mut tracker = StreamTracker::new(1);
        let obs = feed(&mut tracker, &[65534, 1]);
        // expected 65535, got 1: 65535 and 0 are missing
        assert_eq!(obs[1].gap, Some(2));
    }

    #[test]
    fn test_noise_suppression() {
        let mut tracker = StreamTracker::new(1);
        let obs = feed(&mut tracker, &[0, 50000]);

        assert_eq!(obs[1].gap, None);
        assert_eq!(obs[1].outcome, Outcome::New);
        assert_eq!(tracker.state().gap_count, 0);
        assert_eq!(tracker.state().seen.len(), 2);
    }

    #[test]
    fn test_threshold_boundary() {
        let mut tracker = StreamTracker::with_threshold(1, 10);
        // expected 1, distance 9 < 10
        assert_eq!(feed(&mut tracker, &[0, 10])[1].gap, Some(9));

        let mut tracker = StreamTracker::with_threshold(1, 10);
        // expected 1, distance 10 is noise
        assert_eq!(feed(&mut tracker, &[0, 11])[1].gap, None);
    }

    #[test]
    fn test_interleaved_duplicate_is_not_a_gap() {
        // A duplicate right after its original looks like a step back of one,
        // which wraps to a huge forward distance and is filtered as noise.
        let mut tracker = StreamTracker::new(1);
        let obs = feed(&mut tracker, &[0, 0, 1, 1, 2, 2]);
        assert!(obs.iter().all(|o| o.gap.is_none()));
        assert_eq!(tracker.state().duplicate_count, 3);
    }

    #[test]
    fn test_duplicate_resets_gap_baseline() {
        // 10 is lost. The late duplicate of 9 arrives after 11, moving the
        // baseline back to 9 so that 12 is reported as a gap of 2 relative to 10.
        // Without the duplicate, 12 after 11 would be clean.
        let mut tracker = StreamTracker::new(1);
        let obs = feed(&mut tracker, &[8, 9, 11, 9, 12]);
        assert_eq!(obs[2].gap, Some(1));
        assert_eq!(obs[3].outcome, Outcome::Duplicate);
        assert_eq!(obs[3].gap, None);
        assert_eq!(obs[4].gap, Some(2));
        assert_eq!(tracker.state().last_sequence, Some(12));
    }

    #[test]
    fn test_duplicate_masks_following_gap() {
        // 3 arrives late. Without a duplicate, 5 after 3 is a gap.
        let mut plain = StreamTracker::new(1);
        feed(&mut plain, &[1, 2, 4, 3, 5]);
        assert_eq!(plain.state().gap_count, 2);

        // A duplicate of 4 between 3 and 5 re-bases last_sequence to 4,
        // so 5 is taken as in order and the second gap is never counted.
        let mut masked = StreamTracker::new(1);
        let obs = feed(&mut masked, &[1, 2, 4, 3, 4, 5]);
        assert_eq!(obs[4].outcome, Outcome::Duplicate);
        assert_eq!(obs[4].gap, None);
        assert_eq!(obs[5].gap, None);
        assert_eq!(masked.state().gap_count, 1);
    }

    #[test]
    fn test_min_max_only_track_inserted() {
        let mut tracker = StreamTracker::new(1);
        feed(&mut tracker, &[10, 3, 3, 20]);
        let s = tracker.state();
        assert_eq!(s.min_sequence, Some(3));
        assert_eq!(s.max_sequence, Some(20));
    }

    #[test]
    fn test_summary_rates() {
        let mut tracker = StreamTracker::new(4);
        // 0..=9 with 4 and 5 missing, and 2 duplicated
        feed(&mut tracker, &[0, 1, 2, 2, 3, 6, 7, 8, 9]);
        let summary = tracker.summary();

        assert_eq!(summary.stream_id, 4);
        assert_eq!(summary.frame_count, 9);
        assert_eq!(summary.unique_sequences, 8);
        assert_eq!(summary.sequence_range, Some(10));
        assert!((summary.loss_rate.unwrap() - 0.2).abs() < 1e-9);
        assert!((summary.duplication_rate - 1.0 / 9.0).abs() < 1e-9);
        assert_eq!(summary.gap_count, 1);
        assert_eq!(summary.missing_estimate, 2);
    }

    #[test]
    fn test_summary_empty_stream() {
        let summary = StreamTracker::new(1).summary();
        assert_eq!(summary.sequence_range, None);
        assert_eq!(summary.loss_rate, None);
        assert_eq!(summary.duplication_rate, 0.0);
    }
}
