//! Run-level aggregation of per-stream sequence tracking

use crate::constants::{GAP_NOISE_THRESHOLD, MIN_SAMPLE_SIZE};
use crate::error::FrerError;
use crate::rtag;
use crate::tracker::{Observation, StreamSummary, StreamTracker};
use crate::types::FrameView;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[cfg(feature = "logging")]
use tracing::debug;

/// Tunables of the analysis engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Forward distances at or above this are noise, not gaps
    pub gap_noise_threshold: u16,

    /// Unique sequences needed before elimination can be called clean
    pub min_sample_size: usize,

    /// Stream the operator is interested in. Tracking is never filtered by it.
    pub target_stream: Option<u16>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            gap_noise_threshold: GAP_NOISE_THRESHOLD,
            min_sample_size: MIN_SAMPLE_SIZE,
            target_stream: None,
        }
    }
}

impl AnalyzerConfig {
    /// Reject values that make the analysis meaningless
    pub fn validate(&self) -> Result<(), FrerError> {
        if self.gap_noise_threshold == 0 {
            return Err(FrerError::InvalidConfig(
                "gap noise threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// A tagged frame as classified by the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameObservation {
    /// 1-based index among all frames observed, tagged or not
    pub frame_number: u64,

    /// Stream the frame belongs to
    pub stream_id: u16,

    /// Per-stream classification
    pub observation: Observation,
}

/// Owns one [`StreamTracker`] per stream id and the global counters.
///
/// Frames must be fed in the order they were observed on the wire.
#[derive(Debug)]
pub struct AnalysisAggregator {
    config: AnalyzerConfig,
    started: Instant,
    total_frames: u64,
    tagged_frames: u64,
    duplicate_frames: u64,
    gap_events: u64,
    streams: HashMap<u16, StreamTracker>,
}

impl AnalysisAggregator {
    /// Aggregator with default configuration
    pub fn new() -> Self {
        Self::with_config(AnalyzerConfig::default())
    }

    /// Aggregator with the given configuration; the run clock starts now
    pub fn with_config(config: AnalyzerConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            total_frames: 0,
            tagged_frames: 0,
            duplicate_frames: 0,
            gap_events: 0,
            streams: HashMap::new(),
        }
    }

    /// Frames observed so far, tagged or not
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Frames that carried an R-TAG
    pub fn tagged_frames(&self) -> u64 {
        self.tagged_frames
    }

    /// Process one captured frame.
    ///
    /// Returns `None` for frames without an R-TAG; they still count
    /// towards the total.
    pub fn observe<F: FrameView + ?Sized>(&mut self, frame: &F) -> Option<FrameObservation> {
        self.total_frames += 1;

        let tag = rtag::decode(frame)?;
        self.tagged_frames += 1;

        let threshold = self.config.gap_noise_threshold;
        let tracker = self.streams.entry(tag.stream_id).or_insert_with(|| {
            #[cfg(feature = "logging")]
            debug!("New stream {} (first sequence {})", tag.stream_id, tag.sequence);

            StreamTracker::with_threshold(tag.stream_id, threshold)
        });

        let observation = tracker.observe(tag.sequence);
        if observation.is_duplicate() {
            self.duplicate_frames += 1;
        }
        if observation.gap.is_some() {
            self.gap_events += 1;
        }

        Some(FrameObservation {
            frame_number: self.total_frames,
            stream_id: tag.stream_id,
            observation,
        })
    }

    /// Build the report for everything observed so far
    pub fn finalize(&self) -> RunReport {
        let streams: BTreeMap<u16, StreamSummary> = self
            .streams
            .iter()
            .map(|(id, tracker)| (*id, tracker.summary()))
            .collect();

        let unique_sequences: u64 = streams.values().map(|s| s.unique_sequences).sum();

        let overall_duplication_rate = if self.tagged_frames > 0 {
            self.duplicate_frames as f64 / self.tagged_frames as f64
        } else {
            0.0
        };

        let target_observed = self
            .config
            .target_stream
            .map(|id| streams.contains_key(&id))
            .unwrap_or(false);

        RunReport {
            total_frames: self.total_frames,
            tagged_frames: self.tagged_frames,
            duplicate_frames: self.duplicate_frames,
            gap_events: self.gap_events,
            unique_sequences,
            elapsed: self.started.elapsed(),
            overall_duplication_rate,
            replication_observed: self.duplicate_frames > 0,
            elimination_clean: self.gap_events == 0
                && unique_sequences >= self.config.min_sample_size as u64,
            target_stream: self.config.target_stream,
            target_observed,
            streams,
        }
    }
}

impl Default for AnalysisAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate result of one capture run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// All frames captured, including untagged ones
    pub total_frames: u64,
    /// Frames carrying an R-TAG
    pub tagged_frames: u64,
    /// Tagged frames whose sequence was already seen on their stream
    pub duplicate_frames: u64,
    /// Gap events across all streams
    pub gap_events: u64,
    /// Distinct sequences summed over streams
    pub unique_sequences: u64,
    /// Time since the aggregator was created
    pub elapsed: Duration,
    /// `duplicate_frames / tagged_frames`
    pub overall_duplication_rate: f64,
    /// At least one duplicate was seen
    pub replication_observed: bool,
    /// No gaps and enough unique sequences to say so
    pub elimination_clean: bool,
    /// The stream the operator asked about
    pub target_stream: Option<u16>,
    /// Whether the target stream carried any frame
    pub target_observed: bool,
    /// Per-stream summaries ordered by stream id
    pub streams: BTreeMap<u16, StreamSummary>,
}

impl RunReport {
    /// Observed frame rate over the run
    pub fn frames_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_frames as f64 / secs
        } else {
            0.0
        }
    }
}
