//! Capture loop: funnels a frame source into the aggregator

use crate::analyzer::{AnalysisAggregator, FrameObservation};
use crate::error::FrerError;
use crate::types::StopReason;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// Default upper bound on one blocking receive
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Result of one receive attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    /// A complete Ethernet frame
    Frame(Bytes),
    /// Nothing arrived within the wait
    Idle,
    /// The source is exhausted
    Closed,
}

/// Where captured frames come from
pub trait FrameSource {
    /// Wait at most `wait` for the next frame
    fn recv(&mut self, wait: Duration) -> Result<Received, FrerError>;
}

/// Replays frames held in memory, then reports [`Received::Closed`]
#[derive(Debug)]
pub struct MemorySource<I> {
    frames: I,
}

impl<I: Iterator<Item = Bytes>> MemorySource<I> {
    /// Source over any frame iterator
    pub fn new<T: IntoIterator<IntoIter = I>>(frames: T) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl<I: Iterator<Item = Bytes>> FrameSource for MemorySource<I> {
    fn recv(&mut self, _wait: Duration) -> Result<Received, FrerError> {
        Ok(self.frames.next().map_or(Received::Closed, Received::Frame))
    }
}

/// External stop conditions of a capture run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureLimits {
    /// Frames to capture, tagged or not; 0 is unlimited
    pub count: u64,
    /// Overall run time
    pub timeout: Option<Duration>,
    /// Longest single wait on the source
    pub poll_interval: Duration,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            count: 0,
            timeout: Some(Duration::from_secs(60)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl CaptureLimits {
    /// Check ranges
    pub fn validate(&self) -> Result<(), FrerError> {
        if self.poll_interval.is_zero() {
            return Err(FrerError::InvalidConfig("poll interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// How a capture run ended
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    /// Frames pulled from the source during this run
    pub frames: u64,
    /// Why the loop stopped
    pub stop: StopReason,
}

/// Pull frames from `source` in arrival order and feed each to `aggregator`.
///
/// Stops on the frame limit, the timeout, `cancel`, end of source, or a
/// source error. The aggregator keeps everything observed up to that
/// point, so the caller can always finalize a report. `on_frame` is
/// called for every tagged frame.
pub fn run_capture<S, F>(
    aggregator: &mut AnalysisAggregator,
    source: &mut S,
    limits: &CaptureLimits,
    cancel: &AtomicBool,
    mut on_frame: F,
) -> CaptureOutcome
where
    S: FrameSource + ?Sized,
    F: FnMut(&FrameObservation),
{
    let deadline = limits.timeout.map(|t| Instant::now() + t);
    let mut frames = 0u64;

    let stop = loop {
        if cancel.load(Ordering::Relaxed) {
            break StopReason::Interrupted;
        }
        if limits.count > 0 && frames >= limits.count {
            break StopReason::FrameLimit;
        }

        let wait = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break StopReason::Timeout;
                }
                (deadline - now).min(limits.poll_interval)
            }
            None => limits.poll_interval,
        };

        match source.recv(wait) {
            Ok(Received::Frame(frame)) => {
                frames += 1;
                if let Some(observation) = aggregator.observe(&frame) {
                    on_frame(&observation);
                }
            }
            Ok(Received::Idle) => {}
            Ok(Received::Closed) => {
                #[cfg(feature = "logging")]
                debug!("Frame source closed after {} frames", frames);

                break StopReason::SourceClosed;
            }
            Err(e) => {
                #[cfg(feature = "logging")]
                warn!("Capture aborted after {} frames: {}", frames, e);

                break StopReason::Failed(e);
            }
        }
    };

    CaptureOutcome { frames, stop }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::TrafficGenerator;
    use crate::types::MacAddr;

    struct IdleSource;

    impl FrameSource for IdleSource {
        fn recv(&mut self, wait: Duration) -> Result<Received, FrerError> {
            std::thread::sleep(wait);
            Ok(Received::Idle)
        }
    }

    struct BrokenSource {
        frames: Vec<Bytes>,
    }

    impl FrameSource for BrokenSource {
        fn recv(&mut self, _wait: Duration) -> Result<Received, FrerError> {
            match self.frames.pop() {
                Some(f) => Ok(Received::Frame(f)),
                None => Err(FrerError::Capture("interface went down".into())),
            }
        }
    }

    fn frames(n: usize) -> Vec<Bytes> {
        let mut gen = TrafficGenerator::new(MacAddr::ZERO);
        (0..n)
            .map(|_| gen.next_frame(1, MacAddr::BROADCAST, 100, 32))
            .collect()
    }

    #[test]
    fn test_runs_until_source_closes() {
        let mut agg = AnalysisAggregator::new();
        let mut source = MemorySource::new(frames(10));
        let mut seen = Vec::new();

        let outcome = run_capture(
            &mut agg,
            &mut source,
            &CaptureLimits::default(),
            &AtomicBool::new(false),
            |obs| seen.push(obs.observation.sequence),
        );

        assert_eq!(outcome.stop, StopReason::SourceClosed);
        assert_eq!(outcome.frames, 10);
        assert_eq!(seen, (0..10).collect::<Vec<u16>>());
        assert_eq!(agg.tagged_frames(), 10);
    }

    #[test]
    fn test_frame_limit() {
        let mut agg = AnalysisAggregator::new();
        let mut source = MemorySource::new(frames(10));
        let limits = CaptureLimits {
            count: 4,
            ..CaptureLimits::default()
        };

        let outcome = run_capture(&mut agg, &mut source, &limits, &AtomicBool::new(false), |_| {});
        assert_eq!(outcome.stop, StopReason::FrameLimit);
        assert_eq!(agg.total_frames(), 4);
    }

    #[test]
    fn test_timeout_on_idle_source() {
        let mut agg = AnalysisAggregator::new();
        let limits = CaptureLimits {
            timeout: Some(Duration::from_millis(30)),
            poll_interval: Duration::from_millis(10),
            ..CaptureLimits::default()
        };

        let started = Instant::now();
        let outcome = run_capture(&mut agg, &mut IdleSource, &limits, &AtomicBool::new(false), |_| {});
        assert_eq!(outcome.stop, StopReason::Timeout);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(outcome.frames, 0);
    }

    #[test]
    fn test_interrupt_keeps_state() {
        let mut agg = AnalysisAggregator::new();
        agg.observe(&frames(1)[0]);
        let mut source = MemorySource::new(frames(3));

        let outcome = run_capture(
            &mut agg,
            &mut source,
            &CaptureLimits::default(),
            &AtomicBool::new(true),
            |_| {},
        );
        assert_eq!(outcome.stop, StopReason::Interrupted);
        assert_eq!(agg.finalize().tagged_frames, 1);
    }

    #[test]
    fn test_source_error_preserves_report() {
        let mut agg = AnalysisAggregator::new();
        let mut source = BrokenSource { frames: frames(3) };

        let outcome = run_capture(
            &mut agg,
            &mut source,
            &CaptureLimits::default(),
            &AtomicBool::new(false),
            |_| {},
        );
        assert!(outcome.stop.is_failure());
        assert_eq!(outcome.frames, 3);
        assert_eq!(agg.finalize().tagged_frames, 3);
    }

    #[test]
    fn test_limits_validation() {
        assert!(CaptureLimits::default().validate().is_ok());
        let bad = CaptureLimits {
            poll_interval: Duration::ZERO,
            ..CaptureLimits::default()
        };
        assert!(bad.validate().is_err());
    }
}
