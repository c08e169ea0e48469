//! Sequence-numbered FRER test traffic generation
//!
//! Generated frames use the layout
//! `DMAC(6) | SMAC(6) | 0x8100 | TCI(2) | R-TAG(6) | payload`, where the
//! payload is `"FRER_TEST_"`, a 32-bit frame counter, and `'X'` padding.

use crate::constants::{
    DEFAULT_PAYLOAD_SIZE, DEFAULT_VLAN_ID, GENERATOR_PCP, MAX_VLAN_ID, PAYLOAD_FILL,
    PAYLOAD_MARKER, PROGRESS_INTERVAL, RTAG_SIZE, TPID_CTAG, VLAN_TAG_SIZE,
};
use crate::error::FrerError;
use crate::rtag;
use crate::types::{MacAddr, StopReason, VlanTag};
use bytes::{BufMut, Bytes, BytesMut};
use hashbrown::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[cfg(feature = "logging")]
use tracing::{info, warn};

/// Largest payload that keeps a tagged frame within a 1500-byte MTU
pub const MAX_PAYLOAD_SIZE: usize = 1500 - (RTAG_SIZE - 2);

/// Longest single sleep while pacing; bounds interrupt latency
pub const PACING_SLICE: Duration = Duration::from_millis(50);

const HEADER_SIZE: usize = 12 + VLAN_TAG_SIZE;

/// Destination for generated frames
pub trait FrameSink {
    /// Hand one complete Ethernet frame to the medium
    fn transmit(&mut self, frame: &[u8]) -> Result<(), FrerError>;

    /// Push out anything still buffered. Called once after the last frame;
    /// a frame only counts as delivered once this succeeds.
    fn finish(&mut self) -> Result<(), FrerError> {
        Ok(())
    }
}

/// Collects frames in memory
impl FrameSink for Vec<Bytes> {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), FrerError> {
        self.push(Bytes::copy_from_slice(frame));
        Ok(())
    }
}

/// What to send in one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPlan {
    /// Stream id written into every R-TAG
    pub stream_id: u16,
    /// Number of frames to emit
    pub count: u64,
    /// Frames per second, 0 sends as fast as the sink accepts
    pub rate: u32,
    /// Destination MAC
    pub destination: MacAddr,
    /// 802.1Q VLAN id
    pub vlan_id: u16,
    /// Bytes after the R-TAG
    pub payload_size: usize,
}

impl Default for SendPlan {
    fn default() -> Self {
        Self {
            stream_id: 1,
            count: 1000,
            rate: 1000,
            destination: MacAddr::BROADCAST,
            vlan_id: DEFAULT_VLAN_ID,
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }
}

impl SendPlan {
    /// Check ranges
    pub fn validate(&self) -> Result<(), FrerError> {
        if self.vlan_id > MAX_VLAN_ID {
            return Err(FrerError::InvalidConfig(format!(
                "VLAN id {} exceeds {}",
                self.vlan_id, MAX_VLAN_ID
            )));
        }
        if self.payload_size > MAX_PAYLOAD_SIZE {
            return Err(FrerError::InvalidConfig(format!(
                "Payload size {} exceeds {}",
                self.payload_size, MAX_PAYLOAD_SIZE
            )));
        }
        Ok(())
    }

    /// Gap between two frames, `None` when unpaced
    pub fn interval(&self) -> Option<Duration> {
        (self.rate > 0).then(|| Duration::from_secs_f64(1.0 / self.rate as f64))
    }
}

/// Outcome of a [`TrafficGenerator::send`] run
#[derive(Debug, Clone, PartialEq)]
pub struct SendReport {
    /// Stream that was sent
    pub stream_id: u16,
    /// Frames asked for
    pub requested: u64,
    /// Frames the sink accepted
    pub sent: u64,
    /// Wall time of the run
    pub elapsed: Duration,
    /// Sequence of the first frame sent
    pub first_sequence: Option<u16>,
    /// Sequence of the last frame sent
    pub last_sequence: Option<u16>,
    /// Why the run ended
    pub stop: StopReason,
}

impl SendReport {
    /// Achieved frames per second
    pub fn effective_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.sent as f64 / secs
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StreamCounter {
    next_sequence: u16,
    emitted: u64,
}

/// Builds R-TAG frames with one wrapping sequence counter per stream
#[derive(Debug, Clone)]
pub struct TrafficGenerator {
    source: MacAddr,
    counters: HashMap<u16, StreamCounter>,
}

impl TrafficGenerator {
    /// Generator stamping `source` as the source MAC
    pub fn new(source: MacAddr) -> Self {
        Self {
            source,
            counters: HashMap::new(),
        }
    }

    /// Source MAC of generated frames
    pub fn source(&self) -> MacAddr {
        self.source
    }

    /// Sequence the next frame of `stream_id` will carry
    pub fn next_sequence(&self, stream_id: u16) -> u16 {
        self.counters
            .get(&stream_id)
            .map_or(0, |c| c.next_sequence)
    }

    /// Build the next frame of a stream and advance its counter
    pub fn next_frame(
        &mut self,
        stream_id: u16,
        destination: MacAddr,
        vlan_id: u16,
        payload_size: usize,
    ) -> Bytes {
        let counter = self.counters.entry(stream_id).or_default();
        let sequence = counter.next_sequence;
        let emitted = counter.emitted;

        counter.next_sequence = sequence.wrapping_add(1);
        counter.emitted += 1;

        let body_len = payload_size.max(PAYLOAD_MARKER.len() + 4);
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + RTAG_SIZE + body_len);

        buf.put_slice(&destination.octets());
        buf.put_slice(&self.source.octets());
        buf.put_u16(TPID_CTAG);
        buf.put_u16(VlanTag::ctag(GENERATOR_PCP, vlan_id).tci());
        buf.put_slice(&rtag::encode(sequence, stream_id));

        buf.put_slice(PAYLOAD_MARKER);
        buf.put_u32(emitted as u32);
        buf.put_bytes(PAYLOAD_FILL, body_len - PAYLOAD_MARKER.len() - 4);

        buf.freeze()
    }

    /// Emit `plan.count` frames through `sink`, pacing at `plan.rate`.
    ///
    /// A sink error aborts the run; frames already sent stay counted. The
    /// run also stops once `cancel` is set, checked before every frame and
    /// during pacing sleeps. Unless a transmit already failed, the sink is
    /// finished at the end and a finish error turns the run into a failure.
    pub fn send<S: FrameSink + ?Sized>(
        &mut self,
        sink: &mut S,
        plan: &SendPlan,
        cancel: &AtomicBool,
    ) -> SendReport {
        let started = Instant::now();
        let interval = plan.interval();
        let mut report = SendReport {
            stream_id: plan.stream_id,
            requested: plan.count,
            sent: 0,
            elapsed: Duration::ZERO,
            first_sequence: None,
            last_sequence: None,
            stop: StopReason::Completed,
        };

        #[cfg(feature = "logging")]
        info!(
            "Sending {} frames on stream {} at {} pps (VLAN {}, dst {})",
            plan.count, plan.stream_id, plan.rate, plan.vlan_id, plan.destination
        );

        for i in 0..plan.count {
            if cancel.load(Ordering::Relaxed) {
                report.stop = StopReason::Interrupted;
                break;
            }

            let sequence = self.next_sequence(plan.stream_id);
            let frame =
                self.next_frame(plan.stream_id, plan.destination, plan.vlan_id, plan.payload_size);

            if let Err(e) = sink.transmit(&frame) {
                #[cfg(feature = "logging")]
                warn!("Transmission failed after {} frames: {}", report.sent, e);

                report.stop = StopReason::Failed(e);
                break;
            }

            report.sent += 1;
            report.first_sequence.get_or_insert(sequence);
            report.last_sequence = Some(sequence);

            #[cfg(feature = "logging")]
            {
                if report.sent % PROGRESS_INTERVAL == 0 {
                    let secs = started.elapsed().as_secs_f64();
                    let rate = if secs > 0.0 { report.sent as f64 / secs } else { 0.0 };
                    info!(
                        "Sent: {}/{} | Rate: {:.1} pps | Seq: {}",
                        report.sent, plan.count, rate, sequence
                    );
                }
            }

            if let Some(interval) = interval {
                if i + 1 < plan.count && !pause(interval, cancel) {
                    report.stop = StopReason::Interrupted;
                    break;
                }
            }
        }

        if !report.stop.is_failure() {
            if let Err(e) = sink.finish() {
                #[cfg(feature = "logging")]
                warn!("Flushing the sink failed after {} frames: {}", report.sent, e);

                report.stop = StopReason::Failed(e);
            }
        }

        report.elapsed = started.elapsed();
        report
    }
}

/// Sleep for `interval` in slices; `false` if `cancel` was set meanwhile
fn pause(interval: Duration, cancel: &AtomicBool) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(PACING_SLICE));
    }
}
