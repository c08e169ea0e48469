//! # FRER Core
//!
//! Building blocks for exercising IEEE 802.1CB Frame Replication and
//! Elimination for Reliability: an R-TAG codec, per-stream sequence
//! tracking, run-level analysis and a paced traffic generator.
//!
//! ## Modules
//!
//! - `constants`: Wire constants and analysis defaults
//! - `types`: Core types (RTag, FrameView, EthernetView, MacAddr)
//! - `rtag`: R-TAG encoding and decoding
//! - `tracker`: Per-stream duplicate and gap detection
//! - `analyzer`: Stream registry, global counters and run reports
//! - `generator`: Sequence-numbered traffic generation
//! - `session`: Capture loop over a frame source

#![warn(missing_docs)]

pub mod analyzer;
pub mod constants;
pub mod error;
pub mod generator;
pub mod rtag;
pub mod session;
pub mod tracker;
pub mod types;

// Re-export commonly used types
pub use analyzer::{AnalysisAggregator, AnalyzerConfig, RunReport};
pub use error::FrerError;
pub use generator::{FrameSink, SendPlan, SendReport, TrafficGenerator};
pub use session::{CaptureLimits, FrameSource, Received};
pub use tracker::{Outcome, StreamTracker};
pub use types::{FrameView, MacAddr, RTag, StopReason};

/// Result type alias for FRER operations
pub type Result<T> = core::result::Result<T, FrerError>;
