//! Integration tests for the complete generate → medium → capture → analyze flow

use bytes::Bytes;
use frer_core::{
    session::{run_capture, MemorySource},
    AnalysisAggregator, AnalyzerConfig, CaptureLimits, MacAddr, SendPlan, StopReason,
    TrafficGenerator,
};
use std::sync::atomic::AtomicBool;

fn generate(stream_id: u16, count: u64) -> Vec<Bytes> {
    let mut gen = TrafficGenerator::new(MacAddr([0x02, 0, 0, 0, 0, 0x01]));
    let mut wire: Vec<Bytes> = Vec::new();
    let plan = SendPlan {
        stream_id,
        count,
        rate: 0,
        ..SendPlan::default()
    };

    let report = gen.send(&mut wire, &plan, &AtomicBool::new(false));
    assert_eq!(report.stop, StopReason::Completed);
    assert_eq!(report.sent, count);
    wire
}

fn analyze(wire: Vec<Bytes>) -> frer_core::RunReport {
    let mut agg = AnalysisAggregator::with_config(AnalyzerConfig {
        target_stream: Some(1),
        ..AnalyzerConfig::default()
    });
    let mut source = MemorySource::new(wire);
    let outcome = run_capture(
        &mut agg,
        &mut source,
        &CaptureLimits::default(),
        &AtomicBool::new(false),
        |_| {},
    );
    assert_eq!(outcome.stop, StopReason::SourceClosed);
    agg.finalize()
}

#[test]
fn test_end_to_end_clean_run() {
    let report = analyze(generate(1, 10));

    assert_eq!(report.tagged_frames, 10);
    assert_eq!(report.duplicate_frames, 0);
    assert_eq!(report.gap_events, 0);
    assert!(report.target_observed);
    assert!(!report.replication_observed);
    assert!(report.elimination_clean);

    let stream = &report.streams[&1];
    assert_eq!(stream.min_sequence, Some(0));
    assert_eq!(stream.max_sequence, Some(9));
    assert_eq!(stream.sequence_range, Some(10));
    assert_eq!(stream.loss_rate, Some(0.0));
}

#[test]
fn test_end_to_end_replicated_run() {
    // Each frame arrives twice, the copy right after the original
    let wire: Vec<Bytes> = generate(1, 10)
        .into_iter()
        .flat_map(|f| [f.clone(), f])
        .collect();

    let report = analyze(wire);

    assert_eq!(report.tagged_frames, 20);
    assert_eq!(report.duplicate_frames, 10);
    assert_eq!(report.gap_events, 0);
    assert_eq!(report.unique_sequences, 10);
    assert!(report.replication_observed);
    assert!(report.elimination_clean);
    assert!((report.overall_duplication_rate - 0.5).abs() < 1e-9);
    assert!((report.streams[&1].duplication_rate - 0.5).abs() < 1e-9);
}

#[test]
fn test_end_to_end_lossy_run() {
    // Drop every 5th frame
    let wire: Vec<Bytes> = generate(1, 20)
        .into_iter()
        .enumerate()
        .filter(|(i, _)| i % 5 != 4)
        .map(|(_, f)| f)
        .collect();

    let report = analyze(wire);

    assert_eq!(report.tagged_frames, 16);
    // 4, 9 and 14 are in the middle; 19 is the tail and cannot be seen as a gap
    assert_eq!(report.gap_events, 3);
    assert!(!report.elimination_clean);

    let stream = &report.streams[&1];
    assert_eq!(stream.sequence_range, Some(19));
    assert_eq!(stream.unique_sequences, 16);
    assert!((stream.loss_rate.unwrap() - 3.0 / 19.0).abs() < 1e-9);
}

#[test]
fn test_end_to_end_mixed_traffic() {
    let mut wire = Vec::new();
    let one = generate(1, 12);
    let two = generate(2, 12);
    for (a, b) in one.into_iter().zip(two) {
        wire.push(a);
        wire.push(Bytes::from_static(&[0u8; 60]));
        wire.push(b);
    }

    let report = analyze(wire);

    assert_eq!(report.total_frames, 36);
    assert_eq!(report.tagged_frames, 24);
    assert_eq!(report.streams.len(), 2);
    assert_eq!(report.gap_events, 0);
    assert!(report.elimination_clean);
}

#[test]
fn test_report_serializes() {
    let report = analyze(generate(1, 3));
    let json = serde_json::to_string(&report).unwrap();
    let back: frer_core::RunReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back.tagged_frames, 3);
    assert_eq!(back.streams[&1].max_sequence, Some(2));
}
