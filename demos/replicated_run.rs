//! Simulates a FRER merge point that forwards both copies of every frame
//! and loses a few, then prints what the analyzer makes of it.

use bytes::Bytes;
use frer_core::{
    session::{run_capture, MemorySource},
    AnalysisAggregator, CaptureLimits, MacAddr, SendPlan, TrafficGenerator,
};
use std::sync::atomic::AtomicBool;

fn main() {
    let never = AtomicBool::new(false);

    println!("=== Generating stream 1 ===");
    let mut gen = TrafficGenerator::new(MacAddr([0x02, 0, 0, 0, 0, 0x01]));
    let mut wire: Vec<Bytes> = Vec::new();
    let plan = SendPlan {
        count: 200,
        rate: 0,
        ..SendPlan::default()
    };
    let sent = gen.send(&mut wire, &plan, &never);
    println!("Sent {} frames ({})", sent.sent, sent.stop);

    // Path A delivers everything, path B loses every 50th frame
    let mut capture = Vec::new();
    for (i, frame) in wire.into_iter().enumerate() {
        capture.push(frame.clone());
        if i % 50 != 49 {
            capture.push(frame);
        }
    }
    println!("Merged capture holds {} frames", capture.len());

    let mut agg = AnalysisAggregator::new();
    let mut source = MemorySource::new(capture);
    let outcome = run_capture(&mut agg, &mut source, &CaptureLimits::default(), &never, |obs| {
        if let Some(gap) = obs.observation.gap {
            println!("Frame {}: gap of {}", obs.frame_number, gap);
        }
    });
    println!("Capture ended: {}", outcome.stop);

    let report = agg.finalize();
    println!("\n=== Report ===");
    println!("Tagged frames:     {}", report.tagged_frames);
    println!("Duplicate frames:  {}", report.duplicate_frames);
    println!("Gap events:        {}", report.gap_events);
    println!("Duplication rate:  {:.2}%", report.overall_duplication_rate * 100.0);
    println!("Replication:       {}", report.replication_observed);
    println!("Elimination clean: {}", report.elimination_clean);
}
