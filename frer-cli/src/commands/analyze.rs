use crate::io::{self, Endpoint};
use crate::ReportFormat;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use frer_core::analyzer::FrameObservation;
use frer_core::session::{run_capture, CaptureOutcome};
use frer_core::tracker::StreamSummary;
use frer_core::{AnalysisAggregator, AnalyzerConfig, CaptureLimits, Outcome, RunReport, StopReason};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Everything the analyze command needs
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub endpoint: Endpoint,
    pub config: AnalyzerConfig,
    pub limits: CaptureLimits,
    pub format: ReportFormat,
    /// Also write the JSON report here
    pub report_path: Option<PathBuf>,
    /// Suppress per-frame lines
    pub quiet: bool,
}

/// One log line per tagged frame
fn frame_line(obs: &FrameObservation) -> String {
    let status = match obs.observation.outcome {
        Outcome::New => "NEW",
        Outcome::Duplicate => "DUPLICATE",
    };
    let mut line = format!(
        "Frame #{:6} | Stream: {:4} | Seq: {:6} | {}",
        obs.frame_number, obs.stream_id, obs.observation.sequence, status
    );
    if let Some(gap) = obs.observation.gap {
        line.push_str(&format!(" [GAP: {}]", gap));
    }
    line
}

/// Capture until a stop condition and build the report.
///
/// The source is opened before any stream state exists, so a privilege
/// or open failure never yields a partial report.
pub fn run(opts: &AnalyzeOptions, cancel: &AtomicBool) -> Result<(RunReport, CaptureOutcome)> {
    opts.config.validate().context("Invalid analyzer configuration")?;
    opts.limits.validate().context("Invalid capture limits")?;

    let mut source = io::open_source(&opts.endpoint)
        .with_context(|| format!("Failed to open {}", opts.endpoint))?;

    let mut aggregator = AnalysisAggregator::with_config(opts.config.clone());
    let quiet = opts.quiet;
    let mut outcome = run_capture(&mut aggregator, source.as_mut(), &opts.limits, cancel, |obs| {
        if !quiet {
            info!("{}", frame_line(obs));
        }
    });

    // A blocking read cut short by a signal surfaces as a source error
    if outcome.stop.is_failure() && cancel.load(Ordering::Relaxed) {
        debug!("Source error after interrupt: {}", outcome.stop);
        outcome.stop = StopReason::Interrupted;
    }

    Ok((aggregator.finalize(), outcome))
}

pub fn execute(opts: &AnalyzeOptions, cancel: &AtomicBool) -> Result<()> {
    info!("Starting FRER traffic capture on {}", opts.endpoint);
    if let Some(id) = opts.config.target_stream {
        info!("Target stream ID: {}", id);
    }
    if opts.limits.count == 0 {
        info!("Count: unlimited");
    } else {
        info!("Count: {}", opts.limits.count);
    }
    match opts.limits.timeout {
        Some(t) => info!("Timeout: {} seconds", t.as_secs()),
        None => info!("Timeout: none"),
    }

    let (report, outcome) = run(opts, cancel)?;

    match &outcome.stop {
        StopReason::Interrupted => warn!("Capture interrupted by user"),
        StopReason::Failed(e) => warn!("Capture error: {}", e),
        stop => debug!("Capture ended: {} after {} frames", stop, outcome.frames),
    }

    match opts.format {
        ReportFormat::Text => print_report(&report),
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .with_context(|| "Failed to serialize run report")?;
            println!("{}", json);
        }
    }

    if let Some(path) = &opts.report_path {
        let json = serde_json::to_string_pretty(&report)
            .with_context(|| "Failed to serialize run report")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report file: {}", path.display()))?;
        info!("Report written to: {}", path.display());
    }

    if let StopReason::Failed(e) = outcome.stop {
        bail!("Capture failed after {} frames: {}", outcome.frames, e);
    }
    Ok(())
}

fn print_stream(summary: &StreamSummary) {
    println!("\n  Stream {}:", summary.stream_id);
    println!("    Total frames:      {}", summary.frame_count);
    println!("    Unique sequences:  {}", summary.unique_sequences);
    println!("    Duplicates:        {}", summary.duplicate_count);
    if summary.frame_count > 0 {
        println!("    Duplication rate:  {:.2}%", summary.duplication_rate * 100.0);
    }
    if summary.gap_count > 0 {
        println!(
            "    Gaps:              {} (largest {}, ~{} missing)",
            summary.gap_count, summary.largest_gap, summary.missing_estimate
        );
    }
    if let (Some(min), Some(max), Some(range), Some(loss)) = (
        summary.min_sequence,
        summary.max_sequence,
        summary.sequence_range,
        summary.loss_rate,
    ) {
        println!("    Sequence range:    {} - {}", min, max);
        println!("    Expected: {}, Received: {}", range, summary.unique_sequences);
        println!("    Loss rate:         {:.2}%", loss * 100.0);
    }
}

pub fn print_report(report: &RunReport) {
    println!("\n=== FRER Traffic Analysis ===");
    println!("Duration:          {:.2} seconds", report.elapsed.as_secs_f64());
    println!("Total frames:      {}", report.total_frames);
    println!("R-TAG frames:      {}", report.tagged_frames);
    println!("Duplicate frames:  {}", report.duplicate_frames);
    println!("Sequence gaps:     {}", report.gap_events);
    if report.tagged_frames > 0 {
        println!("Duplication rate:  {:.2}%", report.overall_duplication_rate * 100.0);
    }
    println!("Capture rate:      {:.1} fps", report.frames_per_second());

    if let Some(id) = report.target_stream {
        if !report.target_observed {
            println!("{}", format!("Target stream {} was not observed", id).yellow());
        }
    }

    if !report.streams.is_empty() {
        println!("\nPer-stream statistics:");
        for summary in report.streams.values() {
            print_stream(summary);
        }
    }

    println!();
    if report.replication_observed {
        println!("{}", "FRER replication working: duplicates detected".green());
    } else {
        println!("{}", "No duplicates detected - check FRER configuration".yellow());
    }

    if report.elimination_clean {
        println!("{}", "FRER elimination working: no sequence gaps".green());
    } else if report.gap_events > 0 {
        println!("{}", format!("Sequence gaps detected: {}", report.gap_events).red());
    } else {
        println!(
            "{}",
            format!("Too few sequences ({}) to judge elimination", report.unique_sequences).yellow()
        );
    }
    println!();
}
