use crate::io::{self, Endpoint};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use frer_core::{MacAddr, SendPlan, SendReport, TrafficGenerator};
use std::sync::atomic::AtomicBool;
use tracing::{debug, info};

/// Locally administered address used when the sink has no hardware address
pub const DEFAULT_SOURCE_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

/// Everything the generate command needs
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Where frames go
    pub endpoint: Endpoint,
    /// What to send
    pub plan: SendPlan,
    /// Source address override
    pub source_mac: Option<MacAddr>,
}

/// Resolve the source address: explicit, then the interface's own, then the default
fn source_mac(opts: &GenerateOptions) -> MacAddr {
    if let Some(mac) = opts.source_mac {
        return mac;
    }
    match &opts.endpoint {
        Endpoint::Interface(name) => match io::interface_mac(name) {
            Ok(mac) => mac,
            Err(e) => {
                debug!("No hardware address for {}: {}", name, e);
                DEFAULT_SOURCE_MAC
            }
        },
        Endpoint::File(_) => DEFAULT_SOURCE_MAC,
    }
}

/// Send the plan through the endpoint and return what happened
pub fn run(opts: &GenerateOptions, cancel: &AtomicBool) -> Result<SendReport> {
    opts.plan.validate().context("Invalid send plan")?;

    let mut sink = io::open_sink(&opts.endpoint)
        .with_context(|| format!("Failed to open {}", opts.endpoint))?;

    let mut generator = TrafficGenerator::new(source_mac(opts));
    debug!("Source MAC: {}", generator.source());

    Ok(generator.send(sink.as_mut(), &opts.plan, cancel))
}

pub fn execute(opts: &GenerateOptions, cancel: &AtomicBool) -> Result<()> {
    let to_stdout = opts.endpoint == Endpoint::File("-".to_string());

    info!("Generating FRER traffic to {}", opts.endpoint);
    info!("Stream ID: {}", opts.plan.stream_id);
    info!("Count: {} frames", opts.plan.count);
    info!("Rate: {} pps", opts.plan.rate);
    info!("Destination: {}", opts.plan.destination);
    info!("VLAN ID: {}", opts.plan.vlan_id);

    let report = run(opts, cancel)?;

    // Frames own stdout when writing a capture there
    if to_stdout {
        log_report(&report);
    } else {
        print_report(&report);
    }

    if let frer_core::StopReason::Failed(e) = &report.stop {
        bail!("Generation failed after {} frames: {}", report.sent, e);
    }
    Ok(())
}

fn summary_line(report: &SendReport) -> String {
    format!(
        "Sent {}/{} frames in {:.2} s ({:.1} pps), final sequence {}, {}",
        report.sent,
        report.requested,
        report.elapsed.as_secs_f64(),
        report.effective_rate(),
        report
            .last_sequence
            .map_or_else(|| "-".to_string(), |seq| seq.to_string()),
        report.stop
    )
}

/// Stats for runs whose stdout carries the capture
fn log_report(report: &SendReport) {
    info!("{}", summary_line(report));
}

fn print_report(report: &SendReport) {
    println!("\n=== Traffic Generation Complete ===");
    println!("Sent:              {} frames", report.sent);
    println!("Duration:          {:.2} seconds", report.elapsed.as_secs_f64());
    println!("Actual rate:       {:.1} pps", report.effective_rate());
    match report.last_sequence {
        Some(seq) => println!("Final sequence:    {}", seq),
        None => println!("Final sequence:    -"),
    }
    if report.stop.is_failure() || report.sent < report.requested {
        println!("Stopped:           {}", report.stop.to_string().yellow());
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use frer_core::StopReason;
    use std::time::Duration;

    #[test]
    fn test_summary_line() {
        let report = SendReport {
            stream_id: 1,
            requested: 100,
            sent: 40,
            elapsed: Duration::from_secs(2),
            first_sequence: Some(0),
            last_sequence: Some(39),
            stop: StopReason::Interrupted,
        };
        assert_eq!(
            summary_line(&report),
            "Sent 40/100 frames in 2.00 s (20.0 pps), final sequence 39, interrupted"
        );
    }

    #[test]
    fn test_summary_line_nothing_sent() {
        let report = SendReport {
            stream_id: 1,
            requested: 10,
            sent: 0,
            elapsed: Duration::ZERO,
            first_sequence: None,
            last_sequence: None,
            stop: StopReason::Failed(frer_core::FrerError::Transmit("down".into())),
        };
        assert!(summary_line(&report).contains("final sequence -, failed"));
    }
}
