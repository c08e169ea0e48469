use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use frer_cli::commands::{analyze, generate};
use frer_cli::{signal, Endpoint, ReportFormat};
use frer_core::constants::{DEFAULT_PAYLOAD_SIZE, DEFAULT_VLAN_ID};
use frer_core::{AnalyzerConfig, CaptureLimits, MacAddr, SendPlan};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "frer")]
#[command(about = "FRER test toolkit - IEEE 802.1CB R-TAG traffic generation and analysis", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Sink {
    /// Network interface to send on (requires root)
    #[arg(short, long)]
    interface: Option<String>,

    /// Write frames to a pcap file instead (`-` for stdout)
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Source {
    /// Network interface to capture on (requires root)
    #[arg(short, long)]
    interface: Option<String>,

    /// Read frames from a pcap file instead (`-` for stdin)
    #[arg(short = 'r', long)]
    input: Option<String>,
}

fn endpoint(interface: Option<String>, file: Option<String>) -> Endpoint {
    match (interface, file) {
        (Some(name), _) => Endpoint::Interface(name),
        (None, Some(path)) => Endpoint::File(path),
        // clap's group guarantees one of the two
        (None, None) => Endpoint::File("-".to_string()),
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate sequence-numbered R-TAG traffic
    Generate {
        #[command(flatten)]
        sink: Sink,

        /// FRER stream ID
        #[arg(short, long, default_value = "1")]
        stream_id: u16,

        /// Number of frames to send
        #[arg(short, long, default_value = "1000")]
        count: u64,

        /// Frames per second (0 = as fast as possible)
        #[arg(long, default_value = "1000")]
        rate: u32,

        /// Destination MAC address
        #[arg(long, default_value = "ff:ff:ff:ff:ff:ff")]
        dst_mac: MacAddr,

        /// Source MAC address (defaults to the interface address)
        #[arg(long)]
        src_mac: Option<MacAddr>,

        /// VLAN ID
        #[arg(long, default_value_t = DEFAULT_VLAN_ID)]
        vlan: u16,

        /// Payload size in bytes
        #[arg(long, default_value_t = DEFAULT_PAYLOAD_SIZE)]
        payload_size: usize,
    },

    /// Capture R-TAG traffic and report duplicates and gaps
    Analyze {
        #[command(flatten)]
        source: Source,

        /// Stream ID of interest (all streams are tracked)
        #[arg(short, long, default_value = "1")]
        stream_id: u16,

        /// Stop after this many frames (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        count: u64,

        /// Stop after this many seconds (0 = no timeout)
        #[arg(short, long, default_value = "60")]
        timeout: u64,

        /// Report format on stdout
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,

        /// Also write the JSON report to this file
        #[arg(long)]
        json: Option<PathBuf>,

        /// Suppress per-frame output
        #[arg(short, long)]
        quiet: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout may carry frames or JSON, so logs go to stderr
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    signal::install();

    // Execute command
    match cli.command {
        Commands::Generate {
            sink,
            stream_id,
            count,
            rate,
            dst_mac,
            src_mac,
            vlan,
            payload_size,
        } => {
            let opts = generate::GenerateOptions {
                endpoint: endpoint(sink.interface, sink.output),
                plan: SendPlan {
                    stream_id,
                    count,
                    rate,
                    destination: dst_mac,
                    vlan_id: vlan,
                    payload_size,
                },
                source_mac: src_mac,
            };
            generate::execute(&opts, &signal::SHUTDOWN)
        }

        Commands::Analyze {
            source,
            stream_id,
            count,
            timeout,
            format,
            json,
            quiet,
        } => {
            let opts = analyze::AnalyzeOptions {
                endpoint: endpoint(source.interface, source.input),
                config: AnalyzerConfig {
                    target_stream: Some(stream_id),
                    ..AnalyzerConfig::default()
                },
                limits: CaptureLimits {
                    count,
                    timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
                    ..CaptureLimits::default()
                },
                format,
                report_path: json,
                quiet,
            };
            analyze::execute(&opts, &signal::SHUTDOWN)
        }
    }
}
