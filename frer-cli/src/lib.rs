//! Library entry for frer-cli used by integration tests and embedding.

pub mod commands;
pub mod io;
pub mod signal;

pub use io::Endpoint;

/// Shape of the final report printed by analyze
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    /// Human-readable summary with colored verdicts
    #[default]
    Text,
    /// The run report as pretty-printed JSON
    Json,
}
