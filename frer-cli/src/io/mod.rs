//! Frame source and sink adapters

pub mod pcap;
#[cfg(target_os = "linux")]
pub mod raw;

use frer_core::{FrameSink, FrameSource, FrerError, MacAddr};
use std::fs;

/// Where frames are read from or written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Live network interface (raw socket, needs root)
    Interface(String),
    /// Legacy pcap file, `-` for stdin/stdout
    File(String),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Interface(name) => write!(f, "interface {}", name),
            Endpoint::File(path) if path == "-" => write!(f, "stdin"),
            Endpoint::File(path) => write!(f, "file {}", path),
        }
    }
}

/// Open a frame source. Privilege is checked before anything is opened.
pub fn open_source(endpoint: &Endpoint) -> Result<Box<dyn FrameSource>, FrerError> {
    match endpoint {
        Endpoint::File(path) => Ok(Box::new(pcap::PcapFileSource::open(path)?)),
        Endpoint::Interface(name) => open_raw(name).map(|s| Box::new(s) as Box<dyn FrameSource>),
    }
}

/// Open a frame sink
pub fn open_sink(endpoint: &Endpoint) -> Result<Box<dyn FrameSink>, FrerError> {
    match endpoint {
        Endpoint::File(path) if path == "-" => Ok(Box::new(pcap::PcapFileSink::from_writer(
            Box::new(std::io::stdout()),
        )?)),
        Endpoint::File(path) => Ok(Box::new(pcap::PcapFileSink::create(path)?)),
        Endpoint::Interface(name) => open_raw(name).map(|s| Box::new(s) as Box<dyn FrameSink>),
    }
}

#[cfg(target_os = "linux")]
fn open_raw(name: &str) -> Result<raw::RawSocket, FrerError> {
    raw::RawSocket::open(name)
}

#[cfg(not(target_os = "linux"))]
fn open_raw(name: &str) -> Result<std::convert::Infallible, FrerError> {
    Err(FrerError::InvalidConfig(format!(
        "live interface {} is only supported on Linux; use a pcap file",
        name
    )))
}

/// Hardware address of a network interface, read from sysfs
pub fn interface_mac(name: &str) -> Result<MacAddr, FrerError> {
    let path = format!("/sys/class/net/{}/address", name);
    let text = fs::read_to_string(&path).map_err(|e| FrerError::Io(format!("{}: {}", path, e)))?;
    text.trim().parse()
}
