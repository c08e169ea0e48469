//! Legacy pcap files as frame source and sink

use bytes::Bytes;
use frer_core::{FrameSink, FrameSource, FrerError, Received};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, Linktype, PcapBlockOwned, PcapError};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const READ_BUFFER: usize = 65536;
const SNAPLEN: u32 = 65535;
const PCAP_MAGIC: u32 = 0xa1b2_c3d4;

/// Reads frames from a legacy pcap stream (file or stdin)
pub struct PcapFileSource {
    reader: LegacyPcapReader<Box<dyn Read>>,
}

impl PcapFileSource {
    /// Open a capture file, or stdin when `path` is `-`
    pub fn open(path: &str) -> Result<Self, FrerError> {
        let input: Box<dyn Read> = if path == "-" {
            Box::new(io::stdin())
        } else {
            let file = File::open(Path::new(path))
                .map_err(|e| FrerError::Io(format!("{}: {}", path, e)))?;
            Box::new(BufReader::new(file))
        };
        Self::from_reader(input)
    }

    /// Wrap any reader positioned at a pcap global header
    pub fn from_reader(input: Box<dyn Read>) -> Result<Self, FrerError> {
        let reader = LegacyPcapReader::new(READ_BUFFER, input)
            .map_err(|e| FrerError::Capture(format!("not a valid legacy pcap stream: {:?}", e)))?;
        Ok(Self { reader })
    }
}

impl FrameSource for PcapFileSource {
    /// Reads never time out; `wait` only matters for live sources
    fn recv(&mut self, _wait: Duration) -> Result<Received, FrerError> {
        loop {
            match self.reader.next() {
                Ok((offset, block)) => {
                    let frame = match block {
                        PcapBlockOwned::LegacyHeader(ref hdr) => {
                            if hdr.network != Linktype::ETHERNET {
                                warn!("Capture link type {:?} is not Ethernet", hdr.network);
                            }
                            debug!("pcap v{}.{}, snaplen {}", hdr.version_major, hdr.version_minor, hdr.snaplen);
                            None
                        }
                        PcapBlockOwned::Legacy(ref pkt) => Some(Bytes::copy_from_slice(pkt.data)),
                        PcapBlockOwned::NG(_) => {
                            warn!("pcapng block encountered, only legacy pcap supported");
                            None
                        }
                    };
                    drop(block);
                    self.reader.consume(offset);

                    if let Some(frame) = frame {
                        return Ok(Received::Frame(frame));
                    }
                }
                Err(PcapError::Eof) => return Ok(Received::Closed),
                Err(PcapError::Incomplete(_)) => {
                    if let Err(e) = self.reader.refill() {
                        return Err(FrerError::Capture(format!("refill error: {:?}", e)));
                    }
                }
                Err(e) => return Err(FrerError::Capture(format!("pcap parse error: {:?}", e))),
            }
        }
    }
}

/// Writes transmitted frames into a legacy pcap stream
pub struct PcapFileSink {
    writer: BufWriter<Box<dyn Write>>,
    frames: u64,
}

impl PcapFileSink {
    /// Create (truncate) a capture file
    pub fn create(path: &str) -> Result<Self, FrerError> {
        let file = File::create(Path::new(path))
            .map_err(|e| FrerError::Io(format!("{}: {}", path, e)))?;
        Self::from_writer(Box::new(file))
    }

    /// Write the global header to `output`
    pub fn from_writer(output: Box<dyn Write>) -> Result<Self, FrerError> {
        let mut writer = BufWriter::new(output);
        writer.write_all(&PCAP_MAGIC.to_le_bytes())?;
        writer.write_all(&2u16.to_le_bytes())?;
        writer.write_all(&4u16.to_le_bytes())?;
        writer.write_all(&0i32.to_le_bytes())?;
        writer.write_all(&0u32.to_le_bytes())?;
        writer.write_all(&SNAPLEN.to_le_bytes())?;
        writer.write_all(&(Linktype::ETHERNET.0 as u32).to_le_bytes())?;
        Ok(Self { writer, frames: 0 })
    }

    /// Frames written so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Flush buffered records
    pub fn flush(&mut self) -> Result<(), FrerError> {
        self.writer.flush().map_err(|e| FrerError::Transmit(e.to_string()))
    }
}

impl FrameSink for PcapFileSink {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), FrerError> {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let len = frame.len() as u32;

        let record = |w: &mut BufWriter<Box<dyn Write>>| -> io::Result<()> {
            w.write_all(&(ts.as_secs() as u32).to_le_bytes())?;
            w.write_all(&ts.subsec_micros().to_le_bytes())?;
            w.write_all(&len.min(SNAPLEN).to_le_bytes())?;
            w.write_all(&len.to_le_bytes())?;
            w.write_all(&frame[..len.min(SNAPLEN) as usize])
        };

        record(&mut self.writer).map_err(|e| FrerError::Transmit(e.to_string()))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FrerError> {
        self.flush()
    }
}

impl Drop for PcapFileSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush pcap output: {}", e);
        }
    }
}
