//! Core types: R-TAG, frame views and MAC addresses

use crate::constants::{
    ETHERTYPE_OFFSET, MAC_LEN, MAX_VLAN_DEPTH, RTAG_ETHERTYPE, TPID_CTAG, TPID_STAG,
    VLAN_TAG_SIZE,
};
use crate::error::FrerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decoded redundancy tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RTag {
    /// Always [`RTAG_ETHERTYPE`] for a decoded tag
    pub ether_type: u16,

    /// Per-stream sequence number, modulo 65536
    pub sequence: u16,

    /// Stream the frame belongs to
    pub stream_id: u16,
}

impl RTag {
    /// Create a tag with the R-TAG EtherType
    pub const fn new(sequence: u16, stream_id: u16) -> Self {
        Self {
            ether_type: RTAG_ETHERTYPE,
            sequence,
            stream_id,
        }
    }
}

/// Read-only capability over a captured frame.
///
/// The codec and the analyzer only ever ask these two questions, so any
/// capture backend can feed them by implementing this trait.
pub trait FrameView {
    /// Bytes that follow the (innermost) VLAN tag, starting at the inner
    /// EtherType. `None` when the frame is not VLAN tagged.
    fn vlan_payload(&self) -> Option<&[u8]>;

    /// Whether the frame carries a VLAN tag
    fn has_vlan(&self) -> bool {
        self.vlan_payload().is_some()
    }
}

/// One 802.1Q / 802.1ad tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanTag {
    /// Tag protocol identifier
    pub tpid: u16,

    /// Priority code point (3 bits)
    pub pcp: u8,

    /// Drop eligible indicator
    pub dei: bool,

    /// VLAN identifier (12 bits)
    pub vid: u16,
}

impl VlanTag {
    /// Customer tag with the given priority and VLAN id
    pub const fn ctag(pcp: u8, vid: u16) -> Self {
        Self {
            tpid: TPID_CTAG,
            pcp: pcp & 0x07,
            dei: false,
            vid: vid & 0x0FFF,
        }
    }

    /// Split a tag control information word
    pub const fn from_tci(tpid: u16, tci: u16) -> Self {
        Self {
            tpid,
            pcp: (tci >> 13) as u8,
            dei: (tci & 0x1000) != 0,
            vid: tci & 0x0FFF,
        }
    }

    /// Pack into a tag control information word
    pub const fn tci(&self) -> u16 {
        ((self.pcp as u16 & 0x07) << 13) | ((self.dei as u16) << 12) | (self.vid & 0x0FFF)
    }
}

/// Zero-copy view over an Ethernet II frame
#[derive(Debug, Clone, Copy)]
pub struct EthernetView<'a> {
    data: &'a [u8],
    outer: Option<VlanTag>,
    depth: usize,
    inner_offset: usize,
}

impl<'a> EthernetView<'a> {
    /// Parse the header of a raw frame.
    ///
    /// Returns `None` if the buffer is too short to hold an Ethernet header.
    /// Up to [`MAX_VLAN_DEPTH`] stacked tags are walked.
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        if data.len() < ETHERTYPE_OFFSET + 2 {
            return None;
        }

        let mut offset = ETHERTYPE_OFFSET;
        let mut outer = None;
        let mut depth = 0;

        while depth < MAX_VLAN_DEPTH && data.len() >= offset + VLAN_TAG_SIZE + 2 {
            let tpid = read_u16(data, offset);
            if tpid != TPID_CTAG && tpid != TPID_STAG {
                break;
            }
            if outer.is_none() {
                outer = Some(VlanTag::from_tci(tpid, read_u16(data, offset + 2)));
            }
            offset += VLAN_TAG_SIZE;
            depth += 1;
        }

        Some(Self {
            data,
            outer,
            depth,
            inner_offset: offset,
        })
    }

    /// Destination MAC address
    pub fn destination(&self) -> MacAddr {
        MacAddr::from_slice(&self.data[0..MAC_LEN])
    }

    /// Source MAC address
    pub fn source(&self) -> MacAddr {
        MacAddr::from_slice(&self.data[MAC_LEN..2 * MAC_LEN])
    }

    /// Outermost VLAN tag, if any
    pub fn vlan(&self) -> Option<VlanTag> {
        self.outer
    }

    /// Number of stacked VLAN tags
    pub fn vlan_depth(&self) -> usize {
        self.depth
    }

    /// EtherType following all VLAN tags
    pub fn ether_type(&self) -> u16 {
        read_u16(self.data, self.inner_offset)
    }
}

impl FrameView for EthernetView<'_> {
    fn vlan_payload(&self) -> Option<&[u8]> {
        if self.depth == 0 {
            return None;
        }
        Some(&self.data[self.inner_offset..])
    }
}

impl FrameView for [u8] {
    fn vlan_payload(&self) -> Option<&[u8]> {
        let view = EthernetView::parse(self)?;
        if view.depth == 0 {
            return None;
        }
        Some(&self[view.inner_offset..])
    }
}

impl FrameView for bytes::Bytes {
    fn vlan_payload(&self) -> Option<&[u8]> {
        self.as_ref().vlan_payload()
    }
}

impl FrameView for Vec<u8> {
    fn vlan_payload(&self) -> Option<&[u8]> {
        self.as_slice().vlan_payload()
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

/// 48-bit MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; MAC_LEN]);

impl MacAddr {
    /// ff:ff:ff:ff:ff:ff
    pub const BROADCAST: MacAddr = MacAddr([0xFF; MAC_LEN]);

    /// 00:00:00:00:00:00
    pub const ZERO: MacAddr = MacAddr([0x00; MAC_LEN]);

    /// Raw octets
    pub const fn octets(&self) -> [u8; MAC_LEN] {
        self.0
    }

    fn from_slice(bytes: &[u8]) -> Self {
        let mut octets = [0u8; MAC_LEN];
        octets.copy_from_slice(bytes);
        Self(octets)
    }
}

impl FromStr for MacAddr {
    type Err = FrerError;

    /// Accepts `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut octets = [0u8; MAC_LEN];
        let mut count = 0;

        for part in trimmed.split([':', '-']) {
            if count == MAC_LEN || part.len() != 2 {
                return Err(FrerError::InvalidMac(s.to_string()));
            }
            octets[count] =
                u8::from_str_radix(part, 16).map_err(|_| FrerError::InvalidMac(s.to_string()))?;
            count += 1;
        }

        if count != MAC_LEN {
            return Err(FrerError::InvalidMac(s.to_string()));
        }

        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// Why a capture or send run ended
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// Every requested frame was handled
    Completed,

    /// The frame-count limit was reached
    FrameLimit,

    /// The overall run timeout elapsed
    Timeout,

    /// An external interrupt was received
    Interrupted,

    /// The frame source has no more frames
    SourceClosed,

    /// A capture or transmission error aborted the run
    Failed(FrerError),
}

impl StopReason {
    /// Whether the run ended because of an error
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::Failed(_))
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Completed => write!(f, "completed"),
            StopReason::FrameLimit => write!(f, "frame limit reached"),
            StopReason::Timeout => write!(f, "timeout"),
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::SourceClosed => write!(f, "source closed"),
            StopReason::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}
