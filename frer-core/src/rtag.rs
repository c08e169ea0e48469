//! R-TAG encoding and decoding
//!
//! Layout (6 bytes, all big-endian), placed right after the VLAN tag:
//! 1. EtherType (2 bytes): `0x893D`
//! 2. Sequence number (2 bytes)
//! 3. Stream ID (2 bytes)

use crate::constants::{RTAG_ETHERTYPE, RTAG_SIZE};
use crate::types::{FrameView, RTag};

/// Decode the R-TAG of a captured frame.
///
/// Returns `None` when the frame has no VLAN tag, when fewer than
/// [`RTAG_SIZE`] bytes follow the tag, or when the EtherType is not
/// [`RTAG_ETHERTYPE`]. None of these are errors: such frames are simply
/// not FRER test traffic.
#[inline]
pub fn decode<F: FrameView + ?Sized>(frame: &F) -> Option<RTag> {
    decode_payload(frame.vlan_payload()?)
}

/// Decode an R-TAG from the bytes that follow a VLAN tag
#[inline]
pub fn decode_payload(payload: &[u8]) -> Option<RTag> {
    if payload.len() < RTAG_SIZE {
        return None;
    }

    let ether_type = u16::from_be_bytes([payload[0], payload[1]]);
    if ether_type != RTAG_ETHERTYPE {
        return None;
    }

    Some(RTag {
        ether_type,
        sequence: u16::from_be_bytes([payload[2], payload[3]]),
        stream_id: u16::from_be_bytes([payload[4], payload[5]]),
    })
}

/// Encode an R-TAG for the given sequence number and stream
#[inline]
pub fn encode(sequence: u16, stream_id: u16) -> [u8; RTAG_SIZE] {
    let mut tag = [0u8; RTAG_SIZE];
    tag[0..2].copy_from_slice(&RTAG_ETHERTYPE.to_be_bytes());
    tag[2..4].copy_from_slice(&sequence.to_be_bytes());
    tag[4..6].copy_from_slice(&stream_id.to_be_bytes());
    tag
}
