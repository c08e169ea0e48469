//! Wire constants and analysis defaults for FRER test traffic

/// EtherType carried in the first two bytes of an R-TAG
pub const RTAG_ETHERTYPE: u16 = 0x893D;

/// Size of an encoded R-TAG: EtherType (2) + sequence (2) + stream id (2)
pub const RTAG_SIZE: usize = 6;

/// TPID of a customer VLAN tag (802.1Q)
pub const TPID_CTAG: u16 = 0x8100;

/// TPID of a service VLAN tag (802.1ad, QinQ outer tag)
pub const TPID_STAG: u16 = 0x88A8;

/// Size of one VLAN tag on the wire: TPID (2) + TCI (2)
pub const VLAN_TAG_SIZE: usize = 4;

/// Size of a MAC address
pub const MAC_LEN: usize = 6;

/// Offset of the first EtherType/TPID field in an Ethernet II frame
pub const ETHERTYPE_OFFSET: usize = 2 * MAC_LEN;

/// Maximum number of stacked VLAN tags the frame parser walks through
pub const MAX_VLAN_DEPTH: usize = 2;

/// Priority code point used for generated test traffic (TSN high priority)
pub const GENERATOR_PCP: u8 = 6;

/// Marker at the start of every generated payload
pub const PAYLOAD_MARKER: &[u8; 10] = b"FRER_TEST_";

/// Filler byte used to pad generated payloads
pub const PAYLOAD_FILL: u8 = b'X';

/// Default payload size of generated frames (bytes after the R-TAG)
pub const DEFAULT_PAYLOAD_SIZE: usize = 100;

/// Default VLAN id of generated frames
pub const DEFAULT_VLAN_ID: u16 = 100;

/// Forward distances at or above this are treated as noise/reorder, not loss
pub const GAP_NOISE_THRESHOLD: u16 = 1000;

/// Unique sequences required before a run may be declared elimination-clean
pub const MIN_SAMPLE_SIZE: usize = 10;

/// Number of distinct 16-bit sequence numbers
pub const SEQUENCE_SPACE: usize = 1 << 16;

/// Largest valid 802.1Q VLAN id
pub const MAX_VLAN_ID: u16 = 4094;

/// Generator progress is logged every this many frames
pub const PROGRESS_INTERVAL: u64 = 100;
