//! Linux AF_PACKET raw sockets as live frame source and sink

use bytes::{BufMut, Bytes, BytesMut};
use frer_core::constants::{ETHERTYPE_OFFSET, TPID_CTAG, TPID_STAG};
use frer_core::{FrameSink, FrameSource, FrerError, Received};
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;
use tracing::debug;

// From <linux/if_packet.h>; declared locally so the layout is explicit.
const PACKET_AUXDATA: libc::c_int = 8;
const TP_STATUS_VLAN_VALID: u32 = 1 << 4;
const TP_STATUS_VLAN_TPID_VALID: u32 = 1 << 6;

#[repr(C)]
#[derive(Clone, Copy, Default)]
#[allow(dead_code)]
struct TpacketAuxdata {
    tp_status: u32,
    tp_len: u32,
    tp_snaplen: u32,
    tp_mac: u16,
    tp_net: u16,
    tp_vlan_tci: u16,
    tp_vlan_tpid: u16,
}

// From <linux/filter.h>
const SO_ATTACH_FILTER: libc::c_int = 26;
const BPF_LD_W_ABS: u16 = 0x20;
const BPF_LD_H_ABS: u16 = 0x28;
const BPF_JEQ_K: u16 = 0x15;
const BPF_RET_K: u16 = 0x06;
const SKF_AD_VLAN_TAG_PRESENT: u32 = 0xFFFF_F000 + 48;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(dead_code)]
struct SockFilter {
    code: u16,
    jt: u8,
    jf: u8,
    k: u32,
}

#[repr(C)]
struct SockFprog {
    len: libc::c_ushort,
    filter: *const SockFilter,
}

const fn insn(code: u16, jt: u8, jf: u8, k: u32) -> SockFilter {
    SockFilter { code, jt, jf, k }
}

/// Classic BPF equivalent of `vlan`: accept frames whose tag was offloaded
/// into metadata or whose outer EtherType is a VLAN TPID.
static VLAN_FILTER: [SockFilter; 7] = [
    insn(BPF_LD_W_ABS, 0, 0, SKF_AD_VLAN_TAG_PRESENT),
    insn(BPF_JEQ_K, 3, 0, 1),
    insn(BPF_LD_H_ABS, 0, 0, ETHERTYPE_OFFSET as u32),
    insn(BPF_JEQ_K, 1, 0, TPID_CTAG as u32),
    insn(BPF_JEQ_K, 0, 1, TPID_STAG as u32),
    insn(BPF_RET_K, 0, 0, MAX_FRAME as u32),
    insn(BPF_RET_K, 0, 0, 0),
];

const MAX_FRAME: usize = 65536;
const CONTROL_LEN: usize = 64;

/// Fail unless running as root; raw sockets need CAP_NET_RAW
pub fn require_privilege(what: &str) -> Result<(), FrerError> {
    // SAFETY: geteuid has no preconditions.
    if unsafe { libc::geteuid() } != 0 {
        return Err(FrerError::PermissionDenied(format!(
            "{} requires root privileges (use sudo)",
            what
        )));
    }
    Ok(())
}

/// Raw socket bound to one interface, receiving every EtherType
pub struct RawSocket {
    fd: OwnedFd,
    interface: String,
    buf: Vec<u8>,
}

impl RawSocket {
    /// Open and bind a socket on `interface`
    pub fn open(interface: &str) -> Result<Self, FrerError> {
        require_privilege("opening a raw socket")?;

        let name = CString::new(interface)
            .map_err(|_| FrerError::InvalidConfig(format!("bad interface name {:?}", interface)))?;
        // SAFETY: name is a valid NUL-terminated string.
        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            return Err(FrerError::Io(format!("unknown interface {}", interface)));
        }

        let protocol = (libc::ETH_P_ALL as u16).to_be();
        // SAFETY: plain socket(2) call; the result is checked before use.
        let raw = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, protocol as libc::c_int) };
        if raw < 0 {
            return Err(io::Error::last_os_error().into());
        }
        // SAFETY: raw is a freshly created, owned descriptor.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // Drop untagged noise (ARP, LLDP) in the kernel, before it is counted
        let prog = SockFprog {
            len: VLAN_FILTER.len() as libc::c_ushort,
            filter: VLAN_FILTER.as_ptr(),
        };
        // SAFETY: prog points at a live filter array; the kernel copies it.
        let rc = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                SO_ATTACH_FILTER,
                &prog as *const SockFprog as *const libc::c_void,
                std::mem::size_of::<SockFprog>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }

        // SAFETY: sockaddr_ll is plain data; zeroed is a valid initial state.
        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = protocol;
        addr.sll_ifindex = ifindex as libc::c_int;

        // SAFETY: addr outlives the call and the length matches its type.
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }

        // The kernel strips VLAN tags on receive; ask for them back as auxdata
        let on: libc::c_int = 1;
        // SAFETY: option value is a live c_int with the advertised size.
        let rc = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_PACKET,
                PACKET_AUXDATA,
                &on as *const libc::c_int as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }

        debug!("Raw socket bound to {} (ifindex {})", interface, ifindex);

        Ok(Self {
            fd,
            interface: interface.to_string(),
            buf: vec![0u8; MAX_FRAME],
        })
    }

    /// Block up to `wait` for readability; `false` on timeout or EINTR
    fn wait_readable(&self, wait: Duration) -> Result<bool, FrerError> {
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout = wait.as_millis().min(i32::MAX as u128) as libc::c_int;
        // SAFETY: pfd is a single valid pollfd.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(FrerError::Capture(err.to_string()));
        }
        Ok(rc > 0)
    }

    /// Receive one frame and its VLAN auxdata
    fn receive(&mut self) -> Result<Option<Bytes>, FrerError> {
        // u64 words keep the cmsghdr aligned
        let mut control = [0u64; CONTROL_LEN / 8];
        let mut iov = libc::iovec {
            iov_base: self.buf.as_mut_ptr() as *mut libc::c_void,
            iov_len: self.buf.len(),
        };
        // SAFETY: msghdr is plain data; fields are filled in below.
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = CONTROL_LEN as _;

        // SAFETY: all buffers referenced by msg live until recvmsg returns.
        let n = unsafe { libc::recvmsg(self.fd.as_raw_fd(), &mut msg, libc::MSG_DONTWAIT) };
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => Ok(None),
                _ => Err(FrerError::Capture(err.to_string())),
            };
        }
        let len = n as usize;

        let mut aux = None;
        // SAFETY: CMSG_* walk the control buffer bounded by msg_controllen.
        unsafe {
            let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
            while !cmsg.is_null() {
                if (*cmsg).cmsg_level == libc::SOL_PACKET && (*cmsg).cmsg_type == PACKET_AUXDATA {
                    let data = libc::CMSG_DATA(cmsg) as *const TpacketAuxdata;
                    aux = Some(std::ptr::read_unaligned(data));
                }
                cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
            }
        }

        Ok(Some(restore_vlan(&self.buf[..len], aux)))
    }
}

/// Re-insert a VLAN tag that the kernel moved into auxdata
fn restore_vlan(frame: &[u8], aux: Option<TpacketAuxdata>) -> Bytes {
    let aux = match aux {
        Some(aux) if aux.tp_status & TP_STATUS_VLAN_VALID != 0 || aux.tp_vlan_tci != 0 => aux,
        _ => return Bytes::copy_from_slice(frame),
    };
    if frame.len() < ETHERTYPE_OFFSET {
        return Bytes::copy_from_slice(frame);
    }

    let tpid = if aux.tp_status & TP_STATUS_VLAN_TPID_VALID != 0 {
        aux.tp_vlan_tpid
    } else {
        TPID_CTAG
    };

    let mut out = BytesMut::with_capacity(frame.len() + 4);
    out.put_slice(&frame[..ETHERTYPE_OFFSET]);
    out.put_u16(tpid);
    out.put_u16(aux.tp_vlan_tci);
    out.put_slice(&frame[ETHERTYPE_OFFSET..]);
    out.freeze()
}

impl FrameSource for RawSocket {
    fn recv(&mut self, wait: Duration) -> Result<Received, FrerError> {
        if !self.wait_readable(wait)? {
            return Ok(Received::Idle);
        }
        Ok(self.receive()?.map_or(Received::Idle, Received::Frame))
    }
}

impl FrameSink for RawSocket {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), FrerError> {
        // SAFETY: frame is a valid slice for the duration of the call.
        let n = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
            )
        };
        if n < 0 {
            return Err(FrerError::Transmit(format!(
                "{}: {}",
                self.interface,
                io::Error::last_os_error()
            )));
        }
        if n as usize != frame.len() {
            return Err(FrerError::Transmit(format!(
                "{}: short write ({} of {} bytes)",
                self.interface,
                n,
                frame.len()
            )));
        }
        Ok(())
    }
}
