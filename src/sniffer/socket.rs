//! Raw socket plumbing.
//!
//! Opens the raw IPv4 TCP socket, runs the blocking read loop, and handles
//! the IP-level framing the kernel leaves to us: header stripping and
//! source/destination address extraction. Raw sockets operate below TCP, so
//! reads deliver whole IP datagrams regardless of port.
//!
//! Reference: RFC 791 (IPv4).

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};

use crate::sniffer::listener::PacketFeed;

/// Reusable read buffer size; a raw TCP segment never exceeds this on the
/// paths we listen on.
const READ_BUFFER_SIZE: usize = 8192;

const IPV4_HEADER_MIN: usize = 20;

/// Open a raw IPv4 TCP socket bound to the given local address.
///
/// This is the one fatal failure in the system; the OS error (typically a
/// permission error, raw sockets need root or CAP_NET_RAW) is surfaced
/// unchanged to the caller.
pub(crate) fn open_raw_socket(addr: Ipv4Addr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::TCP))
        .context("opening raw IPv4 TCP socket (requires root or CAP_NET_RAW)")?;
    socket
        .bind(&SocketAddr::new(IpAddr::V4(addr), 0).into())
        .with_context(|| format!("binding raw socket to {addr}"))?;
    // std has no raw-socket wrapper; UdpSocket gives a safe recv_from over
    // the same descriptor.
    Ok(socket.into())
}

/// Run the read loop on the blocking pool, feeding datagrams into the
/// routing core.
pub(crate) fn spawn_reader(socket: UdpSocket, feed: PacketFeed) {
    tokio::task::spawn_blocking(move || read_loop(socket, feed));
}

fn read_loop(socket: UdpSocket, feed: PacketFeed) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match socket.recv_from(&mut buf) {
            Ok((len, peer)) => {
                if len > 0 {
                    feed.blocking_push_datagram(peer.ip(), &buf[..len]);
                }
            }
            // Read errors are recoverable; keep listening.
            Err(err) => tracing::warn!(error = %err, "raw socket read failed"),
        }
        if feed.is_closed() {
            return;
        }
    }
}

/// Strip a valid IPv4 header from the front of a datagram.
///
/// The header length is the low nibble of byte 0 in 32-bit words. The
/// buffer passes through unchanged unless the version nibble equals 4 and
/// the computed length lies within [20, buffer length].
pub(crate) fn strip_ipv4_header(buf: &[u8]) -> &[u8] {
    if buf.len() < IPV4_HEADER_MIN {
        return buf;
    }
    let header_len = ((buf[0] & 0x0F) as usize) << 2;
    if header_len < IPV4_HEADER_MIN || header_len > buf.len() {
        return buf;
    }
    if buf[0] >> 4 != 4 {
        return buf;
    }
    &buf[header_len..]
}

/// Dotted-quad source and destination addresses of an IPv4 header.
/// Callers must have validated the header (see [`strip_ipv4_header`]).
pub(crate) fn ipv4_addresses(buf: &[u8]) -> (String, String) {
    let src = Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]);
    let dst = Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]);
    (src.to_string(), dst.to_string())
}

/// The host's primary non-loopback IPv4 address, falling back to 127.0.0.1.
///
/// Resolved once at listener construction; used to label packets that
/// arrive without an IP header.
pub(crate) fn host_ipv4() -> Ipv4Addr {
    let Some(host) = local_hostname() else {
        return Ipv4Addr::LOCALHOST;
    };
    let Ok(addrs) = (host.as_str(), 0u16).to_socket_addrs() else {
        return Ipv4Addr::LOCALHOST;
    };
    for addr in addrs {
        if let IpAddr::V4(v4) = addr.ip() {
            if !v4.is_loopback() {
                return v4;
            }
        }
    }
    Ipv4Addr::LOCALHOST
}

fn local_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0)?;
    String::from_utf8(buf[..end].to_vec()).ok()
}
