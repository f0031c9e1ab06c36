//! TCP segment decoding.
//!
//! Decodes the fixed part of a TCP header plus payload from a raw buffer.
//! Port-level filtering happens before decoding (see `listener`), so this
//! module only deals with buffers that begin at a TCP header.
//!
//! Reference: RFC 793 (TCP).

use std::fmt;
use std::net::IpAddr;

// TCP flag bits, low nine bits of bytes 12..14 of the header.
pub const TCP_FIN: u16 = 1 << 0;
pub const TCP_SYN: u16 = 1 << 1;
pub const TCP_RST: u16 = 1 << 2;
pub const TCP_PSH: u16 = 1 << 3;
pub const TCP_ACK: u16 = 1 << 4;
pub const TCP_URG: u16 = 1 << 5;
pub const TCP_ECE: u16 = 1 << 6;
pub const TCP_CWR: u16 = 1 << 7;
pub const TCP_NS: u16 = 1 << 8;

/// Minimum TCP header length (data offset 5 words).
pub(crate) const TCP_HEADER_LEN: usize = 20;

/// One decoded TCP segment together with its addressing context.
///
/// A message is keyed by the acknowledgment number; the sequence number
/// orders segments within the message. Immutable after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpPacket {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// Header length in 32-bit words.
    pub data_offset: u8,
    pub flags: u16,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
    /// Application payload, everything past `data_offset * 4`.
    pub payload: Vec<u8>,
    /// Address the kernel reported the datagram from.
    pub peer: IpAddr,
    /// Dotted-quad source address from the IP header.
    pub src_ip: String,
    /// Dotted-quad destination address from the IP header.
    pub dst_ip: String,
}

impl TcpPacket {
    /// Decode a buffer whose first byte begins a TCP header.
    ///
    /// Returns `None` when the buffer is shorter than a minimal TCP header
    /// or the data offset points past the end of the buffer.
    pub fn parse(peer: IpAddr, src_ip: &str, dst_ip: &str, buf: &[u8]) -> Option<TcpPacket> {
        if buf.len() < TCP_HEADER_LEN {
            return None;
        }
        let data_offset = buf[12] >> 4;
        let payload_start = data_offset as usize * 4;
        if payload_start > buf.len() {
            return None;
        }

        Some(TcpPacket {
            src_port: u16::from_be_bytes([buf[0], buf[1]]),
            dst_port: u16::from_be_bytes([buf[2], buf[3]]),
            seq: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ack: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            data_offset,
            flags: u16::from_be_bytes([buf[12], buf[13]]) & 0x01FF,
            window: u16::from_be_bytes([buf[14], buf[15]]),
            checksum: u16::from_be_bytes([buf[16], buf[17]]),
            urgent: u16::from_be_bytes([buf[18], buf[19]]),
            payload: buf[payload_start..].to_vec(),
            peer,
            src_ip: src_ip.to_string(),
            dst_ip: dst_ip.to_string(),
        })
    }

    /// Message key: peer address followed by the acknowledgment number in
    /// decimal. Two half-connections between the same hosts that happen to
    /// share an ack number collide; within the 2 s expiry window that is
    /// treated as negligible.
    pub fn message_id(&self) -> String {
        format!("{}{}", self.peer, self.ack)
    }

    fn flag(&self, bit: u16) -> bool {
        self.flags & bit != 0
    }
}

impl fmt::Display for TcpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} seq={} ack={} hdr={}w \
             [fin={} syn={} rst={} psh={} ack={} urg={} ece={} cwr={} ns={}] \
             win={} csum={} payload={}B",
            self.src_ip,
            self.src_port,
            self.dst_ip,
            self.dst_port,
            self.seq,
            self.ack,
            self.data_offset,
            self.flag(TCP_FIN),
            self.flag(TCP_SYN),
            self.flag(TCP_RST),
            self.flag(TCP_PSH),
            self.flag(TCP_ACK),
            self.flag(TCP_URG),
            self.flag(TCP_ECE),
            self.flag(TCP_CWR),
            self.flag(TCP_NS),
            self.window,
            self.checksum,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn peer() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
    }

    /// Build a TCP segment with data offset 5 and the given payload.
    fn build_segment(
        src_port: u16,
        dst_port: u16,
        seq: u32,
        ack: u32,
        flags: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut seg = Vec::new();
        seg.extend_from_slice(&src_port.to_be_bytes());
        seg.extend_from_slice(&dst_port.to_be_bytes());
        seg.extend_from_slice(&seq.to_be_bytes());
        seg.extend_from_slice(&ack.to_be_bytes());
        // data offset 5 words in the high nibble, NS flag in the low bit
        seg.push(0x50 | ((flags >> 8) as u8 & 0x01));
        seg.push(flags as u8);
        seg.extend_from_slice(&1024u16.to_be_bytes()); // window
        seg.extend_from_slice(&0xBEEFu16.to_be_bytes()); // checksum
        seg.extend_from_slice(&7u16.to_be_bytes()); // urgent
        seg.extend_from_slice(payload);
        seg
    }

    #[test]
    fn test_parse_decodes_all_fields() {
        let seg = build_segment(80, 54321, 1000, 42, TCP_PSH | TCP_ACK, b"hello");
        let packet = TcpPacket::parse(peer(), "10.0.0.1", "10.0.0.2", &seg).unwrap();

        assert_eq!(packet.src_port, 80);
        assert_eq!(packet.dst_port, 54321);
        assert_eq!(packet.seq, 1000);
        assert_eq!(packet.ack, 42);
        assert_eq!(packet.data_offset, 5);
        assert_eq!(packet.flags, TCP_PSH | TCP_ACK);
        assert_eq!(packet.window, 1024);
        assert_eq!(packet.checksum, 0xBEEF);
        assert_eq!(packet.urgent, 7);
        assert_eq!(packet.payload, b"hello");
        assert_eq!(packet.src_ip, "10.0.0.1");
        assert_eq!(packet.dst_ip, "10.0.0.2");
    }

    #[test]
    fn test_parse_ns_flag_from_byte_twelve() {
        let seg = build_segment(80, 54321, 1, 2, TCP_NS | TCP_ACK, b"x");
        let packet = TcpPacket::parse(peer(), "10.0.0.1", "10.0.0.2", &seg).unwrap();
        assert_eq!(packet.flags, TCP_NS | TCP_ACK);
        assert_eq!(packet.data_offset, 5);
    }

    #[test]
    fn test_parse_rejects_short_buffer() {
        assert!(TcpPacket::parse(peer(), "0.0.0.0", "0.0.0.0", &[0u8; 19]).is_none());
    }

    #[test]
    fn test_parse_rejects_offset_past_end() {
        let mut seg = build_segment(80, 54321, 1, 2, 0, b"");
        seg[12] = 0x60; // offset 6 words = 24 bytes, buffer is 20
        assert!(TcpPacket::parse(peer(), "0.0.0.0", "0.0.0.0", &seg).is_none());
    }

    #[test]
    fn test_parse_is_pure() {
        let seg = build_segment(80, 54321, 1000, 42, TCP_ACK, b"hello");
        let first = TcpPacket::parse(peer(), "10.0.0.1", "10.0.0.2", &seg).unwrap();
        let second = TcpPacket::parse(peer(), "10.0.0.1", "10.0.0.2", &seg).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_message_id_is_peer_plus_ack() {
        let seg = build_segment(80, 54321, 1000, 42, TCP_ACK, b"hello");
        let packet = TcpPacket::parse(peer(), "10.0.0.1", "10.0.0.2", &seg).unwrap();
        assert_eq!(packet.message_id(), "10.0.0.142");
    }
}
