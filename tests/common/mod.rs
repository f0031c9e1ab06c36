#![allow(dead_code)]
//! Helpers for building raw TCP segments and IPv4 datagrams byte by byte,
//! shaped like what the raw socket reader hands to the sniffer.

use std::net::Ipv4Addr;

pub const TCP_ACK: u16 = 1 << 4;

/// TCP segment with data offset 5, the ACK flag set, and the given payload.
pub fn build_tcp_segment(
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    payload: &[u8],
) -> Vec<u8> {
    let mut seg = Vec::new();
    seg.extend_from_slice(&src_port.to_be_bytes());
    seg.extend_from_slice(&dst_port.to_be_bytes());
    seg.extend_from_slice(&seq.to_be_bytes());
    seg.extend_from_slice(&ack.to_be_bytes());
    seg.push(0x50); // data offset = 5 words
    seg.push(TCP_ACK as u8);
    seg.extend_from_slice(&1024u16.to_be_bytes()); // window
    seg.extend_from_slice(&[0; 2]); // checksum
    seg.extend_from_slice(&[0; 2]); // urgent ptr
    seg.extend_from_slice(payload);
    seg
}

/// Minimal IPv4 datagram (20-byte header, no options) around a TCP segment.
pub fn build_ipv4_datagram(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, segment: &[u8]) -> Vec<u8> {
    let total_len = (20 + segment.len()) as u16;
    let mut pkt = Vec::new();
    pkt.push(0x45); // version 4, IHL 5
    pkt.push(0); // DSCP
    pkt.extend_from_slice(&total_len.to_be_bytes());
    pkt.extend_from_slice(&[0; 4]); // id, flags, frag offset
    pkt.push(64); // TTL
    pkt.push(6); // protocol = TCP
    pkt.extend_from_slice(&[0; 2]); // checksum
    pkt.extend_from_slice(&src_ip.octets());
    pkt.extend_from_slice(&dst_ip.octets());
    pkt.extend_from_slice(segment);
    pkt
}
