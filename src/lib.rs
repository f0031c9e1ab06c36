//! httpsniff: HTTP traffic capture over raw sockets.
//!
//! The sniffer reads raw IPv4 TCP packets from the kernel, reassembles the
//! data-bearing ones into per-request messages keyed by acknowledgment
//! number, and hands each completed message to the consumer as one
//! contiguous payload.
//!
//! Module hierarchy:
//!
//! - [`sniffer`]: raw socket capture, TCP decoding, message reassembly
//! - [`input`]: byte-stream facade for downstream replay logic
//! - [`observability`]: tracing subscriber setup

pub mod input;
pub mod observability;
pub mod sniffer;

pub use input::RawInput;
pub use sniffer::{Listener, PacketFeed, TcpMessage, TcpPacket};
