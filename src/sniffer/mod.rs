//! Raw Socket Sniffer Module
//!
//! Captures TCP traffic through a raw IPv4 socket and reassembles it into
//! per-request messages.
//!
//! ## Architecture
//!
//! ```text
//! Raw socket → PacketFeed → Router → TcpMessage assemblers → Listener::receive()
//! ```
//!
//! ## Components
//!
//! - **socket:** raw socket setup, blocking read loop, IPv4 framing
//! - **packet:** TCP segment decoding ([`TcpPacket`])
//! - **message:** per-message reassembly and expiry ([`TcpMessage`])
//! - **listener:** filtering and the single-threaded routing loop
//!
//! ## Usage
//!
//! ```rust,no_run
//! use httpsniff::sniffer::Listener;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut listener = Listener::bind("127.0.0.1", "80")?;
//! while let Some(message) = listener.receive().await {
//!     println!("{}", String::from_utf8_lossy(&message.bytes()));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## References
//!
//! - [RFC 793] Transmission Control Protocol
//! - [RFC 791] Internet Protocol

pub mod listener;
pub mod message;
pub mod packet;
pub(crate) mod socket;

pub use listener::{Listener, PacketFeed};
pub use message::{TcpMessage, MESSAGE_EXPIRE};
pub use packet::TcpPacket;
