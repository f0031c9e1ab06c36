//! Raw socket listener: packet filtering and message routing.
//!
//! Raw sockets operate on the IP level, so port selection, duplicate
//! suppression and sequencing are reimplemented here on top of the kernel's
//! datagram reads. Packets are parsed by `packet`, per-message flow state
//! lives in `message`; this module owns the routing loop that ties them
//! together:
//!
//! ```text
//! raw socket → reader → PacketFeed (filter + decode) → router
//!                                                        │ per message key
//!                                                        ▼
//!                                         assembler tasks → completion
//!                                                        │
//!                                              Listener::receive()
//! ```
//!
//! The router is the sole writer of the key → assembler map; every packet
//! reaches an assembler through its single-threaded loop, which is the
//! concurrency discipline that replaces locks.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::sniffer::message::TcpMessage;
use crate::sniffer::packet::{TcpPacket, TCP_HEADER_LEN};
use crate::sniffer::socket;

const PACKET_CAPACITY: usize = 100;
const MESSAGE_CAPACITY: usize = 100;
const COMPLETION_CAPACITY: usize = 100;

/// Captures TCP traffic from a raw socket and yields reassembled messages.
///
/// Construction spawns the capture tasks onto the current tokio runtime.
pub struct Listener {
    messages: mpsc::Receiver<TcpMessage>,
}

impl Listener {
    /// Listen on a local dotted-quad address. `port` is a decimal string;
    /// empty or non-numeric means every port.
    ///
    /// Fails when the address does not parse or the raw socket cannot be
    /// opened (raw sockets need elevated privileges).
    pub fn bind(addr: &str, port: &str) -> Result<Listener> {
        let ip: Ipv4Addr = addr
            .parse()
            .with_context(|| format!("invalid listen address: {addr}"))?;
        let port = port.parse::<u16>().unwrap_or(0);

        let (listener, feed) = Listener::with_feed(port);
        let socket = socket::open_raw_socket(ip)?;
        socket::spawn_reader(socket, feed);
        Ok(listener)
    }

    /// The routing core without a socket: packets come from the returned
    /// [`PacketFeed`] instead. This is what [`Listener::bind`] builds on and
    /// what alternate capture sources and tests drive directly.
    ///
    /// Dropping every feed clone drains the live assemblers and ends the
    /// message stream.
    pub fn with_feed(port: u16) -> (Listener, PacketFeed) {
        let (packet_tx, packet_rx) = mpsc::channel(PACKET_CAPACITY);
        let (message_tx, message_rx) = mpsc::channel(MESSAGE_CAPACITY);
        tokio::spawn(Router::new(message_tx).run(packet_rx));

        let feed = PacketFeed {
            packets: packet_tx,
            port,
            host_ip: socket::host_ipv4(),
        };
        (Listener { messages: message_rx }, feed)
    }

    /// Next completed message; blocks until one is ready. `None` once the
    /// capture side has shut down and every live message has drained.
    pub async fn receive(&mut self) -> Option<TcpMessage> {
        self.messages.recv().await
    }
}

/// Injection handle feeding raw buffers into the routing core.
///
/// Clones share one listener; the handle is cheap to clone and safe to use
/// from any task.
#[derive(Clone)]
pub struct PacketFeed {
    packets: mpsc::Sender<TcpPacket>,
    /// Configured capture port; 0 accepts every port.
    port: u16,
    host_ip: Ipv4Addr,
}

impl PacketFeed {
    /// Feed one raw IP datagram as read from the socket: IPv4 framing is
    /// resolved first, then the TCP segment goes through [`push_segment`].
    ///
    /// [`push_segment`]: PacketFeed::push_segment
    pub async fn push_datagram(&self, peer: IpAddr, datagram: &[u8]) {
        let (src_ip, dst_ip, segment) = self.unframe(peer, datagram);
        self.push_segment(peer, &src_ip, &dst_ip, segment).await;
    }

    /// Feed one bare TCP segment. Packets that fail the data-packet filter
    /// or do not decode are dropped silently.
    pub async fn push_segment(&self, peer: IpAddr, src_ip: &str, dst_ip: &str, segment: &[u8]) {
        if let Some(packet) = self.accept(peer, src_ip, dst_ip, segment) {
            let _ = self.packets.send(packet).await;
        }
    }

    /// Blocking-context variant of [`push_datagram`] for the socket reader.
    ///
    /// [`push_datagram`]: PacketFeed::push_datagram
    pub(crate) fn blocking_push_datagram(&self, peer: IpAddr, datagram: &[u8]) {
        let (src_ip, dst_ip, segment) = self.unframe(peer, datagram);
        if let Some(packet) = self.accept(peer, &src_ip, &dst_ip, segment) {
            let _ = self.packets.blocking_send(packet);
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.packets.is_closed()
    }

    /// Resolve IP-level framing: strip a valid IPv4 header and read the
    /// addresses from it, or treat the buffer as a bare TCP segment from
    /// `peer`. An outbound headerless packet has no recoverable
    /// destination and is labelled 0.0.0.0.
    fn unframe<'a>(&self, peer: IpAddr, datagram: &'a [u8]) -> (String, String, &'a [u8]) {
        let segment = socket::strip_ipv4_header(datagram);
        if segment.len() != datagram.len() {
            let (src_ip, dst_ip) = socket::ipv4_addresses(datagram);
            (src_ip, dst_ip, segment)
        } else {
            let dst_ip = if peer == IpAddr::V4(self.host_ip) {
                "0.0.0.0".to_string()
            } else {
                self.host_ip.to_string()
            };
            (peer.to_string(), dst_ip, segment)
        }
    }

    fn accept(
        &self,
        peer: IpAddr,
        src_ip: &str,
        dst_ip: &str,
        segment: &[u8],
    ) -> Option<TcpPacket> {
        if !is_incoming_data_packet(segment, self.port) {
            return None;
        }
        let packet = TcpPacket::parse(peer, src_ip, dst_ip, segment)?;
        tracing::trace!(packet = %packet, "packet accepted");
        Some(packet)
    }
}

/// Cheap pre-parse filter: only data-bearing TCP packets on the configured
/// port pass. Reads the raw header directly to avoid decoding rejects.
fn is_incoming_data_packet(buf: &[u8], port: u16) -> bool {
    if buf.len() < TCP_HEADER_LEN {
        return false;
    }

    if port != 0 {
        let src_port = u16::from_be_bytes([buf[0], buf[1]]);
        let dst_port = u16::from_be_bytes([buf[2], buf[3]]);
        if src_port != port && dst_port != port {
            return false;
        }
    }

    // SYN, FIN and plain-ACK packets carry no data past the header.
    let data_offset = (buf[12] >> 4) as usize * 4;
    if buf.len() <= data_offset {
        return false;
    }

    !is_heartbeat(buf, data_offset)
}

/// A heartbeat is a single zero payload byte; keepalive noise, not data.
fn is_heartbeat(buf: &[u8], data_offset: usize) -> bool {
    buf.len() - data_offset == 1 && buf[buf.len() - 1] == 0
}

/// Single-threaded routing loop and sole writer of the assembler map.
struct Router {
    assemblers: HashMap<String, mpsc::Sender<TcpPacket>>,
    completed_tx: Option<mpsc::Sender<TcpMessage>>,
    completed_rx: mpsc::Receiver<TcpMessage>,
    messages: mpsc::Sender<TcpMessage>,
}

impl Router {
    fn new(messages: mpsc::Sender<TcpMessage>) -> Router {
        let (completed_tx, completed_rx) = mpsc::channel(COMPLETION_CAPACITY);
        Router {
            assemblers: HashMap::new(),
            completed_tx: Some(completed_tx),
            completed_rx,
            messages,
        }
    }

    async fn run(mut self, mut packets: mpsc::Receiver<TcpPacket>) {
        loop {
            tokio::select! {
                packet = packets.recv(), if self.completed_tx.is_some() => match packet {
                    Some(packet) => self.route(packet).await,
                    // Every feed is gone. Dropping our completion sender lets
                    // the live assemblers drain and the completion stream end.
                    None => self.completed_tx = None,
                },
                completion = self.completed_rx.recv() => match completion {
                    Some(message) => self.publish(message).await,
                    None => break,
                },
            }
        }
    }

    async fn route(&mut self, packet: TcpPacket) {
        let Some(completed_tx) = self.completed_tx.clone() else {
            return;
        };
        let id = packet.message_id();
        let assembler = self
            .assemblers
            .entry(id)
            .or_insert_with_key(|id| TcpMessage::spawn(id.clone(), completed_tx));

        if assembler.send(packet).await.is_err() {
            // The assembler expired and closed its inbound channel before the
            // router processed its completion; the packet has no home.
            tracing::trace!("dropped packet for completed message");
        }
    }

    async fn publish(&mut self, message: TcpMessage) {
        // Remove before publishing: a reused key must never reach a
        // finalized assembler.
        self.assemblers.remove(message.id());
        let source = format!("{}:{}", message.source_ip(), message.source_port());
        tracing::debug!(message = message.id(), source = %source, "message completed");
        // Failure means the consumer dropped the listener; nothing is left
        // to publish to.
        let _ = self.messages.send(message).await;
    }
}
