//! Per-message packet aggregation and inactivity-driven completion.
//!
//! Every TCP packet carries two identifiers: the acknowledgment number names
//! the message it belongs to, the sequence number orders it within that
//! message. A message is considered complete once no packet has arrived for
//! [`MESSAGE_EXPIRE`]; fragmentation and retransmission make any earlier
//! cutoff unreliable.

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use crate::sniffer::packet::TcpPacket;

/// Inactivity window after which a message is considered complete.
pub const MESSAGE_EXPIRE: Duration = Duration::from_millis(2000);

/// Capacity of an assembler's inbound packet channel. Must stay non-zero:
/// packet loss under burst is unacceptable.
const INBOUND_CAPACITY: usize = 100;

/// All packets collected for one message key, in arrival order.
///
/// While the message is live an assembler task owns it exclusively; the
/// value handed to the consumer on completion is plain immutable data.
#[derive(Debug)]
pub struct TcpMessage {
    id: String,
    packets: Vec<TcpPacket>,
}

impl TcpMessage {
    fn new(id: String) -> TcpMessage {
        TcpMessage {
            id,
            packets: Vec::new(),
        }
    }

    /// Start an assembler for the given message key. Returns the inbound
    /// packet sender; the finished message is published on `completed` once
    /// the inactivity window elapses.
    pub(crate) fn spawn(
        id: String,
        completed: mpsc::Sender<TcpMessage>,
    ) -> mpsc::Sender<TcpPacket> {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        tokio::spawn(assemble(TcpMessage::new(id), inbound_rx, completed));
        inbound_tx
    }

    /// Message key (peer address + ack, see [`TcpPacket::message_id`]).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add a packet, discarding it when a held packet already has the same
    /// sequence number (TCP retransmits).
    fn add_packet(&mut self, packet: TcpPacket) {
        if self.packets.iter().any(|held| held.seq == packet.seq) {
            return;
        }
        self.packets.push(packet);
    }

    /// Payloads of the held packets, concatenated in ascending sequence
    /// order. Ordering is naive unsigned comparison; a message spanning a
    /// 32-bit sequence wrap would sort wrongly, which the 2 s lifetime makes
    /// irrelevant in practice.
    pub fn bytes(&self) -> Vec<u8> {
        let mut ordered: Vec<&TcpPacket> = self.packets.iter().collect();
        ordered.sort_by_key(|packet| packet.seq);

        let total = ordered.iter().map(|packet| packet.payload.len()).sum();
        let mut out = Vec::with_capacity(total);
        for packet in ordered {
            out.extend_from_slice(&packet.payload);
        }
        out
    }

    pub fn source_port(&self) -> u16 {
        self.lowest().map_or(0, |packet| packet.src_port)
    }

    pub fn destination_port(&self) -> u16 {
        self.lowest().map_or(0, |packet| packet.dst_port)
    }

    pub fn source_ip(&self) -> &str {
        self.lowest().map_or("0.0.0.0", |packet| packet.src_ip.as_str())
    }

    pub fn destination_ip(&self) -> &str {
        self.lowest().map_or("0.0.0.0", |packet| packet.dst_ip.as_str())
    }

    pub fn sequence_number(&self) -> u32 {
        self.lowest().map_or(0, |packet| packet.seq)
    }

    fn lowest(&self) -> Option<&TcpPacket> {
        self.packets.iter().min_by_key(|packet| packet.seq)
    }
}

/// Assembler task: collect packets until the inactivity window elapses,
/// then publish the finished message.
///
/// The timeout wraps every `recv`, so each accepted packet (duplicates
/// included) re-arms the full window. Completion runs exactly once by
/// construction: the loop is left a single time, the inbound channel is
/// closed, and any packet that raced in before the close is still accepted.
/// A sender that loses the race observes a closed channel instead.
async fn assemble(
    mut message: TcpMessage,
    mut inbound: mpsc::Receiver<TcpPacket>,
    completed: mpsc::Sender<TcpMessage>,
) {
    loop {
        match timeout(MESSAGE_EXPIRE, inbound.recv()).await {
            Ok(Some(packet)) => message.add_packet(packet),
            // Channel closed: the listener is shutting down.
            Ok(None) => break,
            // Inactivity window elapsed.
            Err(_) => break,
        }
    }

    inbound.close();
    while let Ok(packet) = inbound.try_recv() {
        message.add_packet(packet);
    }

    // The router drops the message only when it is shutting down itself.
    let _ = completed.send(message).await;
}
