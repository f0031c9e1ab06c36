//! Streaming input facade over the sniffer.
//!
//! Presents captured messages as a plain byte stream so downstream replay
//! logic can consume them like any other reader. One pump task sits between
//! the listener and the consumer and forwards each completed message's
//! payload.

use std::fmt;
use std::io;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::sniffer::Listener;

/// Byte-stream view of captured HTTP traffic.
pub struct RawInput {
    address: String,
    payloads: mpsc::Receiver<Vec<u8>>,
}

impl RawInput {
    /// Start capturing on `address` (`host:port`; port `0` or empty captures
    /// every port). The unspecified address `[::]` is rewritten to
    /// `127.0.0.1`.
    pub fn listen(address: &str) -> Result<RawInput> {
        let address = address.replace("[::]", "127.0.0.1");
        let (host, port) = address
            .rsplit_once(':')
            .with_context(|| format!("input address must be host:port, got {address}"))?;

        if port.parse::<u16>().unwrap_or(0) == 0 {
            println!("listen on {host}");
        } else {
            println!("listen on {address}");
        }

        let listener = Listener::bind(host, port)?;
        Ok(RawInput::from_listener(address, listener))
    }

    /// Pump an existing listener; lets alternate capture sources reuse the
    /// same streaming surface.
    pub fn from_listener(address: String, mut listener: Listener) -> RawInput {
        // Rendezvous-sized: the pump holds at most one payload ahead of the
        // consumer, back-pressure stays in the listener's bounded channels.
        let (payload_tx, payload_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            while let Some(message) = listener.receive().await {
                let source = format!("{}:{}", message.source_ip(), message.source_port());
                let destination =
                    format!("{}:{}", message.destination_ip(), message.destination_port());
                let payload = message.bytes();
                tracing::debug!(
                    source = %source,
                    destination = %destination,
                    sequence = message.sequence_number(),
                    len = payload.len(),
                    "message assembled"
                );
                if payload_tx.send(payload).await.is_err() {
                    break;
                }
            }
        });

        RawInput {
            address,
            payloads: payload_rx,
        }
    }

    /// Next reassembled payload; `None` once capture has ended.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.payloads.recv().await
    }

    /// Copy the next payload into `dst`, truncating to its length. Returns
    /// the number of bytes copied, `Ok(0)` at end of stream.
    pub async fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let Some(payload) = self.recv().await else {
            return Ok(0);
        };
        let len = payload.len().min(dst.len());
        dst[..len].copy_from_slice(&payload[..len]);
        Ok(len)
    }

}

impl fmt::Display for RawInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RAW Socket input: {}", self.address)
    }
}
