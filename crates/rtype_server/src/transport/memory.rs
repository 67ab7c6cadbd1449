//! In-process transport over bounded channels.
//!
//! The server owns a [`MemoryTransport`]; a test or embedding host drives the
//! other end through a [`MemoryHandle`].

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use crossbeam_channel::{bounded, Receiver, Sender};
use rtype_protocol::Channel;

use super::{Transport, TransportEvent, TransportStats};
use crate::connection::ConnectionId;
use crate::error::{ProtocolStateError, ServerError, ServerResult};

/// A packet the server sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundPacket {
    /// Channel used.
    pub channel: Channel,
    /// Recipient connection.
    pub connection: ConnectionId,
    /// Datagram endpoint for unreliable packets.
    pub peer: Option<SocketAddr>,
    /// Packet bytes.
    pub bytes: Vec<u8>,
}

/// Everything the server pushes out through the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryOutput {
    /// A packet.
    Packet(OutboundPacket),
    /// The server closed a connection.
    Closed(ConnectionId),
}

/// Server side of the in-process transport.
#[derive(Debug)]
pub struct MemoryTransport {
    inbound: Receiver<TransportEvent>,
    outbound: Sender<MemoryOutput>,
    peers: HashMap<ConnectionId, SocketAddr>,
    stats: TransportStats,
}

/// Client side of the in-process transport.
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    inbound: Sender<TransportEvent>,
    outbound: Receiver<MemoryOutput>,
}

impl MemoryTransport {
    /// Creates a connected transport/handle pair with `capacity` slots each way.
    #[must_use]
    pub fn pair(capacity: usize) -> (Self, MemoryHandle) {
        let (in_tx, in_rx) = bounded(capacity);
        let (out_tx, out_rx) = bounded(capacity);
        (
            Self {
                inbound: in_rx,
                outbound: out_tx,
                peers: HashMap::new(),
                stats: TransportStats::default(),
            },
            MemoryHandle {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }

    fn push(&mut self, output: MemoryOutput) -> ServerResult<()> {
        self.outbound.try_send(output).map_err(|_| {
            self.stats.send_errors += 1;
            ServerError::Io(io::Error::new(io::ErrorKind::WouldBlock, "outbound queue full"))
        })
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, channel: Channel, connection: ConnectionId, bytes: &[u8]) -> ServerResult<()> {
        let peer = match channel {
            Channel::Reliable => None,
            Channel::Unreliable => Some(
                *self
                    .peers
                    .get(&connection)
                    .ok_or(ProtocolStateError::UnboundUnreliablePeer)?,
            ),
        };
        self.push(MemoryOutput::Packet(OutboundPacket {
            channel,
            connection,
            peer,
            bytes: bytes.to_vec(),
        }))?;
        self.stats.record_send(bytes.len());
        Ok(())
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        let event = self.inbound.try_recv().ok()?;
        match &event {
            TransportEvent::Reliable { bytes, .. } | TransportEvent::Unreliable { bytes, .. } => {
                self.stats.record_recv(bytes.len());
            }
            TransportEvent::Disconnected(connection) => {
                self.peers.remove(connection);
            }
            TransportEvent::Connected(_) => {}
        }
        Some(event)
    }

    fn associate_unreliable_peer(&mut self, connection: ConnectionId, peer: SocketAddr) {
        self.peers.insert(connection, peer);
    }

    fn disconnect(&mut self, connection: ConnectionId) {
        self.peers.remove(&connection);
        if self.push(MemoryOutput::Closed(connection)).is_err() {
            tracing::warn!("Close notification for {} dropped: queue full", connection);
        }
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

impl MemoryHandle {
    /// Opens a reliable connection.
    pub fn connect(&self, connection: ConnectionId) -> bool {
        self.inbound.try_send(TransportEvent::Connected(connection)).is_ok()
    }

    /// Closes a reliable connection from the client side.
    pub fn close(&self, connection: ConnectionId) -> bool {
        self.inbound.try_send(TransportEvent::Disconnected(connection)).is_ok()
    }

    /// Delivers a reliable packet.
    pub fn send_reliable(&self, connection: ConnectionId, bytes: Vec<u8>) -> bool {
        self.inbound
            .try_send(TransportEvent::Reliable { connection, bytes })
            .is_ok()
    }

    /// Delivers a datagram.
    pub fn send_unreliable(&self, from: SocketAddr, bytes: Vec<u8>) -> bool {
        self.inbound
            .try_send(TransportEvent::Unreliable { from, bytes })
            .is_ok()
    }

    /// Everything the server has sent since the last drain.
    #[must_use]
    pub fn drain(&self) -> Vec<MemoryOutput> {
        self.outbound.try_iter().collect()
    }
}
