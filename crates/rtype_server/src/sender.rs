//! # Packet Sender
//!
//! Fans encoded packets out to their recipients.
//!
//! ## Design
//!
//! - Handlers never touch the transport; they queue into an [`Outbox`]
//! - A queued payload is encoded once, whatever its recipient count
//! - The channel comes from the packet type, never from the caller
//! - One server-wide sequence counter stamps every packet
//! - Send failures are counted and logged, never propagated into the tick

use std::net::SocketAddr;

use rtype_protocol::{PacketType, Payload, ProtocolEncoder};

use crate::connection::ConnectionId;
use crate::transport::Transport;

/// One payload addressed to a recipient list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Packet type.
    pub packet_type: PacketType,
    /// Raw (uncompressed) payload bytes.
    pub payload: Vec<u8>,
    /// Recipients.
    pub recipients: Vec<ConnectionId>,
}

/// Work queued for the transport, flushed in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outgoing {
    /// Send a packet.
    Packet(Envelope),
    /// Tie a datagram endpoint to a reliable connection.
    BindUnreliable {
        /// Reliable connection.
        connection: ConnectionId,
        /// Datagram endpoint.
        peer: SocketAddr,
    },
    /// Close a connection after everything queued before it.
    Disconnect(ConnectionId),
}

/// Ordered queue of outgoing work for one tick.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Outgoing>,
}

impl Outbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a typed payload for every connection in `recipients`.
    ///
    /// Nothing is queued for an empty recipient list.
    pub fn push_payload<P: Payload>(&mut self, recipients: Vec<ConnectionId>, payload: &P) {
        self.push_raw(P::PACKET_TYPE, payload.to_bytes(), recipients);
    }

    /// Queues a typed payload for one connection.
    pub fn send_to<P: Payload>(&mut self, connection: ConnectionId, payload: &P) {
        self.push_payload(vec![connection], payload);
    }

    /// Queues already-encoded payload bytes.
    pub fn push_raw(&mut self, packet_type: PacketType, payload: Vec<u8>, recipients: Vec<ConnectionId>) {
        if recipients.is_empty() {
            return;
        }
        self.queue.push(Outgoing::Packet(Envelope {
            packet_type,
            payload,
            recipients,
        }));
    }

    /// Queues a datagram endpoint association.
    pub fn bind(&mut self, connection: ConnectionId, peer: SocketAddr) {
        self.queue.push(Outgoing::BindUnreliable { connection, peer });
    }

    /// Queues a connection close.
    pub fn disconnect(&mut self, connection: ConnectionId) {
        self.queue.push(Outgoing::Disconnect(connection));
    }

    /// Queued entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Takes everything queued so far.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Outgoing> {
        self.queue.drain(..)
    }
}

/// Sender statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Packets handed to the transport.
    pub packets_sent: u64,
    /// Payloads that failed to encode.
    pub encode_errors: u64,
    /// Sends the transport refused.
    pub send_errors: u64,
}

/// Encodes queued payloads and hands them to a transport.
#[derive(Debug)]
pub struct PacketSender {
    encoder: ProtocolEncoder,
    next_sequence: u32,
    stats: SenderStats,
}

impl PacketSender {
    /// Creates a sender framing with `encoder`.
    #[must_use]
    pub fn new(encoder: ProtocolEncoder) -> Self {
        Self {
            encoder,
            next_sequence: 0,
            stats: SenderStats::default(),
        }
    }

    /// Encoder in use.
    #[inline]
    #[must_use]
    pub const fn encoder(&self) -> &ProtocolEncoder {
        &self.encoder
    }

    /// Counters since creation.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> SenderStats {
        self.stats
    }

    /// Sequence number the next packet will carry.
    #[inline]
    #[must_use]
    pub const fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Flushes `outbox` through `transport`, in queue order.
    pub fn flush(&mut self, outbox: &mut Outbox, transport: &mut dyn Transport) {
        for outgoing in outbox.drain() {
            match outgoing {
                Outgoing::Packet(envelope) => self.send_envelope(&envelope, transport),
                Outgoing::BindUnreliable { connection, peer } => {
                    transport.associate_unreliable_peer(connection, peer);
                }
                Outgoing::Disconnect(connection) => transport.disconnect(connection),
            }
        }
    }

    fn send_envelope(&mut self, envelope: &Envelope, transport: &mut dyn Transport) {
        let sequence = self.next_sequence;
        let bytes = match self
            .encoder
            .encode_packet(envelope.packet_type, &envelope.payload, sequence)
        {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.encode_errors += 1;
                tracing::warn!("Dropping outgoing {:?}: {}", envelope.packet_type, e);
                return;
            }
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let channel = envelope.packet_type.channel();
        for &connection in &envelope.recipients {
            match transport.send(channel, connection, &bytes) {
                Ok(()) => self.stats.packets_sent += 1,
                Err(e) => {
                    self.stats.send_errors += 1;
                    tracing::debug!(
                        "Send of {:?} to {} failed: {}",
                        envelope.packet_type,
                        connection,
                        e
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryOutput, MemoryTransport};
    use rtype_protocol::{Channel, ClientPing, CompressionConfig, CompressionStats, ServerPong};
    use std::sync::Arc;

    fn sender() -> PacketSender {
        PacketSender::new(ProtocolEncoder::new(
            CompressionConfig::default(),
            Arc::new(CompressionStats::new()),
        ))
    }

    #[test]
    fn test_fan_out_encodes_once() {
        let (mut transport, handle) = MemoryTransport::pair(16);
        let mut sender = sender();
        let mut outbox = Outbox::new();

        let pong = ServerPong { client_timestamp: 1, server_timestamp: 2 };
        outbox.push_payload(vec![ConnectionId(1), ConnectionId(2)], &pong);
        sender.flush(&mut outbox, &mut transport);

        assert!(outbox.is_empty());
        let out = handle.drain();
        assert_eq!(out.len(), 2);
        let (MemoryOutput::Packet(a), MemoryOutput::Packet(b)) = (&out[0], &out[1]) else {
            panic!("expected packets");
        };
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.channel, Channel::Reliable);
        assert_eq!(sender.next_sequence(), 1);
        assert_eq!(sender.stats().packets_sent, 2);
    }

    #[test]
    fn test_empty_recipients_skipped() {
        let mut outbox = Outbox::new();
        outbox.push_payload(Vec::new(), &ClientPing { player_id: 1, client_timestamp: 0 });
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_unbound_snapshot_is_counted_not_fatal() {
        let (mut transport, handle) = MemoryTransport::pair(16);
        let mut sender = sender();
        let mut outbox = Outbox::new();

        outbox.push_raw(PacketType::Snapshot, vec![0; 10], vec![ConnectionId(1)]);
        outbox.disconnect(ConnectionId(1));
        sender.flush(&mut outbox, &mut transport);

        assert_eq!(sender.stats().send_errors, 1);
        assert_eq!(handle.drain(), vec![MemoryOutput::Closed(ConnectionId(1))]);
    }

    #[test]
    fn test_oversized_payload_dropped() {
        let (mut transport, handle) = MemoryTransport::pair(16);
        let mut sender = sender();
        let mut outbox = Outbox::new();

        outbox.push_raw(PacketType::Snapshot, vec![0; 5000], vec![ConnectionId(1)]);
        sender.flush(&mut outbox, &mut transport);

        assert_eq!(sender.stats().encode_errors, 1);
        assert_eq!(sender.next_sequence(), 0);
        assert!(handle.drain().is_empty());
    }
}
