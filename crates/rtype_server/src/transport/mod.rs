//! # Transport Layer
//!
//! The boundary between the server loop and the network.
//!
//! ## Design
//!
//! - Two logical channels per player: reliable/ordered and unreliable datagrams
//! - Polling never blocks; each call returns whatever is already queued
//! - Connection liveness is the transport's job and surfaces only as
//!   [`TransportEvent::Disconnected`]
//! - The unreliable endpoint is tied to a reliable connection by an explicit
//!   association made after the handshake

mod memory;
mod socket;

pub use memory::{MemoryHandle, MemoryOutput, MemoryTransport, OutboundPacket};
pub use socket::SocketTransport;

use std::net::SocketAddr;

use rtype_protocol::Channel;

use crate::connection::ConnectionId;
use crate::error::ServerResult;

/// Something the transport observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A reliable connection was opened.
    Connected(ConnectionId),
    /// A reliable connection closed or timed out.
    Disconnected(ConnectionId),
    /// One complete packet on the reliable channel.
    Reliable {
        /// Sending connection.
        connection: ConnectionId,
        /// Packet bytes, header included.
        bytes: Vec<u8>,
    },
    /// One datagram on the unreliable channel.
    Unreliable {
        /// Sending endpoint.
        from: SocketAddr,
        /// Packet bytes, header included.
        bytes: Vec<u8>,
    },
}

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Packets sent.
    pub packets_sent: u64,
    /// Packets received.
    pub packets_received: u64,
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// Send errors.
    pub send_errors: u64,
    /// Receive errors.
    pub recv_errors: u64,
}

impl TransportStats {
    /// Counts one successful send.
    #[inline]
    pub fn record_send(&mut self, len: usize) {
        self.packets_sent += 1;
        self.bytes_sent += len as u64;
    }

    /// Counts one received packet.
    #[inline]
    pub fn record_recv(&mut self, len: usize) {
        self.packets_received += 1;
        self.bytes_received += len as u64;
    }
}

/// A network backend the server loop can drive.
pub trait Transport {
    /// Sends one packet to `connection` on `channel`.
    ///
    /// On [`Channel::Unreliable`] the packet goes to the endpoint associated
    /// with the connection; sending before association is an error.
    fn send(&mut self, channel: Channel, connection: ConnectionId, bytes: &[u8]) -> ServerResult<()>;

    /// Next pending event, if any. Never blocks.
    fn poll(&mut self) -> Option<TransportEvent>;

    /// Ties a datagram endpoint to a reliable connection.
    fn associate_unreliable_peer(&mut self, connection: ConnectionId, peer: SocketAddr);

    /// Closes a reliable connection and forgets its association.
    fn disconnect(&mut self, connection: ConnectionId);

    /// Counters since creation.
    fn stats(&self) -> TransportStats;
}
