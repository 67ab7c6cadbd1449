//! # Server Error Types
//!
//! Per-packet errors are caught at the router's dispatch boundary and logged;
//! only bind and configuration failures stop the server.

use rtype_protocol::ProtocolError;
use thiserror::Error;

/// A well-formed packet that makes no sense in the sender's current state.
///
/// Dropped at the routing layer without touching any state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolStateError {
    /// No player is registered for the sender.
    #[error("unknown player")]
    UnknownPlayer,

    /// The payload names a player other than the sender.
    #[error("player id mismatch: sender is {sender}, payload claims {claimed}")]
    PlayerIdMismatch {
        /// Id bound to the sending connection.
        sender: u32,
        /// Id carried in the payload.
        claimed: u32,
    },

    /// Sender already completed CONNECT.
    #[error("player {0} is already connected")]
    AlreadyConnected(u32),

    /// Sender is not a member of the referenced lobby.
    #[error("player {0} is not in a lobby")]
    NotInLobby(u32),

    /// Sender is not a member of the referenced session.
    #[error("player {player_id} is not in session {session_id}")]
    NotInSession {
        /// Sender.
        player_id: u32,
        /// Session referenced.
        session_id: u32,
    },

    /// Sender is already waiting in a lobby, a room or a match.
    #[error("player {0} is already in a lobby, room or session")]
    AlreadyBusy(u32),

    /// Packet arrived on the channel its type does not belong to.
    #[error("packet type {packet_type:#04x} arrived on the wrong channel")]
    WrongChannel {
        /// Raw packet type.
        packet_type: u8,
    },

    /// A packet type only the server may send.
    #[error("packet type {0:#04x} is server-to-client only")]
    ServerOnlyPacket(u8),

    /// Unreliable packet from an endpoint no player has bound.
    #[error("datagram from unbound endpoint")]
    UnboundUnreliablePeer,

    /// Admin command from a player that has not authenticated.
    #[error("player {0} is not an authenticated admin")]
    NotAdmin(u32),
}

/// Errors produced by the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Wire-level failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Packet refused for the sender's state.
    #[error("state error: {0}")]
    State(#[from] ProtocolStateError),

    /// A listening socket could not be bound. Fatal.
    #[error("failed to bind {address}: {reason}")]
    Bind {
        /// Address attempted.
        address: String,
        /// OS error.
        reason: String,
    },

    /// Socket I/O failure on an established connection.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration rejected. Fatal.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ServerError {
    /// True for errors that must stop the server before its run loop.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::InvalidConfig(_))
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
