//! # Packet Router
//!
//! Turns raw packets from either channel into typed listener calls.
//!
//! ## Pipeline
//!
//! ```text
//! bytes ──▶ decode frame ──▶ direction ──▶ channel ──▶ payload size ──▶ decode fields ──▶ listener
//!              │                 │            │             │                                │
//!            debug             debug        warn          warn                        debug / warn
//! ```
//!
//! Every stage drops the packet on failure. Nothing escapes `route`: a bad
//! packet costs the sender that packet and nothing else.

use std::fmt;
use std::net::SocketAddr;

use rtype_protocol::{
    check_payload_size, Channel, ClientAdminAuth, ClientAdminCommand, ClientConnect, ClientCreateRoom,
    ClientDisconnect, ClientInput, ClientJoinLobby, ClientJoinRoom, ClientLeaveLobby, ClientLeaveRoom,
    ClientPing, ClientSetPlayerName, ClientSetPlayerSkin, ClientStartGame, ClientUdpHandshake,
    EmptyPayload, PacketType, Payload, ProtocolEncoder, ProtocolError,
};

use crate::connection::ConnectionId;
use crate::error::{ProtocolStateError, ServerError, ServerResult};

/// Where a packet came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketSource {
    /// A reliable connection.
    Reliable(ConnectionId),
    /// A datagram endpoint.
    Unreliable(SocketAddr),
}

impl PacketSource {
    /// Channel the packet arrived on.
    #[inline]
    #[must_use]
    pub const fn channel(self) -> Channel {
        match self {
            Self::Reliable(_) => Channel::Reliable,
            Self::Unreliable(_) => Channel::Unreliable,
        }
    }
}

impl fmt::Display for PacketSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reliable(connection) => write!(f, "{connection}"),
            Self::Unreliable(peer) => write!(f, "udp://{peer}"),
        }
    }
}

/// Receives one call per valid client packet.
///
/// Reliable-channel packets carry the sending connection; unreliable ones
/// carry the datagram endpoint, which the listener maps to a player itself.
/// An error return drops the packet; the router logs it.
pub trait PacketListener {
    /// CONNECT.
    fn on_connect(&mut self, connection: ConnectionId, packet: ClientConnect) -> ServerResult<()>;
    /// DISCONNECT.
    fn on_disconnect(&mut self, connection: ConnectionId, packet: ClientDisconnect) -> ServerResult<()>;
    /// PING.
    fn on_ping(&mut self, connection: ConnectionId, packet: ClientPing) -> ServerResult<()>;
    /// JOIN_LOBBY.
    fn on_join_lobby(&mut self, connection: ConnectionId, packet: ClientJoinLobby) -> ServerResult<()>;
    /// LEAVE_LOBBY.
    fn on_leave_lobby(&mut self, connection: ConnectionId, packet: ClientLeaveLobby) -> ServerResult<()>;
    /// UDP_HANDSHAKE.
    fn on_udp_handshake(&mut self, peer: SocketAddr, packet: ClientUdpHandshake) -> ServerResult<()>;
    /// INPUT.
    fn on_input(&mut self, peer: SocketAddr, packet: ClientInput) -> ServerResult<()>;
    /// CREATE_ROOM.
    fn on_create_room(&mut self, connection: ConnectionId, packet: ClientCreateRoom) -> ServerResult<()>;
    /// JOIN_ROOM.
    fn on_join_room(&mut self, connection: ConnectionId, packet: ClientJoinRoom) -> ServerResult<()>;
    /// LEAVE_ROOM.
    fn on_leave_room(&mut self, connection: ConnectionId, packet: ClientLeaveRoom) -> ServerResult<()>;
    /// REQUEST_ROOM_LIST.
    fn on_request_room_list(&mut self, connection: ConnectionId) -> ServerResult<()>;
    /// START_GAME.
    fn on_start_game(&mut self, connection: ConnectionId, packet: ClientStartGame) -> ServerResult<()>;
    /// SET_PLAYER_NAME.
    fn on_set_player_name(&mut self, connection: ConnectionId, packet: ClientSetPlayerName) -> ServerResult<()>;
    /// SET_PLAYER_SKIN.
    fn on_set_player_skin(&mut self, connection: ConnectionId, packet: ClientSetPlayerSkin) -> ServerResult<()>;
    /// REQUEST_GLOBAL_LEADERBOARD.
    fn on_request_global_leaderboard(&mut self, connection: ConnectionId) -> ServerResult<()>;
    /// ADMIN_AUTH.
    fn on_admin_auth(&mut self, connection: ConnectionId, packet: ClientAdminAuth) -> ServerResult<()>;
    /// ADMIN_COMMAND.
    fn on_admin_command(&mut self, connection: ConnectionId, packet: ClientAdminCommand) -> ServerResult<()>;
}

/// Drop counters, one per pipeline stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Packets handed to the listener.
    pub dispatched: u64,
    /// Header could not be framed.
    pub frame_errors: u64,
    /// Type byte unknown.
    pub unknown_types: u64,
    /// Compressed payload failed to restore.
    pub decompression_errors: u64,
    /// Server-to-client type sent by a client.
    pub server_only: u64,
    /// Type on the wrong channel.
    pub wrong_channel: u64,
    /// Payload size differs from the registry.
    pub size_mismatches: u64,
    /// An enumerated field held an unknown value.
    pub invalid_fields: u64,
    /// Listener refused the packet for the sender's state.
    pub state_rejections: u64,
    /// Listener failed for another reason.
    pub handler_errors: u64,
}

impl RouterStats {
    /// Every packet dropped at any stage.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.frame_errors
            + self.unknown_types
            + self.decompression_errors
            + self.server_only
            + self.wrong_channel
            + self.size_mismatches
            + self.invalid_fields
            + self.state_rejections
            + self.handler_errors
    }
}

/// Decodes and dispatches inbound packets.
#[derive(Debug)]
pub struct PacketRouter {
    decoder: ProtocolEncoder,
    stats: RouterStats,
}

impl PacketRouter {
    /// Creates a router decoding with `decoder`.
    #[must_use]
    pub fn new(decoder: ProtocolEncoder) -> Self {
        Self {
            decoder,
            stats: RouterStats::default(),
        }
    }

    /// Counters since creation.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Routes one packet. Returns true if the listener accepted it.
    pub fn route<L: PacketListener>(&mut self, source: PacketSource, bytes: &[u8], listener: &mut L) -> bool {
        let packet = match self.decoder.decode_packet(bytes) {
            Ok(packet) => packet,
            Err(ProtocolError::UnknownPacketType(raw)) => {
                self.stats.unknown_types += 1;
                tracing::debug!("Dropped unknown packet type {:#04x} from {}", raw, source);
                return false;
            }
            Err(ProtocolError::Decompression(reason)) => {
                self.stats.decompression_errors += 1;
                tracing::warn!("Dropped undecompressable packet from {}: {}", source, reason);
                return false;
            }
            Err(e) => {
                self.stats.frame_errors += 1;
                tracing::debug!("Dropped malformed packet from {}: {}", source, e);
                return false;
            }
        };
        let packet_type = packet.packet_type;

        if !packet_type.is_client_to_server() {
            self.stats.server_only += 1;
            tracing::debug!("Dropped server-only {:?} from {}", packet_type, source);
            return false;
        }

        if packet_type.channel() != source.channel() {
            self.stats.wrong_channel += 1;
            tracing::warn!(
                "Dropped {:?} from {}: expected on {:?} channel",
                packet_type,
                source,
                packet_type.channel()
            );
            return false;
        }

        if let Err(e) = check_payload_size(packet_type, &packet.payload) {
            self.stats.size_mismatches += 1;
            tracing::warn!("Dropped {:?} from {}: {}", packet_type, source, e);
            return false;
        }

        match dispatch(packet_type, &packet.payload, source, listener) {
            Ok(()) => {
                self.stats.dispatched += 1;
                true
            }
            Err(ServerError::Protocol(e)) => {
                self.stats.invalid_fields += 1;
                tracing::debug!("Dropped {:?} from {}: {}", packet_type, source, e);
                false
            }
            Err(ServerError::State(e)) => {
                self.stats.state_rejections += 1;
                tracing::debug!("Ignored {:?} from {}: {}", packet_type, source, e);
                false
            }
            Err(e) => {
                self.stats.handler_errors += 1;
                tracing::warn!("Handler for {:?} from {} failed: {}", packet_type, source, e);
                false
            }
        }
    }
}

fn parse<P: Payload>(payload: &[u8]) -> ServerResult<P> {
    Ok(P::from_bytes(payload)?)
}

/// Invokes the listener method for `packet_type`.
fn dispatch<L: PacketListener>(
    packet_type: PacketType,
    payload: &[u8],
    source: PacketSource,
    listener: &mut L,
) -> ServerResult<()> {
    use PacketType as T;

    let connection = match source {
        PacketSource::Unreliable(peer) => {
            return match packet_type {
                T::UdpHandshake => listener.on_udp_handshake(peer, parse(payload)?),
                T::Input => listener.on_input(peer, parse(payload)?),
                other => Err(ProtocolStateError::WrongChannel { packet_type: other.as_u8() }.into()),
            };
        }
        PacketSource::Reliable(connection) => connection,
    };

    match packet_type {
        T::Connect => listener.on_connect(connection, parse(payload)?),
        T::Disconnect => listener.on_disconnect(connection, parse(payload)?),
        T::Ping => listener.on_ping(connection, parse(payload)?),
        T::JoinLobby => listener.on_join_lobby(connection, parse(payload)?),
        T::LeaveLobby => listener.on_leave_lobby(connection, parse(payload)?),
        T::CreateRoom => listener.on_create_room(connection, parse(payload)?),
        T::JoinRoom => listener.on_join_room(connection, parse(payload)?),
        T::LeaveRoom => listener.on_leave_room(connection, parse(payload)?),
        T::RequestRoomList => {
            EmptyPayload::check(packet_type, payload)?;
            listener.on_request_room_list(connection)
        }
        T::StartGame => listener.on_start_game(connection, parse(payload)?),
        T::SetPlayerName => listener.on_set_player_name(connection, parse(payload)?),
        T::SetPlayerSkin => listener.on_set_player_skin(connection, parse(payload)?),
        T::RequestGlobalLeaderboard => {
            EmptyPayload::check(packet_type, payload)?;
            listener.on_request_global_leaderboard(connection)
        }
        T::AdminAuth => listener.on_admin_auth(connection, parse(payload)?),
        T::AdminCommand => listener.on_admin_command(connection, parse(payload)?),
        T::UdpHandshake | T::Input => {
            Err(ProtocolStateError::WrongChannel { packet_type: packet_type.as_u8() }.into())
        }
        other => Err(ProtocolStateError::ServerOnlyPacket(other.as_u8()).into()),
    }
}
