//! # Packet Types
//!
//! The closed set of packet discriminants carried in the header `type` byte.
//!
//! ```text
//! 0x01-0x1F  client -> server  connection, lobby, input
//! 0x20-0x3F  client -> server  rooms, profile, admin
//! 0x81-0x97  server -> client  connection, lobby, room acks
//! 0xA0-0xAF  server -> client  world state
//! 0xB0-0xB4  server -> client  entity events
//! 0xC0-0xC8  server -> client  game mechanics
//! 0xD0-0xD3  server -> client  admin notifications
//! ```

use crate::error::ProtocolError;

/// Logical transport channel a packet travels on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Ordered, guaranteed delivery (TCP).
    Reliable,
    /// Best-effort datagrams (UDP).
    Unreliable,
}

macro_rules! packet_types {
    ($( $(#[$doc:meta])* $name:ident = $value:literal ),+ $(,)?) => {
        /// Every packet type understood by the protocol.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum PacketType {
            $( $(#[$doc])* $name = $value, )+
        }

        impl PacketType {
            /// All packet types, in discriminant order.
            pub const ALL: &'static [PacketType] = &[$( PacketType::$name, )+];
        }

        impl TryFrom<u8> for PacketType {
            type Error = ProtocolError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok(Self::$name), )+
                    other => Err(ProtocolError::UnknownPacketType(other)),
                }
            }
        }
    };
}

packet_types! {
    /// Client requests a connection.
    Connect = 0x01,
    /// Client leaves gracefully.
    Disconnect = 0x02,
    /// Latency probe.
    Ping = 0x04,
    /// Enter quick-match for a mode and difficulty.
    JoinLobby = 0x05,
    /// Leave the current quick-match lobby.
    LeaveLobby = 0x06,
    /// Binds the unreliable channel to a player and session.
    UdpHandshake = 0x08,
    /// Player input for one client tick.
    Input = 0x10,
    /// Create a custom room.
    CreateRoom = 0x20,
    /// Join a custom room.
    JoinRoom = 0x21,
    /// Leave a custom room.
    LeaveRoom = 0x22,
    /// Ask for the public room list.
    RequestRoomList = 0x23,
    /// Host starts a custom room.
    StartGame = 0x24,
    /// Change display name.
    SetPlayerName = 0x25,
    /// Change ship skin.
    SetPlayerSkin = 0x26,
    /// Ask for the global leaderboard.
    RequestGlobalLeaderboard = 0x27,
    /// Admin login.
    AdminAuth = 0x30,
    /// Admin command.
    AdminCommand = 0x31,

    /// Connection accepted.
    Accept = 0x81,
    /// Connection refused.
    Reject = 0x82,
    /// Another player joined.
    PlayerJoined = 0x83,
    /// Another player left.
    PlayerLeft = 0x84,
    /// Reply to [`PacketType::Ping`].
    Pong = 0x85,
    /// Full lobby membership broadcast.
    LobbyState = 0x87,
    /// One countdown second elapsed.
    GameStartCountdown = 0x88,
    /// Countdown aborted.
    CountdownCancelled = 0x89,
    /// Match begins.
    GameStart = 0x8A,
    /// Room creation acknowledged.
    RoomCreated = 0x90,
    /// Public room listing.
    RoomList = 0x91,
    /// Room join acknowledged.
    RoomJoined = 0x92,
    /// Room leave acknowledged.
    RoomLeft = 0x93,
    /// Full room membership broadcast.
    RoomStateUpdate = 0x94,
    /// Room operation refused.
    RoomError = 0x95,
    /// A member changed name.
    NameUpdated = 0x96,
    /// A member changed skin.
    SkinUpdated = 0x97,
    /// Full world snapshot.
    Snapshot = 0xA0,
    /// Changed entities only.
    DeltaSnapshot = 0xA1,
    /// Entity created.
    EntitySpawn = 0xB0,
    /// Entity removed.
    EntityDestroy = 0xB1,
    /// Entity hit.
    EntityDamage = 0xB2,
    /// Projectile fired.
    ProjectileSpawn = 0xB3,
    /// Visual explosion.
    Explosion = 0xB4,
    /// Powerup picked up.
    PowerupCollected = 0xC0,
    /// Score changed.
    ScoreUpdate = 0xC1,
    /// Wave begins.
    WaveStart = 0xC2,
    /// Wave cleared.
    WaveComplete = 0xC3,
    /// Player respawned.
    Respawn = 0xC5,
    /// Match ended.
    GameOver = 0xC6,
    /// End-of-match ranking.
    Leaderboard = 0xC7,
    /// All-time ranking.
    GlobalLeaderboard = 0xC8,
    /// Admin login result.
    AdminAuthResult = 0xD0,
    /// Admin command result.
    AdminCommandResult = 0xD1,
    /// Message pushed by an admin.
    AdminNotification = 0xD2,
    /// Recipient is being kicked.
    KickNotification = 0xD3,
}

impl PacketType {
    /// Raw discriminant.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// True for packets a client sends to the server.
    #[inline]
    #[must_use]
    pub const fn is_client_to_server(self) -> bool {
        (self as u8) < 0x80
    }

    /// Channel a client-to-server packet must arrive on.
    ///
    /// Reliable and unreliable sets are disjoint. Server-to-client types
    /// report the channel the server sends them on: only snapshots go out
    /// unreliably, discrete events must not be lost between frames.
    #[must_use]
    pub const fn channel(self) -> Channel {
        match self {
            Self::UdpHandshake | Self::Input | Self::Snapshot | Self::DeltaSnapshot => {
                Channel::Unreliable
            }
            _ => Channel::Reliable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_from_round_trip() {
        for &ty in PacketType::ALL {
            assert_eq!(PacketType::try_from(ty.as_u8()), Ok(ty));
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert_eq!(
            PacketType::try_from(0x03),
            Err(ProtocolError::UnknownPacketType(0x03))
        );
        assert!(PacketType::try_from(0xFF).is_err());
    }

    #[test]
    fn test_direction_ranges() {
        assert!(PacketType::Connect.is_client_to_server());
        assert!(PacketType::AdminCommand.is_client_to_server());
        assert!(!PacketType::Accept.is_client_to_server());
        assert!(!PacketType::KickNotification.is_client_to_server());
    }

    #[test]
    fn test_client_channels_disjoint() {
        let unreliable: Vec<_> = PacketType::ALL
            .iter()
            .filter(|t| t.is_client_to_server() && t.channel() == Channel::Unreliable)
            .collect();
        assert_eq!(unreliable, vec![&PacketType::UdpHandshake, &PacketType::Input]);
        assert_eq!(PacketType::Ping.channel(), Channel::Reliable);
        assert_eq!(PacketType::JoinLobby.channel(), Channel::Reliable);
    }
}
