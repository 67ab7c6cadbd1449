//! # Payload Registry
//!
//! Maps every packet type to the exact byte layout of its payload. The router
//! consults this before any field is read, so a packet of the wrong size never
//! reaches application logic.

use crate::error::{ProtocolError, ProtocolResult};
use crate::packet_type::PacketType;
use crate::payload::*;

/// Size contract of one packet type's payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadLayout {
    /// Exactly this many bytes (zero for body-less packets).
    Fixed(usize),
    /// A header of `header` bytes whose count field at `count_offset`
    /// (`count_width` bytes, big-endian) gives the number of `entry`-byte
    /// records that follow.
    Counted {
        /// Header size.
        header: usize,
        /// Offset of the count field inside the header.
        count_offset: usize,
        /// Width of the count field: 1 or 2.
        count_width: usize,
        /// Size of each entry.
        entry: usize,
    },
}

impl PayloadLayout {
    /// Expected payload size for a buffer, reading the count if needed.
    ///
    /// Returns `None` when a counted header is itself truncated.
    #[must_use]
    pub fn expected_size(self, bytes: &[u8]) -> Option<usize> {
        match self {
            Self::Fixed(size) => Some(size),
            Self::Counted { header, count_offset, count_width, entry } => {
                if bytes.len() < header {
                    return None;
                }
                let count = match count_width {
                    1 => usize::from(bytes[count_offset]),
                    _ => usize::from(u16::from_be_bytes([bytes[count_offset], bytes[count_offset + 1]])),
                };
                Some(header + count * entry)
            }
        }
    }

    /// Smallest valid payload.
    #[must_use]
    pub const fn min_size(self) -> usize {
        match self {
            Self::Fixed(size) => size,
            Self::Counted { header, .. } => header,
        }
    }
}

const fn fixed<T: WireRecord>() -> PayloadLayout {
    PayloadLayout::Fixed(T::SIZE)
}

const fn counted<H: WireRecord, E: WireRecord>(count_offset: usize, count_width: usize) -> PayloadLayout {
    PayloadLayout::Counted {
        header: H::SIZE,
        count_offset,
        count_width,
        entry: E::SIZE,
    }
}

/// Layout of the payload carried by `packet_type`.
#[must_use]
pub const fn payload_layout(packet_type: PacketType) -> PayloadLayout {
    use PacketType as T;
    match packet_type {
        T::Connect => fixed::<ClientConnect>(),
        T::Disconnect => fixed::<ClientDisconnect>(),
        T::Ping => fixed::<ClientPing>(),
        T::JoinLobby => fixed::<ClientJoinLobby>(),
        T::LeaveLobby => fixed::<ClientLeaveLobby>(),
        T::UdpHandshake => fixed::<ClientUdpHandshake>(),
        T::Input => fixed::<ClientInput>(),
        T::CreateRoom => fixed::<ClientCreateRoom>(),
        T::JoinRoom => fixed::<ClientJoinRoom>(),
        T::LeaveRoom => fixed::<ClientLeaveRoom>(),
        T::RequestRoomList | T::RequestGlobalLeaderboard => PayloadLayout::Fixed(0),
        T::StartGame => fixed::<ClientStartGame>(),
        T::SetPlayerName => fixed::<ClientSetPlayerName>(),
        T::SetPlayerSkin => fixed::<ClientSetPlayerSkin>(),
        T::AdminAuth => fixed::<ClientAdminAuth>(),
        T::AdminCommand => fixed::<ClientAdminCommand>(),

        T::Accept => fixed::<ServerAccept>(),
        T::Reject => fixed::<ServerReject>(),
        T::PlayerJoined => fixed::<ServerPlayerJoined>(),
        T::PlayerLeft => fixed::<ServerPlayerLeft>(),
        T::Pong => fixed::<ServerPong>(),
        T::LobbyState => counted::<LobbyStateHeader, PlayerLobbyEntry>(6, 1),
        T::GameStartCountdown => fixed::<GameStartCountdown>(),
        T::CountdownCancelled => fixed::<CountdownCancelled>(),
        T::GameStart => counted::<GameStartHeader, PlayerSpawnData>(16, 1),
        T::RoomCreated => fixed::<RoomCreated>(),
        T::RoomList => counted::<RoomListHeader, RoomInfo>(0, 2),
        T::RoomJoined => fixed::<RoomJoined>(),
        T::RoomLeft => fixed::<RoomLeft>(),
        T::RoomStateUpdate => counted::<RoomStateHeader, RoomPlayerEntry>(10, 1),
        T::RoomError => fixed::<RoomError>(),
        T::NameUpdated => fixed::<NameUpdated>(),
        T::SkinUpdated => fixed::<SkinUpdated>(),
        T::Snapshot | T::DeltaSnapshot => counted::<SnapshotHeader, EntityState>(4, 2),
        T::EntitySpawn => fixed::<EntitySpawn>(),
        T::EntityDestroy => fixed::<EntityDestroy>(),
        T::EntityDamage => fixed::<EntityDamage>(),
        T::ProjectileSpawn => fixed::<ProjectileSpawn>(),
        T::Explosion => fixed::<Explosion>(),
        T::PowerupCollected => fixed::<PowerupCollected>(),
        T::ScoreUpdate => fixed::<ScoreUpdate>(),
        T::WaveStart => fixed::<WaveStart>(),
        T::WaveComplete => fixed::<WaveComplete>(),
        T::Respawn => fixed::<PlayerRespawn>(),
        T::GameOver => counted::<GameOverHeader, FinalScoreEntry>(9, 1),
        T::Leaderboard => counted::<LeaderboardHeader, FinalScoreEntry>(0, 1),
        T::GlobalLeaderboard => counted::<LeaderboardHeader, LeaderboardEntry>(0, 1),
        T::AdminAuthResult => fixed::<AdminAuthResult>(),
        T::AdminCommandResult => fixed::<AdminCommandResult>(),
        T::AdminNotification => fixed::<AdminNotification>(),
        T::KickNotification => fixed::<KickNotification>(),
    }
}

/// Rejects `bytes` unless it is exactly the size `packet_type` dictates.
pub fn check_payload_size(packet_type: PacketType, bytes: &[u8]) -> ProtocolResult<()> {
    let layout = payload_layout(packet_type);
    let expected = layout.expected_size(bytes).unwrap_or_else(|| layout.min_size());
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(ProtocolError::SizeMismatch {
            packet_type: packet_type.as_u8(),
            expected,
            actual: bytes.len(),
        })
    }
}
