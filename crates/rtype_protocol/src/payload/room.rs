//! Custom room and player profile payloads.

use super::{Difficulty, GameMode, RoomErrorCode, RoomStatus, WireRecord};
use crate::codec::FixedString;

/// Password hash field; all zero means "no password".
pub type PasswordHash = FixedString<64>;

wire_record! {
    /// CREATE_ROOM. 106 bytes.
    pub struct ClientCreateRoom {
        /// Host.
        pub player_id: u32,
        /// Room title; empty for a generated one.
        pub room_name: FixedString<32>,
        /// Optional password hash.
        pub password_hash: PasswordHash,
        /// Mode.
        pub game_mode: GameMode,
        /// Difficulty.
        pub difficulty: Difficulty,
        /// Map.
        pub map_id: u16,
        /// Capacity.
        pub max_players: u8,
        /// Members needed before the host may start.
        pub min_players_to_start: u8,
    }
}

wire_record! {
    /// JOIN_ROOM. 72 bytes.
    pub struct ClientJoinRoom {
        /// Joining player.
        pub player_id: u32,
        /// Target room.
        pub room_id: u32,
        /// Password hash, empty when the room is open.
        pub password_hash: PasswordHash,
    }
}

wire_record! {
    /// LEAVE_ROOM. 8 bytes.
    pub struct ClientLeaveRoom {
        /// Leaving player.
        pub player_id: u32,
        /// Room being left.
        pub room_id: u32,
    }
}

wire_record! {
    /// START_GAME - host starts the room. 8 bytes.
    pub struct ClientStartGame {
        /// Requesting player; must be host.
        pub player_id: u32,
        /// Room to start.
        pub room_id: u32,
    }
}

wire_record! {
    /// SET_PLAYER_NAME. 36 bytes.
    pub struct ClientSetPlayerName {
        /// Player.
        pub player_id: u32,
        /// New name.
        pub new_name: FixedString<32>,
    }
}

wire_record! {
    /// SET_PLAYER_SKIN. 5 bytes.
    pub struct ClientSetPlayerSkin {
        /// Player.
        pub player_id: u32,
        /// Skin index.
        pub skin_id: u8,
    }
}

wire_record! {
    /// ROOM_CREATED. 36 bytes.
    pub struct RoomCreated {
        /// New room id.
        pub room_id: u32,
        /// Final room name.
        pub room_name: FixedString<32>,
    }
}

wire_record! {
    /// One line of ROOM_LIST. 44 bytes.
    pub struct RoomInfo {
        /// Room id.
        pub room_id: u32,
        /// Room name.
        pub room_name: FixedString<32>,
        /// Mode.
        pub game_mode: GameMode,
        /// Difficulty.
        pub difficulty: Difficulty,
        /// Members present.
        pub current_players: u8,
        /// Capacity.
        pub max_players: u8,
        /// Map.
        pub map_id: u16,
        /// Lifecycle.
        pub status: RoomStatus,
        /// 1 when a password is required.
        pub has_password: u8,
    }
}

wire_record! {
    /// ROOM_LIST header. 2 bytes.
    pub struct RoomListHeader {
        /// Entry count.
        pub room_count: u16,
    }
}

counted_payload! {
    /// ROOM_LIST - public waiting rooms.
    pub struct RoomList => RoomList {
        header: RoomListHeader,
        count: room_count as u16,
        /// Rooms.
        pub rooms: Vec<RoomInfo>,
    }
}

impl RoomList {
    /// Rooms that fit one uncompressed packet.
    pub const MAX_ROOMS_PER_PACKET: usize =
        (crate::MAX_PAYLOAD_SIZE - <RoomListHeader as WireRecord>::SIZE) / <RoomInfo as WireRecord>::SIZE;
}

wire_record! {
    /// ROOM_JOINED. 40 bytes.
    pub struct RoomJoined {
        /// Room id.
        pub room_id: u32,
        /// Current host.
        pub host_player_id: u32,
        /// Room name.
        pub room_name: FixedString<32>,
    }
}

wire_record! {
    /// ROOM_LEFT. 8 bytes.
    pub struct RoomLeft {
        /// Room id.
        pub room_id: u32,
        /// Player who left.
        pub player_id: u32,
    }
}

wire_record! {
    /// One member line of ROOM_STATE_UPDATE. 38 bytes.
    pub struct RoomPlayerEntry {
        /// Member id.
        pub player_id: u32,
        /// Member name.
        pub player_name: FixedString<32>,
        /// Member skin.
        pub skin_id: u8,
        /// 1 for the host.
        pub is_host: u8,
    }
}

wire_record! {
    /// ROOM_STATE_UPDATE header. 11 bytes.
    pub struct RoomStateHeader {
        /// Room id.
        pub room_id: u32,
        /// Current host.
        pub host_player_id: u32,
        /// Lifecycle.
        pub status: RoomStatus,
        /// Seconds left before start, 0 when not counting.
        pub countdown: u8,
        /// Entry count.
        pub player_count: u8,
    }
}

counted_payload! {
    /// ROOM_STATE_UPDATE - full room membership broadcast.
    pub struct RoomStateUpdate => RoomStateUpdate {
        header: RoomStateHeader,
        count: player_count as u8,
        /// Members in join order.
        pub players: Vec<RoomPlayerEntry>,
    }
}

wire_record! {
    /// ROOM_ERROR. 65 bytes.
    pub struct RoomError {
        /// Code.
        pub error_code: RoomErrorCode,
        /// Human-readable detail.
        pub error_message: FixedString<64>,
    }
}

wire_record! {
    /// NAME_UPDATED. 40 bytes.
    pub struct NameUpdated {
        /// Player.
        pub player_id: u32,
        /// Room the broadcast is scoped to.
        pub room_id: u32,
        /// New name.
        pub new_name: FixedString<32>,
    }
}

wire_record! {
    /// SKIN_UPDATED. 9 bytes.
    pub struct SkinUpdated {
        /// Player.
        pub player_id: u32,
        /// Room the broadcast is scoped to.
        pub room_id: u32,
        /// New skin.
        pub skin_id: u8,
    }
}

fixed_payload! {
    ClientCreateRoom => CreateRoom,
    ClientJoinRoom => JoinRoom,
    ClientLeaveRoom => LeaveRoom,
    ClientStartGame => StartGame,
    ClientSetPlayerName => SetPlayerName,
    ClientSetPlayerSkin => SetPlayerSkin,
    RoomCreated => RoomCreated,
    RoomJoined => RoomJoined,
    RoomLeft => RoomLeft,
    RoomError => RoomError,
    NameUpdated => NameUpdated,
    SkinUpdated => SkinUpdated,
}

const _: () = assert!(<ClientCreateRoom as WireRecord>::SIZE == 106);
const _: () = assert!(<ClientJoinRoom as WireRecord>::SIZE == 72);
const _: () = assert!(<ClientLeaveRoom as WireRecord>::SIZE == 8);
const _: () = assert!(<ClientStartGame as WireRecord>::SIZE == 8);
const _: () = assert!(<ClientSetPlayerName as WireRecord>::SIZE == 36);
const _: () = assert!(<ClientSetPlayerSkin as WireRecord>::SIZE == 5);
const _: () = assert!(<RoomCreated as WireRecord>::SIZE == 36);
const _: () = assert!(<RoomInfo as WireRecord>::SIZE == 44);
const _: () = assert!(<RoomJoined as WireRecord>::SIZE == 40);
const _: () = assert!(<RoomLeft as WireRecord>::SIZE == 8);
const _: () = assert!(<RoomPlayerEntry as WireRecord>::SIZE == 38);
const _: () = assert!(<RoomStateHeader as WireRecord>::SIZE == 11);
const _: () = assert!(<RoomError as WireRecord>::SIZE == 65);
const _: () = assert!(<NameUpdated as WireRecord>::SIZE == 40);
const _: () = assert!(<SkinUpdated as WireRecord>::SIZE == 9);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;

    #[test]
    fn test_create_room_round_trip() {
        let create = ClientCreateRoom {
            player_id: 5,
            room_name: FixedString::new("Friday night"),
            password_hash: FixedString::new("5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"),
            game_mode: GameMode::Trio,
            difficulty: Difficulty::Easy,
            map_id: 2,
            max_players: 3,
            min_players_to_start: 2,
        };
        let bytes = create.to_bytes();
        assert_eq!(bytes.len(), 106);
        assert_eq!(ClientCreateRoom::from_bytes(&bytes).unwrap(), create);
    }

    #[test]
    fn test_room_list_round_trip() {
        let info = RoomInfo {
            room_id: 1000,
            room_name: FixedString::new("Room #1000"),
            game_mode: GameMode::Squad,
            difficulty: Difficulty::Normal,
            current_players: 1,
            max_players: 4,
            map_id: 1,
            status: RoomStatus::Waiting,
            has_password: 0,
        };
        let list = RoomList::new(RoomListHeader { room_count: 0 }, vec![info; 3]);
        let bytes = list.to_bytes();
        assert_eq!(bytes.len(), 2 + 3 * 44);
        assert_eq!(&bytes[..2], &[0, 3]);
        assert_eq!(RoomList::from_bytes(&bytes).unwrap(), list);
    }

    #[test]
    fn test_room_list_capacity() {
        assert_eq!(RoomList::MAX_ROOMS_PER_PACKET, 31);
    }

    #[test]
    fn test_room_state_round_trip() {
        let state = RoomStateUpdate::new(
            RoomStateHeader {
                room_id: 1000,
                host_player_id: 1,
                status: RoomStatus::Waiting,
                countdown: 0,
                player_count: 0,
            },
            vec![RoomPlayerEntry {
                player_id: 1,
                player_name: FixedString::new("host"),
                skin_id: 2,
                is_host: 1,
            }],
        );
        assert_eq!(RoomStateUpdate::from_bytes(&state.to_bytes()).unwrap(), state);
    }
}
