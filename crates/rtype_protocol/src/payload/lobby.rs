//! Quick-match lobby and game start payloads.

use super::{CountdownCancelReason, Difficulty, GameMode, WireRecord};
use crate::codec::FixedString;

wire_record! {
    /// JOIN_LOBBY - enter quick-match. 6 bytes.
    pub struct ClientJoinLobby {
        /// Requesting player.
        pub player_id: u32,
        /// Desired mode.
        pub game_mode: GameMode,
        /// Desired difficulty.
        pub difficulty: Difficulty,
    }
}

wire_record! {
    /// LEAVE_LOBBY - leave quick-match. 8 bytes.
    pub struct ClientLeaveLobby {
        /// Leaving player.
        pub player_id: u32,
        /// Lobby being left.
        pub lobby_id: u32,
    }
}

wire_record! {
    /// One member line in LOBBY_STATE. 38 bytes.
    pub struct PlayerLobbyEntry {
        /// Member id.
        pub player_id: u32,
        /// Member name.
        pub player_name: FixedString<32>,
        /// Member level.
        pub player_level: u16,
    }
}

wire_record! {
    /// LOBBY_STATE header. 8 bytes.
    pub struct LobbyStateHeader {
        /// Lobby id.
        pub lobby_id: u32,
        /// Lobby mode.
        pub game_mode: GameMode,
        /// Lobby difficulty.
        pub difficulty: Difficulty,
        /// Members present; also the entry count.
        pub current_player_count: u8,
        /// Members needed to start.
        pub required_player_count: u8,
    }
}

counted_payload! {
    /// LOBBY_STATE - full membership broadcast.
    pub struct LobbyState => LobbyState {
        header: LobbyStateHeader,
        count: current_player_count as u8,
        /// Members in join order.
        pub players: Vec<PlayerLobbyEntry>,
    }
}

wire_record! {
    /// GAME_START_COUNTDOWN - one second elapsed. 9 bytes.
    pub struct GameStartCountdown {
        /// Lobby counting down.
        pub lobby_id: u32,
        /// Seconds remaining.
        pub countdown_value: u8,
        /// Lobby mode.
        pub game_mode: GameMode,
        /// Lobby difficulty.
        pub difficulty: Difficulty,
        /// Map the match will use.
        pub map_id: u16,
    }
}

wire_record! {
    /// COUNTDOWN_CANCELLED. 7 bytes.
    pub struct CountdownCancelled {
        /// Lobby whose countdown stopped.
        pub lobby_id: u32,
        /// Why.
        pub reason: CountdownCancelReason,
        /// Members remaining.
        pub new_player_count: u8,
        /// Members needed.
        pub required_count: u8,
    }
}

wire_record! {
    /// One spawn line in GAME_START. 12 bytes.
    pub struct PlayerSpawnData {
        /// Player id.
        pub player_id: u32,
        /// Spawn X.
        pub spawn_x: f32,
        /// Spawn Y.
        pub spawn_y: f32,
    }
}

wire_record! {
    /// GAME_START header. 17 bytes.
    pub struct GameStartHeader {
        /// Session to handshake with over UDP.
        pub game_session_id: u32,
        /// Match mode.
        pub game_mode: GameMode,
        /// Match difficulty.
        pub difficulty: Difficulty,
        /// Server tick at start.
        pub server_tick: u32,
        /// Seed for deterministic level content.
        pub level_seed: u32,
        /// Unreliable channel port.
        pub udp_port: u16,
        /// Spawn entry count.
        pub player_count: u8,
    }
}

counted_payload! {
    /// GAME_START - match begins.
    pub struct GameStart => GameStart {
        header: GameStartHeader,
        count: player_count as u8,
        /// One spawn per player.
        pub spawns: Vec<PlayerSpawnData>,
    }
}

fixed_payload! {
    ClientJoinLobby => JoinLobby,
    ClientLeaveLobby => LeaveLobby,
    GameStartCountdown => GameStartCountdown,
    CountdownCancelled => CountdownCancelled,
}

const _: () = assert!(<ClientJoinLobby as WireRecord>::SIZE == 6);
const _: () = assert!(<ClientLeaveLobby as WireRecord>::SIZE == 8);
const _: () = assert!(<PlayerLobbyEntry as WireRecord>::SIZE == 38);
const _: () = assert!(<LobbyStateHeader as WireRecord>::SIZE == 8);
const _: () = assert!(<GameStartCountdown as WireRecord>::SIZE == 9);
const _: () = assert!(<CountdownCancelled as WireRecord>::SIZE == 7);
const _: () = assert!(<PlayerSpawnData as WireRecord>::SIZE == 12);
const _: () = assert!(<GameStartHeader as WireRecord>::SIZE == 17);
