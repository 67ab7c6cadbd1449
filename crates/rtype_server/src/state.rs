//! # Server State
//!
//! Everything the server knows, mutated only from the tick loop.
//!
//! ## Design
//!
//! ```text
//!  PacketRouter ──▶ ServerState (PacketListener)
//!                     ├── ConnectionRegistry   who is connected, and where
//!                     ├── LobbyManager         quick-match countdowns
//!                     ├── RoomManager          host-run rooms
//!                     ├── GameSessionManager   running matches
//!                     ├── AdminService / HighScores
//!                     └── Outbox ──▶ PacketSender ──▶ Transport
//! ```
//!
//! - Handlers validate the sender first and touch no state on refusal
//! - Replies are queued, never sent inline
//! - Lobby, room and session output is turned into packets in [`ServerState::update`]

use std::net::SocketAddr;
use std::time::Instant;

use rtype_protocol::{
    AdminCommandResult, AdminNotification, Channel, ClientAdminAuth, ClientAdminCommand, ClientConnect,
    ClientCreateRoom, ClientDisconnect, ClientInput, ClientJoinLobby, ClientJoinRoom, ClientLeaveLobby,
    ClientLeaveRoom, ClientPing, ClientSetPlayerName, ClientSetPlayerSkin, ClientStartGame,
    ClientUdpHandshake, CountdownCancelled, Difficulty, DisconnectReason, FixedString, GameMode,
    GameStartCountdown, KickNotification, LobbyState, LobbyStateHeader, NameUpdated, PlayerLobbyEntry,
    RejectReason, RoomCreated, RoomError, RoomErrorCode, RoomJoined, RoomLeft, RoomPlayerEntry,
    RoomStateHeader, RoomStateUpdate, ServerAccept, ServerPlayerJoined, ServerPlayerLeft, ServerPong,
    ServerReject, SkinUpdated, CLIENT_VERSION,
};

use crate::admin::{AdminAction, AdminService};
use crate::config::ServerConfig;
use crate::connection::{ConnectionId, ConnectionRegistry, Membership};
use crate::error::{ProtocolStateError, ServerResult};
use crate::leaderboard::HighScores;
use crate::lobby::{LobbyEvent, LobbyManager};
use crate::room::{RoomEvent, RoomManager};
use crate::router::PacketListener;
use crate::sender::Outbox;
use crate::session::{FinishedSession, GameSessionManager, SessionSettings};

/// Name given to players who connect with an empty one.
const DEFAULT_PLAYER_NAME: &str = "Player";

const fn room_error_message(code: RoomErrorCode) -> &'static str {
    match code {
        RoomErrorCode::NotFound => "room not found",
        RoomErrorCode::Full => "room is full",
        RoomErrorCode::WrongPassword => "wrong password",
        RoomErrorCode::AlreadyStarted => "game already started",
        RoomErrorCode::NotHost => "only the host can do that",
        RoomErrorCode::InvalidConfiguration => "not enough players to start",
        RoomErrorCode::AlreadyInRoom => "already in a room or match",
    }
}

/// Authoritative server state.
#[derive(Debug)]
pub struct ServerState {
    config: ServerConfig,
    players: ConnectionRegistry,
    lobbies: LobbyManager,
    rooms: RoomManager,
    sessions: GameSessionManager,
    admin: AdminService,
    high_scores: HighScores,
    outbox: Outbox,
    started: Instant,
}

impl ServerState {
    /// Creates the state for `config`, seeding level generation from the clock.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs() ^ u64::from(elapsed.subsec_nanos()));
        Self::with_seed(config, seed)
    }

    /// Creates the state with a fixed level-seed source.
    #[must_use]
    pub fn with_seed(config: ServerConfig, seed: u64) -> Self {
        Self {
            players: ConnectionRegistry::new(config.max_clients),
            lobbies: LobbyManager::new(config.countdown_seconds, config.tick_rate),
            rooms: RoomManager::new(config.countdown_seconds, config.tick_rate),
            sessions: GameSessionManager::new(SessionSettings::from_config(&config), seed),
            admin: AdminService::new(config.admin_password_hash.as_deref()),
            high_scores: HighScores::new(),
            outbox: Outbox::new(),
            started: Instant::now(),
            config,
        }
    }

    /// Configuration in use.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Connected players.
    #[inline]
    #[must_use]
    pub const fn players(&self) -> &ConnectionRegistry {
        &self.players
    }

    /// Quick-match lobbies.
    #[inline]
    #[must_use]
    pub const fn lobbies(&self) -> &LobbyManager {
        &self.lobbies
    }

    /// Custom rooms.
    #[inline]
    #[must_use]
    pub const fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    /// Running matches.
    #[inline]
    #[must_use]
    pub const fn sessions(&self) -> &GameSessionManager {
        &self.sessions
    }

    /// All-time high scores.
    #[inline]
    #[must_use]
    pub const fn high_scores(&self) -> &HighScores {
        &self.high_scores
    }

    /// Queued outgoing work.
    #[inline]
    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    /// Advances lobbies, rooms and sessions by one tick and queues their output.
    pub fn update(&mut self) {
        self.lobbies.tick();
        self.rooms.tick();

        for event in self.lobbies.drain_events() {
            self.announce_lobby(event);
        }
        for event in self.rooms.drain_events() {
            self.announce_room(event);
        }

        let (packets, finished) = self.sessions.tick();
        for session in finished {
            self.close_session(session);
        }
        for packet in packets {
            let recipients = match packet.packet_type.channel() {
                Channel::Reliable => self.players.connections_of(&packet.recipients),
                Channel::Unreliable => self.players.unreliable_connections_of(&packet.recipients),
            };
            self.outbox.push_raw(packet.packet_type, packet.payload, recipients);
        }
    }

    /// Removes the player behind `connection` from everything it joined.
    ///
    /// Called for transport-detected disconnects as well as DISCONNECT.
    pub fn handle_disconnect(&mut self, connection: ConnectionId, reason: DisconnectReason) {
        let Some(player) = self.players.remove_by_connection(connection) else {
            return;
        };
        let player_id = player.player_id;
        self.admin.revoke(player_id);

        if let Ok(lobby_id) = self.lobbies.leave(player_id) {
            tracing::debug!("Player {} dropped from lobby {}", player_id, lobby_id);
        }
        if self.rooms.room_of(player_id).is_some() {
            self.leave_room(player_id);
        }
        self.sessions.remove_player(player_id, reason);

        tracing::info!("Player {} ({}) disconnected: {:?}", player_id, player.name, reason);
        let others = self.players.all_connections();
        self.outbox
            .push_payload(others, &ServerPlayerLeft { player_id, reason });
    }

    fn sender_of(&self, connection: ConnectionId) -> Result<u32, ProtocolStateError> {
        self.players
            .player_for_connection(connection)
            .ok_or(ProtocolStateError::UnknownPlayer)
    }

    /// Resolves the sender and checks it matches the id the payload claims.
    fn claimed_sender(&self, connection: ConnectionId, claimed: u32) -> Result<u32, ProtocolStateError> {
        let sender = self.sender_of(connection)?;
        if sender == claimed {
            Ok(sender)
        } else {
            Err(ProtocolStateError::PlayerIdMismatch { sender, claimed })
        }
    }

    fn membership_of(&self, player_id: u32) -> Membership {
        self.players.get(player_id).map_or(Membership::Idle, |p| p.membership)
    }

    fn elapsed_millis(&self) -> u32 {
        u32::try_from(self.started.elapsed().as_millis() & u128::from(u32::MAX)).unwrap_or(0)
    }

    fn reject(&mut self, connection: ConnectionId, reason_code: RejectReason, message: &str) {
        tracing::info!("Rejected {}: {}", connection, message);
        self.outbox.send_to(
            connection,
            &ServerReject {
                reason_code,
                reason_message: FixedString::new(message),
            },
        );
        self.outbox.disconnect(connection);
    }

    fn room_error(&mut self, connection: ConnectionId, error_code: RoomErrorCode) {
        self.outbox.send_to(
            connection,
            &RoomError {
                error_code,
                error_message: FixedString::new(room_error_message(error_code)),
            },
        );
    }

    fn announce_lobby(&mut self, event: LobbyEvent) {
        match event {
            LobbyEvent::StateChanged {
                lobby_id,
                game_mode,
                difficulty,
                required,
                members,
            } => {
                let entries = members
                    .iter()
                    .map(|&player_id| PlayerLobbyEntry {
                        player_id,
                        player_name: FixedString::new(self.players.name_of(player_id)),
                        player_level: 1,
                    })
                    .collect();
                let state = LobbyState::new(
                    LobbyStateHeader {
                        lobby_id,
                        game_mode,
                        difficulty,
                        current_player_count: 0,
                        required_player_count: required,
                    },
                    entries,
                );
                self.outbox.push_payload(self.players.connections_of(&members), &state);
            }
            LobbyEvent::CountdownTick {
                lobby_id,
                seconds_remaining,
                game_mode,
                difficulty,
                members,
            } => {
                let countdown = GameStartCountdown {
                    lobby_id,
                    countdown_value: seconds_remaining,
                    game_mode,
                    difficulty,
                    map_id: self.config.map_id,
                };
                self.outbox
                    .push_payload(self.players.connections_of(&members), &countdown);
            }
            LobbyEvent::CountdownCancelled {
                lobby_id,
                reason,
                new_count,
                required,
                members,
            } => {
                let cancelled = CountdownCancelled {
                    lobby_id,
                    reason,
                    new_player_count: new_count,
                    required_count: required,
                };
                self.outbox
                    .push_payload(self.players.connections_of(&members), &cancelled);
            }
            LobbyEvent::GameStart {
                game_mode,
                difficulty,
                players,
                ..
            } => self.start_game(game_mode, difficulty, &players),
        }
    }

    fn announce_room(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Countdown { room_id } => self.broadcast_room_state(room_id),
            RoomEvent::GameStart {
                game_mode,
                difficulty,
                players,
                ..
            } => self.start_game(game_mode, difficulty, &players),
        }
    }

    fn start_game(&mut self, game_mode: GameMode, difficulty: Difficulty, players: &[u32]) {
        let players: Vec<u32> = players
            .iter()
            .copied()
            .filter(|&id| self.players.get(id).is_some())
            .collect();
        if players.is_empty() {
            return;
        }
        let start = self.sessions.create_session(game_mode, difficulty, &players);
        self.players
            .set_membership(&players, Membership::Session(start.header.game_session_id));
        self.outbox.push_payload(self.players.connections_of(&players), &start);
    }

    fn close_session(&mut self, finished: FinishedSession) {
        for &player_id in &finished.players {
            self.players.unbind_unreliable(player_id);
        }
        self.players.set_membership(&finished.players, Membership::Idle);

        if finished.result.is_some() {
            for line in &finished.scores {
                let name = match self.players.name_of(line.player_id) {
                    "" => format!("{DEFAULT_PLAYER_NAME} {}", line.player_id),
                    name => name.to_string(),
                };
                self.high_scores.submit(&name, line.final_score, finished.wave);
            }
        }
        tracing::info!(
            "Session {} closed ({:?}), players back to idle: {:?}",
            finished.session_id,
            finished.result,
            finished.players
        );
    }

    fn broadcast_room_state(&mut self, room_id: u32) {
        let Some(room) = self.rooms.room(room_id) else {
            return;
        };
        let entries = room
            .members
            .iter()
            .map(|&player_id| RoomPlayerEntry {
                player_id,
                player_name: FixedString::new(self.players.name_of(player_id)),
                skin_id: self.players.get(player_id).map_or(0, |p| p.skin_id),
                is_host: u8::from(player_id == room.host),
            })
            .collect();
        let update = RoomStateUpdate::new(
            RoomStateHeader {
                room_id,
                host_player_id: room.host,
                status: room.status,
                countdown: room.countdown_seconds(self.rooms.tick_rate()),
                player_count: 0,
            },
            entries,
        );
        let recipients = self.players.connections_of(&room.members);
        self.outbox.push_payload(recipients, &update);
    }

    /// Takes `player_id` out of its room and tells the room about it.
    fn leave_room(&mut self, player_id: u32) {
        let Ok(room_id) = self.rooms.leave(player_id) else {
            return;
        };
        self.players.set_membership(&[player_id], Membership::Idle);

        let mut recipients: Vec<u32> = self
            .rooms
            .room(room_id)
            .map(|room| room.members.clone())
            .unwrap_or_default();
        recipients.push(player_id);
        self.outbox.push_payload(
            self.players.connections_of(&recipients),
            &RoomLeft { room_id, player_id },
        );
        self.broadcast_room_state(room_id);
    }

    /// Players a profile change is announced to: the room, or just the player.
    fn profile_audience(&self, player_id: u32) -> (u32, Vec<ConnectionId>) {
        match self.rooms.room_of(player_id).and_then(|id| self.rooms.room(id)) {
            Some(room) => (room.id, self.players.connections_of(&room.members)),
            None => (0, self.players.connections_of(&[player_id])),
        }
    }
}

impl PacketListener for ServerState {
    fn on_connect(&mut self, connection: ConnectionId, packet: ClientConnect) -> ServerResult<()> {
        if let Some(existing) = self.players.player_for_connection(connection) {
            return Err(ProtocolStateError::AlreadyConnected(existing).into());
        }
        if packet.client_version != CLIENT_VERSION {
            let message = format!(
                "client version {} unsupported, server speaks {}",
                packet.client_version, CLIENT_VERSION
            );
            self.reject(connection, RejectReason::VersionMismatch, &message);
            return Ok(());
        }

        let name = match packet.player_name.as_str().trim() {
            "" => DEFAULT_PLAYER_NAME,
            name => name,
        };
        let Some(player_id) = self.players.register(connection, name) else {
            self.reject(connection, RejectReason::ServerFull, "server is full");
            return Ok(());
        };

        tracing::info!("Player {} ({}) connected on {}", player_id, name, connection);
        self.outbox.send_to(
            connection,
            &ServerAccept {
                assigned_player_id: player_id,
                server_tick_rate: u8::try_from(self.config.tick_rate).unwrap_or(u8::MAX),
                max_players: self.config.max_players,
                map_id: self.config.map_id,
            },
        );

        let others: Vec<ConnectionId> = self
            .players
            .all_connections()
            .into_iter()
            .filter(|&c| c != connection)
            .collect();
        self.outbox.push_payload(
            others,
            &ServerPlayerJoined {
                player_id,
                player_name: FixedString::new(name),
            },
        );
        Ok(())
    }

    fn on_disconnect(&mut self, connection: ConnectionId, packet: ClientDisconnect) -> ServerResult<()> {
        self.claimed_sender(connection, packet.player_id)?;
        self.handle_disconnect(connection, packet.reason);
        self.outbox.disconnect(connection);
        Ok(())
    }

    fn on_ping(&mut self, connection: ConnectionId, packet: ClientPing) -> ServerResult<()> {
        self.claimed_sender(connection, packet.player_id)?;
        let pong = ServerPong {
            client_timestamp: packet.client_timestamp,
            server_timestamp: self.elapsed_millis(),
        };
        self.outbox.send_to(connection, &pong);
        Ok(())
    }

    fn on_join_lobby(&mut self, connection: ConnectionId, packet: ClientJoinLobby) -> ServerResult<()> {
        let player_id = self.claimed_sender(connection, packet.player_id)?;
        if self.membership_of(player_id) != Membership::Idle {
            return Err(ProtocolStateError::AlreadyBusy(player_id).into());
        }
        let lobby_id = self
            .lobbies
            .join(player_id, packet.game_mode, packet.difficulty)?;
        self.players
            .set_membership(&[player_id], Membership::Lobby(lobby_id));
        tracing::info!(
            "Player {} joined lobby {} ({:?}, {:?})",
            player_id,
            lobby_id,
            packet.game_mode,
            packet.difficulty
        );
        Ok(())
    }

    fn on_leave_lobby(&mut self, connection: ConnectionId, packet: ClientLeaveLobby) -> ServerResult<()> {
        let player_id = self.claimed_sender(connection, packet.player_id)?;
        if self.lobbies.lobby_of(player_id) != Some(packet.lobby_id) {
            return Err(ProtocolStateError::NotInLobby(player_id).into());
        }
        self.lobbies.leave(player_id)?;
        self.players.set_membership(&[player_id], Membership::Idle);
        tracing::info!("Player {} left lobby {}", player_id, packet.lobby_id);
        Ok(())
    }

    fn on_udp_handshake(&mut self, peer: SocketAddr, packet: ClientUdpHandshake) -> ServerResult<()> {
        let ClientUdpHandshake { player_id, session_id } = packet;
        if self.sessions.session_of(player_id) != Some(session_id) {
            return Err(ProtocolStateError::NotInSession { player_id, session_id }.into());
        }
        let connection = self.players.bind_unreliable(player_id, session_id, peer)?;
        self.outbox.bind(connection, peer);
        tracing::info!("Player {} bound udp://{} for session {}", player_id, peer, session_id);
        Ok(())
    }

    fn on_input(&mut self, peer: SocketAddr, packet: ClientInput) -> ServerResult<()> {
        let sender = self
            .players
            .player_for_datagram(peer)
            .ok_or(ProtocolStateError::UnboundUnreliablePeer)?;
        if sender != packet.player_id {
            return Err(ProtocolStateError::PlayerIdMismatch {
                sender,
                claimed: packet.player_id,
            }
            .into());
        }
        self.sessions.apply_input(sender, &packet)?;
        Ok(())
    }

    fn on_create_room(&mut self, connection: ConnectionId, packet: ClientCreateRoom) -> ServerResult<()> {
        let player_id = self.claimed_sender(connection, packet.player_id)?;
        if self.membership_of(player_id) != Membership::Idle {
            self.room_error(connection, RoomErrorCode::AlreadyInRoom);
            return Ok(());
        }
        match self.rooms.create(player_id, &packet) {
            Ok(room_id) => {
                self.players.set_membership(&[player_id], Membership::Room(room_id));
                let room_name = self
                    .rooms
                    .room(room_id)
                    .map_or_else(FixedString::empty, |room| FixedString::new(&room.name));
                self.outbox.send_to(connection, &RoomCreated { room_id, room_name });
                self.broadcast_room_state(room_id);
            }
            Err(code) => self.room_error(connection, code),
        }
        Ok(())
    }

    fn on_join_room(&mut self, connection: ConnectionId, packet: ClientJoinRoom) -> ServerResult<()> {
        let player_id = self.claimed_sender(connection, packet.player_id)?;
        if !matches!(self.membership_of(player_id), Membership::Idle | Membership::Room(_)) {
            self.room_error(connection, RoomErrorCode::AlreadyInRoom);
            return Ok(());
        }
        match self.rooms.join(player_id, packet.room_id, &packet.password_hash) {
            Ok(()) => {
                self.players
                    .set_membership(&[player_id], Membership::Room(packet.room_id));
                if let Some(room) = self.rooms.room(packet.room_id) {
                    let joined = RoomJoined {
                        room_id: room.id,
                        host_player_id: room.host,
                        room_name: FixedString::new(&room.name),
                    };
                    self.outbox.send_to(connection, &joined);
                }
                self.broadcast_room_state(packet.room_id);
            }
            Err(code) => self.room_error(connection, code),
        }
        Ok(())
    }

    fn on_leave_room(&mut self, connection: ConnectionId, packet: ClientLeaveRoom) -> ServerResult<()> {
        let player_id = self.claimed_sender(connection, packet.player_id)?;
        if self.rooms.room_of(player_id) != Some(packet.room_id) {
            self.room_error(connection, RoomErrorCode::NotFound);
            return Ok(());
        }
        self.leave_room(player_id);
        Ok(())
    }

    fn on_request_room_list(&mut self, connection: ConnectionId) -> ServerResult<()> {
        self.sender_of(connection)?;
        let list = self.rooms.list();
        self.outbox.send_to(connection, &list);
        Ok(())
    }

    fn on_start_game(&mut self, connection: ConnectionId, packet: ClientStartGame) -> ServerResult<()> {
        let player_id = self.claimed_sender(connection, packet.player_id)?;
        if let Err(code) = self.rooms.start(player_id, packet.room_id) {
            self.room_error(connection, code);
        }
        Ok(())
    }

    fn on_set_player_name(&mut self, connection: ConnectionId, packet: ClientSetPlayerName) -> ServerResult<()> {
        let player_id = self.claimed_sender(connection, packet.player_id)?;
        let name = packet.new_name.as_str().trim();
        if name.is_empty() {
            return Ok(());
        }
        if let Some(player) = self.players.get_mut(player_id) {
            tracing::info!("Player {} renamed '{}' -> '{}'", player_id, player.name, name);
            player.name = name.to_string();
        }
        let (room_id, audience) = self.profile_audience(player_id);
        self.outbox.push_payload(
            audience,
            &NameUpdated {
                player_id,
                room_id,
                new_name: FixedString::new(name),
            },
        );
        Ok(())
    }

    fn on_set_player_skin(&mut self, connection: ConnectionId, packet: ClientSetPlayerSkin) -> ServerResult<()> {
        let player_id = self.claimed_sender(connection, packet.player_id)?;
        if let Some(player) = self.players.get_mut(player_id) {
            player.skin_id = packet.skin_id;
        }
        let (room_id, audience) = self.profile_audience(player_id);
        self.outbox.push_payload(
            audience,
            &SkinUpdated {
                player_id,
                room_id,
                skin_id: packet.skin_id,
            },
        );
        Ok(())
    }

    fn on_request_global_leaderboard(&mut self, connection: ConnectionId) -> ServerResult<()> {
        self.sender_of(connection)?;
        let board = self.high_scores.to_payload();
        self.outbox.send_to(connection, &board);
        Ok(())
    }

    fn on_admin_auth(&mut self, connection: ConnectionId, packet: ClientAdminAuth) -> ServerResult<()> {
        let player_id = self.sender_of(connection)?;
        let result = self.admin.authenticate(player_id, &packet);
        self.outbox.send_to(connection, &result);
        Ok(())
    }

    fn on_admin_command(&mut self, connection: ConnectionId, packet: ClientAdminCommand) -> ServerResult<()> {
        let player_id = self.sender_of(connection)?;
        let action = match self.admin.authorize(player_id, &packet) {
            Ok(action) => action,
            Err(e) => {
                self.outbox.send_to(
                    connection,
                    &AdminCommandResult {
                        success: 0,
                        message: FixedString::new("not authorized"),
                    },
                );
                return Err(e.into());
            }
        };

        let (success, message) = match action {
            AdminAction::Kick { target, reason } => match self.players.connection_of(target) {
                Some(target_connection) => {
                    tracing::warn!("Admin {} kicked player {}: {}", player_id, target, reason);
                    self.outbox
                        .send_to(target_connection, &KickNotification { reason });
                    self.outbox.disconnect(target_connection);
                    self.handle_disconnect(target_connection, DisconnectReason::Error);
                    (true, format!("kicked player {target}"))
                }
                None => (false, format!("no player {target}")),
            },
            AdminAction::Broadcast { message } => {
                tracing::info!("Admin {} broadcast: {}", player_id, message);
                self.outbox
                    .push_payload(self.players.all_connections(), &AdminNotification { message });
                (true, "broadcast sent".to_string())
            }
        };
        self.outbox.send_to(
            connection,
            &AdminCommandResult {
                success: u8::from(success),
                message: FixedString::new(&message),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::{Envelope, Outgoing};
    use rtype_protocol::{GameStart, PacketType, Payload, PasswordHash, RoomStatus};

    fn state() -> ServerState {
        ServerState::with_seed(
            ServerConfig {
                countdown_seconds: 1,
                tick_rate: 10,
                snapshot_rate: 10,
                admin_password_hash: Some("secret".to_string()),
                ..ServerConfig::default()
            },
            99,
        )
    }

    fn drain(state: &mut ServerState) -> Vec<Outgoing> {
        state.outbox_mut().drain().collect()
    }

    fn packets(out: &[Outgoing], packet_type: PacketType) -> Vec<Envelope> {
        out.iter()
            .filter_map(|o| match o {
                Outgoing::Packet(envelope) if envelope.packet_type == packet_type => Some(envelope.clone()),
                _ => None,
            })
            .collect()
    }

    fn connect(state: &mut ServerState, connection: u32, name: &str) -> u32 {
        state
            .on_connect(
                ConnectionId(connection),
                ClientConnect {
                    client_version: CLIENT_VERSION,
                    player_name: FixedString::new(name),
                },
            )
            .unwrap();
        state.players().player_for_connection(ConnectionId(connection)).unwrap()
    }

    fn create_room(state: &mut ServerState, connection: u32, player_id: u32, min: u8) {
        state
            .on_create_room(
                ConnectionId(connection),
                ClientCreateRoom {
                    player_id,
                    room_name: FixedString::new("den"),
                    password_hash: PasswordHash::empty(),
                    game_mode: GameMode::Duo,
                    difficulty: Difficulty::Normal,
                    map_id: 2,
                    max_players: 4,
                    min_players_to_start: min,
                },
            )
            .unwrap();
    }

    #[test]
    fn test_connect_accepts_and_announces() {
        let mut s = state();
        let first = connect(&mut s, 1, "ada");
        drain(&mut s);
        let second = connect(&mut s, 2, "bob");
        assert_ne!(first, second);

        let out = drain(&mut s);
        let accept = &packets(&out, PacketType::Accept)[0];
        assert_eq!(accept.recipients, vec![ConnectionId(2)]);
        assert_eq!(ServerAccept::from_bytes(&accept.payload).unwrap().assigned_player_id, second);
        assert_eq!(packets(&out, PacketType::PlayerJoined)[0].recipients, vec![ConnectionId(1)]);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut s = state();
        s.on_connect(
            ConnectionId(1),
            ClientConnect {
                client_version: 9,
                player_name: FixedString::new("old"),
            },
        )
        .unwrap();
        let out = drain(&mut s);
        let reject = ServerReject::from_bytes(&packets(&out, PacketType::Reject)[0].payload).unwrap();
        assert_eq!(reject.reason_code, RejectReason::VersionMismatch);
        assert!(out.contains(&Outgoing::Disconnect(ConnectionId(1))));
        assert!(s.players().is_empty());
    }

    #[test]
    fn test_server_full_rejected() {
        let mut s = ServerState::with_seed(
            ServerConfig {
                max_clients: 1,
                ..ServerConfig::default()
            },
            1,
        );
        connect(&mut s, 1, "one");
        s.on_connect(
            ConnectionId(2),
            ClientConnect {
                client_version: CLIENT_VERSION,
                player_name: FixedString::new("two"),
            },
        )
        .unwrap();
        let out = drain(&mut s);
        let reject = ServerReject::from_bytes(&packets(&out, PacketType::Reject)[0].payload).unwrap();
        assert_eq!(reject.reason_code, RejectReason::ServerFull);
    }

    #[test]
    fn test_claimed_id_must_match_sender() {
        let mut s = state();
        let id = connect(&mut s, 1, "ada");
        let err = s.on_join_lobby(
            ConnectionId(1),
            ClientJoinLobby {
                player_id: id + 1,
                game_mode: GameMode::Duo,
                difficulty: Difficulty::Easy,
            },
        );
        assert!(matches!(
            err,
            Err(crate::error::ServerError::State(ProtocolStateError::PlayerIdMismatch { .. }))
        ));
        assert!(s.lobbies().is_empty());
    }

    #[test]
    fn test_duo_lobby_starts_game() {
        let mut s = state();
        let a = connect(&mut s, 1, "ada");
        let b = connect(&mut s, 2, "bob");
        for (conn, id) in [(1, a), (2, b)] {
            s.on_join_lobby(
                ConnectionId(conn),
                ClientJoinLobby {
                    player_id: id,
                    game_mode: GameMode::Duo,
                    difficulty: Difficulty::Normal,
                },
            )
            .unwrap();
        }
        drain(&mut s);

        let mut start = None;
        for _ in 0..20 {
            s.update();
            let out = drain(&mut s);
            if let Some(envelope) = packets(&out, PacketType::GameStart).pop() {
                start = Some(envelope);
                break;
            }
        }
        let start = start.unwrap();
        assert_eq!(start.recipients.len(), 2);
        let start = GameStart::from_bytes(&start.payload).unwrap();
        assert_eq!(start.spawns.len(), 2);
        assert_eq!(
            s.players().get(a).unwrap().membership,
            Membership::Session(start.header.game_session_id)
        );
    }

    #[test]
    fn test_mid_match_disconnect_announced_once() {
        let mut s = state();
        let a = connect(&mut s, 1, "ada");
        let b = connect(&mut s, 2, "bob");
        for (conn, id) in [(1, a), (2, b)] {
            s.on_join_lobby(
                ConnectionId(conn),
                ClientJoinLobby {
                    player_id: id,
                    game_mode: GameMode::Duo,
                    difficulty: Difficulty::Normal,
                },
            )
            .unwrap();
        }
        for _ in 0..20 {
            s.update();
            if s.sessions().session_of(a).is_some() {
                break;
            }
        }
        assert!(s.sessions().session_of(a).is_some());
        drain(&mut s);

        s.handle_disconnect(ConnectionId(1), DisconnectReason::UserQuit);
        s.update();
        let out = drain(&mut s);
        let left = packets(&out, PacketType::PlayerLeft);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].recipients, vec![ConnectionId(2)]);
        assert!(!packets(&out, PacketType::EntityDestroy).is_empty());
    }

    #[test]
    fn test_handshake_requires_session() {
        let mut s = state();
        let a = connect(&mut s, 1, "ada");
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert!(s
            .on_udp_handshake(
                peer,
                ClientUdpHandshake {
                    player_id: a,
                    session_id: 1
                }
            )
            .is_err());
        assert!(s
            .on_input(
                peer,
                ClientInput {
                    player_id: a,
                    input_flags: 0,
                    client_tick: 0,
                    sequence_number: 1
                }
            )
            .is_err());
    }

    #[test]
    fn test_room_lifecycle() {
        let mut s = state();
        let host = connect(&mut s, 1, "host");
        let guest = connect(&mut s, 2, "guest");
        create_room(&mut s, 1, host, 2);
        let out = drain(&mut s);
        let created = RoomCreated::from_bytes(&packets(&out, PacketType::RoomCreated)[0].payload).unwrap();
        let room_id = created.room_id;

        s.on_start_game(ConnectionId(1), ClientStartGame { player_id: host, room_id })
            .unwrap();
        let out = drain(&mut s);
        let error = RoomError::from_bytes(&packets(&out, PacketType::RoomError)[0].payload).unwrap();
        assert_eq!(error.error_code, RoomErrorCode::InvalidConfiguration);

        s.on_join_room(
            ConnectionId(2),
            ClientJoinRoom {
                player_id: guest,
                room_id,
                password_hash: PasswordHash::empty(),
            },
        )
        .unwrap();
        let out = drain(&mut s);
        assert_eq!(packets(&out, PacketType::RoomJoined).len(), 1);
        let update = RoomStateUpdate::from_bytes(&packets(&out, PacketType::RoomStateUpdate)[0].payload).unwrap();
        assert_eq!(update.players.len(), 2);
        assert_eq!(update.players[0].is_host, 1);

        s.on_start_game(ConnectionId(2), ClientStartGame { player_id: guest, room_id })
            .unwrap();
        let out = drain(&mut s);
        let error = RoomError::from_bytes(&packets(&out, PacketType::RoomError)[0].payload).unwrap();
        assert_eq!(error.error_code, RoomErrorCode::NotHost);

        s.on_start_game(ConnectionId(1), ClientStartGame { player_id: host, room_id })
            .unwrap();
        s.update();
        let out = drain(&mut s);
        let update = RoomStateUpdate::from_bytes(&packets(&out, PacketType::RoomStateUpdate)[0].payload).unwrap();
        assert_eq!(update.header.status, RoomStatus::InProgress);
        assert_eq!(update.header.countdown, 1);

        for _ in 0..10 {
            s.update();
        }
        assert!(s.rooms().is_empty());
        assert!(s.players().get(guest).unwrap().session_id().is_some());
    }

    #[test]
    fn test_host_leaving_migrates() {
        let mut s = state();
        let host = connect(&mut s, 1, "host");
        let guest = connect(&mut s, 2, "guest");
        create_room(&mut s, 1, host, 1);
        let room_id = s.rooms().room_of(host).unwrap();
        s.on_join_room(
            ConnectionId(2),
            ClientJoinRoom {
                player_id: guest,
                room_id,
                password_hash: PasswordHash::empty(),
            },
        )
        .unwrap();
        drain(&mut s);

        s.handle_disconnect(ConnectionId(1), DisconnectReason::Timeout);
        assert_eq!(s.rooms().room(room_id).unwrap().host, guest);
        let out = drain(&mut s);
        assert_eq!(packets(&out, PacketType::RoomLeft)[0].recipients, vec![ConnectionId(2)]);
        assert_eq!(packets(&out, PacketType::PlayerLeft).len(), 1);
    }

    #[test]
    fn test_admin_kick() {
        let mut s = state();
        let admin = connect(&mut s, 1, "root");
        let victim = connect(&mut s, 2, "griefer");
        drain(&mut s);

        let command = ClientAdminCommand {
            command: rtype_protocol::AdminCommandKind::Kick,
            target_player_id: victim,
            argument: FixedString::new("bye"),
        };
        assert!(s.on_admin_command(ConnectionId(1), command).is_err());
        drain(&mut s);

        s.on_admin_auth(
            ConnectionId(1),
            ClientAdminAuth {
                username: FixedString::new("root"),
                password_hash: PasswordHash::new("secret"),
            },
        )
        .unwrap();
        s.on_admin_command(ConnectionId(1), command).unwrap();
        let out = drain(&mut s);
        assert_eq!(packets(&out, PacketType::KickNotification)[0].recipients, vec![ConnectionId(2)]);
        assert!(out.contains(&Outgoing::Disconnect(ConnectionId(2))));
        let result =
            AdminCommandResult::from_bytes(&packets(&out, PacketType::AdminCommandResult)[0].payload).unwrap();
        assert_eq!(result.success, 1);
        assert!(s.players().get(victim).is_none());
        assert!(s.players().get(admin).is_some());
    }

    #[test]
    fn test_ping_and_leaderboard() {
        let mut s = state();
        let id = connect(&mut s, 1, "ada");
        drain(&mut s);
        s.on_ping(
            ConnectionId(1),
            ClientPing {
                player_id: id,
                client_timestamp: 1234,
            },
        )
        .unwrap();
        s.on_request_global_leaderboard(ConnectionId(1)).unwrap();
        let out = drain(&mut s);
        let pong = ServerPong::from_bytes(&packets(&out, PacketType::Pong)[0].payload).unwrap();
        assert_eq!(pong.client_timestamp, 1234);
        assert_eq!(packets(&out, PacketType::GlobalLeaderboard).len(), 1);
    }
}
