//! Owns every running session and turns their output into packets.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rtype_protocol::{
    ClientInput, Difficulty, DisconnectReason, FinalScoreEntry, GameMode, GameResult, GameStart,
    GameStartHeader, PacketType,
};

use super::{GameSession, SessionRules, SnapshotSync};
use crate::config::ServerConfig;
use crate::error::ProtocolStateError;

/// Session-wide knobs taken from the server configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    /// Server ticks per second.
    pub tick_rate: u32,
    /// Snapshots per second.
    pub snapshot_rate: u32,
    /// Send deltas between keyframes.
    pub delta_snapshots: bool,
    /// Every n-th snapshot is full.
    pub keyframe_interval: u32,
    /// Ticks before a match times out.
    pub time_limit_ticks: u64,
    /// Port announced in GAME_START.
    pub udp_port: u16,
}

impl SessionSettings {
    /// Extracts the session settings from `config`.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            tick_rate: config.tick_rate,
            snapshot_rate: config.snapshot_rate,
            delta_snapshots: config.delta_snapshots,
            keyframe_interval: config.keyframe_interval,
            time_limit_ticks: config.session_time_limit_ticks(),
            udp_port: config.udp_port,
        }
    }
}

/// An encoded packet a session wants delivered to some of its players.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionPacket {
    /// Originating session.
    pub session_id: u32,
    /// Player ids to deliver to.
    pub recipients: Vec<u32>,
    /// Packet type; its channel picks the transport.
    pub packet_type: PacketType,
    /// Encoded payload.
    pub payload: Vec<u8>,
}

/// A session removed after going inactive.
#[derive(Clone, Debug, PartialEq)]
pub struct FinishedSession {
    /// Session id.
    pub session_id: u32,
    /// Players still connected at the end.
    pub players: Vec<u32>,
    /// Outcome; `None` when everyone left.
    pub result: Option<GameResult>,
    /// Final score lines.
    pub scores: Vec<FinalScoreEntry>,
    /// Wave reached.
    pub wave: u32,
}

#[derive(Debug)]
struct RunningSession {
    session: GameSession,
    sync: SnapshotSync,
}

/// Every running session, keyed by id.
///
/// A session that ends during a tick still gets its final events out that
/// tick; it is removed at the start of the next one.
#[derive(Debug)]
pub struct GameSessionManager {
    settings: SessionSettings,
    sessions: BTreeMap<u32, RunningSession>,
    by_player: HashMap<u32, u32>,
    next_id: u32,
    seeds: StdRng,
}

impl GameSessionManager {
    /// Creates an empty manager drawing level seeds from `seed`.
    #[must_use]
    pub fn new(settings: SessionSettings, seed: u64) -> Self {
        Self {
            settings,
            sessions: BTreeMap::new(),
            by_player: HashMap::new(),
            next_id: 1,
            seeds: StdRng::seed_from_u64(seed),
        }
    }

    /// Running session count.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no session runs.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Session by id.
    #[must_use]
    pub fn session(&self, session_id: u32) -> Option<&GameSession> {
        self.sessions.get(&session_id).map(|r| &r.session)
    }

    /// Session `player_id` plays in.
    #[must_use]
    pub fn session_of(&self, player_id: u32) -> Option<u32> {
        self.by_player.get(&player_id).copied()
    }

    /// Starts a match for `players` and returns its GAME_START payload.
    pub fn create_session(&mut self, game_mode: GameMode, difficulty: Difficulty, players: &[u32]) -> GameStart {
        let session_id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let level_seed: u32 = self.seeds.gen();

        let rules = SessionRules {
            tick_rate: self.settings.tick_rate,
            time_limit_ticks: self.settings.time_limit_ticks,
        };
        let session = GameSession::new(session_id, game_mode, difficulty, level_seed, players, rules);
        let start = GameStart::new(
            GameStartHeader {
                game_session_id: session_id,
                game_mode,
                difficulty,
                server_tick: session.server_tick(),
                level_seed,
                udp_port: self.settings.udp_port,
                player_count: 0,
            },
            session.spawn_data(),
        );

        for &player_id in players {
            self.by_player.insert(player_id, session_id);
        }
        let sync = SnapshotSync::new(
            self.settings.tick_rate,
            self.settings.snapshot_rate,
            self.settings.delta_snapshots,
            self.settings.keyframe_interval,
        );
        self.sessions.insert(session_id, RunningSession { session, sync });
        start
    }

    /// Applies an input to the sender's session.
    ///
    /// Returns false when the sequence was stale or a duplicate.
    pub fn apply_input(&mut self, player_id: u32, input: &ClientInput) -> Result<bool, ProtocolStateError> {
        let session_id = self.session_of(player_id).unwrap_or(0);
        self.sessions
            .get_mut(&session_id)
            .ok_or(ProtocolStateError::NotInSession { player_id, session_id })?
            .session
            .apply_input(player_id, input)
    }

    /// Removes a player from whatever session holds them.
    pub fn remove_player(&mut self, player_id: u32, reason: DisconnectReason) -> Option<u32> {
        let session_id = self.by_player.remove(&player_id)?;
        if let Some(running) = self.sessions.get_mut(&session_id) {
            running.session.remove_player(player_id, reason);
        }
        Some(session_id)
    }

    /// Sweeps sessions that ended last tick, then advances the rest.
    ///
    /// Returns the packets to send and the sessions just removed.
    pub fn tick(&mut self) -> (Vec<SessionPacket>, Vec<FinishedSession>) {
        let ended: Vec<u32> = self
            .sessions
            .iter()
            .filter(|(_, running)| !running.session.is_active())
            .map(|(&id, _)| id)
            .collect();

        let mut finished = Vec::with_capacity(ended.len());
        for session_id in ended {
            let Some(running) = self.sessions.remove(&session_id) else {
                continue;
            };
            self.by_player.retain(|_, id| *id != session_id);
            let session = running.session;
            tracing::debug!("Session {} removed", session_id);
            finished.push(FinishedSession {
                session_id,
                players: session.recipients(),
                result: session.result(),
                scores: session.final_scores(),
                wave: session.wave_number(),
            });
        }

        let mut packets = Vec::new();
        for (&session_id, running) in &mut self.sessions {
            let session = &mut running.session;
            session.tick();

            let recipients = session.recipients();
            for event in session.drain_events() {
                packets.push(SessionPacket {
                    session_id,
                    recipients: recipients.clone(),
                    packet_type: event.packet_type(),
                    payload: event.to_bytes(),
                });
            }

            if session.is_active() && running.sync.due() {
                let (packet_type, payload) =
                    running
                        .sync
                        .build(session.server_tick(), session.scroll_x(), session.snapshot_lines());
                packets.push(SessionPacket {
                    session_id,
                    recipients,
                    packet_type,
                    payload,
                });
            }
        }

        (packets, finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtype_protocol::{Payload, Snapshot};

    fn settings() -> SessionSettings {
        SessionSettings {
            tick_rate: 60,
            snapshot_rate: 60,
            delta_snapshots: false,
            keyframe_interval: 60,
            time_limit_ticks: 600,
            udp_port: 4243,
        }
    }

    fn input(player_id: u32, sequence_number: u32) -> ClientInput {
        ClientInput {
            player_id,
            input_flags: 0,
            client_tick: sequence_number,
            sequence_number,
        }
    }

    #[test]
    fn test_create_session_announces_spawns() {
        let mut manager = GameSessionManager::new(settings(), 42);
        let start = manager.create_session(GameMode::Duo, Difficulty::Hard, &[3, 4]);
        assert_eq!(start.header.game_session_id, 1);
        assert_eq!(start.header.udp_port, 4243);
        assert_eq!(start.header.player_count, 2);
        assert_eq!(start.spawns.len(), 2);
        assert_eq!(manager.session_of(4), Some(1));
    }

    #[test]
    fn test_snapshot_acks_highest_input() {
        let mut manager = GameSessionManager::new(settings(), 42);
        manager.create_session(GameMode::Duo, Difficulty::Normal, &[1, 2]);
        for seq in [5, 3, 7] {
            manager.apply_input(1, &input(1, seq)).unwrap();
        }

        let (packets, _) = manager.tick();
        let snapshot = packets
            .iter()
            .find(|p| p.packet_type == PacketType::Snapshot)
            .unwrap();
        assert_eq!(snapshot.recipients, vec![1, 2]);

        let snapshot = Snapshot::from_bytes(&snapshot.payload).unwrap();
        assert_eq!(snapshot.entities[0].entity_type, rtype_protocol::EntityType::Player);
        assert_eq!(snapshot.entities[0].last_ack_sequence, 7);
        assert_eq!(snapshot.entities[1].last_ack_sequence, 0);
    }

    #[test]
    fn test_input_outside_session() {
        let mut manager = GameSessionManager::new(settings(), 42);
        assert_eq!(
            manager.apply_input(9, &input(9, 1)),
            Err(ProtocolStateError::NotInSession { player_id: 9, session_id: 0 })
        );
    }

    #[test]
    fn test_abandoned_session_swept_next_tick() {
        let mut manager = GameSessionManager::new(settings(), 42);
        manager.create_session(GameMode::Duo, Difficulty::Normal, &[1, 2]);
        assert_eq!(manager.remove_player(1, DisconnectReason::UserQuit), Some(1));
        assert_eq!(manager.remove_player(1, DisconnectReason::UserQuit), None);

        let (packets, finished) = manager.tick();
        assert!(finished.is_empty());
        assert!(packets
            .iter()
            .any(|p| p.packet_type == PacketType::EntityDestroy && p.recipients == vec![2]));
        assert!(packets.iter().all(|p| p.packet_type != PacketType::PlayerLeft));

        manager.remove_player(2, DisconnectReason::Timeout);
        let (packets, finished) = manager.tick();
        assert!(packets.is_empty());
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].result, None);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_timeout_reports_game_over_then_sweeps() {
        let mut manager = GameSessionManager::new(
            SessionSettings {
                time_limit_ticks: 5,
                ..settings()
            },
            7,
        );
        manager.create_session(GameMode::Duo, Difficulty::Easy, &[1, 2]);

        let mut game_over = 0;
        for _ in 0..5 {
            let (packets, finished) = manager.tick();
            assert!(finished.is_empty());
            game_over += packets
                .iter()
                .filter(|p| p.packet_type == PacketType::GameOver)
                .count();
        }
        assert_eq!(game_over, 1);

        let (_, finished) = manager.tick();
        assert_eq!(finished[0].result, Some(GameResult::Timeout));
        assert_eq!(finished[0].players, vec![1, 2]);
        assert_eq!(manager.session_of(1), None);
    }
}
