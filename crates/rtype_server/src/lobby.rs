//! # Quick-Match Lobbies
//!
//! Groups waiting players by mode and difficulty and counts them down into a
//! match.
//!
//! ## State Machine
//!
//! ```text
//!            members == required
//!   Idle ─────────────────────────▶ CountingDown ──(ticks == 0)──▶ GameStart (lobby removed)
//!    ▲                                   │
//!    │ next tick                         │ members < required
//!    └──────────── Cancelled ◀───────────┘
//! ```
//!
//! ## Design
//!
//! - The countdown is a tick counter; only membership changes cancel it
//! - Every call that changes a lobby queues a full membership event
//! - Events carry their recipients, so a removed lobby can still be announced

use std::collections::{BTreeMap, HashMap};

use rtype_protocol::{CountdownCancelReason, Difficulty, GameMode};

use crate::error::ProtocolStateError;

/// Countdown phase of one lobby.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownState {
    /// Waiting for players.
    Idle,
    /// Full; starting when the counter reaches zero.
    CountingDown {
        /// Server ticks left.
        ticks_remaining: u32,
    },
    /// Countdown aborted this tick; becomes `Idle` on the next one.
    Cancelled(CountdownCancelReason),
}

/// One quick-match lobby.
#[derive(Clone, Debug)]
pub struct Lobby {
    /// Lobby id.
    pub id: u32,
    /// Mode; fixes the required player count.
    pub game_mode: GameMode,
    /// Difficulty.
    pub difficulty: Difficulty,
    /// Members in join order.
    pub members: Vec<u32>,
    /// Countdown phase.
    pub state: CountdownState,
}

impl Lobby {
    /// Players needed to start.
    #[inline]
    #[must_use]
    pub const fn required(&self) -> u8 {
        self.game_mode.required_players()
    }

    /// Member count.
    #[must_use]
    pub fn player_count(&self) -> u8 {
        u8::try_from(self.members.len()).unwrap_or(u8::MAX)
    }

    /// True if a new player may join.
    #[must_use]
    pub fn is_joinable(&self) -> bool {
        !matches!(self.state, CountdownState::CountingDown { .. }) && self.player_count() < self.required()
    }
}

/// Something a lobby announces to its members.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LobbyEvent {
    /// Membership or phase changed.
    StateChanged {
        /// Lobby id.
        lobby_id: u32,
        /// Mode.
        game_mode: GameMode,
        /// Difficulty.
        difficulty: Difficulty,
        /// Players needed to start.
        required: u8,
        /// Current members, also the recipients.
        members: Vec<u32>,
    },
    /// One countdown second.
    CountdownTick {
        /// Lobby id.
        lobby_id: u32,
        /// Seconds until start.
        seconds_remaining: u8,
        /// Mode.
        game_mode: GameMode,
        /// Difficulty.
        difficulty: Difficulty,
        /// Recipients.
        members: Vec<u32>,
    },
    /// The countdown stopped.
    CountdownCancelled {
        /// Lobby id.
        lobby_id: u32,
        /// Why.
        reason: CountdownCancelReason,
        /// Members after the change.
        new_count: u8,
        /// Players needed to start.
        required: u8,
        /// Recipients.
        members: Vec<u32>,
    },
    /// The countdown finished; the lobby is gone.
    GameStart {
        /// Lobby id.
        lobby_id: u32,
        /// Mode.
        game_mode: GameMode,
        /// Difficulty.
        difficulty: Difficulty,
        /// Players moving into the match.
        players: Vec<u32>,
    },
}

/// All quick-match lobbies.
#[derive(Debug)]
pub struct LobbyManager {
    lobbies: BTreeMap<u32, Lobby>,
    by_player: HashMap<u32, u32>,
    next_lobby_id: u32,
    countdown_ticks: u32,
    tick_rate: u32,
    events: Vec<LobbyEvent>,
}

impl LobbyManager {
    /// Creates a manager whose countdowns last `countdown_seconds` at `tick_rate`.
    #[must_use]
    pub fn new(countdown_seconds: u8, tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            lobbies: BTreeMap::new(),
            by_player: HashMap::new(),
            next_lobby_id: 1,
            countdown_ticks: u32::from(countdown_seconds.max(1)) * tick_rate,
            tick_rate,
            events: Vec::new(),
        }
    }

    /// Lobby by id.
    #[must_use]
    pub fn lobby(&self, lobby_id: u32) -> Option<&Lobby> {
        self.lobbies.get(&lobby_id)
    }

    /// Lobby a player is waiting in.
    #[must_use]
    pub fn lobby_of(&self, player_id: u32) -> Option<u32> {
        self.by_player.get(&player_id).copied()
    }

    /// Open lobby count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    /// True when no lobby is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    /// Puts `player_id` into a matching lobby, opening one if needed.
    ///
    /// Returns the lobby id.
    pub fn join(
        &mut self,
        player_id: u32,
        game_mode: GameMode,
        difficulty: Difficulty,
    ) -> Result<u32, ProtocolStateError> {
        if self.by_player.contains_key(&player_id) {
            return Err(ProtocolStateError::AlreadyBusy(player_id));
        }

        let existing = self
            .lobbies
            .values()
            .find(|l| l.game_mode == game_mode && l.difficulty == difficulty && l.is_joinable())
            .map(|l| l.id);
        let lobby_id = existing.unwrap_or_else(|| self.open(game_mode, difficulty));

        self.by_player.insert(player_id, lobby_id);
        let countdown_ticks = self.countdown_ticks;
        let Some(lobby) = self.lobbies.get_mut(&lobby_id) else {
            return Err(ProtocolStateError::NotInLobby(player_id));
        };
        lobby.members.push(player_id);
        if lobby.player_count() >= lobby.required() {
            lobby.state = CountdownState::CountingDown { ticks_remaining: countdown_ticks };
            tracing::info!(
                "Lobby {} full ({}/{}), counting down",
                lobby_id,
                lobby.player_count(),
                lobby.required()
            );
        }

        let lobby = lobby.clone();
        self.events.push(state_event(&lobby));
        if let CountdownState::CountingDown { ticks_remaining } = lobby.state {
            let seconds = self.seconds_for(ticks_remaining);
            self.events.push(countdown_event(&lobby, seconds));
        }
        Ok(lobby_id)
    }

    /// Removes `player_id` from its lobby. Returns the lobby id.
    ///
    /// Dropping below the required count mid-countdown cancels it. An empty
    /// lobby is closed.
    pub fn leave(&mut self, player_id: u32) -> Result<u32, ProtocolStateError> {
        let lobby_id = self
            .by_player
            .remove(&player_id)
            .ok_or(ProtocolStateError::NotInLobby(player_id))?;
        let Some(lobby) = self.lobbies.get_mut(&lobby_id) else {
            return Err(ProtocolStateError::NotInLobby(player_id));
        };
        lobby.members.retain(|&id| id != player_id);

        if lobby.members.is_empty() {
            self.lobbies.remove(&lobby_id);
            tracing::info!("Lobby {} closed: empty", lobby_id);
            return Ok(lobby_id);
        }

        let cancelled = matches!(lobby.state, CountdownState::CountingDown { .. })
            && lobby.player_count() < lobby.required();
        if cancelled {
            lobby.state = CountdownState::Cancelled(CountdownCancelReason::PlayerLeft);
            tracing::info!(
                "Lobby {} countdown cancelled: player {} left ({}/{})",
                lobby_id,
                player_id,
                lobby.player_count(),
                lobby.required()
            );
        }

        let lobby = lobby.clone();
        if cancelled {
            self.events.push(LobbyEvent::CountdownCancelled {
                lobby_id,
                reason: CountdownCancelReason::PlayerLeft,
                new_count: lobby.player_count(),
                required: lobby.required(),
                members: lobby.members.clone(),
            });
        }
        self.events.push(state_event(&lobby));
        Ok(lobby_id)
    }

    /// Advances every countdown by one server tick.
    pub fn tick(&mut self) {
        let mut started = Vec::new();

        for lobby in self.lobbies.values_mut() {
            match lobby.state {
                CountdownState::Cancelled(_) => {
                    lobby.state = CountdownState::Idle;
                    self.events.push(state_event(lobby));
                }
                CountdownState::CountingDown { ticks_remaining } => {
                    let left = ticks_remaining.saturating_sub(1);
                    lobby.state = CountdownState::CountingDown { ticks_remaining: left };
                    if left == 0 {
                        started.push(lobby.id);
                    } else if left % self.tick_rate == 0 {
                        let seconds = u8::try_from(left / self.tick_rate).unwrap_or(u8::MAX);
                        self.events.push(countdown_event(lobby, seconds));
                    }
                }
                CountdownState::Idle => {}
            }
        }

        for lobby_id in started {
            let Some(lobby) = self.lobbies.remove(&lobby_id) else {
                continue;
            };
            for player in &lobby.members {
                self.by_player.remove(player);
            }
            tracing::info!("Lobby {} starting with players {:?}", lobby_id, lobby.members);
            self.events.push(LobbyEvent::GameStart {
                lobby_id,
                game_mode: lobby.game_mode,
                difficulty: lobby.difficulty,
                players: lobby.members,
            });
        }
    }

    /// Takes the events queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<LobbyEvent> {
        std::mem::take(&mut self.events)
    }

    fn open(&mut self, game_mode: GameMode, difficulty: Difficulty) -> u32 {
        let id = self.next_lobby_id;
        self.next_lobby_id = self.next_lobby_id.wrapping_add(1).max(1);
        self.lobbies.insert(
            id,
            Lobby {
                id,
                game_mode,
                difficulty,
                members: Vec::with_capacity(usize::from(game_mode.required_players())),
                state: CountdownState::Idle,
            },
        );
        tracing::info!("Lobby {} opened ({:?}, {:?})", id, game_mode, difficulty);
        id
    }

    fn seconds_for(&self, ticks: u32) -> u8 {
        u8::try_from(ticks.div_ceil(self.tick_rate)).unwrap_or(u8::MAX)
    }
}

fn state_event(lobby: &Lobby) -> LobbyEvent {
    LobbyEvent::StateChanged {
        lobby_id: lobby.id,
        game_mode: lobby.game_mode,
        difficulty: lobby.difficulty,
        required: lobby.required(),
        members: lobby.members.clone(),
    }
}

fn countdown_event(lobby: &Lobby, seconds_remaining: u8) -> LobbyEvent {
    LobbyEvent::CountdownTick {
        lobby_id: lobby.id,
        seconds_remaining,
        game_mode: lobby.game_mode,
        difficulty: lobby.difficulty,
        members: lobby.members.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK_RATE: u32 = 10;
    const COUNTDOWN: u8 = 5;

    fn manager() -> LobbyManager {
        LobbyManager::new(COUNTDOWN, TICK_RATE)
    }

    fn run(manager: &mut LobbyManager, ticks: u32) {
        for _ in 0..ticks {
            manager.tick();
        }
    }

    #[test]
    fn test_duo_starts_after_countdown() {
        let mut lobbies = manager();
        let id = lobbies.join(1, GameMode::Duo, Difficulty::Normal).unwrap();
        assert_eq!(lobbies.lobby(id).unwrap().state, CountdownState::Idle);

        assert_eq!(lobbies.join(2, GameMode::Duo, Difficulty::Normal), Ok(id));
        assert!(matches!(
            lobbies.lobby(id).unwrap().state,
            CountdownState::CountingDown { .. }
        ));
        let events = lobbies.drain_events();
        assert!(matches!(
            events.last(),
            Some(LobbyEvent::CountdownTick { seconds_remaining: 5, .. })
        ));

        run(&mut lobbies, u32::from(COUNTDOWN) * TICK_RATE - 1);
        let events = lobbies.drain_events();
        assert!(!events.iter().any(|e| matches!(e, LobbyEvent::GameStart { .. })));
        let ticks: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                LobbyEvent::CountdownTick { seconds_remaining, .. } => Some(*seconds_remaining),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![4, 3, 2, 1]);

        lobbies.tick();
        let events = lobbies.drain_events();
        assert_eq!(
            events,
            vec![LobbyEvent::GameStart {
                lobby_id: id,
                game_mode: GameMode::Duo,
                difficulty: Difficulty::Normal,
                players: vec![1, 2],
            }]
        );
        assert!(lobbies.is_empty());
        assert_eq!(lobbies.lobby_of(1), None);
    }

    #[test]
    fn test_squad_cancel_on_leave() {
        let mut lobbies = manager();
        for player in 1..=4 {
            lobbies.join(player, GameMode::Squad, Difficulty::Hard).unwrap();
        }
        run(&mut lobbies, 7);
        lobbies.drain_events();

        let id = lobbies.leave(3).unwrap();
        assert_eq!(
            lobbies.lobby(id).unwrap().state,
            CountdownState::Cancelled(CountdownCancelReason::PlayerLeft)
        );

        let events = lobbies.drain_events();
        let cancels = events
            .iter()
            .filter(|e| matches!(e, LobbyEvent::CountdownCancelled { .. }))
            .count();
        assert_eq!(cancels, 1);
        assert!(events.iter().any(|e| matches!(
            e,
            LobbyEvent::CountdownCancelled { new_count: 3, required: 4, .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            LobbyEvent::StateChanged { members, .. } if members.len() == 3
        )));

        lobbies.tick();
        assert_eq!(lobbies.lobby(id).unwrap().state, CountdownState::Idle);
        assert_eq!(
            lobbies.drain_events(),
            vec![LobbyEvent::StateChanged {
                lobby_id: id,
                game_mode: GameMode::Squad,
                difficulty: Difficulty::Hard,
                required: 4,
                members: vec![1, 2, 4],
            }]
        );

        run(&mut lobbies, u32::from(COUNTDOWN) * TICK_RATE * 2);
        assert!(lobbies.drain_events().is_empty());
    }

    #[test]
    fn test_refill_restarts_countdown() {
        let mut lobbies = manager();
        lobbies.join(1, GameMode::Duo, Difficulty::Easy).unwrap();
        let id = lobbies.join(2, GameMode::Duo, Difficulty::Easy).unwrap();
        lobbies.leave(2).unwrap();
        assert_eq!(lobbies.join(3, GameMode::Duo, Difficulty::Easy), Ok(id));
        assert_eq!(
            lobbies.lobby(id).unwrap().state,
            CountdownState::CountingDown { ticks_remaining: u32::from(COUNTDOWN) * TICK_RATE }
        );
    }

    #[test]
    fn test_matching_by_mode_and_difficulty() {
        let mut lobbies = manager();
        let a = lobbies.join(1, GameMode::Trio, Difficulty::Easy).unwrap();
        let b = lobbies.join(2, GameMode::Trio, Difficulty::Hard).unwrap();
        let c = lobbies.join(3, GameMode::Duo, Difficulty::Easy).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(lobbies.join(4, GameMode::Trio, Difficulty::Easy), Ok(a));
        assert_eq!(
            lobbies.join(4, GameMode::Trio, Difficulty::Easy),
            Err(ProtocolStateError::AlreadyBusy(4))
        );
    }

    #[test]
    fn test_full_lobby_not_joined() {
        let mut lobbies = manager();
        let first = lobbies.join(1, GameMode::Duo, Difficulty::Normal).unwrap();
        lobbies.join(2, GameMode::Duo, Difficulty::Normal).unwrap();
        let second = lobbies.join(3, GameMode::Duo, Difficulty::Normal).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_last_leave_closes_lobby() {
        let mut lobbies = manager();
        let id = lobbies.join(1, GameMode::Duo, Difficulty::Normal).unwrap();
        assert_eq!(lobbies.leave(1), Ok(id));
        assert!(lobbies.lobby(id).is_none());
        assert_eq!(lobbies.leave(1), Err(ProtocolStateError::NotInLobby(1)));
    }
}
