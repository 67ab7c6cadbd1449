//! # Custom Rooms
//!
//! Host-configured rooms: named, optionally password protected, started by
//! the host once enough members are present.
//!
//! ## Design
//!
//! - Room ids start at 1000 so they never collide with quick-match lobby ids
//! - Start is gated on the host's `min_players_to_start`, not on the mode
//! - The host's start runs a tick countdown that ends in the same game-start
//!   path as a quick-match lobby
//! - Refusals are [`RoomErrorCode`]s, answered to the sender as ROOM_ERROR

use std::collections::{BTreeMap, HashMap};

use rtype_protocol::{
    ClientCreateRoom, Difficulty, FixedString, GameMode, PasswordHash, RoomErrorCode, RoomInfo, RoomList,
    RoomListHeader, RoomStatus,
};

/// First id handed out.
pub const FIRST_ROOM_ID: u32 = 1000;

/// Hard cap on room capacity.
pub const MAX_ROOM_PLAYERS: u8 = 4;

/// One custom room.
#[derive(Clone, Debug)]
pub struct Room {
    /// Room id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Current host; always a member.
    pub host: u32,
    /// Required password hash, if any.
    pub password_hash: Option<PasswordHash>,
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
    /// Members in join order.
    pub members: Vec<u32>,
    /// Lifecycle.
    pub status: RoomStatus,
    /// Ticks until the match starts, once the host started it.
    pub countdown_ticks: Option<u32>,
}

impl Room {
    /// Member count.
    #[must_use]
    pub fn player_count(&self) -> u8 {
        u8::try_from(self.members.len()).unwrap_or(u8::MAX)
    }

    /// True when the room is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.player_count() >= self.max_players
    }

    /// Whole seconds left on the start countdown, zero when not counting.
    #[must_use]
    pub fn countdown_seconds(&self, tick_rate: u32) -> u8 {
        self.countdown_ticks
            .map_or(0, |t| u8::try_from(t.div_ceil(tick_rate.max(1))).unwrap_or(u8::MAX))
    }

    /// Public listing entry.
    #[must_use]
    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.id,
            room_name: FixedString::new(&self.name),
            game_mode: self.game_mode,
            difficulty: self.difficulty,
            current_players: self.player_count(),
            max_players: self.max_players,
            map_id: self.map_id,
            status: self.status,
            has_password: u8::from(self.password_hash.is_some()),
        }
    }
}

/// Something a room announces on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoomEvent {
    /// One countdown second elapsed.
    Countdown {
        /// Room id.
        room_id: u32,
    },
    /// The countdown finished; the room is gone.
    GameStart {
        /// Room id.
        room_id: u32,
        /// Mode.
        game_mode: GameMode,
        /// Difficulty.
        difficulty: Difficulty,
        /// Players moving into the match.
        players: Vec<u32>,
    },
}

/// All custom rooms.
#[derive(Debug)]
pub struct RoomManager {
    rooms: BTreeMap<u32, Room>,
    by_player: HashMap<u32, u32>,
    next_room_id: u32,
    countdown_ticks: u32,
    tick_rate: u32,
    events: Vec<RoomEvent>,
}

impl RoomManager {
    /// Creates a manager whose start countdowns last `countdown_seconds`.
    #[must_use]
    pub fn new(countdown_seconds: u8, tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            rooms: BTreeMap::new(),
            by_player: HashMap::new(),
            next_room_id: FIRST_ROOM_ID,
            countdown_ticks: u32::from(countdown_seconds.max(1)) * tick_rate,
            tick_rate,
            events: Vec::new(),
        }
    }

    /// Room by id.
    #[must_use]
    pub fn room(&self, room_id: u32) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    /// Room a player is in.
    #[must_use]
    pub fn room_of(&self, player_id: u32) -> Option<u32> {
        self.by_player.get(&player_id).copied()
    }

    /// Open room count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// True when no room is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Configured server tick rate.
    #[inline]
    #[must_use]
    pub const fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Opens a room hosted by `host`. Returns the new room id.
    pub fn create(&mut self, host: u32, request: &ClientCreateRoom) -> Result<u32, RoomErrorCode> {
        if self.by_player.contains_key(&host) {
            return Err(RoomErrorCode::AlreadyInRoom);
        }

        let id = self.next_room_id;
        self.next_room_id = self.next_room_id.wrapping_add(1).max(FIRST_ROOM_ID);

        let name = if request.room_name.is_empty() {
            format!("Room #{id}")
        } else {
            request.room_name.as_str().to_string()
        };
        let max_players = request.max_players.clamp(1, MAX_ROOM_PLAYERS);
        let min_players_to_start = request.min_players_to_start.clamp(1, max_players);
        let password_hash = (!request.password_hash.is_empty()).then_some(request.password_hash);

        tracing::info!(
            "Room {} '{}' created by player {} ({:?}, {:?}, {}-{} players)",
            id,
            name,
            host,
            request.game_mode,
            request.difficulty,
            min_players_to_start,
            max_players
        );
        self.rooms.insert(
            id,
            Room {
                id,
                name,
                host,
                password_hash,
                game_mode: request.game_mode,
                difficulty: request.difficulty,
                map_id: request.map_id,
                max_players,
                min_players_to_start,
                members: vec![host],
                status: RoomStatus::Waiting,
                countdown_ticks: None,
            },
        );
        self.by_player.insert(host, id);
        Ok(id)
    }

    /// Adds `player_id` to `room_id`.
    ///
    /// Checks, in order: not already in a room, room exists, room not full,
    /// room still waiting, password matches.
    pub fn join(&mut self, player_id: u32, room_id: u32, password_hash: &PasswordHash) -> Result<(), RoomErrorCode> {
        if self.by_player.contains_key(&player_id) {
            return Err(RoomErrorCode::AlreadyInRoom);
        }
        let room = self.rooms.get_mut(&room_id).ok_or(RoomErrorCode::NotFound)?;
        if room.is_full() {
            return Err(RoomErrorCode::Full);
        }
        if room.status != RoomStatus::Waiting {
            return Err(RoomErrorCode::AlreadyStarted);
        }
        if let Some(expected) = &room.password_hash {
            if expected != password_hash {
                return Err(RoomErrorCode::WrongPassword);
            }
        }

        room.members.push(player_id);
        self.by_player.insert(player_id, room_id);
        tracing::info!("Player {} joined room {}", player_id, room_id);
        Ok(())
    }

    /// Removes `player_id` from its room. Returns the room id.
    ///
    /// The host role passes to the earliest remaining member. A start
    /// countdown that loses its minimum is stopped. An empty room is closed.
    pub fn leave(&mut self, player_id: u32) -> Result<u32, RoomErrorCode> {
        let room_id = self.by_player.remove(&player_id).ok_or(RoomErrorCode::NotFound)?;
        let room = self.rooms.get_mut(&room_id).ok_or(RoomErrorCode::NotFound)?;
        room.members.retain(|&id| id != player_id);

        let Some(&earliest) = room.members.first() else {
            self.rooms.remove(&room_id);
            tracing::info!("Room {} closed: empty", room_id);
            return Ok(room_id);
        };

        if room.host == player_id {
            room.host = earliest;
            tracing::info!("Room {} host migrated to player {}", room_id, earliest);
        }
        if room.countdown_ticks.is_some() && room.player_count() < room.min_players_to_start {
            room.countdown_ticks = None;
            room.status = RoomStatus::Waiting;
            tracing::info!("Room {} start cancelled: below minimum", room_id);
        }
        Ok(room_id)
    }

    /// Host starts the countdown of `room_id`.
    pub fn start(&mut self, player_id: u32, room_id: u32) -> Result<(), RoomErrorCode> {
        let room = self.rooms.get_mut(&room_id).ok_or(RoomErrorCode::NotFound)?;
        if room.host != player_id {
            return Err(RoomErrorCode::NotHost);
        }
        if room.status != RoomStatus::Waiting {
            return Err(RoomErrorCode::AlreadyStarted);
        }
        if room.player_count() < room.min_players_to_start {
            return Err(RoomErrorCode::InvalidConfiguration);
        }

        room.status = RoomStatus::InProgress;
        room.countdown_ticks = Some(self.countdown_ticks);
        tracing::info!("Room {} starting in {} ticks", room_id, self.countdown_ticks);
        self.events.push(RoomEvent::Countdown { room_id });
        Ok(())
    }

    /// Public listing: waiting rooms only, as many as one packet carries.
    #[must_use]
    pub fn list(&self) -> RoomList {
        let rooms: Vec<RoomInfo> = self
            .rooms
            .values()
            .filter(|r| r.status == RoomStatus::Waiting)
            .take(RoomList::MAX_ROOMS_PER_PACKET)
            .map(Room::info)
            .collect();
        RoomList::new(RoomListHeader { room_count: 0 }, rooms)
    }

    /// Advances start countdowns by one tick.
    pub fn tick(&mut self) {
        let mut started = Vec::new();
        for room in self.rooms.values_mut() {
            let Some(ticks) = room.countdown_ticks else {
                continue;
            };
            let left = ticks.saturating_sub(1);
            room.countdown_ticks = Some(left);
            if left == 0 {
                started.push(room.id);
            } else if left % self.tick_rate == 0 {
                self.events.push(RoomEvent::Countdown { room_id: room.id });
            }
        }

        for room_id in started {
            let Some(room) = self.rooms.remove(&room_id) else {
                continue;
            };
            for player in &room.members {
                self.by_player.remove(player);
            }
            tracing::info!("Room {} starting with players {:?}", room_id, room.members);
            self.events.push(RoomEvent::GameStart {
                room_id,
                game_mode: room.game_mode,
                difficulty: room.difficulty,
                players: room.members,
            });
        }
    }

    /// Takes the events queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<RoomEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(max: u8, min: u8) -> ClientCreateRoom {
        ClientCreateRoom {
            player_id: 1,
            room_name: FixedString::empty(),
            password_hash: PasswordHash::empty(),
            game_mode: GameMode::Squad,
            difficulty: Difficulty::Normal,
            map_id: 2,
            max_players: max,
            min_players_to_start: min,
        }
    }

    #[test]
    fn test_create_defaults_and_clamps() {
        let mut rooms = RoomManager::new(3, 10);
        let id = rooms.create(1, &request(9, 0)).unwrap();
        assert_eq!(id, FIRST_ROOM_ID);

        let room = rooms.room(id).unwrap();
        assert_eq!(room.name, "Room #1000");
        assert_eq!(room.max_players, 4);
        assert_eq!(room.min_players_to_start, 1);
        assert_eq!(room.host, 1);
        assert!(room.password_hash.is_none());

        assert_eq!(rooms.create(1, &request(2, 2)), Err(RoomErrorCode::AlreadyInRoom));
    }

    #[test]
    fn test_join_checks_in_order() {
        let mut rooms = RoomManager::new(3, 10);
        let mut locked = request(2, 2);
        locked.password_hash = PasswordHash::new("secret");
        let id = rooms.create(1, &locked).unwrap();

        assert_eq!(rooms.join(2, 42, &PasswordHash::empty()), Err(RoomErrorCode::NotFound));
        assert_eq!(
            rooms.join(2, id, &PasswordHash::new("nope")),
            Err(RoomErrorCode::WrongPassword)
        );
        assert_eq!(rooms.join(2, id, &PasswordHash::new("secret")), Ok(()));
        assert_eq!(rooms.join(3, id, &PasswordHash::new("secret")), Err(RoomErrorCode::Full));
        assert_eq!(rooms.room(id).unwrap().info().has_password, 1);
    }

    #[test]
    fn test_host_migration_and_close() {
        let mut rooms = RoomManager::new(3, 10);
        let id = rooms.create(1, &request(4, 1)).unwrap();
        rooms.join(2, id, &PasswordHash::empty()).unwrap();
        rooms.join(3, id, &PasswordHash::empty()).unwrap();

        assert_eq!(rooms.leave(1), Ok(id));
        assert_eq!(rooms.room(id).unwrap().host, 2);
        rooms.leave(2).unwrap();
        rooms.leave(3).unwrap();
        assert!(rooms.room(id).is_none());
        assert_eq!(rooms.leave(3), Err(RoomErrorCode::NotFound));
    }

    #[test]
    fn test_start_rules_and_countdown() {
        let mut rooms = RoomManager::new(2, 10);
        let id = rooms.create(1, &request(4, 2)).unwrap();
        assert_eq!(rooms.start(1, id), Err(RoomErrorCode::InvalidConfiguration));

        rooms.join(2, id, &PasswordHash::empty()).unwrap();
        assert_eq!(rooms.start(2, id), Err(RoomErrorCode::NotHost));
        assert_eq!(rooms.start(1, id), Ok(()));
        assert_eq!(rooms.start(1, id), Err(RoomErrorCode::AlreadyStarted));
        assert_eq!(rooms.join(3, id, &PasswordHash::empty()), Err(RoomErrorCode::AlreadyStarted));
        assert!(rooms.list().rooms.is_empty());

        for _ in 0..19 {
            rooms.tick();
        }
        let events = rooms.drain_events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, RoomEvent::Countdown { .. })));

        rooms.tick();
        assert_eq!(
            rooms.drain_events(),
            vec![RoomEvent::GameStart {
                room_id: id,
                game_mode: GameMode::Squad,
                difficulty: Difficulty::Normal,
                players: vec![1, 2],
            }]
        );
        assert!(rooms.room(id).is_none());
        assert_eq!(rooms.room_of(1), None);
    }

    #[test]
    fn test_leave_below_minimum_stops_start() {
        let mut rooms = RoomManager::new(2, 10);
        let id = rooms.create(1, &request(4, 2)).unwrap();
        rooms.join(2, id, &PasswordHash::empty()).unwrap();
        rooms.start(1, id).unwrap();
        rooms.leave(2).unwrap();

        let room = rooms.room(id).unwrap();
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.countdown_ticks, None);
    }

    #[test]
    fn test_list_only_waiting() {
        let mut rooms = RoomManager::new(2, 10);
        let a = rooms.create(1, &request(4, 1)).unwrap();
        let b = rooms.create(2, &request(4, 1)).unwrap();
        rooms.start(2, b).unwrap();

        let list = rooms.list();
        assert_eq!(list.header.room_count, 1);
        assert_eq!(list.rooms[0].room_id, a);
        assert_eq!(list.rooms[0].current_players, 1);
    }
}
