//! # Game Sessions
//!
//! One authoritative match per session: a side-scrolling playfield, the
//! players' ships, seeded enemy waves and everything they shoot.
//!
//! ## Design
//!
//! ```text
//! ClientInput ──▶ apply_input (max-sequence ack) ──┐
//!                                                  ▼
//!   tick: players ─▶ waves ─▶ movement ─▶ hits ─▶ powerups ─▶ bounds ─▶ end check
//!                                                  │
//!                       SessionEvent (sent once) ◀─┴─▶ snapshot lines (every cadence)
//! ```
//!
//! - Spawns, destroys and hits are discrete events, never inferred from
//!   snapshots
//! - Each ship's snapshot line echoes the highest input sequence applied;
//!   stale and duplicate inputs are ignored
//! - Enemy placement draws from an RNG seeded with the level seed, so a
//!   session replays identically from its seed and inputs
//! - A finished session queues GAME_OVER and LEADERBOARD and goes inactive;
//!   the manager removes it on the following tick

mod entity;
mod manager;
mod snapshot;

pub use entity::{Entity, EntityRegistry, EntityTable};
pub use manager::{FinishedSession, GameSessionManager, SessionPacket, SessionSettings};
pub use snapshot::SnapshotSync;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rtype_protocol::{
    entity_flags, input_flags, ClientInput, DestroyReason, Difficulty, DisconnectReason, EntityDamage,
    EntityDestroy, EntitySpawn, EntityState, EntityType, Explosion, FinalScoreEntry, FixedString, GameMode,
    GameOver, GameOverHeader, GameResult, Leaderboard, LeaderboardHeader, PacketType, Payload,
    PlayerRespawn, PlayerSpawnData, PowerupCollected, PowerupType, ProjectileSpawn, ProjectileType,
    ScoreUpdate, WaveComplete, WaveStart, MAX_SNAPSHOT_ENTITIES,
};

use crate::error::ProtocolStateError;

/// Playfield width in pixels.
pub const PLAYFIELD_WIDTH: f32 = 1920.0;
/// Playfield height in pixels.
pub const PLAYFIELD_HEIGHT: f32 = 1080.0;
/// World scroll speed in pixels per second.
pub const SCROLL_SPEED: f32 = 50.0;
/// Ship speed in pixels per second.
pub const PLAYER_SPEED: f32 = 200.0;
/// Ship hit points.
pub const PLAYER_HEALTH: u16 = 1000;
/// Lives per player.
pub const PLAYER_LIVES: u8 = 3;
/// Waves per match.
pub const TOTAL_WAVES: u32 = 5;

const SPAWN_X: f32 = 100.0;
const SPAWN_Y: f32 = 300.0;
const SPAWN_SPACING: f32 = 80.0;
const PLAYER_SHOT_SPEED: f32 = 600.0;
const PLAYER_SHOT_DAMAGE: u16 = 50;
const ENEMY_SHOT_SPEED: f32 = 300.0;
const ENEMY_SHOT_DAMAGE: u16 = 100;
const MAX_WEAPON_LEVEL: u8 = 3;
const POWERUP_DROP_CHANCE: f64 = 0.1;
const SCORE_POWERUP_POINTS: u32 = 500;
const RESPAWN_INVULNERABILITY_MS: u16 = 2000;

macro_rules! session_events {
    ($( $(#[$doc:meta])* $variant:ident($payload:ty) ),+ $(,)?) => {
        /// A discrete event a session announces once to its players.
        #[derive(Clone, Debug, PartialEq)]
        pub enum SessionEvent {
            $( $(#[$doc])* $variant($payload), )+
        }

        impl SessionEvent {
            /// Packet type the event travels under.
            #[must_use]
            pub const fn packet_type(&self) -> PacketType {
                match self {
                    $( Self::$variant(_) => <$payload as Payload>::PACKET_TYPE, )+
                }
            }

            /// Encoded payload.
            #[must_use]
            pub fn to_bytes(&self) -> Vec<u8> {
                match self {
                    $( Self::$variant(payload) => payload.to_bytes(), )+
                }
            }
        }
    };
}

session_events! {
    /// ENTITY_SPAWN.
    EntitySpawn(EntitySpawn),
    /// ENTITY_DESTROY.
    EntityDestroy(EntityDestroy),
    /// ENTITY_DAMAGE.
    EntityDamage(EntityDamage),
    /// PROJECTILE_SPAWN.
    ProjectileSpawn(ProjectileSpawn),
    /// EXPLOSION.
    Explosion(Explosion),
    /// POWERUP_COLLECTED.
    PowerupCollected(PowerupCollected),
    /// SCORE_UPDATE.
    ScoreUpdate(ScoreUpdate),
    /// WAVE_START.
    WaveStart(WaveStart),
    /// WAVE_COMPLETE.
    WaveComplete(WaveComplete),
    /// RESPAWN.
    Respawn(PlayerRespawn),
    /// GAME_OVER.
    GameOver(GameOver),
    /// LEADERBOARD.
    Leaderboard(Leaderboard),
}

/// Timing a session runs with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionRules {
    /// Server ticks per second.
    pub tick_rate: u32,
    /// Ticks before the match ends in a timeout.
    pub time_limit_ticks: u64,
}

/// Per-player match state.
#[derive(Clone, Debug)]
struct PlayerSlot {
    player_id: u32,
    entity_id: Option<u32>,
    connected: bool,
    lives: u8,
    score: u32,
    kills: u16,
    deaths: u16,
    last_ack: Option<u32>,
    input_flags: u16,
    shot_cooldown: u32,
    invulnerable_ticks: u32,
    weapon_level: u8,
}

#[derive(Clone, Copy, Debug, Default)]
struct WaveState {
    number: u32,
    in_progress: bool,
    remaining_spawns: u16,
    spawn_timer: u32,
    pause_ticks: u32,
    kills: u16,
    started_tick: u32,
}

/// Health, speed, contact damage and score of an enemy kind.
const fn enemy_profile(kind: EntityType) -> (u16, f32, u16, u32) {
    match kind {
        EntityType::EnemyFast => (60, 240.0, 150, 150),
        EntityType::EnemyTank => (300, 70.0, 300, 300),
        EntityType::EnemyElite => (200, 140.0, 250, 250),
        EntityType::EnemyBoss => (2000, 60.0, 500, 5000),
        _ => (100, 120.0, 200, 100),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_health(base: u16, difficulty: Difficulty) -> u16 {
    (f32::from(base) * difficulty.health_multiplier())
        .round()
        .clamp(1.0, f32::from(u16::MAX)) as u16
}

const fn snapshot_priority(kind: EntityType) -> Option<u8> {
    if kind.is_player() {
        Some(0)
    } else if kind.is_projectile() {
        Some(1)
    } else if kind.is_enemy() {
        Some(2)
    } else if kind.is_powerup() {
        Some(3)
    } else {
        None
    }
}

const fn powerup_kind(kind: EntityType) -> Option<PowerupType> {
    match kind {
        EntityType::PowerupWeapon => Some(PowerupType::Weapon),
        EntityType::PowerupShield => Some(PowerupType::Shield),
        EntityType::PowerupScore => Some(PowerupType::Score),
        _ => None,
    }
}

/// ENTITY_DESTROY reason for the ship of a player who left.
///
/// A player who quits flies off the field; a lost or broken connection
/// times the ship out.
const fn departure_reason(reason: DisconnectReason) -> DestroyReason {
    match reason {
        DisconnectReason::UserQuit => DestroyReason::OutOfBounds,
        DisconnectReason::Timeout | DisconnectReason::Error => DestroyReason::Timeout,
    }
}

fn out_of_bounds(entity: &Entity) -> bool {
    entity.x < -100.0
        || entity.x > PLAYFIELD_WIDTH + 200.0
        || entity.y < -100.0
        || entity.y > PLAYFIELD_HEIGHT + 100.0
}

#[allow(clippy::cast_precision_loss)]
fn spawn_point(index: usize) -> (f32, f32) {
    (SPAWN_X, SPAWN_Y + SPAWN_SPACING * index as f32)
}

/// One running match.
#[derive(Debug)]
pub struct GameSession<R: EntityRegistry = EntityTable> {
    id: u32,
    game_mode: GameMode,
    difficulty: Difficulty,
    level_seed: u32,
    rng: StdRng,
    registry: R,
    players: Vec<PlayerSlot>,
    rules: SessionRules,
    tick: u32,
    scroll_x: f32,
    wave: WaveState,
    enemies_killed: u32,
    active: bool,
    result: Option<GameResult>,
    events: Vec<SessionEvent>,
}

impl GameSession<EntityTable> {
    /// Creates a session over a fresh [`EntityTable`].
    #[must_use]
    pub fn new(
        id: u32,
        game_mode: GameMode,
        difficulty: Difficulty,
        level_seed: u32,
        players: &[u32],
        rules: SessionRules,
    ) -> Self {
        Self::with_registry(EntityTable::new(), id, game_mode, difficulty, level_seed, players, rules)
    }
}

impl<R: EntityRegistry> GameSession<R> {
    /// Creates a session simulating against `registry`, spawning one ship
    /// per player.
    #[must_use]
    pub fn with_registry(
        registry: R,
        id: u32,
        game_mode: GameMode,
        difficulty: Difficulty,
        level_seed: u32,
        players: &[u32],
        rules: SessionRules,
    ) -> Self {
        let mut session = Self {
            id,
            game_mode,
            difficulty,
            level_seed,
            rng: StdRng::seed_from_u64(u64::from(level_seed)),
            registry,
            players: Vec::with_capacity(players.len()),
            rules: SessionRules {
                tick_rate: rules.tick_rate.max(1),
                ..rules
            },
            tick: 0,
            scroll_x: 0.0,
            wave: WaveState::default(),
            enemies_killed: 0,
            active: true,
            result: None,
            events: Vec::new(),
        };
        session.wave.pause_ticks = session.ticks(1000);

        for (index, &player_id) in players.iter().enumerate() {
            let (x, y) = spawn_point(index);
            let ship = Entity::new(EntityType::Player, x, y, PLAYER_HEALTH).owned_by(player_id);
            let entity_id = session.registry.spawn(ship);
            session.events.push(SessionEvent::EntitySpawn(EntitySpawn {
                entity_id,
                entity_type: EntityType::Player,
                spawn_x: x,
                spawn_y: y,
                subtype: u8::try_from(index).unwrap_or(u8::MAX),
                health: PLAYER_HEALTH,
            }));
            session.players.push(PlayerSlot {
                player_id,
                entity_id: Some(entity_id),
                connected: true,
                lives: PLAYER_LIVES,
                score: 0,
                kills: 0,
                deaths: 0,
                last_ack: None,
                input_flags: 0,
                shot_cooldown: 0,
                invulnerable_ticks: 0,
                weapon_level: 1,
            });
        }

        tracing::info!(
            "Session {} started: {:?} {:?}, seed {:#010x}, players {:?}",
            id,
            game_mode,
            difficulty,
            level_seed,
            players
        );
        session
    }

    /// Session id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Mode.
    #[inline]
    #[must_use]
    pub const fn game_mode(&self) -> GameMode {
        self.game_mode
    }

    /// Level seed.
    #[inline]
    #[must_use]
    pub const fn level_seed(&self) -> u32 {
        self.level_seed
    }

    /// Ticks simulated.
    #[inline]
    #[must_use]
    pub const fn server_tick(&self) -> u32 {
        self.tick
    }

    /// World scroll offset in pixels.
    #[inline]
    #[must_use]
    pub const fn scroll_x(&self) -> f32 {
        self.scroll_x
    }

    /// Current wave, zero before the first.
    #[inline]
    #[must_use]
    pub const fn wave_number(&self) -> u32 {
        self.wave.number
    }

    /// False once the match ended or everyone left.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Outcome, once decided.
    #[inline]
    #[must_use]
    pub const fn result(&self) -> Option<GameResult> {
        self.result
    }

    /// Entity store.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &R {
        &self.registry
    }

    /// True if `player_id` is still playing here.
    #[must_use]
    pub fn contains(&self, player_id: u32) -> bool {
        self.players.iter().any(|p| p.player_id == player_id && p.connected)
    }

    /// Connected players, in join order.
    #[must_use]
    pub fn recipients(&self) -> Vec<u32> {
        self.players
            .iter()
            .filter(|p| p.connected)
            .map(|p| p.player_id)
            .collect()
    }

    /// Ship spawn positions announced in GAME_START.
    #[must_use]
    pub fn spawn_data(&self) -> Vec<PlayerSpawnData> {
        self.players
            .iter()
            .enumerate()
            .map(|(index, p)| {
                let (spawn_x, spawn_y) = spawn_point(index);
                PlayerSpawnData {
                    player_id: p.player_id,
                    spawn_x,
                    spawn_y,
                }
            })
            .collect()
    }

    /// Highest input sequence applied for `player_id`.
    #[must_use]
    pub fn last_ack(&self, player_id: u32) -> Option<u32> {
        self.players
            .iter()
            .find(|p| p.player_id == player_id)
            .and_then(|p| p.last_ack)
    }

    /// Records an input. Returns false for a stale or duplicate sequence,
    /// which leaves the session untouched.
    pub fn apply_input(&mut self, player_id: u32, input: &ClientInput) -> Result<bool, ProtocolStateError> {
        let session_id = self.id;
        let slot = self
            .players
            .iter_mut()
            .find(|p| p.player_id == player_id && p.connected)
            .ok_or(ProtocolStateError::NotInSession { player_id, session_id })?;

        if slot.last_ack.is_some_and(|acked| input.sequence_number <= acked) {
            return Ok(false);
        }
        slot.last_ack = Some(input.sequence_number);
        slot.input_flags = input.input_flags;
        Ok(true)
    }

    /// Removes a player who left or disconnected.
    ///
    /// Returns false if the player was not in this session. The session goes
    /// inactive once nobody is left.
    pub fn remove_player(&mut self, player_id: u32, reason: DisconnectReason) -> bool {
        let Some(slot) = self
            .players
            .iter_mut()
            .find(|p| p.player_id == player_id && p.connected)
        else {
            return false;
        };
        slot.connected = false;
        let ship = slot.entity_id.take();

        if let Some(ship) = ship {
            self.destroy(ship, departure_reason(reason));
        }
        tracing::info!("Player {} left session {}: {:?}", player_id, self.id, reason);

        if self.players.iter().all(|p| !p.connected) {
            self.active = false;
            tracing::info!("Session {} abandoned", self.id);
        }
        true
    }

    /// Snapshot lines in priority order: ships, projectiles, enemies,
    /// powerups. Walls are left out; at most one packet's worth.
    #[must_use]
    pub fn snapshot_lines(&self) -> Vec<EntityState> {
        let mut lines: Vec<(u8, EntityState)> = self
            .registry
            .ids()
            .into_iter()
            .filter_map(|id| self.registry.get(id))
            .filter_map(|e| {
                let priority = snapshot_priority(e.kind)?;
                let ack = if e.kind.is_player() {
                    e.owner.and_then(|owner| self.last_ack(owner)).unwrap_or(0)
                } else {
                    0
                };
                Some((priority, e.to_state(ack)))
            })
            .collect();
        lines.sort_by_key(|(priority, line)| (*priority, line.entity_id));
        lines
            .into_iter()
            .take(MAX_SNAPSHOT_ENTITIES)
            .map(|(_, line)| line)
            .collect()
    }

    /// Final score table in join order.
    #[must_use]
    pub fn final_scores(&self) -> Vec<FinalScoreEntry> {
        self.players
            .iter()
            .map(|p| FinalScoreEntry {
                player_id: p.player_id,
                final_score: p.score,
                deaths: p.deaths,
                kills: p.kills,
            })
            .collect()
    }

    /// Takes the events queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Advances the simulation by one server tick.
    pub fn tick(&mut self) {
        if !self.active {
            return;
        }
        self.tick = self.tick.wrapping_add(1);
        self.scroll_x += SCROLL_SPEED * self.dt();

        self.update_players();
        self.update_waves();
        self.move_world();
        self.resolve_hits();
        self.collect_powerups();
        self.cull_out_of_bounds();
        self.check_wave_complete();
        self.check_end();
    }

    #[allow(clippy::cast_precision_loss)]
    fn dt(&self) -> f32 {
        1.0 / self.rules.tick_rate as f32
    }

    /// Milliseconds expressed in ticks, at least one.
    fn ticks(&self, millis: u32) -> u32 {
        (self.rules.tick_rate * millis / 1000).max(1)
    }

    fn elapsed_seconds(&self) -> u32 {
        self.tick / self.rules.tick_rate
    }

    fn update_players(&mut self) {
        let dt = self.dt();
        let cooldown = self.ticks(160);
        let mut shots = Vec::new();

        for slot in &mut self.players {
            let Some(ship) = slot.entity_id.and_then(|id| self.registry.get_mut(id)) else {
                continue;
            };
            let flags = slot.input_flags;
            let axis = |negative: u16, positive: u16| {
                f32::from(u8::from(flags & positive != 0)) - f32::from(u8::from(flags & negative != 0))
            };
            ship.vx = axis(input_flags::LEFT, input_flags::RIGHT) * PLAYER_SPEED;
            ship.vy = axis(input_flags::UP, input_flags::DOWN) * PLAYER_SPEED;
            let (hw, hh) = ship.half_extents();
            ship.x = (ship.x + ship.vx * dt).clamp(hw, PLAYFIELD_WIDTH - hw);
            ship.y = (ship.y + ship.vy * dt).clamp(hh, PLAYFIELD_HEIGHT - hh);

            if slot.invulnerable_ticks > 0 {
                slot.invulnerable_ticks -= 1;
                if slot.invulnerable_ticks == 0 {
                    ship.flags &= !(entity_flags::INVULNERABLE | entity_flags::DAMAGED);
                }
            }
            if flags & input_flags::CHARGE != 0 {
                ship.flags |= entity_flags::CHARGING;
            } else {
                ship.flags &= !entity_flags::CHARGING;
            }

            slot.shot_cooldown = slot.shot_cooldown.saturating_sub(1);
            if flags & input_flags::SHOOT != 0 && slot.shot_cooldown == 0 {
                slot.shot_cooldown = cooldown;
                shots.push((slot.player_id, ship.id, ship.x + hw, ship.y, slot.weapon_level));
            }
        }

        for (player_id, ship_id, x, y, level) in shots {
            let spread: &[f32] = match level {
                0 | 1 => &[0.0],
                2 => &[-40.0, 40.0],
                _ => &[-80.0, 0.0, 80.0],
            };
            for &vy in spread {
                let shot = Entity::new(EntityType::ProjectilePlayer, x, y, 1)
                    .moving(PLAYER_SHOT_SPEED, vy)
                    .owned_by(player_id)
                    .dealing(PLAYER_SHOT_DAMAGE);
                self.spawn_projectile(shot, ship_id, ProjectileType::Bullet);
            }
        }
    }

    fn spawn_projectile(&mut self, shot: Entity, owner_entity: u32, projectile_type: ProjectileType) {
        let projectile_id = self.registry.spawn(shot);
        self.events.push(SessionEvent::ProjectileSpawn(ProjectileSpawn {
            projectile_id,
            owner_id: owner_entity,
            projectile_type,
            spawn_x: shot.x,
            spawn_y: shot.y,
            velocity_x: EntityState::quantize_velocity(shot.vx),
            velocity_y: EntityState::quantize_velocity(shot.vy),
        }));
    }

    fn update_waves(&mut self) {
        if !self.wave.in_progress {
            if self.wave.number >= TOTAL_WAVES {
                return;
            }
            if self.wave.pause_ticks > 0 {
                self.wave.pause_ticks -= 1;
                return;
            }
            self.start_wave();
        }

        if self.wave.remaining_spawns == 0 {
            return;
        }
        if self.wave.spawn_timer > 0 {
            self.wave.spawn_timer -= 1;
            return;
        }
        self.wave.spawn_timer = self.ticks(750);
        self.wave.remaining_spawns -= 1;
        let boss = self.wave.number == TOTAL_WAVES && self.wave.remaining_spawns == 0;
        self.spawn_enemy(boss);
    }

    fn start_wave(&mut self) {
        let number = self.wave.number + 1;
        let expected = u16::try_from(3 + 2 * number).unwrap_or(u16::MAX);
        self.wave = WaveState {
            number,
            in_progress: true,
            remaining_spawns: expected,
            spawn_timer: 0,
            pause_ticks: 0,
            kills: 0,
            started_tick: self.tick,
        };
        let name = if number == TOTAL_WAVES {
            "Final Wave".to_string()
        } else {
            format!("Wave {number}")
        };
        self.events.push(SessionEvent::WaveStart(WaveStart {
            wave_number: number,
            total_waves: u16::try_from(TOTAL_WAVES).unwrap_or(u16::MAX),
            scroll_distance: self.scroll_x,
            expected_enemies: expected,
            wave_name: FixedString::new(&name),
        }));
        tracing::debug!("Session {} wave {} started", self.id, number);
    }

    fn spawn_enemy(&mut self, boss: bool) {
        let kind = if boss {
            EntityType::EnemyBoss
        } else {
            let pool: &[EntityType] = match self.wave.number {
                1 => &[EntityType::EnemyBasic],
                2 => &[EntityType::EnemyBasic, EntityType::EnemyFast],
                3 => &[EntityType::EnemyBasic, EntityType::EnemyFast, EntityType::EnemyTank],
                _ => &[
                    EntityType::EnemyBasic,
                    EntityType::EnemyFast,
                    EntityType::EnemyTank,
                    EntityType::EnemyElite,
                ],
            };
            pool[self.rng.gen_range(0..pool.len())]
        };

        let (base_health, speed, damage, _) = enemy_profile(kind);
        let health = scaled_health(base_health, self.difficulty);
        let x = PLAYFIELD_WIDTH + 40.0;
        let y = if boss {
            PLAYFIELD_HEIGHT / 2.0
        } else {
            self.rng.gen_range(80.0..PLAYFIELD_HEIGHT - 80.0)
        };

        let enemy = Entity::new(kind, x, y, health).moving(-speed, 0.0).dealing(damage);
        let entity_id = self.registry.spawn(enemy);
        self.events.push(SessionEvent::EntitySpawn(EntitySpawn {
            entity_id,
            entity_type: kind,
            spawn_x: x,
            spawn_y: y,
            subtype: u8::try_from(self.wave.number).unwrap_or(u8::MAX),
            health,
        }));
    }

    fn move_world(&mut self) {
        let dt = self.dt();
        let fire_interval = self.ticks(2000);
        let mut enemy_shots = Vec::new();

        for id in self.registry.ids() {
            let Some(entity) = self.registry.get_mut(id) else {
                continue;
            };
            if entity.kind.is_player() {
                continue;
            }
            entity.x += entity.vx * dt;
            entity.y += entity.vy * dt;

            let shooter = matches!(entity.kind, EntityType::EnemyElite | EntityType::EnemyBoss);
            if shooter && self.tick.wrapping_add(id) % fire_interval == 0 {
                enemy_shots.push((id, entity.x - entity.half_extents().0, entity.y));
            }
        }

        for (owner, x, y) in enemy_shots {
            let shot = Entity::new(EntityType::ProjectileEnemy, x, y, 1)
                .moving(-ENEMY_SHOT_SPEED, 0.0)
                .dealing(ENEMY_SHOT_DAMAGE);
            self.spawn_projectile(shot, owner, ProjectileType::Bullet);
        }
    }

    fn entities_where(&self, keep: impl Fn(&Entity) -> bool) -> Vec<Entity> {
        self.registry
            .ids()
            .into_iter()
            .filter_map(|id| self.registry.get(id))
            .filter(|&e| keep(e))
            .copied()
            .collect()
    }

    fn ships(&self) -> Vec<(usize, u32)> {
        self.players
            .iter()
            .enumerate()
            .filter_map(|(index, p)| p.entity_id.map(|id| (index, id)))
            .collect()
    }

    fn resolve_hits(&mut self) {
        let shots = self.entities_where(|e| e.kind == EntityType::ProjectilePlayer);
        for shot in shots {
            let target = self
                .entities_where(|e| e.kind.is_enemy())
                .into_iter()
                .find(|enemy| enemy.overlaps(&shot));
            if let Some(target) = target {
                self.destroy(shot.id, DestroyReason::Killed);
                self.damage_enemy(target.id, shot.damage, shot.owner);
            }
        }

        for (index, ship_id) in self.ships() {
            if self.players[index].invulnerable_ticks > 0 {
                continue;
            }
            let Some(ship) = self.registry.get(ship_id).copied() else {
                continue;
            };
            let hit = self
                .entities_where(|e| e.kind == EntityType::ProjectileEnemy || e.kind.is_enemy())
                .into_iter()
                .find(|e| e.overlaps(&ship));
            let Some(hit) = hit else {
                continue;
            };

            if hit.kind == EntityType::ProjectileEnemy {
                self.destroy(hit.id, DestroyReason::Killed);
            } else if hit.kind != EntityType::EnemyBoss {
                self.destroy(hit.id, DestroyReason::Killed);
                self.explode(hit.x, hit.y, 32.0);
            }
            self.damage_player(index, hit.damage, hit.id);
        }
    }

    fn damage_enemy(&mut self, target: u32, damage: u16, attacker: Option<u32>) {
        let Some(enemy) = self.registry.get_mut(target) else {
            return;
        };
        enemy.health = enemy.health.saturating_sub(damage);
        let enemy = *enemy;
        self.events.push(SessionEvent::EntityDamage(EntityDamage {
            entity_id: target,
            attacker_id: attacker.unwrap_or(0),
            damage,
            remaining_health: enemy.health,
        }));
        if enemy.health > 0 {
            return;
        }

        self.destroy(target, DestroyReason::Killed);
        let radius = if enemy.kind == EntityType::EnemyBoss { 128.0 } else { 32.0 };
        self.explode(enemy.x, enemy.y, radius);
        self.enemies_killed += 1;
        self.wave.kills = self.wave.kills.saturating_add(1);
        if let Some(player_id) = attacker {
            self.award_kill(player_id, enemy.kind);
        }

        if self.rng.gen_bool(POWERUP_DROP_CHANCE) {
            let kinds = [EntityType::PowerupWeapon, EntityType::PowerupShield, EntityType::PowerupScore];
            let kind = kinds[self.rng.gen_range(0..kinds.len())];
            let powerup = Entity::new(kind, enemy.x, enemy.y, 1).moving(-SCROLL_SPEED, 0.0);
            let entity_id = self.registry.spawn(powerup);
            self.events.push(SessionEvent::EntitySpawn(EntitySpawn {
                entity_id,
                entity_type: kind,
                spawn_x: enemy.x,
                spawn_y: enemy.y,
                subtype: 0,
                health: 1,
            }));
        }
    }

    fn award_kill(&mut self, player_id: u32, kind: EntityType) {
        let Some(slot) = self.players.iter_mut().find(|p| p.player_id == player_id) else {
            return;
        };
        slot.kills = slot.kills.saturating_add(1);
        let (_, _, _, points) = enemy_profile(kind);
        self.add_score(player_id, points);
    }

    fn add_score(&mut self, player_id: u32, points: u32) {
        let Some(slot) = self.players.iter_mut().find(|p| p.player_id == player_id) else {
            return;
        };
        slot.score = slot.score.saturating_add(points);
        self.events.push(SessionEvent::ScoreUpdate(ScoreUpdate {
            player_id,
            score_delta: i32::try_from(points).unwrap_or(i32::MAX),
            new_total_score: slot.score,
            combo_multiplier: 1,
        }));
    }

    fn damage_player(&mut self, index: usize, damage: u16, attacker: u32) {
        let grace = self.ticks(500);
        let respawn_grace = self.ticks(u32::from(RESPAWN_INVULNERABILITY_MS));
        let slot = &mut self.players[index];
        let Some(ship) = slot.entity_id.and_then(|id| self.registry.get_mut(id)) else {
            return;
        };
        ship.health = ship.health.saturating_sub(damage);
        self.events.push(SessionEvent::EntityDamage(EntityDamage {
            entity_id: ship.id,
            attacker_id: attacker,
            damage,
            remaining_health: ship.health,
        }));

        if ship.health > 0 {
            slot.invulnerable_ticks = grace;
            ship.flags |= entity_flags::INVULNERABLE | entity_flags::DAMAGED;
            return;
        }

        slot.deaths = slot.deaths.saturating_add(1);
        slot.lives = slot.lives.saturating_sub(1);
        let (x, y, ship_id) = (ship.x, ship.y, ship.id);

        if slot.lives > 0 {
            let (spawn_x, spawn_y) = spawn_point(index);
            ship.x = spawn_x;
            ship.y = spawn_y;
            ship.health = PLAYER_HEALTH;
            ship.flags = entity_flags::INVULNERABLE;
            slot.invulnerable_ticks = respawn_grace;
            let respawn = PlayerRespawn {
                player_id: slot.player_id,
                respawn_x: spawn_x,
                respawn_y: spawn_y,
                invulnerability_duration: RESPAWN_INVULNERABILITY_MS,
                lives_remaining: slot.lives,
            };
            self.explode(x, y, 48.0);
            self.events.push(SessionEvent::Respawn(respawn));
        } else {
            slot.entity_id = None;
            tracing::info!("Player {} is out in session {}", slot.player_id, self.id);
            self.explode(x, y, 48.0);
            self.destroy(ship_id, DestroyReason::Killed);
        }
    }

    fn collect_powerups(&mut self) {
        let shield = self.ticks(3000);
        for (index, ship_id) in self.ships() {
            let Some(ship) = self.registry.get(ship_id).copied() else {
                continue;
            };
            let pickup = self
                .entities_where(|e| e.kind.is_powerup())
                .into_iter()
                .find(|e| e.overlaps(&ship));
            let Some(pickup) = pickup else {
                continue;
            };
            let Some(powerup_type) = powerup_kind(pickup.kind) else {
                continue;
            };
            self.destroy(pickup.id, DestroyReason::Collected);

            let slot = &mut self.players[index];
            match powerup_type {
                PowerupType::Weapon => slot.weapon_level = (slot.weapon_level + 1).min(MAX_WEAPON_LEVEL),
                PowerupType::Shield => {
                    slot.invulnerable_ticks = shield;
                    if let Some(ship) = self.registry.get_mut(ship_id) {
                        ship.flags |= entity_flags::INVULNERABLE;
                    }
                }
                _ => {}
            }
            let (player_id, weapon_level) = (slot.player_id, slot.weapon_level);
            self.events.push(SessionEvent::PowerupCollected(PowerupCollected {
                player_id,
                powerup_type,
                new_weapon_level: weapon_level,
            }));
            if powerup_type == PowerupType::Score {
                self.add_score(player_id, SCORE_POWERUP_POINTS);
            }
        }
    }

    fn cull_out_of_bounds(&mut self) {
        let gone = self.entities_where(|e| !e.kind.is_player() && out_of_bounds(e));
        for entity in gone {
            self.destroy(entity.id, DestroyReason::OutOfBounds);
        }
    }

    fn check_wave_complete(&mut self) {
        if !self.wave.in_progress || self.wave.remaining_spawns > 0 {
            return;
        }
        if !self.entities_where(|e| e.kind.is_enemy()).is_empty() {
            return;
        }

        let all_done = self.wave.number >= TOTAL_WAVES;
        self.wave.in_progress = false;
        self.wave.pause_ticks = self.ticks(2000);
        self.events.push(SessionEvent::WaveComplete(WaveComplete {
            wave_number: self.wave.number,
            completion_time: self.tick.wrapping_sub(self.wave.started_tick) / self.rules.tick_rate,
            enemies_killed: self.wave.kills,
            bonus_points: self.wave.kills.saturating_mul(50),
            all_waves_complete: u8::from(all_done),
        }));
        tracing::debug!("Session {} wave {} complete", self.id, self.wave.number);

        if all_done {
            self.finish(GameResult::Victory);
        }
    }

    fn check_end(&mut self) {
        if !self.active {
            return;
        }
        if self
            .players
            .iter()
            .filter(|p| p.connected)
            .all(|p| p.entity_id.is_none())
        {
            self.finish(GameResult::Defeat);
        } else if u64::from(self.tick) >= self.rules.time_limit_ticks {
            self.finish(GameResult::Timeout);
        }
    }

    fn finish(&mut self, result: GameResult) {
        self.active = false;
        self.result = Some(result);

        let scores = self.final_scores();
        self.events.push(SessionEvent::GameOver(GameOver::new(
            GameOverHeader {
                result,
                total_time: self.elapsed_seconds(),
                enemies_killed: self.enemies_killed,
                player_count: 0,
            },
            scores.clone(),
        )));

        let mut ranked = scores;
        ranked.sort_by(|a, b| b.final_score.cmp(&a.final_score));
        self.events.push(SessionEvent::Leaderboard(Leaderboard::new(
            LeaderboardHeader { entry_count: 0 },
            ranked,
        )));
        tracing::info!(
            "Session {} over: {:?} after {}s, {} enemies killed",
            self.id,
            result,
            self.elapsed_seconds(),
            self.enemies_killed
        );
    }

    fn destroy(&mut self, id: u32, reason: DestroyReason) {
        if let Some(entity) = self.registry.destroy(id) {
            self.events.push(SessionEvent::EntityDestroy(EntityDestroy {
                entity_id: id,
                reason,
                position_x: entity.x,
                position_y: entity.y,
            }));
        }
    }

    fn explode(&mut self, x: f32, y: f32, radius: f32) {
        self.events.push(SessionEvent::Explosion(Explosion {
            position_x: x,
            position_y: y,
            radius,
            kind: 0,
        }));
    }
}
