//! Discrete gameplay event payloads.
//!
//! These are sent once, at the moment they happen, on the reliable channel.

use super::{DestroyReason, EntityType, GameResult, PowerupType, ProjectileType, WireRecord};
use crate::codec::FixedString;

wire_record! {
    /// ENTITY_SPAWN. 16 bytes.
    pub struct EntitySpawn {
        /// New entity id.
        pub entity_id: u32,
        /// Kind.
        pub entity_type: EntityType,
        /// Spawn X.
        pub spawn_x: f32,
        /// Spawn Y.
        pub spawn_y: f32,
        /// Kind-specific variant.
        pub subtype: u8,
        /// Starting health.
        pub health: u16,
    }
}

wire_record! {
    /// ENTITY_DESTROY. 13 bytes.
    pub struct EntityDestroy {
        /// Removed entity.
        pub entity_id: u32,
        /// Why.
        pub reason: DestroyReason,
        /// Last X.
        pub position_x: f32,
        /// Last Y.
        pub position_y: f32,
    }
}

wire_record! {
    /// ENTITY_DAMAGE. 12 bytes.
    pub struct EntityDamage {
        /// Entity hit.
        pub entity_id: u32,
        /// Entity responsible.
        pub attacker_id: u32,
        /// Damage dealt.
        pub damage: u16,
        /// Health after the hit.
        pub remaining_health: u16,
    }
}

wire_record! {
    /// PROJECTILE_SPAWN. 21 bytes.
    pub struct ProjectileSpawn {
        /// Projectile entity id.
        pub projectile_id: u32,
        /// Shooter.
        pub owner_id: u32,
        /// Kind.
        pub projectile_type: ProjectileType,
        /// Spawn X.
        pub spawn_x: f32,
        /// Spawn Y.
        pub spawn_y: f32,
        /// Velocity X, tenths of a pixel per second.
        pub velocity_x: i16,
        /// Velocity Y, tenths of a pixel per second.
        pub velocity_y: i16,
    }
}

wire_record! {
    /// EXPLOSION. 13 bytes.
    pub struct Explosion {
        /// Center X.
        pub position_x: f32,
        /// Center Y.
        pub position_y: f32,
        /// Radius in pixels.
        pub radius: f32,
        /// Visual variant.
        pub kind: u8,
    }
}

wire_record! {
    /// POWERUP_COLLECTED. 6 bytes.
    pub struct PowerupCollected {
        /// Collector.
        pub player_id: u32,
        /// Kind.
        pub powerup_type: PowerupType,
        /// Weapon level after pickup.
        pub new_weapon_level: u8,
    }
}

wire_record! {
    /// SCORE_UPDATE. 13 bytes.
    pub struct ScoreUpdate {
        /// Player.
        pub player_id: u32,
        /// Change.
        pub score_delta: i32,
        /// New total.
        pub new_total_score: u32,
        /// Combo multiplier.
        pub combo_multiplier: u8,
    }
}

wire_record! {
    /// WAVE_START. 44 bytes.
    pub struct WaveStart {
        /// 1-based wave number.
        pub wave_number: u32,
        /// Waves in the level.
        pub total_waves: u16,
        /// Scroll offset at which the wave starts.
        pub scroll_distance: f32,
        /// Enemies the wave will spawn.
        pub expected_enemies: u16,
        /// Display name.
        pub wave_name: FixedString<32>,
    }
}

wire_record! {
    /// WAVE_COMPLETE. 13 bytes.
    pub struct WaveComplete {
        /// Wave cleared.
        pub wave_number: u32,
        /// Milliseconds the wave took.
        pub completion_time: u32,
        /// Kills during the wave.
        pub enemies_killed: u16,
        /// Bonus awarded.
        pub bonus_points: u16,
        /// 1 when this was the last wave.
        pub all_waves_complete: u8,
    }
}

wire_record! {
    /// RESPAWN. 15 bytes.
    pub struct PlayerRespawn {
        /// Player.
        pub player_id: u32,
        /// Respawn X.
        pub respawn_x: f32,
        /// Respawn Y.
        pub respawn_y: f32,
        /// Invulnerability in milliseconds.
        pub invulnerability_duration: u16,
        /// Lives left.
        pub lives_remaining: u8,
    }
}

wire_record! {
    /// Per-player result line. 12 bytes.
    pub struct FinalScoreEntry {
        /// Player.
        pub player_id: u32,
        /// Score.
        pub final_score: u32,
        /// Deaths.
        pub deaths: u16,
        /// Kills.
        pub kills: u16,
    }
}

wire_record! {
    /// GAME_OVER header. 10 bytes.
    pub struct GameOverHeader {
        /// Outcome.
        pub result: GameResult,
        /// Match length in seconds.
        pub total_time: u32,
        /// Enemies killed by the team.
        pub enemies_killed: u32,
        /// Entry count.
        pub player_count: u8,
    }
}

counted_payload! {
    /// GAME_OVER - match ended.
    pub struct GameOver => GameOver {
        header: GameOverHeader,
        count: player_count as u8,
        /// One line per player.
        pub scores: Vec<FinalScoreEntry>,
    }
}

wire_record! {
    /// LEADERBOARD / GLOBAL_LEADERBOARD header. 1 byte.
    pub struct LeaderboardHeader {
        /// Entry count.
        pub entry_count: u8,
    }
}

counted_payload! {
    /// LEADERBOARD - ranking of the match just played.
    pub struct Leaderboard => Leaderboard {
        header: LeaderboardHeader,
        count: entry_count as u8,
        /// Lines sorted by score, best first.
        pub entries: Vec<FinalScoreEntry>,
    }
}

wire_record! {
    /// One line of GLOBAL_LEADERBOARD. 38 bytes.
    pub struct LeaderboardEntry {
        /// Player name at the time of the score.
        pub player_name: FixedString<32>,
        /// Score.
        pub score: u32,
        /// Furthest wave reached.
        pub wave: u16,
    }
}

counted_payload! {
    /// GLOBAL_LEADERBOARD - all-time top scores.
    pub struct GlobalLeaderboard => GlobalLeaderboard {
        header: LeaderboardHeader,
        count: entry_count as u8,
        /// Lines sorted by score, best first.
        pub entries: Vec<LeaderboardEntry>,
    }
}

fixed_payload! {
    EntitySpawn => EntitySpawn,
    EntityDestroy => EntityDestroy,
    EntityDamage => EntityDamage,
    ProjectileSpawn => ProjectileSpawn,
    Explosion => Explosion,
    PowerupCollected => PowerupCollected,
    ScoreUpdate => ScoreUpdate,
    WaveStart => WaveStart,
    WaveComplete => WaveComplete,
    PlayerRespawn => Respawn,
}

const _: () = assert!(<EntitySpawn as WireRecord>::SIZE == 16);
const _: () = assert!(<EntityDestroy as WireRecord>::SIZE == 13);
const _: () = assert!(<EntityDamage as WireRecord>::SIZE == 12);
const _: () = assert!(<ProjectileSpawn as WireRecord>::SIZE == 21);
const _: () = assert!(<Explosion as WireRecord>::SIZE == 13);
const _: () = assert!(<PowerupCollected as WireRecord>::SIZE == 6);
const _: () = assert!(<ScoreUpdate as WireRecord>::SIZE == 13);
const _: () = assert!(<WaveStart as WireRecord>::SIZE == 44);
const _: () = assert!(<WaveComplete as WireRecord>::SIZE == 13);
const _: () = assert!(<PlayerRespawn as WireRecord>::SIZE == 15);
const _: () = assert!(<FinalScoreEntry as WireRecord>::SIZE == 12);
const _: () = assert!(<GameOverHeader as WireRecord>::SIZE == 10);
const _: () = assert!(<LeaderboardEntry as WireRecord>::SIZE == 38);
