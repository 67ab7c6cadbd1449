//! One-byte enumerations and bitfields carried inside payloads.

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vdoc:meta])* $variant:ident = $value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $( $(#[$vdoc])* $variant = $value, )+
        }

        impl $name {
            /// Raw wire value.
            #[inline]
            #[must_use]
            pub const fn as_u8(self) -> u8 {
                self as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, u8> {
                match value {
                    $( $value => Ok(Self::$variant), )+
                    other => Err(other),
                }
            }
        }

        impl $crate::payload::WireField for $name {
            const WIDTH: usize = 1;

            #[inline]
            fn put(&self, writer: &mut $crate::codec::WireWriter) {
                writer.write_u8(self.as_u8());
            }

            #[inline]
            fn get(
                reader: &mut $crate::codec::WireReader<'_>,
                name: &'static str,
            ) -> $crate::error::ProtocolResult<Self> {
                reader.read_enum(name)
            }
        }
    };
}

wire_enum! {
    /// Quick-match mode; determines the player count needed to start.
    pub enum GameMode {
        /// Two players.
        Duo = 1,
        /// Three players.
        Trio = 2,
        /// Four players.
        Squad = 3,
    }
}

impl GameMode {
    /// Players required before a quick-match lobby counts down.
    #[inline]
    #[must_use]
    pub const fn required_players(self) -> u8 {
        match self {
            Self::Duo => 2,
            Self::Trio => 3,
            Self::Squad => 4,
        }
    }
}

wire_enum! {
    /// Match difficulty.
    pub enum Difficulty {
        /// Easy.
        Easy = 1,
        /// Normal.
        Normal = 2,
        /// Hard.
        Hard = 3,
    }
}

impl Difficulty {
    /// Enemy health multiplier.
    #[must_use]
    pub const fn health_multiplier(self) -> f32 {
        match self {
            Self::Easy => 0.7,
            Self::Normal => 1.0,
            Self::Hard => 1.5,
        }
    }
}

wire_enum! {
    /// Why a client left.
    pub enum DisconnectReason {
        /// Player quit.
        UserQuit = 1,
        /// Connection timed out.
        Timeout = 2,
        /// Client-side error.
        Error = 3,
    }
}

wire_enum! {
    /// Why a connection was refused.
    pub enum RejectReason {
        /// No free client slots.
        ServerFull = 1,
        /// Client and server protocol versions differ.
        VersionMismatch = 2,
        /// Player is banned.
        Banned = 3,
        /// Server is in maintenance.
        Maintenance = 4,
    }
}

wire_enum! {
    /// Why a lobby countdown stopped.
    pub enum CountdownCancelReason {
        /// Membership dropped below the required count.
        PlayerLeft = 1,
        /// Server-side failure.
        ServerError = 2,
    }
}

wire_enum! {
    /// Custom room lifecycle.
    pub enum RoomStatus {
        /// Accepting players.
        Waiting = 1,
        /// Match running.
        InProgress = 2,
        /// Match over.
        Finished = 3,
    }
}

wire_enum! {
    /// Why a room operation was refused.
    pub enum RoomErrorCode {
        /// No such room.
        NotFound = 1,
        /// Room at capacity.
        Full = 2,
        /// Password hash did not match.
        WrongPassword = 3,
        /// Room already playing.
        AlreadyStarted = 4,
        /// Only the host may do this.
        NotHost = 5,
        /// Room settings are invalid.
        InvalidConfiguration = 6,
        /// Player is already in a room.
        AlreadyInRoom = 7,
    }
}

wire_enum! {
    /// Entity kind tag.
    pub enum EntityType {
        /// Player ship.
        Player = 0x01,
        /// Basic enemy.
        EnemyBasic = 0x02,
        /// Elite enemy.
        EnemyElite = 0x03,
        /// Boss.
        EnemyBoss = 0x04,
        /// Player-fired projectile.
        ProjectilePlayer = 0x05,
        /// Enemy-fired projectile.
        ProjectileEnemy = 0x06,
        /// Weapon upgrade.
        PowerupWeapon = 0x07,
        /// Shield.
        PowerupShield = 0x08,
        /// Score bonus.
        PowerupScore = 0x09,
        /// Fast enemy.
        EnemyFast = 0x0A,
        /// Tank enemy.
        EnemyTank = 0x0B,
        /// Health pickup.
        PowerupHealth = 0x0C,
        /// Speed pickup.
        PowerupSpeed = 0x0D,
        /// Static wall segment.
        Wall = 0x0E,
    }
}

impl EntityType {
    /// True for player ships.
    #[inline]
    #[must_use]
    pub const fn is_player(self) -> bool {
        matches!(self, Self::Player)
    }

    /// True for any projectile.
    #[inline]
    #[must_use]
    pub const fn is_projectile(self) -> bool {
        matches!(self, Self::ProjectilePlayer | Self::ProjectileEnemy)
    }

    /// True for any enemy.
    #[inline]
    #[must_use]
    pub const fn is_enemy(self) -> bool {
        matches!(
            self,
            Self::EnemyBasic | Self::EnemyElite | Self::EnemyBoss | Self::EnemyFast | Self::EnemyTank
        )
    }

    /// True for any pickup.
    #[inline]
    #[must_use]
    pub const fn is_powerup(self) -> bool {
        matches!(
            self,
            Self::PowerupWeapon
                | Self::PowerupShield
                | Self::PowerupScore
                | Self::PowerupHealth
                | Self::PowerupSpeed
        )
    }
}

wire_enum! {
    /// Why an entity was removed.
    pub enum DestroyReason {
        /// Health reached zero.
        Killed = 1,
        /// Left the playfield.
        OutOfBounds = 2,
        /// Picked up.
        Collected = 3,
        /// Lifetime expired.
        Timeout = 4,
    }
}

wire_enum! {
    /// Projectile kind.
    pub enum ProjectileType {
        /// Standard shot.
        Bullet = 1,
        /// Homing missile.
        Missile = 2,
        /// Laser beam.
        Laser = 3,
        /// Charged shot.
        ChargeShot = 4,
    }
}

wire_enum! {
    /// Pickup kind.
    pub enum PowerupType {
        /// Weapon upgrade.
        Weapon = 1,
        /// Shield.
        Shield = 2,
        /// Score bonus.
        Score = 3,
        /// Health.
        Health = 4,
        /// Speed.
        Speed = 5,
    }
}

wire_enum! {
    /// Match outcome.
    pub enum GameResult {
        /// All waves cleared.
        Victory = 1,
        /// Every player out of lives.
        Defeat = 2,
        /// Time limit reached.
        Timeout = 3,
    }
}

wire_enum! {
    /// Admin command verb.
    pub enum AdminCommandKind {
        /// Disconnect the target player.
        Kick = 1,
        /// Push a notification to every player.
        Broadcast = 2,
    }
}

/// Input flag bits carried in `ClientInput::input_flags`.
pub mod input_flags {
    /// Move up.
    pub const UP: u16 = 1 << 0;
    /// Move down.
    pub const DOWN: u16 = 1 << 1;
    /// Move left.
    pub const LEFT: u16 = 1 << 2;
    /// Move right.
    pub const RIGHT: u16 = 1 << 3;
    /// Fire.
    pub const SHOOT: u16 = 1 << 4;
    /// Charging a shot.
    pub const CHARGE: u16 = 1 << 5;
    /// Special weapon.
    pub const SPECIAL: u16 = 1 << 6;
    /// Cycle weapon.
    pub const SWITCH_WEAPON: u16 = 1 << 7;
}

/// State flag bits carried in `EntityState::flags`.
pub mod entity_flags {
    /// Cannot take damage.
    pub const INVULNERABLE: u16 = 1 << 0;
    /// Charging a shot.
    pub const CHARGING: u16 = 1 << 1;
    /// Recently hit.
    pub const DAMAGED: u16 = 1 << 2;
}
