//! Input and world state payloads.
//!
//! ## Input Reconciliation
//!
//! ```text
//! client:  INPUT seq=5 ─┐   INPUT seq=3 (late) ─┐   INPUT seq=7 ─┐
//! server:               ▼ apply, ack=5          ▼ stale, ignored ▼ apply, ack=7
//! snapshot line for the sender's ship:  last_ack_sequence = 7
//! ```

use super::{entity_flags, input_flags, EntityType, WireRecord};

wire_record! {
    /// INPUT - one client tick of input. 14 bytes.
    pub struct ClientInput {
        /// Sender.
        pub player_id: u32,
        /// Bitfield, see [`input_flags`].
        pub input_flags: u16,
        /// Client-side tick the input was sampled on.
        pub client_tick: u32,
        /// Monotonic per-client input counter.
        pub sequence_number: u32,
    }
}

impl ClientInput {
    #[inline]
    const fn has(&self, flag: u16) -> bool {
        self.input_flags & flag != 0
    }

    /// Up pressed.
    #[inline]
    #[must_use]
    pub const fn is_up_pressed(&self) -> bool {
        self.has(input_flags::UP)
    }

    /// Down pressed.
    #[inline]
    #[must_use]
    pub const fn is_down_pressed(&self) -> bool {
        self.has(input_flags::DOWN)
    }

    /// Left pressed.
    #[inline]
    #[must_use]
    pub const fn is_left_pressed(&self) -> bool {
        self.has(input_flags::LEFT)
    }

    /// Right pressed.
    #[inline]
    #[must_use]
    pub const fn is_right_pressed(&self) -> bool {
        self.has(input_flags::RIGHT)
    }

    /// Fire pressed.
    #[inline]
    #[must_use]
    pub const fn is_shoot_pressed(&self) -> bool {
        self.has(input_flags::SHOOT)
    }

    /// Charge held.
    #[inline]
    #[must_use]
    pub const fn is_charge_pressed(&self) -> bool {
        self.has(input_flags::CHARGE)
    }

    /// Special pressed.
    #[inline]
    #[must_use]
    pub const fn is_special_pressed(&self) -> bool {
        self.has(input_flags::SPECIAL)
    }

    /// Weapon switch pressed.
    #[inline]
    #[must_use]
    pub const fn is_switch_weapon_pressed(&self) -> bool {
        self.has(input_flags::SWITCH_WEAPON)
    }
}

wire_record! {
    /// One entity line of a snapshot. 25 bytes.
    pub struct EntityState {
        /// Entity id.
        pub entity_id: u32,
        /// Kind.
        pub entity_type: EntityType,
        /// Position X.
        pub position_x: f32,
        /// Position Y.
        pub position_y: f32,
        /// Velocity X in tenths of a pixel per second.
        pub velocity_x: i16,
        /// Velocity Y in tenths of a pixel per second.
        pub velocity_y: i16,
        /// Current health.
        pub health: u16,
        /// Bitfield, see [`entity_flags`].
        pub flags: u16,
        /// Highest input sequence applied for the owning player; 0 otherwise.
        pub last_ack_sequence: u32,
    }
}

impl EntityState {
    /// Velocity wire scale.
    pub const VELOCITY_SCALE: f32 = 10.0;

    /// Quantizes a velocity component for the wire.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn quantize_velocity(velocity: f32) -> i16 {
        (velocity * Self::VELOCITY_SCALE)
            .round()
            .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
    }

    /// Velocity in pixels per second.
    #[inline]
    #[must_use]
    pub fn velocity(&self) -> (f32, f32) {
        (
            f32::from(self.velocity_x) / Self::VELOCITY_SCALE,
            f32::from(self.velocity_y) / Self::VELOCITY_SCALE,
        )
    }

    /// Invulnerable flag.
    #[inline]
    #[must_use]
    pub const fn is_invulnerable(&self) -> bool {
        self.flags & entity_flags::INVULNERABLE != 0
    }

    /// Charging flag.
    #[inline]
    #[must_use]
    pub const fn is_charging(&self) -> bool {
        self.flags & entity_flags::CHARGING != 0
    }

    /// Damaged flag.
    #[inline]
    #[must_use]
    pub const fn is_damaged(&self) -> bool {
        self.flags & entity_flags::DAMAGED != 0
    }
}

wire_record! {
    /// SNAPSHOT / DELTA_SNAPSHOT header. 10 bytes.
    pub struct SnapshotHeader {
        /// Server tick the snapshot was taken on.
        pub server_tick: u32,
        /// Entry count.
        pub entity_count: u16,
        /// World scroll offset.
        pub scroll_x: f32,
    }
}

counted_payload! {
    /// SNAPSHOT - every live entity.
    pub struct Snapshot => Snapshot {
        header: SnapshotHeader,
        count: entity_count as u16,
        /// Entity lines in priority order.
        pub entities: Vec<EntityState>,
    }
}

counted_payload! {
    /// DELTA_SNAPSHOT - entities changed since the previous snapshot.
    pub struct DeltaSnapshot => DeltaSnapshot {
        header: SnapshotHeader,
        count: entity_count as u16,
        /// Changed entity lines.
        pub entities: Vec<EntityState>,
    }
}

/// Entity lines that fit one snapshot packet.
pub const MAX_SNAPSHOT_ENTITIES: usize =
    (crate::MAX_PAYLOAD_SIZE - <SnapshotHeader as WireRecord>::SIZE) / <EntityState as WireRecord>::SIZE;

fixed_payload! {
    ClientInput => Input,
}

const _: () = assert!(<ClientInput as WireRecord>::SIZE == 14);
const _: () = assert!(<EntityState as WireRecord>::SIZE == 25);
const _: () = assert!(<SnapshotHeader as WireRecord>::SIZE == 10);
const _: () = assert!(MAX_SNAPSHOT_ENTITIES == 55);
