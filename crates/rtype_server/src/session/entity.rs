//! Entity storage seam of a game session.
//!
//! The session only reads and writes the fields mirrored into snapshot
//! lines, through [`EntityRegistry`]. [`EntityTable`] is the built-in store.

use std::collections::BTreeMap;

use rtype_protocol::{EntityState, EntityType};

/// One simulated entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Entity {
    /// Id assigned by the registry.
    pub id: u32,
    /// Kind.
    pub kind: EntityType,
    /// Horizontal position in pixels.
    pub x: f32,
    /// Vertical position in pixels.
    pub y: f32,
    /// Horizontal velocity in pixels per second.
    pub vx: f32,
    /// Vertical velocity in pixels per second.
    pub vy: f32,
    /// Hit points.
    pub health: u16,
    /// `entity_flags` bits.
    pub flags: u16,
    /// Owning player for ships and player shots.
    pub owner: Option<u32>,
    /// Damage dealt on contact.
    pub damage: u16,
}

impl Entity {
    /// A new entity at rest; the id is filled in on spawn.
    #[must_use]
    pub const fn new(kind: EntityType, x: f32, y: f32, health: u16) -> Self {
        Self {
            id: 0,
            kind,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            health,
            flags: 0,
            owner: None,
            damage: 0,
        }
    }

    /// Sets the velocity.
    #[must_use]
    pub const fn moving(mut self, vx: f32, vy: f32) -> Self {
        self.vx = vx;
        self.vy = vy;
        self
    }

    /// Sets the owner.
    #[must_use]
    pub const fn owned_by(mut self, player_id: u32) -> Self {
        self.owner = Some(player_id);
        self
    }

    /// Sets the contact damage.
    #[must_use]
    pub const fn dealing(mut self, damage: u16) -> Self {
        self.damage = damage;
        self
    }

    /// Half extents of the hit box.
    #[must_use]
    pub const fn half_extents(&self) -> (f32, f32) {
        match self.kind {
            EntityType::Player => (24.0, 12.0),
            EntityType::EnemyBoss => (64.0, 64.0),
            EntityType::EnemyTank => (32.0, 24.0),
            EntityType::ProjectilePlayer | EntityType::ProjectileEnemy => (8.0, 3.0),
            EntityType::Wall => (32.0, 32.0),
            _ => (16.0, 16.0),
        }
    }

    /// True when the hit boxes overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let (aw, ah) = self.half_extents();
        let (bw, bh) = other.half_extents();
        (self.x - other.x).abs() < aw + bw && (self.y - other.y).abs() < ah + bh
    }

    /// Snapshot line for this entity.
    #[must_use]
    pub fn to_state(&self, last_ack_sequence: u32) -> EntityState {
        EntityState {
            entity_id: self.id,
            entity_type: self.kind,
            position_x: self.x,
            position_y: self.y,
            velocity_x: EntityState::quantize_velocity(self.vx),
            velocity_y: EntityState::quantize_velocity(self.vy),
            health: self.health,
            flags: self.flags,
            last_ack_sequence,
        }
    }
}

/// Storage a session simulates against.
pub trait EntityRegistry {
    /// Stores `entity` under a fresh id and returns the id.
    fn spawn(&mut self, entity: Entity) -> u32;

    /// Removes an entity.
    fn destroy(&mut self, id: u32) -> Option<Entity>;

    /// Entity by id.
    fn get(&self, id: u32) -> Option<&Entity>;

    /// Entity by id, mutable.
    fn get_mut(&mut self, id: u32) -> Option<&mut Entity>;

    /// Every live id, ascending.
    fn ids(&self) -> Vec<u32>;

    /// Live entity count.
    fn len(&self) -> usize;

    /// True when nothing is alive.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered in-memory entity store.
#[derive(Debug, Clone)]
pub struct EntityTable {
    entities: BTreeMap<u32, Entity>,
    next_id: u32,
}

impl EntityTable {
    /// Creates an empty table; ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry for EntityTable {
    fn spawn(&mut self, mut entity: Entity) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        entity.id = id;
        self.entities.insert(id, entity);
        id
    }

    fn destroy(&mut self, id: u32) -> Option<Entity> {
        self.entities.remove(&id)
    }

    fn get(&self, id: u32) -> Option<&Entity> {
        self.entities.get(&id)
    }

    fn get_mut(&mut self, id: u32) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    fn ids(&self) -> Vec<u32> {
        self.entities.keys().copied().collect()
    }

    fn len(&self) -> usize {
        self.entities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_assigns_ids() {
        let mut table = EntityTable::new();
        let a = table.spawn(Entity::new(EntityType::Player, 0.0, 0.0, 10));
        let b = table.spawn(Entity::new(EntityType::EnemyBasic, 5.0, 5.0, 10));
        assert_eq!((a, b), (1, 2));
        assert_eq!(table.get(b).unwrap().id, b);
        assert_eq!(table.ids(), vec![1, 2]);

        table.destroy(a);
        assert_eq!(table.len(), 1);
        assert!(table.get(a).is_none());
    }

    #[test]
    fn test_overlap() {
        let ship = Entity::new(EntityType::Player, 100.0, 100.0, 1);
        let near = Entity::new(EntityType::EnemyBasic, 130.0, 110.0, 1);
        let far = Entity::new(EntityType::EnemyBasic, 200.0, 100.0, 1);
        assert!(ship.overlaps(&near));
        assert!(!ship.overlaps(&far));
    }

    #[test]
    fn test_state_quantizes_velocity() {
        let shot = Entity::new(EntityType::ProjectilePlayer, 1.0, 2.0, 1).moving(600.0, -12.34);
        let state = shot.to_state(0);
        assert_eq!(state.velocity_x, 6000);
        assert_eq!(state.velocity_y, -123);
    }
}
