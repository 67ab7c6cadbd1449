//! Snapshot cadence and delta tracking for one session.

use std::collections::HashMap;

use rtype_protocol::{DeltaSnapshot, EntityState, PacketType, Payload, Snapshot, SnapshotHeader};

/// Decides when to snapshot and what to put in it.
///
/// Cadence is a rational accumulator: `snapshot_rate` snapshots every
/// `tick_rate` ticks, spread evenly. With deltas on, every
/// `keyframe_interval`-th snapshot (and the first) is full; the rest carry
/// every line that differs from the last keyframe, so a lost delta is
/// repaired by the next one.
#[derive(Debug, Clone)]
pub struct SnapshotSync {
    tick_rate: u32,
    snapshot_rate: u32,
    accumulator: u32,
    delta: bool,
    keyframe_interval: u32,
    sent: u64,
    baseline: HashMap<u32, EntityState>,
}

impl SnapshotSync {
    /// Creates a tracker; the first call to [`SnapshotSync::due`] is due.
    #[must_use]
    pub fn new(tick_rate: u32, snapshot_rate: u32, delta: bool, keyframe_interval: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        let snapshot_rate = snapshot_rate.clamp(1, tick_rate);
        Self {
            tick_rate,
            snapshot_rate,
            accumulator: tick_rate - snapshot_rate,
            delta,
            keyframe_interval: keyframe_interval.max(1),
            sent: 0,
            baseline: HashMap::new(),
        }
    }

    /// Advances one tick; true when a snapshot goes out this tick.
    pub fn due(&mut self) -> bool {
        self.accumulator += self.snapshot_rate;
        if self.accumulator >= self.tick_rate {
            self.accumulator -= self.tick_rate;
            true
        } else {
            false
        }
    }

    /// Snapshots built so far.
    #[inline]
    #[must_use]
    pub const fn sent(&self) -> u64 {
        self.sent
    }

    /// Builds the next snapshot from priority-ordered `lines`.
    ///
    /// Returns the packet type and the encoded payload.
    pub fn build(&mut self, server_tick: u32, scroll_x: f32, lines: Vec<EntityState>) -> (PacketType, Vec<u8>) {
        let keyframe = !self.delta || self.sent % u64::from(self.keyframe_interval) == 0;
        self.sent += 1;

        let header = SnapshotHeader {
            server_tick,
            entity_count: 0,
            scroll_x,
        };

        if keyframe {
            self.baseline = lines.iter().map(|l| (l.entity_id, *l)).collect();
            let snapshot = Snapshot::new(header, lines);
            (PacketType::Snapshot, snapshot.to_bytes())
        } else {
            let changed = lines
                .into_iter()
                .filter(|line| self.baseline.get(&line.entity_id) != Some(line))
                .collect();
            let delta = DeltaSnapshot::new(header, changed);
            (PacketType::DeltaSnapshot, delta.to_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtype_protocol::EntityType;

    fn line(id: u32, x: f32) -> EntityState {
        EntityState {
            entity_id: id,
            entity_type: EntityType::EnemyBasic,
            position_x: x,
            position_y: 0.0,
            velocity_x: 0,
            velocity_y: 0,
            health: 100,
            flags: 0,
            last_ack_sequence: 0,
        }
    }

    #[test]
    fn test_cadence_spreads_snapshots() {
        let mut sync = SnapshotSync::new(64, 60, false, 60);
        let due = (0..64).filter(|_| sync.due()).count();
        assert_eq!(due, 60);

        let mut every_tick = SnapshotSync::new(30, 30, false, 60);
        assert!((0..30).all(|_| every_tick.due()));

        let mut first = SnapshotSync::new(64, 20, false, 60);
        assert!(first.due());
    }

    #[test]
    fn test_delta_carries_changes_only() {
        let mut sync = SnapshotSync::new(60, 60, true, 3);

        let (kind, _) = sync.build(1, 0.0, vec![line(1, 0.0), line(2, 0.0)]);
        assert_eq!(kind, PacketType::Snapshot);

        let (kind, bytes) = sync.build(2, 1.0, vec![line(1, 0.0), line(2, 5.0), line(3, 0.0)]);
        assert_eq!(kind, PacketType::DeltaSnapshot);
        let delta = DeltaSnapshot::from_bytes(&bytes).unwrap();
        let ids: Vec<u32> = delta.entities.iter().map(|e| e.entity_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(delta.header.server_tick, 2);

        sync.build(3, 2.0, vec![line(1, 0.0)]);
        let (kind, bytes) = sync.build(4, 3.0, vec![line(1, 0.0)]);
        assert_eq!(kind, PacketType::Snapshot);
        assert_eq!(Snapshot::from_bytes(&bytes).unwrap().entities.len(), 1);
    }

    #[test]
    fn test_delta_repeats_changes_until_keyframe() {
        let mut sync = SnapshotSync::new(60, 60, true, 4);
        sync.build(1, 0.0, vec![line(1, 0.0), line(2, 0.0)]);

        let (_, first) = sync.build(2, 0.0, vec![line(1, 9.0), line(2, 0.0)]);
        let (_, second) = sync.build(3, 0.0, vec![line(1, 9.0), line(2, 0.0)]);
        for bytes in [first, second] {
            let delta = DeltaSnapshot::from_bytes(&bytes).unwrap();
            assert_eq!(delta.entities, vec![line(1, 9.0)]);
        }

        sync.build(4, 0.0, vec![line(1, 9.0), line(2, 0.0)]);
        let (kind, _) = sync.build(5, 0.0, vec![line(1, 9.0), line(2, 0.0)]);
        assert_eq!(kind, PacketType::Snapshot);
        let (_, after) = sync.build(6, 0.0, vec![line(1, 9.0), line(2, 0.0)]);
        assert!(DeltaSnapshot::from_bytes(&after).unwrap().entities.is_empty());
    }

    #[test]
    fn test_full_mode_never_deltas() {
        let mut sync = SnapshotSync::new(60, 60, false, 3);
        for tick in 0..5 {
            assert_eq!(sync.build(tick, 0.0, vec![line(1, 0.0)]).0, PacketType::Snapshot);
        }
        assert_eq!(sync.sent(), 5);
    }
}
