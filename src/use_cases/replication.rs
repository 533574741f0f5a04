// Per-participant snapshot replication.
//
// Each participant owns its avatar and periodically ships a snapshot through
// the relay; everyone else mirrors it. Application is idempotent and
// tolerates lost or duplicated packets, so the transport never retries.

use tracing::debug;

use crate::domain::state::{PlayerSnapshot, PlayerState};
use crate::use_cases::bus::{EventBus, GameEvent};

/// What applying a snapshot asks the world to do next: route this health
/// delta through the damage/heal default-effect path so UI and death events
/// fire the same way they do for local hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotApplied {
    pub owner: u64,
    pub health_delta: i32,
}

pub struct ReplicationCoordinator {
    local_owner: Option<u64>,
    position_sensitivity: f32,
    send_interval: f32,
    send_timer: f32,
}

impl ReplicationCoordinator {
    pub fn new(local_owner: Option<u64>, position_sensitivity: f32, send_interval: f32) -> Self {
        Self {
            local_owner,
            position_sensitivity,
            send_interval,
            send_timer: 0.0,
        }
    }

    pub fn local_owner(&self) -> Option<u64> {
        self.local_owner
    }

    pub fn set_local_owner(&mut self, owner: Option<u64>) {
        self.local_owner = owner;
    }

    /// Advances the send timer; true once per send interval.
    pub fn should_send(&mut self, dt: f32) -> bool {
        self.send_timer -= dt;
        if self.send_timer <= 0.0 {
            self.send_timer = self.send_interval;
            return true;
        }
        false
    }

    /// Packages the local avatar's state, if this process has one.
    pub fn build(&self, players: &[PlayerState]) -> Option<PlayerSnapshot> {
        let owner = self.local_owner?;
        players
            .iter()
            .find(|p| p.id == owner)
            .map(PlayerSnapshot::from)
    }

    /// Applies an inbound snapshot to the mirrored avatar. Returns `None`
    /// when the snapshot was discarded (own echo, or no such participant);
    /// otherwise reports the health delta for the caller's default effect.
    pub fn apply(
        &self,
        players: &mut [PlayerState],
        bus: &EventBus,
        snapshot: &PlayerSnapshot,
    ) -> Option<SnapshotApplied> {
        if Some(snapshot.owner) == self.local_owner {
            // Never apply our own echo.
            return None;
        }
        let Some(player) = players.iter_mut().find(|p| p.id == snapshot.owner) else {
            debug!(owner = snapshot.owner, "snapshot for unknown participant dropped");
            return None;
        };

        let health_delta = snapshot.hp - player.health.current;

        // Position: only follow the snapshot once it disagrees by more than
        // the sensitivity threshold, so remote jitter cannot override
        // locally-smoothed motion.
        if player.pos.distance(snapshot.pos) > self.position_sensitivity {
            player.pos = snapshot.pos;
        }

        // Aim mirrors unconditionally.
        player.aim = snapshot.aim;

        // Selection mirrors only on change, with a notification for UI.
        if player.quiver.selection_wire() != snapshot.selected {
            player.quiver.set_selection_wire(snapshot.selected);
            let mut ev = GameEvent::SelectionChanged {
                owner: player.id,
                kind: player.quiver.selected_kind(),
            };
            bus.publish(&mut ev);
        }

        Some(SnapshotApplied {
            owner: snapshot.owner,
            health_delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::{AmmoKind, Vec2};
    use crate::domain::tuning::player::PlayerTuning;
    use std::cell::Cell;
    use std::rc::Rc;

    fn coordinator() -> ReplicationCoordinator {
        ReplicationCoordinator::new(Some(1), 0.1, 0.05)
    }

    fn roster() -> Vec<PlayerState> {
        let tuning = PlayerTuning::default();
        vec![
            PlayerState::new(1, "local".into(), &tuning),
            PlayerState::new(2, "remote".into(), &tuning),
        ]
    }

    fn snapshot_of(owner: u64) -> PlayerSnapshot {
        PlayerSnapshot {
            owner,
            hp: 10,
            pos: Vec2::new(5.0, 5.0),
            aim: Vec2::new(0.0, 1.0),
            selected: -1,
        }
    }

    #[test]
    fn when_the_snapshot_owner_is_self_then_it_is_never_applied() {
        let coord = coordinator();
        let bus = EventBus::new();
        let mut players = roster();

        let applied = coord.apply(&mut players, &bus, &snapshot_of(1));

        assert!(applied.is_none());
        assert_eq!(players[0].pos, Vec2::default());
    }

    #[test]
    fn when_the_same_snapshot_applies_twice_then_the_state_is_unchanged() {
        let coord = coordinator();
        let bus = EventBus::new();
        let mut players = roster();
        players[1].quiver.collect(AmmoKind::Normal, 2);
        let mut snap = snapshot_of(2);
        snap.hp = 7;
        snap.selected = 0;

        let first = coord.apply(&mut players, &bus, &snap).expect("applied");
        players[1].health.apply_delta(first.health_delta);
        let once = players[1].clone();

        let second = coord.apply(&mut players, &bus, &snap).expect("applied");
        players[1].health.apply_delta(second.health_delta);

        assert_eq!(second.health_delta, 0);
        assert_eq!(players[1].health, once.health);
        assert_eq!(players[1].pos, once.pos);
        assert_eq!(players[1].aim, once.aim);
        assert_eq!(players[1].quiver.selection_wire(), once.quiver.selection_wire());
    }

    #[test]
    fn when_the_position_delta_is_below_the_threshold_then_it_is_kept_local() {
        let coord = coordinator();
        let bus = EventBus::new();
        let mut players = roster();
        players[1].pos = Vec2::new(5.0, 5.0);

        let mut snap = snapshot_of(2);
        snap.pos = Vec2::new(5.05, 5.0);
        coord.apply(&mut players, &bus, &snap).expect("applied");
        assert_eq!(players[1].pos, Vec2::new(5.0, 5.0));

        snap.pos = Vec2::new(5.5, 5.0);
        coord.apply(&mut players, &bus, &snap).expect("applied");
        assert_eq!(players[1].pos, Vec2::new(5.5, 5.0));
    }

    #[test]
    fn when_the_selection_differs_then_a_selection_changed_event_fires_once() {
        let coord = coordinator();
        let bus = EventBus::new();
        let fired = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&fired);
        bus.subscribe(crate::use_cases::bus::EventKind::SelectionChanged, move |_| {
            counter.set(counter.get() + 1);
        });

        let mut players = roster();
        players[1].quiver.collect(AmmoKind::Normal, 2);
        players[1].quiver.collect(AmmoKind::Ghost, 1);

        let mut snap = snapshot_of(2);
        snap.selected = 1;
        coord.apply(&mut players, &bus, &snap).expect("applied");
        coord.apply(&mut players, &bus, &snap).expect("applied");

        assert_eq!(fired.get(), 1);
        assert_eq!(players[1].quiver.selected_kind(), Some(AmmoKind::Ghost));
    }

    #[test]
    fn when_the_send_interval_elapses_then_a_snapshot_is_due() {
        let mut coord = coordinator();
        assert!(coord.should_send(0.0));
        assert!(!coord.should_send(0.01));
        assert!(coord.should_send(0.05));
    }

    #[test]
    fn when_an_unknown_owner_is_referenced_then_the_snapshot_is_dropped() {
        let coord = coordinator();
        let bus = EventBus::new();
        let mut players = roster();
        assert!(coord.apply(&mut players, &bus, &snapshot_of(99)).is_none());
    }
}
