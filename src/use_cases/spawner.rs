// Authoritative spawn decisions with observer fan-out.
//
// Exactly one participant (the host) rolls spawns on a fixed interval and
// publishes each decision as a cancellable event before committing it. A
// vetoed decision leaves the slot free and never reaches the wire. Observers
// hold the same table but only ever reflect sync messages; they decide
// nothing.

use tracing::{debug, info};

use crate::domain::spawn::{SpawnContent, SpawnTable};
use crate::domain::state::EnemyKind;
use crate::domain::tuning::spawner::{kinds_by_rarity, SpawnerTuning, SPAWN_RARITIES};
use crate::use_cases::bus::{EventBus, GameEvent};
use crate::use_cases::types::SpawnSlotSync;

/// A committed spawn the world must materialize and (on the host) broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnDecision {
    pub slot: usize,
    pub content: SpawnContent,
}

/// Small deterministic generator for spawn rolls; seedable so decision
/// sequences are reproducible in tests.
#[derive(Debug, Clone)]
pub struct SpawnRng(u64);

impl SpawnRng {
    pub fn new(seed: u64) -> Self {
        // xorshift64 degenerates on a zero state.
        Self(seed.max(1))
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let i = (self.next() % items.len() as u64) as usize;
        items.get(i)
    }
}

const ENEMY_KINDS: [EnemyKind; 4] = [
    EnemyKind::Dummy,
    EnemyKind::Grunt,
    EnemyKind::Ranged,
    EnemyKind::Caster,
];

pub struct SpawnCoordinator {
    tuning: SpawnerTuning,
    table: SpawnTable,
    rng: SpawnRng,
    /// Only the host rolls decisions; everyone else reflects syncs.
    authoritative: bool,
    running: bool,
    timer: f32,
    spawn_count: u32,
}

impl SpawnCoordinator {
    pub fn new(tuning: SpawnerTuning, authoritative: bool, seed: u64) -> Self {
        Self {
            table: SpawnTable::new(tuning.slot_count),
            tuning,
            rng: SpawnRng::new(seed),
            authoritative,
            running: true,
            timer: tuning.interval_seconds,
            spawn_count: 0,
        }
    }

    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    pub fn table(&self) -> &SpawnTable {
        &self.table
    }

    /// Pause gate: a stopped coordinator holds its timer where it is.
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Advances the spawn timer and, when it fires, rolls one decision and
    /// offers it for veto. Returns the committed decision, or `None` when the
    /// timer has not fired, every slot is occupied, or a listener vetoed.
    pub fn tick(&mut self, dt: f32, bus: &EventBus) -> Option<SpawnDecision> {
        if !self.authoritative || !self.running {
            return None;
        }
        self.timer -= dt;
        if self.timer > 0.0 {
            return None;
        }
        self.timer = self.tuning.interval_seconds;

        let free = self.table.free_slots();
        let Some(&slot) = self.rng.pick(&free) else {
            debug!("spawn skipped, no free slot");
            return None;
        };
        let content = self.roll_content();

        let mut ev = GameEvent::SpawnOccurred {
            slot,
            content,
            cancelled: false,
        };
        bus.publish(&mut ev);
        if ev.is_cancelled() {
            // The slot stays free and nothing reaches the wire.
            debug!(slot, "spawn vetoed");
            return None;
        }

        self.table.set(slot, content, true);
        self.spawn_count += 1;
        info!(slot, ?content, "spawned");
        Some(SpawnDecision { slot, content })
    }

    fn roll_content(&mut self) -> SpawnContent {
        let cadence = self.tuning.enemy_cadence;
        if cadence > 0 && (self.spawn_count + 1) % cadence == 0 {
            let kind = self.rng.pick(&ENEMY_KINDS).copied().unwrap_or(EnemyKind::Dummy);
            return SpawnContent::Enemy(kind);
        }
        let rarity = self
            .rng
            .pick(&SPAWN_RARITIES)
            .copied()
            .unwrap_or(crate::domain::state::Rarity::Common);
        let kinds = kinds_by_rarity(rarity);
        let kind = self
            .rng
            .pick(kinds)
            .copied()
            .unwrap_or(crate::domain::state::AmmoKind::Normal);
        SpawnContent::Ammo(kind)
    }

    /// Reflects one slot change received from the host. Returns the decision
    /// to materialize when the slot just became active.
    pub fn apply_sync(
        &mut self,
        slot: usize,
        content: SpawnContent,
        active: bool,
    ) -> Option<SpawnDecision> {
        if !self.table.set(slot, content, active) {
            debug!(slot, "spawn sync for unknown slot dropped");
            return None;
        }
        active.then_some(SpawnDecision { slot, content })
    }

    /// Claims a slot's occupant. Only an active slot yields anything, so
    /// duplicate or racing claims resolve to a single winner.
    pub fn collect(&mut self, slot: usize) -> Option<SpawnContent> {
        self.table.deactivate(slot)
    }

    /// Whole-table snapshot shipped to late joiners.
    pub fn full_table(&self) -> Vec<SpawnSlotSync> {
        self.table
            .records()
            .filter_map(|(slot, record)| {
                record.content.map(|content| SpawnSlotSync {
                    slot,
                    content,
                    active: record.active,
                })
            })
            .collect()
    }

    /// Late-join bootstrap on an observer. Returns the active enemy slots the
    /// world must materialize locally.
    pub fn apply_table(&mut self, records: &[SpawnSlotSync]) -> Vec<SpawnDecision> {
        let mut live = Vec::new();
        for rec in records {
            if self.table.set(rec.slot, rec.content, rec.active) && rec.active {
                live.push(SpawnDecision {
                    slot: rec.slot,
                    content: rec.content,
                });
            }
        }
        live
    }
}
