// Spawn slot bookkeeping: which fixed spawn point currently holds what.

use serde::{Deserialize, Serialize};

use crate::domain::state::{AmmoKind, EnemyKind};

/// What a spawn point can be occupied by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnContent {
    Ammo(AmmoKind),
    Enemy(EnemyKind),
}

/// Current occupant of one spawn slot. `active == false` means the slot may
/// be chosen again by the spawner.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpawnRecord {
    pub content: Option<SpawnContent>,
    pub active: bool,
}

/// Dense table of spawn records addressed by stable slot index.
#[derive(Debug, Clone)]
pub struct SpawnTable {
    slots: Vec<SpawnRecord>,
}

impl SpawnTable {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![SpawnRecord::default(); slot_count],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&SpawnRecord> {
        self.slots.get(slot)
    }

    /// Overwrites one record. Unknown slots are dropped without error.
    pub fn set(&mut self, slot: usize, content: SpawnContent, active: bool) -> bool {
        match self.slots.get_mut(slot) {
            Some(record) => {
                record.content = Some(content);
                record.active = active;
                true
            }
            None => false,
        }
    }

    /// Marks a slot free again, keeping the content for bookkeeping. Returns
    /// the occupant when the slot was actually active.
    pub fn deactivate(&mut self, slot: usize) -> Option<SpawnContent> {
        let record = self.slots.get_mut(slot)?;
        if !record.active {
            return None;
        }
        record.active = false;
        record.content
    }

    /// Slot indices that may be chosen for the next spawn.
    pub fn free_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.active)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = (usize, &SpawnRecord)> {
        self.slots.iter().enumerate()
    }
}
