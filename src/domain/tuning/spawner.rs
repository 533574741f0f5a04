use crate::domain::state::{AmmoKind, Rarity};

/// Spawn-point timing and layout.
#[derive(Debug, Clone, Copy)]
pub struct SpawnerTuning {
    pub interval_seconds: f32,
    pub slot_count: usize,
    /// Every Nth successful decision spawns an enemy instead of ammo.
    pub enemy_cadence: u32,
}

impl Default for SpawnerTuning {
    fn default() -> Self {
        Self {
            interval_seconds: 3.0,
            slot_count: 8,
            enemy_cadence: 4,
        }
    }
}

/// Rarity bucket each ammo kind drops from. Each kind belongs to exactly one
/// bucket.
pub fn rarity_of(kind: AmmoKind) -> Rarity {
    match kind {
        AmmoKind::Chopstick => Rarity::Trash,
        AmmoKind::Normal => Rarity::Common,
        AmmoKind::FlipFlop | AmmoKind::Ghost => Rarity::Rare,
        AmmoKind::Anvil => Rarity::Legendary,
    }
}

/// Kinds available inside one rarity bucket, in a stable order.
pub fn kinds_by_rarity(rarity: Rarity) -> &'static [AmmoKind] {
    match rarity {
        Rarity::Trash => &[AmmoKind::Chopstick],
        Rarity::Common => &[AmmoKind::Normal],
        Rarity::Rare => &[AmmoKind::FlipFlop, AmmoKind::Ghost],
        Rarity::Legendary => &[AmmoKind::Anvil],
    }
}

/// Buckets the spawner rolls between, uniformly.
pub const SPAWN_RARITIES: [Rarity; 4] =
    [Rarity::Trash, Rarity::Common, Rarity::Rare, Rarity::Legendary];
