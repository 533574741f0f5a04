use crate::domain::state::{AmmoKind, Arrow, Enemy, EnemyKind, Health, Vec2};

/// Pool sizing from the shipped configuration: 60 projectiles per kind,
/// 25 enemies per kind, pre-warmed at startup and never resized.
pub const ARROW_POOL_CAPACITY: usize = 60;
pub const ENEMY_POOL_CAPACITY: usize = 25;

/// Baseline ballistics; per-kind prototypes override from here.
#[derive(Debug, Clone, Copy)]
pub struct ProjectileTuning {
    pub speed: f32,
    pub life_time: f32,
    pub radius: f32,
    pub damage: i32,
}

impl Default for ProjectileTuning {
    fn default() -> Self {
        Self {
            speed: 14.0,
            life_time: 4.0,
            radius: 0.15,
            damage: 1,
        }
    }
}

/// Ammo granted when an item of this kind is picked up.
pub fn collect_amount(kind: AmmoKind) -> i32 {
    match kind {
        AmmoKind::Normal => 3,
        AmmoKind::Chopstick => 5,
        AmmoKind::FlipFlop => 2,
        AmmoKind::Ghost => 2,
        AmmoKind::Anvil => 1,
    }
}

/// Kind → prototype mapping handed to the arrow pool at startup.
pub fn arrow_prototypes() -> Vec<(AmmoKind, Arrow)> {
    let base = ProjectileTuning::default();
    let proto = |kind: AmmoKind, speed: f32, damage: i32, ttl: f32| {
        (
            kind,
            Arrow {
                kind,
                owner: 0,
                pos: Vec2::default(),
                vel: Vec2::default(),
                speed,
                ttl,
                damage,
            },
        )
    };
    vec![
        proto(AmmoKind::Normal, base.speed, base.damage, base.life_time),
        proto(AmmoKind::Chopstick, base.speed * 1.3, 1, 2.5),
        proto(AmmoKind::FlipFlop, base.speed * 0.8, 2, base.life_time),
        proto(AmmoKind::Ghost, base.speed, 2, 6.0),
        proto(AmmoKind::Anvil, base.speed * 0.5, 4, 2.0),
    ]
}

/// Kind → prototype mapping for the enemy pool.
pub fn enemy_prototypes() -> Vec<(EnemyKind, Enemy)> {
    let proto = |kind: EnemyKind, hp: i32| {
        (
            kind,
            Enemy {
                kind,
                health: Health::full(hp),
                pos: Vec2::default(),
                slot: None,
            },
        )
    };
    vec![
        proto(EnemyKind::Dummy, 3),
        proto(EnemyKind::Grunt, 5),
        proto(EnemyKind::Ranged, 4),
        proto(EnemyKind::Caster, 6),
    ]
}
