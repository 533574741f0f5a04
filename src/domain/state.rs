// Domain-level simulation entities: players plus the pooled combat objects.

use serde::{Deserialize, Serialize};

use crate::domain::quiver::Quiver;
use crate::domain::tuning::player::PlayerTuning;

/// Kinds of ammunition an arrow can be made of. Closed set; the pool and the
/// quiver are both keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmmoKind {
    Normal,
    Chopstick,
    FlipFlop,
    Ghost,
    Anvil,
}

/// Kinds of pooled enemies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnemyKind {
    Dummy,
    Grunt,
    Ranged,
    Caster,
}

/// Drop-table rarity buckets for spawned ammo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rarity {
    Trash,
    Common,
    Rare,
    Legendary,
}

/// Plain 2D vector; enough math for flight and the position sensitivity check.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn normalized(self) -> Vec2 {
        let len = (self.x * self.x + self.y * self.y).sqrt();
        if len <= f32::EPSILON {
            return Vec2::default();
        }
        Vec2::new(self.x / len, self.y / len)
    }

    pub fn scaled(self, factor: f32) -> Vec2 {
        Vec2::new(self.x * factor, self.y * factor)
    }
}

/// Health capability shared by players and enemies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub current: i32,
    pub max: i32,
}

impl Health {
    pub fn full(max: i32) -> Self {
        Self { current: max, max }
    }

    /// Applies a signed delta, clamped to `0..=max`.
    pub fn apply_delta(&mut self, delta: i32) {
        self.current = (self.current + delta).clamp(0, self.max);
    }

    pub fn is_depleted(&self) -> bool {
        self.current <= 0
    }
}

/// One connected participant's avatar as this process sees it. For the local
/// participant the fields are authoritative; for remote participants they are
/// shadow mirrors overwritten by snapshot application.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: u64,
    pub name: String,
    pub health: Health,
    pub pos: Vec2,
    pub aim: Vec2,
    pub alive: bool,
    pub respawn_timer: f32,
    pub shoot_cooldown: f32,
    pub quiver: Quiver,
}

impl PlayerState {
    pub fn new(id: u64, name: String, tuning: &PlayerTuning) -> Self {
        Self {
            id,
            name,
            health: Health::full(tuning.max_hp),
            pos: Vec2::default(),
            aim: Vec2::default(),
            alive: true,
            respawn_timer: 0.0,
            shoot_cooldown: 0.0,
            quiver: Quiver::default(),
        }
    }

    /// Resets combat state for a respawn. Inventory survives death.
    pub fn reset_values(&mut self, tuning: &PlayerTuning) {
        self.health = Health::full(tuning.max_hp);
        self.alive = true;
        self.respawn_timer = 0.0;
        self.shoot_cooldown = 0.0;
    }
}

/// Pooled projectile. Prototypes carry the per-kind ballistics; checked-out
/// instances add owner and flight state.
#[derive(Debug, Clone)]
pub struct Arrow {
    pub kind: AmmoKind,
    pub owner: u64,
    pub pos: Vec2,
    pub vel: Vec2,
    pub speed: f32,
    pub ttl: f32,
    pub damage: i32,
}

/// Pooled enemy. `slot` ties it back to the spawn record that produced it.
#[derive(Debug, Clone)]
pub struct Enemy {
    pub kind: EnemyKind,
    pub health: Health,
    pub pos: Vec2,
    pub slot: Option<usize>,
}

/// Per-tick replication packet for one participant's avatar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSnapshot {
    pub owner: u64,
    pub hp: i32,
    pub pos: Vec2,
    pub aim: Vec2,
    /// Selected quiver index, -1 meaning no selection.
    pub selected: i32,
}

impl From<&PlayerState> for PlayerSnapshot {
    fn from(player: &PlayerState) -> Self {
        Self {
            owner: player.id,
            hp: player.health.current,
            pos: player.pos,
            aim: player.aim,
            selected: player.quiver.selection_wire(),
        }
    }
}
