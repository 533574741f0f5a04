// Domain layer: core simulation types and rules.

pub mod pool;
pub mod quiver;
pub mod spawn;
pub mod state;
pub mod systems;
pub mod tuning;

pub use pool::{Handle, Pool};
pub use quiver::{Quiver, QuiverChange, QuiverNode};
pub use spawn::{SpawnContent, SpawnRecord, SpawnTable};
pub use state::{
    AmmoKind, Arrow, Enemy, EnemyKind, Health, PlayerSnapshot, PlayerState, Rarity, Vec2,
};
