// Gameplay tuning constants, kept apart from runtime/server configuration.

pub mod player;
pub mod projectile;
pub mod spawner;
