// Projectile flight: integration, lifetime, and hit detection over the pool.

use crate::domain::pool::{Handle, Pool};
use crate::domain::state::{AmmoKind, Arrow, Enemy, EnemyKind, PlayerState};

/// What an arrow ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Player(u64),
    Enemy(Handle<EnemyKind>),
}

/// One detected collision, reported up so the world can run the cancellable
/// hit event before any damage is applied.
#[derive(Debug, Clone, Copy)]
pub struct ArrowHit {
    pub arrow: Handle<AmmoKind>,
    pub shooter: u64,
    pub ammo_kind: AmmoKind,
    pub damage: i32,
    pub target: HitTarget,
}

#[derive(Debug, Clone, Copy)]
pub struct FlightConfig {
    pub player_radius: f32,
    pub arrow_radius: f32,
}

/// Advances every active arrow by `dt`, releasing the expired ones, and
/// returns first-contact hits. Damage is not applied here; the caller owns
/// the default effect.
pub fn tick_arrows(
    arrows: &mut Pool<AmmoKind, Arrow>,
    players: &[PlayerState],
    enemies: &Pool<EnemyKind, Enemy>,
    dt: f32,
    cfg: FlightConfig,
) -> Vec<ArrowHit> {
    let mut hits = Vec::new();
    let mut expired = Vec::new();

    let hit_radius = cfg.player_radius + cfg.arrow_radius;
    let hit_radius_sq = hit_radius * hit_radius;

    for (handle, arrow) in arrows.iter_active_mut() {
        arrow.pos.x += arrow.vel.x * dt;
        arrow.pos.y += arrow.vel.y * dt;
        arrow.ttl -= dt;
        if arrow.ttl <= 0.0 {
            expired.push(handle);
            continue;
        }

        let target = players
            .iter()
            .filter(|p| p.alive && p.id != arrow.owner)
            .find(|p| {
                let dx = p.pos.x - arrow.pos.x;
                let dy = p.pos.y - arrow.pos.y;
                dx * dx + dy * dy <= hit_radius_sq
            })
            .map(|p| HitTarget::Player(p.id))
            .or_else(|| {
                enemies
                    .iter_active()
                    .find(|(_, e)| {
                        let dx = e.pos.x - arrow.pos.x;
                        let dy = e.pos.y - arrow.pos.y;
                        dx * dx + dy * dy <= hit_radius_sq
                    })
                    .map(|(h, _)| HitTarget::Enemy(h))
            });

        if let Some(target) = target {
            hits.push(ArrowHit {
                arrow: handle,
                shooter: arrow.owner,
                ammo_kind: arrow.kind,
                damage: arrow.damage,
                target,
            });
        }
    }

    // Lifetime expiry is a plain timer drain; no event fires for it.
    for handle in expired {
        arrows.release(handle);
    }

    hits
}
