// Tick-driven world: drains inbound relay traffic, runs the simulation and
// the default effects of every cancellable event, and fills an outbox of
// frames for the transport to fan out.
//
// The world is single-threaded by construction (bus listeners are `Rc`
// closures) and runs on its own dedicated thread, talking to the async
// transport only through channels.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::pool::{Handle, Pool};
use crate::domain::spawn::SpawnContent;
use crate::domain::state::{AmmoKind, Arrow, Enemy, EnemyKind, PlayerState, Vec2};
use crate::domain::systems::flight::{tick_arrows, FlightConfig, HitTarget};
use crate::domain::tuning::player::PlayerTuning;
use crate::domain::tuning::projectile::{
    arrow_prototypes, collect_amount, enemy_prototypes, ProjectileTuning, ARROW_POOL_CAPACITY,
    ENEMY_POOL_CAPACITY,
};
use crate::domain::tuning::spawner::SpawnerTuning;
use crate::use_cases::bus::{EventBus, GameEvent};
use crate::use_cases::inventory::{apply_op, InventoryReplicator};
use crate::use_cases::replication::ReplicationCoordinator;
use crate::use_cases::spawner::{SpawnCoordinator, SpawnDecision};
use crate::use_cases::types::{NetMessage, RelayFrame, WorldInput, WorldStatus};

pub const SYSTEM_CHAT_COLOR: [u8; 3] = [230, 230, 80];

#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Relay identity used as `from` on frames the host originates.
    pub host_id: u64,
    pub tick_interval: f32,
    pub snapshot_interval: f32,
    pub position_sensitivity: f32,
    pub spawn_seed: u64,
    pub player: PlayerTuning,
    pub projectile: ProjectileTuning,
    pub spawner: SpawnerTuning,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            host_id: 0,
            tick_interval: 1.0 / 30.0,
            snapshot_interval: 0.05,
            position_sensitivity: 0.1,
            spawn_seed: 1,
            player: PlayerTuning::default(),
            projectile: ProjectileTuning::default(),
            spawner: SpawnerTuning::default(),
        }
    }
}

pub struct World {
    config: WorldConfig,
    bus: Rc<EventBus>,
    players: Vec<PlayerState>,
    arrows: Pool<AmmoKind, Arrow>,
    enemies: Pool<EnemyKind, Enemy>,
    /// Spawn slot -> live enemy materialized for it.
    enemy_slots: HashMap<usize, Handle<EnemyKind>>,
    replication: ReplicationCoordinator,
    inventory: InventoryReplicator,
    spawner: SpawnCoordinator,
    paused: bool,
    tick: u64,
    outbox: Vec<RelayFrame>,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        let replication =
            ReplicationCoordinator::new(None, config.position_sensitivity, config.snapshot_interval);
        let spawner = SpawnCoordinator::new(config.spawner, true, config.spawn_seed);
        Self {
            bus: Rc::new(EventBus::new()),
            players: Vec::new(),
            arrows: Pool::new(arrow_prototypes(), ARROW_POOL_CAPACITY),
            enemies: Pool::new(enemy_prototypes(), ENEMY_POOL_CAPACITY),
            enemy_slots: HashMap::new(),
            replication,
            inventory: InventoryReplicator::new(),
            spawner,
            paused: false,
            tick: 0,
            outbox: Vec::new(),
            config,
        }
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn status(&self) -> WorldStatus {
        WorldStatus {
            tick: self.tick,
            players: self.players.len(),
        }
    }

    pub fn drain_outbox(&mut self) -> Vec<RelayFrame> {
        std::mem::take(&mut self.outbox)
    }

    /// Gives the host process its own avatar. Optional; a dedicated relay
    /// runs without one.
    pub fn join_local(&mut self, name: &str) {
        let id = self.config.host_id;
        if self.player_index(id).is_some() {
            return;
        }
        self.players
            .push(PlayerState::new(id, name.to_string(), &self.config.player));
        self.replication.set_local_owner(Some(id));
    }

    fn player_index(&self, id: u64) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    // ---- inbound -----------------------------------------------------------

    pub fn handle_input(&mut self, input: WorldInput) {
        match input {
            WorldInput::Join { peer_id, name } => self.handle_join(peer_id, name),
            WorldInput::Leave { peer_id } => self.handle_leave(peer_id),
            WorldInput::Frame { from, msg } => {
                let relay = self.apply_remote(from, &msg);
                if relay {
                    self.outbox.push(RelayFrame {
                        from,
                        to: None,
                        msg,
                    });
                }
            }
        }
    }

    fn handle_join(&mut self, peer_id: u64, name: String) {
        if self.player_index(peer_id).is_some() {
            warn!(peer_id, "duplicate join ignored");
            return;
        }
        info!(peer_id, name, "player joined");
        self.players
            .push(PlayerState::new(peer_id, name.clone(), &self.config.player));

        // Late-join bootstrap goes only to the newcomer: everyone else's
        // current state plus the whole spawn table.
        let host = self.config.host_id;
        for p in self.players.iter().filter(|p| p.id != peer_id) {
            self.outbox.push(RelayFrame {
                from: host,
                to: Some(peer_id),
                msg: NetMessage::UpdateState {
                    snapshot: p.into(),
                },
            });
            self.outbox.push(RelayFrame {
                from: host,
                to: Some(peer_id),
                msg: NetMessage::QuiverSnapshot {
                    owner: p.id,
                    nodes: p.quiver.nodes().to_vec(),
                    selected: p.quiver.selection_wire(),
                },
            });
        }
        self.outbox.push(RelayFrame {
            from: host,
            to: Some(peer_id),
            msg: NetMessage::SpawnTableSync {
                records: self.spawner.full_table(),
            },
        });

        self.system_chat(format!("{name} joined the arena"));
    }

    fn handle_leave(&mut self, peer_id: u64) {
        let Some(idx) = self.player_index(peer_id) else {
            return;
        };
        let name = self.players.remove(idx).name;
        self.inventory.forget(peer_id);
        info!(peer_id, name, "player left");
        self.system_chat(format!("{name} left the arena"));
    }

    /// Applies one peer frame. Returns whether the frame should fan out to
    /// the other peers.
    fn apply_remote(&mut self, from: u64, msg: &NetMessage) -> bool {
        match msg {
            NetMessage::UpdateState { snapshot } => {
                if let Some(applied) = self.replication.apply(&mut self.players, &self.bus, snapshot)
                {
                    self.apply_player_delta(applied.owner, applied.health_delta, None);
                }
                true
            }
            NetMessage::Shoot {
                owner,
                origin,
                direction,
                ammo_kind,
            } => {
                let mut ev = GameEvent::Shoot {
                    shooter: *owner,
                    origin: *origin,
                    direction: *direction,
                    ammo_kind: *ammo_kind,
                    cancelled: false,
                };
                self.bus.publish(&mut ev);
                if ev.is_cancelled() {
                    return false;
                }
                self.spawn_arrow(*owner, *origin, *direction, *ammo_kind);
                true
            }
            NetMessage::InventoryOp { owner, op } => {
                if let Some(idx) = self.player_index(*owner) {
                    let before = self.players[idx].quiver.selection_wire();
                    apply_op(&mut self.players[idx].quiver, op);
                    if self.players[idx].quiver.selection_wire() != before {
                        let mut ev = GameEvent::SelectionChanged {
                            owner: *owner,
                            kind: self.players[idx].quiver.selected_kind(),
                        };
                        self.bus.publish(&mut ev);
                    }
                } else {
                    debug!(owner, "inventory op for unknown player dropped");
                }
                true
            }
            NetMessage::QuiverSnapshot {
                owner,
                nodes,
                selected,
            } => {
                if let Some(idx) = self.player_index(*owner) {
                    self.players[idx].quiver.restore(nodes.clone(), *selected);
                }
                true
            }
            NetMessage::SpawnSync {
                slot,
                content,
                active,
            } => {
                if *active {
                    // Activations are the spawn decider's call alone; only a
                    // mirroring world reflects them. A deactivation is the
                    // collection reverse-path and is accepted from anyone.
                    if self.spawner.is_authoritative() {
                        debug!(from, slot, "peer spawn activation dropped");
                        return false;
                    }
                    if let Some(decision) = self.spawner.apply_sync(*slot, *content, true) {
                        self.materialize(decision);
                    }
                } else {
                    self.spawner.collect(*slot);
                    self.dematerialize(*slot);
                }
                true
            }
            NetMessage::SpawnTableSync { records } => {
                // The host decides spawns itself; a table claimed by a peer
                // is dropped rather than trusted.
                if !self.spawner.is_authoritative() {
                    for decision in self.spawner.apply_table(records) {
                        self.materialize(decision);
                    }
                }
                false
            }
            NetMessage::Chat { text, color } => {
                let mut ev = GameEvent::ChatSent {
                    text: text.clone(),
                    color: *color,
                    cancelled: false,
                };
                self.bus.publish(&mut ev);
                if ev.is_cancelled() {
                    debug!(from, "chat line suppressed");
                    return false;
                }
                true
            }
        }
    }

    // ---- local actions -----------------------------------------------------

    /// Fires the selected ammo from the local avatar. False when the shot
    /// could not happen: dead, cooling down, empty quiver, vetoed, or the
    /// projectile pool is dry. A skipped shot never spends ammo.
    pub fn local_shoot(&mut self, direction: Vec2) -> bool {
        let Some(owner) = self.replication.local_owner() else {
            return false;
        };
        let Some(idx) = self.player_index(owner) else {
            return false;
        };
        let (alive, cooldown, origin, kind) = {
            let p = &self.players[idx];
            (p.alive, p.shoot_cooldown, p.pos, p.quiver.selected_kind())
        };
        if !alive || cooldown > 0.0 {
            return false;
        }
        let Some(kind) = kind else {
            return false;
        };
        if self.arrows.active_count(kind) >= self.arrows.capacity() {
            return false;
        }

        let mut ev = GameEvent::Shoot {
            shooter: owner,
            origin,
            direction,
            ammo_kind: kind,
            cancelled: false,
        };
        self.bus.publish(&mut ev);
        if ev.is_cancelled() {
            return false;
        }

        let Some((spent, change)) = self.players[idx].quiver.consume_selected() else {
            return false;
        };
        self.players[idx].shoot_cooldown = self.config.player.shoot_cooldown;
        self.spawn_arrow(owner, origin, direction, spent);

        if change.selection_changed {
            let mut ev = GameEvent::SelectionChanged {
                owner,
                kind: self.players[idx].quiver.selected_kind(),
            };
            self.bus.publish(&mut ev);
        }

        let op = self
            .inventory
            .reconcile(owner, &self.players[idx].quiver, change);
        self.outbox.push(RelayFrame {
            from: owner,
            to: None,
            msg: NetMessage::Shoot {
                owner,
                origin,
                direction,
                ammo_kind: spent,
            },
        });
        self.outbox.push(RelayFrame {
            from: owner,
            to: None,
            msg: NetMessage::InventoryOp { owner, op },
        });
        true
    }

    /// Claims an active ammo drop for the local avatar.
    pub fn local_collect(&mut self, slot: usize) -> bool {
        let Some(owner) = self.replication.local_owner() else {
            return false;
        };
        let Some(idx) = self.player_index(owner) else {
            return false;
        };
        let Some(record) = self.spawner.table().get(slot) else {
            return false;
        };
        if !record.active {
            return false;
        }
        let Some(content @ SpawnContent::Ammo(kind)) = record.content else {
            return false;
        };

        let mut ev = GameEvent::ItemCollected {
            collector: owner,
            slot,
            content,
            cancelled: false,
        };
        self.bus.publish(&mut ev);
        if ev.is_cancelled() {
            // The drop stays where it is.
            return false;
        }

        self.spawner.collect(slot);
        let change = self.players[idx].quiver.collect(kind, collect_amount(kind));
        if change.selection_changed {
            let mut ev = GameEvent::SelectionChanged {
                owner,
                kind: self.players[idx].quiver.selected_kind(),
            };
            self.bus.publish(&mut ev);
        }
        let op = self
            .inventory
            .reconcile(owner, &self.players[idx].quiver, change);

        self.outbox.push(RelayFrame {
            from: owner,
            to: None,
            msg: NetMessage::SpawnSync {
                slot,
                content,
                active: false,
            },
        });
        self.outbox.push(RelayFrame {
            from: owner,
            to: None,
            msg: NetMessage::InventoryOp { owner, op },
        });
        true
    }

    /// Advances the local avatar's selection to the next quiver node.
    pub fn local_cycle_selection(&mut self) -> bool {
        let Some(owner) = self.replication.local_owner() else {
            return false;
        };
        let Some(idx) = self.player_index(owner) else {
            return false;
        };
        if !self.players[idx].quiver.cycle_next() {
            return false;
        }
        let mut ev = GameEvent::SelectionChanged {
            owner,
            kind: self.players[idx].quiver.selected_kind(),
        };
        self.bus.publish(&mut ev);
        true
    }

    /// Sends a player chat line; listeners may suppress it before it leaves.
    pub fn local_chat(&mut self, text: String, color: [u8; 3]) -> bool {
        let mut ev = GameEvent::ChatSent {
            text: text.clone(),
            color,
            cancelled: false,
        };
        self.bus.publish(&mut ev);
        if ev.is_cancelled() {
            return false;
        }
        self.outbox.push(RelayFrame {
            from: self.config.host_id,
            to: None,
            msg: NetMessage::Chat { text, color },
        });
        true
    }

    /// Announcements from the world itself skip the suppression event.
    pub fn system_chat(&mut self, text: String) {
        self.outbox.push(RelayFrame {
            from: self.config.host_id,
            to: None,
            msg: NetMessage::Chat {
                text,
                color: SYSTEM_CHAT_COLOR,
            },
        });
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.spawner.set_running(!self.paused);
        let mut ev = GameEvent::PauseToggled {
            paused: self.paused,
        };
        self.bus.publish(&mut ev);
        self.paused
    }

    // ---- simulation --------------------------------------------------------

    pub fn tick(&mut self, dt: f32) {
        self.tick = self.tick.wrapping_add(1);
        if self.paused {
            return;
        }

        self.tick_timers(dt);
        self.tick_flight(dt);

        if let Some(decision) = self.spawner.tick(dt, &self.bus) {
            self.materialize(decision);
            self.outbox.push(RelayFrame {
                from: self.config.host_id,
                to: None,
                msg: NetMessage::SpawnSync {
                    slot: decision.slot,
                    content: decision.content,
                    active: true,
                },
            });
        }

        if self.replication.should_send(dt) {
            if let Some(snapshot) = self.replication.build(&self.players) {
                self.outbox.push(RelayFrame {
                    from: snapshot.owner,
                    to: None,
                    msg: NetMessage::UpdateState { snapshot },
                });
            }
        }
    }

    fn tick_timers(&mut self, dt: f32) {
        let mut due = Vec::new();
        for (idx, p) in self.players.iter_mut().enumerate() {
            if p.shoot_cooldown > 0.0 {
                p.shoot_cooldown -= dt;
            }
            if !p.alive {
                p.respawn_timer -= dt;
                if p.respawn_timer <= 0.0 {
                    due.push(idx);
                }
            }
        }
        for idx in due {
            let player = self.players[idx].id;
            let mut ev = GameEvent::PlayerRespawn {
                player,
                cancelled: false,
            };
            self.bus.publish(&mut ev);
            if ev.is_cancelled() {
                // Denied; the timer rearms for another attempt.
                self.players[idx].respawn_timer = self.config.player.respawn_seconds;
                continue;
            }
            self.players[idx].reset_values(&self.config.player);
            info!(player, "respawned");
        }
    }

    fn tick_flight(&mut self, dt: f32) {
        let cfg = FlightConfig {
            player_radius: self.config.player.radius,
            arrow_radius: self.config.projectile.radius,
        };
        let hits = tick_arrows(&mut self.arrows, &self.players, &self.enemies, dt, cfg);
        for hit in hits {
            // The arrow stops on contact whether or not the hit counts.
            self.arrows.release(hit.arrow);

            let mut ev = GameEvent::HitLanded {
                shooter: hit.shooter,
                target: hit.target,
                ammo_kind: hit.ammo_kind,
                damage: hit.damage,
                cancelled: false,
            };
            self.bus.publish(&mut ev);
            if ev.is_cancelled() {
                continue;
            }
            match hit.target {
                HitTarget::Player(id) => {
                    self.apply_player_delta(id, -hit.damage, Some(hit.shooter));
                }
                HitTarget::Enemy(handle) => {
                    self.apply_enemy_damage(handle, -hit.damage, Some(hit.shooter));
                }
            }
        }
    }

    /// Routes a signed health change through the death default effect. Both
    /// combat damage and snapshot-reported deltas funnel through here.
    fn apply_player_delta(&mut self, owner: u64, delta: i32, killer: Option<u64>) {
        if delta == 0 {
            return;
        }
        let Some(idx) = self.player_index(owner) else {
            return;
        };
        self.players[idx].health.apply_delta(delta);
        if !self.players[idx].health.is_depleted() || !self.players[idx].alive {
            return;
        }

        let mut ev = GameEvent::EntityDeath {
            victim: HitTarget::Player(owner),
            killer,
            cancelled: false,
        };
        self.bus.publish(&mut ev);
        let p = &mut self.players[idx];
        if ev.is_cancelled() {
            // Spared at the brink: left standing with a sliver of health.
            p.health.current = 1;
            return;
        }
        p.alive = false;
        p.respawn_timer = self.config.player.respawn_seconds;
        info!(player = owner, killer, "player down");
    }

    fn apply_enemy_damage(&mut self, handle: Handle<EnemyKind>, delta: i32, killer: Option<u64>) {
        let (depleted, slot) = match self.enemies.get_mut(handle) {
            Some(enemy) => {
                enemy.health.apply_delta(delta);
                (enemy.health.is_depleted(), enemy.slot)
            }
            None => return,
        };
        if !depleted {
            return;
        }

        let mut ev = GameEvent::EntityDeath {
            victim: HitTarget::Enemy(handle),
            killer,
            cancelled: false,
        };
        self.bus.publish(&mut ev);
        if ev.is_cancelled() {
            if let Some(enemy) = self.enemies.get_mut(handle) {
                enemy.health.current = 1;
            }
            return;
        }

        self.enemies.release(handle);
        if let Some(slot) = slot {
            self.enemy_slots.remove(&slot);
            if let Some(content) = self.spawner.collect(slot) {
                self.outbox.push(RelayFrame {
                    from: self.config.host_id,
                    to: None,
                    msg: NetMessage::SpawnSync {
                        slot,
                        content,
                        active: false,
                    },
                });
            }
        }
        info!(?handle, killer, "enemy down");
    }

    fn spawn_arrow(&mut self, owner: u64, origin: Vec2, direction: Vec2, kind: AmmoKind) -> bool {
        let Some(handle) = self.arrows.checkout(kind) else {
            return false;
        };
        if let Some(arrow) = self.arrows.get_mut(handle) {
            arrow.owner = owner;
            arrow.pos = origin;
            arrow.vel = direction.normalized().scaled(arrow.speed);
        }
        true
    }

    fn materialize(&mut self, decision: SpawnDecision) {
        let SpawnContent::Enemy(kind) = decision.content else {
            return;
        };
        let Some(handle) = self.enemies.checkout(kind) else {
            // Table says occupied, pool says full; the slot simply has no
            // body until it frees up.
            warn!(slot = decision.slot, ?kind, "enemy pool dry, spawn not materialized");
            return;
        };
        if let Some(enemy) = self.enemies.get_mut(handle) {
            enemy.slot = Some(decision.slot);
        }
        self.enemy_slots.insert(decision.slot, handle);
    }

    fn dematerialize(&mut self, slot: usize) {
        if let Some(handle) = self.enemy_slots.remove(&slot) {
            self.enemies.release(handle);
        }
    }
}

/// Blocking world loop meant for a dedicated thread. Exits when the input
/// channel closes.
pub fn run_world_loop(
    config: WorldConfig,
    mut inputs: mpsc::Receiver<WorldInput>,
    frames: broadcast::Sender<RelayFrame>,
    status: watch::Sender<WorldStatus>,
) {
    let interval = Duration::from_secs_f32(config.tick_interval);
    let dt = config.tick_interval;
    let mut world = World::new(config);
    info!("world loop started");

    loop {
        std::thread::sleep(interval);
        loop {
            match inputs.try_recv() {
                Ok(input) => world.handle_input(input),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("input channel closed, world loop stopping");
                    return;
                }
            }
        }
        world.tick(dt);
        for frame in world.drain_outbox() {
            // No connected peers is fine; the frame just evaporates.
            let _ = frames.send(frame);
        }
        let _ = status.send(world.status());
    }
}
