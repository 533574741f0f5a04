// Relay-level inputs/outputs shared by the world loop and the transport.

use crate::domain::quiver::QuiverNode;
use crate::domain::spawn::SpawnContent;
use crate::domain::state::{AmmoKind, PlayerSnapshot, Vec2};
use crate::use_cases::inventory::QuiverOp;

/// Fire-and-forget messages exchanged between participants through the
/// host-relay. Delivery is at-most-once with no retry; every message is
/// designed to be safe to lose and safe to apply twice where noted.
#[derive(Debug, Clone)]
pub enum NetMessage {
    /// Periodic state snapshot; idempotent to apply.
    UpdateState { snapshot: PlayerSnapshot },
    /// Discrete one-shot action; receivers simulate the flight themselves.
    Shoot {
        owner: u64,
        origin: Vec2,
        direction: Vec2,
        ammo_kind: AmmoKind,
    },
    /// Indexed inventory reconciliation from the authoritative owner.
    InventoryOp { owner: u64, op: QuiverOp },
    /// Full-sequence inventory bootstrap for late joiners.
    QuiverSnapshot {
        owner: u64,
        nodes: Vec<QuiverNode>,
        selected: i32,
    },
    /// One spawn slot's occupant changed.
    SpawnSync {
        slot: usize,
        content: SpawnContent,
        active: bool,
    },
    /// Whole spawn table for late joiners.
    SpawnTableSync { records: Vec<SpawnSlotSync> },
    /// Relayed chat line.
    Chat { text: String, color: [u8; 3] },
}

/// One row of a late-join spawn table sync.
#[derive(Debug, Clone, Copy)]
pub struct SpawnSlotSync {
    pub slot: usize,
    pub content: SpawnContent,
    pub active: bool,
}

/// An outbound message with routing: `to == None` fans out to every peer
/// except `from`; `to == Some(peer)` reaches only that peer.
#[derive(Debug, Clone)]
pub struct RelayFrame {
    pub from: u64,
    pub to: Option<u64>,
    pub msg: NetMessage,
}

/// Inputs drained by the world loop at a fixed point in each tick.
#[derive(Debug, Clone)]
pub enum WorldInput {
    Join { peer_id: u64, name: String },
    Leave { peer_id: u64 },
    Frame { from: u64, msg: NetMessage },
}

/// Point-in-time counters published for the status endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldStatus {
    pub tick: u64,
    pub players: usize,
}
