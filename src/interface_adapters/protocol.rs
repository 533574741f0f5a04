// Wire protocol DTOs and conversions for relay messages.
// Domain structs never serialize directly; everything crossing the socket
// goes through these shapes.

use serde::{Deserialize, Serialize};

use crate::domain::quiver::QuiverNode;
use crate::domain::spawn::SpawnContent;
use crate::domain::state::{AmmoKind, PlayerSnapshot, Vec2};
use crate::use_cases::inventory::QuiverOp;
use crate::use_cases::types::{NetMessage, SpawnSlotSync};

/// Messages a client sends to the relay over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    // Initial handshake with identity metadata.
    Join(JoinPayload),
    // Relay traffic sent after a successful Join.
    Frame(NetMessageDto),
}

/// Messages the relay sends to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    // Assigned identity for the connection after Join is accepted.
    Welcome { peer_id: u64 },
    // A frame originated by `from`, fanned out or targeted.
    Frame { from: u64, msg: NetMessageDto },
}

/// Payload for the Join handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinPayload {
    pub display_name: String,
}

/// One relayed game message. Mirrors `NetMessage` field for field, with the
/// vector payloads flattened for wire transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum NetMessageDto {
    UpdateState(PlayerSnapshotDto),
    Shoot(ShootDto),
    InventoryOp(InventoryOpDto),
    QuiverSnapshot(QuiverSnapshotDto),
    SpawnSync(SpawnSyncDto),
    SpawnTableSync { records: Vec<SpawnSyncDto> },
    Chat(ChatDto),
}

/// Flattened per-tick avatar snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlayerSnapshotDto {
    pub owner: u64,
    pub hp: i32,
    pub pos_x: f32,
    pub pos_y: f32,
    pub aim_x: f32,
    pub aim_y: f32,
    /// Selected quiver index, -1 meaning none.
    pub selected: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShootDto {
    pub owner: u64,
    pub origin_x: f32,
    pub origin_y: f32,
    pub dir_x: f32,
    pub dir_y: f32,
    pub ammo_kind: AmmoKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InventoryOpDto {
    pub owner: u64,
    pub op: QuiverOp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuiverSnapshotDto {
    pub owner: u64,
    pub nodes: Vec<QuiverNode>,
    pub selected: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpawnSyncDto {
    pub slot: usize,
    pub content: SpawnContent,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDto {
    pub text: String,
    pub color: [u8; 3],
}

impl From<&PlayerSnapshot> for PlayerSnapshotDto {
    fn from(snapshot: &PlayerSnapshot) -> Self {
        Self {
            owner: snapshot.owner,
            hp: snapshot.hp,
            pos_x: snapshot.pos.x,
            pos_y: snapshot.pos.y,
            aim_x: snapshot.aim.x,
            aim_y: snapshot.aim.y,
            selected: snapshot.selected,
        }
    }
}

impl From<PlayerSnapshotDto> for PlayerSnapshot {
    fn from(dto: PlayerSnapshotDto) -> Self {
        Self {
            owner: dto.owner,
            hp: dto.hp,
            pos: Vec2::new(dto.pos_x, dto.pos_y),
            aim: Vec2::new(dto.aim_x, dto.aim_y),
            selected: dto.selected,
        }
    }
}

impl From<&NetMessage> for NetMessageDto {
    fn from(msg: &NetMessage) -> Self {
        match msg {
            NetMessage::UpdateState { snapshot } => {
                NetMessageDto::UpdateState(PlayerSnapshotDto::from(snapshot))
            }
            NetMessage::Shoot {
                owner,
                origin,
                direction,
                ammo_kind,
            } => NetMessageDto::Shoot(ShootDto {
                owner: *owner,
                origin_x: origin.x,
                origin_y: origin.y,
                dir_x: direction.x,
                dir_y: direction.y,
                ammo_kind: *ammo_kind,
            }),
            NetMessage::InventoryOp { owner, op } => NetMessageDto::InventoryOp(InventoryOpDto {
                owner: *owner,
                op: *op,
            }),
            NetMessage::QuiverSnapshot {
                owner,
                nodes,
                selected,
            } => NetMessageDto::QuiverSnapshot(QuiverSnapshotDto {
                owner: *owner,
                nodes: nodes.clone(),
                selected: *selected,
            }),
            NetMessage::SpawnSync {
                slot,
                content,
                active,
            } => NetMessageDto::SpawnSync(SpawnSyncDto {
                slot: *slot,
                content: *content,
                active: *active,
            }),
            NetMessage::SpawnTableSync { records } => NetMessageDto::SpawnTableSync {
                records: records
                    .iter()
                    .map(|r| SpawnSyncDto {
                        slot: r.slot,
                        content: r.content,
                        active: r.active,
                    })
                    .collect(),
            },
            NetMessage::Chat { text, color } => NetMessageDto::Chat(ChatDto {
                text: text.clone(),
                color: *color,
            }),
        }
    }
}

impl From<NetMessageDto> for NetMessage {
    fn from(dto: NetMessageDto) -> Self {
        match dto {
            NetMessageDto::UpdateState(snapshot) => NetMessage::UpdateState {
                snapshot: snapshot.into(),
            },
            NetMessageDto::Shoot(shoot) => NetMessage::Shoot {
                owner: shoot.owner,
                origin: Vec2::new(shoot.origin_x, shoot.origin_y),
                direction: Vec2::new(shoot.dir_x, shoot.dir_y),
                ammo_kind: shoot.ammo_kind,
            },
            NetMessageDto::InventoryOp(inv) => NetMessage::InventoryOp {
                owner: inv.owner,
                op: inv.op,
            },
            NetMessageDto::QuiverSnapshot(q) => NetMessage::QuiverSnapshot {
                owner: q.owner,
                nodes: q.nodes,
                selected: q.selected,
            },
            NetMessageDto::SpawnSync(s) => NetMessage::SpawnSync {
                slot: s.slot,
                content: s.content,
                active: s.active,
            },
            NetMessageDto::SpawnTableSync { records } => NetMessage::SpawnTableSync {
                records: records
                    .into_iter()
                    .map(|r| SpawnSlotSync {
                        slot: r.slot,
                        content: r.content,
                        active: r.active,
                    })
                    .collect(),
            },
            NetMessageDto::Chat(chat) => NetMessage::Chat {
                text: chat.text,
                color: chat.color,
            },
        }
    }
}
