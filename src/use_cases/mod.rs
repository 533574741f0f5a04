// Use-case layer: coordination logic between the domain and the transport.

pub mod bus;
pub mod inventory;
pub mod replication;
pub mod spawner;
pub mod types;
pub mod world;

pub use bus::{EventBus, EventKind, GameEvent, ListenerId};
pub use inventory::{apply_op, InventoryReplicator, QuiverOp};
pub use replication::ReplicationCoordinator;
pub use spawner::{SpawnCoordinator, SpawnDecision};
pub use types::{NetMessage, RelayFrame, SpawnSlotSync, WorldInput, WorldStatus};
pub use world::{run_world_loop, World, WorldConfig};
