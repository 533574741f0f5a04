use std::{env, time::Duration};

// Runtime/server constants (not gameplay tuning).

pub fn http_port() -> u16 {
    env::var("ARENA_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3003)
}

pub const INPUT_CHANNEL_CAPACITY: usize = 1024;
pub const FRAME_BROADCAST_CAPACITY: usize = 128;

pub const TICK_INTERVAL: Duration = Duration::from_millis(1000 / 30);
// How often each participant ships its avatar snapshot.
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(50);
// Mirrored positions follow a snapshot only past this distance.
pub const POSITION_SENSITIVITY: f32 = 0.1;
