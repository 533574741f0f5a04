use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{broadcast, mpsc, watch};

use crate::use_cases::{WorldInput, WorldStatus};

/// One serialized relay frame plus the routing the serializer preserved so
/// each connection can filter without re-parsing.
#[derive(Debug, Clone)]
pub struct FrameBytes {
    pub from: u64,
    pub to: Option<u64>,
    pub bytes: Utf8Bytes,
}

#[derive(Clone)]
pub struct AppState {
    // Inputs flowing from connections into the world loop.
    pub input_tx: mpsc::Sender<WorldInput>,
    // Serialized relay frames, shared across all connections.
    pub frame_bytes_tx: broadcast::Sender<FrameBytes>,
    // World counters for the status endpoint.
    pub status_rx: watch::Receiver<WorldStatus>,
    // Live socket count, also for the status endpoint.
    pub connections: Arc<AtomicUsize>,
}
