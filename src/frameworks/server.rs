// Framework bootstrap for the relay runtime.

use crate::frameworks::config;
use crate::interface_adapters::net::{frame_serializer, status_handler, ws_handler};
use crate::interface_adapters::state::{AppState, FrameBytes};
use crate::interface_adapters::utils::rng::rand_id;
use crate::use_cases::{run_world_loop, RelayFrame, WorldConfig, WorldInput, WorldStatus};

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::io::Result;
use tokio::sync::{broadcast, mpsc, watch};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state()?;

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/status", get(status_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn build_state() -> Result<Arc<AppState>> {
    // Setup Channels
    // input_tx/rx: all client frames go to the single world loop.
    let (input_tx, input_rx) = mpsc::channel::<WorldInput>(config::INPUT_CHANNEL_CAPACITY);

    // frames_tx/rx: relay frames produced by the world loop.
    let (frames_tx, _frames_rx) = broadcast::channel::<RelayFrame>(config::FRAME_BROADCAST_CAPACITY);

    // frame_bytes_tx/rx: serialized frames shared across all connections.
    let (frame_bytes_tx, _frame_bytes_rx) =
        broadcast::channel::<FrameBytes>(config::FRAME_BROADCAST_CAPACITY);

    let (status_tx, status_rx) = watch::channel::<WorldStatus>(WorldStatus::default());

    let world_config = WorldConfig {
        host_id: rand_id(),
        tick_interval: config::TICK_INTERVAL.as_secs_f32(),
        snapshot_interval: config::SNAPSHOT_INTERVAL.as_secs_f32(),
        position_sensitivity: config::POSITION_SENSITIVITY,
        spawn_seed: rand_id(),
        ..WorldConfig::default()
    };

    // The world holds !Send listener state, so it gets its own OS thread
    // rather than a tokio task.
    let world_frames_tx = frames_tx.clone();
    let _world_thread = std::thread::Builder::new()
        .name("world".to_string())
        .spawn(move || run_world_loop(world_config, input_rx, world_frames_tx, status_tx))?;

    // Frames serialize once in the adapter layer and fan out as shared bytes.
    tokio::spawn(frame_serializer(frames_tx.subscribe(), frame_bytes_tx.clone()));

    Ok(Arc::new(AppState {
        input_tx,
        frame_bytes_tx,
        status_rx,
        connections: Arc::new(AtomicUsize::new(0)),
    }))
}
