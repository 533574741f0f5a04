use crate::interface_adapters::protocol::{
    ClientMessage, JoinPayload, NetMessageDto, ServerMessage,
};
use crate::interface_adapters::state::{AppState, FrameBytes};
use crate::interface_adapters::utils::rng::rand_id;
use crate::use_cases::{NetMessage, RelayFrame, WorldInput, WorldStatus};

use axum::{
    Json,
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::SinkExt;
use std::{
    sync::Arc,
    sync::atomic::Ordering,
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{Instrument, debug, error, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    InputClosed,
    FramesClosed,
    JoinRequired,
    JoinTimeout,
    ClosedBeforeJoin,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const MAX_DISPLAY_NAME_LEN: usize = 32;
const MAX_CHAT_LEN: usize = 256;
const JOIN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Serializes each relay frame once and broadcasts the shared bytes together
/// with its routing, so per-connection filtering never re-encodes.
pub async fn frame_serializer(
    mut frames_rx: broadcast::Receiver<RelayFrame>,
    frame_bytes_tx: broadcast::Sender<FrameBytes>,
) {
    loop {
        match frames_rx.recv().await {
            Ok(frame) => {
                let msg = ServerMessage::Frame {
                    from: frame.from,
                    msg: NetMessageDto::from(&frame.msg),
                };
                let txt = match serde_json::to_string(&msg) {
                    Ok(txt) => txt,
                    Err(e) => {
                        error!(error = ?e, "failed to serialize relay frame");
                        continue;
                    }
                };
                let _ = frame_bytes_tx.send(FrameBytes {
                    from: frame.from,
                    to: frame.to,
                    bytes: Utf8Bytes::from(txt),
                });
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "frame serializer lagged; skipping to latest");
            }
            Err(broadcast::error::RecvError::Closed) => {
                warn!("relay frame channel closed; serializer exiting");
                break;
            }
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        // Separate connection id for correlating logs before a peer_id exists.
        let conn_id = rand_id();
        let span = info_span!("conn", conn_id, peer_id = tracing::field::Empty);
        handle_socket(socket, state).instrument(span)
    })
}

/// Counters published at `/status`.
#[derive(Debug, serde::Serialize)]
pub struct StatusDto {
    pub tick: u64,
    pub players: usize,
    pub connections: usize,
}

pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusDto> {
    let WorldStatus { tick, players } = *state.status_rx.borrow();
    Json(StatusDto {
        tick,
        players,
        connections: state.connections.load(Ordering::Relaxed),
    })
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut ctx = match bootstrap_connection(&mut socket, &state).await {
        Ok(ctx) => ctx,
        Err(NetError::ClosedBeforeJoin) => {
            info!("client disconnected before join handshake");
            return;
        }
        Err(e) => {
            error!(error = ?e, "failed to bootstrap connection");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "bootstrap failed".into(),
                })))
                .await;
            let _ = socket.close().await;
            return;
        }
    };

    state.connections.fetch_add(1, Ordering::Relaxed);
    tracing::Span::current().record("peer_id", ctx.peer_id);
    info!(
        peer_id = ctx.peer_id,
        display_name = %ctx.display_name,
        "client connected"
    );

    if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
        warn!(error = ?e, "client loop exited with error");
    }
    state.connections.fetch_sub(1, Ordering::Relaxed);
}

struct ConnCtx {
    pub peer_id: u64,
    pub display_name: String,
    pub input_tx: mpsc::Sender<WorldInput>,
    pub frame_bytes_rx: broadcast::Receiver<FrameBytes>,

    pub msgs_in: u64,
    pub msgs_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,

    pub invalid_json: u32,

    pub last_input_full_log: Instant,
    pub last_frame_lag_log: Instant,
    pub last_invalid_input_log: Instant,

    pub close_frame: Option<CloseFrame>,
}

async fn bootstrap_connection(
    socket: &mut WebSocket,
    state: &Arc<AppState>,
) -> Result<ConnCtx, NetError> {
    // Subscribe *before* any await so no frame between handshake and loop is
    // missed; the world's targeted bootstrap arrives on this channel.
    let frame_bytes_rx = state.frame_bytes_tx.subscribe();

    let join = match timeout(JOIN_HANDSHAKE_TIMEOUT, read_join_handshake(socket)).await {
        Ok(result) => result?,
        Err(_) => {
            let _ = send_close_with_reason(socket, close_code::POLICY, "join timeout").await;
            return Err(NetError::JoinTimeout);
        }
    };

    // Identity is assigned here, not claimed by the client.
    let peer_id = rand_id();
    let display_name = sanitize_display_name(&join.display_name);

    // Tell the client who it is before any frames reference it.
    send_message(socket, &ServerMessage::Welcome { peer_id }).await?;

    // Join happens after Welcome so the late-join bootstrap the world emits
    // can be targeted at an id the client already knows.
    state
        .input_tx
        .send(WorldInput::Join {
            peer_id,
            name: display_name.clone(),
        })
        .await
        .map_err(|_| NetError::InputClosed)?;

    let now = Instant::now() - LOG_THROTTLE;
    Ok(ConnCtx {
        peer_id,
        display_name,
        input_tx: state.input_tx.clone(),
        frame_bytes_rx,

        msgs_in: 1,
        msgs_out: 1,
        bytes_in: join.bytes_in,
        bytes_out: 0,

        invalid_json: 0,

        last_input_full_log: now,
        last_frame_lag_log: now,
        last_invalid_input_log: now,

        close_frame: None,
    })
}

struct JoinHandshake {
    display_name: String,
    bytes_in: u64,
}

async fn read_join_handshake(socket: &mut WebSocket) -> Result<JoinHandshake, NetError> {
    loop {
        let Some(incoming) = socket.recv().await else {
            return Err(NetError::ClosedBeforeJoin);
        };

        let message = incoming.map_err(NetError::Ws)?;
        match message {
            Message::Text(text) => {
                let bytes_in = text.len() as u64;
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Join(JoinPayload { display_name })) => {
                        return Ok(JoinHandshake {
                            display_name,
                            bytes_in,
                        });
                    }
                    Ok(ClientMessage::Frame(_)) | Err(_) => {
                        let _ = send_close_with_reason(socket, close_code::POLICY, "join required")
                            .await;
                        return Err(NetError::JoinRequired);
                    }
                }
            }
            Message::Binary(_) => {
                let _ = send_close_with_reason(
                    socket,
                    close_code::UNSUPPORTED,
                    "binary messages not supported",
                )
                .await;
                return Err(NetError::JoinRequired);
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Err(NetError::ClosedBeforeJoin),
        }
    }
}

fn sanitize_display_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return "archer".to_string();
    }
    trimmed.chars().take(MAX_DISPLAY_NAME_LEN).collect()
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
        .map_err(NetError::Ws)?;
    socket.close().await.map_err(NetError::Ws)
}

enum LoopControl {
    Continue,
    Disconnect,
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

/// Validates an inbound frame and stamps the sender's identity onto it, so a
/// client can never speak for another peer.
fn sanitize_frame(peer_id: u64, msg: NetMessage) -> Option<NetMessage> {
    let finite = |v: crate::domain::state::Vec2| v.x.is_finite() && v.y.is_finite();
    match msg {
        NetMessage::UpdateState { mut snapshot } => {
            if !finite(snapshot.pos) || !finite(snapshot.aim) {
                return None;
            }
            snapshot.owner = peer_id;
            Some(NetMessage::UpdateState { snapshot })
        }
        NetMessage::Shoot {
            origin,
            direction,
            ammo_kind,
            ..
        } => {
            if !finite(origin) || !finite(direction) {
                return None;
            }
            Some(NetMessage::Shoot {
                owner: peer_id,
                origin,
                direction,
                ammo_kind,
            })
        }
        NetMessage::InventoryOp { op, .. } => Some(NetMessage::InventoryOp { owner: peer_id, op }),
        NetMessage::QuiverSnapshot {
            nodes, selected, ..
        } => Some(NetMessage::QuiverSnapshot {
            owner: peer_id,
            nodes,
            selected,
        }),
        NetMessage::SpawnSync {
            slot,
            content,
            active,
        } => Some(NetMessage::SpawnSync {
            slot,
            content,
            active,
        }),
        // Peers never dictate the whole table; the world drops it anyway.
        NetMessage::SpawnTableSync { records } => Some(NetMessage::SpawnTableSync { records }),
        NetMessage::Chat { mut text, color } => {
            if text.chars().count() > MAX_CHAT_LEN {
                text = text.chars().take(MAX_CHAT_LEN).collect();
            }
            Some(NetMessage::Chat { text, color })
        }
    }
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let peer_id = ctx.peer_id;

    // Split borrows so `tokio::select!` can hold them concurrently.
    let ConnCtx {
        input_tx,
        frame_bytes_rx,
        msgs_in,
        msgs_out,
        bytes_in,
        bytes_out,
        invalid_json,
        last_input_full_log,
        last_frame_lag_log,
        last_invalid_input_log,
        close_frame,
        ..
    } = ctx;

    let mut fatal: Option<NetError> = None;

    loop {
        let disconnect: bool = tokio::select! {
            incoming = socket.recv() => {
                match handle_incoming_ws(
                    incoming,
                    peer_id,
                    input_tx,
                    msgs_in,
                    bytes_in,
                    invalid_json,
                    last_input_full_log,
                    last_invalid_input_log,
                    close_frame,
                ) {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            frame = frame_bytes_rx.recv() => {
                match frame {
                    Ok(frame) => {
                        // Routing filter: targeted frames only for their
                        // addressee; broadcast frames skip their originator.
                        let deliver = match frame.to {
                            Some(to) => to == peer_id,
                            None => frame.from != peer_id,
                        };
                        if deliver {
                            match forward_frame_bytes(frame.bytes, socket, msgs_out, bytes_out).await {
                                LoopControl::Continue => false,
                                LoopControl::Disconnect => true,
                            }
                        } else {
                            false
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Frames are safe to lose; the next snapshots and
                        // syncs re-converge the client.
                        if should_log(last_frame_lag_log) {
                            warn!(peer_id, missed = n, "relay frames lagged; dropped");
                        }
                        false
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        fatal = Some(NetError::FramesClosed);
                        true
                    }
                }
            }
        };

        if disconnect {
            if let Some(frame) = close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    if let Err(e) = disconnect_cleanup(
        peer_id,
        input_tx,
        *msgs_in,
        *msgs_out,
        *bytes_in,
        *bytes_out,
        *invalid_json,
    )
    .await
    {
        warn!(error = ?e, "error during disconnect cleanup");
        if fatal.is_none() {
            fatal = Some(e);
        }
    }

    if let Some(err) = fatal {
        Err(err)
    } else {
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_incoming_ws(
    incoming: Option<Result<Message, axum::Error>>,
    peer_id: u64,
    input_tx: &mpsc::Sender<WorldInput>,
    msgs_in: &mut u64,
    bytes_in: &mut u64,
    invalid_json: &mut u32,
    last_input_full_log: &mut Instant,
    last_invalid_input_log: &mut Instant,
    close_frame: &mut Option<CloseFrame>,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                *msgs_in += 1;
                *bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Join(_)) => {
                        // Repeated Join packets are ignored to keep the
                        // session stable.
                        if should_log(last_invalid_input_log) {
                            warn!(peer_id, "duplicate join ignored");
                        }
                        Ok(LoopControl::Continue)
                    }
                    Ok(ClientMessage::Frame(dto)) => {
                        let Some(msg) = sanitize_frame(peer_id, dto.into()) else {
                            if should_log(last_invalid_input_log) {
                                warn!(peer_id, "frame with non-finite values dropped");
                            }
                            return Ok(LoopControl::Continue);
                        };
                        match input_tx.try_send(WorldInput::Frame { from: peer_id, msg }) {
                            Ok(()) => Ok(LoopControl::Continue),
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                // Dropping is the at-most-once contract; the
                                // sender never retries either.
                                if should_log(last_input_full_log) {
                                    warn!(peer_id, "input channel full; dropping frame");
                                }
                                Ok(LoopControl::Continue)
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                Err(NetError::InputClosed)
                            }
                        }
                    }
                    Err(parse_err) => {
                        *invalid_json += 1;
                        if should_log(last_invalid_input_log) {
                            warn!(
                                peer_id,
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }
                        if *invalid_json > MAX_INVALID_JSON {
                            *close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return Ok(LoopControl::Disconnect);
                        }
                        Ok(LoopControl::Continue)
                    }
                }
            }
            Message::Binary(_) => {
                *close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                Ok(LoopControl::Disconnect)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(peer_id, error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!(peer_id, "websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

async fn forward_frame_bytes(
    bytes: Utf8Bytes,
    socket: &mut WebSocket,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
) -> LoopControl {
    let len = bytes.len();
    match socket.send(Message::Text(bytes)).await.map_err(NetError::Ws) {
        Ok(()) => {
            *msgs_out += 1;
            *bytes_out += len as u64;
            LoopControl::Continue
        }
        Err(err) => {
            warn!(error = ?err, "failed to send relay frame");
            LoopControl::Disconnect
        }
    }
}

async fn disconnect_cleanup(
    peer_id: u64,
    input_tx: &mpsc::Sender<WorldInput>,
    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,
    invalid_json: u32,
) -> Result<(), NetError> {
    input_tx
        .send(WorldInput::Leave { peer_id })
        .await
        .map_err(|_| NetError::InputClosed)?;

    debug!(
        peer_id,
        msgs_in, msgs_out, bytes_in, bytes_out, invalid_json, "connection stats"
    );
    info!(peer_id, "client disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::{AmmoKind, Vec2};

    #[test]
    fn when_a_frame_claims_another_owner_then_the_sender_id_is_stamped() {
        let msg = NetMessage::Shoot {
            owner: 999,
            origin: Vec2::default(),
            direction: Vec2::new(1.0, 0.0),
            ammo_kind: AmmoKind::Normal,
        };
        let Some(NetMessage::Shoot { owner, .. }) = sanitize_frame(42, msg) else {
            panic!("frame should survive sanitization");
        };
        assert_eq!(owner, 42);
    }

    #[test]
    fn when_a_frame_carries_non_finite_values_then_it_is_dropped() {
        let msg = NetMessage::Shoot {
            owner: 1,
            origin: Vec2::new(f32::NAN, 0.0),
            direction: Vec2::new(1.0, 0.0),
            ammo_kind: AmmoKind::Normal,
        };
        assert!(sanitize_frame(1, msg).is_none());
    }

    #[test]
    fn when_a_chat_line_is_too_long_then_it_is_truncated() {
        let msg = NetMessage::Chat {
            text: "x".repeat(MAX_CHAT_LEN + 50),
            color: [1, 2, 3],
        };
        let Some(NetMessage::Chat { text, .. }) = sanitize_frame(1, msg) else {
            panic!("chat should survive sanitization");
        };
        assert_eq!(text.chars().count(), MAX_CHAT_LEN);
    }

    #[test]
    fn when_an_empty_display_name_is_sent_then_a_default_is_used() {
        assert_eq!(sanitize_display_name("   "), "archer");
        assert_eq!(sanitize_display_name(" robin "), "robin");
        assert_eq!(
            sanitize_display_name(&"n".repeat(100)).chars().count(),
            MAX_DISPLAY_NAME_LEN
        );
    }
}
