// End-to-end relay behavior over real WebSocket connections.

mod support;

use std::time::Duration;

use arrow_arena::interface_adapters::protocol::{
    ChatDto, ClientMessage, JoinPayload, NetMessageDto, PlayerSnapshotDto, ServerMessage,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use uuid::Uuid;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect_client(addr: &str) -> (WsClient, u64) {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");
    let join = ClientMessage::Join(JoinPayload {
        display_name: format!("archer-{}", Uuid::new_v4()),
    });
    send_client_message(&mut ws, &join).await;

    // Welcome always precedes relay frames.
    let peer_id = loop {
        match next_message(&mut ws).await.expect("welcome before frames") {
            ServerMessage::Welcome { peer_id } => break peer_id,
            ServerMessage::Frame { .. } => panic!("frame arrived before welcome"),
        }
    };
    (ws, peer_id)
}

async fn send_client_message(ws: &mut WsClient, msg: &ClientMessage) {
    let text = serde_json::to_string(msg).expect("encode client message");
    ws.send(Message::Text(text)).await.expect("send message");
}

async fn next_message(ws: &mut WsClient) -> Option<ServerMessage> {
    loop {
        let incoming = timeout(Duration::from_secs(5), ws.next()).await.ok()??;
        if let Message::Text(text) = incoming.ok()? {
            if let Ok(parsed) = serde_json::from_str::<ServerMessage>(&text) {
                return Some(parsed);
            }
        }
    }
}

#[tokio::test]
async fn when_a_snapshot_is_sent_then_peers_receive_it_and_the_sender_does_not() {
    let addr = support::ensure_server();
    let (mut sender, sender_id) = connect_client(addr).await;
    let (mut receiver, _) = connect_client(addr).await;

    let snapshot = ClientMessage::Frame(NetMessageDto::UpdateState(PlayerSnapshotDto {
        owner: sender_id,
        hp: 10,
        pos_x: 4.0,
        pos_y: 2.0,
        aim_x: 0.0,
        aim_y: 1.0,
        selected: -1,
    }));
    send_client_message(&mut sender, &snapshot).await;

    // The receiver sees the snapshot with the relay-stamped sender id.
    let received = loop {
        let msg = next_message(&mut receiver)
            .await
            .expect("snapshot should fan out");
        if let ServerMessage::Frame {
            from,
            msg: NetMessageDto::UpdateState(snap),
        } = msg
        {
            if from == sender_id {
                break snap;
            }
        }
    };
    assert_eq!(received.owner, sender_id);
    assert_eq!(received.pos_x, 4.0);
    assert_eq!(received.hp, 10);

    // The sender never gets its own frame echoed back.
    let deadline = Instant::now() + Duration::from_millis(500);
    loop {
        let Ok(Some(Ok(incoming))) = timeout_at(deadline, sender.next()).await else {
            break;
        };
        if let Message::Text(text) = incoming {
            if let Ok(ServerMessage::Frame { from, .. }) =
                serde_json::from_str::<ServerMessage>(&text)
            {
                assert_ne!(from, sender_id, "sender received its own frame");
            }
        }
    }
}

#[tokio::test]
async fn when_a_client_joins_then_it_receives_the_spawn_table_bootstrap() {
    let addr = support::ensure_server();
    let (mut client, _) = connect_client(addr).await;

    loop {
        let msg = next_message(&mut client)
            .await
            .expect("bootstrap should include the spawn table");
        if let ServerMessage::Frame {
            msg: NetMessageDto::SpawnTableSync { .. },
            ..
        } = msg
        {
            break;
        }
    }
}

#[tokio::test]
async fn when_a_chat_line_is_sent_then_other_peers_receive_it_verbatim() {
    let addr = support::ensure_server();
    let (mut sender, sender_id) = connect_client(addr).await;
    let (mut receiver, _) = connect_client(addr).await;

    let line = format!("good shot {}", Uuid::new_v4());
    send_client_message(
        &mut sender,
        &ClientMessage::Frame(NetMessageDto::Chat(ChatDto {
            text: line.clone(),
            color: [200, 40, 40],
        })),
    )
    .await;

    loop {
        let msg = next_message(&mut receiver)
            .await
            .expect("chat should fan out");
        if let ServerMessage::Frame {
            from,
            msg: NetMessageDto::Chat(chat),
        } = msg
        {
            if chat.text == line {
                assert_eq!(from, sender_id);
                assert_eq!(chat.color, [200, 40, 40]);
                break;
            }
        }
    }
}

#[tokio::test]
async fn when_a_frame_is_sent_before_join_then_the_connection_is_closed() {
    let addr = support::ensure_server();
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");

    send_client_message(
        &mut ws,
        &ClientMessage::Frame(NetMessageDto::Chat(ChatDto {
            text: "too early".into(),
            color: [0, 0, 0],
        })),
    )
    .await;

    // The server closes the socket instead of relaying anything.
    loop {
        match timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("close should arrive")
        {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(_)) => break,
        }
    }
}

#[tokio::test]
async fn when_status_is_queried_then_tick_and_player_counters_are_reported() {
    let addr = support::ensure_server();
    let url = format!("http://{addr}/status");

    let (_client, _) = connect_client(addr).await;

    let first: serde_json::Value = reqwest::get(&url)
        .await
        .expect("status request")
        .json()
        .await
        .expect("status json");
    assert!(first["players"].as_u64().expect("players field") >= 1);
    assert!(first["connections"].as_u64().is_some());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let second: serde_json::Value = reqwest::get(&url)
        .await
        .expect("status request")
        .json()
        .await
        .expect("status json");
    assert!(
        second["tick"].as_u64().expect("tick field") > first["tick"].as_u64().expect("tick field"),
        "world loop should keep ticking"
    );
}
