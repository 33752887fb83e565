//! Integration tests for the Huddle server: real listener, real WebSocket
//! clients, full event flow.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use huddle::prelude::*;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port and returns the address.
async fn start_server(builder: HuddleServerBuilder) -> String {
    let server = builder
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn start_default_server() -> String {
    start_server(HuddleServer::builder()).await
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, event_type: &str, data: Value) {
    let frame = json!({ "eventType": event_type, "data": data }).to_string();
    ws.send(Message::Text(frame.into())).await.expect("send should succeed");
}

/// Reads the next text frame as JSON, failing after two seconds.
async fn recv(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("frame error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("json"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn expect_event(ws: &mut ClientWs, event_type: &str) -> Value {
    let event = recv(ws).await;
    assert_eq!(event["eventType"], event_type, "unexpected event: {event}");
    event["data"].clone()
}

async fn expect_error(ws: &mut ClientWs, code: &str) {
    let data = expect_event(ws, "error").await;
    assert_eq!(data["code"], code, "unexpected error: {data}");
}

/// Asserts that nothing arrives for a short while.
async fn expect_silence(ws: &mut ClientWs) {
    let next = tokio::time::timeout(Duration::from_millis(150), ws.next()).await;
    assert!(next.is_err(), "expected no frame, got {next:?}");
}

/// Creates `room` without joining it.
async fn create_room(ws: &mut ClientWs, room: &str) {
    send(ws, "create_room", json!({ "roomName": room, "username": "" })).await;
    let data = expect_event(ws, "room_created").await;
    assert_eq!(data["roomName"], room);
    assert!(data.get("token").is_none(), "no token without a creator: {data}");
}

/// Creates `room` as `user`, which also joins it. Returns the token.
async fn create_room_as(ws: &mut ClientWs, room: &str, user: &str) -> String {
    send(ws, "create_room", json!({ "roomName": room, "username": user })).await;
    let created = expect_event(ws, "room_created").await;
    assert_eq!(created["roomName"], room);
    let joined = expect_event(ws, "room_joined").await;
    assert_eq!(joined["roomName"], room);
    assert_eq!(created["token"], joined["token"]);
    joined["token"].as_str().expect("token").to_string()
}

/// Joins `room` as `user` and returns the token.
async fn join(ws: &mut ClientWs, room: &str, user: &str) -> String {
    send(ws, "join_room", json!({ "roomName": room, "username": user })).await;
    let data = expect_event(ws, "room_joined").await;
    assert_eq!(data["roomName"], room);
    data["token"].as_str().expect("token").to_string()
}

async fn say(ws: &mut ClientWs, room: &str, user: &str, body: &str) {
    send(
        ws,
        "send_message",
        json!({ "roomName": room, "username": user, "body": body }),
    )
    .await;
}

// =========================================================================
// Happy path
// =========================================================================

#[tokio::test]
async fn test_chat_scenario_create_join_talk_reconnect() {
    let addr = start_default_server().await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;

    let t1 = create_room_as(&mut a, "lobby", "alice").await;
    assert_eq!(t1.len(), 32);
    join(&mut b, "lobby", "bob").await;

    say(&mut a, "lobby", "alice", "hi").await;
    for ws in [&mut a, &mut b] {
        let data = expect_event(ws, "message_received").await;
        assert_eq!(data["username"], "alice");
        assert_eq!(data["body"], "hi");
        assert_eq!(data["roomName"], "lobby");
        assert_eq!(data["seq"], 1);
    }

    a.close(None).await.expect("close");
    drop(a);

    let mut a2 = connect(&addr).await;
    send(&mut a2, "reconnect_room", json!({ "token": t1 })).await;
    let data = expect_event(&mut a2, "room_reconnected").await;
    assert_eq!(data["roomName"], "lobby");
    assert_eq!(data["username"], "alice");
    assert_eq!(data["token"], t1.as_str());

    // Back in the room: messages flow again in both directions.
    say(&mut b, "lobby", "bob", "welcome back").await;
    let data = expect_event(&mut a2, "message_received").await;
    assert_eq!(data["body"], "welcome back");
    assert_eq!(data["seq"], 2);
}

#[tokio::test]
async fn test_create_room_as_creator_then_join_is_invalid_request() {
    let addr = start_default_server().await;
    let mut a = connect(&addr).await;
    create_room_as(&mut a, "lobby", "alice").await;

    // Already in the room through create_room.
    send(&mut a, "join_room", json!({ "roomName": "lobby", "username": "alice" })).await;
    expect_error(&mut a, "InvalidRequest").await;

    // Creating another room while inside one only creates it.
    send(&mut a, "create_room", json!({ "roomName": "garden", "username": "alice" })).await;
    let data = expect_event(&mut a, "room_created").await;
    assert_eq!(data["roomName"], "garden");
    assert!(data.get("token").is_none());
    expect_silence(&mut a).await;

    let mut b = connect(&addr).await;
    join(&mut b, "garden", "alice").await;
}

#[tokio::test]
async fn test_create_room_with_overlong_creator_creates_but_does_not_join() {
    let addr = start_default_server().await;
    let mut a = connect(&addr).await;
    let long = "x".repeat(33);

    send(&mut a, "create_room", json!({ "roomName": "lobby", "username": long })).await;
    let data = expect_event(&mut a, "room_created").await;
    assert!(data.get("token").is_none());
    expect_error(&mut a, "InvalidUsername").await;

    // Still unauthenticated, and the room is there to join.
    join(&mut a, "lobby", "alice").await;
}

#[tokio::test]
async fn test_reconnect_does_not_duplicate_membership() {
    let addr = start_default_server().await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;
    create_room(&mut a, "lobby").await;
    let token = join(&mut a, "lobby", "alice").await;
    join(&mut b, "lobby", "bob").await;

    drop(a);
    let mut a2 = connect(&addr).await;
    send(&mut a2, "reconnect_room", json!({ "token": token })).await;
    expect_event(&mut a2, "room_reconnected").await;

    say(&mut b, "lobby", "bob", "once").await;
    expect_event(&mut b, "message_received").await;
    expect_event(&mut a2, "message_received").await;
    expect_silence(&mut a2).await;

    // A fresh join under the same name is still refused.
    let mut c = connect(&addr).await;
    send(&mut c, "join_room", json!({ "roomName": "lobby", "username": "alice" })).await;
    expect_error(&mut c, "AlreadyMember").await;
}

#[tokio::test]
async fn test_messages_from_several_senders_arrive_in_one_order() {
    let addr = start_default_server().await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;
    let mut c = connect(&addr).await;
    create_room(&mut a, "lobby").await;
    join(&mut a, "lobby", "alice").await;
    join(&mut b, "lobby", "bob").await;
    join(&mut c, "lobby", "carol").await;

    for i in 0..10 {
        say(&mut a, "lobby", "alice", &format!("a{i}")).await;
        say(&mut b, "lobby", "bob", &format!("b{i}")).await;
    }

    let mut orders = Vec::new();
    for ws in [&mut a, &mut b, &mut c] {
        let mut order = Vec::new();
        for _ in 0..20 {
            let data = expect_event(ws, "message_received").await;
            order.push((data["seq"].as_u64().expect("seq"), data["body"].to_string()));
        }
        let seqs: Vec<u64> = order.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(seqs, (1..=20).collect::<Vec<u64>>());
        orders.push(order);
    }
    assert_eq!(orders[0], orders[1]);
    assert_eq!(orders[1], orders[2]);
}

#[tokio::test]
async fn test_leave_room_invalidates_token() {
    let addr = start_default_server().await;
    let mut a = connect(&addr).await;
    create_room(&mut a, "lobby").await;
    let token = join(&mut a, "lobby", "alice").await;

    send(
        &mut a,
        "leave_room",
        json!({ "roomName": "lobby", "username": "alice", "token": token }),
    )
    .await;
    let data = expect_event(&mut a, "room_left").await;
    assert_eq!(data["roomName"], "lobby");

    send(&mut a, "reconnect_room", json!({ "token": token })).await;
    expect_error(&mut a, "UnknownToken").await;

    // The connection is back to unauthenticated and may join again.
    join(&mut a, "lobby", "alice").await;
}

// =========================================================================
// Errors
// =========================================================================

#[tokio::test]
async fn test_reconnect_with_garbage_token_is_unknown_token() {
    let addr = start_default_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, "reconnect_room", json!({ "token": "garbage" })).await;
    expect_error(&mut ws, "UnknownToken").await;

    // Nothing was created: the connection still can't talk in any room.
    say(&mut ws, "lobby", "alice", "hi").await;
    expect_error(&mut ws, "NotInRoom").await;
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let addr = start_default_server().await;
    let mut ws = connect(&addr).await;

    ws.send(Message::Text("not json".to_string().into())).await.unwrap();
    expect_error(&mut ws, "InvalidRequest").await;

    send(&mut ws, "fly_to_moon", json!({})).await;
    expect_error(&mut ws, "InvalidRequest").await;

    send(&mut ws, "join_room", json!({ "roomName": "lobby" })).await;
    expect_error(&mut ws, "InvalidRequest").await;

    // Still usable.
    create_room(&mut ws, "lobby").await;
}

#[tokio::test]
async fn test_create_existing_room_is_room_already_exists() {
    let addr = start_default_server().await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;
    create_room(&mut a, "lobby").await;
    join(&mut a, "lobby", "alice").await;

    send(&mut b, "create_room", json!({ "roomName": "lobby", "username": "bob" })).await;
    expect_error(&mut b, "RoomAlreadyExists").await;

    // Alice is still a member and still hears the room.
    say(&mut a, "lobby", "alice", "still here").await;
    let data = expect_event(&mut a, "message_received").await;
    assert_eq!(data["body"], "still here");
}

#[tokio::test]
async fn test_join_missing_room_is_room_not_found() {
    let addr = start_default_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, "join_room", json!({ "roomName": "nowhere", "username": "alice" })).await;
    expect_error(&mut ws, "RoomNotFound").await;
}

#[tokio::test]
async fn test_join_with_empty_username_is_invalid_username() {
    let addr = start_default_server().await;
    let mut ws = connect(&addr).await;
    create_room(&mut ws, "lobby").await;

    send(&mut ws, "join_room", json!({ "roomName": "lobby", "username": "" })).await;
    expect_error(&mut ws, "InvalidUsername").await;
}

#[tokio::test]
async fn test_join_while_in_room_is_invalid_request() {
    let addr = start_default_server().await;
    let mut ws = connect(&addr).await;
    create_room(&mut ws, "lobby").await;
    create_room(&mut ws, "garden").await;
    join(&mut ws, "lobby", "alice").await;

    send(&mut ws, "join_room", json!({ "roomName": "garden", "username": "alice" })).await;
    expect_error(&mut ws, "InvalidRequest").await;
}

#[tokio::test]
async fn test_send_message_for_other_room_or_user_is_not_in_room() {
    let addr = start_default_server().await;
    let mut ws = connect(&addr).await;
    create_room(&mut ws, "lobby").await;
    create_room(&mut ws, "garden").await;
    join(&mut ws, "lobby", "alice").await;

    say(&mut ws, "garden", "alice", "hi").await;
    expect_error(&mut ws, "NotInRoom").await;

    say(&mut ws, "lobby", "mallory", "hi").await;
    expect_error(&mut ws, "NotInRoom").await;
}

#[tokio::test]
async fn test_leave_with_wrong_token_is_unknown_token() {
    let addr = start_default_server().await;
    let mut ws = connect(&addr).await;
    create_room(&mut ws, "lobby").await;
    join(&mut ws, "lobby", "alice").await;

    send(
        &mut ws,
        "leave_room",
        json!({ "roomName": "lobby", "username": "alice", "token": "forged" }),
    )
    .await;
    expect_error(&mut ws, "UnknownToken").await;

    // Still in the room.
    say(&mut ws, "lobby", "alice", "hi").await;
    expect_event(&mut ws, "message_received").await;
}

#[tokio::test]
async fn test_empty_message_body_is_invalid_request() {
    let addr = start_default_server().await;
    let mut ws = connect(&addr).await;
    create_room(&mut ws, "lobby").await;
    join(&mut ws, "lobby", "alice").await;

    say(&mut ws, "lobby", "alice", "").await;
    expect_error(&mut ws, "InvalidRequest").await;
}

// =========================================================================
// Disconnects
// =========================================================================

#[tokio::test]
async fn test_dropped_member_does_not_block_others() {
    let addr = start_default_server().await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;
    let mut c = connect(&addr).await;
    create_room(&mut a, "lobby").await;
    join(&mut a, "lobby", "alice").await;
    join(&mut b, "lobby", "bob").await;
    join(&mut c, "lobby", "carol").await;

    // Bob vanishes without a close handshake.
    drop(b);

    for i in 0..5 {
        say(&mut a, "lobby", "alice", &format!("m{i}")).await;
    }
    for ws in [&mut a, &mut c] {
        for i in 0..5 {
            let data = expect_event(ws, "message_received").await;
            assert_eq!(data["body"], format!("m{i}"));
        }
    }
}

#[tokio::test]
async fn test_zero_grace_removes_member_on_disconnect() {
    let addr = start_server(HuddleServer::builder().session_config(SessionConfig {
        reconnect_grace_secs: 0,
    }))
    .await;
    let mut a = connect(&addr).await;
    create_room(&mut a, "lobby").await;
    let token = join(&mut a, "lobby", "alice").await;

    a.close(None).await.expect("close");
    drop(a);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut a2 = connect(&addr).await;
    send(&mut a2, "reconnect_room", json!({ "token": token })).await;
    expect_error(&mut a2, "UnknownToken").await;

    // The name is free again.
    join(&mut a2, "lobby", "alice").await;
}

#[tokio::test]
async fn test_sweep_removes_member_after_grace_period() {
    let addr = start_server(
        HuddleServer::builder()
            .session_config(SessionConfig {
                reconnect_grace_secs: 1,
            })
            .sweep_interval_secs(1),
    )
    .await;
    let mut a = connect(&addr).await;
    create_room(&mut a, "lobby").await;
    let token = join(&mut a, "lobby", "alice").await;
    drop(a);

    tokio::time::sleep(Duration::from_millis(2600)).await;

    let mut a2 = connect(&addr).await;
    send(&mut a2, "reconnect_room", json!({ "token": token })).await;
    expect_error(&mut a2, "UnknownToken").await;
    join(&mut a2, "lobby", "alice").await;
}

#[tokio::test]
async fn test_late_reconnect_before_sweep_frees_the_username() {
    let addr = start_server(
        HuddleServer::builder()
            .session_config(SessionConfig {
                reconnect_grace_secs: 1,
            })
            .sweep_interval_secs(30),
    )
    .await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;
    let token = create_room_as(&mut a, "lobby", "alice").await;
    join(&mut b, "lobby", "bob").await;
    a.close(None).await.expect("close");
    drop(a);

    // Past the grace period, long before the next sweep.
    tokio::time::sleep(Duration::from_millis(1600)).await;

    let mut a2 = connect(&addr).await;
    send(&mut a2, "reconnect_room", json!({ "token": token })).await;
    expect_error(&mut a2, "UnknownToken").await;

    // The stale member is gone: the name is free and bob's messages reach
    // only the new alice.
    join(&mut a2, "lobby", "alice").await;
    say(&mut b, "lobby", "bob", "hello again").await;
    let data = expect_event(&mut a2, "message_received").await;
    assert_eq!(data["body"], "hello again");
}

#[tokio::test]
async fn test_rejoin_after_grace_sees_member_gone_or_still_there() {
    let addr = start_server(
        HuddleServer::builder()
            .session_config(SessionConfig {
                reconnect_grace_secs: 1,
            })
            .sweep_interval_secs(1),
    )
    .await;
    let mut a = connect(&addr).await;
    create_room_as(&mut a, "lobby", "alice").await;
    drop(a);

    let mut c = connect(&addr).await;
    let rejoined = tokio::time::timeout(Duration::from_secs(4), async {
        loop {
            send(&mut c, "join_room", json!({ "roomName": "lobby", "username": "alice" })).await;
            let event = recv(&mut c).await;
            match event["eventType"].as_str() {
                Some("room_joined") => break,
                Some("error") => assert_eq!(event["data"]["code"], "AlreadyMember"),
                _ => panic!("unexpected event: {event}"),
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;
    assert!(rejoined.is_ok(), "alice should be able to rejoin once the sweep ran");

    say(&mut c, "lobby", "alice", "back").await;
    let data = expect_event(&mut c, "message_received").await;
    assert_eq!(data["body"], "back");
}

#[tokio::test]
async fn test_reconnect_on_new_socket_takes_over_live_session() {
    let addr = start_default_server().await;
    let mut old = connect(&addr).await;
    create_room(&mut old, "lobby").await;
    let token = join(&mut old, "lobby", "alice").await;

    let mut new = connect(&addr).await;
    send(&mut new, "reconnect_room", json!({ "token": token })).await;
    expect_event(&mut new, "room_reconnected").await;

    // The old socket gets closed by the server.
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match old.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "superseded socket should be closed");

    say(&mut new, "lobby", "alice", "moved").await;
    let data = expect_event(&mut new, "message_received").await;
    assert_eq!(data["body"], "moved");
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let addr = start_server(HuddleServer::builder().idle_timeout_secs(1)).await;
    let mut ws = connect(&addr).await;

    let closed = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "idle socket should be closed");
}
