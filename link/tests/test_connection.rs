//! Connection lifecycle tests against the in-memory server.

mod common;

use common::*;
use phoenix_link::{
    BoxedTransport, ConnectFuture, ConnectionError, ConnectionState, Connector, DisconnectReason,
    EventHandlers, Message, PhoenixLinkError,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::{
    frame::coding::CloseCode, CloseFrame, Message as WsMessage,
};

#[tokio::test(start_paused = true)]
async fn test_connect_passes_full_url_to_connector() {
    let (mut server, connector) = MockServer::new();
    let socket = socket_with(
        connector,
        quiet_options().with_param("token", "abc").with_param("vsn", "2.0.0"),
        EventHandlers::new(),
    );

    socket.connect();
    let _conn = server.accept().await;
    socket.wait_connected(Duration::from_secs(5)).await.unwrap();

    assert_eq!(
        server.urls(),
        vec!["ws://localhost:4000/socket/websocket?token=abc&vsn=2.0.0".to_string()]
    );
    assert_eq!(socket.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_twice_opens_one_transport() {
    let (mut server, connector) = MockServer::new();
    let socket = socket_with(connector, quiet_options(), EventHandlers::new());

    socket.connect();
    socket.connect();
    let _conn = server.accept().await;
    socket.wait_connected(Duration::from_secs(5)).await.unwrap();
    socket.connect();
    settle(&socket).await;

    assert_eq!(server.urls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_before_connect_returns_false() {
    let (_server, connector) = MockServer::new();
    let socket = socket_with(connector, quiet_options(), EventHandlers::new());

    let sent = socket
        .send(Message::new("room:1", "msg", json!({}), "1"))
        .await;
    assert!(!sent);
}

#[tokio::test(start_paused = true)]
async fn test_send_while_connecting_returns_false() {
    let never: Connector = Arc::new(|_url: String| -> ConnectFuture {
        Box::pin(std::future::pending::<Result<BoxedTransport, ConnectionError>>())
    });
    let socket = socket_with(never, quiet_options(), EventHandlers::new());

    socket.connect();
    settle(&socket).await;
    assert_eq!(socket.state(), ConnectionState::Connecting);

    let sent = socket
        .send(Message::new("room:1", "msg", json!({}), "1"))
        .await;
    assert!(!sent);
}

#[tokio::test(start_paused = true)]
async fn test_send_raw_message_when_connected() {
    let (socket, _server, mut conn) = connected(quiet_options(), EventHandlers::new()).await;

    assert!(socket.send(Message::new("room:1", "custom", json!({ "a": 1 }), "99")).await);

    let msg = conn.recv().await;
    assert_eq!(msg.topic, "room:1");
    assert_eq!(msg.event, "custom");
    assert_eq!(msg.reference.as_deref(), Some("99"));
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_hooks_fire() {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<String>();
    let on_connect = events_tx.clone();
    let on_disconnect = events_tx.clone();
    let handlers = EventHandlers::new()
        .on_connect(move || {
            let _ = on_connect.send("connect".into());
        })
        .on_disconnect(move |reason: DisconnectReason| {
            let _ = on_disconnect.send(format!("disconnect: {}", reason.message));
        });

    let (socket, _server, mut conn) = connected(quiet_options(), handlers).await;
    assert_eq!(next(&mut events_rx).await, "connect");

    socket.disconnect();
    assert_eq!(next(&mut events_rx).await, "disconnect: Client disconnected");
    conn.expect_closed().await;
    assert_eq!(socket.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let disconnects = Arc::new(AtomicUsize::new(0));
    let counter = disconnects.clone();
    let handlers = EventHandlers::new().on_disconnect(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let (socket, _server, _conn) = connected(quiet_options(), handlers).await;

    socket.disconnect();
    socket.disconnect();
    settle(&socket).await;
    socket.disconnect();
    settle(&socket).await;

    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(socket.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_before_connect_is_noop() {
    let disconnects = Arc::new(AtomicUsize::new(0));
    let counter = disconnects.clone();
    let (_server, connector) = MockServer::new();
    let socket = socket_with(
        connector,
        quiet_options(),
        EventHandlers::new().on_disconnect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    socket.disconnect();
    settle(&socket).await;

    assert_eq!(disconnects.load(Ordering::SeqCst), 0);
    assert_eq!(socket.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_server_close_keeps_channels_and_allows_reconnect() {
    let (reasons_tx, mut reasons_rx) = mpsc::unbounded_channel::<DisconnectReason>();
    let handlers = EventHandlers::new().on_disconnect(move |reason| {
        let _ = reasons_tx.send(reason);
    });
    let (socket, mut server, mut conn) = connected(quiet_options(), handlers).await;

    let room = socket.channel("room:1", json!({}));
    join_ok(&room, &mut conn).await;
    assert!(room.is_joined().await);

    conn.close(Some(CloseFrame {
        code: CloseCode::Away,
        reason: "restarting".into(),
    }))
    .await;

    let reason = next(&mut reasons_rx).await;
    assert_eq!(reason.code, Some(1001));
    assert_eq!(reason.message, "restarting");
    assert_eq!(socket.state(), ConnectionState::Disconnected);
    assert!(!room.is_joined().await);
    assert_eq!(socket.topics().await, vec!["room:1".to_string()]);

    socket.connect();
    let mut conn = server.accept().await;
    socket.wait_connected(Duration::from_secs(5)).await.unwrap();
    join_ok(&room, &mut conn).await;
    assert!(room.is_joined().await);
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_reports_error_and_disconnect() {
    let failing: Connector = Arc::new(|_url: String| -> ConnectFuture {
        Box::pin(async {
            Err::<BoxedTransport, _>(ConnectionError::new("Connection failed: refused", true))
        })
    });
    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel::<ConnectionError>();
    let disconnects = Arc::new(AtomicUsize::new(0));
    let counter = disconnects.clone();
    let handlers = EventHandlers::new()
        .on_error(move |error| {
            let _ = errors_tx.send(error);
        })
        .on_disconnect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let socket = socket_with(failing, quiet_options(), handlers);
    socket.connect();

    let error = next(&mut errors_rx).await;
    assert!(error.recoverable);
    assert_eq!(error.message, "Connection failed: refused");
    settle(&socket).await;
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(socket.state(), ConnectionState::Disconnected);

    let err = socket.wait_connected(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, PhoenixLinkError::TimeoutError(_)));
}

#[tokio::test(start_paused = true)]
async fn test_on_message_observes_every_topic_until_off() {
    let (socket, _server, mut conn) = connected(quiet_options(), EventHandlers::new()).await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<(String, String)>();
    let observer = socket.on_message(move |msg| {
        let _ = seen_tx.send((msg.topic.clone(), msg.event.clone()));
    });

    settle(&socket).await;
    conn.push("room:1", "a", json!({}), None).await;
    conn.push("unregistered", "b", json!({}), None).await;
    assert_eq!(next(&mut seen_rx).await, ("room:1".to_string(), "a".to_string()));
    assert_eq!(next(&mut seen_rx).await, ("unregistered".to_string(), "b".to_string()));

    observer.off();
    observer.off();

    let (marker_tx, mut marker_rx) = mpsc::unbounded_channel::<()>();
    let _marker = socket.on_message(move |_| {
        let _ = marker_tx.send(());
    });
    settle(&socket).await;
    conn.push("room:1", "c", json!({}), None).await;
    next(&mut marker_rx).await;
    assert!(seen_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_are_dropped() {
    let (socket, _server, mut conn) = connected(quiet_options(), EventHandlers::new()).await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();
    let _observer = socket.on_message(move |msg| {
        let _ = seen_tx.send(msg.event.clone());
    });
    settle(&socket).await;

    conn.send_raw("not json").await;
    conn.send_raw(r#"{"topic":"room:1"}"#).await;
    conn.push("room:1", "after", json!({}), None).await;

    assert_eq!(next(&mut seen_rx).await, "after");
    assert!(socket.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_raw_frame_hooks_see_wire_text() {
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<(&'static str, String)>();
    let sent_tx = raw_tx.clone();
    let handlers = EventHandlers::new()
        .on_send(move |raw| {
            let _ = sent_tx.send(("send", raw.to_string()));
        })
        .on_receive(move |raw| {
            let _ = raw_tx.send(("recv", raw.to_string()));
        });
    let (socket, _server, mut conn) = connected(quiet_options(), handlers).await;

    assert!(socket.send(Message::new("room:1", "out", json!({}), "5")).await);
    let (kind, raw) = next(&mut raw_rx).await;
    assert_eq!(kind, "send");
    assert_eq!(Message::from_json(&raw).unwrap().event, "out");
    conn.recv().await;

    conn.send_raw("garbage").await;
    assert_eq!(next(&mut raw_rx).await, ("recv", "garbage".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_ping_is_answered_with_pong() {
    let (_socket, _server, mut conn) = connected(quiet_options(), EventHandlers::new()).await;

    conn.send_frame(WsMessage::Ping(bytes::Bytes::from_static(b"are-you-there")))
        .await;

    loop {
        match conn.next_frame().await {
            WsMessage::Pong(payload) => {
                assert_eq!(&payload[..], b"are-you-there");
                break;
            },
            _ => continue,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_binary_json_frames_are_dispatched() {
    let (socket, _server, mut conn) = connected(quiet_options(), EventHandlers::new()).await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();
    let _observer = socket.on_message(move |msg| {
        let _ = seen_tx.send(msg.event.clone());
    });
    settle(&socket).await;

    let frame = json!({ "topic": "room:1", "event": "bin", "payload": {}, "ref": null });
    conn.send_frame(WsMessage::Binary(frame.to_string().into_bytes().into()))
        .await;

    assert_eq!(next(&mut seen_rx).await, "bin");
}

#[tokio::test(start_paused = true)]
async fn test_dropping_last_handle_closes_connection() {
    let (socket, _server, mut conn) = connected(quiet_options(), EventHandlers::new()).await;
    let clone = socket.clone();

    drop(socket);
    assert!(clone.is_connected());

    drop(clone);
    conn.expect_closed().await;
}
