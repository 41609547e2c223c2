#![allow(dead_code)]
//! In-memory Phoenix server for socket tests.
//!
//! [`MockServer::new`] returns a connector that, instead of dialing, creates a
//! `tokio::io::duplex` pipe with a WebSocket on each end. The client end goes
//! to the socket under test, the server end is handed to the test through
//! [`MockServer::accept`].

use futures_util::{SinkExt, StreamExt};
use phoenix_link::{
    events, BoxedTransport, Channel, ConnectFuture, Connector, EventHandlers, Message,
    PhoenixSocket, SocketOptions,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as WsMessage, Role};
use tokio_tungstenite::WebSocketStream;

pub const ENDPOINT: &str = "ws://localhost:4000/socket";

/// Upper bound for any single wait in a test.
const TEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct MockServer {
    accepted: mpsc::UnboundedReceiver<ServerConn>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub fn new() -> (Self, Connector) {
        let (tx, rx) = mpsc::unbounded_channel();
        let urls = Arc::new(Mutex::new(Vec::new()));
        let seen = urls.clone();

        let connector: Connector = Arc::new(move |url: String| -> ConnectFuture {
            seen.lock().unwrap().push(url);
            let tx = tx.clone();
            Box::pin(async move {
                let (client_io, server_io) = tokio::io::duplex(64 * 1024);
                let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
                let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
                let _ = tx.send(ServerConn { ws: server });
                Ok(Box::new(client) as BoxedTransport)
            })
        });

        (Self { accepted: rx, urls }, connector)
    }

    pub async fn accept(&mut self) -> ServerConn {
        tokio::time::timeout(TEST_TIMEOUT, self.accepted.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// URLs the socket asked the connector to open, in order.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

/// The server end of one connection.
pub struct ServerConn {
    ws: WebSocketStream<DuplexStream>,
}

impl ServerConn {
    /// Next text frame from the client, parsed.
    pub async fn recv(&mut self) -> Message {
        self.try_recv(TEST_TIMEOUT)
            .await
            .expect("timed out waiting for a client frame")
    }

    /// Next text frame from the client, or `None` if nothing arrives in time.
    pub async fn try_recv(&mut self, within: Duration) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let frame = match tokio::time::timeout_at(deadline, self.ws.next()).await {
                Ok(frame) => frame,
                Err(_) => return None,
            };
            match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let message =
                        Message::from_json(text.as_str()).expect("client sent invalid JSON");
                    return Some(message);
                },
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("server read failed: {}", e),
                None => panic!("client closed the connection"),
            }
        }
    }

    /// Next frame of any kind.
    pub async fn next_frame(&mut self) -> WsMessage {
        tokio::time::timeout(TEST_TIMEOUT, self.ws.next())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client closed the connection")
            .expect("server read failed")
    }

    /// Wait until the client closes the connection.
    pub async fn expect_closed(&mut self) {
        loop {
            match tokio::time::timeout(TEST_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for close")
            {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => continue,
            }
        }
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(WsMessage::Text(text.to_string().into()))
            .await
            .expect("server write failed");
    }

    pub async fn send_frame(&mut self, frame: WsMessage) {
        self.ws.send(frame).await.expect("server write failed");
    }

    pub async fn push(
        &mut self,
        topic: &str,
        event: &str,
        payload: Value,
        reference: Option<&str>,
    ) {
        let frame = json!({
            "topic": topic,
            "event": event,
            "payload": payload,
            "ref": reference,
        });
        self.send_raw(&frame.to_string()).await;
    }

    /// Answer `request` with a `phx_reply` carrying the same topic and ref.
    pub async fn reply(&mut self, request: &Message, status: &str, response: Value) {
        self.push(
            &request.topic,
            events::REPLY,
            json!({ "status": status, "response": response }),
            request.reference.as_deref(),
        )
        .await;
    }

    pub async fn close(&mut self, frame: Option<CloseFrame>) {
        let _ = self.ws.close(frame).await;
    }
}

/// Options for tests that do not exercise heartbeats.
pub fn quiet_options() -> SocketOptions {
    SocketOptions::new().with_heartbeat_interval_ms(0)
}

pub fn socket_with(
    connector: Connector,
    options: SocketOptions,
    handlers: EventHandlers,
) -> PhoenixSocket {
    PhoenixSocket::builder(ENDPOINT)
        .options(options)
        .event_handlers(handlers)
        .connector(connector)
        .build()
        .expect("socket should build")
}

/// Build a socket, connect it and accept the server end.
pub async fn connected(
    options: SocketOptions,
    handlers: EventHandlers,
) -> (PhoenixSocket, MockServer, ServerConn) {
    let (mut server, connector) = MockServer::new();
    let socket = socket_with(connector, options, handlers);
    socket.connect();
    let conn = server.accept().await;
    socket
        .wait_connected(TEST_TIMEOUT)
        .await
        .expect("socket should connect");
    (socket, server, conn)
}

/// Join `channel`, answering the join from the server side.
pub async fn join_ok(channel: &Channel, conn: &mut ServerConn) -> Value {
    let ch = channel.clone();
    let pending = tokio::spawn(async move { ch.join().await });
    let join = conn.recv().await;
    assert_eq!(join.event, events::JOIN);
    assert_eq!(join.topic, channel.topic());
    conn.reply(&join, "ok", json!({})).await;
    pending
        .await
        .expect("join task panicked")
        .expect("join should succeed")
}

/// Round-trip through the connection task so every command sent before
/// this call has been processed.
pub async fn settle(socket: &PhoenixSocket) {
    let _ = socket.topics().await;
}

/// Wait for the next value from a callback recorder.
pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(TEST_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a callback")
        .expect("recorder dropped")
}
