//! # phoenix-link
//!
//! Client for the Phoenix Channels protocol over WebSocket.
//!
//! A [`PhoenixSocket`] owns one connection to a server endpoint and
//! multiplexes topic-scoped [`Channel`]s over it:
//!
//! - **Channels**: join and leave topics, bind callbacks to events
//! - **Pushes**: send events and correlate the server's reply by ref
//! - **Heartbeats**: keep the connection alive on the reserved `phoenix` topic
//! - **Hooks**: observe connect, disconnect, errors and raw frames through
//!   [`EventHandlers`]
//!
//! The socket never reconnects or rejoins on its own.
//!
//! ## Example
//!
//! ```rust,no_run
//! use phoenix_link::{PhoenixSocket, SocketOptions};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() -> phoenix_link::Result<()> {
//! let socket = PhoenixSocket::new("ws://localhost:4000/socket", SocketOptions::default())?;
//! socket.connect();
//! socket.wait_connected(Duration::from_secs(5)).await?;
//!
//! let room = socket.channel("room:lobby", json!({ "user": "ada" }));
//! room.on("new_msg", |payload, _ref| println!("new message: {}", payload));
//! room.join().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod connection;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod socket;

pub use channel::{Binding, Channel, Push};
pub use connection::{
    build_socket_url, tungstenite_connector, BoxedTransport, ConnectFuture, Connector,
    EventCallback, MessageCallback, PayloadCallback, ReplyCallback, Transport,
};
pub use error::{PhoenixLinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use models::{events, ConnectionState, Message, Reply, SocketOptions, PHOENIX_TOPIC};
pub use socket::{PhoenixSocket, PhoenixSocketBuilder};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
