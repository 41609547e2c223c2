//! WebSocket connection management.
//!
//! This module contains:
//! - [`websocket`]: URL construction, the [`Transport`] seam and the default
//!   tokio-tungstenite connector
//! - [`shared`]: the connection task that owns the transport, the channel
//!   registry, the ref counter and the heartbeat timer

pub mod shared;
pub mod websocket;

pub(crate) use shared::{spawn_connection_task, BindingKey, CommandSender, SocketCmd};
pub use shared::{EventCallback, MessageCallback, PayloadCallback, ReplyCallback};
pub use websocket::{
    build_socket_url, tungstenite_connector, BoxedTransport, ConnectFuture, Connector, Transport,
    TRANSPORT_SUFFIX,
};

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: std::time::Duration =
    std::time::Duration::from_secs(100 * 365 * 24 * 3600);
