//! Subcommand implementations.

pub mod bookmark;
pub mod chat;

use crate::error::Result;
use phoenix_link::{ConnectionState, EventHandlers, PhoenixSocket, SocketOptions};
use std::time::Duration;

/// How long to wait for the close handshake before exiting.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Build a socket that reports transport failures on stderr.
pub(crate) fn open_socket(url: &str, options: SocketOptions) -> Result<PhoenixSocket> {
    let handlers = EventHandlers::new()
        .on_error(|error| eprintln!("Connection error: {}", error))
        .on_disconnect(|reason| log::info!("Disconnected: {}", reason));

    let socket = PhoenixSocket::builder(url)
        .options(options)
        .event_handlers(handlers)
        .build()?;
    Ok(socket)
}

/// Disconnect and wait briefly for the transport to close.
pub(crate) async fn close_socket(socket: &PhoenixSocket) {
    let mut states = socket.state_changes();
    socket.disconnect();
    let _ = tokio::time::timeout(
        CLOSE_GRACE,
        states.wait_for(|state| *state == ConnectionState::Disconnected),
    )
    .await;
}
