//! Connection lifecycle hooks for [`PhoenixSocket`](crate::PhoenixSocket).
//!
//! - [`on_connect`](EventHandlers::on_connect): the transport opened
//! - [`on_disconnect`](EventHandlers::on_disconnect): the transport closed
//! - [`on_error`](EventHandlers::on_error): a transport or protocol error
//! - [`on_receive`](EventHandlers::on_receive) / [`on_send`](EventHandlers::on_send):
//!   raw frame hooks for debugging
//!
//! The socket never reconnects on its own. A caller that wants to recover
//! from a dropped connection watches `on_disconnect` and calls
//! [`connect`](crate::PhoenixSocket::connect) again.
//!
//! # Example
//!
//! ```rust,no_run
//! use phoenix_link::{EventHandlers, PhoenixSocket, SocketOptions};
//!
//! # async fn example() -> phoenix_link::Result<()> {
//! let handlers = EventHandlers::new()
//!     .on_connect(|| println!("connected"))
//!     .on_disconnect(|reason| println!("closed: {}", reason))
//!     .on_error(|error| eprintln!("socket error: {}", error));
//!
//! let socket = PhoenixSocket::builder("ws://localhost:4000/socket")
//!     .options(SocketOptions::default())
//!     .event_handlers(handlers)
//!     .build()?;
//! socket.connect();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Why the transport closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    pub message: String,
    /// WebSocket close code, when the peer sent one.
    pub code: Option<u16>,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code: {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Error information passed to the `on_error` hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    pub message: String,
    /// `true` when calling `connect()` again may succeed (network failures),
    /// `false` for errors that will repeat (bad handshake response, bad frame).
    pub recoverable: bool,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;
pub type OnRawFrameCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Optional connection lifecycle callbacks.
///
/// Hooks run on the connection task, between frames. They may call back into
/// the socket or its channels (those calls only enqueue commands), but they
/// should not block.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_receive: Option<OnRawFrameCallback>,
    pub(crate) on_send: Option<OnRawFrameCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_send", &self.on_send.is_some())
            .finish()
    }
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the transport is open and heartbeats have started.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Called when the transport closes, whether by `disconnect()`, a close
    /// frame from the server, or a transport error.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Called on connection failures and undecodable frames.
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Receives the raw text of every inbound frame before it is parsed.
    ///
    /// ```rust
    /// use phoenix_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new().on_receive(|raw| println!("[RECV] {}", raw));
    /// ```
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Receives the raw text of every frame written to the transport.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(f));
        self
    }

    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_error.is_some()
            || self.on_receive.is_some()
            || self.on_send.is_some()
    }

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            run_callback("on_connect", || cb());
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            run_callback("on_disconnect", || cb(reason));
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            run_callback("on_error", || cb(error));
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.on_receive {
            run_callback("on_receive", || cb(raw));
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(cb) = &self.on_send {
            run_callback("on_send", || cb(raw));
        }
    }
}

/// Run a user callback on the connection task. A panic is logged and
/// swallowed so frame handling carries on.
pub(crate) fn run_callback(name: &str, f: impl FnOnce()) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(f)) {
        let detail = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        log::error!("[phoenix-link] {} callback panicked: {}", name, detail);
    }
}
