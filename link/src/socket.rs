//! The socket handle with builder pattern.

use crate::{
    channel::{Binding, Channel},
    connection::{
        build_socket_url, spawn_connection_task, tungstenite_connector, BindingKey, CommandSender,
        Connector, SocketCmd,
    },
    error::{PhoenixLinkError, Result},
    event_handlers::EventHandlers,
    models::{ConnectionState, Message, SocketOptions},
};
use serde_json::Value;
use std::sync::{atomic::AtomicU64, Arc};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// A client connection to one Phoenix socket endpoint.
///
/// Cheap to clone; all clones drive the same connection. The connection is
/// shut down when the last clone is dropped.
///
/// # Examples
///
/// ```rust,no_run
/// use phoenix_link::{PhoenixSocket, SocketOptions};
/// use serde_json::json;
///
/// # async fn example() -> phoenix_link::Result<()> {
/// let socket = PhoenixSocket::new(
///     "ws://localhost:4000/socket",
///     SocketOptions::new().with_param("token", "secret"),
/// )?;
/// socket.connect();
///
/// let room = socket.channel("room:1", json!({}));
/// room.on("new_msg", |payload, _ref| println!("{}", payload));
/// room.join().await?;
///
/// room.push("new_msg", json!({ "body": "hi" }))
///     .await?
///     .receive("ok", |response| println!("stored: {}", response));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PhoenixSocket {
    inner: Arc<SocketInner>,
}

struct SocketInner {
    endpoint: String,
    url: String,
    options: SocketOptions,
    cmd_tx: CommandSender,
    state_rx: watch::Receiver<ConnectionState>,
    binding_ids: Arc<AtomicU64>,
    _task: JoinHandle<()>,
}

impl Drop for SocketInner {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(SocketCmd::Shutdown);
    }
}

impl PhoenixSocket {
    /// Create a socket with the default tokio-tungstenite transport.
    ///
    /// Does not open the connection; call [`connect`](Self::connect).
    pub fn new(endpoint: impl Into<String>, options: SocketOptions) -> Result<Self> {
        Self::builder(endpoint).options(options).build()
    }

    pub fn builder(endpoint: impl Into<String>) -> PhoenixSocketBuilder {
        PhoenixSocketBuilder::new(endpoint.into())
    }

    /// Open the transport if it is not already open or opening.
    ///
    /// Returns immediately. Observe the outcome through
    /// [`state_changes`](Self::state_changes), [`wait_connected`](Self::wait_connected)
    /// or the `on_connect` / `on_error` hooks.
    pub fn connect(&self) {
        self.send_cmd(SocketCmd::Connect);
    }

    /// Close the transport. Registered channels are kept but marked unjoined.
    pub fn disconnect(&self) {
        self.send_cmd(SocketCmd::Disconnect);
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Wait until the transport is open, or fail after `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let mut state_rx = self.inner.state_rx.clone();
        let waited = tokio::time::timeout(timeout, state_rx.wait_for(|s| s.is_connected()))
            .await
            .map(|state| state.map(|_| ()));
        match waited {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(PhoenixLinkError::ConnectionClosed),
            Err(_) => Err(PhoenixLinkError::TimeoutError(format!(
                "Not connected to {} after {:?}",
                self.inner.endpoint, timeout
            ))),
        }
    }

    /// The endpoint as given to the builder.
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// The full connection URL: endpoint, `/websocket` suffix and params.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn options(&self) -> &SocketOptions {
        &self.inner.options
    }

    /// Get the channel for `topic`, registering it on first use.
    ///
    /// Calling this again for a registered topic returns a handle to the same
    /// channel; `params` of later calls are ignored.
    pub fn channel(&self, topic: impl Into<String>, params: Value) -> Channel {
        let topic = topic.into();
        self.send_cmd(SocketCmd::Register {
            topic: topic.clone(),
            params,
        });
        Channel::new(
            topic,
            self.inner.cmd_tx.clone(),
            self.inner.binding_ids.clone(),
            self.inner.options.timeout(),
        )
    }

    /// Observe every parsed inbound message, on any topic.
    pub fn on_message(&self, f: impl Fn(&Message) + Send + Sync + 'static) -> Binding {
        let id = Binding::next_id(&self.inner.binding_ids);
        self.send_cmd(SocketCmd::OnMessage {
            id,
            callback: Arc::new(f),
        });
        Binding::new(BindingKey::Message { id }, self.inner.cmd_tx.clone())
    }

    /// Write a raw message. Returns `false` when the transport is not open.
    pub async fn send(&self, message: Message) -> bool {
        let (result_tx, result_rx) = oneshot::channel();
        if !self.send_cmd(SocketCmd::Send { message, result_tx }) {
            return false;
        }
        result_rx.await.unwrap_or(false)
    }

    /// Registered topics, sorted.
    pub async fn topics(&self) -> Vec<String> {
        let (result_tx, result_rx) = oneshot::channel();
        if !self.send_cmd(SocketCmd::ListTopics { result_tx }) {
            return Vec::new();
        }
        result_rx.await.unwrap_or_default()
    }

    fn send_cmd(&self, cmd: SocketCmd) -> bool {
        if self.inner.cmd_tx.send(cmd).is_err() {
            log::warn!("[phoenix-link] Connection task is not running");
            return false;
        }
        true
    }
}

/// Builder for configuring [`PhoenixSocket`] instances.
pub struct PhoenixSocketBuilder {
    endpoint: String,
    options: SocketOptions,
    event_handlers: EventHandlers,
    connector: Option<Connector>,
}

impl PhoenixSocketBuilder {
    fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            options: SocketOptions::default(),
            event_handlers: EventHandlers::default(),
            connector: None,
        }
    }

    pub fn options(mut self, options: SocketOptions) -> Self {
        self.options = options;
        self
    }

    /// Set connection lifecycle hooks.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Replace the transport factory.
    ///
    /// The connector receives the full connection URL and resolves to an
    /// open [`Transport`](crate::Transport). Tests use this to run against an
    /// in-memory server.
    pub fn connector(mut self, connector: Connector) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Build the socket and spawn its connection task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<PhoenixSocket> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(PhoenixLinkError::ConfigurationError(
                "PhoenixSocket must be built inside a Tokio runtime".into(),
            ));
        }

        let url = build_socket_url(&self.endpoint, &self.options.params)?;
        let connector = self.connector.unwrap_or_else(tungstenite_connector);

        log::debug!("[phoenix-link] Socket created for {}", url);
        let (cmd_tx, state_rx, task) = spawn_connection_task(
            url.clone(),
            self.options.clone(),
            connector,
            self.event_handlers,
        );

        Ok(PhoenixSocket {
            inner: Arc::new(SocketInner {
                endpoint: self.endpoint,
                url,
                options: self.options,
                cmd_tx,
                state_rx,
                binding_ids: Arc::new(AtomicU64::new(0)),
                _task: task,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_outside_runtime_fails() {
        let err = PhoenixSocket::new("ws://localhost:4000/socket", SocketOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, PhoenixLinkError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn test_new_builds_url_and_starts_disconnected() {
        let socket = PhoenixSocket::new(
            "http://localhost:4000/socket",
            SocketOptions::new().with_param("token", "abc"),
        )
        .unwrap();

        assert_eq!(socket.endpoint(), "http://localhost:4000/socket");
        assert_eq!(socket.url(), "ws://localhost:4000/socket/websocket?token=abc");
        assert_eq!(socket.state(), ConnectionState::Disconnected);
        assert!(!socket.is_connected());
        assert!(socket.topics().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_endpoint_is_rejected() {
        let result = PhoenixSocket::new("localhost:4000", SocketOptions::default());
        assert!(matches!(result, Err(PhoenixLinkError::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn test_send_while_disconnected_returns_false() {
        let socket = PhoenixSocket::new("ws://localhost:4000/socket", SocketOptions::default())
            .unwrap();
        let sent = socket
            .send(Message::new("room:1", "ping", serde_json::json!({}), "1"))
            .await;
        assert!(!sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_connected_times_out_while_disconnected() {
        let socket = PhoenixSocket::new("ws://localhost:4000/socket", SocketOptions::default())
            .unwrap();
        let err = socket
            .wait_connected(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, PhoenixLinkError::TimeoutError(_)));
    }
}
