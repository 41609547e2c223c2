//! The connection task behind every [`PhoenixSocket`](crate::PhoenixSocket).
//!
//! One Tokio task per socket owns everything mutable:
//!
//! - the transport (at most one, opened on `connect()`)
//! - the channel registry, keyed by topic
//! - the ref counter (every outbound frame gets the next value)
//! - the heartbeat timer and the outstanding heartbeat ref
//! - pending push replies, keyed by `(topic, ref)`
//!
//! Public handles only enqueue [`SocketCmd`]s. Commands and inbound frames are
//! processed one at a time, commands first, so a callback registered before
//! a frame arrives always sees that frame.

use crate::{
    connection::{
        websocket::{BoxedTransport, ConnectFuture, Connector},
        FAR_FUTURE,
    },
    error::{PhoenixLinkError, Result},
    event_handlers::{run_callback, ConnectionError, DisconnectReason, EventHandlers},
    models::{ConnectionState, Message, Reply, SocketOptions},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::{error::Error as WsError, protocol::Message as WsMessage};

/// Channel event callback: `(payload, ref)`.
pub type EventCallback = Arc<dyn Fn(&Value, Option<&str>) + Send + Sync>;

/// Join-success / join-error callback, called with the reply payload.
pub type PayloadCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Socket-wide observer, called with every parsed inbound message.
pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;

/// One-shot push reply hook, called with the reply's `response`.
pub type ReplyCallback = Box<dyn FnOnce(Value) + Send>;

pub(crate) type CommandSender = mpsc::UnboundedSender<SocketCmd>;

// ── Commands ────────────────────────────────────────────────────────────────

/// Identifies one registered callback so it can be removed again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BindingKey {
    Event { topic: String, event: String, id: u64 },
    Message { id: u64 },
}

/// Commands sent from the public handles to the connection task.
pub(crate) enum SocketCmd {
    Connect,
    Disconnect,
    /// Create the channel unless the topic is already registered.
    Register { topic: String, params: Value },
    Join {
        topic: String,
        result_tx: oneshot::Sender<Result<Value>>,
    },
    Leave { topic: String },
    Bind {
        topic: String,
        event: String,
        id: u64,
        callback: EventCallback,
    },
    OnMessage { id: u64, callback: MessageCallback },
    Unbind(BindingKey),
    SetJoinHook { topic: String, callback: PayloadCallback },
    SetErrorHook { topic: String, callback: PayloadCallback },
    Push {
        topic: String,
        event: String,
        payload: Value,
        result_tx: oneshot::Sender<Result<String>>,
    },
    Receive {
        topic: String,
        reference: String,
        status: String,
        callback: ReplyCallback,
    },
    /// The `Push` handle was dropped; forget the pending reply unless a hook
    /// is still waiting on it.
    Release { topic: String, reference: String },
    Send {
        message: Message,
        result_tx: oneshot::Sender<bool>,
    },
    IsJoined {
        topic: String,
        result_tx: oneshot::Sender<bool>,
    },
    ListTopics { result_tx: oneshot::Sender<Vec<String>> },
    Shutdown,
}

// ── Per-channel state ───────────────────────────────────────────────────────

#[derive(Default)]
struct PendingReply {
    hooks: Vec<(String, ReplyCallback)>,
    /// Reply that arrived before any hook was registered.
    early: Option<Reply>,
}

struct ChannelEntry {
    params: Value,
    joined: bool,
    join_pending: bool,
    /// Ref of the outstanding `phx_join`.
    join_ref: Option<String>,
    join_waiter: Option<oneshot::Sender<Result<Value>>>,
    on_join: Option<PayloadCallback>,
    on_error: Option<PayloadCallback>,
    /// Event name to callbacks, in registration order.
    bindings: HashMap<String, Vec<(u64, EventCallback)>>,
    pending_replies: HashMap<String, PendingReply>,
}

impl ChannelEntry {
    fn new(params: Value) -> Self {
        Self {
            params,
            joined: false,
            join_pending: false,
            join_ref: None,
            join_waiter: None,
            on_join: None,
            on_error: None,
            bindings: HashMap::new(),
            pending_replies: HashMap::new(),
        }
    }

    /// Route one inbound message addressed to this channel.
    fn dispatch(&mut self, message: &Message) {
        if message.is_reply() {
            if let Some(reply) = Reply::from_payload(&message.payload) {
                match message.reference.as_deref() {
                    Some(r) if self.pending_replies.contains_key(r) => {
                        self.resolve_push(r, reply)
                    },
                    Some(r) if self.join_ref.as_deref() == Some(r) => {
                        self.resolve_join(&reply, &message.payload)
                    },
                    None => self.resolve_join(&reply, &message.payload),
                    Some(r) => log::debug!(
                        "[phoenix-link] Dropping reply for released ref {} on {}",
                        r,
                        message.topic
                    ),
                }
            }
        }

        if let Some(callbacks) = self.bindings.get(&message.event) {
            for (_, callback) in callbacks {
                run_callback("on", || {
                    callback(&message.payload, message.reference.as_deref())
                });
            }
        }
    }

    fn resolve_join(&mut self, reply: &Reply, payload: &Value) {
        if !self.join_pending {
            return;
        }

        if reply.is_ok() {
            self.joined = true;
            self.join_pending = false;
            self.join_ref = None;
            if let Some(tx) = self.join_waiter.take() {
                let _ = tx.send(Ok(payload.clone()));
            }
            if let Some(cb) = &self.on_join {
                run_callback("on_join", || cb(payload));
            }
        } else if reply.is_error() {
            self.join_pending = false;
            self.join_ref = None;
            if let Some(tx) = self.join_waiter.take() {
                let _ = tx.send(Err(PhoenixLinkError::JoinRejected {
                    reason: reply.reason(),
                }));
            }
            if let Some(cb) = &self.on_error {
                run_callback("on_error", || cb(payload));
            }
        }
    }

    fn resolve_push(&mut self, reference: &str, reply: Reply) {
        let Some(mut pending) = self.pending_replies.remove(reference) else {
            return;
        };

        if pending.hooks.is_empty() {
            pending.early = Some(reply);
            self.pending_replies.insert(reference.to_string(), pending);
            return;
        }

        for (status, callback) in pending.hooks {
            if status == reply.status {
                run_callback("receive", || callback(reply.response.clone()));
            }
        }
    }

    fn add_reply_hook(&mut self, reference: String, status: String, callback: ReplyCallback) {
        let Some(pending) = self.pending_replies.get_mut(&reference) else {
            log::debug!(
                "[phoenix-link] Reply for ref {} already delivered; dropping '{}' hook",
                reference,
                status
            );
            return;
        };

        match pending.early.take() {
            Some(reply) if reply.status == status => {
                self.pending_replies.remove(&reference);
                run_callback("receive", || callback(reply.response));
            },
            early => {
                pending.early = early;
                pending.hooks.push((status, callback));
            },
        }
    }

    fn release_reply(&mut self, reference: &str) {
        let settled = self
            .pending_replies
            .get(reference)
            .map_or(false, |p| p.hooks.is_empty() || p.early.is_some());
        if settled {
            self.pending_replies.remove(reference);
        }
    }
}

// ── Task state ──────────────────────────────────────────────────────────────

struct SocketCore {
    url: String,
    options: SocketOptions,
    connector: Connector,
    event_handlers: EventHandlers,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    channels: HashMap<String, ChannelEntry>,
    observers: Vec<(u64, MessageCallback)>,
    ref_counter: u64,
    pending_heartbeat_ref: Option<String>,
    heartbeat_deadline: Option<TokioInstant>,
    transport: Option<BoxedTransport>,
    connecting: Option<ConnectFuture>,
}

impl SocketCore {
    fn make_ref(&mut self) -> String {
        self.ref_counter += 1;
        self.ref_counter.to_string()
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    async fn handle_command(&mut self, cmd: SocketCmd) {
        match cmd {
            SocketCmd::Connect => self.connect(),
            SocketCmd::Disconnect => self.disconnect().await,
            SocketCmd::Register { topic, params } => {
                self.channels
                    .entry(topic)
                    .or_insert_with(|| ChannelEntry::new(params));
            },
            SocketCmd::Join { topic, result_tx } => self.join(topic, result_tx).await,
            SocketCmd::Leave { topic } => self.leave(&topic).await,
            SocketCmd::Bind {
                topic,
                event,
                id,
                callback,
            } => match self.channels.get_mut(&topic) {
                Some(entry) => entry.bindings.entry(event).or_default().push((id, callback)),
                None => log::warn!("[phoenix-link] No channel found for topic: {}", topic),
            },
            SocketCmd::OnMessage { id, callback } => self.observers.push((id, callback)),
            SocketCmd::Unbind(key) => self.unbind(key),
            SocketCmd::SetJoinHook { topic, callback } => match self.channels.get_mut(&topic) {
                Some(entry) => entry.on_join = Some(callback),
                None => log::warn!("[phoenix-link] No channel found for topic: {}", topic),
            },
            SocketCmd::SetErrorHook { topic, callback } => match self.channels.get_mut(&topic) {
                Some(entry) => entry.on_error = Some(callback),
                None => log::warn!("[phoenix-link] No channel found for topic: {}", topic),
            },
            SocketCmd::Push {
                topic,
                event,
                payload,
                result_tx,
            } => {
                let result = self.push(topic, event, payload).await;
                let _ = result_tx.send(result);
            },
            SocketCmd::Receive {
                topic,
                reference,
                status,
                callback,
            } => match self.channels.get_mut(&topic) {
                Some(entry) => entry.add_reply_hook(reference, status, callback),
                None => log::debug!(
                    "[phoenix-link] Channel {} was left; dropping reply hook for ref {}",
                    topic,
                    reference
                ),
            },
            SocketCmd::Release { topic, reference } => {
                if let Some(entry) = self.channels.get_mut(&topic) {
                    entry.release_reply(&reference);
                }
            },
            SocketCmd::Send { message, result_tx } => {
                let sent = self.write(&message).await;
                let _ = result_tx.send(sent);
            },
            SocketCmd::IsJoined { topic, result_tx } => {
                let joined = self.channels.get(&topic).map_or(false, |e| e.joined);
                let _ = result_tx.send(joined);
            },
            SocketCmd::ListTopics { result_tx } => {
                let mut topics: Vec<String> = self.channels.keys().cloned().collect();
                topics.sort();
                let _ = result_tx.send(topics);
            },
            // Handled by the task loop before dispatch.
            SocketCmd::Shutdown => {},
        }
    }

    fn connect(&mut self) {
        if self.transport.is_some() || self.connecting.is_some() {
            log::debug!("[phoenix-link] connect() ignored: transport already {}", self.state);
            return;
        }

        log::info!("[phoenix-link] Connecting to {}", self.url);
        self.set_state(ConnectionState::Connecting);
        self.connecting = Some((self.connector)(self.url.clone()));
    }

    async fn disconnect(&mut self) {
        if self.transport.is_none() && self.connecting.is_none() {
            return;
        }

        self.stop_heartbeat();
        self.connecting = None;
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                log::debug!("[phoenix-link] Error closing transport: {}", e);
            }
        }
        self.handle_close(DisconnectReason::with_code("Client disconnected", 1000));
    }

    fn handle_connect_result(
        &mut self,
        result: std::result::Result<BoxedTransport, ConnectionError>,
    ) {
        self.connecting = None;
        match result {
            Ok(transport) => {
                self.transport = Some(transport);
                self.set_state(ConnectionState::Connected);
                log::info!("[phoenix-link] Connected to {}", self.url);
                self.schedule_heartbeat();
                self.event_handlers.emit_connect();
            },
            Err(error) => {
                log::error!("[phoenix-link] WebSocket error: {}", error);
                self.event_handlers.emit_error(error.clone());
                self.handle_close(DisconnectReason::new(error.message));
            },
        }
    }

    fn handle_close(&mut self, reason: DisconnectReason) {
        log::info!("[phoenix-link] WebSocket closed: {}", reason);
        self.transport = None;
        self.set_state(ConnectionState::Disconnected);
        self.stop_heartbeat();
        for entry in self.channels.values_mut() {
            entry.joined = false;
        }
        self.event_handlers.emit_disconnect(reason);
    }

    async fn join(&mut self, topic: String, result_tx: oneshot::Sender<Result<Value>>) {
        if !self.channels.contains_key(&topic) {
            let _ = result_tx.send(Err(PhoenixLinkError::UnknownTopic(topic)));
            return;
        }

        let reference = self.make_ref();
        let Some(entry) = self.channels.get_mut(&topic) else {
            return;
        };
        entry.join_pending = true;
        entry.join_ref = Some(reference.clone());
        entry.join_waiter = Some(result_tx);
        let message = Message::join(&topic, entry.params.clone(), reference);

        self.write(&message).await;
    }

    async fn leave(&mut self, topic: &str) {
        if !self.channels.contains_key(topic) {
            log::debug!("[phoenix-link] leave() ignored: {} is not registered", topic);
            return;
        }

        let reference = self.make_ref();
        self.write(&Message::leave(topic, reference)).await;
        self.channels.remove(topic);
    }

    async fn push(&mut self, topic: String, event: String, payload: Value) -> Result<String> {
        if !self.channels.contains_key(&topic) {
            return Err(PhoenixLinkError::UnknownTopic(topic));
        }

        let reference = self.make_ref();
        if let Some(entry) = self.channels.get_mut(&topic) {
            entry
                .pending_replies
                .insert(reference.clone(), PendingReply::default());
        }
        self.write(&Message::new(topic, event, payload, reference.clone()))
            .await;
        Ok(reference)
    }

    fn unbind(&mut self, key: BindingKey) {
        match key {
            BindingKey::Event { topic, event, id } => {
                let Some(entry) = self.channels.get_mut(&topic) else {
                    return;
                };
                if let Some(callbacks) = entry.bindings.get_mut(&event) {
                    callbacks.retain(|(cb_id, _)| *cb_id != id);
                    if callbacks.is_empty() {
                        entry.bindings.remove(&event);
                    }
                }
            },
            BindingKey::Message { id } => self.observers.retain(|(cb_id, _)| *cb_id != id),
        }
    }

    // ── Heartbeat ───────────────────────────────────────────────────────────

    fn schedule_heartbeat(&mut self) {
        let interval = self.options.heartbeat_interval();
        self.heartbeat_deadline = if interval.is_zero() {
            None
        } else {
            Some(TokioInstant::now() + interval)
        };
    }

    fn stop_heartbeat(&mut self) {
        self.heartbeat_deadline = None;
        self.pending_heartbeat_ref = None;
    }

    /// The next heartbeat is only scheduled once this one is acknowledged.
    async fn send_heartbeat(&mut self) {
        self.heartbeat_deadline = None;
        if !self.state.is_connected() {
            return;
        }

        let reference = self.make_ref();
        self.pending_heartbeat_ref = Some(reference.clone());
        self.write(&Message::heartbeat(reference)).await;
    }

    // ── Inbound ─────────────────────────────────────────────────────────────

    async fn handle_frame(&mut self, frame: Option<std::result::Result<WsMessage, WsError>>) {
        match frame {
            Some(Ok(WsMessage::Text(text))) => self.handle_text(text.as_str()),
            Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => self.handle_text(text),
                Err(e) => log::warn!("[phoenix-link] Dropping non UTF-8 binary frame: {}", e),
            },
            Some(Ok(WsMessage::Ping(payload))) => {
                if let Some(transport) = self.transport.as_mut() {
                    if let Err(e) = transport.send(WsMessage::Pong(payload)).await {
                        log::debug!("[phoenix-link] Error answering ping: {}", e);
                    }
                }
            },
            Some(Ok(WsMessage::Pong(_))) | Some(Ok(WsMessage::Frame(_))) => {},
            Some(Ok(WsMessage::Close(frame))) => {
                let reason = match frame {
                    Some(f) => DisconnectReason::with_code(f.reason.as_str(), f.code.into()),
                    None => DisconnectReason::new("Server closed connection"),
                };
                self.handle_close(reason);
            },
            Some(Err(e)) => {
                let message = e.to_string();
                log::error!("[phoenix-link] WebSocket error: {}", message);
                self.stop_heartbeat();
                self.event_handlers
                    .emit_error(ConnectionError::new(&message, true));
                self.handle_close(DisconnectReason::new(format!("WebSocket error: {}", message)));
            },
            None => self.handle_close(DisconnectReason::new("WebSocket stream ended")),
        }
    }

    fn handle_text(&mut self, text: &str) {
        self.event_handlers.emit_receive(text);

        let message = match Message::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("[phoenix-link] Error parsing message: {}", e);
                return;
            },
        };
        log::debug!(
            "[phoenix-link] Received {} on {} (ref {:?})",
            message.event,
            message.topic,
            message.reference
        );

        if message.reference.is_some() && message.reference == self.pending_heartbeat_ref {
            self.pending_heartbeat_ref = None;
            self.schedule_heartbeat();
            return;
        }

        if let Some(entry) = self.channels.get_mut(&message.topic) {
            entry.dispatch(&message);
        }

        for (_, observer) in &self.observers {
            run_callback("on_message", || observer(&message));
        }
    }

    // ── Outbound ────────────────────────────────────────────────────────────

    /// Serialize and write one frame. Returns `false` instead of failing.
    async fn write(&mut self, message: &Message) -> bool {
        let transport = match self.transport.as_mut() {
            Some(transport) if self.state.is_connected() => transport,
            _ => {
                log::warn!(
                    "[phoenix-link] Tried to send {} on {} while disconnected",
                    message.event,
                    message.topic
                );
                return false;
            },
        };

        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                log::error!("[phoenix-link] Error serializing message: {}", e);
                return false;
            },
        };

        match transport.send(WsMessage::Text(text.clone().into())).await {
            Ok(()) => {
                log::debug!(
                    "[phoenix-link] Sent {} on {} (ref {:?})",
                    message.event,
                    message.topic,
                    message.reference
                );
                self.event_handlers.emit_send(&text);
                true
            },
            Err(e) => {
                log::error!("[phoenix-link] Error sending message: {}", e);
                false
            },
        }
    }

    async fn shutdown(&mut self) {
        self.disconnect().await;
        self.channels.clear();
        self.observers.clear();
    }
}

impl Drop for SocketCore {
    fn drop(&mut self) {
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }
}

// ── Background connection task ──────────────────────────────────────────────

pub(crate) fn spawn_connection_task(
    url: String,
    options: SocketOptions,
    connector: Connector,
    event_handlers: EventHandlers,
) -> (CommandSender, watch::Receiver<ConnectionState>, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let core = SocketCore {
        url,
        options,
        connector,
        event_handlers,
        state: ConnectionState::Disconnected,
        state_tx,
        channels: HashMap::new(),
        observers: Vec::new(),
        ref_counter: 0,
        pending_heartbeat_ref: None,
        heartbeat_deadline: None,
        transport: None,
        connecting: None,
    };

    let task = tokio::spawn(connection_task(cmd_rx, core));
    (cmd_tx, state_rx, task)
}

async fn next_frame(
    transport: &mut Option<BoxedTransport>,
) -> Option<std::result::Result<WsMessage, WsError>> {
    match transport {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}

async fn poll_connecting(
    connecting: &mut Option<ConnectFuture>,
) -> std::result::Result<BoxedTransport, ConnectionError> {
    match connecting {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn connection_task(mut cmd_rx: mpsc::UnboundedReceiver<SocketCmd>, mut core: SocketCore) {
    loop {
        let heartbeat_at = core
            .heartbeat_deadline
            .unwrap_or_else(|| TokioInstant::now() + FAR_FUTURE);
        let heartbeat_sleep = tokio::time::sleep_until(heartbeat_at);
        tokio::pin!(heartbeat_sleep);

        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => match cmd {
                Some(SocketCmd::Shutdown) | None => {
                    core.shutdown().await;
                    log::debug!("[phoenix-link] Connection task stopped");
                    return;
                },
                Some(cmd) => core.handle_command(cmd).await,
            },

            opened = poll_connecting(&mut core.connecting) => core.handle_connect_result(opened),

            frame = next_frame(&mut core.transport) => core.handle_frame(frame).await,

            _ = &mut heartbeat_sleep, if core.heartbeat_deadline.is_some() => {
                core.send_heartbeat().await;
            }
        }
    }
}
