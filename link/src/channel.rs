//! Channel, push and binding handles.
//!
//! All three are thin handles over the connection task: methods enqueue a
//! command and, where there is an answer, await it on a oneshot.

use crate::{
    connection::{BindingKey, CommandSender, SocketCmd},
    error::{PhoenixLinkError, Result},
};
use serde_json::Value;
use std::fmt;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant as TokioInstant;

/// A topic-scoped conversation on a [`PhoenixSocket`](crate::PhoenixSocket).
///
/// Obtained from [`PhoenixSocket::channel`](crate::PhoenixSocket::channel).
/// Every handle for the same topic addresses the same channel state.
#[derive(Clone)]
pub struct Channel {
    topic: String,
    cmd_tx: CommandSender,
    binding_ids: Arc<AtomicU64>,
    timeout: Duration,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("topic", &self.topic)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Channel {
    pub(crate) fn new(
        topic: String,
        cmd_tx: CommandSender,
        binding_ids: Arc<AtomicU64>,
        timeout: Duration,
    ) -> Self {
        Self {
            topic,
            cmd_tx,
            binding_ids,
            timeout,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Send `phx_join` and wait for the server's reply.
    ///
    /// Resolves with the full reply payload (`{"status": "ok", "response": ..}`)
    /// on success. Fails with [`PhoenixLinkError::JoinRejected`] when the
    /// server answers with an error, and with [`PhoenixLinkError::TimeoutError`]
    /// when no reply arrives within the socket's `timeout_ms`. Leaving the
    /// channel while a join is outstanding also ends in the timeout error.
    pub async fn join(&self) -> Result<Value> {
        let deadline = TokioInstant::now() + self.timeout;
        let (result_tx, result_rx) = oneshot::channel();
        self.send_cmd(SocketCmd::Join {
            topic: self.topic.clone(),
            result_tx,
        })?;

        match tokio::time::timeout_at(deadline, result_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                // Waiter dropped (channel left); report at the deadline like a lost reply.
                tokio::time::sleep_until(deadline).await;
                Err(self.join_timeout())
            },
            Err(_) => Err(self.join_timeout()),
        }
    }

    /// Send `phx_leave` and forget the channel.
    ///
    /// Bindings stop firing immediately. A later `channel()` call for the
    /// same topic starts from a fresh registration.
    pub fn leave(&self) {
        let _ = self.send_cmd(SocketCmd::Leave {
            topic: self.topic.clone(),
        });
    }

    /// Register a callback for every message with `event` on this topic.
    ///
    /// Callbacks for the same event fire in registration order with the
    /// payload and the message ref (`None` for broadcasts).
    pub fn on(
        &self,
        event: impl Into<String>,
        f: impl Fn(&Value, Option<&str>) + Send + Sync + 'static,
    ) -> Binding {
        let event = event.into();
        let id = Binding::next_id(&self.binding_ids);
        let _ = self.send_cmd(SocketCmd::Bind {
            topic: self.topic.clone(),
            event: event.clone(),
            id,
            callback: Arc::new(f),
        });
        Binding::new(
            BindingKey::Event {
                topic: self.topic.clone(),
                event,
                id,
            },
            self.cmd_tx.clone(),
        )
    }

    /// Called with the reply payload whenever a join succeeds.
    pub fn on_join(&self, f: impl Fn(&Value) + Send + Sync + 'static) {
        let _ = self.send_cmd(SocketCmd::SetJoinHook {
            topic: self.topic.clone(),
            callback: Arc::new(f),
        });
    }

    /// Called with the reply payload whenever a join is rejected.
    pub fn on_error(&self, f: impl Fn(&Value) + Send + Sync + 'static) {
        let _ = self.send_cmd(SocketCmd::SetErrorHook {
            topic: self.topic.clone(),
            callback: Arc::new(f),
        });
    }

    /// Send an event on this topic.
    ///
    /// The message is written immediately if the transport is open and
    /// dropped (with a warning) if not. Use [`Push::receive`] to handle the
    /// server's reply.
    pub async fn push(&self, event: impl Into<String>, payload: Value) -> Result<Push> {
        let (result_tx, result_rx) = oneshot::channel();
        self.send_cmd(SocketCmd::Push {
            topic: self.topic.clone(),
            event: event.into(),
            payload,
            result_tx,
        })?;

        let reference = result_rx
            .await
            .map_err(|_| PhoenixLinkError::ConnectionClosed)??;

        Ok(Push {
            topic: self.topic.clone(),
            reference,
            cmd_tx: self.cmd_tx.clone(),
        })
    }

    /// Whether the last join succeeded and the transport has not closed since.
    pub async fn is_joined(&self) -> bool {
        let (result_tx, result_rx) = oneshot::channel();
        if self
            .send_cmd(SocketCmd::IsJoined {
                topic: self.topic.clone(),
                result_tx,
            })
            .is_err()
        {
            return false;
        }
        result_rx.await.unwrap_or(false)
    }

    fn join_timeout(&self) -> PhoenixLinkError {
        PhoenixLinkError::TimeoutError(format!(
            "Join timeout for {} after {}ms",
            self.topic,
            self.timeout.as_millis()
        ))
    }

    fn send_cmd(&self, cmd: SocketCmd) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| PhoenixLinkError::ConnectionClosed)
    }
}

/// An event sent with [`Channel::push`], awaiting its reply.
///
/// Dropping the handle keeps any registered `receive` hooks alive until the
/// reply arrives.
pub struct Push {
    topic: String,
    reference: String,
    cmd_tx: CommandSender,
}

impl fmt::Debug for Push {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Push")
            .field("topic", &self.topic)
            .field("reference", &self.reference)
            .finish()
    }
}

impl Push {
    /// The ref this push was sent with.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Call `f` with the reply's `response` if the reply status equals `status`.
    ///
    /// Each hook fires at most once, and only for this push's reply. If the
    /// reply already arrived, a matching hook fires right away.
    pub fn receive(&self, status: &str, f: impl FnOnce(Value) + Send + 'static) -> &Self {
        let _ = self.cmd_tx.send(SocketCmd::Receive {
            topic: self.topic.clone(),
            reference: self.reference.clone(),
            status: status.to_string(),
            callback: Box::new(f),
        });
        self
    }
}

impl Drop for Push {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(SocketCmd::Release {
            topic: std::mem::take(&mut self.topic),
            reference: std::mem::take(&mut self.reference),
        });
    }
}

/// A registered callback. Call [`off`](Self::off) to remove it.
///
/// Dropping a `Binding` leaves the callback registered.
pub struct Binding {
    key: BindingKey,
    cmd_tx: CommandSender,
    removed: AtomicBool,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key)
            .field("removed", &self.removed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Binding {
    pub(crate) fn new(key: BindingKey, cmd_tx: CommandSender) -> Self {
        Self {
            key,
            cmd_tx,
            removed: AtomicBool::new(false),
        }
    }

    pub(crate) fn next_id(ids: &AtomicU64) -> u64 {
        ids.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Remove the callback. Calling this more than once has no effect.
    pub fn off(&self) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.cmd_tx.send(SocketCmd::Unbind(self.key.clone()));
    }
}
