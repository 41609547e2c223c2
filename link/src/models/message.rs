use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Topic reserved for connection-level traffic (heartbeats).
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Reserved event names of the channels protocol.
pub mod events {
    pub const JOIN: &str = "phx_join";
    pub const LEAVE: &str = "phx_leave";
    pub const REPLY: &str = "phx_reply";
    pub const HEARTBEAT: &str = "heartbeat";
}

/// The wire unit: one JSON object with `topic`, `event`, `payload` and `ref`.
///
/// Outbound messages always carry a ref allocated by the socket. Inbound
/// broadcasts may carry `"ref": null`, which maps to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl Message {
    pub fn new(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Value,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            reference: Some(reference.into()),
        }
    }

    pub fn join(topic: &str, params: Value, reference: String) -> Self {
        Self::new(topic, events::JOIN, params, reference)
    }

    pub fn leave(topic: &str, reference: String) -> Self {
        Self::new(topic, events::LEAVE, json!({}), reference)
    }

    pub fn heartbeat(reference: String) -> Self {
        Self::new(PHOENIX_TOPIC, events::HEARTBEAT, json!({}), reference)
    }

    pub fn is_reply(&self) -> bool {
        self.event == events::REPLY
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
