use serde_json::Value;

pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";

/// Fallback reason when a rejected join carries no `response.reason`.
pub const DEFAULT_JOIN_FAILURE: &str = "Join failed";

/// Decoded payload of a `phx_reply` frame: `{"status": ..., "response": ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: String,
    pub response: Value,
}

impl Reply {
    /// Returns `None` when the payload has no string `status`.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let status = payload.get("status")?.as_str()?.to_string();
        let response = payload.get("response").cloned().unwrap_or(Value::Null);
        Some(Self { status, response })
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn is_error(&self) -> bool {
        self.status == STATUS_ERROR
    }

    /// Human-readable reason for a rejected join.
    pub fn reason(&self) -> String {
        self.response
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_JOIN_FAILURE)
            .to_string()
    }
}
