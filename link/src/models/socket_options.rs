use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Options recognized by [`PhoenixSocket`](crate::PhoenixSocket).
///
/// # Example
///
/// ```rust
/// use phoenix_link::SocketOptions;
///
/// let options = SocketOptions::default()
///     .with_param("token", "abc123")
///     .with_timeout_ms(5_000)
///     .with_heartbeat_interval_ms(15_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketOptions {
    /// Extra query parameters appended to the connection URL.
    /// Default: empty
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// How long `join()` waits for the server's reply, in milliseconds.
    /// Default: 10000ms
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Delay between a connection opening (or a heartbeat being
    /// acknowledged) and the next heartbeat, in milliseconds.
    /// Default: 30000ms
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            params: BTreeMap::new(),
            timeout_ms: default_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl SocketOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one connection query parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replace all connection query parameters.
    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}
