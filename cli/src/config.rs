//! Configuration file management
//!
//! CLIConfiguration with TOML parsing for ~/.phx/config.toml
//!
//! # Configuration Format
//!
//! ```toml
//! [server]
//! url = "ws://localhost:4000/socket"   # Phoenix socket endpoint
//!
//! [server.params]                      # Sent as the connection query string
//! vsn = "2.0.0"
//!
//! [socket]
//! timeout_ms = 10000                   # Join timeout
//! heartbeat_interval_ms = 30000        # 0 disables heartbeats
//! ```

use phoenix_link::SocketOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CLIError, Result};

/// Endpoint used when neither the command line nor the config file names one.
pub const DEFAULT_URL: &str = "ws://localhost:4000/socket";

pub const DEFAULT_CONFIG_PATH: &str = "~/.phx/config.toml";

/// CLI configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CLIConfiguration {
    /// Server endpoint settings
    pub server: Option<ServerConfig>,

    /// Socket timing settings
    pub socket: Option<SocketConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket endpoint (e.g., ws://localhost:4000/socket)
    pub url: Option<String>,

    /// Extra connection params
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_timeout_ms() -> u64 {
    SocketOptions::default().timeout_ms
}

fn default_heartbeat_interval_ms() -> u64 {
    SocketOptions::default().heartbeat_interval_ms
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

pub fn expand_config_path(path: &Path) -> PathBuf {
    let path_str = path.to_str().unwrap_or(DEFAULT_CONFIG_PATH);
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    }
    path.to_path_buf()
}

pub fn default_config_path() -> PathBuf {
    expand_config_path(Path::new(DEFAULT_CONFIG_PATH))
}

impl CLIConfiguration {
    /// Load configuration from file
    ///
    /// Returns default configuration if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_config_path(path);
        let path = &expanded_path;

        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            CLIError::ConfigurationError(format!("Failed to read config file: {}", e))
        })?;

        let config: CLIConfiguration = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let expanded_path = expand_config_path(path);
        let path = &expanded_path;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| CLIError::ConfigurationError(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Endpoint to connect to: the command-line value, then the config file,
    /// then [`DEFAULT_URL`].
    pub fn resolve_url(&self, cli_url: Option<&str>) -> String {
        cli_url
            .map(str::to_string)
            .or_else(|| self.server.as_ref().and_then(|s| s.url.clone()))
            .unwrap_or_else(|| DEFAULT_URL.to_string())
    }

    /// Build SocketOptions from CLI configuration
    pub fn to_socket_options(&self) -> SocketOptions {
        let socket = self.socket.clone().unwrap_or_default();
        let params = self
            .server
            .as_ref()
            .map(|s| s.params.clone())
            .unwrap_or_default();

        SocketOptions::new()
            .with_params(params)
            .with_timeout_ms(socket.timeout_ms)
            .with_heartbeat_interval_ms(socket.heartbeat_interval_ms)
    }
}
