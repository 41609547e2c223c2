//! Error types for phoenix-cli
//!
//! Provides user-friendly error messages for common CLI failures.

use phoenix_link::PhoenixLinkError;
use thiserror::Error;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CLIError>;

/// Errors that can occur in the CLI
#[derive(Error, Debug)]
pub enum CLIError {
    /// Error from phoenix-link library
    #[error("{}", format_link_error(.0))]
    LinkError(#[from] PhoenixLinkError),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// File or terminal I/O error
    #[error("I/O error: {0}")]
    IoError(String),

    /// Input rejected before it was sent
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Standard input closed
    #[error("Operation cancelled")]
    Cancelled,
}

fn format_link_error(err: &PhoenixLinkError) -> String {
    match err {
        PhoenixLinkError::TimeoutError(msg) => format!("Timed out: {}", msg),
        PhoenixLinkError::JoinRejected { reason } => format!("Server refused join: {}", reason),
        PhoenixLinkError::ConnectionClosed => "Connection closed".to_string(),
        other => other.to_string(),
    }
}

impl From<std::io::Error> for CLIError {
    fn from(err: std::io::Error) -> Self {
        CLIError::IoError(err.to_string())
    }
}

impl From<toml::de::Error> for CLIError {
    fn from(err: toml::de::Error) -> Self {
        CLIError::ConfigurationError(format!("TOML parse error: {}", err))
    }
}
