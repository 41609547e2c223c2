//! Library entry point for phoenix-cli components.
//!
//! Exposes the configuration loader, error type and subcommand
//! implementations so tests can drive them without going through the
//! binary entry point.

pub mod commands;
pub mod config;
pub mod error;

pub use config::CLIConfiguration;
pub use error::{CLIError, Result};
