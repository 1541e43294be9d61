//! Error types for wg-steward
//!
//! This module defines the error types used throughout the crate.
//! We use `thiserror` for ergonomic error definitions and `anyhow` for
//! error propagation in the CLI binary.

use thiserror::Error;

/// Main error type for wg-steward operations
#[derive(Error, Debug)]
pub enum StewardError {
    /// Session establishment failures (SSH handshake, RouterOS login).
    /// Also raised when a transport exhausts its reconnect attempts.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Mid-session transport failures that were not recovered by a retry
    #[error("Transport error: {0}")]
    Transport(String),

    /// A remote command returned an unusable result
    #[error("Command failed: {0}")]
    Command(String),

    /// Malformed configuration text or a section missing an expected key
    #[error("Parse error: {0}")]
    Parse(String),

    /// Descriptor/configuration validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lookups by an unknown peer public key or server name
    #[error("Not found: {0}")]
    NotFound(String),

    /// The interface subnet has no free host address left
    #[error("Address pool exhausted: {0}")]
    AddressPoolExhausted(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using StewardError
pub type Result<T> = std::result::Result<T, StewardError>;

impl From<toml::de::Error> for StewardError {
    fn from(err: toml::de::Error) -> Self {
        StewardError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for StewardError {
    fn from(err: serde_json::Error) -> Self {
        StewardError::Config(err.to_string())
    }
}
