use std::sync::Arc;
use thiserror::Error;

/// Result type for Synergy operations
pub type Result<T> = std::result::Result<T, SynergyError>;

/// Errors that can occur when talking to a myLink controller
///
/// Errors are `Clone` because a single failed composite request is reported
/// to every caller whose command was folded into it.
#[derive(Error, Debug, Clone)]
pub enum SynergyError {
    /// Target ID does not look like `PREFIX.NUMBER`
    #[error("Invalid Synergy targetID: {0}")]
    InvalidTarget(String),

    /// Socket connect, write or read failure
    #[error("Transport error: {0}")]
    Transport(#[source] Arc<std::io::Error>),

    /// Reply was not valid JSON
    #[error("Protocol error: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    /// Reply was JSON but not shaped like a reply
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Controller closed the connection before replying
    #[error("Connection closed")]
    ConnectionClosed,

    /// Request timed out waiting for response
    #[error("Request timeout")]
    Timeout,

    /// Reply carried an `error` member instead of a `result`
    #[error("Device error: {message}")]
    Device {
        /// Error payload as reported by the controller
        message: String,
    },

    /// A newer command for the same target replaced this one before it was sent
    #[error("Command for {target} superseded by a newer command")]
    Superseded {
        /// Target whose pending command was replaced
        target: String,
    },

    /// Scheduler dropped the command without settling it
    #[error("Command dropped before completion")]
    Dropped,

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),
}

impl SynergyError {
    /// True for errors raised while parsing or interpreting a reply
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Json(_) | Self::Protocol(_))
    }

    /// True for errors raised by the socket layer
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::ConnectionClosed | Self::Timeout)
    }
}

impl From<std::io::Error> for SynergyError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(Arc::new(e))
    }
}

impl From<serde_json::Error> for SynergyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(Arc::new(e))
    }
}
