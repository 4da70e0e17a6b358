//! Error types for tvlink-core

use thiserror::Error;

/// Error type shared by the transport, the correlator and every adapter
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Connection timed out after {0}ms")]
    ConnectTimeout(u64),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Request {id} timed out after {timeout_ms}ms")]
    RequestTimeout { id: String, timeout_ms: u64 },

    #[error("Disconnected")]
    Disconnected,

    #[error("Not connected")]
    NotConnected,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Bridge unreachable: {0}")]
    BridgeUnreachable(String),

    #[error("Proxy backend error: {0}")]
    Proxy(String),

    #[error("TV rejected request: {0}")]
    Rejected(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config store error: {0}")]
    Store(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RemoteError>;

impl From<tokio_tungstenite::tungstenite::Error> for RemoteError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

impl From<url::ParseError> for RemoteError {
    fn from(err: url::ParseError) -> Self {
        RemoteError::InvalidConfig(format!("invalid URL: {}", err))
    }
}
