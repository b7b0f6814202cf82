//! Error types for the relay client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The relay could not be reached
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The relay closed the connection or it broke mid-session
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Every reconnection attempt failed
    #[error("Failed to reconnect after {0} attempts")]
    ReconnectExhausted(u32),
}
