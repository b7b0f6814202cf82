//! Outcome of a send request.

use std::fmt;

/// Result of `send`, rendered as the status text the host shows to its user.
///
/// Sending never fails with an error value: every failure is folded into a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    /// The TCP client accepted the full message
    SentToTcpClient,
    /// The message was queued for this many WebSocket connections
    SentToConnections(usize),
    /// TCP mode with no client connected
    TcpClientNotConnected,
    /// No relay is running
    NotFound,
    /// Writing failed
    Error(String),
}

impl SendStatus {
    pub fn is_sent(&self) -> bool {
        matches!(
            self,
            SendStatus::SentToTcpClient | SendStatus::SentToConnections(_)
        )
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendStatus::SentToTcpClient => f.write_str("Sent to TCP client"),
            SendStatus::SentToConnections(count) => write!(f, "Sent message to {}", count),
            SendStatus::TcpClientNotConnected => f.write_str("TCP client not connected"),
            SendStatus::NotFound => f.write_str("Not found"),
            SendStatus::Error(detail) => write!(f, "Error: {}", detail),
        }
    }
}
