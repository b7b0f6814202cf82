//! Error types for the relay.

use std::{io, net::SocketAddr};

use thiserror::Error;

/// Failures that must surface to the caller of the relay.
///
/// Per-connection I/O problems are not represented here: they are logged
/// and only cost the affected connection.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listener could not claim its address (port in use, no permission, ...)
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The bound listener could not report its local address
    #[error("Failed to read listener address: {0}")]
    LocalAddr(#[source] io::Error),

    /// A companion process could not be launched
    #[error("Failed to start program '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// A server mode string other than `"tcp"` or `"ws"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown server mode '{0}' (expected \"tcp\" or \"ws\")")]
pub struct ParseModeError(pub String);
