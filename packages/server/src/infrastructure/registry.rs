//! Registry of open connections.
//!
//! ## Responsibilities
//!
//! - Keep one outbound channel per open connection
//! - Broadcast a message to every registered connection
//! - Close every connection when the relay stops
//!
//! The socket itself is owned by the per-connection task; the registry only
//! holds the channel feeding that task. Every access goes through one mutex,
//! so open/close callbacks and broadcasts never observe a half-updated set.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, mpsc};

use crate::domain::{ConnectionId, MessageSink};

/// Instruction for the task that writes to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write a text message
    Text(String),
    /// Send a close frame and stop writing
    Close,
}

pub type ConnectionChannel = mpsc::UnboundedSender<Outbound>;

#[derive(Default)]
struct Connections {
    channels: HashMap<ConnectionId, ConnectionChannel>,
    /// Set by `close_all`; a closed registry accepts no new connections.
    closed: bool,
}

/// Concurrency-safe set of open connections.
///
/// Cloning yields another handle to the same set.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<Connections>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly opened connection.
    ///
    /// Returns `false` once the registry has been closed; the caller then
    /// owns the connection and must close it.
    pub async fn register(&self, connection_id: ConnectionId, channel: ConnectionChannel) -> bool {
        let mut connections = self.connections.lock().await;
        if connections.closed {
            tracing::debug!("Registry closed, refusing connection '{}'", connection_id);
            return false;
        }
        connections.channels.insert(connection_id, channel);
        tracing::debug!(
            "Connection '{}' registered ({} open)",
            connection_id,
            connections.channels.len()
        );
        true
    }

    /// Remove a connection; returns whether it was still registered.
    pub async fn deregister(&self, connection_id: &ConnectionId) -> bool {
        let mut connections = self.connections.lock().await;
        let removed = connections.channels.remove(connection_id).is_some();
        if removed {
            tracing::debug!(
                "Connection '{}' deregistered ({} open)",
                connection_id,
                connections.channels.len()
            );
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.channels.len()
    }

    /// Hand an inbound payload to `sink` if the connection is still registered.
    ///
    /// The check and the hand-off happen under the registry lock, so nothing
    /// from a connection gets through once `deregister` or `close_all` removed it.
    pub async fn forward(
        &self,
        connection_id: ConnectionId,
        payload: String,
        sink: &MessageSink,
    ) -> bool {
        let connections = self.connections.lock().await;
        if !connections.channels.contains_key(&connection_id) {
            return false;
        }
        sink.emit(connection_id, payload);
        true
    }

    /// Queue `content` for every registered connection.
    ///
    /// Returns how many connections accepted the message. A connection whose
    /// writer is already gone is logged and removed; the others still get it.
    pub async fn broadcast(&self, content: &str) -> usize {
        let mut connections = self.connections.lock().await;
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (connection_id, channel) in connections.channels.iter() {
            match channel.send(Outbound::Text(content.to_string())) {
                Ok(()) => {
                    delivered += 1;
                    tracing::debug!("Queued message for connection '{}'", connection_id);
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to queue message for connection '{}': {}",
                        connection_id,
                        e
                    );
                    dead.push(*connection_id);
                }
            }
        }

        for connection_id in dead {
            connections.channels.remove(&connection_id);
        }

        delivered
    }

    /// Ask every connection to close, empty the registry and refuse later registrations.
    ///
    /// Returns the number of connections that were registered.
    pub async fn close_all(&self) -> usize {
        let mut connections = self.connections.lock().await;
        connections.closed = true;
        let count = connections.channels.len();
        for (connection_id, channel) in connections.channels.drain() {
            // the writer may already be gone, which closes the socket anyway
            if channel.send(Outbound::Close).is_err() {
                tracing::debug!("Connection '{}' was already closing", connection_id);
            }
        }
        count
    }
}
