//! Inbound message events and the channel that carries them to the subscriber.

use std::{fmt, sync::Arc};

use tobira_shared::time::Clock;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identity of one accepted client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One message relayed from a client to the subscriber.
///
/// For TCP the payload is whatever a single read returned; for WebSocket it is
/// one text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Connection the payload arrived on
    pub connection_id: ConnectionId,
    /// Decoded text payload
    pub payload: String,
    /// Unix timestamp when the payload was relayed (milliseconds)
    pub received_at: i64,
}

/// Receiving end handed to the subscriber when the controller is created.
pub type MessageReceiver = mpsc::UnboundedReceiver<InboundMessage>;

/// Sending end shared by every relay.
///
/// Emitting never blocks and never fails the relay: with no subscriber left
/// the message is dropped.
#[derive(Clone)]
pub struct MessageSink {
    sender: mpsc::UnboundedSender<InboundMessage>,
    clock: Arc<dyn Clock>,
}

impl MessageSink {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, MessageReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender, clock }, receiver)
    }

    pub fn emit(&self, connection_id: ConnectionId, payload: String) {
        let message = InboundMessage {
            connection_id,
            payload,
            received_at: self.clock.now_millis(),
        };
        if self.sender.send(message).is_err() {
            tracing::debug!(
                "No subscriber for messages, dropping payload from '{}'",
                connection_id
            );
        }
    }
}
