//! Relay trait definition.
//!
//! The controller only talks to the running relay through this trait, so the
//! TCP and WebSocket implementations stay interchangeable behind it.

use std::net::SocketAddr;

use async_trait::async_trait;

use super::{SendStatus, ServerMode};

#[async_trait]
pub trait Relay: Send + Sync {
    /// Mode this relay serves
    fn mode(&self) -> ServerMode;

    /// Address the listener is bound to
    fn local_addr(&self) -> SocketAddr;

    /// Deliver `message` to the tracked connection(s)
    async fn send(&self, message: &str) -> SendStatus;

    /// Number of connections currently tracked
    async fn connection_count(&self) -> usize;

    /// Close every connection and release the listener.
    ///
    /// Once this returns the port is free again. Calling it twice is harmless.
    async fn shutdown(&mut self);
}
