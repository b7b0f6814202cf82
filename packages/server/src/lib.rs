//! Dual-protocol message relay library.
//!
//! A [`ui::ServerController`] runs either a raw TCP relay or a WebSocket relay
//! (never both), forwards every inbound client message to a single subscriber
//! channel, and broadcasts outbound messages back to the connected clients.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
