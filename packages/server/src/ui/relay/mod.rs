//! Relay implementations, one per server mode.

mod tcp;
mod websocket;

pub use tcp::{READ_BUFFER_SIZE, TcpRelay};
pub use websocket::WebSocketRelay;
