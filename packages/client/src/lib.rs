//! Interactive client for the Tobira relay.
//!
//! Connects over raw TCP or WebSocket, prints whatever the relay sends and
//! forwards every line typed by the user.

mod error;
mod formatter;
mod runner;
mod session;
mod ui;

pub use error::ClientError;
pub use formatter::MessageFormatter;
pub use runner::run_client;
pub use session::Transport;
