//! Network-facing layer: the relays and the controller that switches between them.

pub mod relay;
mod server;
mod signal;

pub use server::ServerController;
pub use signal::shutdown_signal;
