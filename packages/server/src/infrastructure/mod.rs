//! Infrastructure shared by the relays.
//!
//! - `registry`: the set of open WebSocket connections and their outbound channels
//! - `companion`: external programs started alongside the relay

pub mod companion;
pub mod registry;

pub use companion::CompanionProcesses;
pub use registry::{ConnectionChannel, ConnectionRegistry, Outbound};
