//! Domain types of the relay: modes, messages, send outcomes and the relay seam.

mod error;
mod message;
mod mode;
mod relay;
mod status;

pub use error::{ParseModeError, RelayError};
pub use message::{ConnectionId, InboundMessage, MessageReceiver, MessageSink};
pub use mode::{RelayConfig, ServerMode};
pub use relay::Relay;
pub use status::SendStatus;
