//! Server mode and relay configuration.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
};

use super::ParseModeError;

/// Which relay is running. Exactly one mode is active at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ServerMode {
    #[default]
    Inactive,
    Tcp,
    WebSocket,
}

impl ServerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMode::Inactive => "inactive",
            ServerMode::Tcp => "tcp",
            ServerMode::WebSocket => "ws",
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the mode names accepted by `start`: `"tcp"` and `"ws"`, case-insensitive.
///
/// `"inactive"` is deliberately not parseable; stopping goes through `close`.
impl FromStr for ServerMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(ServerMode::Tcp),
            "ws" => Ok(ServerMode::WebSocket),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// Where and how a relay listens. Fixed for the lifetime of one relay instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub mode: ServerMode,
    pub host: IpAddr,
    pub port: u16,
}

impl RelayConfig {
    /// Listen on every interface, as the relay does unless told otherwise.
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

    pub fn new(mode: ServerMode, host: IpAddr, port: u16) -> Self {
        Self { mode, host, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
