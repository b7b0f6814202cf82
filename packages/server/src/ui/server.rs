//! Relay lifecycle and the single send/receive surface for the host.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use tobira_shared::time::{Clock, SystemClock};
use tokio::sync::Mutex;

use crate::{
    domain::{MessageReceiver, MessageSink, Relay, RelayConfig, RelayError, SendStatus, ServerMode},
    infrastructure::CompanionProcesses,
};

use super::relay::{TcpRelay, WebSocketRelay};

/// Owns the active relay and hides which one it is.
///
/// At most one relay runs at a time. Starting a relay always stops the
/// previous one first, including when the same mode is requested again
/// (restart), and the previous listener is released before the new one binds.
///
/// # Example
///
/// ```no_run
/// use tobira_server::{domain::ServerMode, ui::ServerController};
///
/// # async fn run() -> Result<(), tobira_server::domain::RelayError> {
/// let (controller, mut inbound) = ServerController::new("0.0.0.0".parse().unwrap());
/// controller.start(ServerMode::Tcp, 5000).await?;
///
/// if let Some(message) = inbound.recv().await {
///     println!("{}", controller.send(&message.payload).await);
/// }
/// controller.close().await;
/// # Ok(())
/// # }
/// ```
pub struct ServerController {
    host: IpAddr,
    sink: MessageSink,
    active: Mutex<Option<Box<dyn Relay>>>,
    companions: Mutex<CompanionProcesses>,
}

impl ServerController {
    /// Create a controller whose relays listen on `host`.
    ///
    /// Returns the receiver on which every inbound message is delivered.
    pub fn new(host: IpAddr) -> (Self, MessageReceiver) {
        Self::with_clock(host, Arc::new(SystemClock))
    }

    /// Same as [`ServerController::new`], stamping messages with `clock`.
    pub fn with_clock(host: IpAddr, clock: Arc<dyn Clock>) -> (Self, MessageReceiver) {
        let (sink, receiver) = MessageSink::new(clock);
        let controller = Self {
            host,
            sink,
            active: Mutex::new(None),
            companions: Mutex::new(CompanionProcesses::new()),
        };
        (controller, receiver)
    }

    /// Start the relay for `mode` on `port`.
    ///
    /// `ServerMode::Inactive` is ignored. Any running relay is stopped first.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if the listener cannot be bound; the
    /// controller is then left inactive.
    pub async fn start(&self, mode: ServerMode, port: u16) -> Result<(), RelayError> {
        if mode == ServerMode::Inactive {
            tracing::warn!("Ignoring request to start an inactive server");
            return Ok(());
        }

        let mut active = self.active.lock().await;
        if let Some(mut previous) = active.take() {
            if previous.mode() == mode {
                tracing::info!("Restarting {} relay", mode);
            } else {
                tracing::info!("Switching relay from {} to {}", previous.mode(), mode);
            }
            previous.shutdown().await;
        }

        tracing::info!("Starting server: {} on port {}", mode, port);
        let config = RelayConfig::new(mode, self.host, port);
        let relay: Box<dyn Relay> = match mode {
            ServerMode::Tcp => Box::new(TcpRelay::start(&config, self.sink.clone()).await?),
            ServerMode::WebSocket => {
                Box::new(WebSocketRelay::start(&config, self.sink.clone()).await?)
            }
            ServerMode::Inactive => return Ok(()),
        };
        *active = Some(relay);

        Ok(())
    }

    /// Start by mode name (`"tcp"` or `"ws"`). An unknown name is a no-op.
    ///
    /// # Errors
    ///
    /// Same as [`ServerController::start`].
    pub async fn start_named(&self, mode: &str, port: u16) -> Result<(), RelayError> {
        match mode.parse::<ServerMode>() {
            Ok(mode) => self.start(mode, port).await,
            Err(e) => {
                tracing::warn!("{}, ignoring start request", e);
                Ok(())
            }
        }
    }

    /// Send `message` through the active relay.
    ///
    /// TCP writes to the connected client; WebSocket broadcasts to every open
    /// connection. Failures are reported in the returned status, never raised.
    pub async fn send(&self, message: &str) -> SendStatus {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(relay) => relay.send(message).await,
            None => SendStatus::NotFound,
        }
    }

    /// Stop the active relay, close its connections and kill companion programs.
    ///
    /// Safe to call at any time, any number of times.
    pub async fn close(&self) {
        if let Some(mut relay) = self.active.lock().await.take() {
            tracing::info!("Closing {} relay", relay.mode());
            relay.shutdown().await;
        }

        let mut companions = self.companions.lock().await;
        if !companions.is_empty() {
            let stopped = companions.kill_all().await;
            tracing::info!("Stopped {} companion program(s)", stopped);
        }
    }

    /// Launch a program that lives as long as the relay.
    ///
    /// Everything started here is killed by [`ServerController::close`].
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Spawn`] if the program cannot be started.
    pub async fn start_program_along(
        &self,
        path: &str,
        show_window: bool,
        args: &str,
    ) -> Result<Option<u32>, RelayError> {
        self.companions.lock().await.start(path, show_window, args)
    }

    pub async fn mode(&self) -> ServerMode {
        self.active
            .lock()
            .await
            .as_ref()
            .map_or(ServerMode::Inactive, |relay| relay.mode())
    }

    /// Address of the running listener, if any.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|relay| relay.local_addr())
    }

    pub async fn connection_count(&self) -> usize {
        match self.active.lock().await.as_ref() {
            Some(relay) => relay.connection_count().await,
            None => 0,
        }
    }

    pub async fn companion_count(&self) -> usize {
        self.companions.lock().await.len()
    }
}
