//! WebSocket relay.
//!
//! An axum server accepts upgrades on any path of the configured port. Each
//! connection registers an outbound channel in the [`ConnectionRegistry`] when
//! it opens and runs two tasks: one relaying inbound text frames to the
//! subscriber, one writing what the registry queues for it. Whichever finishes
//! first ends the connection, and the connection deregisters itself.
//!
//! Shutdown stops the listener before closing the registry. A closed registry
//! refuses late upgrades and drops frames from connections it no longer holds.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tower_http::trace::TraceLayer;

use crate::{
    domain::{ConnectionId, MessageSink, Relay, RelayConfig, RelayError, SendStatus, ServerMode},
    infrastructure::{ConnectionRegistry, Outbound},
};

/// How long a stopping server may drain before its task is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

struct RelayState {
    registry: ConnectionRegistry,
    sink: MessageSink,
}

pub struct WebSocketRelay {
    local_addr: SocketAddr,
    registry: ConnectionRegistry,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketRelay {
    /// Bind the listener and start serving WebSocket upgrades in the background.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if the address cannot be claimed.
    pub async fn start(config: &RelayConfig, sink: MessageSink) -> Result<Self, RelayError> {
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(RelayError::LocalAddr)?;

        let registry = ConnectionRegistry::new();
        let state = Arc::new(RelayState {
            registry: registry.clone(),
            sink,
        });

        let app = Router::new()
            .fallback(websocket_handler)
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        tracing::info!("WebSocket relay listening on {}", local_addr);
        tracing::info!("Connect to: ws://{}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!("WebSocket relay on {} failed: {}", local_addr, e);
            }
        });

        Ok(Self {
            local_addr,
            registry,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

#[async_trait]
impl Relay for WebSocketRelay {
    fn mode(&self) -> ServerMode {
        ServerMode::WebSocket
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send(&self, message: &str) -> SendStatus {
        let delivered = self.registry.broadcast(message).await;
        tracing::debug!("Broadcast message to {} connection(s)", delivered);
        SendStatus::SentToConnections(delivered)
    }

    async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    async fn shutdown(&mut self) {
        // stop accepting before closing what is registered, so no upgrade slips in between
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                tracing::warn!("WebSocket relay did not drain in time, aborting");
                task.abort();
                let _ = task.await;
            }
            tracing::info!("WebSocket relay on {} stopped", self.local_addr);
        }

        let closed = self.registry.close_all().await;
        if closed > 0 {
            tracing::info!("Closed {} WebSocket connection(s)", closed);
        }
    }
}

impl Drop for WebSocketRelay {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayState>>,
) -> impl IntoResponse {
    ws.on_failed_upgrade(|e| tracing::warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Spawns a task that writes whatever the registry queues for this connection.
///
/// Ends on a close request, on a write failure, or when the registry drops the
/// channel.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    mut sender: SplitSink<WebSocket, Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Text(text) => {
                    if let Err(e) = sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to write WebSocket frame: {}", e);
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    })
}

async fn handle_socket(mut socket: WebSocket, state: Arc<RelayState>) {
    let connection_id = ConnectionId::new();
    let (tx, rx) = mpsc::unbounded_channel();
    if !state.registry.register(connection_id, tx).await {
        // upgrade finished after the relay was closed
        tracing::info!("Rejecting WebSocket connection '{}': relay closed", connection_id);
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    tracing::info!("WebSocket connection '{}' opened", connection_id);

    let (sender, mut receiver) = socket.split();

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    // an errored connection is closed; others are unaffected
                    tracing::warn!("WebSocket connection '{}' error: {}", connection_id, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    tracing::debug!(
                        "Received frame from '{}': {}",
                        connection_id,
                        text.as_str()
                    );
                    let forwarded = recv_state
                        .registry
                        .forward(connection_id, text.as_str().to_owned(), &recv_state.sink)
                        .await;
                    if !forwarded {
                        tracing::debug!(
                            "WebSocket connection '{}' is no longer registered",
                            connection_id
                        );
                        break;
                    }
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        "Ignoring {} byte binary frame from '{}'",
                        data.len(),
                        connection_id
                    );
                }
                Message::Close(_) => {
                    tracing::info!("WebSocket connection '{}' requested close", connection_id);
                    break;
                }
                // ping/pong is answered by the protocol layer
                _ => {}
            }
        }
    });

    let mut send_task = pusher_loop(rx, sender);

    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    state.registry.deregister(&connection_id).await;
    tracing::info!("WebSocket connection '{}' closed", connection_id);
}
