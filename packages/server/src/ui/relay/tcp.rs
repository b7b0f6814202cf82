//! Raw TCP relay.
//!
//! One task owns the listener. It accepts a client, runs that client's read
//! loop until the peer goes away, closes the connection and only then accepts
//! the next client, so at most one connection is ever tracked. Writes go
//! through a per-connection writer task fed by a channel, so `send` never
//! waits on the peer.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpListener,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{Mutex, mpsc},
    task::JoinHandle,
};

use crate::{
    domain::{ConnectionId, MessageSink, Relay, RelayConfig, RelayError, SendStatus, ServerMode},
    infrastructure::{ConnectionChannel, Outbound},
};

/// Upper bound of one read; one read becomes one message.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Consecutive transient read errors tolerated before giving up on a client.
const MAX_TRANSIENT_READ_ERRORS: u32 = 8;

/// Pause after a failed accept so a persistent failure does not spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How long a closing connection may flush queued writes before it is cut.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    outbound: ConnectionChannel,
    writer_task: JoinHandle<()>,
}

impl TcpConnection {
    fn open(id: ConnectionId, peer: SocketAddr, writer: OwnedWriteHalf) -> Self {
        let (outbound, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(writer_loop(peer, rx, writer));
        Self {
            id,
            peer,
            outbound,
            writer_task,
        }
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.writer_task.abort();
    }
}

type CurrentConnection = Arc<Mutex<Option<TcpConnection>>>;

pub struct TcpRelay {
    local_addr: SocketAddr,
    current: CurrentConnection,
    task: Option<JoinHandle<()>>,
}

impl TcpRelay {
    /// Bind the listener and start accepting in the background.
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

        tracing::info!("TCP relay listening on {}", local_addr);

        let current: CurrentConnection = Arc::new(Mutex::new(None));
        let task = tokio::spawn(accept_loop(listener, current.clone(), sink));

        Ok(Self {
            local_addr,
            current,
            task: Some(task),
        })
    }
}

#[async_trait]
impl Relay for TcpRelay {
    fn mode(&self) -> ServerMode {
        ServerMode::Tcp
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send(&self, message: &str) -> SendStatus {
        let mut current = self.current.lock().await;
        let Some(connection) = current.as_ref() else {
            return SendStatus::TcpClientNotConnected;
        };

        if connection
            .outbound
            .send(Outbound::Text(message.to_owned()))
            .is_err()
        {
            // the writer stopped after a failed write; stop tracking the client
            tracing::warn!("TCP client {} is no longer writable", connection.peer);
            current.take();
            return SendStatus::Error("connection closed".to_owned());
        }

        tracing::debug!(
            "Queued {} bytes for TCP client {}",
            message.len(),
            connection.peer
        );
        SendStatus::SentToTcpClient
    }

    async fn connection_count(&self) -> usize {
        usize::from(self.current.lock().await.is_some())
    }

    async fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            // dropping the task drops the listener and the read half
            task.abort();
            let _ = task.await;
            tracing::info!("TCP relay on {} stopped", self.local_addr);
        }
        let connection = self.current.lock().await.take();
        if let Some(connection) = connection {
            close_connection(connection).await;
        }
    }
}

impl Drop for TcpRelay {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(listener: TcpListener, current: CurrentConnection, sink: MessageSink) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("Failed to accept TCP client: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };

        let id = ConnectionId::new();
        let (reader, writer) = stream.into_split();
        track_connection(&current, TcpConnection::open(id, peer, writer)).await;
        tracing::info!("TCP client {} connected as '{}'", peer, id);

        read_loop(id, reader, &sink).await;

        release_connection(&current, id).await;
        tracing::info!("TCP client {} disconnected, waiting for next client", peer);
    }
}

/// Relay every read from `reader` as one message until the peer is gone.
async fn read_loop(id: ConnectionId, mut reader: OwnedReadHalf, sink: &MessageSink) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut transient_errors = 0;

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("TCP client '{}' closed the stream", id);
                break;
            }
            Ok(n) => {
                transient_errors = 0;
                let payload = decode_payload(&buf[..n]);
                tracing::debug!("Received {} bytes from TCP client '{}'", n, id);
                sink.emit(id, payload);
            }
            Err(e) if is_transient(&e) && transient_errors < MAX_TRANSIENT_READ_ERRORS => {
                transient_errors += 1;
                tracing::warn!("Transient read error from TCP client '{}': {}", id, e);
            }
            Err(e) => {
                tracing::warn!("Read from TCP client '{}' failed: {}", id, e);
                break;
            }
        }
    }
}

/// Write queued messages in order until told to close or a write fails.
async fn writer_loop(
    peer: SocketAddr,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    mut writer: OwnedWriteHalf,
) {
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Text(message) => {
                if let Err(e) = writer.write_all(message.as_bytes()).await {
                    tracing::warn!("Failed to write to TCP client {}: {}", peer, e);
                    return;
                }
                tracing::debug!("Sent {} bytes to TCP client {}", message.len(), peer);
            }
            Outbound::Close => break,
        }
    }

    if let Err(e) = writer.shutdown().await {
        tracing::debug!("Shutdown of TCP client {} failed: {}", peer, e);
    }
}

async fn track_connection(current: &CurrentConnection, connection: TcpConnection) {
    let previous = current.lock().await.replace(connection);
    if let Some(previous) = previous {
        tracing::warn!("Closing stale TCP client {}", previous.peer);
        close_connection(previous).await;
    }
}

async fn release_connection(current: &CurrentConnection, id: ConnectionId) {
    let released = {
        let mut current = current.lock().await;
        match current.as_ref() {
            Some(connection) if connection.id == id => current.take(),
            _ => None,
        }
    };
    if let Some(connection) = released {
        close_connection(connection).await;
    }
}

/// Let the writer flush what is queued, then cut it off after [`CLOSE_GRACE`].
async fn close_connection(mut connection: TcpConnection) {
    let _ = connection.outbound.send(Outbound::Close);
    if tokio::time::timeout(CLOSE_GRACE, &mut connection.writer_task)
        .await
        .is_err()
    {
        tracing::warn!(
            "TCP client {} did not drain in time, dropping queued writes",
            connection.peer
        );
    }
    // dropping the connection aborts a writer that is still stuck
}

/// Decode one read as text; invalid UTF-8 is replaced rather than rejected.
fn decode_payload(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
