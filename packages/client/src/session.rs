//! One connection to the relay, over TCP or WebSocket.

use clap::ValueEnum;
use futures_util::{SinkExt, StreamExt};
use tobira_shared::time::now_millis;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc,
};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use super::{error::ClientError, formatter::MessageFormatter, ui::redisplay_prompt};

/// Same bound the relay uses for a single read.
const READ_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Raw TCP stream
    Tcp,
    /// WebSocket text frames
    Ws,
}

impl Transport {
    /// Address to dial for this transport
    pub fn endpoint(&self, host: &str, port: u16) -> String {
        match self {
            Transport::Tcp => format!("{}:{}", host, port),
            Transport::Ws => format!("ws://{}:{}", host, port),
        }
    }
}

/// Run one session until the user stops typing (`Ok`) or the connection ends (`Err`).
pub async fn run_client_session(
    transport: Transport,
    endpoint: &str,
    input: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), ClientError> {
    match transport {
        Transport::Tcp => run_tcp_session(endpoint, input).await,
        Transport::Ws => run_websocket_session(endpoint, input).await,
    }
}

async fn run_tcp_session(
    addr: &str,
    input: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), ClientError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| ClientError::ConnectionError(e.to_string()))?;
    tracing::info!("Connected to relay at {} over TCP", addr);
    redisplay_prompt();

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    return Err(ClientError::ConnectionLost(
                        "relay closed the stream".to_string(),
                    ));
                }
                Ok(n) => show_received(&String::from_utf8_lossy(&buf[..n])),
                Err(e) => return Err(ClientError::ConnectionLost(e.to_string())),
            },
            line = input.recv() => match line {
                Some(line) => {
                    writer
                        .write_all(line.as_bytes())
                        .await
                        .map_err(|e| ClientError::ConnectionLost(e.to_string()))?;
                    show_sent();
                }
                None => return Ok(()),
            },
        }
    }
}

async fn run_websocket_session(
    url: &str,
    input: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), ClientError> {
    let (ws_stream, _response) = connect_async(url)
        .await
        .map_err(|e| ClientError::ConnectionError(e.to_string()))?;
    tracing::info!("Connected to relay at {}", url);
    redisplay_prompt();

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => show_received(text.as_str()),
                Some(Ok(Message::Binary(data))) => {
                    print!("{}", MessageFormatter::format_binary_message(data.len()));
                    redisplay_prompt();
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ClientError::ConnectionLost(
                        "relay closed the connection".to_string(),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ClientError::ConnectionLost(e.to_string())),
            },
            line = input.recv() => match line {
                Some(line) => {
                    write
                        .send(Message::Text(line.into()))
                        .await
                        .map_err(|e| ClientError::ConnectionLost(e.to_string()))?;
                    show_sent();
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            },
        }
    }
}

fn show_received(content: &str) {
    print!("{}", MessageFormatter::format_received(content, now_millis()));
    redisplay_prompt();
}

fn show_sent() {
    print!("{}", MessageFormatter::format_sent_confirmation(now_millis()));
    redisplay_prompt();
}
