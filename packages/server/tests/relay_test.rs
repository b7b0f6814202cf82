//! Integration tests for the relay, driving the controller over real sockets.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use tobira_server::{
    domain::{InboundMessage, MessageReceiver, RelayError, SendStatus, ServerMode},
    ui::ServerController,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

const WAIT: Duration = Duration::from_secs(5);

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn localhost() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

/// Start a controller on an ephemeral port and return it with its bound address.
async fn start(mode: ServerMode) -> (ServerController, MessageReceiver, SocketAddr) {
    let (controller, inbound) = ServerController::new(localhost());
    controller.start(mode, 0).await.expect("Failed to start relay");
    let addr = controller.local_addr().await.expect("Relay has no address");
    (controller, inbound, addr)
}

async fn next_message(inbound: &mut MessageReceiver) -> InboundMessage {
    timeout(WAIT, inbound.recv())
        .await
        .expect("Timed out waiting for inbound message")
        .expect("Inbound channel closed")
}

/// Wait until the relay tracks exactly `expected` connections.
async fn wait_for_connections(controller: &ServerController, expected: usize) {
    timeout(WAIT, async {
        while controller.connection_count().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting for {} connection(s)", expected));
}

async fn ws_connect(addr: SocketAddr) -> WsClient {
    let (stream, _response) = timeout(WAIT, connect_async(format!("ws://{}", addr)))
        .await
        .expect("Timed out connecting")
        .expect("Failed to connect WebSocket client");
    stream
}

async fn next_text(client: &mut WsClient) -> String {
    loop {
        let frame = timeout(WAIT, client.next())
            .await
            .expect("Timed out waiting for frame")
            .expect("Stream ended")
            .expect("WebSocket error");
        if let Message::Text(text) = frame {
            return text.as_str().to_string();
        }
    }
}

#[tokio::test]
async fn test_tcp_hello_world_round_trip() {
    // テスト項目: TCP クライアントとの間でメッセージを送受信できる
    // given (前提条件):
    let (controller, mut inbound, addr) = start(ServerMode::Tcp).await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    // when (操作):
    client.write_all(b"hello").await.unwrap();
    let received = next_message(&mut inbound).await;
    let status = controller.send("world").await;

    // then (期待する結果):
    assert_eq!(received.payload, "hello");
    assert_eq!(status, SendStatus::SentToTcpClient);
    assert_eq!(status.to_string(), "Sent to TCP client");

    let mut buf = [0u8; 5];
    timeout(WAIT, client.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"world");

    controller.close().await;
}

#[tokio::test]
async fn test_tcp_send_without_client() {
    // テスト項目: TCP クライアント未接続時は "TCP client not connected" を返す
    // given (前提条件):
    let (controller, _inbound, _addr) = start(ServerMode::Tcp).await;

    // when (操作):
    let status = controller.send("nobody").await;

    // then (期待する結果):
    assert_eq!(status.to_string(), "TCP client not connected");
    controller.close().await;
}

#[tokio::test]
async fn test_tcp_relay_accepts_next_client_after_disconnect() {
    // テスト項目: TCP クライアント切断後、次のクライアントを受け付ける
    // given (前提条件):
    let (controller, mut inbound, addr) = start(ServerMode::Tcp).await;
    let mut first = TcpStream::connect(addr).await.unwrap();
    first.write_all(b"first").await.unwrap();
    let first_message = next_message(&mut inbound).await;

    // when (操作):
    drop(first);
    wait_for_connections(&controller, 0).await;
    let mut second = TcpStream::connect(addr).await.unwrap();
    second.write_all(b"second").await.unwrap();
    let second_message = next_message(&mut inbound).await;

    // then (期待する結果):
    assert_eq!(first_message.payload, "first");
    assert_eq!(second_message.payload, "second");
    assert_ne!(first_message.connection_id, second_message.connection_id);
    assert_eq!(controller.send("back").await, SendStatus::SentToTcpClient);
    controller.close().await;
}

#[tokio::test]
async fn test_tcp_second_client_waits_for_first() {
    // テスト項目: 同時に追跡される TCP クライアントは 1 つだけ
    // given (前提条件):
    let (controller, mut inbound, addr) = start(ServerMode::Tcp).await;
    let mut first = TcpStream::connect(addr).await.unwrap();
    first.write_all(b"one").await.unwrap();
    assert_eq!(next_message(&mut inbound).await.payload, "one");

    // when (操作):
    let mut second = TcpStream::connect(addr).await.unwrap();
    second.write_all(b"two").await.unwrap();
    controller.send("to-first").await;

    // then (期待する結果):
    assert_eq!(controller.connection_count().await, 1);
    let mut buf = [0u8; 8];
    timeout(WAIT, first.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"to-first");

    // the queued client is served once the first one leaves
    drop(first);
    assert_eq!(next_message(&mut inbound).await.payload, "two");
    controller.close().await;
}

#[tokio::test]
async fn test_websocket_frame_yields_exactly_one_event() {
    // テスト項目: WebSocket のフレーム 1 つにつき受信イベントが 1 つ発生する
    // given (前提条件):
    let (controller, mut inbound, addr) = start(ServerMode::WebSocket).await;
    let mut client = ws_connect(addr).await;

    // when (操作):
    client.send(Message::Text("alpha".into())).await.unwrap();
    client.send(Message::Text("beta".into())).await.unwrap();

    // then (期待する結果):
    assert_eq!(next_message(&mut inbound).await.payload, "alpha");
    assert_eq!(next_message(&mut inbound).await.payload, "beta");
    assert!(
        timeout(Duration::from_millis(200), inbound.recv())
            .await
            .is_err()
    );
    controller.close().await;
}

#[tokio::test]
async fn test_websocket_broadcast_to_two_clients() {
    // テスト項目: 2 つの WebSocket クライアント両方に "ping" が届き、件数 2 が返る
    // given (前提条件):
    let (controller, _inbound, addr) = start(ServerMode::WebSocket).await;
    let mut alice = ws_connect(addr).await;
    let mut bob = ws_connect(addr).await;
    wait_for_connections(&controller, 2).await;

    // when (操作):
    let status = controller.send("ping").await;

    // then (期待する結果):
    assert_eq!(status, SendStatus::SentToConnections(2));
    assert_eq!(status.to_string(), "Sent message to 2");
    assert_eq!(next_text(&mut alice).await, "ping");
    assert_eq!(next_text(&mut bob).await, "ping");
    controller.close().await;
}

#[tokio::test]
async fn test_websocket_broadcast_after_one_client_leaves() {
    // テスト項目: 1 クライアント切断後のブロードキャストは残りの N-1 件に届く
    // given (前提条件):
    let (controller, _inbound, addr) = start(ServerMode::WebSocket).await;
    let mut alice = ws_connect(addr).await;
    let mut bob = ws_connect(addr).await;
    let mut charlie = ws_connect(addr).await;
    wait_for_connections(&controller, 3).await;

    // when (操作):
    charlie.close(None).await.unwrap();
    drop(charlie);
    wait_for_connections(&controller, 2).await;
    let status = controller.send("still here").await;

    // then (期待する結果):
    assert_eq!(status, SendStatus::SentToConnections(2));
    assert_eq!(next_text(&mut alice).await, "still here");
    assert_eq!(next_text(&mut bob).await, "still here");
    controller.close().await;
}

#[tokio::test]
async fn test_close_disconnects_websocket_clients() {
    // テスト項目: close で WebSocket クライアントが切断される
    // given (前提条件):
    let (controller, _inbound, addr) = start(ServerMode::WebSocket).await;
    let mut client = ws_connect(addr).await;
    wait_for_connections(&controller, 1).await;

    // when (操作):
    controller.close().await;

    // then (期待する結果):
    let ended = timeout(WAIT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok());
    assert_eq!(controller.mode().await, ServerMode::Inactive);
}

#[tokio::test]
async fn test_close_releases_port() {
    // テスト項目: close 後に同じポートで再起動できる
    // given (前提条件):
    let (controller, mut inbound, addr) = start(ServerMode::Tcp).await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"before").await.unwrap();
    next_message(&mut inbound).await;

    // when (操作):
    controller.close().await;
    let restarted = controller.start(ServerMode::Tcp, addr.port()).await;

    // then (期待する結果):
    assert!(restarted.is_ok());
    assert_eq!(controller.local_addr().await, Some(addr));
    let mut again = TcpStream::connect(addr).await.unwrap();
    again.write_all(b"after").await.unwrap();
    assert_eq!(next_message(&mut inbound).await.payload, "after");
    controller.close().await;
}

#[tokio::test]
async fn test_switch_mode_on_same_port() {
    // テスト項目: 同じポートで TCP から WebSocket に切り替えられる
    // given (前提条件):
    let (controller, mut inbound, addr) = start(ServerMode::Tcp).await;

    // when (操作):
    let switched = controller.start(ServerMode::WebSocket, addr.port()).await;

    // then (期待する結果):
    assert!(switched.is_ok());
    assert_eq!(controller.mode().await, ServerMode::WebSocket);
    let mut client = ws_connect(addr).await;
    client.send(Message::Text("over ws".into())).await.unwrap();
    assert_eq!(next_message(&mut inbound).await.payload, "over ws");
    controller.close().await;
}

#[tokio::test]
async fn test_restart_same_mode_drops_old_connections() {
    // テスト項目: 同じモードでの再起動は既存の接続を閉じてから起動し直す
    // given (前提条件):
    let (controller, _inbound, addr) = start(ServerMode::WebSocket).await;
    let _client = ws_connect(addr).await;
    wait_for_connections(&controller, 1).await;

    // when (操作):
    let restarted = controller.start(ServerMode::WebSocket, addr.port()).await;

    // then (期待する結果):
    assert!(restarted.is_ok());
    assert_eq!(controller.connection_count().await, 0);
    assert_eq!(
        controller.send("empty").await,
        SendStatus::SentToConnections(0)
    );
    controller.close().await;
}

#[tokio::test]
async fn test_bind_failure_surfaces() {
    // テスト項目: ポートが使用中の場合は Bind エラーを返し、非稼働のままになる
    // given (前提条件):
    let occupied = std::net::TcpListener::bind((localhost(), 0)).unwrap();
    let port = occupied.local_addr().unwrap().port();
    let (controller, _inbound) = ServerController::new(localhost());

    // when (操作):
    let result = controller.start(ServerMode::WebSocket, port).await;

    // then (期待する結果):
    assert!(matches!(result, Err(RelayError::Bind { .. })));
    assert_eq!(controller.mode().await, ServerMode::Inactive);
    assert_eq!(controller.send("x").await.to_string(), "Not found");
}

#[tokio::test]
async fn test_close_is_not_blocked_by_a_stalled_tcp_client() {
    // テスト項目: 受信しない TCP クライアントへ大きな送信をしても close はすぐに完了する
    // given (前提条件):
    let (controller, mut inbound, addr) = start(ServerMode::Tcp).await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"ready").await.unwrap();
    assert_eq!(next_message(&mut inbound).await.payload, "ready");
    let large = "x".repeat(32 * 1024 * 1024);

    // when (操作):
    let sent = timeout(Duration::from_secs(1), controller.send(&large)).await;
    let closed = timeout(Duration::from_secs(3), controller.close()).await;

    // then (期待する結果):
    assert_eq!(sent.unwrap(), SendStatus::SentToTcpClient);
    assert!(closed.is_ok());
    assert_eq!(controller.mode().await, ServerMode::Inactive);
    assert_eq!(controller.connection_count().await, 0);
    drop(client);
}

#[tokio::test]
async fn test_no_websocket_message_arrives_after_close() {
    // テスト項目: 接続と送信が続いている最中に close しても、close 完了後にメッセージは届かない
    // given (前提条件):
    let (controller, mut inbound, addr) = start(ServerMode::WebSocket).await;
    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let mut clients = Vec::new();
    for client_index in 0..4 {
        let stop_rx = stop_rx.clone();
        clients.push(tokio::spawn(async move {
            let mut sent = 0u32;
            while !*stop_rx.borrow() {
                let Ok((mut ws, _response)) = connect_async(format!("ws://{}", addr)).await
                else {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    continue;
                };
                for _ in 0..50 {
                    sent += 1;
                    let text = format!("client {} message {}", client_index, sent);
                    if ws.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            }
        }));
    }
    next_message(&mut inbound).await;

    // when (操作):
    controller.close().await;
    while inbound.try_recv().is_ok() {}

    // then (期待する結果):
    let late = timeout(Duration::from_millis(300), inbound.recv()).await;
    assert!(late.is_err(), "message delivered after close: {:?}", late);
    let _ = stop_tx.send(true);
    for client in clients {
        let _ = timeout(WAIT, client).await;
    }
}
