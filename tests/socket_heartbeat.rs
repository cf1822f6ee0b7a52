// Integration tests for the socket client against a local WebSocket server.
// Covers frame exchange, the heartbeat sent on open, and liveness timeouts.
// Unit tests for the heartbeat bookkeeping are in src/socket/heartbeat.rs

mod common;

use std::time::Duration;

use common::init_tracing;
use futures::{SinkExt, StreamExt};
use hyperflow::socket::{CloseReason, Socket, SocketConfig, SocketError, SocketEvent, SocketFrame};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

// Helper: how the test server treats inbound text frames
#[derive(Debug, Clone, Copy)]
enum ServerMode {
    /// Record frames, never answer.
    Silent,
    /// Record frames and send each one back.
    Echo,
    /// Close the connection after the first frame.
    CloseAfterFirst,
}

// Helper: accepts one connection and reports every text frame it receives
async fn serve(mode: ServerMode) -> (String, mpsc::UnboundedReceiver<SocketFrame>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            if let Ok(frame) = SocketFrame::parse(text.as_str()) {
                let _ = tx.send(frame);
            }
            match mode {
                ServerMode::Silent => {}
                ServerMode::Echo => {
                    if ws.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                ServerMode::CloseAfterFirst => {
                    let _ = ws.close(None).await;
                    break;
                }
            }
        }
    });

    (format!("ws://{addr}"), rx)
}

// Helper: waits for the Closed event on an event stream
async fn close_reason(
    events: &mut futures::stream::BoxStream<'static, SocketEvent>,
) -> Option<CloseReason> {
    while let Some(event) = events.next().await {
        if let SocketEvent::Closed(reason) = event {
            return Some(reason);
        }
    }
    None
}

#[tokio::test]
async fn heartbeat_is_sent_on_open() {
    init_tracing();
    let (url, mut frames) = serve(ServerMode::Silent).await;
    let config = SocketConfig::new(url)
        .with_heartbeat(true)
        .with_heartbeat_message("are you there");

    let socket = Socket::connect(config).await.expect("connect");
    let frame = timeout(Duration::from_secs(1), frames.recv())
        .await
        .expect("ping arrives on open")
        .expect("server alive");

    assert!(frame.is_heartbeat());
    assert_eq!(frame.data, json!("are you there"));
    assert!(socket.is_open());
    socket.close();
}

#[tokio::test]
async fn missing_pong_closes_the_connection() {
    init_tracing();
    let (url, _frames) = serve(ServerMode::Silent).await;
    let config = SocketConfig::new(url)
        .with_heartbeat(true)
        .with_ping_timeout(Duration::from_millis(50))
        .with_pong_timeout(Duration::from_millis(100));

    let socket = Socket::connect(config).await.expect("connect");
    let mut events = socket.events();

    let reason = timeout(Duration::from_secs(2), close_reason(&mut events))
        .await
        .expect("closes after the pong timeout");
    assert_eq!(reason, Some(CloseReason::HeartbeatTimeout));

    timeout(Duration::from_secs(1), socket.closed())
        .await
        .expect("closed resolves");
    assert!(!socket.is_open());
    assert!(matches!(socket.emit("chat", json!(1)), Err(SocketError::Closed)));
}

#[tokio::test]
async fn answered_heartbeats_keep_the_connection_open() {
    init_tracing();
    let (url, mut frames) = serve(ServerMode::Echo).await;
    let config = SocketConfig::new(url)
        .with_heartbeat(true)
        .with_ping_timeout(Duration::from_millis(50))
        .with_pong_timeout(Duration::from_millis(100));

    let socket = Socket::connect(config).await.expect("connect");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(socket.is_open());

    let mut pings = 0;
    while let Ok(frame) = frames.try_recv() {
        if frame.is_heartbeat() {
            pings += 1;
        }
    }
    assert!(pings >= 3, "expected repeated pings, got {pings}");

    socket.close();
    timeout(Duration::from_secs(1), socket.closed())
        .await
        .expect("closed resolves");
}

#[tokio::test]
async fn emitted_frames_reach_named_listeners() {
    init_tracing();
    let (url, mut frames) = serve(ServerMode::Echo).await;
    let socket = Socket::connect(SocketConfig::new(url)).await.expect("connect");

    let mut chat = socket.listen("chat");
    let id = socket
        .emit("chat", json!({ "text": "hello" }))
        .expect("socket open");

    let sent = timeout(Duration::from_secs(1), frames.recv())
        .await
        .expect("server receives the frame")
        .expect("server alive");
    assert_eq!(sent.id, id);
    assert_eq!(sent.name, "chat");

    let echoed = timeout(Duration::from_secs(1), chat.next())
        .await
        .expect("listener receives the echo")
        .expect("stream open");
    assert_eq!(echoed.id, id);
    assert_eq!(echoed.data, json!({ "text": "hello" }));
    socket.close();
}

#[tokio::test]
async fn server_close_is_reported() {
    init_tracing();
    let (url, _frames) = serve(ServerMode::CloseAfterFirst).await;
    let socket = Socket::connect(SocketConfig::new(url)).await.expect("connect");
    let mut events = socket.events();

    socket.emit("bye", json!(null)).expect("socket open");

    let reason = timeout(Duration::from_secs(2), close_reason(&mut events))
        .await
        .expect("close is reported");
    assert_eq!(reason, Some(CloseReason::Server));
    assert!(!socket.is_open());
}
