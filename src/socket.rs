//! Socket client with heartbeat keep-alive.
//!
//! [`Socket::connect`] opens a WebSocket and spawns a connection loop that multiplexes
//! inbound frames, outbound frames and heartbeat deadlines. Frames are JSON text
//! messages of the shape `{"id": ..., "name": ..., "data": ...}`.
//!
//! With heartbeat enabled the client sends a `heartbeat` frame right after opening and
//! expects any frame named `heartbeat` back within `pong_timeout`. Each answer schedules
//! the next ping `ping_timeout` later. A missing answer closes the connection with
//! [`CloseReason::HeartbeatTimeout`].
//!
//! # Example
//!
//! ```rust,no_run
//! use hyperflow::socket::{Socket, SocketConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), hyperflow::socket::SocketError> {
//! let config = SocketConfig::new("ws://localhost:8080").with_heartbeat(true);
//! let socket = Socket::connect(config).await?;
//!
//! let _handle = socket.on("chat", |frame| println!("chat: {}", frame.data));
//! socket.emit("chat", json!({ "text": "hello" }))?;
//!
//! socket.closed().await;
//! # Ok(())
//! # }
//! ```

mod frame;
mod heartbeat;

use std::time::Duration;

use futures::stream::BoxStream;
use futures::{SinkExt as _, StreamExt as _};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{Emitter, EventHandle};

pub use frame::{HEARTBEAT, SocketFrame};
pub use heartbeat::{Heartbeat, HeartbeatAction};

/// Errors surfaced by the socket client.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Socket is closed")]
    Closed,
}

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    pub url: String,
    pub heartbeat: bool,
    /// Opaque payload of outgoing heartbeat frames.
    pub heartbeat_message: String,
    /// Delay between an answered heartbeat and the next ping.
    pub ping_timeout: Duration,
    /// How long the peer has to answer a ping.
    pub pong_timeout: Duration,
}

impl SocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat: false,
            heartbeat_message: HEARTBEAT.to_string(),
            ping_timeout: Duration::from_secs(5),
            pong_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub const fn with_heartbeat(mut self, heartbeat: bool) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    #[must_use]
    pub fn with_heartbeat_message(mut self, message: impl Into<String>) -> Self {
        self.heartbeat_message = message.into();
        self
    }

    #[must_use]
    pub const fn with_ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = ping_timeout;
        self
    }

    #[must_use]
    pub const fn with_pong_timeout(mut self, pong_timeout: Duration) -> Self {
        self.pong_timeout = pong_timeout;
        self
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// [`SocketClient::close`] was called or every client handle was dropped.
    Client,
    /// The server closed the connection.
    Server,
    /// No heartbeat answer arrived within the pong timeout.
    HeartbeatTimeout,
    /// The connection failed.
    Error(String),
}

/// Connection-level events, see [`SocketClient::events`].
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Message(SocketFrame),
    /// An inbound message could not be handled. The connection stays open.
    Error(String),
    Closed(CloseReason),
}

#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Entry point for opening socket connections.
#[derive(Debug)]
pub struct Socket;

impl Socket {
    /// Connects to `config.url` and starts the connection loop.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Connect`] when the WebSocket handshake fails.
    pub async fn connect(config: SocketConfig) -> Result<SocketClient, SocketError> {
        let (stream, _) = connect_async(config.url.as_str())
            .await
            .map_err(|e| SocketError::Connect(e.to_string()))?;
        info!(url = %config.url, heartbeat = config.heartbeat, "socket open");

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (open, open_rx) = watch::channel(true);
        let (events, _) = broadcast::channel(100);
        let listeners = Emitter::new();

        tokio::spawn(run(
            stream,
            config,
            commands_rx,
            open,
            events.clone(),
            listeners.clone(),
        ));

        Ok(SocketClient {
            commands,
            open: open_rx,
            events,
            listeners,
        })
    }
}

/// Handle to an open connection. Clones share the connection.
///
/// The connection is closed when [`SocketClient::close`] is called or the last handle
/// is dropped.
#[derive(Debug, Clone)]
pub struct SocketClient {
    commands: mpsc::UnboundedSender<Outgoing>,
    open: watch::Receiver<bool>,
    events: broadcast::Sender<SocketEvent>,
    listeners: Emitter<SocketFrame>,
}

impl SocketClient {
    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Sends a frame named `name` with a fresh id. Returns the id.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Closed`] when the connection is closed and
    /// [`SocketError::Serialize`] when `data` cannot be serialized.
    pub fn emit(&self, name: impl Into<String>, data: Value) -> Result<String, SocketError> {
        let id = Uuid::new_v4().to_string();
        let text = SocketFrame::new(id.clone(), name, data).to_text()?;
        self.send_text(text)?;
        Ok(id)
    }

    fn send_text(&self, text: String) -> Result<(), SocketError> {
        if !self.is_open() {
            return Err(SocketError::Closed);
        }
        self.commands
            .send(Outgoing::Text(text))
            .map_err(|_| SocketError::Closed)
    }

    /// Registers `callback` for inbound frames named `name`.
    pub fn on<F>(&self, name: impl Into<String>, callback: F) -> EventHandle
    where
        F: Fn(&SocketFrame) + Send + Sync + 'static,
    {
        self.listeners.on(name, callback)
    }

    /// Streams inbound frames named `name`.
    pub fn listen(&self, name: impl Into<String>) -> BoxStream<'static, SocketFrame> {
        self.listeners.stream(name)
    }

    /// Streams every connection event from now on.
    pub fn events(&self) -> BoxStream<'static, SocketEvent> {
        BroadcastStream::new(self.events.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }

    /// Asks the connection loop to close the connection.
    pub fn close(&self) {
        let _ = self.commands.send(Outgoing::Close);
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        let mut open = self.open.clone();
        let _ = open.wait_for(|open| !*open).await;
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run(
    stream: Stream,
    config: SocketConfig,
    mut commands: mpsc::UnboundedReceiver<Outgoing>,
    open: watch::Sender<bool>,
    events: broadcast::Sender<SocketEvent>,
    listeners: Emitter<SocketFrame>,
) {
    let (mut write, mut read) = stream.split();
    let mut heartbeat = Heartbeat::new(config.ping_timeout, config.pong_timeout);
    let ping = SocketFrame::heartbeat(config.heartbeat_message.as_str())
        .to_text()
        .unwrap_or_default();

    let mut reason = None;
    if config.heartbeat {
        match write.send(Message::Text(ping.clone().into())).await {
            Ok(()) => heartbeat.ping_sent(Instant::now()),
            Err(e) => reason = Some(CloseReason::Error(e.to_string())),
        }
    }

    let reason = match reason {
        Some(reason) => reason,
        None => loop {
            tokio::select! {
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => match SocketFrame::parse(text.as_str()) {
                        Ok(frame) => {
                            if config.heartbeat && frame.is_heartbeat() {
                                heartbeat.heartbeat_received(Instant::now());
                            }
                            listeners.emit(&frame.name, &frame);
                            let _ = events.send(SocketEvent::Message(frame));
                        }
                        Err(e) => {
                            warn!(error = %e, "discarding malformed frame");
                            let _ = events.send(SocketEvent::Error(e.to_string()));
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break CloseReason::Server,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break CloseReason::Error(e.to_string()),
                },
                command = commands.recv() => match command {
                    Some(Outgoing::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            let error = SocketError::Send(e.to_string());
                            warn!(%error, "closing socket");
                            break CloseReason::Error(error.to_string());
                        }
                    }
                    Some(Outgoing::Close) | None => break CloseReason::Client,
                },
                () = wait_until(heartbeat.next_deadline()) => match heartbeat.poll(Instant::now()) {
                    Some(HeartbeatAction::SendPing) => {
                        debug!("sending heartbeat");
                        if let Err(e) = write.send(Message::Text(ping.clone().into())).await {
                            break CloseReason::Error(e.to_string());
                        }
                        heartbeat.ping_sent(Instant::now());
                    }
                    Some(HeartbeatAction::TimedOut) => {
                        warn!(pong_timeout = ?config.pong_timeout, "heartbeat timed out");
                        break CloseReason::HeartbeatTimeout;
                    }
                    None => {}
                },
            }
        },
    };

    if !matches!(reason, CloseReason::Server | CloseReason::Error(_)) {
        let _ = write.send(Message::Close(None)).await;
    }
    let _ = write.close().await;
    open.send_replace(false);
    info!(?reason, "socket closed");
    let _ = events.send(SocketEvent::Closed(reason));
}
