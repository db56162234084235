//! ConnectionManager - reconnecting WebSocket client loop
//!
//! Idle -> Connecting -> Connected -> (Disconnected) -> Connecting -> ...
//! until `stop()`. Every failure (open error, read error, heartbeat timeout,
//! remote close) takes the same path: `on_disconnect`, fixed delay, retry.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::connector::{Connector, WsConnector, WsStream};
use super::{ConnectionError, ConnectionHandler, ConnectionSettings, ConnectionStatus};
use crate::protocol::{self, Command};

type WsSink = SplitSink<WsStream, Message>;

/// Why the read phase of a connection ended
#[derive(Debug)]
enum ReadExit {
    Stopped,
    ClosedByPeer(Option<String>),
    EndOfStream,
    Error(String),
    HeartbeatTimeout,
}

impl fmt::Display for ReadExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadExit::Stopped => write!(f, "stopped"),
            ReadExit::ClosedByPeer(Some(reason)) if !reason.is_empty() => {
                write!(f, "closed by peer ({})", reason)
            },
            ReadExit::ClosedByPeer(_) => write!(f, "closed by peer"),
            ReadExit::EndOfStream => write!(f, "stream ended"),
            ReadExit::Error(e) => write!(f, "read error: {}", e),
            ReadExit::HeartbeatTimeout => write!(f, "no pong within close timeout"),
        }
    }
}

/// Persistent connection to the companion app
///
/// One instance drives one connection loop: `start()` runs until `stop()`
/// and the instance is not restartable afterwards.
pub struct ConnectionManager {
    url: String,
    settings: ConnectionSettings,
    handler: Arc<dyn ConnectionHandler>,
    connector: Arc<dyn Connector>,

    started: AtomicBool,
    stop_tx: watch::Sender<bool>,
    sink: Mutex<Option<WsSink>>,

    status: RwLock<ConnectionStatus>,
    reconnect_count: AtomicUsize,
}

impl ConnectionManager {
    /// Create a manager using the default WebSocket connector
    pub fn new(
        url: impl Into<String>,
        settings: ConnectionSettings,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Self {
        Self::with_connector(url, settings, handler, Arc::new(WsConnector))
    }

    pub fn with_connector(
        url: impl Into<String>,
        settings: ConnectionSettings,
        handler: Arc<dyn ConnectionHandler>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            url: url.into(),
            settings,
            handler,
            connector,
            started: AtomicBool::new(false),
            stop_tx,
            sink: Mutex::new(None),
            status: RwLock::new(ConnectionStatus::Idle),
            reconnect_count: AtomicUsize::new(0),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Run the connection loop until `stop()` is called
    ///
    /// Errors never escape the loop; the only error is starting an instance
    /// that is already running (or has run).
    pub async fn start(&self) -> Result<(), ConnectionError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::AlreadyStarted);
        }

        let mut stop_rx = self.stop_tx.subscribe();
        info!("🔌 Connecting to companion app at {}", self.url);

        while !self.is_stopped() {
            self.set_status(ConnectionStatus::Connecting);

            let opened = tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => break,
                result = self.connector.open(&self.url) => result,
            };

            match opened {
                Ok(ws) => {
                    self.reconnect_count.store(0, Ordering::SeqCst);
                    let exit = self.run_connection(ws, &mut stop_rx).await;
                    info!("🔌 Disconnected from {}: {}", self.url, exit);
                    self.handler.on_disconnect();
                },
                Err(e) => {
                    if self.is_stopped() {
                        break;
                    }
                    warn!("Connection to {} failed: {}", self.url, e);
                    self.handler.on_disconnect();
                },
            }

            if self.is_stopped() {
                break;
            }

            let attempt = self.reconnect_count.fetch_add(1, Ordering::SeqCst) + 1;
            self.set_status(ConnectionStatus::Reconnecting { attempt });
            debug!(
                "⏳ Reconnect #{} to {} in {}ms",
                attempt,
                self.url,
                self.settings.reconnect_delay.as_millis()
            );

            tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => break,
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {},
            }
        }

        self.set_status(ConnectionStatus::Stopped);
        info!("Connection loop for {} stopped", self.url);
        Ok(())
    }

    /// Stop the loop and close the socket if open. Idempotent, safe before
    /// `start()`, during a connection, and during a reconnect wait.
    pub async fn stop(&self) {
        let was_stopped = self.stop_tx.send_replace(true);
        if !was_stopped {
            info!("Stopping connection to {}", self.url);
        }

        let sink = self.sink.lock().await.take();
        if let Some(sink) = sink {
            self.close_sink(sink).await;
        }
    }

    /// Send one command if connected; dropped silently otherwise
    pub async fn send(&self, command: &Command) {
        let text = match protocol::encode(command) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode command {}: {}", command, e);
                return;
            },
        };

        match self.send_message(Message::Text(text)).await {
            Ok(true) => debug!("📤 Sent {}", command),
            Ok(false) => debug!("Send skipped, not connected: {}", command),
            Err(e) => warn!("Failed to send {}: {}", command, e),
        }
    }

    /// Returns Ok(false) when there is no open socket
    async fn send_message(&self, message: Message) -> Result<bool, String> {
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Ok(false);
        };

        match tokio::time::timeout(self.settings.close_timeout, sink.send(message)).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("send timed out".to_string()),
        }
    }

    async fn run_connection(&self, ws: WsStream, stop_rx: &mut watch::Receiver<bool>) -> ReadExit {
        let (sink, mut stream) = ws.split();
        *self.sink.lock().await = Some(sink);

        self.set_status(ConnectionStatus::Connected);
        info!("✅ Connected to companion app at {}", self.url);
        self.handler.on_connect();

        let exit = self.read_frames(&mut stream, stop_rx).await;

        let sink = self.sink.lock().await.take();
        if let Some(sink) = sink {
            self.close_sink(sink).await;
        }
        exit
    }

    async fn read_frames(
        &self,
        stream: &mut SplitStream<WsStream>,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> ReadExit {
        let interval = self.settings.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Instant> = None;

        loop {
            let deadline = pong_deadline;
            let pong_timeout = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = stop_requested(stop_rx) => return ReadExit::Stopped,

                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Pong(_))) => pong_deadline = None,
                    Some(Ok(Message::Close(frame))) => {
                        return ReadExit::ClosedByPeer(frame.map(|f| f.reason.to_string()));
                    },
                    Some(Ok(Message::Binary(data))) => {
                        debug!("Ignoring {} byte binary frame", data.len());
                    },
                    // Pings are answered by tungstenite itself
                    Some(Ok(_)) => {},
                    Some(Err(e)) => return ReadExit::Error(e.to_string()),
                    None => return ReadExit::EndOfStream,
                },

                _ = heartbeat.tick() => {
                    if pong_deadline.is_none() {
                        match self.send_message(Message::Ping(Vec::new())).await {
                            Ok(_) => pong_deadline = Some(Instant::now() + self.settings.close_timeout),
                            Err(e) => return ReadExit::Error(format!("heartbeat ping failed: {}", e)),
                        }
                    }
                },

                _ = pong_timeout => {
                    warn!("Heartbeat to {} timed out", self.url);
                    return ReadExit::HeartbeatTimeout;
                },
            }
        }
    }

    /// Decode and hand one text frame to the handler; bad frames are dropped
    fn dispatch(&self, text: &str) {
        match protocol::decode(text) {
            Ok(envelope) => {
                debug!(message_type = envelope.message_type(), "📥 Message received");
                self.handler.on_message(envelope);
            },
            Err(e) => warn!("Failed to handle WS message: {}", e),
        }
    }

    async fn close_sink(&self, mut sink: WsSink) {
        match tokio::time::timeout(self.settings.close_timeout, sink.close()).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => debug!("Socket close: {}", e),
            Err(_) => debug!("Socket close timed out after {:?}", self.settings.close_timeout),
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.write() = status;
    }
}

/// Resolves once stop has been requested
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow_and_update() {
            return;
        }
        if stop_rx.changed().await.is_err() {
            // Sender lives as long as the manager; treat loss as "never"
            std::future::pending::<()>().await;
        }
    }
}
