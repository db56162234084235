//! Shared helpers: a local companion-app stand-in and frame builders.

#![allow(dead_code)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use vm_mirror::config::{AppConfig, SessionConfig};
use vm_mirror::connection::ConnectionSettings;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts WebSocket clients on an ephemeral port and hands each one over
pub struct TestServer {
    pub port: u16,
    accepted: mpsc::UnboundedReceiver<Peer>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, accepted) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = accept_async(stream).await {
                    if tx.send(Peer { ws }).is_err() {
                        break;
                    }
                }
            }
        });

        Self { port, accepted }
    }

    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::for_endpoint("127.0.0.1", self.port);
        config.session = SessionConfig {
            reconnect_delay_ms: 50,
            first_state_timeout_ms: 2_000,
            ..SessionConfig::default()
        };
        config
    }

    /// Next client connection
    pub async fn accept(&mut self) -> Peer {
        timeout(TIMEOUT, self.accepted.recv())
            .await
            .expect("no client connected in time")
            .expect("server stopped")
    }

    /// Whether a client connects within `window`
    pub async fn try_accept(&mut self, window: Duration) -> Option<Peer> {
        timeout(window, self.accepted.recv()).await.ok().flatten()
    }
}

/// Server side of one client connection
pub struct Peer {
    pub ws: WebSocketStream<TcpStream>,
}

impl Peer {
    pub async fn send_json(&mut self, frame: Value) {
        self.send_text(frame.to_string()).await;
    }

    pub async fn send_text(&mut self, text: impl Into<String>) {
        self.ws.send(Message::Text(text.into())).await.unwrap();
    }

    /// Next text frame from the client, parsed as JSON
    pub async fn recv_json(&mut self) -> Value {
        loop {
            let frame = timeout(TIMEOUT, self.ws.next())
                .await
                .expect("no frame from client in time")
                .expect("client closed")
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
        // Drain until the client's close reply arrives
        let _ = timeout(Duration::from_secs(1), async {
            while let Some(Ok(_)) = self.ws.next().await {}
        })
        .await;
    }

    /// Keep reading (and so answering pings) in the background
    pub fn keep_alive(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { while let Some(Ok(_)) = self.ws.next().await {} })
    }
}

pub fn fast_settings() -> ConnectionSettings {
    ConnectionSettings {
        reconnect_delay: Duration::from_millis(50),
        heartbeat_interval: Duration::from_secs(30),
        close_timeout: Duration::from_millis(500),
    }
}

pub fn strip(index: usize, kind: &str) -> Value {
    let hardware = match kind {
        "basic" => 2,
        "banana" => 3,
        _ => 5,
    };
    json!({
        "index": index, "mute": false, "gain": 0.0, "virtual": index >= hardware,
        "a1": true, "a2": false, "a3": false, "a4": false, "a5": false,
        "b1": false, "b2": false, "b3": false
    })
}

pub fn bus(index: usize) -> Value {
    json!({"index": index, "mute": false, "gain": 0.0})
}

/// Full state frame with the kind's standard layout
pub fn state_frame(kind: &str, protocol: &str) -> Value {
    let (strips, buses) = match kind {
        "basic" => (3, 3),
        "banana" => (5, 5),
        _ => (8, 8),
    };
    json!({
        "type": "state",
        "kind": kind,
        "protocol": protocol,
        "strips": (0..strips).map(|i| strip(i, kind)).collect::<Vec<_>>(),
        "buses": (0..buses).map(bus).collect::<Vec<_>>(),
    })
}

pub fn update_frame(target: &str, index: usize, param: &str, value: Value) -> Value {
    json!({"type": "update", "target": target, "index": index, "param": param, "value": value})
}

/// Poll `check` until it holds or the timeout expires
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
