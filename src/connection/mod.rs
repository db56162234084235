//! Connection management for the companion app WebSocket
//!
//! The manager owns the socket lifecycle (connect, read, heartbeat,
//! reconnect, shutdown) and knows nothing about mixer state: it reports
//! lifecycle events and decoded envelopes through a `ConnectionHandler`.

mod connector;
mod manager;

use std::time::Duration;
use thiserror::Error;

use crate::protocol::Envelope;

pub use connector::{Connector, WsConnector, WsError, WsStream};
pub use manager::ConnectionManager;

/// Receiver of connection lifecycle events and inbound messages
///
/// Called from the connection loop, one call at a time and in arrival order.
pub trait ConnectionHandler: Send + Sync {
    /// Socket opened
    fn on_connect(&self);

    /// Socket closed, failed, or could not be opened
    fn on_disconnect(&self);

    /// One successfully decoded inbound message
    fn on_message(&self, envelope: Envelope);
}

/// Timing knobs of the connection loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Fixed wait between a disconnect and the next attempt
    pub reconnect_delay: Duration,
    /// Interval between WebSocket pings
    pub heartbeat_interval: Duration,
    /// How long to wait for a pong, a close handshake, or a send
    pub close_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection status of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not started yet
    Idle,
    /// Opening the socket
    Connecting,
    /// Socket open, reading frames
    Connected,
    /// Waiting before the next attempt
    Reconnecting { attempt: usize },
    /// Loop exited after `stop()`
    Stopped,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("connection loop is already running")]
    AlreadyStarted,
}

/// WebSocket URL for a companion app endpoint
pub fn endpoint_url(host: &str, port: u16, path: &str) -> String {
    format!("ws://{}:{}{}", host, port, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(endpoint_url("192.168.1.63", 27001, "/ws"), "ws://192.168.1.63:27001/ws");
    }

    #[test]
    fn test_default_settings() {
        let settings = ConnectionSettings::default();
        assert_eq!(settings.reconnect_delay, Duration::from_secs(5));
        assert!(settings.close_timeout < settings.heartbeat_interval);
    }
}
