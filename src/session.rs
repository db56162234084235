//! Session - one connection manager plus one state store for one endpoint
//!
//! This is the consumer-facing surface: snapshot reads, change
//! subscriptions, best-effort commands and the readiness gate.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::connection::{ConnectionManager, ConnectionStatus, Connector, WsConnector};
use crate::model::{ProtocolVersion, Snapshot};
use crate::protocol::{Command, Target};
use crate::state::{StateStore, StoreEvent, SubscriptionId};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("companion app at {host}:{port} sent no state within {timeout:?}")]
    NotReady {
        host: String,
        port: u16,
        timeout: Duration,
    },
    #[error("unsupported protocol version {found} (supported major version: {supported_major})")]
    UnsupportedProtocol {
        found: ProtocolVersion,
        supported_major: u32,
    },
}

impl SessionError {
    /// Whether starting a fresh session later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::NotReady { .. })
    }
}

/// A live device session
pub struct Session {
    endpoint_id: String,
    host: String,
    port: u16,
    first_state_timeout: Duration,
    supported_major: u32,

    store: Arc<StateStore>,
    manager: Arc<ConnectionManager>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Start a session against the configured endpoint
    ///
    /// Must be called from within a Tokio runtime; the connection loop runs
    /// on its own task until `shutdown()`.
    pub fn spawn(config: &AppConfig) -> Self {
        Self::spawn_with_connector(config, Arc::new(WsConnector))
    }

    pub fn spawn_with_connector(config: &AppConfig, connector: Arc<dyn Connector>) -> Self {
        let device = &config.device;
        let store = Arc::new(StateStore::new());
        let manager = Arc::new(ConnectionManager::with_connector(
            device.url(),
            config.session.connection_settings(),
            store.clone(),
            connector,
        ));

        let endpoint_id = device.endpoint_id();
        let runner = Arc::clone(&manager);
        let task = tokio::spawn(async move {
            if let Err(e) = runner.start().await {
                warn!("Connection loop did not start: {}", e);
            }
        });

        info!("🎛️  Session started for {}", endpoint_id);

        Self {
            endpoint_id,
            host: device.host.clone(),
            port: device.port,
            first_state_timeout: config.session.first_state_timeout(),
            supported_major: config.session.supported_protocol_major,
            store,
            manager,
            task: Mutex::new(Some(task)),
        }
    }

    /// `host:port` of the device this session mirrors
    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.store.current()
    }

    /// Register a listener for every store event
    pub fn on_change<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn remove_listener(&self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    /// Connected and holding a full state
    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    /// Send a `set` command; dropped when not connected
    pub async fn send_command(
        &self,
        target: Target,
        index: usize,
        param: impl Into<String>,
        value: impl Into<Value>,
    ) {
        self.send(&Command::new(target, index, param, value)).await;
    }

    pub async fn send(&self, command: &Command) {
        self.manager.send(command).await;
    }

    /// Wait for the first full state and check its protocol version
    pub async fn wait_until_ready(&self) -> Result<Arc<Snapshot>, SessionError> {
        debug!(
            "Waiting up to {:?} for first state from {}",
            self.first_state_timeout, self.endpoint_id
        );

        let snapshot = self
            .store
            .wait_for_snapshot(self.first_state_timeout)
            .await
            .ok_or_else(|| SessionError::NotReady {
                host: self.host.clone(),
                port: self.port,
                timeout: self.first_state_timeout,
            })?;

        self.check_protocol(&snapshot)?;

        info!(
            "✅ {} ready: {} (protocol {})",
            self.endpoint_id,
            snapshot.kind(),
            snapshot.protocol()
        );
        Ok(snapshot)
    }

    /// Gate a snapshot on the supported protocol major. The store only
    /// compares majors within one connection, so a state adopted after a
    /// reconnect has to be checked here again.
    pub fn check_protocol(&self, snapshot: &Snapshot) -> Result<(), SessionError> {
        if snapshot.protocol().is_supported_by(self.supported_major) {
            return Ok(());
        }
        Err(SessionError::UnsupportedProtocol {
            found: snapshot.protocol().clone(),
            supported_major: self.supported_major,
        })
    }

    /// Stop the connection loop and wait for it to finish
    pub async fn shutdown(&self) {
        self.manager.stop().await;

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Connection task for {} ended abnormally: {}", self.endpoint_id, e);
            }
        }
        info!("Session for {} shut down", self.endpoint_id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
