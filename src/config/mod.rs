//! Configuration management for vm-mirror
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::connection::{endpoint_url, ConnectionSettings};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Companion app endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
    /// Friendly name for logs; defaults to the endpoint id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DeviceConfig {
    /// `host:port`, unique per device
    pub fn endpoint_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        endpoint_url(&self.host, self.port, &self.path)
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.endpoint_id())
    }
}

/// Session timing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_first_state_timeout_ms")]
    pub first_state_timeout_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    #[serde(default = "default_supported_protocol_major")]
    pub supported_protocol_major: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            first_state_timeout_ms: default_first_state_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            supported_protocol_major: default_supported_protocol_major(),
        }
    }
}

impl SessionConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn first_state_timeout(&self) -> Duration {
        Duration::from_millis(self.first_state_timeout_ms)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            reconnect_delay: self.reconnect_delay(),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            close_timeout: Duration::from_millis(self.close_timeout_ms),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Parse and validate a YAML document
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Config for a bare endpoint, used when no file is given
    pub fn for_endpoint(host: impl Into<String>, port: u16) -> Self {
        Self {
            device: DeviceConfig {
                host: host.into(),
                port,
                path: default_path(),
                name: None,
            },
            session: SessionConfig::default(),
        }
    }

    /// Apply command-line endpoint overrides, then re-validate
    pub fn with_overrides(mut self, host: Option<&str>, port: Option<u16>) -> Result<Self> {
        if let Some(host) = host {
            self.device.host = host.to_string();
        }
        if let Some(port) = port {
            self.device.port = port;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        let device = &self.device;
        if device.host.trim().is_empty() {
            anyhow::bail!("device.host cannot be empty");
        }
        if device.port == 0 {
            anyhow::bail!("device.port must be between 1 and 65535");
        }
        if !device.path.starts_with('/') {
            anyhow::bail!("device.path must start with '/' (got {:?})", device.path);
        }

        let session = &self.session;
        for (name, value) in [
            ("reconnect_delay_ms", session.reconnect_delay_ms),
            ("first_state_timeout_ms", session.first_state_timeout_ms),
            ("heartbeat_interval_ms", session.heartbeat_interval_ms),
            ("close_timeout_ms", session.close_timeout_ms),
        ] {
            if value == 0 {
                anyhow::bail!("session.{} must be greater than 0", name);
            }
        }
        if session.heartbeat_interval_ms <= session.close_timeout_ms {
            anyhow::bail!(
                "session.heartbeat_interval_ms ({}) must be larger than session.close_timeout_ms ({})",
                session.heartbeat_interval_ms,
                session.close_timeout_ms
            );
        }

        Ok(())
    }
}

// Default value functions
fn default_port() -> u16 { 27001 }
fn default_path() -> String { "/ws".to_string() }
fn default_reconnect_delay_ms() -> u64 { 5_000 }
fn default_first_state_timeout_ms() -> u64 { 10_000 }
fn default_heartbeat_interval_ms() -> u64 { 30_000 }
fn default_close_timeout_ms() -> u64 { 5_000 }
fn default_supported_protocol_major() -> u32 { 1 }
