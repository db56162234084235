//! Configuration file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Watches the config file and yields each valid new version
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load the config file and start watching it
    pub async fn new(config_path: String) -> Result<(Self, Arc<AppConfig>)> {
        let (tx, rx) = mpsc::channel(10);

        let initial_config = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;
        let initial_config = Arc::new(initial_config);

        let watched_path = config_path.clone();

        // notify callbacks run on their own OS thread, outside the runtime
        let runtime_handle = tokio::runtime::Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_)) {
                        return;
                    }
                    debug!("Config file modified: {:?}", event.paths);

                    let config_path = watched_path.clone();
                    let tx = tx.clone();
                    runtime_handle.spawn(async move {
                        // Debounce: let the writer finish
                        tokio::time::sleep(Duration::from_millis(100)).await;

                        match AppConfig::load(&config_path).await {
                            Ok(new_config) => {
                                info!("Configuration reloaded from {}", config_path);
                                if let Err(e) = tx.send(new_config).await {
                                    error!("Failed to send config update: {}", e);
                                }
                            },
                            Err(e) => {
                                warn!("Failed to reload config (keeping old config): {:#}", e);
                            },
                        }
                    });
                },
                Err(e) => {
                    error!("Watch error: {}", e);
                },
            }
        })?;

        watcher
            .watch(Path::new(&config_path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", config_path))?;

        info!("Config file watcher started for: {}", config_path);

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            initial_config,
        ))
    }

    /// Wait for the next valid config; None once the watcher is gone
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_watcher_reloads_endpoint() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("vm-mirror.yaml");

        fs::write(&config_path, "device:\n  host: 10.0.0.1\n")?;

        let (mut watcher, config) =
            ConfigWatcher::new(config_path.to_string_lossy().to_string()).await?;
        assert_eq!(config.device.endpoint_id(), "10.0.0.1:27001");

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, "device:\n  host: 10.0.0.2\n  port: 27002\n")?;

        let new_config = tokio::time::timeout(Duration::from_secs(2), watcher.next_config()).await;

        // Event delivery is platform dependent; only check what was delivered
        if let Ok(Some(new_config)) = new_config {
            assert_eq!(new_config.device.endpoint_id(), "10.0.0.2:27002");
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_initial_config_fails() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("broken.yaml");
        fs::write(&config_path, "device:\n  host: \"\"\n")?;

        let result = ConfigWatcher::new(config_path.to_string_lossy().to_string()).await;
        assert!(result.is_err());
        Ok(())
    }
}
