//! # Config Agent
//!
//! Holds the latest valid [`RotationConfig`] and keeps it fresh from a
//! [`ConfigSource`]. Readers take a snapshot with [`ConfigAgent::current`],
//! which never blocks and never observes a half-applied update.
//!
//! ```rust,ignore
//! let agent = Arc::new(ConfigAgent::new());
//! let watcher = agent.watch_config(Arc::new(FileConfigSource::new(path))).await?;
//! tokio::spawn(watcher.run(stop.clone()));
//!
//! let snapshot = agent.current();
//! ```

use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::settings::RotationConfig;
use super::source::{ConfigChanges, ConfigSource};
use crate::errors::Result;

/// Publishes config snapshots to the rotation engine.
#[derive(Debug)]
pub struct ConfigAgent {
    current: ArcSwap<RotationConfig>,
}

impl Default for ConfigAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigAgent {
    /// Agent with an empty declaration
    pub fn new() -> Self {
        Self::with_config(RotationConfig::default())
    }

    pub fn with_config(config: RotationConfig) -> Self {
        Self { current: ArcSwap::from_pointee(config) }
    }

    /// The most recently published valid config.
    pub fn current(&self) -> Arc<RotationConfig> {
        self.current.load_full()
    }

    /// Try to refresh from `source` once.
    ///
    /// Returns `true` when a new snapshot was published. A load or parse
    /// failure is logged and the previous snapshot retained.
    pub async fn reload(&self, source: &dyn ConfigSource) -> bool {
        match source.load().await {
            Ok(config) => {
                if *self.current.load_full() == config {
                    debug!(source = %source.describe(), "Rotation config unchanged");
                    return false;
                }
                let specs = config.len();
                self.current.store(Arc::new(config));
                info!(source = %source.describe(), specs, "Rotation config reloaded");
                true
            }
            Err(e) => {
                warn!(
                    source = %source.describe(),
                    error = %e,
                    "Rejected rotation config update, keeping last valid config"
                );
                false
            }
        }
    }

    /// Load `source` and return a runner that keeps following it.
    ///
    /// The subscription is opened before the initial load so an edit made in
    /// between is not missed. A failed initial load is returned to the caller
    /// and nothing is published.
    pub async fn watch_config(
        self: &Arc<Self>,
        source: Arc<dyn ConfigSource>,
    ) -> Result<ConfigWatcher> {
        let changes = source.watch().await?;
        let config = source.load().await?;

        info!(source = %source.describe(), specs = config.len(), "Rotation config loaded");
        self.current.store(Arc::new(config));

        Ok(ConfigWatcher { agent: Arc::clone(self), source, changes })
    }
}

/// Follows a [`ConfigSource`] until cancelled.
#[derive(Debug)]
pub struct ConfigWatcher {
    agent: Arc<ConfigAgent>,
    source: Arc<dyn ConfigSource>,
    changes: ConfigChanges,
}

impl ConfigWatcher {
    /// Reload on every change notification until `stop` fires or the source
    /// stops notifying. The last published snapshot stays readable.
    pub async fn run(mut self, stop: CancellationToken) {
        info!(source = %self.source.describe(), "Config watcher started");

        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    info!(source = %self.source.describe(), "Config watcher stopping");
                    break;
                }
                change = self.changes.changed() => {
                    match change {
                        Some(()) => {
                            self.agent.reload(self.source.as_ref()).await;
                        }
                        None => {
                            warn!(source = %self.source.describe(), "Config change stream closed");
                            break;
                        }
                    }
                }
            }
        }
    }
}
