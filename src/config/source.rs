//! Config sources: where secret declarations come from and how changes are
//! noticed.

use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::settings::RotationConfig;
use crate::errors::{Result, RotatorError};

/// Default quiet time after a file event before a change is reported
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// A place secret declarations are loaded from.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Human readable location, used in logs
    fn describe(&self) -> String;

    /// Load and parse the current declaration.
    async fn load(&self) -> Result<RotationConfig>;

    /// Subscribe to change notifications.
    ///
    /// Notifications are hints that the declaration may have changed; the
    /// receiver is expected to call [`ConfigSource::load`] again.
    async fn watch(&self) -> Result<ConfigChanges>;
}

impl fmt::Debug for dyn ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigSource({})", self.describe())
    }
}

/// Stream of change notifications from a [`ConfigSource`].
///
/// Holds any OS-level watcher alive for as long as the stream exists.
pub struct ConfigChanges {
    rx: mpsc::Receiver<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl ConfigChanges {
    pub fn new(rx: mpsc::Receiver<()>) -> Self {
        Self { rx, _watcher: None }
    }

    fn with_watcher(rx: mpsc::Receiver<()>, watcher: RecommendedWatcher) -> Self {
        Self { rx, _watcher: Some(watcher) }
    }

    /// Wait for the next change. `None` once the source stops notifying.
    pub async fn changed(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

impl fmt::Debug for ConfigChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigChanges").field("os_watcher", &self._watcher.is_some()).finish()
    }
}

/// YAML file on disk, watched with `notify`.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
    debounce: Duration,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), debounce: DEFAULT_DEBOUNCE }
    }

    /// Set debounce duration
    #[must_use = "builder methods must be chained or built"]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory to watch. Editors often replace files instead of
    /// writing them in place, so the parent is watched rather than the file.
    fn watch_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn load(&self) -> Result<RotationConfig> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            RotatorError::io(e, format!("Failed to read config file {}", self.path.display()))
        })?;
        RotationConfig::from_yaml(&text)
    }

    async fn watch(&self) -> Result<ConfigChanges> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| {
                RotatorError::config(format!("Config path {} has no file name", self.path.display()))
            })?;

        let (raw_tx, mut raw_rx) = mpsc::channel::<()>(16);

        // Kubernetes ConfigMap mounts replace a `..data` directory link and
        // never touch the file itself, so a change of the resolved target
        // counts as a change of the file.
        let path = self.path.clone();
        let mut target = std::fs::canonicalize(&path).ok();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
                    return;
                }
                let touches_file =
                    event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str()));
                let resolved = std::fs::canonicalize(&path).ok();
                let retargeted = resolved != target;
                target = resolved;

                if touches_file || retargeted {
                    // Full means a notification is already pending
                    let _ = raw_tx.try_send(());
                }
            }
            Err(e) => warn!(error = %e, "Config file watch error"),
        })?;

        let dir = self.watch_dir();
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!(path = %self.path.display(), dir = %dir.display(), "Watching config file");

        let (tx, rx) = mpsc::channel(1);
        let debounce = self.debounce;
        tokio::spawn(async move {
            while raw_rx.recv().await.is_some() {
                tokio::time::sleep(debounce).await;
                while raw_rx.try_recv().is_ok() {}

                match tx.try_send(()) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });

        Ok(ConfigChanges::with_watcher(rx, watcher))
    }
}

#[derive(Debug, Clone)]
enum Declaration {
    Parsed(RotationConfig),
    Yaml(String),
}

/// In-memory declaration for embedding and tests.
///
/// [`StaticConfigSource::replace`] swaps the declaration and notifies every
/// watcher.
#[derive(Debug)]
pub struct StaticConfigSource {
    declaration: RwLock<Declaration>,
    watchers: RwLock<Vec<mpsc::Sender<()>>>,
}

impl StaticConfigSource {
    pub fn new(config: RotationConfig) -> Self {
        Self::from_declaration(Declaration::Parsed(config))
    }

    /// Source whose content is parsed on every load, so it can hold invalid
    /// documents.
    pub fn from_yaml(yaml: impl Into<String>) -> Self {
        Self::from_declaration(Declaration::Yaml(yaml.into()))
    }

    fn from_declaration(declaration: Declaration) -> Self {
        Self { declaration: RwLock::new(declaration), watchers: RwLock::new(Vec::new()) }
    }

    /// Replace the declaration and notify watchers.
    pub fn replace(&self, config: RotationConfig) {
        self.set(Declaration::Parsed(config));
    }

    /// Replace the declaration with raw YAML and notify watchers.
    pub fn replace_yaml(&self, yaml: impl Into<String>) {
        self.set(Declaration::Yaml(yaml.into()));
    }

    fn set(&self, declaration: Declaration) {
        *self.declaration.write().unwrap_or_else(PoisonError::into_inner) = declaration;

        let mut watchers = self.watchers.write().unwrap_or_else(PoisonError::into_inner);
        watchers.retain(|tx| !matches!(tx.try_send(()), Err(mpsc::error::TrySendError::Closed(_))));
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    fn describe(&self) -> String {
        "static".to_string()
    }

    async fn load(&self) -> Result<RotationConfig> {
        let declaration = self.declaration.read().unwrap_or_else(PoisonError::into_inner).clone();
        match declaration {
            Declaration::Parsed(config) => {
                config.validate()?;
                Ok(config)
            }
            Declaration::Yaml(yaml) => RotationConfig::from_yaml(&yaml),
        }
    }

    async fn watch(&self) -> Result<ConfigChanges> {
        let (tx, rx) = mpsc::channel(1);
        self.watchers.write().unwrap_or_else(PoisonError::into_inner).push(tx);
        Ok(ConfigChanges::new(rx))
    }
}
