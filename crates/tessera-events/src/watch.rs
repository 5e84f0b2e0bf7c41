//! Watching property sources for external changes
//!
//! A watchable source sends a [`SourceSignal`] whenever its backing resource
//! changes. The receiver decides what to reload.

use crate::{EventError, Result};

use async_trait::async_trait;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Notification that a watched source changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSignal {
    pub source_name: String,
    pub path: Option<PathBuf>,
}

/// Trait for sources that can report external changes
#[async_trait]
pub trait WatchableSource: Send + Sync {
    /// Name of the watched source
    fn source_name(&self) -> &str;

    /// Start watching; signals are sent through `tx`
    async fn watch(&self, tx: mpsc::Sender<SourceSignal>) -> Result<WatchHandle>;
}

/// Handle for a running watcher or observer task
pub struct WatchHandle {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

impl WatchHandle {
    pub fn new(handle: JoinHandle<()>, shutdown: oneshot::Sender<()>) -> Self {
        Self { handle, shutdown }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

/// Configuration for a file watcher
#[derive(Debug, Clone)]
pub struct FileWatcherConfig {
    /// Watched file
    pub path: PathBuf,
    /// Debounce duration for rapid changes
    pub debounce: Duration,
}

impl FileWatcherConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            debounce: Duration::from_millis(500),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Watches a single file through its parent directory
#[derive(Debug, Clone)]
pub struct FileWatcher {
    source_name: String,
    config: FileWatcherConfig,
}

impl FileWatcher {
    pub fn new(source_name: impl Into<String>, config: FileWatcherConfig) -> Self {
        Self {
            source_name: source_name.into(),
            config,
        }
    }

    pub fn config(&self) -> &FileWatcherConfig {
        &self.config
    }
}

#[async_trait]
impl WatchableSource for FileWatcher {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    async fn watch(&self, tx: mpsc::Sender<SourceSignal>) -> Result<WatchHandle> {
        let path = self.config.path.clone();
        let debounce = self.config.debounce;
        let source_name = self.source_name.clone();

        // The file may not exist yet, so watch its directory
        let watch_path = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !watch_path.is_dir() {
            return Err(EventError::watcher(format!(
                "cannot watch {}: directory {} does not exist",
                path.display(),
                watch_path.display()
            )));
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut debouncer = match new_debouncer(debounce, notify_tx) {
                Ok(d) => d,
                Err(e) => {
                    error!("Failed to create file watcher: {e}");
                    return;
                }
            };

            if let Err(e) = debouncer
                .watcher()
                .watch(&watch_path, RecursiveMode::NonRecursive)
            {
                error!("Failed to watch path {:?}: {e}", watch_path);
                return;
            }

            info!(source = %source_name, "Started watching file: {:?}", path);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!(source = %source_name, "File watcher shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        while let Ok(events) = notify_rx.try_recv() {
                            let events = match events {
                                Ok(events) => events,
                                Err(e) => {
                                    error!("File watcher error: {:?}", e);
                                    continue;
                                }
                            };

                            // One signal per debounced batch is enough
                            if !events.iter().any(|event| event.path.file_name() == path.file_name()) {
                                continue;
                            }

                            debug!(source = %source_name, "Watched file changed: {:?}", path);
                            let signal = SourceSignal {
                                source_name: source_name.clone(),
                                path: Some(path.clone()),
                            };
                            if tx.send(signal).await.is_err() {
                                warn!("Source signal receiver dropped");
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(WatchHandle::new(handle, shutdown_tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_file_watcher() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("watch-test.toml");
        std::fs::write(&config_path, "port = 8080\n").unwrap();

        let watcher = FileWatcher::new(
            "file:watch-test.toml",
            FileWatcherConfig::new(&config_path).with_debounce(Duration::from_millis(100)),
        );

        let (tx, mut rx) = mpsc::channel(10);
        let handle = watcher.watch(tx).await.unwrap();

        // Give watcher time to start
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(&config_path, "port = 9090\n").unwrap();

        match timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(signal)) => {
                assert_eq!(signal.source_name, "file:watch-test.toml");
                assert_eq!(signal.path.as_deref(), Some(config_path.as_path()));
            }
            Ok(None) => panic!("Channel closed unexpectedly"),
            Err(_) => panic!("Timeout waiting for file change signal"),
        }

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_missing_directory_is_rejected() {
        let watcher = FileWatcher::new("file", FileWatcherConfig::new("/nonexistent/dir/app.toml"));
        let (tx, _rx) = mpsc::channel(1);
        assert!(matches!(watcher.watch(tx).await, Err(EventError::Watcher(_))));
    }

    #[tokio::test]
    async fn test_stop_handle() {
        let temp_dir = TempDir::new().unwrap();
        let watcher = FileWatcher::new("file", FileWatcherConfig::new(temp_dir.path().join("a.toml")));
        let (tx, _rx) = mpsc::channel(1);

        let handle = watcher.watch(tx).await.unwrap();
        assert!(!handle.is_finished());
        handle.stop().await;
    }
}
