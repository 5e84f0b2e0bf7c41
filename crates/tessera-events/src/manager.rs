//! Configuration Manager
//!
//! Central coordinator owning the layered configuration. Every mutation path
//! (file reload, programmatic rebuild, mutable-source commit) goes through
//! the same step: freeze the new state, diff it against the previous
//! snapshot, swap it in and fire the change when it is not empty.

use crate::config_change::{ConfigurationChange, ConfigurationChangeBuilder};
use crate::frozen::FrozenConfiguration;
use crate::listener::{ConfigEvent, ConfigEventManager};
use crate::mutable::{MutablePropertySource, TransactionId};
use crate::watch::{FileWatcher, FileWatcherConfig, SourceSignal, WatchHandle, WatchableSource};
use crate::{EventError, Result};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_core::{
    CombinationPolicy, Configuration, ConfigurationContext, ConfigurationContextBuilder,
    EnvPropertySource, FilePropertySource, PropertyFilter, PropertySource,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the channel between watchers and the reload task
const SIGNAL_BUFFER_SIZE: usize = 64;

/// Configuration manager builder
pub struct ConfigurationManagerBuilder {
    context: ConfigurationContextBuilder,
    files: Vec<FileWatcherConfig>,
    mutable: Option<Arc<MutablePropertySource>>,
    events: Option<ConfigEventManager>,
}

impl ConfigurationManagerBuilder {
    pub fn new() -> Self {
        Self {
            context: ConfigurationContext::builder(),
            files: Vec::new(),
            mutable: None,
            events: None,
        }
    }

    pub fn with_source(mut self, source: impl PropertySource + 'static) -> Self {
        self.context = self.context.add_source(source);
        self
    }

    pub fn with_shared_source(mut self, source: Arc<dyn PropertySource>) -> Self {
        self.context = self.context.add_shared_source(source);
        self
    }

    /// Add a file source, watched once watching is started
    pub fn with_file(self, path: impl Into<PathBuf>) -> Self {
        self.with_file_config(FileWatcherConfig::new(path))
    }

    pub fn with_file_config(mut self, config: FileWatcherConfig) -> Self {
        self.files.push(config);
        self
    }

    /// Add the process environment, optionally restricted to a prefix
    pub fn with_env(mut self, prefix: Option<&str>) -> Self {
        let source = match prefix {
            Some(prefix) => EnvPropertySource::with_prefix(prefix),
            None => EnvPropertySource::new(),
        };
        self.context = self.context.add_source(source);
        self
    }

    /// Add a transactional source for runtime overrides
    pub fn with_mutable_source(mut self, name: impl Into<String>) -> Self {
        let source = Arc::new(MutablePropertySource::new(name));
        self.context = self.context.add_shared_source(source.clone());
        self.mutable = Some(source);
        self
    }

    pub fn with_filter(mut self, filter: impl PropertyFilter + 'static) -> Self {
        self.context = self.context.add_filter(filter);
        self
    }

    pub fn with_policy(mut self, policy: impl CombinationPolicy + 'static) -> Self {
        self.context = self.context.with_policy(policy);
        self
    }

    /// Share an existing event manager instead of creating one
    pub fn with_event_manager(mut self, events: ConfigEventManager) -> Self {
        self.events = Some(events);
        self
    }

    /// Load file sources and take the initial snapshot
    pub fn build(self) -> Result<ConfigurationManager> {
        let mut context = self.context;
        let mut files = Vec::with_capacity(self.files.len());
        for watch in self.files {
            let source = Arc::new(FilePropertySource::new(watch.path.clone())?);
            info!(source = source.name(), "Loaded file source");
            context = context.add_shared_source(source.clone());
            files.push(WatchedFile { source, watch });
        }

        let config = Configuration::new(context.build());
        let snapshot = FrozenConfiguration::of(&config);
        debug!(properties = snapshot.properties().len(), "Initial configuration snapshot");

        Ok(ConfigurationManager {
            inner: Arc::new(ManagerInner {
                current: ArcSwap::from_pointee(config),
                snapshot: Mutex::new(snapshot),
                files,
                mutable: self.mutable,
                events: self.events.unwrap_or_default(),
                watch_handles: tokio::sync::Mutex::new(Vec::new()),
                processor: tokio::sync::Mutex::new(None),
            }),
        })
    }
}

impl Default for ConfigurationManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct WatchedFile {
    source: Arc<FilePropertySource>,
    watch: FileWatcherConfig,
}

struct ManagerInner {
    /// Current configuration, read lock-free
    current: ArcSwap<Configuration>,
    /// Last published state; held while computing and publishing a change
    snapshot: Mutex<FrozenConfiguration>,
    files: Vec<WatchedFile>,
    mutable: Option<Arc<MutablePropertySource>>,
    events: ConfigEventManager,
    watch_handles: tokio::sync::Mutex<Vec<WatchHandle>>,
    processor: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Central configuration manager.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ConfigurationManager {
    inner: Arc<ManagerInner>,
}

impl ConfigurationManager {
    pub fn builder() -> ConfigurationManagerBuilder {
        ConfigurationManagerBuilder::new()
    }

    /// Current configuration
    pub fn config(&self) -> Configuration {
        Configuration::clone(&self.inner.current.load_full())
    }

    /// Last published snapshot
    pub fn snapshot(&self) -> FrozenConfiguration {
        self.inner.snapshot.lock().clone()
    }

    pub fn events(&self) -> &ConfigEventManager {
        &self.inner.events
    }

    /// Subscribe to all published events
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.inner.events.subscribe()
    }

    pub fn mutable_source(&self) -> Option<&Arc<MutablePropertySource>> {
        self.inner.mutable.as_ref()
    }

    /// Re-read all file sources and publish the resulting change.
    ///
    /// A file that fails to parse keeps its previous content.
    pub fn reload(&self) -> ConfigurationChange {
        for file in &self.inner.files {
            reload_file(&file.source);
        }
        let context = self.inner.current.load().context().to_builder().build();
        self.publish(context, None)
    }

    /// Reload one named source and publish the resulting change
    pub fn reload_source(&self, name: &str) -> ConfigurationChange {
        match self.inner.files.iter().find(|f| f.source.name() == name) {
            Some(file) => reload_file(&file.source),
            None => debug!("No reloadable source named {}", name),
        }
        let context = self.inner.current.load().context().to_builder().build();
        self.publish(context, None)
    }

    /// Rebuild the context programmatically and publish the resulting change
    pub fn apply<F>(&self, update: F) -> ConfigurationChange
    where
        F: FnOnce(ConfigurationContextBuilder) -> ConfigurationContextBuilder,
    {
        let builder = self.inner.current.load().context().to_builder();
        self.publish(update(builder).build(), None)
    }

    pub fn start_transaction(&self) -> Result<TransactionId> {
        Ok(self.mutable()?.start_transaction())
    }

    pub fn put(&self, tx: TransactionId, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.mutable()?.put(tx, key, value)
    }

    pub fn remove(&self, tx: TransactionId, key: impl Into<String>) -> Result<()> {
        self.mutable()?.remove(tx, key)
    }

    pub fn rollback(&self, tx: TransactionId) -> Result<bool> {
        Ok(self.mutable()?.rollback(tx))
    }

    /// Commit a transaction of the mutable source.
    ///
    /// Fires the source change, then the configuration change; both carry
    /// the transaction id.
    pub fn commit(&self, tx: TransactionId) -> Result<ConfigurationChange> {
        let source_change = self.mutable()?.commit(tx)?;
        self.inner.events.fire(source_change);

        let context = self.inner.current.load().context().to_builder().build();
        Ok(self.publish(context, Some(tx.to_string())))
    }

    /// Set a single runtime override
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<ConfigurationChange> {
        let tx = self.start_transaction()?;
        self.put(tx, key, value)?;
        self.commit(tx)
    }

    /// Start file watchers; a change of a watched file reloads that source
    pub async fn start_watching(&self) -> Result<()> {
        let mut processor = self.inner.processor.lock().await;
        if processor.is_some() {
            debug!("Configuration watching already started");
            return Ok(());
        }

        let (tx, mut rx) = mpsc::channel::<SourceSignal>(SIGNAL_BUFFER_SIZE);

        let mut handles = self.inner.watch_handles.lock().await;
        for file in &self.inner.files {
            let watcher = FileWatcher::new(file.source.name(), file.watch.clone());
            match watcher.watch(tx.clone()).await {
                Ok(handle) => {
                    info!("Started watching {} source", watcher.source_name());
                    handles.push(handle);
                }
                Err(e) => {
                    error!("Failed to start watching {} source: {e}", watcher.source_name());
                }
            }
        }
        // Only the watchers hold senders; the task ends when they stop
        drop(tx);

        let manager = self.clone();
        *processor = Some(tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                debug!("Received source signal: {:?}", signal);
                let change = manager.reload_source(&signal.source_name);
                if !change.is_empty() {
                    info!(
                        source = %signal.source_name,
                        changes = change.len(),
                        "Configuration reloaded"
                    );
                }
            }
        }));

        Ok(())
    }

    /// Stop all watchers and the reload task
    pub async fn stop_watching(&self) {
        let mut processor = self.inner.processor.lock().await;
        let mut handles = self.inner.watch_handles.lock().await;
        for handle in handles.drain(..) {
            handle.stop().await;
        }
        if let Some(processor) = processor.take() {
            let _ = processor.await;
        }
    }

    fn mutable(&self) -> Result<&MutablePropertySource> {
        self.inner
            .mutable
            .as_deref()
            .ok_or(EventError::NoMutableSource)
    }

    /// Diff `context` against the last snapshot, swap it in and fire
    fn publish(&self, context: ConfigurationContext, transaction_id: Option<String>) -> ConfigurationChange {
        let config = Configuration::new(context);
        let mut snapshot = self.inner.snapshot.lock();

        let current = FrozenConfiguration::of(&config);
        let mut builder = ConfigurationChangeBuilder::from_frozen(snapshot.clone()).compare_frozen(&current);
        if let Some(tx) = transaction_id {
            builder = builder.with_transaction_id(tx);
        }
        let change = builder.build();

        self.inner.current.store(Arc::new(config));
        *snapshot = current;
        drop(snapshot);

        if !change.is_empty() {
            debug!(
                version = change.version(),
                changes = change.len(),
                "Publishing configuration change"
            );
            self.inner.events.fire(change.clone());
        }
        change
    }
}

fn reload_file(source: &FilePropertySource) {
    match source.reload() {
        Ok(true) => debug!("Reloaded {}", source.name()),
        Ok(false) => {}
        Err(e) => warn!("Failed to reload config from {}: {e}", source.name()),
    }
}

impl std::fmt::Debug for ConfigurationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationManager")
            .field("sources", &self.inner.current.load().context().sources().len())
            .field("files", &self.inner.files.len())
            .field("has_mutable_source", &self.inner.mutable.is_some())
            .field("events", &self.inner.events)
            .finish()
    }
}
