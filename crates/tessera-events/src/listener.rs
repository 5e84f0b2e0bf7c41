//! Change events and listener management
//!
//! Listeners are held by weak reference: registering a listener never keeps
//! it alive, and listeners dropped by their owner are pruned on the next
//! dispatch. Async consumers can subscribe to a broadcast channel instead.

use crate::config_change::ConfigurationChange;
use crate::source_change::PropertySourceChange;
use crate::{EventError, Result};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Default buffer size for the broadcast channel.
/// Slow receivers lose the oldest events beyond this limit.
const DEFAULT_BUFFER_SIZE: usize = 256;

/// Event published for a change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigEvent {
    /// A single property source changed
    Source(PropertySourceChange),
    /// The evaluated configuration changed
    Configuration(ConfigurationChange),
}

/// Selector for [`ConfigEvent`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigEventKind {
    Source,
    Configuration,
}

impl ConfigEvent {
    pub fn kind(&self) -> ConfigEventKind {
        match self {
            Self::Source(_) => ConfigEventKind::Source,
            Self::Configuration(_) => ConfigEventKind::Configuration,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Source(change) => change.is_empty(),
            Self::Configuration(change) => change.is_empty(),
        }
    }

    pub fn version(&self) -> &str {
        match self {
            Self::Source(change) => change.version(),
            Self::Configuration(change) => change.version(),
        }
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        match self {
            Self::Source(change) => change.timestamp(),
            Self::Configuration(change) => change.timestamp(),
        }
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            Self::Source(change) => change.transaction_id(),
            Self::Configuration(change) => change.transaction_id(),
        }
    }
}

impl From<PropertySourceChange> for ConfigEvent {
    fn from(change: PropertySourceChange) -> Self {
        Self::Source(change)
    }
}

impl From<ConfigurationChange> for ConfigEvent {
    fn from(change: ConfigurationChange) -> Self {
        Self::Configuration(change)
    }
}

/// Trait for synchronous change listeners
pub trait ConfigEventListener: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether this listener wants events of the given kind
    fn accepts(&self, _kind: ConfigEventKind) -> bool {
        true
    }

    fn on_event(&self, event: &ConfigEvent);
}

/// Dispatcher for configuration change events.
///
/// Cheap to clone; clones share listeners and the broadcast channel.
#[derive(Clone)]
pub struct ConfigEventManager {
    listeners: Arc<RwLock<Vec<Weak<dyn ConfigEventListener>>>>,
    sender: broadcast::Sender<ConfigEvent>,
}

impl ConfigEventManager {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            sender,
        }
    }

    /// Register a listener without taking ownership of it
    pub fn add_listener(&self, listener: &Arc<dyn ConfigEventListener>) {
        let weak = Arc::downgrade(listener);
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|l| Weak::ptr_eq(l, &weak)) {
            return;
        }
        listeners.push(weak);
    }

    /// Unregister a listener; returns whether it was registered
    pub fn remove_listener(&self, listener: &Arc<dyn ConfigEventListener>) -> bool {
        let weak = Arc::downgrade(listener);
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Weak::ptr_eq(l, &weak));
        listeners.len() != before
    }

    /// Number of registered listeners still alive
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }

    /// Subscribe to all non-empty events
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Dispatch an event synchronously.
    ///
    /// Empty change sets are dropped. A panicking listener is logged and
    /// does not stop delivery to the others. Returns the number of listeners
    /// and subscribers that received the event.
    pub fn fire(&self, event: impl Into<ConfigEvent>) -> usize {
        let event = event.into();
        if event.is_empty() {
            debug!("Skipping empty change event {}", event.version());
            return 0;
        }

        let kind = event.kind();
        let mut delivered = 0;
        for listener in self.live_listeners() {
            if !listener.accepts(kind) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(
                    listener = listener.name(),
                    version = event.version(),
                    "Config event listener panicked"
                ),
            }
        }

        delivered + self.sender.send(event).unwrap_or_default()
    }

    /// Dispatch an event on the blocking pool of the current tokio runtime
    pub fn fire_async(&self, event: impl Into<ConfigEvent>) -> Result<JoinHandle<usize>> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| EventError::NoRuntime(e.to_string()))?;
        let manager = self.clone();
        let event = event.into();
        Ok(handle.spawn_blocking(move || manager.fire(event)))
    }

    /// Upgrade live listeners and prune the dead ones
    fn live_listeners(&self) -> Vec<Arc<dyn ConfigEventListener>> {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.strong_count() > 0);
        if listeners.len() != before {
            debug!("Pruned {} dropped config listeners", before - listeners.len());
        }
        listeners.iter().filter_map(Weak::upgrade).collect()
    }
}

impl Default for ConfigEventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfigEventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigEventManager")
            .field("listener_count", &self.listener_count())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
