//! Periodic change detection
//!
//! The observer re-evaluates a configuration on a fixed period, compares it
//! to the last snapshot and fires a [`ConfigurationChange`] when they differ.
//! This covers sources that cannot push notifications themselves.

use crate::config_change::{ConfigurationChange, ConfigurationChangeBuilder};
use crate::frozen::FrozenConfiguration;
use crate::listener::ConfigEventManager;
use crate::watch::WatchHandle;
use crate::{EventError, Result};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::Configuration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Settings of a [`ChangeObserver`]
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Time between two checks
    pub period: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(2),
        }
    }
}

impl ObserverConfig {
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }
}

type ConfigSupplier = dyn Fn() -> Configuration + Send + Sync;

/// Polls a configuration and publishes its changes
pub struct ChangeObserver {
    supplier: Arc<ConfigSupplier>,
    events: ConfigEventManager,
    last: Mutex<FrozenConfiguration>,
    config: ObserverConfig,
}

impl ChangeObserver {
    /// Create an observer; the first snapshot is taken immediately
    pub fn new<F>(supplier: F, events: ConfigEventManager, config: ObserverConfig) -> Self
    where
        F: Fn() -> Configuration + Send + Sync + 'static,
    {
        let last = FrozenConfiguration::of(&supplier());
        Self {
            supplier: Arc::new(supplier),
            events,
            last: Mutex::new(last),
            config,
        }
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Snapshot taken by the last check
    pub fn last_snapshot(&self) -> FrozenConfiguration {
        self.last.lock().clone()
    }

    /// Compare now and fire when something changed
    pub fn check_now(&self) -> Option<ConfigurationChange> {
        let current = FrozenConfiguration::of(&(self.supplier)());

        let change = {
            let mut last = self.last.lock();
            if *last == current {
                return None;
            }
            let previous = std::mem::replace(&mut *last, current.clone());
            ConfigurationChangeBuilder::from_frozen(previous)
                .compare_frozen(&current)
                .build()
        };

        debug!(changes = change.len(), "Observer detected configuration change");
        self.events.fire(change.clone());
        Some(change)
    }

    /// Run periodic checks on the current tokio runtime.
    ///
    /// Fails with [`EventError::NoRuntime`] when called outside a runtime.
    pub fn start(self: &Arc<Self>) -> Result<WatchHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EventError::NoRuntime(e.to_string()))?;
        let observer = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(observer.config.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            info!(period = ?observer.config.period, "Started configuration observer");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Configuration observer shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        observer.check_now();
                    }
                }
            }
        });

        Ok(WatchHandle::new(handle, shutdown_tx))
    }
}

impl std::fmt::Debug for ChangeObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeObserver")
            .field("config", &self.config)
            .field("events", &self.events)
            .finish()
    }
}
