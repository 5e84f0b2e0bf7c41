//! Change detection and change events for Tessera configuration
//!
//! This crate provides:
//! - Frozen, immutable snapshots of property sources and configurations
//! - Change sets (deltas) between two snapshots, classified as new, updated
//!   or deleted, with version, timestamp and transaction id
//! - A listener manager holding listeners by weak reference, plus a
//!   broadcast channel for async subscribers
//! - Transactional mutable property sources
//! - A periodic change observer and a file watcher
//! - A configuration manager tying reloads, diffs and events together
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                  ConfigurationManager                       │
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────┐     │
//! │  │ FileWatcher │  │ ChangeObserver│  │ MutableSource  │     │
//! │  └──────┬──────┘  └──────┬───────┘  └───────┬─────────┘     │
//! │         └────────────────┴──────────────────┘               │
//! │                          │                                  │
//! │            FrozenConfiguration (before / after)             │
//! │                          │                                  │
//! │                  ConfigurationChange                        │
//! │                          │                                  │
//! │                  ConfigEventManager                         │
//! └──────────────────────────┬─────────────────────────────────┘
//!                            │
//!         ┌──────────────────┼──────────────────┐
//!         ▼                  ▼                  ▼
//!     listeners          listeners         subscribers
//! ```

pub mod change;
pub mod config_change;
pub mod frozen;
pub mod listener;
pub mod manager;
pub mod mutable;
pub mod observer;
pub mod source_change;
pub mod watch;

// Re-export main types
pub use change::{ChangeSet, ChangeType, PropertyChange};
pub use config_change::{ConfigurationChange, ConfigurationChangeBuilder};
pub use frozen::{FrozenConfiguration, FrozenPropertySource};
pub use listener::{ConfigEvent, ConfigEventKind, ConfigEventListener, ConfigEventManager};
pub use manager::{ConfigurationManager, ConfigurationManagerBuilder};
pub use mutable::{MutablePropertySource, TransactionId};
pub use observer::{ChangeObserver, ObserverConfig};
pub use source_change::{PropertySourceChange, PropertySourceChangeBuilder};
pub use watch::{FileWatcher, FileWatcherConfig, SourceSignal, WatchHandle, WatchableSource};

use tessera_core::ConfigError;

/// Error types for change detection and event operations
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown or finished transaction: {0}")]
    UnknownTransaction(String),

    #[error("No mutable property source configured")]
    NoMutableSource,

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("No async runtime: {0}")]
    NoRuntime(String),
}

impl EventError {
    pub fn unknown_transaction(id: impl std::fmt::Display) -> Self {
        Self::UnknownTransaction(id.to_string())
    }

    pub fn watcher(msg: impl Into<String>) -> Self {
        Self::Watcher(msg.into())
    }
}

/// Result type for event operations
pub type Result<T> = std::result::Result<T, EventError>;
