//! Change sets of a whole configuration

use crate::change::{ChangeSet, delegate_change_set};
use crate::frozen::FrozenConfiguration;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_core::Configuration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Changes between two states of a configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationChange {
    /// Snapshot of the configuration before the change
    configuration: FrozenConfiguration,
    changes: ChangeSet,
    version: String,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction_id: Option<String>,
}

delegate_change_set!(ConfigurationChange);

impl ConfigurationChange {
    pub fn builder(config: &Configuration) -> ConfigurationChangeBuilder {
        ConfigurationChangeBuilder::of(config)
    }

    /// Change without any entry
    pub fn empty(config: &Configuration) -> Self {
        ConfigurationChangeBuilder::of(config).build()
    }

    pub fn configuration(&self) -> &FrozenConfiguration {
        &self.configuration
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }
}

/// Builder computing a [`ConfigurationChange`]
#[derive(Debug, Clone)]
pub struct ConfigurationChangeBuilder {
    configuration: FrozenConfiguration,
    changes: ChangeSet,
    version: Option<String>,
    timestamp: Option<OffsetDateTime>,
    transaction_id: Option<String>,
}

impl ConfigurationChangeBuilder {
    /// Start from the current state of `config`
    pub fn of(config: &Configuration) -> Self {
        Self::from_frozen(FrozenConfiguration::of(config))
    }

    pub fn from_frozen(configuration: FrozenConfiguration) -> Self {
        Self {
            configuration,
            changes: ChangeSet::new(),
            version: None,
            timestamp: None,
            transaction_id: None,
        }
    }

    /// Record the delta between the frozen state and `new_config`
    pub fn compare(self, new_config: &Configuration) -> Self {
        let new = new_config.properties();
        self.compare_with(&new)
    }

    /// Record the delta between the frozen state and another snapshot
    pub fn compare_frozen(self, new: &FrozenConfiguration) -> Self {
        self.compare_with(new.properties())
    }

    fn compare_with(mut self, new: &BTreeMap<String, String>) -> Self {
        self.changes
            .extend(ChangeSet::between(self.configuration.properties(), new));
        self
    }

    /// Record the delta between two explicit snapshots
    pub fn compare_maps(mut self, old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> Self {
        self.changes.extend(ChangeSet::between(old, new));
        self
    }

    pub fn add_change(mut self, key: &str, old_value: Option<String>, new_value: Option<String>) -> Self {
        self.changes.record(key, old_value, new_value);
        self
    }

    /// Mark keys as removed; keys unknown to the frozen state are ignored
    pub fn remove_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for key in keys {
            let key = key.as_ref();
            if let Some(old) = self.configuration.get(key) {
                let old = old.to_string();
                self.changes.record(key, Some(old), None);
            }
        }
        self
    }

    pub fn put_all<K, V>(mut self, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in values {
            let key = key.as_ref();
            let old = self.configuration.get(key).map(str::to_string);
            self.changes.record(key, old, Some(value.into()));
        }
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn build(self) -> ConfigurationChange {
        ConfigurationChange {
            configuration: self.configuration,
            changes: self.changes,
            version: self.version.unwrap_or_else(|| Uuid::new_v4().to_string()),
            timestamp: self.timestamp.unwrap_or_else(OffsetDateTime::now_utc),
            transaction_id: self.transaction_id,
        }
    }
}
