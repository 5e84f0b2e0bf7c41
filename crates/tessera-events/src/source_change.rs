//! Change sets of a single property source

use crate::change::{ChangeSet, ChangeType, delegate_change_set};
use crate::frozen::FrozenPropertySource;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_core::PropertySource;
use time::OffsetDateTime;
use uuid::Uuid;

/// Changes applied to one property source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySourceChange {
    /// Snapshot of the source before the change
    source: FrozenPropertySource,
    change_type: ChangeType,
    changes: ChangeSet,
    version: String,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction_id: Option<String>,
}

delegate_change_set!(PropertySourceChange);

impl PropertySourceChange {
    pub fn builder(source: &dyn PropertySource, change_type: ChangeType) -> PropertySourceChangeBuilder {
        PropertySourceChangeBuilder::of(source, change_type)
    }

    pub fn source(&self) -> &FrozenPropertySource {
        &self.source
    }

    /// Name of the changed source
    pub fn resource_name(&self) -> &str {
        self.source.name()
    }

    pub fn change_type(&self) -> ChangeType {
        self.change_type
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

/// Builder computing a [`PropertySourceChange`]
#[derive(Debug, Clone)]
pub struct PropertySourceChangeBuilder {
    source: FrozenPropertySource,
    change_type: ChangeType,
    changes: ChangeSet,
    /// Whether any diff or explicit entry was recorded
    explicit: bool,
    version: Option<String>,
    timestamp: Option<OffsetDateTime>,
    transaction_id: Option<String>,
}

impl PropertySourceChangeBuilder {
    /// Start from the current state of `source`
    pub fn of(source: &dyn PropertySource, change_type: ChangeType) -> Self {
        Self::from_frozen(FrozenPropertySource::of(source), change_type)
    }

    pub fn from_frozen(source: FrozenPropertySource, change_type: ChangeType) -> Self {
        Self {
            source,
            change_type,
            changes: ChangeSet::new(),
            explicit: false,
            version: None,
            timestamp: None,
            transaction_id: None,
        }
    }

    /// Record the delta between the frozen source and `new_source`
    pub fn compare(self, new_source: &dyn PropertySource) -> Self {
        let new = FrozenPropertySource::of(new_source).as_map();
        let old = self.source.as_map();
        self.compare_maps(&old, &new)
    }

    /// Record the delta between two explicit snapshots
    pub fn compare_maps(mut self, old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> Self {
        self.explicit = true;
        self.changes.extend(ChangeSet::between(old, new));
        self
    }

    pub fn add_change(mut self, key: &str, old_value: Option<String>, new_value: Option<String>) -> Self {
        self.explicit = true;
        self.changes.record(key, old_value, new_value);
        self
    }

    /// Mark keys of the frozen source as removed; unknown keys are ignored
    pub fn remove_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.explicit = true;
        for key in keys {
            let key = key.as_ref();
            if let Some(old) = self.source.get(key) {
                self.changes.record(key, Some(old.into_value()), None);
            }
        }
        self
    }

    /// Record new values for keys, relative to the frozen source
    pub fn put_all<K, V>(mut self, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        self.explicit = true;
        for (key, value) in values {
            let key = key.as_ref();
            let old = self.source.get(key).map(|v| v.into_value());
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

    /// Finish the change set.
    ///
    /// A `New` or `Deleted` change built without any diff or explicit entry
    /// covers every key of the frozen source. A diff that found nothing stays
    /// empty.
    pub fn build(mut self) -> PropertySourceChange {
        if !self.explicit {
            match self.change_type {
                ChangeType::New => {
                    for (key, value) in self.source.as_map() {
                        self.changes.record(&key, None, Some(value));
                    }
                }
                ChangeType::Deleted => {
                    for (key, value) in self.source.as_map() {
                        self.changes.record(&key, Some(value), None);
                    }
                }
                ChangeType::Updated => {}
            }
        }

        PropertySourceChange {
            source: self.source,
            change_type: self.change_type,
            changes: self.changes,
            version: self.version.unwrap_or_else(|| Uuid::new_v4().to_string()),
            timestamp: self.timestamp.unwrap_or_else(OffsetDateTime::now_utc),
            transaction_id: self.transaction_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::sources::MapPropertySource;

    fn source(pairs: &[(&str, &str)]) -> MapPropertySource {
        MapPropertySource::builder("app")
            .properties(pairs.iter().copied())
            .build()
    }

    #[test]
    fn test_compare_sources() {
        let before = source(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let after = source(&[("a", "1"), ("b", "20"), ("d", "4")]);

        let change = PropertySourceChange::builder(&before, ChangeType::Updated)
            .compare(&after)
            .build();

        assert_eq!(change.resource_name(), "app");
        assert_eq!(change.len(), 3);
        assert!(change.is_updated("b"));
        assert!(change.is_removed("c"));
        assert!(change.is_added("d"));
        assert!(!change.is_key_affected("a"));
        assert_eq!(change.source().get("c").unwrap().value(), "3");
    }

    #[test]
    fn test_identical_sources_give_empty_change() {
        let before = source(&[("a", "1")]);
        let change = PropertySourceChange::builder(&before, ChangeType::Updated)
            .compare(&before)
            .build();
        assert!(change.is_empty());
    }

    #[test]
    fn test_new_and_deleted_without_entries_cover_all_keys() {
        let src = source(&[("a", "1"), ("b", "2")]);

        let created = PropertySourceChange::builder(&src, ChangeType::New).build();
        assert_eq!(created.added_size(), 2);

        let deleted = PropertySourceChange::builder(&src, ChangeType::Deleted).build();
        assert_eq!(deleted.removed_size(), 2);
        assert_eq!(deleted.change_type(), ChangeType::Deleted);
    }

    #[test]
    fn test_self_compare_stays_empty_for_any_change_type() {
        let src = source(&[("a", "1"), ("b", "2")]);
        for change_type in [ChangeType::New, ChangeType::Updated, ChangeType::Deleted] {
            let change = PropertySourceChange::builder(&src, change_type)
                .compare(&src)
                .build();
            assert!(change.is_empty(), "{change_type} diff against itself");
        }

        let noop = PropertySourceChange::builder(&src, ChangeType::Deleted)
            .put_all([("a", "1")])
            .build();
        assert!(noop.is_empty());
    }

    #[test]
    fn test_put_all_and_remove_keys() {
        let src = source(&[("a", "1"), ("b", "2")]);
        let change = PropertySourceChange::builder(&src, ChangeType::Updated)
            .put_all([("a", "1"), ("c", "3")])
            .remove_keys(["b", "unknown"])
            .build();

        assert_eq!(change.len(), 2);
        assert!(change.is_added("c"));
        assert!(change.is_removed("b"));
        assert!(!change.is_key_affected("a"));
    }

    #[test]
    fn test_metadata_defaults_and_overrides() {
        let src = source(&[("a", "1")]);
        let first = PropertySourceChange::builder(&src, ChangeType::New).build();
        let second = PropertySourceChange::builder(&src, ChangeType::New).build();
        assert_ne!(first.version(), second.version());
        assert!(first.transaction_id().is_none());

        let ts = OffsetDateTime::UNIX_EPOCH;
        let explicit = PropertySourceChange::builder(&src, ChangeType::New)
            .with_version("v1")
            .with_timestamp(ts)
            .with_transaction_id("tx-1")
            .build();
        assert_eq!(explicit.version(), "v1");
        assert_eq!(explicit.timestamp(), ts);
        assert_eq!(explicit.transaction_id(), Some("tx-1"));
    }

    #[test]
    fn test_serialized_form() {
        let before = source(&[("a", "1")]);
        let after = source(&[("a", "2")]);
        let change = PropertySourceChange::builder(&before, ChangeType::Updated)
            .compare(&after)
            .with_version("v1")
            .build();

        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["change_type"], "updated");
        assert_eq!(json["version"], "v1");
        assert_eq!(json["changes"]["a"]["old_value"], "1");
        assert!(json.get("transaction_id").is_none());
    }
}
