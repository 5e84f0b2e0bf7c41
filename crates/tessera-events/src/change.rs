//! Change classification and change sets

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Key or source did not exist before
    New,
    /// Key or source existed and changed
    Updated,
    /// Key or source no longer exists
    Deleted,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Updated => write!(f, "updated"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Change of a single key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
}

impl PropertyChange {
    /// Build a change; `None` when nothing changed
    pub fn between(key: impl Into<String>, old_value: Option<String>, new_value: Option<String>) -> Option<Self> {
        if old_value == new_value {
            return None;
        }
        Some(Self {
            key: key.into(),
            old_value,
            new_value,
        })
    }

    pub fn change_type(&self) -> ChangeType {
        match (&self.old_value, &self.new_value) {
            (None, _) => ChangeType::New,
            (_, None) => ChangeType::Deleted,
            _ => ChangeType::Updated,
        }
    }
}

/// Ordered set of key changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet {
    changes: BTreeMap<String, PropertyChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta between two key/value snapshots.
    ///
    /// Keys only in `new` are new, keys in both with different values are
    /// updated, keys only in `old` are deleted. Equal snapshots give an
    /// empty set.
    pub fn between(old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> Self {
        let mut set = Self::new();
        for (key, new_value) in new {
            set.record(key, old.get(key).cloned(), Some(new_value.clone()));
        }
        for (key, old_value) in old {
            if !new.contains_key(key) {
                set.record(key, Some(old_value.clone()), None);
            }
        }
        set
    }

    /// Record a change for a key, replacing an earlier one.
    ///
    /// Recording `old == new` removes any earlier change for the key.
    pub fn record(&mut self, key: &str, old_value: Option<String>, new_value: Option<String>) {
        match PropertyChange::between(key, old_value, new_value) {
            Some(change) => {
                self.changes.insert(key.to_string(), change);
            }
            None => {
                self.changes.remove(key);
            }
        }
    }

    /// Merge another set; entries of `other` win on the same key
    pub fn extend(&mut self, other: ChangeSet) {
        self.changes.extend(other.changes);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, key: &str) -> Option<&PropertyChange> {
        self.changes.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyChange> {
        self.changes.values()
    }

    fn of_type(&self, change_type: ChangeType) -> impl Iterator<Item = &PropertyChange> {
        self.iter().filter(move |c| c.change_type() == change_type)
    }

    pub fn added(&self) -> Vec<&PropertyChange> {
        self.of_type(ChangeType::New).collect()
    }

    pub fn updated(&self) -> Vec<&PropertyChange> {
        self.of_type(ChangeType::Updated).collect()
    }

    pub fn removed(&self) -> Vec<&PropertyChange> {
        self.of_type(ChangeType::Deleted).collect()
    }

    pub fn added_size(&self) -> usize {
        self.of_type(ChangeType::New).count()
    }

    pub fn updated_size(&self) -> usize {
        self.of_type(ChangeType::Updated).count()
    }

    pub fn removed_size(&self) -> usize {
        self.of_type(ChangeType::Deleted).count()
    }

    pub fn is_key_affected(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }

    pub fn is_added(&self, key: &str) -> bool {
        self.is_of_type(key, ChangeType::New)
    }

    pub fn is_updated(&self, key: &str) -> bool {
        self.is_of_type(key, ChangeType::Updated)
    }

    pub fn is_removed(&self, key: &str) -> bool {
        self.is_of_type(key, ChangeType::Deleted)
    }

    fn is_of_type(&self, key: &str, change_type: ChangeType) -> bool {
        self.get(key).is_some_and(|c| c.change_type() == change_type)
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a PropertyChange;
    type IntoIter = std::collections::btree_map::Values<'a, String, PropertyChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.values()
    }
}

/// Delegates the change-set queries of a type holding a `changes: ChangeSet`
macro_rules! delegate_change_set {
    ($ty:ty) => {
        impl $ty {
            pub fn changes(&self) -> &$crate::change::ChangeSet {
                &self.changes
            }

            pub fn is_empty(&self) -> bool {
                self.changes.is_empty()
            }

            pub fn len(&self) -> usize {
                self.changes.len()
            }

            pub fn added_size(&self) -> usize {
                self.changes.added_size()
            }

            pub fn updated_size(&self) -> usize {
                self.changes.updated_size()
            }

            pub fn removed_size(&self) -> usize {
                self.changes.removed_size()
            }

            pub fn is_key_affected(&self, key: &str) -> bool {
                self.changes.is_key_affected(key)
            }

            pub fn is_added(&self, key: &str) -> bool {
                self.changes.is_added(key)
            }

            pub fn is_updated(&self, key: &str) -> bool {
                self.changes.is_updated(key)
            }

            pub fn is_removed(&self, key: &str) -> bool {
                self.changes.is_removed(key)
            }

            pub fn added(&self) -> Vec<&$crate::change::PropertyChange> {
                self.changes.added()
            }

            pub fn updated(&self) -> Vec<&$crate::change::PropertyChange> {
                self.changes.updated()
            }

            pub fn removed(&self) -> Vec<&$crate::change::PropertyChange> {
                self.changes.removed()
            }
        }
    };
}

pub(crate) use delegate_change_set;

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_change_type_display() {
        assert_eq!(ChangeType::New.to_string(), "new");
        assert_eq!(ChangeType::Updated.to_string(), "updated");
        assert_eq!(ChangeType::Deleted.to_string(), "deleted");
    }

    #[test]
    fn test_delta_classification() {
        let old = map(&[("kept", "1"), ("changed", "a"), ("gone", "x")]);
        let new = map(&[("kept", "1"), ("changed", "b"), ("fresh", "y")]);

        let set = ChangeSet::between(&old, &new);
        assert_eq!(set.len(), 3);
        assert!(set.is_added("fresh"));
        assert!(set.is_updated("changed"));
        assert!(set.is_removed("gone"));
        assert!(!set.is_key_affected("kept"));
        assert_eq!(set.added_size(), 1);
        assert_eq!(set.updated_size(), 1);
        assert_eq!(set.removed_size(), 1);

        let updated = set.get("changed").unwrap();
        assert_eq!(updated.old_value.as_deref(), Some("a"));
        assert_eq!(updated.new_value.as_deref(), Some("b"));
    }

    #[test]
    fn test_equal_snapshots_give_empty_set() {
        let snapshot = map(&[("a", "1"), ("b", "2")]);
        assert!(ChangeSet::between(&snapshot, &snapshot.clone()).is_empty());
        assert!(ChangeSet::between(&BTreeMap::new(), &BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_record_noop_clears_earlier_change() {
        let mut set = ChangeSet::new();
        set.record("k", None, Some("v".into()));
        assert!(set.is_added("k"));

        set.record("k", Some("v".into()), Some("v".into()));
        assert!(set.is_empty());
    }

    #[test]
    fn test_serializes_as_map() {
        let set = ChangeSet::between(&map(&[]), &map(&[("a", "1")]));
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["a"]["new_value"], "1");
        assert!(json["a"].get("old_value").is_none());
    }
}
