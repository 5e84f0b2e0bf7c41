//! Property values and their provenance

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single configuration value together with where it came from.
///
/// Values are always kept as strings; typed access goes through
/// [`crate::convert`]. Metadata keys are free-form, but the library itself
/// only writes keys starting with `_`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    key: String,
    value: String,
    source: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
}

impl PropertyValue {
    /// Create a new value provided by `source`
    pub fn new(key: impl Into<String>, value: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            source: source.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Same key, source and metadata with a different value
    pub fn with_value(&self, value: impl Into<String>) -> Self {
        Self {
            key: self.key.clone(),
            value: value.into(),
            source: self.source.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Same value, source and metadata under a different key
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: self.value.clone(),
            source: self.source.clone(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn metadata_entry(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Consume the value, returning the raw string
    pub fn into_value(self) -> String {
        self.value
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={} ({})", self.key, self.value, self.source)
    }
}
