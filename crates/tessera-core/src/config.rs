//! Unified configuration lookup
//!
//! A [`Configuration`] evaluates its context on every call, so sources with
//! interior mutability (files being reloaded, mutable sources) are visible
//! without rebuilding. Freeze a configuration to get a stable snapshot.

use crate::bind::Node;
use crate::context::ConfigurationContext;
use crate::convert::{FromProperty, PropertyConverter};
use crate::filter::apply_filters;
use crate::value::PropertyValue;
use crate::{ConfigError, Result};

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Prefix of keys reserved for metadata; never exported by `properties()`
pub const METADATA_PREFIX: char = '_';

/// Layered view over the sources of a [`ConfigurationContext`]
#[derive(Debug, Clone)]
pub struct Configuration {
    context: Arc<ConfigurationContext>,
}

impl Configuration {
    pub fn new(context: ConfigurationContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    /// Configuration without any source
    pub fn empty() -> Self {
        Self::new(ConfigurationContext::empty())
    }

    pub fn context(&self) -> &ConfigurationContext {
        &self.context
    }

    /// Evaluate a single key through all sources, the policy and the filters
    pub fn get_value(&self, key: &str) -> Option<PropertyValue> {
        let policy = self.context.policy();
        let combined = self
            .context
            .sources()
            .iter()
            .filter_map(|source| source.get(key))
            .fold(None, |current, candidate| policy.combine(current, candidate))?;

        apply_filters(self.context.filters(), combined, true)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_value(key).map(PropertyValue::into_value)
    }

    pub fn get_or(&self, key: &str, default: impl Into<String>) -> String {
        self.get(key).unwrap_or_else(|| default.into())
    }

    /// Value for a key that must be present
    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key).ok_or_else(|| ConfigError::missing(key))
    }

    /// Typed lookup; `Ok(None)` when the key is absent
    pub fn get_as<T: FromProperty>(&self, key: &str) -> Result<Option<T>> {
        self.get_value(key)
            .map(|value| T::from_property(&value))
            .transpose()
    }

    /// Typed lookup falling back to `default` when the key is absent
    pub fn get_or_default_as<T: FromProperty>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get_as(key)?.unwrap_or(default))
    }

    pub fn require_as<T: FromProperty>(&self, key: &str) -> Result<T> {
        self.get_as(key)?.ok_or_else(|| ConfigError::missing(key))
    }

    /// Lookup with an explicit converter
    pub fn get_with<T>(&self, key: &str, converter: &dyn PropertyConverter<T>) -> Result<Option<T>> {
        self.get_value(key)
            .map(|value| converter.convert(&value))
            .transpose()
    }

    /// All properties with their provenance.
    ///
    /// Only scannable sources contribute. Metadata keys (leading `_`) are
    /// excluded.
    pub fn property_values(&self) -> BTreeMap<String, PropertyValue> {
        let policy = self.context.policy();
        let mut merged: BTreeMap<String, PropertyValue> = BTreeMap::new();

        for source in self.context.sources().iter().filter(|s| s.is_scannable()) {
            for (key, candidate) in source.properties() {
                let current = merged.remove(&key);
                if let Some(combined) = policy.combine(current, candidate) {
                    merged.insert(key, combined);
                }
            }
        }

        merged
            .into_iter()
            .filter(|(key, _)| !key.starts_with(METADATA_PREFIX))
            .filter_map(|(key, value)| {
                apply_filters(self.context.filters(), value, false).map(|value| (key, value))
            })
            .collect()
    }

    pub fn properties(&self) -> BTreeMap<String, String> {
        self.property_values()
            .into_iter()
            .map(|(key, value)| (key, value.into_value()))
            .collect()
    }

    /// Apply an operator producing a derived configuration
    pub fn with<F>(&self, operator: F) -> Configuration
    where
        F: FnOnce(&Configuration) -> Configuration,
    {
        operator(self)
    }

    /// Run a query against this configuration
    pub fn query<T, F>(&self, query: F) -> T
    where
        F: FnOnce(&Configuration) -> T,
    {
        query(self)
    }

    /// Bind the keys under `section` into `T`.
    ///
    /// An empty section binds the whole configuration.
    pub fn bind<T: DeserializeOwned>(&self, section: &str) -> Result<T> {
        let section = section.trim_end_matches('.');
        let properties = self.properties().into_iter().filter_map(|(key, value)| {
            if section.is_empty() {
                return Some((key, value));
            }
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|rest| (rest.to_string(), value))
        });

        Node::from_flat(properties)
            .deserialize_into()
            .map_err(|e| ConfigError::binding(section, e.to_string()))
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<ConfigurationContext> for Configuration {
    fn from(context: ConfigurationContext) -> Self {
        Self::new(context)
    }
}
