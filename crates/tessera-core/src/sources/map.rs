//! In-memory property source

use crate::source::{PropertySource, ordinals};
use crate::value::PropertyValue;

use std::collections::BTreeMap;
use tracing::debug;

/// Property source backed by a fixed map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapPropertySource {
    name: String,
    ordinal: i32,
    scannable: bool,
    properties: BTreeMap<String, String>,
}

impl MapPropertySource {
    /// Create a scannable source from a map
    pub fn new(name: impl Into<String>, ordinal: i32, properties: BTreeMap<String, String>) -> Self {
        Self::builder(name)
            .ordinal(ordinal)
            .properties(properties)
            .build()
    }

    pub fn builder(name: impl Into<String>) -> MapPropertySourceBuilder {
        MapPropertySourceBuilder {
            name: name.into(),
            ordinal: ordinals::DEFAULTS,
            scannable: true,
            properties: BTreeMap::new(),
        }
    }

    /// Raw string map of this source
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.properties
            .get(key)
            .map(|value| PropertyValue::new(key, value.clone(), self.name.clone()))
    }

    fn properties(&self) -> BTreeMap<String, PropertyValue> {
        self.properties
            .iter()
            .map(|(key, value)| {
                (
                    key.clone(),
                    PropertyValue::new(key.clone(), value.clone(), self.name.clone()),
                )
            })
            .collect()
    }

    fn is_scannable(&self) -> bool {
        self.scannable
    }
}

/// Builder for [`MapPropertySource`]
#[derive(Debug, Clone)]
pub struct MapPropertySourceBuilder {
    name: String,
    ordinal: i32,
    scannable: bool,
    properties: BTreeMap<String, String>,
}

impl MapPropertySourceBuilder {
    pub fn ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn scannable(mut self, scannable: bool) -> Self {
        self.scannable = scannable;
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn properties<K, V>(mut self, properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.properties
            .extend(properties.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn build(mut self) -> MapPropertySource {
        if self.properties.remove("").is_some() {
            debug!("Dropping empty key from source {}", self.name);
        }
        MapPropertySource {
            name: self.name,
            ordinal: self.ordinal,
            scannable: self.scannable,
            properties: self.properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_reports_source_name() {
        let source = MapPropertySource::builder("defaults")
            .property("server.port", "8080")
            .build();

        let value = source.get("server.port").unwrap();
        assert_eq!(value.value(), "8080");
        assert_eq!(value.source(), "defaults");
        assert!(source.get("server.host").is_none());
    }

    #[test]
    fn test_empty_key_is_dropped() {
        let source = MapPropertySource::builder("defaults")
            .property("", "x")
            .property("a", "1")
            .build();
        assert_eq!(source.as_map().len(), 1);
    }
}
