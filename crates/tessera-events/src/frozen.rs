//! Frozen, immutable snapshots of sources and configurations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_core::source::ordinals;
use tessera_core::{Configuration, ConfigurationContext, MapPropertySource, PropertySource, PropertyValue};
use time::OffsetDateTime;
use uuid::Uuid;

/// Point-in-time copy of a property source.
///
/// Equality covers name, ordinal and properties; the freeze timestamp is
/// ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrozenPropertySource {
    name: String,
    ordinal: i32,
    scannable: bool,
    properties: BTreeMap<String, PropertyValue>,
    #[serde(with = "time::serde::rfc3339")]
    frozen_at: OffsetDateTime,
}

impl FrozenPropertySource {
    /// Freeze the current state of a source
    pub fn of(source: &dyn PropertySource) -> Self {
        Self {
            name: source.name().to_string(),
            ordinal: source.ordinal(),
            scannable: source.is_scannable(),
            properties: source.properties(),
            frozen_at: OffsetDateTime::now_utc(),
        }
    }

    /// Freeze from raw parts
    pub fn from_map(name: impl Into<String>, ordinal: i32, properties: &BTreeMap<String, String>) -> Self {
        let name = name.into();
        let properties = properties
            .iter()
            .map(|(k, v)| (k.clone(), PropertyValue::new(k.clone(), v.clone(), name.clone())))
            .collect();
        Self {
            name,
            ordinal,
            scannable: true,
            properties,
            frozen_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn frozen_at(&self) -> OffsetDateTime {
        self.frozen_at
    }

    /// Plain key/value view
    pub fn as_map(&self) -> BTreeMap<String, String> {
        self.properties
            .iter()
            .map(|(k, v)| (k.clone(), v.value().to_string()))
            .collect()
    }
}

impl PartialEq for FrozenPropertySource {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.ordinal == other.ordinal && self.properties == other.properties
    }
}

impl Eq for FrozenPropertySource {}

impl PropertySource for FrozenPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_ordinal(&self) -> i32 {
        self.ordinal
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.properties.get(key).cloned()
    }

    fn properties(&self) -> BTreeMap<String, PropertyValue> {
        self.properties.clone()
    }

    fn is_scannable(&self) -> bool {
        self.scannable
    }
}

/// Point-in-time copy of a configuration's properties.
///
/// Each snapshot gets its own id; equality compares properties only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrozenConfiguration {
    id: Uuid,
    properties: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    frozen_at: OffsetDateTime,
}

impl FrozenConfiguration {
    pub fn of(config: &Configuration) -> Self {
        Self::from_map(config.properties())
    }

    pub fn from_map(properties: BTreeMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            properties,
            frozen_at: OffsetDateTime::now_utc(),
        }
    }

    /// Snapshot without any property
    pub fn empty() -> Self {
        Self::from_map(BTreeMap::new())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn frozen_at(&self) -> OffsetDateTime {
        self.frozen_at
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Queryable configuration backed by this snapshot
    pub fn to_configuration(&self) -> Configuration {
        Configuration::new(
            ConfigurationContext::builder()
                .add_source(MapPropertySource::new(
                    format!("frozen:{}", self.id),
                    ordinals::DEFAULTS,
                    self.properties.clone(),
                ))
                .build(),
        )
    }
}

impl PartialEq for FrozenConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.properties == other.properties
    }
}

impl Eq for FrozenConfiguration {}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::sources::MapPropertySource;

    fn source() -> MapPropertySource {
        MapPropertySource::builder("app")
            .ordinal(42)
            .property("a", "1")
            .property("b", "2")
            .build()
    }

    #[test]
    fn test_freeze_copies_source() {
        let frozen = FrozenPropertySource::of(&source());
        assert_eq!(frozen.name(), "app");
        assert_eq!(frozen.ordinal(), 42);
        assert_eq!(frozen.get("a").unwrap().value(), "1");
        assert_eq!(frozen.as_map().len(), 2);
    }

    #[test]
    fn test_freezing_frozen_is_equal() {
        let frozen = FrozenPropertySource::of(&source());
        let again = FrozenPropertySource::of(&frozen);
        assert_eq!(frozen, again);
    }

    #[test]
    fn test_frozen_source_does_not_see_later_changes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("app.toml");
        std::fs::write(&path, "port = 1").unwrap();

        let file = tessera_core::FilePropertySource::new(&path).unwrap();
        let frozen = FrozenPropertySource::of(&file);

        std::fs::write(&path, "port = 2").unwrap();
        file.reload().unwrap();

        assert_eq!(file.get("port").unwrap().value(), "2");
        assert_eq!(frozen.get("port").unwrap().value(), "1");
    }

    #[test]
    fn test_frozen_configuration_identity_and_equality() {
        let config = Configuration::new(ConfigurationContext::builder().add_source(source()).build());

        let first = FrozenConfiguration::of(&config);
        let second = FrozenConfiguration::of(&config);

        assert_ne!(first.id(), second.id());
        assert_eq!(first, second);
        assert_eq!(first.get("b"), Some("2"));
        assert_eq!(first.to_configuration().get("a").as_deref(), Some("1"));
    }

    #[test]
    fn test_serialize_frozen_source() {
        let frozen = FrozenPropertySource::of(&source());
        let json = serde_json::to_string(&frozen).unwrap();
        let back: FrozenPropertySource = serde_json::from_str(&json).unwrap();
        assert_eq!(frozen, back);
    }
}
