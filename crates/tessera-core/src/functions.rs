//! Key re-mapping and composition of configurations
//!
//! Operators are meant for [`Configuration::with`]:
//!
//! ```
//! use tessera_core::{Configuration, ConfigurationContext, MapPropertySource};
//! use tessera_core::functions::section;
//!
//! let config = Configuration::new(
//!     ConfigurationContext::builder()
//!         .add_source(MapPropertySource::builder("defaults").property("server.port", "8080").build())
//!         .build(),
//! );
//! let server = config.with(section("server", true));
//! assert_eq!(server.get("port").as_deref(), Some("8080"));
//! ```
//!
//! Derived configurations are snapshots of the scannable properties of the
//! input at the time the operator runs.

use crate::config::Configuration;
use crate::context::ConfigurationContext;
use crate::source::ordinals;
use crate::sources::MapPropertySource;

use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Keys under `prefix.`; with `strip` the prefix is removed
pub fn section(prefix: &str, strip: bool) -> impl FnOnce(&Configuration) -> Configuration + use<> {
    let prefix = prefix.trim_end_matches('.').to_string();
    move |config| {
        let name = format!("section:{prefix}");
        let dotted = format!("{prefix}.");
        let mapped = config
            .properties()
            .into_iter()
            .filter_map(|(key, value)| {
                let rest = key.strip_prefix(&dotted)?;
                let key = if strip { rest.to_string() } else { key.clone() };
                Some((key, value))
            })
            .collect();
        from_map(name, mapped)
    }
}

/// Rename keys; a mapper returning `None` drops the key.
///
/// When two keys map to the same name, the one sorting later wins.
pub fn map_keys<F>(mapper: F) -> impl FnOnce(&Configuration) -> Configuration
where
    F: Fn(&str) -> Option<String>,
{
    move |config| {
        let mut mapped = BTreeMap::new();
        for (key, value) in config.properties() {
            let Some(new_key) = mapper(&key) else { continue };
            if mapped.insert(new_key.clone(), value).is_some() {
                warn!("Key mapping collision on {new_key}, keeping value of {key}");
            }
        }
        from_map("mapped".to_string(), mapped)
    }
}

/// Keep only keys matching the predicate
pub fn filter_keys<F>(predicate: F) -> impl FnOnce(&Configuration) -> Configuration
where
    F: Fn(&str) -> bool,
{
    move |config| {
        let kept = config
            .properties()
            .into_iter()
            .filter(|(key, _)| predicate(key))
            .collect();
        from_map("filtered".to_string(), kept)
    }
}

/// Prepend `prefix.` to every key
pub fn add_prefix(prefix: &str) -> impl FnOnce(&Configuration) -> Configuration + use<> {
    let prefix = prefix.trim_end_matches('.').to_string();
    move |config| {
        if prefix.is_empty() {
            return from_map("prefixed".to_string(), config.properties());
        }
        let prefixed = config
            .properties()
            .into_iter()
            .map(|(key, value)| (format!("{prefix}.{key}"), value))
            .collect();
        from_map(format!("prefixed:{prefix}"), prefixed)
    }
}

/// Immediate parent sections of all keys (`a.b.c` → `a.b`)
pub fn sections(config: &Configuration) -> BTreeSet<String> {
    config
        .properties()
        .keys()
        .filter_map(|key| key.rsplit_once('.').map(|(parent, _)| parent.to_string()))
        .collect()
}

/// Every dotted ancestor of all keys (`a.b.c` → `a`, `a.b`)
pub fn transitive_sections(config: &Configuration) -> BTreeSet<String> {
    let mut result = BTreeSet::new();
    for key in config.properties().keys() {
        let mut end = 0;
        while let Some(pos) = key[end..].find('.') {
            end += pos;
            result.insert(key[..end].to_string());
            end += 1;
        }
    }
    result
}

/// Union of several configurations; later ones override earlier ones
pub fn combine<'a>(name: &str, configs: impl IntoIterator<Item = &'a Configuration>) -> Configuration {
    let merged = configs
        .into_iter()
        .fold(BTreeMap::new(), |mut merged, config| {
            merged.extend(config.properties());
            merged
        });
    from_map(name.to_string(), merged)
}

/// Materialize a configuration as a property source so it can be layered again
pub fn source_from(config: &Configuration, name: &str, ordinal: i32) -> MapPropertySource {
    MapPropertySource::new(name, ordinal, config.properties())
}

fn from_map(name: String, properties: BTreeMap<String, String>) -> Configuration {
    Configuration::new(
        ConfigurationContext::builder()
            .add_source(MapPropertySource::new(name, ordinals::DEFAULTS, properties))
            .build(),
    )
}
