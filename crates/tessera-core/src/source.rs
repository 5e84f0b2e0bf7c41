//! Property sources and ordinal resolution
//!
//! Sources are evaluated from the lowest ordinal to the highest, so a source
//! with a higher ordinal overrides values provided by lower ones.

use crate::value::PropertyValue;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Key a source may define to override its own ordinal
pub const ORDINAL_KEY: &str = "tessera.ordinal";

/// Well-known default ordinals
pub mod ordinals {
    /// Hardcoded defaults
    pub const DEFAULTS: i32 = 0;
    /// Configuration files
    pub const FILE: i32 = 100;
    /// Environment variables
    pub const ENVIRONMENT: i32 = 300;
    /// Runtime overrides
    pub const RUNTIME: i32 = 400;
    /// Mutable, transactional sources
    pub const MUTABLE: i32 = 500;
}

/// Trait for configuration property sources
pub trait PropertySource: Send + Sync {
    /// Name of this source (for provenance and logging)
    fn name(&self) -> &str;

    /// Ordinal used when the source does not define `tessera.ordinal`
    fn default_ordinal(&self) -> i32 {
        ordinals::DEFAULTS
    }

    /// Effective ordinal (higher wins in merges)
    fn ordinal(&self) -> i32 {
        resolve_ordinal(self.name(), self.get(ORDINAL_KEY), self.default_ordinal())
    }

    /// Look up a single key
    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.properties().remove(key)
    }

    /// All properties known to this source
    fn properties(&self) -> BTreeMap<String, PropertyValue>;

    /// Whether `properties()` returns the complete key set.
    ///
    /// Non-scannable sources answer `get` but are skipped when the full
    /// property map of a configuration is evaluated.
    fn is_scannable(&self) -> bool {
        true
    }
}

/// Resolve the ordinal of a source from its `tessera.ordinal` entry
pub fn resolve_ordinal(source_name: &str, configured: Option<PropertyValue>, default: i32) -> i32 {
    match configured {
        Some(value) => match value.value().trim().parse::<i32>() {
            Ok(ordinal) => ordinal,
            Err(_) => {
                warn!(
                    source = source_name,
                    value = value.value(),
                    "Ignoring unparseable {ORDINAL_KEY}, using default {default}"
                );
                default
            }
        },
        None => default,
    }
}

/// Ordering of property sources by ordinal.
///
/// Ascending by ordinal; sources with equal ordinals keep their registration
/// order, so the later registration wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceOrdering;

impl SourceOrdering {
    pub fn compare(a: &dyn PropertySource, b: &dyn PropertySource) -> Ordering {
        a.ordinal().cmp(&b.ordinal())
    }

    /// Stable sort of sources into evaluation order
    pub fn sort(sources: &mut [Arc<dyn PropertySource>]) {
        sources.sort_by_cached_key(|source| source.ordinal());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MapPropertySource;

    #[test]
    fn test_ordinal_from_property() {
        let source = MapPropertySource::builder("custom")
            .ordinal(10)
            .property(ORDINAL_KEY, "250")
            .build();
        assert_eq!(source.ordinal(), 250);
    }

    #[test]
    fn test_unparseable_ordinal_falls_back() {
        let source = MapPropertySource::builder("custom")
            .ordinal(10)
            .property(ORDINAL_KEY, "high")
            .build();
        assert_eq!(source.ordinal(), 10);
    }

    #[test]
    fn test_sort_is_stable_for_equal_ordinals() {
        let mut sources: Vec<Arc<dyn PropertySource>> = vec![
            Arc::new(MapPropertySource::builder("b").ordinal(100).build()),
            Arc::new(MapPropertySource::builder("a").ordinal(0).build()),
            Arc::new(MapPropertySource::builder("c").ordinal(100).build()),
        ];
        SourceOrdering::sort(&mut sources);

        let names: Vec<_> = sources.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
