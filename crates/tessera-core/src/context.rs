//! Configuration context: ordered sources, filters and the combination policy

use crate::combine::{CombinationPolicy, OverridePolicy};
use crate::filter::PropertyFilter;
use crate::source::{PropertySource, SourceOrdering};

use std::sync::Arc;
use tracing::debug;

/// Immutable set of everything a [`crate::Configuration`] evaluates
#[derive(Clone)]
pub struct ConfigurationContext {
    /// Sources in evaluation order (ascending ordinal)
    sources: Vec<Arc<dyn PropertySource>>,
    filters: Vec<Arc<dyn PropertyFilter>>,
    policy: Arc<dyn CombinationPolicy>,
}

impl ConfigurationContext {
    pub fn builder() -> ConfigurationContextBuilder {
        ConfigurationContextBuilder::new()
    }

    /// Context without sources or filters
    pub fn empty() -> Self {
        Self::builder().build()
    }

    /// Sources in evaluation order, lowest ordinal first
    pub fn sources(&self) -> &[Arc<dyn PropertySource>] {
        &self.sources
    }

    pub fn source(&self, name: &str) -> Option<&Arc<dyn PropertySource>> {
        self.sources.iter().find(|s| s.name() == name)
    }

    pub fn filters(&self) -> &[Arc<dyn PropertyFilter>] {
        &self.filters
    }

    pub fn policy(&self) -> &dyn CombinationPolicy {
        self.policy.as_ref()
    }

    /// Builder pre-populated with this context
    pub fn to_builder(&self) -> ConfigurationContextBuilder {
        ConfigurationContextBuilder {
            sources: self.sources.clone(),
            filters: self.filters.clone(),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl Default for ConfigurationContext {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for ConfigurationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationContext")
            .field(
                "sources",
                &self
                    .sources
                    .iter()
                    .map(|s| (s.name().to_string(), s.ordinal()))
                    .collect::<Vec<_>>(),
            )
            .field("filters", &self.filters.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Builder for [`ConfigurationContext`]
pub struct ConfigurationContextBuilder {
    sources: Vec<Arc<dyn PropertySource>>,
    filters: Vec<Arc<dyn PropertyFilter>>,
    policy: Arc<dyn CombinationPolicy>,
}

impl ConfigurationContextBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            filters: Vec::new(),
            policy: Arc::new(OverridePolicy),
        }
    }

    /// Add a source; a source with the same name is replaced
    pub fn add_source(self, source: impl PropertySource + 'static) -> Self {
        self.add_shared_source(Arc::new(source))
    }

    pub fn add_shared_source(mut self, source: Arc<dyn PropertySource>) -> Self {
        if let Some(pos) = self.sources.iter().position(|s| s.name() == source.name()) {
            debug!("Replacing property source {}", source.name());
            self.sources.remove(pos);
        }
        self.sources.push(source);
        self
    }

    pub fn add_sources(self, sources: impl IntoIterator<Item = Arc<dyn PropertySource>>) -> Self {
        sources
            .into_iter()
            .fold(self, |builder, source| builder.add_shared_source(source))
    }

    pub fn remove_source(mut self, name: &str) -> Self {
        self.sources.retain(|s| s.name() != name);
        self
    }

    pub fn add_filter(self, filter: impl PropertyFilter + 'static) -> Self {
        self.add_shared_filter(Arc::new(filter))
    }

    pub fn add_shared_filter(mut self, filter: Arc<dyn PropertyFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn clear_filters(mut self) -> Self {
        self.filters.clear();
        self
    }

    pub fn with_policy(mut self, policy: impl CombinationPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn build(mut self) -> ConfigurationContext {
        SourceOrdering::sort(&mut self.sources);
        ConfigurationContext {
            sources: self.sources,
            filters: self.filters,
            policy: self.policy,
        }
    }
}

impl Default for ConfigurationContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MapPropertySource;

    #[test]
    fn test_sources_sorted_on_build() {
        let context = ConfigurationContext::builder()
            .add_source(MapPropertySource::builder("env").ordinal(300).build())
            .add_source(MapPropertySource::builder("defaults").ordinal(0).build())
            .add_source(MapPropertySource::builder("file").ordinal(100).build())
            .build();

        let names: Vec<_> = context.sources().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["defaults", "file", "env"]);
    }

    #[test]
    fn test_same_name_replaces() {
        let context = ConfigurationContext::builder()
            .add_source(MapPropertySource::builder("defaults").property("a", "1").build())
            .add_source(MapPropertySource::builder("defaults").property("a", "2").build())
            .build();

        assert_eq!(context.sources().len(), 1);
        let value = context.source("defaults").unwrap().get("a").unwrap();
        assert_eq!(value.value(), "2");
    }

    #[test]
    fn test_to_builder_round_trip() {
        let context = ConfigurationContext::builder()
            .add_source(MapPropertySource::builder("a").build())
            .add_source(MapPropertySource::builder("b").build())
            .build();

        let trimmed = context.to_builder().remove_source("a").build();
        assert_eq!(trimmed.sources().len(), 1);
        assert_eq!(context.sources().len(), 2);
    }
}
