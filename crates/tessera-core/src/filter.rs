//! Property filters
//!
//! Filters run after values were combined across sources. A filter may
//! rewrite a value or hide the key entirely by returning `None`. Filters are
//! applied in registration order and each one sees the output of the
//! previous one.

use crate::value::PropertyValue;

use parking_lot::RwLock;
use regex::Regex;
use std::sync::Arc;

/// Context passed to filters
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// Key being evaluated
    pub key: &'a str,
    /// `true` for a single `get`, `false` while evaluating the full property map
    pub single_lookup: bool,
}

impl<'a> FilterContext<'a> {
    pub fn single(key: &'a str) -> Self {
        Self {
            key,
            single_lookup: true,
        }
    }

    pub fn full(key: &'a str) -> Self {
        Self {
            key,
            single_lookup: false,
        }
    }
}

/// Trait for property filters
pub trait PropertyFilter: Send + Sync {
    fn filter(&self, value: PropertyValue, ctx: &FilterContext<'_>) -> Option<PropertyValue>;
}

/// Run a value through a filter chain
pub fn apply_filters(
    filters: &[Arc<dyn PropertyFilter>],
    value: PropertyValue,
    single_lookup: bool,
) -> Option<PropertyValue> {
    filters.iter().try_fold(value, |value, filter| {
        let key = value.key().to_string();
        let ctx = FilterContext {
            key: &key,
            single_lookup,
        };
        filter.filter(value, &ctx)
    })
}

/// Include/exclude filter on key patterns.
///
/// A key passes when it matches any include pattern (or no includes are
/// configured) and matches none of the exclude patterns.
#[derive(Debug, Clone, Default)]
pub struct RegexPropertyFilter {
    includes: Vec<Regex>,
    excludes: Vec<Regex>,
}

impl RegexPropertyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.includes.push(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn exclude(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.excludes.push(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn accepts(&self, key: &str) -> bool {
        let included = self.includes.is_empty() || self.includes.iter().any(|r| r.is_match(key));
        included && !self.excludes.iter().any(|r| r.is_match(key))
    }
}

impl PropertyFilter for RegexPropertyFilter {
    fn filter(&self, value: PropertyValue, ctx: &FilterContext<'_>) -> Option<PropertyValue> {
        self.accepts(ctx.key).then_some(value)
    }
}

/// Filter built from a key predicate
pub struct KeyPredicateFilter<F> {
    predicate: F,
}

impl<F> KeyPredicateFilter<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> PropertyFilter for KeyPredicateFilter<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn filter(&self, value: PropertyValue, ctx: &FilterContext<'_>) -> Option<PropertyValue> {
        (self.predicate)(ctx.key).then_some(value)
    }
}

impl<F> std::fmt::Debug for KeyPredicateFilter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPredicateFilter").finish_non_exhaustive()
    }
}

/// Filter chain that can be changed after the configuration was built.
///
/// Clones share the same chain, so a handle kept by the application sees
/// and changes what the configuration applies.
#[derive(Clone, Default)]
pub struct ProgrammableFilter {
    filters: Arc<RwLock<Vec<Arc<dyn PropertyFilter>>>>,
}

impl ProgrammableFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, filter: Arc<dyn PropertyFilter>) {
        self.filters.write().push(filter);
    }

    /// Remove every registration of the given filter
    pub fn remove_all(&self, filter: &Arc<dyn PropertyFilter>) -> usize {
        let mut filters = self.filters.write();
        let before = filters.len();
        filters.retain(|f| !Arc::ptr_eq(f, filter));
        before - filters.len()
    }

    pub fn clear(&self) {
        self.filters.write().clear();
    }

    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }
}

impl PropertyFilter for ProgrammableFilter {
    fn filter(&self, value: PropertyValue, ctx: &FilterContext<'_>) -> Option<PropertyValue> {
        let filters = self.filters.read().clone();
        apply_filters(&filters, value, ctx.single_lookup)
    }
}

impl std::fmt::Debug for ProgrammableFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgrammableFilter")
            .field("filters", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uppercase;

    impl PropertyFilter for Uppercase {
        fn filter(&self, value: PropertyValue, _ctx: &FilterContext<'_>) -> Option<PropertyValue> {
            let upper = value.value().to_uppercase();
            Some(value.with_value(upper))
        }
    }

    #[test]
    fn test_regex_include_exclude() {
        let filter = RegexPropertyFilter::new()
            .include(r"^server\.")
            .unwrap()
            .exclude(r"\.password$")
            .unwrap();

        assert!(filter.accepts("server.port"));
        assert!(!filter.accepts("server.admin.password"));
        assert!(!filter.accepts("logging.level"));
    }

    #[test]
    fn test_regex_without_includes_accepts_all_but_excluded() {
        let filter = RegexPropertyFilter::new().exclude("secret").unwrap();
        assert!(filter.accepts("anything"));
        assert!(!filter.accepts("db.secret"));
    }

    #[test]
    fn test_chain_stops_at_first_rejection() {
        let filters: Vec<Arc<dyn PropertyFilter>> = vec![
            Arc::new(KeyPredicateFilter::new(|key: &str| key != "hidden")),
            Arc::new(Uppercase),
        ];

        let shown = apply_filters(&filters, PropertyValue::new("shown", "abc", "s"), true);
        assert_eq!(shown.unwrap().value(), "ABC");

        let hidden = apply_filters(&filters, PropertyValue::new("hidden", "abc", "s"), true);
        assert!(hidden.is_none());
    }

    #[test]
    fn test_programmable_filter_changes_at_runtime() {
        let programmable = ProgrammableFilter::new();
        let value = PropertyValue::new("k", "v", "s");
        let ctx = FilterContext::single("k");

        assert!(programmable.filter(value.clone(), &ctx).is_some());

        let reject: Arc<dyn PropertyFilter> = Arc::new(KeyPredicateFilter::new(|_: &str| false));
        programmable.add(Arc::clone(&reject));
        assert!(programmable.filter(value.clone(), &ctx).is_none());

        assert_eq!(programmable.remove_all(&reject), 1);
        assert!(programmable.is_empty());
        assert!(programmable.filter(value, &ctx).is_some());
    }
}
