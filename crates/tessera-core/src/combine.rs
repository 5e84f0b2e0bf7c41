//! Combination of values provided by more than one source

use crate::value::PropertyValue;

/// Metadata key listing the sources that contributed to a collected value
pub const SOURCES_METADATA: &str = "_sources";

/// Decides how a candidate value from a higher-ordinal source combines with
/// the value accumulated so far.
///
/// Sources are visited in ascending ordinal order, so `candidate` always
/// comes from a source with an equal or higher ordinal than `current`.
pub trait CombinationPolicy: Send + Sync + std::fmt::Debug {
    fn combine(&self, current: Option<PropertyValue>, candidate: PropertyValue) -> Option<PropertyValue>;
}

/// The higher-ordinal value replaces the current one
#[derive(Debug, Clone, Copy, Default)]
pub struct OverridePolicy;

impl CombinationPolicy for OverridePolicy {
    fn combine(&self, _current: Option<PropertyValue>, candidate: PropertyValue) -> Option<PropertyValue> {
        Some(candidate)
    }
}

/// Values accumulate in ordinal order, joined by a separator
#[derive(Debug, Clone)]
pub struct CollectingPolicy {
    separator: String,
}

impl CollectingPolicy {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }
}

impl Default for CollectingPolicy {
    fn default() -> Self {
        Self::new(",")
    }
}

impl CombinationPolicy for CollectingPolicy {
    fn combine(&self, current: Option<PropertyValue>, candidate: PropertyValue) -> Option<PropertyValue> {
        let Some(current) = current else {
            let source = candidate.source().to_string();
            return Some(candidate.with_metadata(SOURCES_METADATA, source));
        };

        let sources = match current.metadata_entry(SOURCES_METADATA) {
            Some(existing) => format!("{existing},{}", candidate.source()),
            None => format!("{},{}", current.source(), candidate.source()),
        };
        let joined = format!("{}{}{}", current.value(), self.separator, candidate.value());

        Some(candidate.with_value(joined).with_metadata(SOURCES_METADATA, sources))
    }
}
