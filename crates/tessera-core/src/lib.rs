//! Layered configuration for Tessera
//!
//! This crate provides the lookup side of the configuration system:
//! - Named property sources with ordinals that decide override order
//! - Combination policies for values provided by several sources
//! - Property filters and key re-mapping functions
//! - Typed conversion and serde binding of configuration sections
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Configuration                        │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐       │
//! │  │  defaults   │  │    file     │  │ environment │  ...  │
//! │  │ ordinal 0   │  │ ordinal 100 │  │ ordinal 300 │       │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘       │
//! │         └────────────────┴────────────────┘               │
//! │                          │                                │
//! │                  ┌───────▼────────┐                       │
//! │                  │ CombinationPolicy │                    │
//! │                  └───────┬────────┘                       │
//! │                          │                                │
//! │                   PropertyFilter chain                    │
//! └──────────────────────────┬───────────────────────────────┘
//!                            ▼
//!              get / get_as / properties / bind
//! ```

pub mod bind;
pub mod combine;
pub mod config;
pub mod context;
pub mod convert;
pub mod filter;
pub mod functions;
pub mod source;
pub mod sources;
pub mod value;

// Re-export main types
pub use combine::{CollectingPolicy, CombinationPolicy, OverridePolicy};
pub use config::Configuration;
pub use context::{ConfigurationContext, ConfigurationContextBuilder};
pub use convert::{FromProperty, PropertyConverter};
pub use filter::{FilterContext, KeyPredicateFilter, ProgrammableFilter, PropertyFilter, RegexPropertyFilter};
pub use source::{PropertySource, SourceOrdering, ordinals};
pub use sources::{EnvPropertySource, FileFormat, FilePropertySource, MapPropertySource};
pub use value::PropertyValue;

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cannot convert '{key}' = '{value}' to {target}")]
    Conversion {
        key: String,
        value: String,
        target: &'static str,
    },

    #[error("Missing required property: {0}")]
    Missing(String),

    #[error("Binding error for section '{section}': {message}")]
    Binding { section: String, message: String },
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing(key.into())
    }

    pub fn conversion(key: impl Into<String>, value: impl Into<String>, target: &'static str) -> Self {
        Self::Conversion {
            key: key.into(),
            value: value.into(),
            target,
        }
    }

    pub fn binding(section: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Binding {
            section: section.into(),
            message: msg.into(),
        }
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
