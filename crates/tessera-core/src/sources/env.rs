//! Environment variable property source
//!
//! With a prefix, only `PREFIX__*` variables are taken; the prefix is
//! stripped, `__` becomes `.` and the key is lowercased, so
//! `APP__SERVER__PORT` is exposed as `server.port`.

use crate::source::{PropertySource, ordinals};
use crate::value::PropertyValue;

use std::collections::BTreeMap;
use std::ffi::OsString;
use tracing::debug;

const SEPARATOR: &str = "__";

/// Snapshot of the process environment
#[derive(Debug, Clone)]
pub struct EnvPropertySource {
    name: String,
    prefix: Option<String>,
    properties: BTreeMap<String, String>,
}

impl EnvPropertySource {
    /// Snapshot all environment variables, keys unchanged
    pub fn new() -> Self {
        Self::from_vars(process_vars(), None)
    }

    /// Snapshot `PREFIX__*` variables with key mapping
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::from_vars(process_vars(), Some(prefix.into()))
    }

    /// Build from an explicit variable list
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>, prefix: Option<String>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let properties = vars
            .into_iter()
            .filter_map(|(name, value)| {
                let name = name.into();
                let key = match &prefix {
                    Some(prefix) => map_prefixed(&name, prefix)?,
                    None => name,
                };
                Some((key, value.into()))
            })
            .collect();

        let name = match &prefix {
            Some(prefix) => format!("environment:{prefix}"),
            None => "environment".to_string(),
        };

        Self {
            name,
            prefix,
            properties,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }
}

impl Default for EnvPropertySource {
    fn default() -> Self {
        Self::new()
    }
}

/// Process environment, skipping variables that are not valid UTF-8
fn process_vars() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os().filter_map(|(name, value)| utf8_var(name, value))
}

fn utf8_var(name: OsString, value: OsString) -> Option<(String, String)> {
    match (name.into_string(), value.into_string()) {
        (Ok(name), Ok(value)) => Some((name, value)),
        (Ok(name), Err(_)) => {
            debug!("Skipping environment variable {name}: value is not valid UTF-8");
            None
        }
        (Err(name), _) => {
            debug!("Skipping environment variable {:?}: name is not valid UTF-8", name);
            None
        }
    }
}

fn map_prefixed(var: &str, prefix: &str) -> Option<String> {
    let rest = var.strip_prefix(prefix)?.strip_prefix(SEPARATOR)?;
    if rest.is_empty() {
        return None;
    }
    Some(rest.split(SEPARATOR).collect::<Vec<_>>().join(".").to_lowercase())
}

impl PropertySource for EnvPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_ordinal(&self) -> i32 {
        ordinals::ENVIRONMENT
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_mapping() {
        let source = EnvPropertySource::from_vars(
            [
                ("APP__SERVER__PORT", "9090"),
                ("APP__LOGGING__LEVEL", "debug"),
                ("APPLICATION", "ignored"),
                ("APP__", "ignored"),
                ("HOME", "/root"),
            ],
            Some("APP".to_string()),
        );

        let props = source.properties();
        assert_eq!(props.len(), 2);
        assert_eq!(source.get("server.port").unwrap().value(), "9090");
        assert_eq!(source.get("logging.level").unwrap().value(), "debug");
        assert_eq!(source.name(), "environment:APP");
        assert_eq!(source.ordinal(), ordinals::ENVIRONMENT);
    }

    #[test]
    fn test_without_prefix_keeps_names() {
        let source = EnvPropertySource::from_vars([("HOME", "/root")], None);
        assert_eq!(source.get("HOME").unwrap().value(), "/root");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let bad = || OsString::from_vec(b"fo\xff".to_vec());
        assert_eq!(utf8_var(OsString::from("APP__BAD"), bad()), None);
        assert_eq!(utf8_var(bad(), OsString::from("value")), None);
        assert_eq!(
            utf8_var(OsString::from("APP__OK"), OsString::from("1")),
            Some(("APP__OK".to_string(), "1".to_string()))
        );

        let vars = [(OsString::from("APP__BAD"), bad()), (OsString::from("APP__GOOD"), OsString::from("yes"))]
            .into_iter()
            .filter_map(|(name, value)| utf8_var(name, value));
        let source = EnvPropertySource::from_vars(vars, Some("APP".to_string()));
        assert_eq!(source.properties().len(), 1);
        assert_eq!(source.get("good").unwrap().value(), "yes");
    }

    #[test]
    fn test_process_snapshot() {
        let source = EnvPropertySource::with_prefix("TESSERA_UNSET_PREFIX");
        assert!(source.properties().is_empty());
    }
}
