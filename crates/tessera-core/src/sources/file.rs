//! File-based property source
//!
//! Reads TOML or JSON files and flattens nested tables into dotted keys.
//! A missing file yields an empty source; it only becomes an error when the
//! file exists and cannot be read or parsed.

use crate::ConfigError;
use crate::source::{PropertySource, ordinals};
use crate::value::PropertyValue;

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Marker key the toml crate uses when datetimes pass through a generic value
const TOML_DATETIME_FIELD: &str = "$__toml_private_datetime";

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Json,
}

impl FileFormat {
    /// Pick the format from the file extension, defaulting to TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }

    /// Parse file content into a flat key/value map
    pub fn parse(&self, content: &str) -> Result<BTreeMap<String, String>, ConfigError> {
        let value: Value = match self {
            Self::Toml => toml::from_str(content)
                .map_err(|e| ConfigError::parse(format!("TOML parse error: {e}")))?,
            Self::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::parse(format!("JSON parse error: {e}")))?,
        };

        let mut flat = BTreeMap::new();
        flatten_value(None, &value, &mut flat);
        Ok(flat)
    }
}

/// Property source reading a configuration file
#[derive(Debug)]
pub struct FilePropertySource {
    name: String,
    path: PathBuf,
    format: FileFormat,
    ordinal: i32,
    properties: RwLock<BTreeMap<String, String>>,
}

impl FilePropertySource {
    /// Load a file, choosing the format from its extension
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let format = FileFormat::from_path(&path);
        Self::with_format(path, format)
    }

    pub fn with_format(path: impl Into<PathBuf>, format: FileFormat) -> Result<Self, ConfigError> {
        let path = path.into();
        let properties = read_file(&path, format)?;
        Ok(Self {
            name: format!("file:{}", path.display()),
            path,
            format,
            ordinal: ordinals::FILE,
            properties: RwLock::new(properties),
        })
    }

    /// Override the default file ordinal
    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Re-read the file. Returns whether the content changed.
    ///
    /// On error the previously loaded properties are kept.
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let fresh = read_file(&self.path, self.format)?;
        let mut current = self.properties.write();
        if *current == fresh {
            return Ok(false);
        }
        *current = fresh;
        Ok(true)
    }
}

fn read_file(path: &Path, format: FileFormat) -> Result<BTreeMap<String, String>, ConfigError> {
    if !path.exists() {
        debug!("Config file does not exist: {:?}", path);
        return Ok(BTreeMap::new());
    }

    let content = std::fs::read_to_string(path)?;
    format.parse(&content)
}

/// Flatten nested objects into dotted keys.
///
/// Arrays of scalars become comma-separated values, arrays containing
/// tables are indexed (`servers.0.host`). Nulls are skipped.
pub(crate) fn flatten_value(prefix: Option<&str>, value: &Value, out: &mut BTreeMap<String, String>) {
    let join = |key: &str| match prefix {
        Some(prefix) => format!("{prefix}.{key}"),
        None => key.to_string(),
    };

    match value {
        Value::Object(map) => {
            if let Some(Value::String(datetime)) = map.get(TOML_DATETIME_FIELD)
                && map.len() == 1
            {
                if let Some(prefix) = prefix {
                    out.insert(prefix.to_string(), datetime.clone());
                }
                return;
            }
            for (key, child) in map {
                flatten_value(Some(&join(key)), child, out);
            }
        }
        Value::Array(items) => {
            let Some(prefix) = prefix else { return };
            if items.iter().all(is_scalar) {
                let joined = items
                    .iter()
                    .filter_map(scalar_to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                out.insert(prefix.to_string(), joined);
            } else {
                for (index, item) in items.iter().enumerate() {
                    flatten_value(Some(&format!("{prefix}.{index}")), item, out);
                }
            }
        }
        Value::Null => {}
        scalar => {
            if let (Some(prefix), Some(text)) = (prefix, scalar_to_string(scalar)) {
                out.insert(prefix.to_string(), text);
            }
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl PropertySource for FilePropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.properties
            .read()
            .get(key)
            .map(|value| PropertyValue::new(key, value.clone(), self.name.clone()))
    }

    fn properties(&self) -> BTreeMap<String, PropertyValue> {
        self.properties
            .read()
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
    use tempfile::TempDir;

    #[test]
    fn test_load_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("app.toml");

        std::fs::write(
            &config_path,
            r#"
[server]
port = 9090
hosts = ["a", "b"]

[search]
default_count = 25
enabled = true
"#,
        )
        .unwrap();

        let source = FilePropertySource::new(&config_path).unwrap();
        let props = source.properties();

        assert_eq!(props["server.port"].value(), "9090");
        assert_eq!(props["server.hosts"].value(), "a,b");
        assert_eq!(props["search.default_count"].value(), "25");
        assert_eq!(props["search.enabled"].value(), "true");
        assert_eq!(source.ordinal(), ordinals::FILE);
    }

    #[test]
    fn test_toml_datetimes_keep_their_text() {
        let flat = FileFormat::Toml
            .parse(
                r#"
[release]
published = 1979-05-27T07:32:00Z
day = 2024-01-15
"#,
            )
            .unwrap();

        assert_eq!(flat["release.published"], "1979-05-27T07:32:00Z");
        assert_eq!(flat["release.day"], "2024-01-15");
        assert_eq!(flat.len(), 2);
    }

    #[test]
    fn test_datetime_marker_is_collapsed() {
        let value = serde_json::json!({
            "release": { "$__toml_private_datetime": "2024-01-15" },
            "owner": { "name": "tom" },
        });
        let mut flat = BTreeMap::new();
        flatten_value(None, &value, &mut flat);

        assert_eq!(flat["release"], "2024-01-15");
        assert_eq!(flat["owner.name"], "tom");
        assert_eq!(flat.len(), 2);
    }

    #[test]
    fn test_load_json_with_table_array() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("app.json");

        std::fs::write(
            &config_path,
            r#"{"servers": [{"host": "a"}, {"host": "b"}], "name": null}"#,
        )
        .unwrap();

        let source = FilePropertySource::new(&config_path).unwrap();
        assert_eq!(source.format(), FileFormat::Json);
        assert_eq!(source.get("servers.0.host").unwrap().value(), "a");
        assert_eq!(source.get("servers.1.host").unwrap().value(), "b");
        assert!(source.get("name").is_none());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let source = FilePropertySource::new("/nonexistent/path.toml").unwrap();

        // Should return empty source, not error
        assert!(source.properties().is_empty());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.toml");
        std::fs::write(&config_path, "[server\nport = ").unwrap();

        let err = FilePropertySource::new(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_reload_detects_change() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("app.toml");
        std::fs::write(&config_path, "port = 1").unwrap();

        let source = FilePropertySource::new(&config_path).unwrap();
        assert!(!source.reload().unwrap());

        std::fs::write(&config_path, "port = 2").unwrap();
        assert!(source.reload().unwrap());
        assert_eq!(source.get("port").unwrap().value(), "2");
    }

    #[test]
    fn test_reload_keeps_old_values_on_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("app.toml");
        std::fs::write(&config_path, "port = 1").unwrap();

        let source = FilePropertySource::new(&config_path).unwrap();
        std::fs::write(&config_path, "port = ").unwrap();

        assert!(source.reload().is_err());
        assert_eq!(source.get("port").unwrap().value(), "1");
    }
}
