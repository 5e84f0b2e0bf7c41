//! Built-in property sources
//!
//! - Map: in-memory key/value pairs (defaults, runtime overrides, derived views)
//! - Environment: process environment with optional prefix mapping
//! - File: TOML or JSON files flattened to dotted keys

mod env;
mod file;
mod map;

pub use env::EnvPropertySource;
pub use file::{FileFormat, FilePropertySource};
pub use map::{MapPropertySource, MapPropertySourceBuilder};
