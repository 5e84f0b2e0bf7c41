//! Typed conversion of property values

use crate::value::PropertyValue;
use crate::{ConfigError, Result};

use std::path::PathBuf;
use std::time::Duration;

/// Conversion of a raw property value into a typed value
pub trait PropertyConverter<T>: Send + Sync {
    fn convert(&self, value: &PropertyValue) -> Result<T>;
}

impl<T, F> PropertyConverter<T> for F
where
    F: Fn(&PropertyValue) -> Result<T> + Send + Sync,
{
    fn convert(&self, value: &PropertyValue) -> Result<T> {
        self(value)
    }
}

/// Types with a built-in conversion from property values
pub trait FromProperty: Sized {
    fn from_property(value: &PropertyValue) -> Result<Self>;
}

fn conversion_error(value: &PropertyValue, target: &'static str) -> ConfigError {
    ConfigError::conversion(value.key(), value.value(), target)
}

macro_rules! from_str_property {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromProperty for $ty {
                fn from_property(value: &PropertyValue) -> Result<Self> {
                    value
                        .value()
                        .trim()
                        .parse::<$ty>()
                        .map_err(|_| conversion_error(value, stringify!($ty)))
                }
            }
        )*
    };
}

from_str_property!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, char);

impl FromProperty for String {
    fn from_property(value: &PropertyValue) -> Result<Self> {
        Ok(value.value().to_string())
    }
}

impl FromProperty for PathBuf {
    fn from_property(value: &PropertyValue) -> Result<Self> {
        Ok(PathBuf::from(value.value().trim()))
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl FromProperty for bool {
    fn from_property(value: &PropertyValue) -> Result<Self> {
        parse_bool(value.value()).ok_or_else(|| conversion_error(value, "bool"))
    }
}

impl FromProperty for Duration {
    /// Accepts `ms`, `s`, `m` and `h` suffixes; a bare number is milliseconds
    fn from_property(value: &PropertyValue) -> Result<Self> {
        let raw = value.value().trim();
        let split = raw
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(raw.len());
        let (digits, unit) = raw.split_at(split);
        let amount: u64 = digits
            .parse()
            .map_err(|_| conversion_error(value, "Duration"))?;

        match unit.trim() {
            "" | "ms" => Ok(Duration::from_millis(amount)),
            "s" => Ok(Duration::from_secs(amount)),
            "m" => Ok(Duration::from_secs(amount.saturating_mul(60))),
            "h" => Ok(Duration::from_secs(amount.saturating_mul(3600))),
            _ => Err(conversion_error(value, "Duration")),
        }
    }
}

impl<T: FromProperty> FromProperty for Vec<T> {
    /// Comma-separated list; empty items are skipped
    fn from_property(value: &PropertyValue) -> Result<Self> {
        value
            .value()
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| T::from_property(&value.with_value(item)))
            .collect()
    }
}
