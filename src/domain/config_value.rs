// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration value type with explicit, failing coercions.
//!
//! This module provides the `ConfigValue` sum type and the `FromConfigValue`
//! trait. Every supported target type has exactly one conversion function;
//! a value that cannot be converted yields `ConfigError::Coercion` instead of
//! a best-effort cast.

use crate::domain::config_key::ConfigKey;
use crate::domain::errors::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Largest integer magnitude an `f64` represents exactly.
const MAX_EXACT_F64_INT: u64 = 1 << 53;

/// The kind of a stored `ConfigValue`, used in coercion errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// A UTF-8 string.
    String,
    /// A signed 64-bit integer.
    Int,
    /// A 64-bit float.
    Double,
    /// A boolean.
    Bool,
    /// Raw bytes.
    Bytes,
    /// An ordered list of values.
    List,
    /// A map of string keys to values.
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::Int => "int",
            ValueKind::Double => "double",
            ValueKind::Bool => "bool",
            ValueKind::Bytes => "bytes",
            ValueKind::List => "list",
            ValueKind::Map => "map",
        };
        f.write_str(name)
    }
}

/// A typed configuration value.
///
/// Providers produce `ConfigValue`s; callers convert them with
/// [`ConfigValue::coerce`] or one of the `as_*` helpers.
///
/// # Examples
///
/// ```
/// use stratacfg::domain::{ConfigKey, ConfigValue};
///
/// let key = ConfigKey::from("http.port");
/// let value = ConfigValue::from("8080");
/// assert_eq!(value.coerce::<u16>(&key).unwrap(), 8080);
///
/// let flag = ConfigValue::from("Yes");
/// assert!(flag.as_bool(&key).unwrap());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    /// A UTF-8 string.
    String(String),
    /// A signed 64-bit integer.
    Int(i64),
    /// A 64-bit float.
    Double(f64),
    /// A boolean.
    Bool(bool),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// An ordered list of values.
    List(Vec<ConfigValue>),
    /// A map of string keys to values.
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Returns the kind of the stored value.
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::String(_) => ValueKind::String,
            ConfigValue::Int(_) => ValueKind::Int,
            ConfigValue::Double(_) => ValueKind::Double,
            ConfigValue::Bool(_) => ValueKind::Bool,
            ConfigValue::Bytes(_) => ValueKind::Bytes,
            ConfigValue::List(_) => ValueKind::List,
            ConfigValue::Map(_) => ValueKind::Map,
        }
    }

    /// Converts the value into `T`, failing with `ConfigError::Coercion`.
    ///
    /// `key` is only used to describe the failure.
    pub fn coerce<T: FromConfigValue>(&self, key: &ConfigKey) -> Result<T> {
        T::from_config_value(self, key)
    }

    /// Returns the string slice if this is a `String` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the bytes if this is a `Bytes` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ConfigValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the elements if this is a `List` value.
    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the entries if this is a `Map` value.
    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Converts the value to a boolean.
    ///
    /// Accepts `Bool` values and strings in the case-insensitive vocabulary
    /// `true`, `false`, `yes`, `no`, `1`, `0`.
    pub fn as_bool(&self, key: &ConfigKey) -> Result<bool> {
        self.coerce(key)
    }

    /// Converts the value to an `i64`.
    pub fn as_i64(&self, key: &ConfigKey) -> Result<i64> {
        self.coerce(key)
    }

    /// Converts the value to an `f64`.
    pub fn as_f64(&self, key: &ConfigKey) -> Result<f64> {
        self.coerce(key)
    }

    /// Converts the value to an owned `String`.
    pub fn as_string(&self, key: &ConfigKey) -> Result<String> {
        self.coerce(key)
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

impl From<i32> for ConfigValue {
    fn from(i: i32) -> Self {
        ConfigValue::Int(i64::from(i))
    }
}

impl From<f64> for ConfigValue {
    fn from(d: f64) -> Self {
        ConfigValue::Double(d)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<Vec<u8>> for ConfigValue {
    fn from(bytes: Vec<u8>) -> Self {
        ConfigValue::Bytes(bytes)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(items: Vec<ConfigValue>) -> Self {
        ConfigValue::List(items)
    }
}

impl From<BTreeMap<String, ConfigValue>> for ConfigValue {
    fn from(map: BTreeMap<String, ConfigValue>) -> Self {
        ConfigValue::Map(map)
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(s) => f.write_str(s),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Double(d) => write!(f, "{}", d),
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            ConfigValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            ConfigValue::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Conversion from a stored `ConfigValue` into a caller-requested type.
///
/// Implementations must be total-or-failing: either the value converts without
/// loss, or `ConfigError::Coercion` is returned.
pub trait FromConfigValue: Sized {
    /// Converts `value`, naming `key` in any failure.
    fn from_config_value(value: &ConfigValue, key: &ConfigKey) -> Result<Self>;
}

fn mismatch<T>(value: &ConfigValue, key: &ConfigKey) -> ConfigError {
    ConfigError::Coercion {
        key: key.to_string(),
        found: value.kind(),
        requested: std::any::type_name::<T>(),
        source: None,
    }
}

fn parse_failure<T, E>(value: &ConfigValue, key: &ConfigKey, err: E) -> ConfigError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ConfigError::Coercion {
        key: key.to_string(),
        found: value.kind(),
        requested: std::any::type_name::<T>(),
        source: Some(Box::new(err)),
    }
}

impl FromConfigValue for ConfigValue {
    fn from_config_value(value: &ConfigValue, _key: &ConfigKey) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromConfigValue for String {
    fn from_config_value(value: &ConfigValue, key: &ConfigKey) -> Result<Self> {
        match value {
            ConfigValue::String(s) => Ok(s.clone()),
            ConfigValue::Int(i) => Ok(i.to_string()),
            ConfigValue::Double(d) => Ok(d.to_string()),
            ConfigValue::Bool(b) => Ok(b.to_string()),
            _ => Err(mismatch::<String>(value, key)),
        }
    }
}

impl FromConfigValue for bool {
    fn from_config_value(value: &ConfigValue, key: &ConfigKey) -> Result<Self> {
        match value {
            ConfigValue::Bool(b) => Ok(*b),
            ConfigValue::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(mismatch::<bool>(value, key)),
            },
            _ => Err(mismatch::<bool>(value, key)),
        }
    }
}

macro_rules! impl_from_config_value_for_int {
    ($($ty:ty),*) => {
        $(
            impl FromConfigValue for $ty {
                fn from_config_value(value: &ConfigValue, key: &ConfigKey) -> Result<Self> {
                    match value {
                        ConfigValue::Int(i) => <$ty>::try_from(*i)
                            .map_err(|e| parse_failure::<$ty, _>(value, key, e)),
                        ConfigValue::String(s) => s
                            .parse::<$ty>()
                            .map_err(|e| parse_failure::<$ty, _>(value, key, e)),
                        _ => Err(mismatch::<$ty>(value, key)),
                    }
                }
            }
        )*
    };
}

impl_from_config_value_for_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromConfigValue for f64 {
    fn from_config_value(value: &ConfigValue, key: &ConfigKey) -> Result<Self> {
        match value {
            ConfigValue::Double(d) => Ok(*d),
            ConfigValue::Int(i) if i.unsigned_abs() <= MAX_EXACT_F64_INT => Ok(*i as f64),
            ConfigValue::String(s) => s
                .parse::<f64>()
                .map_err(|e| parse_failure::<f64, _>(value, key, e)),
            _ => Err(mismatch::<f64>(value, key)),
        }
    }
}

impl FromConfigValue for f32 {
    fn from_config_value(value: &ConfigValue, key: &ConfigKey) -> Result<Self> {
        match value {
            ConfigValue::String(s) => s
                .parse::<f32>()
                .map_err(|e| parse_failure::<f32, _>(value, key, e)),
            _ => {
                let wide = f64::from_config_value(value, key)
                    .map_err(|_| mismatch::<f32>(value, key))?;
                let narrow = wide as f32;
                // Only values that survive the round trip unchanged.
                if f64::from(narrow) == wide || (wide.is_nan() && narrow.is_nan()) {
                    Ok(narrow)
                } else {
                    Err(mismatch::<f32>(value, key))
                }
            }
        }
    }
}

impl<T: FromConfigValue> FromConfigValue for Vec<T> {
    fn from_config_value(value: &ConfigValue, key: &ConfigKey) -> Result<Self> {
        match value {
            ConfigValue::List(items) => items
                .iter()
                .map(|item| T::from_config_value(item, key))
                .collect(),
            _ => Err(mismatch::<Vec<T>>(value, key)),
        }
    }
}

impl<T: FromConfigValue> FromConfigValue for BTreeMap<String, T> {
    fn from_config_value(value: &ConfigValue, key: &ConfigKey) -> Result<Self> {
        match value {
            ConfigValue::Map(map) => map
                .iter()
                .map(|(k, v)| -> Result<(String, T)> {
                    Ok((k.clone(), T::from_config_value(v, &key.child(k.as_str()))?))
                })
                .collect(),
            _ => Err(mismatch::<BTreeMap<String, T>>(value, key)),
        }
    }
}
