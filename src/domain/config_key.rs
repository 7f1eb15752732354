// SPDX-License-Identifier: MIT OR Apache-2.0

//! Segmented configuration keys.
//!
//! This module provides the `ConfigKey` type, an immutable, non-empty sequence of
//! string segments. The textual form joins segments with dots (`http.port`).

use crate::domain::errors::{ConfigError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A type-safe, segmented configuration key.
///
/// Keys are compared by their full segment sequence and are case-sensitive.
/// A key always holds at least one segment; parsing an empty string yields the
/// single empty segment.
///
/// # Examples
///
/// ```
/// use stratacfg::domain::ConfigKey;
///
/// let key = ConfigKey::from("database.host");
/// assert_eq!(key.segments(), ["database", "host"]);
/// assert_eq!(key.to_string(), "database.host");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey(Vec<String>);

impl ConfigKey {
    /// Creates a key from explicit segments.
    ///
    /// Segments are taken verbatim, so a segment may itself contain a dot.
    /// Returns `ConfigError::InvalidKey` when `segments` is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratacfg::domain::ConfigKey;
    ///
    /// let key = ConfigKey::new(vec!["http".to_string(), "port".to_string()]).unwrap();
    /// assert_eq!(key, ConfigKey::from("http.port"));
    /// assert!(ConfigKey::new(Vec::<String>::new()).is_err());
    /// ```
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(ConfigError::InvalidKey {
                key: String::new(),
                message: "a key needs at least one segment".to_string(),
            });
        }
        Ok(ConfigKey(segments))
    }

    /// Returns the segments of the key.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns the number of segments. Never zero.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the last segment.
    pub fn last(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// Returns a new key with `prefix` prepended.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratacfg::domain::ConfigKey;
    ///
    /// let key = ConfigKey::from("port").scoped(&ConfigKey::from("http"));
    /// assert_eq!(key, ConfigKey::from("http.port"));
    /// ```
    pub fn scoped(&self, prefix: &ConfigKey) -> ConfigKey {
        let mut segments = Vec::with_capacity(prefix.len() + self.len());
        segments.extend(prefix.0.iter().cloned());
        segments.extend(self.0.iter().cloned());
        ConfigKey(segments)
    }

    /// Returns `true` if this key starts with every segment of `prefix`.
    ///
    /// Matching is segment-wise: `http.port` matches `http` but not `ht`.
    pub fn matches(&self, prefix: &ConfigKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Returns a new key with one more trailing segment.
    pub fn child(&self, segment: impl Into<String>) -> ConfigKey {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        ConfigKey(segments)
    }

    /// Returns the dotted textual form.
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }

    /// Consumes the key, returning its segments.
    pub fn into_segments(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for ConfigKey {
    fn from(s: &str) -> Self {
        ConfigKey(s.split('.').map(str::to_string).collect())
    }
}

impl From<String> for ConfigKey {
    fn from(s: String) -> Self {
        ConfigKey::from(s.as_str())
    }
}

impl From<&String> for ConfigKey {
    fn from(s: &String) -> Self {
        ConfigKey::from(s.as_str())
    }
}

impl From<&ConfigKey> for ConfigKey {
    fn from(key: &ConfigKey) -> Self {
        key.clone()
    }
}

impl From<ConfigKey> for String {
    fn from(key: ConfigKey) -> Self {
        key.dotted()
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl Serialize for ConfigKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.dotted())
    }
}

impl<'de> Deserialize<'de> for ConfigKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ConfigKey::from(s))
    }
}
