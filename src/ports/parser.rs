// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration parser trait definition.
//!
//! This module defines the `ConfigParser` trait, which turns the textual content
//! of a configuration file into flat key/value pairs. File-backed providers
//! delegate all format knowledge to a parser.

use crate::domain::{ConfigKey, ConfigValue, Result};
use std::collections::HashMap;

/// Trait for parsing configuration file content.
///
/// Nested structures are flattened into segmented keys, so a YAML document
/// `database: { host: x }` yields the key `database.host`.
///
/// # Examples
///
/// ```rust
/// use stratacfg::domain::{ConfigKey, ConfigValue, Result};
/// use stratacfg::ports::ConfigParser;
/// use std::collections::HashMap;
///
/// struct LinesParser;
///
/// impl ConfigParser for LinesParser {
///     fn parse(&self, content: &str) -> Result<HashMap<ConfigKey, ConfigValue>> {
///         Ok(content
///             .lines()
///             .filter_map(|line| line.split_once('='))
///             .map(|(k, v)| (ConfigKey::from(k.trim()), ConfigValue::from(v.trim())))
///             .collect())
///     }
///
///     fn supported_extensions(&self) -> &[&str] {
///         &["properties"]
///     }
/// }
/// ```
pub trait ConfigParser: Send + Sync {
    /// Parses content into flat key/value pairs.
    fn parse(&self, content: &str) -> Result<HashMap<ConfigKey, ConfigValue>>;

    /// Returns the file extensions this parser understands.
    fn supported_extensions(&self) -> &[&str];
}
