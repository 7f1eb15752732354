// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line argument configuration provider.
//!
//! Accepted forms, after the program name:
//!
//! - `--key value`: one value
//! - `--key=value`: inline value
//! - `--flag`: presence only, no values
//! - `--key v1 v2`: every following token not starting with `--` is a value
//! - `--key a,b`: values containing commas are split (empty items are kept)
//!
//! Repeating a key appends to its values. Tokens before the first `--` option
//! are ignored.

use crate::domain::{ConfigKey, ConfigSnapshot, ConfigValue, Result};
use crate::ports::ConfigProvider;
use heck::ToLowerCamelCase;
use std::collections::BTreeMap;

const OPTION_PREFIX: &str = "--";

/// Parses raw arguments into option names (with their leading `--`) and values.
///
/// The first argument is the program name and is skipped.
///
/// # Examples
///
/// ```rust
/// use stratacfg::adapters::cli::parse_arguments;
///
/// let parsed = parse_arguments(["prog", "--verbose", "--ports", "8080,8443"]);
/// assert!(parsed["--verbose"].is_empty());
/// assert_eq!(parsed["--ports"], ["8080", "8443"]);
/// ```
pub fn parse_arguments<I, S>(args: I) -> BTreeMap<String, Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for arg in args.into_iter().skip(1) {
        let arg = arg.as_ref();

        if arg.starts_with(OPTION_PREFIX) {
            let (name, inline) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg, None),
            };
            let values = parsed.entry(name.to_string()).or_default();
            match inline {
                Some(value) => {
                    values.extend(split_values(value));
                    current = None;
                }
                None => current = Some(name.to_string()),
            }
        } else if let Some(name) = &current {
            parsed
                .entry(name.clone())
                .or_default()
                .extend(split_values(arg));
        } else {
            tracing::trace!(argument = arg, "ignoring positional argument");
        }
    }

    parsed
}

fn split_values(value: &str) -> impl Iterator<Item = String> + '_ {
    value.split(',').map(str::to_string)
}

/// Maps an option name to a key: `--http.max-body-size` becomes
/// `http.maxBodySize`.
pub fn option_key(name: &str) -> Option<ConfigKey> {
    let name = name.strip_prefix(OPTION_PREFIX).unwrap_or(name);
    if name.is_empty() {
        return None;
    }
    ConfigKey::new(name.split('.').map(|segment| segment.to_lower_camel_case())).ok()
}

fn option_value(mut values: Vec<String>) -> ConfigValue {
    match values.len() {
        0 => ConfigValue::Bool(true),
        1 => ConfigValue::String(values.remove(0)),
        _ => ConfigValue::List(values.into_iter().map(ConfigValue::String).collect()),
    }
}

/// Configuration provider for command-line arguments.
///
/// A flag without values reads as `true`, a single value as a string and
/// several values as a list of strings.
///
/// # Examples
///
/// ```rust
/// use stratacfg::adapters::CommandLineProvider;
/// use stratacfg::ports::ConfigProvider;
///
/// let provider = CommandLineProvider::from_args(vec!["prog", "--database.host=localhost", "--port", "5432"]);
/// assert!(provider.lookup_str("database.host").unwrap().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandLineProvider {
    snapshot: ConfigSnapshot,
}

impl CommandLineProvider {
    /// Creates a provider with no arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider from raw arguments, program name first.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let snapshot: ConfigSnapshot = parse_arguments(args)
            .into_iter()
            .filter_map(|(name, values)| Some((option_key(&name)?, option_value(values))))
            .collect();
        tracing::debug!("Loaded {} command-line options", snapshot.len());
        Self { snapshot }
    }

    /// Creates a provider from the arguments of the current process.
    pub fn from_env_args() -> Self {
        Self::from_args(std::env::args())
    }

    /// Returns the parsed options.
    pub fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }
}

impl ConfigProvider for CommandLineProvider {
    fn name(&self) -> &str {
        "cli"
    }

    fn lookup(&self, key: &ConfigKey) -> Result<Option<ConfigValue>> {
        Ok(self.snapshot.get(key).cloned())
    }
}
