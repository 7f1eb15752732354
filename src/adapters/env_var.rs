// SPDX-License-Identifier: MIT OR Apache-2.0

//! Environment variable configuration provider.
//!
//! Variable names are mapped to keys by splitting on a double underscore and
//! converting every segment to lowerCamelCase:
//!
//! | Variable           | Key               |
//! |--------------------|-------------------|
//! | `GREETED_NAME`     | `greetedName`     |
//! | `HTTP__PORT`       | `http.port`       |
//! | `DB__POOL_SIZE`    | `db.poolSize`     |

use crate::domain::{ConfigError, ConfigKey, ConfigSnapshot, ConfigValue, Result};
use crate::ports::ConfigProvider;
use heck::ToLowerCamelCase;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Maximum length for environment variable keys (prevents DoS)
const MAX_ENV_KEY_LEN: usize = 512;

/// Maximum length for environment variable values (prevents DoS)
const MAX_ENV_VALUE_LEN: usize = 1048576; // 1MB

/// Separator between key segments in variable names.
const SEGMENT_SEPARATOR: &str = "__";

/// Options for [`EnvVarProvider::load`].
///
/// # Examples
///
/// ```rust,no_run
/// use stratacfg::adapters::{EnvVarOptions, EnvVarProvider};
///
/// # fn main() -> stratacfg::domain::Result<()> {
/// let provider = EnvVarProvider::load(
///     EnvVarOptions::new()
///         .prefix("MYAPP_")
///         .env_file(".env")
///         .allow_missing(true),
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct EnvVarOptions {
    prefix: Option<String>,
    env_file: Option<PathBuf>,
    allow_missing: bool,
}

impl EnvVarOptions {
    /// Creates options reading the whole process environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only reads variables starting with `prefix`; the prefix is stripped.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Merges a `.env`-style file. Process variables take precedence.
    pub fn env_file(mut self, path: impl AsRef<Path>) -> Self {
        self.env_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Tolerates a missing `.env` file.
    pub fn allow_missing(mut self, allow: bool) -> Self {
        self.allow_missing = allow;
        self
    }
}

/// Configuration provider for environment variables.
///
/// The environment is captured once, at construction; later changes to the
/// process environment are not observed.
///
/// # Examples
///
/// ```rust
/// use stratacfg::adapters::EnvVarProvider;
/// use stratacfg::ports::ConfigProvider;
///
/// let provider = EnvVarProvider::with_values([("GREETED_NAME", "World")]);
/// assert_eq!(
///     provider.lookup_str("greetedName").unwrap().unwrap().as_str(),
///     Some("World")
/// );
/// ```
#[derive(Debug, Clone)]
pub struct EnvVarProvider {
    prefix: Option<String>,
    snapshot: ConfigSnapshot,
}

impl EnvVarProvider {
    /// Captures the whole process environment.
    pub fn new() -> Self {
        Self::from_entries(None, process_vars())
    }

    /// Captures the process variables starting with `prefix`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stratacfg::adapters::EnvVarProvider;
    ///
    /// let provider = EnvVarProvider::with_prefix("MYAPP_");
    /// ```
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::from_entries(Some(prefix.into()), process_vars())
    }

    /// Creates a provider over explicit variables instead of the process
    /// environment. Names go through the usual key mapping.
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::from_entries(None, values.into_iter().map(|(k, v)| (k.into(), v.into())))
    }

    /// Captures the environment according to `options`.
    ///
    /// Fails when the `.env` file cannot be read or parsed, or when it is
    /// missing and `allow_missing` is not set.
    pub fn load(options: EnvVarOptions) -> Result<Self> {
        let mut entries = Vec::new();
        if let Some(path) = &options.env_file {
            entries.extend(read_env_file(path, options.allow_missing)?);
        }
        entries.extend(process_vars());
        Ok(Self::from_entries(options.prefix, entries))
    }

    fn from_entries(prefix: Option<String>, entries: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut values = HashMap::new();

        for (name, value) in entries {
            // Validate input sizes to prevent DoS
            if name.len() > MAX_ENV_KEY_LEN || value.len() > MAX_ENV_VALUE_LEN {
                tracing::debug!(
                    "Skipping oversized environment variable: key_len={}, value_len={} (max key={}, max value={})",
                    name.len(),
                    value.len(),
                    MAX_ENV_KEY_LEN,
                    MAX_ENV_VALUE_LEN
                );
                continue;
            }

            let name = match &prefix {
                Some(prefix) => match name.strip_prefix(prefix.as_str()) {
                    Some(stripped) => stripped,
                    None => continue,
                },
                None => name.as_str(),
            };

            if let Some(key) = variable_key(name) {
                values.insert(key, ConfigValue::from(value));
            }
        }

        tracing::debug!(
            "Loaded {} environment variables (prefix={:?})",
            values.len(),
            prefix
        );

        Self {
            prefix,
            snapshot: ConfigSnapshot::new(values),
        }
    }

    /// Returns the prefix filter, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Returns the captured values.
    pub fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }
}

impl Default for EnvVarProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigProvider for EnvVarProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn lookup(&self, key: &ConfigKey) -> Result<Option<ConfigValue>> {
        Ok(self.snapshot.get(key).cloned())
    }
}

/// Maps a variable name to a key. Returns `None` for an empty name.
pub fn variable_key(name: &str) -> Option<ConfigKey> {
    if name.is_empty() {
        return None;
    }
    ConfigKey::new(
        name.split(SEGMENT_SEPARATOR)
            .map(|segment| segment.to_lower_camel_case()),
    )
    .ok()
}

/// Process variables with UTF-8 names and values.
fn process_vars() -> Vec<(String, String)> {
    env::vars_os()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

fn read_env_file(path: &Path, allow_missing: bool) -> Result<Vec<(String, String)>> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() && allow_missing => {
            tracing::debug!(path = %path.display(), "environment file not found, skipping");
            return Ok(Vec::new());
        }
        Err(e) => return Err(env_file_error(path, e)),
    };

    let entries = iter
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| env_file_error(path, e))?;
    tracing::debug!(path = %path.display(), entries = entries.len(), "loaded environment file");
    Ok(entries)
}

fn env_file_error(path: &Path, e: dotenvy::Error) -> ConfigError {
    ConfigError::ProviderFailure {
        provider: "env".to_string(),
        message: format!("Failed to read environment file {}", path.display()),
        source: Some(Box::new(e)),
    }
}
