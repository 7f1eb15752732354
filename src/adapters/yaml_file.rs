// SPDX-License-Identifier: MIT OR Apache-2.0

//! YAML file configuration provider.
//!
//! This module provides the YAML [`ConfigParser`] and a provider that reads a
//! YAML file once, at construction.

use super::check_file_size;
use crate::domain::{ConfigError, ConfigKey, ConfigSnapshot, ConfigValue, Result};
use crate::ports::{ConfigParser, ConfigProvider};
use directories::ProjectDirs;
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// YAML parser implementation.
///
/// Mappings are flattened into segmented keys. Scalars keep their type and
/// sequences become lists. `null` values are dropped, including `null` items
/// of a sequence, so later items move up one index. Integers outside the `i64`
/// range are a parse error.
///
/// # Examples
///
/// ```rust
/// use stratacfg::adapters::YamlParser;
/// use stratacfg::domain::{ConfigKey, ConfigValue};
/// use stratacfg::ports::ConfigParser;
///
/// let parser = YamlParser::new();
/// let yaml_content = "database:\n  host: localhost\n  port: 5432";
/// let result = parser.parse(yaml_content).unwrap();
/// assert_eq!(result.get(&ConfigKey::from("database.port")), Some(&ConfigValue::Int(5432)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct YamlParser;

impl YamlParser {
    /// Creates a new YAML parser.
    pub fn new() -> Self {
        YamlParser
    }

    fn flatten(
        mapping: &serde_yaml::Mapping,
        prefix: &[String],
        result: &mut HashMap<ConfigKey, ConfigValue>,
    ) -> Result<()> {
        for (key, value) in mapping {
            let mut path = prefix.to_vec();
            path.extend(mapping_key(key)?.split('.').map(str::to_string));

            match untag(value) {
                Value::Mapping(nested) => Self::flatten(nested, &path, result)?,
                other => {
                    if let Some(value) = convert(other)? {
                        result.insert(ConfigKey::new(path)?, value);
                    }
                }
            }
        }
        Ok(())
    }
}

fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

fn mapping_key(key: &Value) -> Result<String> {
    match untag(key) {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ConfigError::ParseError {
            message: format!("Unsupported YAML mapping key: {:?}", other),
            source: None,
        }),
    }
}

/// Converts a YAML value. Returns `None` for `null`.
fn convert(value: &Value) -> Result<Option<ConfigValue>> {
    Ok(match untag(value) {
        Value::Null => None,
        Value::Bool(b) => Some(ConfigValue::Bool(*b)),
        Value::Number(n) if n.is_f64() => n.as_f64().map(ConfigValue::Double),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(ConfigValue::Int(i)),
            None => {
                return Err(ConfigError::ParseError {
                    message: format!("YAML integer out of range: {}", n),
                    source: None,
                })
            }
        },
        Value::String(s) => Some(ConfigValue::String(s.clone())),
        Value::Sequence(seq) => {
            let mut items = Vec::with_capacity(seq.len());
            for item in seq {
                items.extend(convert(item)?);
            }
            Some(ConfigValue::List(items))
        }
        Value::Mapping(map) => {
            let mut entries = BTreeMap::new();
            for (key, item) in map {
                if let Some(item) = convert(item)? {
                    entries.insert(mapping_key(key)?, item);
                }
            }
            Some(ConfigValue::Map(entries))
        }
        Value::Tagged(_) => None,
    })
}

impl ConfigParser for YamlParser {
    fn parse(&self, content: &str) -> Result<HashMap<ConfigKey, ConfigValue>> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to parse YAML: {}", e),
            source: Some(Box::new(e)),
        })?;

        let mut result = HashMap::new();
        match untag(&value) {
            Value::Mapping(mapping) => Self::flatten(mapping, &[], &mut result)?,
            Value::Null => {}
            _ => {
                return Err(ConfigError::ParseError {
                    message: "Top-level YAML value must be a mapping".to_string(),
                    source: None,
                })
            }
        }
        Ok(result)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["yaml", "yml"]
    }
}

/// Configuration provider for a YAML file.
///
/// The file is read once, at construction. Use `ReloadingFileProvider` (feature
/// `reload`) to follow changes.
///
/// # Examples
///
/// ```rust,no_run
/// use stratacfg::adapters::YamlFileProvider;
///
/// // Load from a specific file
/// let provider = YamlFileProvider::from_file("/path/to/config.yaml").unwrap();
///
/// // Load from default OS location
/// let provider = YamlFileProvider::from_default_location("myapp", "com.example").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct YamlFileProvider {
    /// Canonical path of the YAML file
    file_path: PathBuf,
    /// Parsed configuration values
    snapshot: ConfigSnapshot,
}

impl YamlFileProvider {
    /// Reads and parses the YAML file at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file_path = path.as_ref();

        // Canonicalize path to prevent directory traversal attacks
        let canonical_path = file_path
            .canonicalize()
            .map_err(|e| file_error(file_path, "Invalid or inaccessible path", e))?;

        // Check file size before reading to prevent DoS via large files
        let metadata = fs::metadata(&canonical_path)
            .map_err(|e| file_error(&canonical_path, "Failed to read file metadata", e))?;
        check_file_size("yaml-file", metadata.len())?;

        let content = fs::read_to_string(&canonical_path)
            .map_err(|e| file_error(&canonical_path, "Failed to read configuration file", e))?;

        let snapshot = ConfigSnapshot::new(YamlParser::new().parse(&content)?);
        tracing::debug!(
            path = %canonical_path.display(),
            keys = snapshot.len(),
            "loaded YAML configuration"
        );

        Ok(Self {
            file_path: canonical_path,
            snapshot,
        })
    }

    /// Reads `config.yaml` from the OS-specific configuration directory.
    ///
    /// # Arguments
    ///
    /// * `app_name` - The application name (e.g., "myapp")
    /// * `qualifier` - The organization/qualifier (e.g., "com.example")
    pub fn from_default_location(app_name: &str, qualifier: &str) -> Result<Self> {
        Self::with_filename(app_name, qualifier, "config.yaml")
    }

    /// Reads `filename` from the OS-specific configuration directory.
    pub fn with_filename(app_name: &str, qualifier: &str, filename: &str) -> Result<Self> {
        Self::from_file(default_config_path(app_name, qualifier, filename)?)
    }

    /// Returns the canonical path of the file.
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Returns the parsed values.
    pub fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }
}

impl ConfigProvider for YamlFileProvider {
    fn name(&self) -> &str {
        "yaml-file"
    }

    fn lookup(&self, key: &ConfigKey) -> Result<Option<ConfigValue>> {
        Ok(self.snapshot.get(key).cloned())
    }
}

/// Returns `<config dir>/<filename>` for the application.
pub fn default_config_path(app_name: &str, qualifier: &str, filename: &str) -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from(qualifier, "", app_name).ok_or_else(|| {
        ConfigError::provider("yaml-file", "Failed to determine project directories")
    })?;
    Ok(proj_dirs.config_dir().join(filename))
}

fn file_error(path: &Path, message: &str, e: std::io::Error) -> ConfigError {
    ConfigError::ProviderFailure {
        provider: "yaml-file".to_string(),
        message: format!(
            "{}: {}",
            message,
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("<unknown>")
        ),
        source: Some(Box::new(e)),
    }
}
