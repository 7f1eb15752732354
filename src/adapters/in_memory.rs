// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory configuration providers.
//!
//! [`InMemoryProvider`] serves a fixed set of values, typically defaults
//! compiled into the application. [`MutableInMemoryProvider`] can be changed at
//! runtime and publishes every change to its watchers.

use super::publisher::SnapshotCell;
use crate::domain::{ConfigKey, ConfigSnapshot, ConfigValue, Result};
use crate::ports::{ConfigProvider, SnapshotStream, ValueStream, WatchableProvider};
use std::sync::Arc;

/// Provider over a fixed set of values.
///
/// # Examples
///
/// ```rust
/// use stratacfg::adapters::InMemoryProvider;
/// use stratacfg::ports::ConfigProvider;
///
/// let defaults = InMemoryProvider::new("defaults", [("http.port", 8080i64)]);
/// assert!(defaults.lookup_str("http.port").unwrap().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryProvider {
    name: String,
    snapshot: ConfigSnapshot,
}

impl InMemoryProvider {
    /// Creates a provider named `name` holding `values`.
    pub fn new<I, K, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ConfigKey>,
        V: Into<ConfigValue>,
    {
        Self {
            name: name.into(),
            snapshot: collect(values),
        }
    }

    /// Creates a provider serving `snapshot`.
    pub fn from_snapshot(name: impl Into<String>, snapshot: ConfigSnapshot) -> Self {
        Self {
            name: name.into(),
            snapshot,
        }
    }

    /// Returns the values served by this provider.
    pub fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }
}

impl ConfigProvider for InMemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, key: &ConfigKey) -> Result<Option<ConfigValue>> {
        Ok(self.snapshot.get(key).cloned())
    }
}

/// Provider whose values can be changed at runtime.
///
/// Every change swaps in a complete new snapshot; lookups and watchers never
/// observe a partially applied `replace_all`.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use stratacfg::adapters::MutableInMemoryProvider;
/// use stratacfg::ports::ConfigProvider;
///
/// let flags = Arc::new(MutableInMemoryProvider::new("flags"));
/// flags.set("beta.enabled", true);
/// assert!(flags.lookup_str("beta.enabled").unwrap().is_some());
/// ```
pub struct MutableInMemoryProvider {
    name: String,
    cell: SnapshotCell,
}

impl MutableInMemoryProvider {
    /// Creates an empty provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cell: SnapshotCell::default(),
        }
    }

    /// Creates a provider holding `values`.
    pub fn with_values<I, K, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ConfigKey>,
        V: Into<ConfigValue>,
    {
        Self {
            name: name.into(),
            cell: SnapshotCell::new(collect(values)),
        }
    }

    /// Sets `key` to `value`. Returns `true` if the value changed.
    pub fn set(&self, key: impl Into<ConfigKey>, value: impl Into<ConfigValue>) -> bool {
        let key = key.into();
        let value = value.into();
        let changed = self.cell.update(|values| {
            values.insert(key, value);
        });
        !changed.is_empty()
    }

    /// Removes `key`. Returns `true` if it was present.
    pub fn remove(&self, key: impl Into<ConfigKey>) -> bool {
        let key = key.into();
        let changed = self.cell.update(|values| {
            values.remove(&key);
        });
        !changed.is_empty()
    }

    /// Replaces every value at once. Returns the keys that changed.
    pub fn replace_all<I, K, V>(&self, values: I) -> Vec<ConfigKey>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ConfigKey>,
        V: Into<ConfigValue>,
    {
        let changed = self.cell.replace(collect(values));
        tracing::debug!(provider = %self.name, changed = changed.len(), "replaced in-memory configuration");
        changed
    }
}

impl ConfigProvider for MutableInMemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, key: &ConfigKey) -> Result<Option<ConfigValue>> {
        Ok(self.cell.lookup(key))
    }
}

impl WatchableProvider for MutableInMemoryProvider {
    fn watch(&self, key: &ConfigKey) -> Result<ValueStream> {
        Ok(self.cell.watch_key(key))
    }

    fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.cell.load()
    }

    fn watch_snapshot(&self) -> Result<SnapshotStream> {
        Ok(self.cell.watch_all())
    }
}

fn collect<I, K, V>(values: I) -> ConfigSnapshot
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<ConfigKey>,
    V: Into<ConfigValue>,
{
    values
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
