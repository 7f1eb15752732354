// SPDX-License-Identifier: MIT OR Apache-2.0

//! Immutable provider snapshots.

use crate::domain::{ConfigKey, ConfigValue};
use std::collections::HashMap;

/// A fully materialized key/value view taken from one provider at one instant.
///
/// Snapshots are never mutated; providers that change swap in a new one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigSnapshot {
    values: HashMap<ConfigKey, ConfigValue>,
}

impl ConfigSnapshot {
    /// Creates a snapshot from a map of values.
    pub fn new(values: HashMap<ConfigKey, ConfigValue>) -> Self {
        Self { values }
    }

    /// Creates an empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &ConfigKey) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// Returns `true` if the snapshot defines `key`.
    pub fn contains_key(&self, key: &ConfigKey) -> bool {
        self.values.contains_key(key)
    }

    /// Number of keys in the snapshot.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the snapshot holds no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the keys.
    pub fn keys(&self) -> impl Iterator<Item = &ConfigKey> {
        self.values.keys()
    }

    /// Iterates over key/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&ConfigKey, &ConfigValue)> {
        self.values.iter()
    }

    /// Consumes the snapshot, returning its values.
    pub fn into_map(self) -> HashMap<ConfigKey, ConfigValue> {
        self.values
    }

    /// Returns every key that was added, removed or modified between `self`
    /// and `newer`, sorted.
    pub fn changed_keys(&self, newer: &ConfigSnapshot) -> Vec<ConfigKey> {
        let mut changed: Vec<ConfigKey> = newer
            .values
            .iter()
            .filter(|(key, value)| self.values.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .chain(
                self.values
                    .keys()
                    .filter(|key| !newer.values.contains_key(*key))
                    .cloned(),
            )
            .collect();
        changed.sort();
        changed
    }
}

impl FromIterator<(ConfigKey, ConfigValue)> for ConfigSnapshot {
    fn from_iter<I: IntoIterator<Item = (ConfigKey, ConfigValue)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
