// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::env;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stratacfg::domain::{ConfigError, ConfigKey, ConfigValue, Result};
use stratacfg::ports::ConfigProvider;

/// A provider with fixed values that counts lookups and can be told to fail.
#[derive(Debug, Clone)]
pub struct MockProvider {
    name: String,
    values: HashMap<ConfigKey, ConfigValue>,
    failing: bool,
    lookups: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
            failing: false,
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_value(mut self, key: &str, value: impl Into<ConfigValue>) -> Self {
        self.values.insert(ConfigKey::from(key), value.into());
        self
    }

    /// Every lookup fails with `ProviderFailure`.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Lookups served so far, shared between clones.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ConfigProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, key: &ConfigKey) -> Result<Option<ConfigValue>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(ConfigError::provider(self.name.clone(), "mock lookup failure"));
        }
        Ok(self.values.get(key).cloned())
    }
}

/// Sets process variables and removes them again on drop.
pub struct EnvGuard {
    keys: Vec<String>,
}

impl EnvGuard {
    pub fn new() -> Self {
        EnvGuard { keys: Vec::new() }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        env::set_var(key, value);
        self.keys.push(key.to_string());
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.keys {
            env::remove_var(key);
        }
    }
}

/// Writes `content` to a temporary `.yaml` file, deleted on drop.
pub fn create_temp_yaml(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    write!(file, "{}", content).unwrap();
    file.flush().unwrap();
    file
}

/// Three providers that all define `key1`, highest priority first.
pub fn precedence_providers() -> (MockProvider, MockProvider, MockProvider) {
    let high = MockProvider::new("high")
        .with_value("key1", "from_high")
        .with_value("key4", "high_value");

    let medium = MockProvider::new("medium")
        .with_value("key1", "from_medium")
        .with_value("key3", "medium_value");

    let low = MockProvider::new("low")
        .with_value("key1", "from_low")
        .with_value("key2", "low_value");

    (high, medium, low)
}
