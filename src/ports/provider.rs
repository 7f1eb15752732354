// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration provider trait definitions.
//!
//! This module defines the two provider capabilities. Every source implements
//! [`ConfigProvider`] (point-in-time lookup); sources that can observe their own
//! changes additionally implement [`WatchableProvider`].

use crate::domain::{ConfigKey, ConfigSnapshot, ConfigValue, Result};
use futures::stream::BoxStream;
use std::sync::Arc;

/// Stream of the current value of one key, then every change to it.
///
/// `Ok(None)` means the provider currently has no value for the key. `Err`
/// items are reserved for provider-fatal conditions.
pub type ValueStream = BoxStream<'static, Result<Option<ConfigValue>>>;

/// Stream of whole provider snapshots, starting with the current one.
pub type SnapshotStream = BoxStream<'static, Result<Arc<ConfigSnapshot>>>;

/// Snapshot-readable configuration provider.
///
/// `lookup` is synchronous and must never block on I/O: providers that read
/// resources do so ahead of time and answer from their current snapshot.
///
/// # Examples
///
/// ```rust
/// use stratacfg::domain::{ConfigKey, ConfigValue, Result};
/// use stratacfg::ports::ConfigProvider;
///
/// struct Fixed;
///
/// impl ConfigProvider for Fixed {
///     fn name(&self) -> &str {
///         "fixed"
///     }
///
///     fn lookup(&self, key: &ConfigKey) -> Result<Option<ConfigValue>> {
///         Ok((key.dotted() == "app.name").then(|| ConfigValue::from("demo")))
///     }
/// }
///
/// assert!(Fixed.lookup_str("app.name").unwrap().is_some());
/// ```
pub trait ConfigProvider: Send + Sync {
    /// Returns the name of this provider, used in diagnostics.
    fn name(&self) -> &str;

    /// Returns the value for `key` in the provider's current state.
    ///
    /// `Ok(None)` means the provider has no opinion about the key.
    fn lookup(&self, key: &ConfigKey) -> Result<Option<ConfigValue>>;

    /// Convenience wrapper parsing a dotted key.
    fn lookup_str(&self, key: &str) -> Result<Option<ConfigValue>> {
        self.lookup(&ConfigKey::from(key))
    }
}

/// A provider whose values can change and be observed.
///
/// Each `watch` call returns an independent stream that first yields the
/// current value and then every subsequent change. Streams end only when the
/// provider itself shuts down.
pub trait WatchableProvider: ConfigProvider {
    /// Subscribes to one key.
    fn watch(&self, key: &ConfigKey) -> Result<ValueStream>;

    /// Returns the current snapshot.
    fn snapshot(&self) -> Arc<ConfigSnapshot>;

    /// Subscribes to whole snapshots.
    fn watch_snapshot(&self) -> Result<SnapshotStream>;
}
