// SPDX-License-Identifier: MIT OR Apache-2.0

//! Atomic snapshot publication for watchable providers.
//!
//! [`SnapshotCell`] holds the current snapshot of a provider in an
//! [`ArcSwap`] and announces every swap on a `tokio::sync::watch` channel.
//! Readers therefore see a whole old or a whole new snapshot, and each swap
//! reaches subscribers as a single update.

use crate::domain::{ConfigKey, ConfigSnapshot, ConfigValue};
use crate::ports::{SnapshotStream, ValueStream};
use arc_swap::ArcSwap;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Current snapshot of a provider plus its change channel.
pub struct SnapshotCell {
    current: ArcSwap<ConfigSnapshot>,
    sender: watch::Sender<Arc<ConfigSnapshot>>,
    /// Serializes writers so swaps and announcements happen in the same order.
    writer: Mutex<()>,
}

impl SnapshotCell {
    /// Creates a cell holding `initial`.
    pub fn new(initial: ConfigSnapshot) -> Self {
        let initial = Arc::new(initial);
        let (sender, _) = watch::channel(Arc::clone(&initial));
        Self {
            current: ArcSwap::new(initial),
            sender,
            writer: Mutex::new(()),
        }
    }

    /// Returns the current snapshot.
    pub fn load(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Looks `key` up in the current snapshot.
    pub fn lookup(&self, key: &ConfigKey) -> Option<ConfigValue> {
        self.current.load().get(key).cloned()
    }

    /// Swaps in `next` and notifies subscribers.
    ///
    /// Returns the keys that differ between the old and new snapshot. Nothing
    /// is published when that list is empty.
    pub fn replace(&self, next: ConfigSnapshot) -> Vec<ConfigKey> {
        let _writer = self.writer.lock();
        self.publish(next)
    }

    /// Derives a new snapshot from the current values and swaps it in.
    pub fn update<F>(&self, f: F) -> Vec<ConfigKey>
    where
        F: FnOnce(&mut HashMap<ConfigKey, ConfigValue>),
    {
        let _writer = self.writer.lock();
        let mut values = ConfigSnapshot::clone(&self.current.load()).into_map();
        f(&mut values);
        self.publish(ConfigSnapshot::new(values))
    }

    fn publish(&self, next: ConfigSnapshot) -> Vec<ConfigKey> {
        let changed = self.current.load().changed_keys(&next);
        if changed.is_empty() {
            return changed;
        }
        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        self.sender.send_replace(next);
        changed
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Streams the value of `key`: the current one first, then each change.
    pub fn watch_key(&self, key: &ConfigKey) -> ValueStream {
        let state = KeyWatch {
            rx: self.sender.subscribe(),
            key: key.clone(),
            last: None,
        };
        stream::unfold(state, |mut state| async move {
            loop {
                if state.last.is_some() && state.rx.changed().await.is_err() {
                    return None;
                }
                let value = state.rx.borrow_and_update().get(&state.key).cloned();
                if state.last.as_ref() == Some(&value) {
                    continue;
                }
                state.last = Some(value.clone());
                return Some((Ok(value), state));
            }
        })
        .boxed()
    }

    /// Streams whole snapshots: the current one first, then each swap.
    pub fn watch_all(&self) -> SnapshotStream {
        let rx = self.sender.subscribe();
        stream::unfold((rx, true), |(mut rx, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let snapshot = Arc::clone(&rx.borrow_and_update());
            Some((Ok(snapshot), (rx, false)))
        })
        .boxed()
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new(ConfigSnapshot::empty())
    }
}

struct KeyWatch {
    rx: watch::Receiver<Arc<ConfigSnapshot>>,
    key: ConfigKey,
    last: Option<Option<ConfigValue>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, i64)]) -> ConfigSnapshot {
        pairs
            .iter()
            .map(|(k, v)| (ConfigKey::from(*k), ConfigValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_replace_reports_changed_keys() {
        let cell = SnapshotCell::new(snapshot(&[("a", 1), ("b", 2)]));
        let changed = cell.replace(snapshot(&[("a", 1), ("b", 3), ("c", 4)]));
        assert_eq!(changed, vec![ConfigKey::from("b"), ConfigKey::from("c")]);
        assert_eq!(cell.lookup(&ConfigKey::from("b")), Some(ConfigValue::Int(3)));
    }

    #[test]
    fn test_replace_identical_snapshot_is_silent() {
        let cell = SnapshotCell::new(snapshot(&[("a", 1)]));
        let before = cell.load();
        assert!(cell.replace(snapshot(&[("a", 1)])).is_empty());
        assert!(Arc::ptr_eq(&before, &cell.load()));
    }

    #[test]
    fn test_update_modifies_current_values() {
        let cell = SnapshotCell::default();
        cell.update(|values| {
            values.insert(ConfigKey::from("x"), ConfigValue::from(1i64));
        });
        cell.update(|values| {
            values.insert(ConfigKey::from("y"), ConfigValue::from(2i64));
        });
        assert_eq!(cell.load().len(), 2);
    }

    #[tokio::test]
    async fn test_watch_key_emits_current_then_changes() {
        let cell = SnapshotCell::new(snapshot(&[("a", 1)]));
        let mut watch = cell.watch_key(&ConfigKey::from("a"));

        assert_eq!(watch.next().await.unwrap().unwrap(), Some(ConfigValue::Int(1)));

        // A change to another key is not an update for "a".
        cell.replace(snapshot(&[("a", 1), ("b", 1)]));
        cell.replace(snapshot(&[("b", 1)]));
        assert_eq!(watch.next().await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_watch_ends_when_cell_dropped() {
        let cell = SnapshotCell::new(snapshot(&[("a", 1)]));
        let mut values = cell.watch_key(&ConfigKey::from("a"));
        let mut snapshots = cell.watch_all();
        assert_eq!(cell.subscriber_count(), 2);

        assert!(values.next().await.is_some());
        assert!(snapshots.next().await.is_some());
        drop(cell);
        assert!(values.next().await.is_none());
        assert!(snapshots.next().await.is_none());
    }
}
