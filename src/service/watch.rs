// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live watches over a [`ConfigReader`].
//!
//! A watch subscribes to the key in every provider, combines the per-provider
//! streams with [`combine_latest`] and projects every tuple through the same
//! first-value-wins rule as [`ConfigReader::get`].

use super::reader::{ConfigReader, ProviderEntry};
use crate::domain::{ConfigKey, ConfigValue, FromConfigValue, Result};
use crate::stream::{combine_latest, CombineLatest, SourceStream};
use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

type Resolved = Option<ConfigValue>;

/// Stream of the resolved value of one key.
///
/// The first item is the value at subscription time. Afterwards an item is
/// emitted whenever the resolved value changes; updates that do not change
/// the resolved value (for example a change in a shadowed provider) are
/// suppressed. `Ok(None)` means no provider has a value.
///
/// The stream ends when a watchable provider shuts down and yields a single
/// `ConfigError::UpstreamFailure` when one fails.
pub struct WatchStream {
    inner: Inner,
    last: Option<Resolved>,
}

enum Inner {
    Combined(CombineLatest<Resolved>),
    /// A reader without providers: `None` once, then silence.
    Empty { emitted: bool },
}

impl WatchStream {
    fn new(sources: Vec<SourceStream<Resolved>>) -> Self {
        let inner = if sources.is_empty() {
            Inner::Empty { emitted: false }
        } else {
            Inner::Combined(combine_latest(sources))
        };
        Self { inner, last: None }
    }
}

impl Stream for WatchStream {
    type Item = Result<Resolved>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            let tuple = match &mut this.inner {
                Inner::Empty { emitted } => {
                    if *emitted {
                        return Poll::Pending;
                    }
                    *emitted = true;
                    return Poll::Ready(Some(Ok(None)));
                }
                Inner::Combined(combined) => match combined.poll_next_unpin(cx) {
                    Poll::Ready(Some(Ok(tuple))) => tuple,
                    Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                    Poll::Ready(None) => return Poll::Ready(None),
                    Poll::Pending => return Poll::Pending,
                },
            };

            let resolved = tuple.into_iter().flatten().next();
            if this.last.as_ref() == Some(&resolved) {
                continue;
            }
            this.last = Some(resolved.clone());
            return Poll::Ready(Some(Ok(resolved)));
        }
    }
}

impl ConfigReader {
    /// Watches `key` across all providers.
    ///
    /// Watchable providers contribute every change; static providers
    /// contribute their value at subscription time only.
    ///
    /// Pulling starts on the first poll and runs on the ambient tokio
    /// runtime.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use futures::StreamExt;
    /// use std::sync::Arc;
    /// use stratacfg::adapters::MutableInMemoryProvider;
    /// use stratacfg::domain::ConfigValue;
    /// use stratacfg::service::ConfigReader;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> stratacfg::domain::Result<()> {
    /// let live = Arc::new(MutableInMemoryProvider::new("live"));
    /// let reader = ConfigReader::builder()
    ///     .with_watchable_provider(live.clone())
    ///     .build()?;
    ///
    /// let mut watch = reader.watch("feature.enabled")?;
    /// assert_eq!(watch.next().await.transpose()?, Some(None));
    ///
    /// live.set("feature.enabled", true);
    /// assert_eq!(watch.next().await.transpose()?, Some(Some(ConfigValue::Bool(true))));
    /// # Ok(())
    /// # }
    /// ```
    pub fn watch(&self, key: impl Into<ConfigKey>) -> Result<WatchStream> {
        self.watch_key(&self.absolute_key(key))
    }

    /// Watches `key` and converts every resolved value to `T`.
    ///
    /// A value that cannot be converted is reported as an error item; the
    /// stream keeps running.
    pub fn watch_as<T>(
        &self,
        key: impl Into<ConfigKey>,
    ) -> Result<BoxStream<'static, Result<Option<T>>>>
    where
        T: FromConfigValue + Send + 'static,
    {
        let key = self.absolute_key(key);
        let watch = self.watch_key(&key)?;
        Ok(watch
            .map(move |item| item.and_then(|value| value.map(|v| v.coerce(&key)).transpose()))
            .boxed())
    }

    fn watch_key(&self, key: &ConfigKey) -> Result<WatchStream> {
        let sources = self
            .providers()
            .iter()
            .map(|entry| subscribe(entry, key))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(key = %key, sources = sources.len(), "watching configuration key");
        Ok(WatchStream::new(sources))
    }
}

fn subscribe(entry: &ProviderEntry, key: &ConfigKey) -> Result<SourceStream<Resolved>> {
    match entry {
        ProviderEntry::Watchable(provider) => provider.watch(key),
        ProviderEntry::Static(provider) => {
            let current = provider.lookup(key);
            Ok(stream::once(future::ready(current))
                .chain(stream::pending())
                .boxed())
        }
    }
}
