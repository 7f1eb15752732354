// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodically re-read configuration file.
//!
//! [`ReloadingFileProvider`] reads a file through any [`ConfigParser`], serves
//! the parsed snapshot and re-reads the file on a fixed interval. A changed
//! file is swapped in as one new snapshot and announced to watchers; a file
//! that cannot be read or parsed is logged and the last good snapshot stays in
//! service.
//!
//! The poll loop is an explicit task: the owner starts it with
//! [`ReloadingFileProvider::spawn`] (or drives [`ReloadingFileProvider::run`]
//! itself) and stops it by cancelling the token.

use super::check_file_size;
use super::publisher::SnapshotCell;
use crate::domain::{ConfigError, ConfigKey, ConfigSnapshot, ConfigValue, Result};
use crate::ports::{ConfigParser, ConfigProvider, SnapshotStream, ValueStream, WatchableProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const PROVIDER_NAME: &str = "reloading-file";

/// Settings for [`ReloadingFileProvider`].
#[derive(Debug, Clone)]
pub struct ReloadOptions {
    /// Time between two reads of the file.
    pub poll_interval: Duration,
}

impl ReloadOptions {
    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
        }
    }
}

/// Watchable provider backed by a file that is re-read periodically.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use stratacfg::adapters::{ReloadOptions, ReloadingFileProvider, YamlParser};
/// use stratacfg::service::ConfigReader;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> stratacfg::domain::Result<()> {
/// let provider = Arc::new(
///     ReloadingFileProvider::new("/etc/myapp/config.yaml", YamlParser::new(), ReloadOptions::default())
///         .await?,
/// );
/// let shutdown = CancellationToken::new();
/// let poller = provider.spawn(shutdown.clone());
///
/// let reader = ConfigReader::builder()
///     .with_watchable_provider(provider)
///     .build()?;
/// # let _ = reader;
///
/// shutdown.cancel();
/// poller.await.ok();
/// # Ok(())
/// # }
/// ```
pub struct ReloadingFileProvider<P> {
    path: PathBuf,
    parser: P,
    options: ReloadOptions,
    cell: SnapshotCell,
}

impl<P: ConfigParser> ReloadingFileProvider<P> {
    /// Reads `path` for the first time.
    ///
    /// Failing to read or parse the file here is an error; later failures are
    /// only logged. A zero poll interval is rejected with
    /// [`ConfigError::ProviderFailure`].
    pub async fn new(path: impl AsRef<Path>, parser: P, options: ReloadOptions) -> Result<Self> {
        if options.poll_interval.is_zero() {
            return Err(ConfigError::provider(
                PROVIDER_NAME,
                "poll interval must be greater than zero",
            ));
        }
        let path = path.as_ref().to_path_buf();
        let snapshot = read_snapshot(&path, &parser).await?;
        tracing::debug!(
            path = %path.display(),
            keys = snapshot.len(),
            "loaded reloading configuration file"
        );
        Ok(Self {
            path,
            parser,
            options,
            cell: SnapshotCell::new(snapshot),
        })
    }

    /// Returns the watched path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the poll interval.
    pub fn poll_interval(&self) -> Duration {
        self.options.poll_interval
    }

    /// Re-reads the file and swaps in the new snapshot if it differs.
    ///
    /// Returns whether anything changed. On error the current snapshot is
    /// left untouched.
    pub async fn reload(&self) -> Result<bool> {
        let snapshot = read_snapshot(&self.path, &self.parser).await?;
        let changed = self.cell.replace(snapshot);
        if changed.is_empty() {
            tracing::trace!(path = %self.path.display(), "configuration file unchanged");
            return Ok(false);
        }
        tracing::debug!(
            path = %self.path.display(),
            changed = ?changed.iter().map(ConfigKey::dotted).collect::<Vec<_>>(),
            "configuration file reloaded"
        );
        Ok(true)
    }

    /// Polls the file until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the file was just read.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(path = %self.path.display(), "configuration file polling stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reload().await {
                        tracing::warn!(
                            path = %self.path.display(),
                            error = %e,
                            "Failed to reload configuration file, keeping last good snapshot"
                        );
                    }
                }
            }
        }
    }
}

impl<P: ConfigParser + 'static> ReloadingFileProvider<P> {
    /// Runs [`run`](Self::run) on a new task.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let provider = Arc::clone(self);
        tokio::spawn(async move { provider.run(cancel).await })
    }
}

#[cfg(feature = "yaml")]
impl ReloadingFileProvider<super::YamlParser> {
    /// Creates a provider for a YAML file.
    pub async fn yaml(path: impl AsRef<Path>, options: ReloadOptions) -> Result<Self> {
        Self::new(path, super::YamlParser::new(), options).await
    }
}

impl<P: ConfigParser> ConfigProvider for ReloadingFileProvider<P> {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn lookup(&self, key: &ConfigKey) -> Result<Option<ConfigValue>> {
        Ok(self.cell.lookup(key))
    }
}

impl<P: ConfigParser> WatchableProvider for ReloadingFileProvider<P> {
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

async fn read_snapshot<P: ConfigParser>(path: &Path, parser: &P) -> Result<ConfigSnapshot> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| file_error(path, "Failed to read file metadata", e))?;
    check_file_size(PROVIDER_NAME, metadata.len())?;

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| file_error(path, "Failed to read configuration file", e))?;
    Ok(ConfigSnapshot::new(parser.parse(&content)?))
}

fn file_error(path: &Path, message: &str, e: std::io::Error) -> ConfigError {
    ConfigError::ProviderFailure {
        provider: PROVIDER_NAME.to_string(),
        message: format!("{}: {}", message, path.display()),
        source: Some(Box::new(e)),
    }
}
