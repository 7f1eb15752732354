// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapters layer containing configuration provider implementations.
//!
//! This module contains concrete implementations of the provider traits
//! defined in the ports layer. Each adapter reads configuration from one kind
//! of source; the watchable ones publish their snapshots through
//! [`SnapshotCell`].

#[cfg(any(feature = "yaml", feature = "reload"))]
use crate::domain::{ConfigError, Result};

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "env")]
pub mod env_var;
pub mod in_memory;
pub mod publisher;
#[cfg(feature = "reload")]
pub mod reloading;
#[cfg(feature = "yaml")]
pub mod yaml_file;

// Re-export adapters based on feature flags
#[cfg(feature = "cli")]
pub use cli::CommandLineProvider;
#[cfg(feature = "env")]
pub use env_var::{EnvVarOptions, EnvVarProvider};
pub use in_memory::{InMemoryProvider, MutableInMemoryProvider};
pub use publisher::SnapshotCell;
#[cfg(feature = "reload")]
pub use reloading::{ReloadOptions, ReloadingFileProvider};
#[cfg(feature = "yaml")]
pub use yaml_file::{YamlFileProvider, YamlParser};

/// Maximum allowed size for configuration files (10MB)
/// This prevents denial of service attacks via extremely large files
#[cfg(any(feature = "yaml", feature = "reload"))]
pub(crate) const MAX_CONFIG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Rejects files larger than [`MAX_CONFIG_FILE_SIZE`].
#[cfg(any(feature = "yaml", feature = "reload"))]
pub(crate) fn check_file_size(provider: &str, len: u64) -> Result<()> {
    if len > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::provider(
            provider,
            format!(
                "Configuration file too large: {} bytes (max {} bytes)",
                len, MAX_CONFIG_FILE_SIZE
            ),
        ));
    }
    Ok(())
}
