// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the configuration crate.
//!
//! This module defines the error types that can occur when resolving, coercing or
//! watching configuration values. All errors use `thiserror` for proper error
//! handling and conversion.
//!
//! A key that no provider defines is not an error: lookups return `Ok(None)`.

use crate::domain::config_value::ValueKind;
use thiserror::Error;

/// The main error type for configuration operations.
///
/// It is marked as `#[non_exhaustive]` to allow for future additions without
/// breaking backwards compatibility.
///
/// # Examples
///
/// ```
/// use stratacfg::domain::ConfigError;
///
/// fn require_host() -> Result<String, ConfigError> {
///     Err(ConfigError::ConfigKeyNotFound {
///         key: "database.host".to_string(),
///     })
/// }
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required configuration key was not defined by any provider.
    #[error("Configuration key not found: {key}")]
    ConfigKeyNotFound {
        /// The key that was not found
        key: String,
    },

    /// A key could not be constructed.
    #[error("Invalid configuration key '{key}': {message}")]
    InvalidKey {
        /// The offending key text
        key: String,
        /// Why the key was rejected
        message: String,
    },

    /// A present value could not be converted to the requested type.
    #[error("Cannot convert configuration value for key '{key}' from {found} to {requested}")]
    Coercion {
        /// The key being converted
        key: String,
        /// The kind of the stored value
        found: ValueKind,
        /// The requested Rust type
        requested: &'static str,
        /// The underlying parse error, if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A provider could not complete a lookup or watch.
    #[error("Configuration provider '{provider}' failed: {message}")]
    ProviderFailure {
        /// The name of the provider that failed
        provider: String,
        /// The error message
        message: String,
        /// The underlying error, if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to parse a configuration file or value.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// The error message
        message: String,
        /// The underlying parsing error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// One of the streams feeding a combined watch failed.
    ///
    /// Delivered exactly once to the watch consumer; the watch ends afterwards.
    #[error("Upstream {index} of a combined watch failed: {source}")]
    UpstreamFailure {
        /// Position of the failing stream
        index: usize,
        /// The error reported by that stream
        source: Box<ConfigError>,
    },

    /// The watch machinery itself could not run.
    #[error("Configuration watcher error: {message}")]
    WatcherError {
        /// The error message
        message: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An I/O error occurred while reading configuration.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates a `ProviderFailure` without an underlying cause.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::ProviderFailure {
            provider: provider.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Returns `true` for coercion failures.
    pub fn is_coercion(&self) -> bool {
        matches!(self, ConfigError::Coercion { .. })
    }
}

/// A specialized Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
