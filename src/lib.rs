// SPDX-License-Identifier: MIT OR Apache-2.0

//! A layered configuration reader with live watches.
//!
//! This crate resolves configuration keys against an ordered list of
//! providers (command line, environment, files, in-memory values, ...). The
//! first provider that defines a key wins. Values are typed and converted
//! explicitly; a value that cannot be converted is an error, never a silent
//! default.
//!
//! On top of point-in-time lookups, any key can be watched: the reader
//! subscribes to every provider, merges their updates and emits the resolved
//! value whenever it changes.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain Layer**: Core types (`ConfigKey`, `ConfigValue`, `ConfigSnapshot`, errors)
//! - **Ports**: Trait definitions (`ConfigProvider`, `WatchableProvider`, `ConfigParser`)
//! - **Stream**: The N-ary combine-latest combinator behind watches
//! - **Adapters**: Providers for specific sources (env vars, CLI, YAML, reloading files)
//! - **Service**: `ConfigReader`, which resolves and watches keys
//!
//! # Feature Flags
//!
//! - `yaml`: Enable YAML file support (default)
//! - `env`: Enable environment variable support, including `.env` files (default)
//! - `cli`: Enable command-line argument support (default)
//! - `reload`: Enable the periodically re-read file provider
//! - `full`: Enable all features
//!
//! # Quick Start
//!
//! ```rust
//! use stratacfg::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let reader = ConfigReader::builder()
//!     .with_cli_args(vec!["prog", "--http.port", "9090"])
//!     .with_env_prefix("MYAPP_")
//!     .with_provider(InMemoryProvider::new("defaults", [("http.port", 8080i64)]))
//!     .build()?;
//!
//! let port: u16 = reader.require("http.port")?;
//! assert_eq!(port, 9090);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;
pub mod stream;

/// Commonly used types and traits.
///
/// This module re-exports the most commonly used types and traits for convenient access.
pub mod prelude {
    pub use crate::adapters::{InMemoryProvider, MutableInMemoryProvider};
    pub use crate::domain::{
        ConfigError, ConfigKey, ConfigSnapshot, ConfigValue, FromConfigValue, Result, ValueKind,
    };
    pub use crate::ports::{ConfigParser, ConfigProvider, WatchableProvider};
    pub use crate::service::{ConfigReader, ConfigReaderBuilder, WatchStream};

    // Re-export adapters based on feature flags
    #[cfg(feature = "cli")]
    pub use crate::adapters::CommandLineProvider;
    #[cfg(feature = "env")]
    pub use crate::adapters::{EnvVarOptions, EnvVarProvider};
    #[cfg(feature = "reload")]
    pub use crate::adapters::{ReloadOptions, ReloadingFileProvider};
    #[cfg(feature = "yaml")]
    pub use crate::adapters::{YamlFileProvider, YamlParser};
}
