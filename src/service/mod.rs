// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service layer: key resolution and live watches.
//!
//! [`ConfigReader`] is the main entry point for reading configuration. Its
//! `watch` family lives in the `watch` module.

pub mod reader;
pub mod watch;

// Re-export commonly used types
pub use reader::{ConfigReader, ConfigReaderBuilder, ProviderEntry};
pub use watch::WatchStream;
