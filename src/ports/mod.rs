// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ports layer containing trait definitions.
//!
//! This module contains the trait definitions (ports) that define the interfaces
//! between the resolution engine and its collaborators. These traits are
//! implemented by adapters in the adapters layer.

pub mod parser;
pub mod provider;

// Re-export commonly used types
pub use parser::ConfigParser;
pub use provider::{ConfigProvider, SnapshotStream, ValueStream, WatchableProvider};
