// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain layer containing core business logic and types.
//!
//! This module contains the core domain types for the configuration crate:
//! segmented keys, typed values with explicit coercion, immutable snapshots and
//! the error type. It is independent of any provider or runtime concern.

pub mod config_key;
pub mod config_value;
pub mod errors;
pub mod snapshot;

// Re-export commonly used types
pub use config_key::ConfigKey;
pub use config_value::{ConfigValue, FromConfigValue, ValueKind};
pub use errors::{ConfigError, Result};
pub use snapshot::ConfigSnapshot;
