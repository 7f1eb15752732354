// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stream combinators used by the watch engine.

pub mod combine_latest;

pub use combine_latest::{combine_latest, CombineLatest, SourceStream};
