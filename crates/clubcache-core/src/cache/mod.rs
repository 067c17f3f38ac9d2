//! Local snapshot storage.
//!
//! This module provides the `CacheManager`, the sole writer of the published
//! snapshots the HTTP layer reads. Snapshots are JSON documents holding sync
//! metadata plus the ordered entity list, and are published by writing a
//! staging file and renaming it into place.

pub mod manager;

pub use manager::{CacheManager, StagedSnapshot};
