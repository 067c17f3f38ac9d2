//! Synchronization of remote databases into published snapshots.
//!
//! - `detector`: container- and record-level change detection
//! - `transform`: record -> entity mapping and publishing order
//! - `media`: image download, recompression and purging
//! - `pipeline`: per-domain pass definitions
//! - `engine`: the pass itself

pub mod detector;
pub mod engine;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod transform;

#[cfg(test)]
pub(crate) mod fixtures;

pub use engine::{NoChangeTier, PassOutcome, SyncEngine};
pub use error::SyncError;
pub use media::{ImageCompressor, MediaSync, ResizingCompressor};
pub use pipeline::{EventsPipeline, ExecutivesPipeline, Pipeline};
pub use transform::RoleLookup;
