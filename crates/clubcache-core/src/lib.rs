//! Core library for the club cache service.
//!
//! Keeps local JSON snapshots of the club's executive roster and event
//! listings (plus their images) in step with a remote page database, and
//! publishes each snapshot atomically so readers never see a partial one.

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod sync;
pub mod utils;

pub use api::{ApiError, NotionClient, RemoteSource};
pub use cache::CacheManager;
pub use config::Config;
pub use models::{Domain, Event, Executive, Snapshot, SyncMetadata};
pub use sync::{
    EventsPipeline, ExecutivesPipeline, PassOutcome, Pipeline, ResizingCompressor, SyncEngine, SyncError,
};
