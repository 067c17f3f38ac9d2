//! Data models for the club cache.
//!
//! This module contains:
//!
//! - `RawRecord`, `PropertyValue`, `Properties`: remote records and their
//!   decoded property blocks
//! - `Executive`, `Event`: the published domain entities
//! - `Snapshot`, `SyncMetadata`, `Domain`: the atomically published container

pub mod event;
pub mod executive;
pub mod record;
pub mod snapshot;

pub use event::Event;
pub use executive::{Executive, RETIRED_STATUS};
pub use record::{ContainerMetadata, FileRef, Properties, PropertyError, PropertyValue, RawRecord};
pub use snapshot::{Domain, Entity, Snapshot, SyncMetadata};
