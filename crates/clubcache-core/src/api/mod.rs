//! Remote reader for the club's page database.
//!
//! This module provides the `NotionClient` for querying database containers
//! and their records, plus the `RemoteSource` trait the sync engine is written
//! against so passes can be driven by in-memory fakes in tests.
//!
//! The API uses bearer token authentication with an integration token.

pub mod client;
pub mod error;
pub mod source;

pub use client::NotionClient;
pub use error::ApiError;
pub use source::RemoteSource;
