use async_trait::async_trait;

use crate::models::{ContainerMetadata, RawRecord};

use super::ApiError;

/// Read-only view of the remote page database.
///
/// Any error returned here aborts the current pass before a snapshot is
/// published.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch the lightweight container metadata for a database.
    async fn fetch_container_metadata(&self, database_id: &str) -> Result<ContainerMetadata, ApiError>;

    /// List every record in a database, in remote order.
    async fn fetch_records(&self, database_id: &str) -> Result<Vec<RawRecord>, ApiError>;

    /// Download the bytes of an attached file.
    async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError>;
}
