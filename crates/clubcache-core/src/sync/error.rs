//! Error types for sync passes.

use std::path::PathBuf;

use thiserror::Error;

use crate::api::ApiError;
use crate::models::PropertyError;

/// Everything that can abort a pass. Soft media failures (unknown
/// extensions, recompression errors) are logged instead and never surface
/// here.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Listing, metadata or download failure. Retried on the next tick.
    #[error("remote source error: {0}")]
    Remote(#[from] ApiError),

    /// A record could not be interpreted; needs human attention.
    #[error("record {record}: {source}")]
    Property {
        record: String,
        #[source]
        source: PropertyError,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading or publishing a snapshot failed.
    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// True when the remote schema no longer matches what we decode.
    pub fn is_schema_drift(&self) -> bool {
        matches!(
            self,
            SyncError::Property {
                source: PropertyError::SchemaDrift { .. },
                ..
            }
        )
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Attach the offending record ID to a property error.
pub(crate) fn property_err(record: &str) -> impl FnOnce(PropertyError) -> SyncError + '_ {
    move |source| SyncError::Property {
        record: record.to_string(),
        source,
    }
}
