use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two independently synchronized data domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Executives,
    Events,
}

impl Domain {
    pub const ALL: [Domain; 2] = [Domain::Executives, Domain::Events];

    /// File name of the published snapshot under the `json/` directory.
    pub fn snapshot_file(&self) -> &'static str {
        match self {
            Domain::Executives => "execs_export.json",
            Domain::Events => "events_export.json",
        }
    }

    /// Directory (under the data root) holding this domain's media files.
    pub fn media_dir(&self) -> &'static str {
        match self {
            Domain::Executives => "exec_images",
            Domain::Events => "event_images",
        }
    }

    /// Public route prefix media files are served from.
    pub fn media_route(&self) -> &'static str {
        match self {
            Domain::Executives => "executives/images",
            Domain::Events => "events/images",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Domain::Executives => write!(f, "executives"),
            Domain::Events => write!(f, "events"),
        }
    }
}

/// An entity that can be published in a snapshot.
pub trait Entity {
    /// Opaque remote record ID.
    fn id(&self) -> &str;
    /// Remote last-edited timestamp the entity was built from.
    fn last_edited(&self) -> &str;
    /// Public URL of the entity's media file, if it has one.
    fn media_url(&self) -> Option<&str>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SyncMetadata {
    /// Remote container ID -> container last-edited timestamp.
    pub containers: BTreeMap<String, String>,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub last_checked: DateTime<Utc>,
}

impl SyncMetadata {
    pub fn new(containers: BTreeMap<String, String>) -> Self {
        Self {
            containers,
            last_checked: Utc::now(),
        }
    }

    /// Copy of this metadata with only the poll time moved forward.
    pub fn touched(&self) -> Self {
        Self {
            containers: self.containers.clone(),
            last_checked: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.last_checked).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// The atomically published unit: metadata plus the ordered entity list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot<E> {
    pub metadata: SyncMetadata,
    pub entities: Vec<E>,
}

impl<E: Entity> Snapshot<E> {
    pub fn find(&self, id: &str) -> Option<&E> {
        self.entities.iter().find(|e| e.id() == id)
    }
}
