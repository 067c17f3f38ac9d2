use serde::{Deserialize, Serialize};

use super::Entity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Event {
    pub event_name: Option<String>,
    /// Human-readable range, always derived from the start/end pair.
    pub event_date: String,
    pub event_start_date: Option<String>,
    pub event_end_date: Option<String>,
    pub location: Option<String>,
    pub thumbnail: Option<String>,
    pub registration_link: Option<String>,
    #[serde(default)]
    pub info_link: Option<String>,

    pub id: String,
    pub last_edited_time: String,
}

impl Entity for Event {
    fn id(&self) -> &str {
        &self.id
    }

    fn last_edited(&self) -> &str {
        &self.last_edited_time
    }

    fn media_url(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
}
