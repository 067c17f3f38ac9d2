use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Entity;

/// Status value marking an executive who no longer holds a role.
pub const RETIRED_STATUS: &str = "Retired";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Executive {
    pub name: Option<String>,
    pub pronouns: Option<String>,
    pub profile_picture: Option<String>,
    /// Platform name (e.g. `linkedin`) -> profile URL.
    #[serde(default)]
    pub social_media_links: BTreeMap<String, String>,
    pub bio: Option<String>,

    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub prior_roles: Vec<String>,
    pub first_term: Option<String>,
    pub last_term: Option<String>,
    pub current_status: Option<String>,

    pub id: String,
    pub last_updated: String,
}

impl Executive {
    pub fn is_retired(&self) -> bool {
        self.current_status.as_deref() == Some(RETIRED_STATUS)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

impl Entity for Executive {
    fn id(&self) -> &str {
        &self.id
    }

    fn last_edited(&self) -> &str {
        &self.last_updated
    }

    fn media_url(&self) -> Option<&str> {
        self.profile_picture.as_deref()
    }
}
