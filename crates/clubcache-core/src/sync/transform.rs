//! Turning decoded records into published entities, and ordering them.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::models::{Event, Executive, Properties, PropertyError, RawRecord};
use crate::utils::human_readable_date;

use super::error::{property_err, SyncError};

/// Column names of the executives database.
pub mod executive_fields {
    pub const NAME: &str = "Name";
    pub const PRONOUNS: &str = "Pronouns";
    pub const BIO: &str = "Bio";
    pub const ROLES: &str = "Role";
    pub const PRIOR_ROLES: &str = "Prior Roles";
    pub const TERM_START: &str = "Term Start";
    pub const LAST_TERM: &str = "Last Term";
    pub const STATUS: &str = "Status";
    pub const PICTURE: &str = "Candid";

    /// Optional link columns and the platform key they publish under.
    pub const SOCIAL_LINKS: [(&str, &str); 4] = [
        ("LinkedIn", "linkedin"),
        ("GitHub", "github"),
        ("Instagram", "instagram"),
        ("Website", "website"),
    ];
}

/// Column names of the roles database.
pub mod role_fields {
    pub const NAME: &str = "Name";
}

/// Column names of the events database.
pub mod event_fields {
    pub const TITLE: &str = "Title";
    pub const DATE: &str = "Event Date";
    pub const LOCATION: &str = "Location";
    pub const THUMBNAIL: &str = "Thumbnail";
    pub const REGISTRATION_LINK: &str = "Registration Link";
    pub const INFO_LINK: &str = "Info Link";
}

/// Role record ID -> role display name.
#[derive(Debug, Clone, Default)]
pub struct RoleLookup {
    names: HashMap<String, String>,
}

impl RoleLookup {
    /// Build the lookup from a roles listing. Every record is decoded, so a
    /// drifted roles schema fails the pass like any other.
    pub fn from_records(records: &[RawRecord]) -> Result<Self, SyncError> {
        let mut names = HashMap::with_capacity(records.len());
        for record in records {
            let props = record.decode().map_err(property_err(&record.id))?;
            if let Some(name) = props.text(role_fields::NAME).map_err(property_err(&record.id))? {
                names.insert(record.id.clone(), name);
            }
        }
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Map relation IDs to role names, dropping any we cannot resolve.
    pub fn resolve(&self, record_id: &str, ids: &[String]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| match self.names.get(id) {
                Some(name) => Some(name.clone()),
                None => {
                    warn!(record = record_id, role = %id, "Dropping unresolved role reference");
                    None
                }
            })
            .collect()
    }
}

impl FromIterator<(String, String)> for RoleLookup {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

pub fn executive_from_record(
    record: &RawRecord,
    props: &Properties,
    roles: &RoleLookup,
    profile_picture: Option<String>,
) -> Result<Executive, PropertyError> {
    use executive_fields as f;

    let mut social_media_links = BTreeMap::new();
    for (column, platform) in f::SOCIAL_LINKS {
        if let Some(link) = props.optional_text(column)? {
            social_media_links.insert(platform.to_string(), link);
        }
    }

    Ok(Executive {
        name: props.text(f::NAME)?,
        pronouns: props.text(f::PRONOUNS)?,
        profile_picture,
        social_media_links,
        bio: props.text(f::BIO)?,
        roles: roles.resolve(&record.id, props.relation(f::ROLES)?),
        prior_roles: roles.resolve(&record.id, props.relation(f::PRIOR_ROLES)?),
        first_term: props.text(f::TERM_START)?,
        last_term: props.text(f::LAST_TERM)?,
        current_status: props.text(f::STATUS)?,
        id: record.id.clone(),
        last_updated: record.last_edited_time.clone(),
    })
}

pub fn event_from_record(
    record: &RawRecord,
    props: &Properties,
    thumbnail: Option<String>,
) -> Result<Event, PropertyError> {
    use event_fields as f;

    let (start, end) = props.date(f::DATE)?;

    Ok(Event {
        event_name: props.text(f::TITLE)?,
        event_date: human_readable_date(start.as_deref(), end.as_deref()),
        event_start_date: start,
        event_end_date: end,
        location: props.text(f::LOCATION)?,
        thumbnail,
        registration_link: props.text(f::REGISTRATION_LINK)?,
        info_link: props.optional_text(f::INFO_LINK)?,
        id: record.id.clone(),
        last_edited_time: record.last_edited_time.clone(),
    })
}

/// Display bucket of an executive, in publishing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RosterGroup {
    Presidents,
    VicePresidents,
    Directors,
    Other,
}

impl RosterGroup {
    /// Bucket by substring match on the joined role names.
    pub fn of(roles: &[String]) -> Self {
        let joined = roles.join(", ");
        if joined.contains("Vice") {
            RosterGroup::VicePresidents
        } else if joined.contains("President") {
            RosterGroup::Presidents
        } else if joined.contains("Director") || joined.contains("Tech Lead") {
            RosterGroup::Directors
        } else {
            RosterGroup::Other
        }
    }
}

/// Presidents, vice presidents, directors, then everyone else. Names order
/// each bucket, except directors, which sort by first role then name.
pub fn order_executives(executives: Vec<Executive>) -> Vec<Executive> {
    let mut keyed: Vec<(RosterGroup, String, Executive)> = executives
        .into_iter()
        .map(|e| {
            let group = RosterGroup::of(&e.roles);
            let key = match group {
                RosterGroup::Directors => format!(
                    "{}{}",
                    e.roles.first().map(String::as_str).unwrap_or(""),
                    e.display_name()
                ),
                _ => e.display_name().to_string(),
            };
            (group, key, e)
        })
        .collect();

    keyed.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
    keyed.into_iter().map(|(_, _, e)| e).collect()
}

/// Latest start first; events without a start go last. Compares the raw
/// start strings.
pub fn order_events(mut events: Vec<Event>) -> Vec<Event> {
    events.sort_by(|a, b| {
        let a = a.event_start_date.as_deref().unwrap_or("");
        let b = b.event_start_date.as_deref().unwrap_or("");
        b.cmp(a)
    });
    events
}
