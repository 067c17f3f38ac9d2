//! Change detection for a pass.
//!
//! Two tiers: the container tier compares database-level timestamps against
//! the prior snapshot's metadata, and the record tier compares each record's
//! last-edited timestamp against the cached entity with the same ID.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{Entity, RawRecord, SyncMetadata};

/// True when every container timestamp matches what the prior snapshot saw.
///
/// With no prior snapshot there is nothing to compare against, so this is
/// always false.
pub fn containers_unchanged(prior: Option<&SyncMetadata>, current: &BTreeMap<String, String>) -> bool {
    prior.is_some_and(|meta| &meta.containers == current)
}

/// How a visible record relates to the cache.
#[derive(Debug, PartialEq)]
pub enum RecordState<'a, E> {
    /// No cached entity with this ID.
    New,
    /// Cached, but the record has been edited since.
    Changed(&'a E),
    /// Cached and untouched since.
    Unchanged(&'a E),
}

impl<'a, E> RecordState<'a, E> {
    /// Stale records keep their cached media.
    pub fn is_stale(&self) -> bool {
        matches!(self, RecordState::Unchanged(_))
    }

    pub fn cached(&self) -> Option<&'a E> {
        match self {
            RecordState::New => None,
            RecordState::Changed(e) | RecordState::Unchanged(e) => Some(e),
        }
    }
}

#[derive(Debug)]
pub struct Classified<'a, E> {
    /// Position of the record in the listing.
    pub index: usize,
    pub record: &'a RawRecord,
    pub state: RecordState<'a, E>,
}

/// Result of comparing a fresh listing against the cached entities.
#[derive(Debug)]
pub struct ChangeSet<'a, E> {
    /// Visible records in listing order.
    pub live: Vec<Classified<'a, E>>,
    /// Cached IDs that will not appear in the next snapshot.
    pub removed: Vec<String>,
    /// Cached IDs that no longer exist upstream at all. Their media is
    /// deleted once the next snapshot is published.
    pub purged: Vec<String>,
}

impl<E> ChangeSet<'_, E> {
    /// New or edited visible records.
    pub fn updates(&self) -> usize {
        self.live.iter().filter(|c| !c.state.is_stale()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.updates() == 0 && self.removed.is_empty()
    }
}

/// Classify every visible record and collect the cached IDs that dropped out.
///
/// Trashed or archived records are left out of `live` and count as removed
/// when cached, but they still exist upstream so their media is kept.
pub fn classify<'a, E: Entity>(cached: &'a [E], records: &'a [RawRecord]) -> ChangeSet<'a, E> {
    let by_id: HashMap<&str, &E> = cached.iter().map(|e| (e.id(), e)).collect();

    let live: Vec<Classified<'a, E>> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.is_hidden())
        .map(|(index, record)| {
            let state = match by_id.get(record.id.as_str()) {
                None => RecordState::New,
                Some(e) if e.last_edited() == record.last_edited_time => RecordState::Unchanged(*e),
                Some(e) => RecordState::Changed(*e),
            };
            Classified { index, record, state }
        })
        .collect();

    let live_ids: HashSet<&str> = live.iter().map(|c| c.record.id.as_str()).collect();
    let listed_ids: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();

    let removed = cached
        .iter()
        .map(Entity::id)
        .filter(|id| !live_ids.contains(id))
        .map(str::to_string)
        .collect();
    let purged = cached
        .iter()
        .map(Entity::id)
        .filter(|id| !listed_ids.contains(id))
        .map(str::to_string)
        .collect();

    ChangeSet { live, removed, purged }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[derive(Debug, PartialEq)]
    struct Cached {
        id: &'static str,
        edited: &'static str,
    }

    impl Entity for Cached {
        fn id(&self) -> &str {
            self.id
        }

        fn last_edited(&self) -> &str {
            self.edited
        }

        fn media_url(&self) -> Option<&str> {
            None
        }
    }

    fn raw(id: &str, edited: &str, hidden: bool) -> RawRecord {
        RawRecord {
            id: id.to_string(),
            last_edited_time: edited.to_string(),
            archived: hidden,
            in_trash: false,
            properties: Default::default(),
        }
    }

    fn containers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_containers_unchanged() {
        let meta = SyncMetadata {
            containers: containers(&[("db", "t1"), ("roles", "t2")]),
            last_checked: Utc::now(),
        };
        assert!(containers_unchanged(Some(&meta), &containers(&[("db", "t1"), ("roles", "t2")])));
        assert!(!containers_unchanged(Some(&meta), &containers(&[("db", "t1"), ("roles", "t3")])));
        assert!(!containers_unchanged(Some(&meta), &containers(&[("db", "t1")])));
        assert!(!containers_unchanged(None, &containers(&[("db", "t1")])));
    }

    #[test]
    fn test_classify_states() {
        let cached = vec![
            Cached { id: "a", edited: "t1" },
            Cached { id: "b", edited: "t1" },
        ];
        let records = vec![raw("a", "t1", false), raw("b", "t2", false), raw("c", "t1", false)];

        let changes = classify(&cached, &records);

        assert_eq!(changes.live.len(), 3);
        assert_eq!(changes.live[0].state, RecordState::Unchanged(&cached[0]));
        assert_eq!(changes.live[1].state, RecordState::Changed(&cached[1]));
        assert_eq!(changes.live[2].state, RecordState::New);
        assert_eq!(changes.updates(), 2);
        assert!(changes.removed.is_empty());
        assert!(changes.purged.is_empty());
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_classify_all_stale_is_empty() {
        let cached = vec![Cached { id: "a", edited: "t1" }];
        let records = vec![raw("a", "t1", false)];

        let changes = classify(&cached, &records);
        assert_eq!(changes.updates(), 0);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_hidden_record_is_removed_but_not_purged() {
        let cached = vec![
            Cached { id: "archived", edited: "t1" },
            Cached { id: "deleted", edited: "t1" },
        ];
        let records = vec![raw("archived", "t1", true)];

        let changes = classify(&cached, &records);

        assert!(changes.live.is_empty());
        assert_eq!(changes.removed, vec!["archived", "deleted"]);
        assert_eq!(changes.purged, vec!["deleted"]);
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_live_keeps_listing_index() {
        let cached: Vec<Cached> = vec![];
        let records = vec![raw("x", "t", true), raw("y", "t", false)];

        let changes = classify(&cached, &records);
        assert_eq!(changes.live.len(), 1);
        assert_eq!(changes.live[0].index, 1);
        assert_eq!(changes.live[0].record.id, "y");
    }
}
