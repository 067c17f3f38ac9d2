//! The sync engine: one idempotent pass per call.
//!
//! A pass loads the prior snapshot, asks the remote source whether anything
//! changed at the container level, and only then lists records, refreshes
//! media for new or edited records, and publishes a replacement snapshot.
//! Nothing is published when a pass fails, and media of deleted or
//! re-uploaded records is only removed once the replacement is in place.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::api::RemoteSource;
use crate::cache::CacheManager;
use crate::models::{Domain, Entity, Snapshot, SyncMetadata};

use super::detector::{self, ChangeSet};
use super::error::{property_err, SyncError};
use super::media::{ImageCompressor, MediaSync};
use super::pipeline::Pipeline;

/// Which check decided nothing changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoChangeTier {
    /// Container timestamps matched; no records were listed.
    Container,
    /// Records were listed but none were new, edited or removed.
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Unchanged {
        tier: NoChangeTier,
    },
    Updated {
        /// New or edited records.
        updates: usize,
        /// Entities dropped from the snapshot.
        removed: usize,
        /// Records whose media was deleted.
        purged: usize,
    },
}

impl fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassOutcome::Unchanged { tier: NoChangeTier::Container } => {
                write!(f, "no changes (container timestamps unchanged)")
            }
            PassOutcome::Unchanged { tier: NoChangeTier::Record } => {
                write!(f, "no changes (records unchanged)")
            }
            PassOutcome::Updated {
                updates,
                removed,
                purged,
            } => write!(f, "{} updated, {} removed, {} purged", updates, removed, purged),
        }
    }
}

/// Snapshot computed by a pass, before it is published.
struct PassResult<E> {
    snapshot: Snapshot<E>,
    outcome: PassOutcome,
    purge: Vec<String>,
    /// Records whose media was refreshed, with the URL now published.
    refreshed: Vec<(String, Option<String>)>,
}

/// Runs passes for any [`Pipeline`] against one remote source and one data
/// directory.
#[derive(Clone)]
pub struct SyncEngine {
    source: Arc<dyn RemoteSource>,
    cache: CacheManager,
    api_url: String,
    compressor: Arc<dyn ImageCompressor>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        cache: CacheManager,
        api_url: impl Into<String>,
        compressor: Arc<dyn ImageCompressor>,
    ) -> Self {
        Self {
            source,
            cache,
            api_url: api_url.into(),
            compressor,
        }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn media(&self, domain: Domain) -> MediaSync {
        MediaSync::new(
            domain,
            self.cache.media_dir(domain),
            self.api_url.clone(),
            Arc::clone(&self.compressor),
        )
    }

    /// Run one pass for `pipeline`. Safe to repeat: a pass over unchanged
    /// remote data only moves `last_checked` forward.
    pub async fn resync<P: Pipeline>(&self, pipeline: &P) -> Result<PassOutcome, SyncError> {
        let domain = pipeline.domain();
        let media = self.media(domain);

        let prior = self.cache.load::<P::Entity>(domain)?;
        let result = self.run_pass(pipeline, &media, prior.as_ref()).await?;

        self.cache.publish(domain, &result.snapshot)?;

        for id in &result.purge {
            if let Err(e) = media.purge(id) {
                warn!(%domain, record = %id, error = %e, "Failed to purge media");
            }
        }
        for (id, current) in &result.refreshed {
            if let Err(e) = media.prune_replaced(id, current.as_deref()) {
                warn!(%domain, record = %id, error = %e, "Failed to remove replaced media");
            }
        }

        info!(
            %domain,
            entities = result.snapshot.entities.len(),
            outcome = %result.outcome,
            "Sync pass complete"
        );
        Ok(result.outcome)
    }

    async fn run_pass<P: Pipeline>(
        &self,
        pipeline: &P,
        media: &MediaSync,
        prior: Option<&Snapshot<P::Entity>>,
    ) -> Result<PassResult<P::Entity>, SyncError> {
        let domain = pipeline.domain();
        let containers = self.fetch_containers(&pipeline.containers()).await?;

        if let Some(prior) = prior.filter(|p| detector::containers_unchanged(Some(&p.metadata), &containers)) {
            debug!(%domain, "Container timestamps unchanged");
            return Ok(PassResult {
                snapshot: Snapshot {
                    metadata: prior.metadata.touched(),
                    entities: prior.entities.clone(),
                },
                outcome: PassOutcome::Unchanged {
                    tier: NoChangeTier::Container,
                },
                purge: Vec::new(),
                refreshed: Vec::new(),
            });
        }

        let source = self.source.as_ref();
        let records = source.fetch_records(pipeline.records_container()).await?;
        let ctx = pipeline.prepare(source).await?;
        debug!(%domain, records = records.len(), "Listed records");

        // Every record is decoded, hidden ones included, so schema drift
        // surfaces even when it only affects trashed pages.
        let decoded = records
            .iter()
            .map(|r| r.decode().map_err(property_err(&r.id)))
            .collect::<Result<Vec<_>, _>>()?;

        let cached: &[P::Entity] = prior.map(|p| p.entities.as_slice()).unwrap_or(&[]);
        let changes: ChangeSet<'_, P::Entity> = detector::classify(cached, &records);

        let mut entities = Vec::with_capacity(changes.live.len());
        let mut refreshed = Vec::new();
        for item in &changes.live {
            let record = item.record;
            let props = &decoded[item.index];
            let files = props
                .files(pipeline.media_field())
                .map_err(property_err(&record.id))?;
            let media_url = media
                .sync(
                    source,
                    &record.id,
                    files.first(),
                    item.state.cached().and_then(Entity::media_url),
                    item.state.is_stale(),
                )
                .await?;
            if !item.state.is_stale() {
                refreshed.push((record.id.clone(), media_url.clone()));
            }
            let entity = pipeline
                .build(record, props, &ctx, media_url)
                .map_err(property_err(&record.id))?;
            entities.push(entity);
        }
        let entities = pipeline.order(entities);

        let unchanged = prior.is_some() && changes.is_empty() && cached == entities.as_slice();
        let outcome = if unchanged {
            PassOutcome::Unchanged {
                tier: NoChangeTier::Record,
            }
        } else {
            PassOutcome::Updated {
                updates: changes.updates(),
                removed: changes.removed.len(),
                purged: changes.purged.len(),
            }
        };

        Ok(PassResult {
            snapshot: Snapshot {
                metadata: SyncMetadata::new(containers),
                entities,
            },
            outcome,
            purge: changes.purged,
            refreshed,
        })
    }

    async fn fetch_containers(&self, ids: &[String]) -> Result<BTreeMap<String, String>, SyncError> {
        let metas = try_join_all(ids.iter().map(|id| self.source.fetch_container_metadata(id))).await?;
        Ok(ids
            .iter()
            .cloned()
            .zip(metas.into_iter().map(|m| m.last_edited_time))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::models::{ContainerMetadata, Event, Executive, RawRecord};
    use crate::sync::fixtures;
    use crate::sync::media::CompressError;
    use crate::sync::pipeline::{EventsPipeline, ExecutivesPipeline};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const EVENTS_DB: &str = "events-db";
    const EXECS_DB: &str = "execs-db";
    const ROLES_DB: &str = "roles-db";

    #[derive(Default)]
    struct FakeSource {
        containers: Mutex<HashMap<String, (String, Vec<RawRecord>)>>,
        listings: AtomicUsize,
        downloads: AtomicUsize,
        fail_downloads: AtomicBool,
    }

    impl FakeSource {
        fn set(&self, db: &str, edited: &str, records: Vec<RawRecord>) {
            self.containers
                .lock()
                .unwrap()
                .insert(db.to_string(), (edited.to_string(), records));
        }

        fn touch(&self, db: &str, edited: &str) {
            if let Some(entry) = self.containers.lock().unwrap().get_mut(db) {
                entry.0 = edited.to_string();
            }
        }
    }

    #[async_trait]
    impl RemoteSource for FakeSource {
        async fn fetch_container_metadata(&self, database_id: &str) -> Result<ContainerMetadata, ApiError> {
            let containers = self.containers.lock().unwrap();
            let (edited, _) = containers
                .get(database_id)
                .ok_or_else(|| ApiError::NotFound(database_id.to_string()))?;
            Ok(ContainerMetadata {
                last_edited_time: edited.clone(),
            })
        }

        async fn fetch_records(&self, database_id: &str) -> Result<Vec<RawRecord>, ApiError> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            let containers = self.containers.lock().unwrap();
            let (_, records) = containers
                .get(database_id)
                .ok_or_else(|| ApiError::NotFound(database_id.to_string()))?;
            Ok(records.clone())
        }

        async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
            if self.fail_downloads.load(Ordering::SeqCst) {
                return Err(ApiError::ServerError(format!("download failed: {}", url)));
            }
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(url.as_bytes().to_vec())
        }
    }

    #[derive(Default)]
    struct RecordingCompressor(Mutex<Vec<String>>);

    impl ImageCompressor for RecordingCompressor {
        fn compress(&self, path: &Path) -> Result<(), CompressError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.0.lock().unwrap().push(name);
            Ok(())
        }
    }

    struct Harness {
        tmp: TempDir,
        source: Arc<FakeSource>,
        compressor: Arc<RecordingCompressor>,
        engine: SyncEngine,
    }

    fn harness() -> Harness {
        let tmp = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::default());
        let compressor = Arc::new(RecordingCompressor::default());
        let cache = CacheManager::new(tmp.path()).unwrap();
        let engine = SyncEngine::new(
            source.clone(),
            cache,
            "https://api.example.org/",
            compressor.clone(),
        );
        Harness {
            tmp,
            source,
            compressor,
            engine,
        }
    }

    fn events_pipeline() -> EventsPipeline {
        EventsPipeline::new(EVENTS_DB)
    }

    fn load_events(h: &Harness) -> Snapshot<Event> {
        h.engine.cache().load_events().unwrap().unwrap()
    }

    fn event_image(h: &Harness, name: &str) -> std::path::PathBuf {
        h.tmp.path().join("event_images").join(name)
    }

    fn seed_events(h: &Harness) {
        h.source.set(
            EVENTS_DB,
            "c1",
            vec![
                fixtures::event("a", "t1", "Old", Some("2024-01-10"), Some("a.png")),
                fixtures::event("b", "t1", "New", Some("2024-03-01"), Some("b.jpg")),
                fixtures::event("c", "t1", "Undated", None, None),
            ],
        );
    }

    #[tokio::test]
    async fn test_first_pass_publishes_everything() {
        let h = harness();
        seed_events(&h);

        let outcome = h.engine.resync(&events_pipeline()).await.unwrap();
        assert_eq!(
            outcome,
            PassOutcome::Updated {
                updates: 3,
                removed: 0,
                purged: 0
            }
        );

        let snap = load_events(&h);
        let ids: Vec<&str> = snap.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(snap.metadata.containers.get(EVENTS_DB).map(String::as_str), Some("c1"));
        assert_eq!(
            snap.find("a").unwrap().thumbnail.as_deref(),
            Some("https://api.example.org/events/images/a.png")
        );
        assert_eq!(snap.find("c").unwrap().thumbnail, None);

        assert!(event_image(&h, "a.png").exists());
        assert!(event_image(&h, "b.jpg").exists());
        assert_eq!(h.source.downloads.load(Ordering::SeqCst), 2);
        assert_eq!(h.compressor.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_containers_skip_listing() {
        let h = harness();
        seed_events(&h);
        h.engine.resync(&events_pipeline()).await.unwrap();
        let first = load_events(&h);

        let outcome = h.engine.resync(&events_pipeline()).await.unwrap();

        assert_eq!(
            outcome,
            PassOutcome::Unchanged {
                tier: NoChangeTier::Container
            }
        );
        assert_eq!(h.source.listings.load(Ordering::SeqCst), 1);
        let second = load_events(&h);
        assert_eq!(second.entities, first.entities);
        assert!(second.metadata.last_checked >= first.metadata.last_checked);
    }

    #[tokio::test]
    async fn test_container_touch_without_record_changes() {
        let h = harness();
        seed_events(&h);
        h.engine.resync(&events_pipeline()).await.unwrap();
        let first = load_events(&h);

        h.source.touch(EVENTS_DB, "c2");
        let outcome = h.engine.resync(&events_pipeline()).await.unwrap();

        assert_eq!(
            outcome,
            PassOutcome::Unchanged {
                tier: NoChangeTier::Record
            }
        );
        let second = load_events(&h);
        assert_eq!(second.entities, first.entities);
        assert_eq!(second.metadata.containers.get(EVENTS_DB).map(String::as_str), Some("c2"));
        assert_eq!(h.source.downloads.load(Ordering::SeqCst), 2);
        assert_eq!(h.compressor.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_only_edited_record_refetches_media() {
        let h = harness();
        seed_events(&h);
        h.engine.resync(&events_pipeline()).await.unwrap();

        h.source.set(
            EVENTS_DB,
            "c2",
            vec![
                fixtures::event("a", "t2", "Old, renamed", Some("2024-01-10"), Some("a.png")),
                fixtures::event("b", "t1", "New", Some("2024-03-01"), Some("b.jpg")),
                fixtures::event("c", "t1", "Undated", None, None),
            ],
        );
        let outcome = h.engine.resync(&events_pipeline()).await.unwrap();

        assert_eq!(
            outcome,
            PassOutcome::Updated {
                updates: 1,
                removed: 0,
                purged: 0
            }
        );
        assert_eq!(h.source.downloads.load(Ordering::SeqCst), 3);
        let compressed = h.compressor.0.lock().unwrap().clone();
        assert_eq!(compressed.len(), 3);
        assert_eq!(compressed[2], "a.png.tmp");
        assert_eq!(
            load_events(&h).find("a").unwrap().event_name.as_deref(),
            Some("Old, renamed")
        );
    }

    #[tokio::test]
    async fn test_deleted_record_is_purged_and_archived_is_hidden() {
        let h = harness();
        seed_events(&h);
        h.engine.resync(&events_pipeline()).await.unwrap();

        let mut archived = fixtures::event("b", "t1", "New", Some("2024-03-01"), Some("b.jpg"));
        archived.archived = true;
        h.source.set(
            EVENTS_DB,
            "c2",
            vec![archived, fixtures::event("c", "t1", "Undated", None, None)],
        );
        let outcome = h.engine.resync(&events_pipeline()).await.unwrap();

        assert_eq!(
            outcome,
            PassOutcome::Updated {
                updates: 0,
                removed: 2,
                purged: 1
            }
        );
        let snap = load_events(&h);
        let ids: Vec<&str> = snap.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
        assert!(!event_image(&h, "a.png").exists());
        assert!(event_image(&h, "b.jpg").exists());
    }

    #[tokio::test]
    async fn test_failed_download_keeps_prior_snapshot() {
        let h = harness();
        seed_events(&h);
        h.engine.resync(&events_pipeline()).await.unwrap();
        let before = std::fs::read(h.engine.cache().snapshot_path(Domain::Events)).unwrap();

        h.source.set(
            EVENTS_DB,
            "c2",
            vec![fixtures::event("d", "t1", "Brand new", None, Some("d.png"))],
        );
        h.source.fail_downloads.store(true, Ordering::SeqCst);

        let err = h.engine.resync(&events_pipeline()).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(_)));

        let after = std::fs::read(h.engine.cache().snapshot_path(Domain::Events)).unwrap();
        assert_eq!(before, after);
        // Nothing published, so nothing purged.
        assert!(event_image(&h, "a.png").exists());
        assert!(event_image(&h, "b.jpg").exists());
    }

    #[tokio::test]
    async fn test_schema_drift_on_hidden_record_aborts() {
        let h = harness();
        let mut drifted = fixtures::record(
            "z",
            "t1",
            json!({"Title": {"type": "formula", "formula": {}}}),
        );
        drifted.in_trash = true;
        h.source.set(EVENTS_DB, "c1", vec![drifted]);

        let err = h.engine.resync(&events_pipeline()).await.unwrap_err();

        assert!(err.is_schema_drift());
        assert!(h.engine.cache().load_events().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_schema_drift_keeps_prior_snapshot() {
        let h = harness();
        seed_events(&h);
        h.engine.resync(&events_pipeline()).await.unwrap();
        let before = std::fs::read(h.engine.cache().snapshot_path(Domain::Events)).unwrap();

        let mut drifted = fixtures::record(
            "z",
            "t1",
            json!({"Title": {"type": "formula", "formula": {}}}),
        );
        drifted.in_trash = true;
        h.source.set(
            EVENTS_DB,
            "c2",
            vec![
                fixtures::event("a", "t2", "Old, renamed", Some("2024-01-10"), Some("a.png")),
                drifted,
            ],
        );

        let err = h.engine.resync(&events_pipeline()).await.unwrap_err();

        assert!(err.is_schema_drift());
        let after = std::fs::read(h.engine.cache().snapshot_path(Domain::Events)).unwrap();
        assert_eq!(before, after);
        assert!(event_image(&h, "b.jpg").exists());
        assert_eq!(h.source.downloads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_replaced_image_removes_old_extension() {
        let h = harness();
        seed_events(&h);
        h.engine.resync(&events_pipeline()).await.unwrap();
        assert!(event_image(&h, "a.png").exists());

        h.source.set(
            EVENTS_DB,
            "c2",
            vec![
                fixtures::event("a", "t2", "Old", Some("2024-01-10"), Some("a-new.jpg")),
                fixtures::event("b", "t2", "New", Some("2024-03-01"), None),
                fixtures::event("c", "t1", "Undated", None, None),
            ],
        );
        h.engine.resync(&events_pipeline()).await.unwrap();

        let snap = load_events(&h);
        assert_eq!(
            snap.find("a").unwrap().thumbnail.as_deref(),
            Some("https://api.example.org/events/images/a.jpg")
        );
        assert!(event_image(&h, "a.jpg").exists());
        assert!(!event_image(&h, "a.png").exists());
        // Image removed upstream: nothing left on disk for the record.
        assert_eq!(snap.find("b").unwrap().thumbnail, None);
        assert!(!event_image(&h, "b.jpg").exists());
    }

    #[tokio::test]
    async fn test_aborted_pass_keeps_replaced_image() {
        let h = harness();
        seed_events(&h);
        h.engine.resync(&events_pipeline()).await.unwrap();

        h.source.set(
            EVENTS_DB,
            "c2",
            vec![
                fixtures::event("a", "t2", "Old", Some("2024-01-10"), Some("a.jpg")),
                fixtures::event("d", "t1", "Brand new", None, Some("d.png")),
            ],
        );
        h.source.fail_downloads.store(true, Ordering::SeqCst);

        assert!(h.engine.resync(&events_pipeline()).await.is_err());
        assert!(event_image(&h, "a.png").exists());
    }

    #[tokio::test]
    async fn test_missing_container_aborts_before_listing() {
        let h = harness();

        let err = h.engine.resync(&events_pipeline()).await.unwrap_err();

        assert!(matches!(err, SyncError::Remote(ApiError::NotFound(_))));
        assert_eq!(h.source.listings.load(Ordering::SeqCst), 0);
    }

    fn seed_roster(h: &Harness, roles_edited: &str, president_title: &str) {
        h.source.set(
            ROLES_DB,
            roles_edited,
            vec![
                fixtures::role("r-pres", president_title),
                fixtures::role("r-dir", "Director of Events"),
            ],
        );
        h.source.set(
            EXECS_DB,
            "e1",
            vec![
                fixtures::executive("x1", "t1", "Riley", &["r-dir"], Some("riley.webp")),
                fixtures::executive("x2", "t1", "Sam", &["r-pres"], None),
            ],
        );
    }

    #[tokio::test]
    async fn test_roster_pass_resolves_and_orders() {
        let h = harness();
        seed_roster(&h, "r1", "President");
        let pipeline = ExecutivesPipeline::new(EXECS_DB, ROLES_DB);

        h.engine.resync(&pipeline).await.unwrap();

        let snap: Snapshot<Executive> = h.engine.cache().load_executives().unwrap().unwrap();
        let names: Vec<&str> = snap.entities.iter().map(|e| e.display_name()).collect();
        assert_eq!(names, vec!["Sam", "Riley"]);
        assert_eq!(snap.entities[1].roles, vec!["Director of Events"]);
        assert_eq!(
            snap.entities[1].profile_picture.as_deref(),
            Some("https://api.example.org/executives/images/x1.webp")
        );
        assert_eq!(snap.metadata.containers.len(), 2);
        assert!(h.tmp.path().join("exec_images/x1.webp").exists());
    }

    #[tokio::test]
    async fn test_role_rename_reaches_unedited_records() {
        let h = harness();
        seed_roster(&h, "r1", "President");
        let pipeline = ExecutivesPipeline::new(EXECS_DB, ROLES_DB);
        h.engine.resync(&pipeline).await.unwrap();

        seed_roster(&h, "r2", "Co-President");
        let outcome = h.engine.resync(&pipeline).await.unwrap();

        assert_eq!(
            outcome,
            PassOutcome::Updated {
                updates: 0,
                removed: 0,
                purged: 0
            }
        );
        let snap = h.engine.cache().load_executives().unwrap().unwrap();
        assert_eq!(snap.find("x2").unwrap().roles, vec!["Co-President"]);
        assert_eq!(h.source.downloads.load(Ordering::SeqCst), 1);
    }
}
