use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::models::{Domain, Event, Executive, Snapshot};

/// Suffix of the staging file a snapshot is written to before it is renamed
/// over the published path.
const STAGING_SUFFIX: &str = "tmp";

/// Owns the on-disk layout of the data directory:
///
/// ```text
/// <data_dir>/json/execs_export.json
/// <data_dir>/json/events_export.json
/// <data_dir>/exec_images/<id>.<ext>
/// <data_dir>/event_images/<id>.<ext>
/// ```
#[derive(Debug, Clone)]
pub struct CacheManager {
    data_dir: PathBuf,
}

/// A snapshot written to its staging path but not yet visible to readers.
#[derive(Debug)]
pub struct StagedSnapshot {
    staging: PathBuf,
    target: PathBuf,
}

impl StagedSnapshot {
    /// Atomically replace the published snapshot with the staged one.
    pub fn commit(self) -> Result<()> {
        if let Err(e) = std::fs::rename(&self.staging, &self.target) {
            let _ = std::fs::remove_file(&self.staging);
            return Err(e).with_context(|| {
                format!("Failed to publish snapshot: {}", self.target.display())
            });
        }
        debug!(path = %self.target.display(), "Published snapshot");
        Ok(())
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging
    }
}

impl CacheManager {
    /// Create the manager and the directory layout beneath `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let manager = Self {
            data_dir: data_dir.into(),
        };
        let json_dir = manager.json_dir();
        std::fs::create_dir_all(&json_dir)
            .with_context(|| format!("Failed to create {}", json_dir.display()))?;
        for domain in Domain::ALL {
            let dir = manager.media_dir(domain);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(manager)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn json_dir(&self) -> PathBuf {
        self.data_dir.join("json")
    }

    pub fn snapshot_path(&self, domain: Domain) -> PathBuf {
        self.json_dir().join(domain.snapshot_file())
    }

    pub fn media_dir(&self, domain: Domain) -> PathBuf {
        self.data_dir.join(domain.media_dir())
    }

    /// Load the last published snapshot, if any.
    pub fn load<E: DeserializeOwned>(&self, domain: Domain) -> Result<Option<Snapshot<E>>> {
        let path = self.snapshot_path(domain);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read snapshot: {}", domain))?;

        let snapshot: Snapshot<E> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse snapshot: {}", domain))?;

        Ok(Some(snapshot))
    }

    /// Serialize a snapshot to its staging path without publishing it.
    pub fn stage<E: Serialize>(&self, domain: Domain, snapshot: &Snapshot<E>) -> Result<StagedSnapshot> {
        let target = self.snapshot_path(domain);
        let staging = target.with_extension(format!("json.{}", STAGING_SUFFIX));
        let contents = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&staging, contents)
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        Ok(StagedSnapshot { staging, target })
    }

    /// Write a snapshot so that readers see either the old or the new
    /// content, never a partial file.
    pub fn publish<E: Serialize>(&self, domain: Domain, snapshot: &Snapshot<E>) -> Result<()> {
        self.stage(domain, snapshot)?.commit()
    }

    // ===== Executives =====

    pub fn load_executives(&self) -> Result<Option<Snapshot<Executive>>> {
        self.load(Domain::Executives)
    }

    pub fn publish_executives(&self, snapshot: &Snapshot<Executive>) -> Result<()> {
        self.publish(Domain::Executives, snapshot)
    }

    // ===== Events =====

    pub fn load_events(&self) -> Result<Option<Snapshot<Event>>> {
        self.load(Domain::Events)
    }

    pub fn publish_events(&self, snapshot: &Snapshot<Event>) -> Result<()> {
        self.publish(Domain::Events, snapshot)
    }
}

// ============================================================================
// Tests
// ============================================================================
