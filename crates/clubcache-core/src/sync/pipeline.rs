//! Per-domain pass definitions.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::api::RemoteSource;
use crate::models::{Domain, Entity, Event, Executive, Properties, PropertyError, RawRecord};

use super::error::SyncError;
use super::transform::{self, event_fields, executive_fields, RoleLookup};

/// What a domain contributes to a pass: which containers gate it, how a
/// record becomes an entity, and how entities are ordered for publishing.
#[async_trait]
pub trait Pipeline: Send + Sync {
    type Entity: Entity + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync;
    type Context: Send + Sync;

    fn domain(&self) -> Domain;

    /// Every container whose timestamp gates the pass.
    fn containers(&self) -> Vec<String>;

    /// The container holding the domain's own records.
    fn records_container(&self) -> &str;

    /// Files column holding each record's media.
    fn media_field(&self) -> &'static str;

    /// Load lookup data the transform needs, once per pass.
    async fn prepare(&self, source: &dyn RemoteSource) -> Result<Self::Context, SyncError>;

    fn build(
        &self,
        record: &RawRecord,
        props: &Properties,
        ctx: &Self::Context,
        media_url: Option<String>,
    ) -> Result<Self::Entity, PropertyError>;

    fn order(&self, entities: Vec<Self::Entity>) -> Vec<Self::Entity>;
}

/// Executive roster, with role names resolved through the roles database.
#[derive(Debug, Clone)]
pub struct ExecutivesPipeline {
    executives_db: String,
    roles_db: String,
}

impl ExecutivesPipeline {
    pub fn new(executives_db: impl Into<String>, roles_db: impl Into<String>) -> Self {
        Self {
            executives_db: executives_db.into(),
            roles_db: roles_db.into(),
        }
    }
}

#[async_trait]
impl Pipeline for ExecutivesPipeline {
    type Entity = Executive;
    type Context = RoleLookup;

    fn domain(&self) -> Domain {
        Domain::Executives
    }

    fn containers(&self) -> Vec<String> {
        vec![self.executives_db.clone(), self.roles_db.clone()]
    }

    fn records_container(&self) -> &str {
        &self.executives_db
    }

    fn media_field(&self) -> &'static str {
        executive_fields::PICTURE
    }

    async fn prepare(&self, source: &dyn RemoteSource) -> Result<RoleLookup, SyncError> {
        let records = source.fetch_records(&self.roles_db).await?;
        let lookup = RoleLookup::from_records(&records)?;
        debug!(roles = lookup.len(), "Loaded role lookup");
        Ok(lookup)
    }

    fn build(
        &self,
        record: &RawRecord,
        props: &Properties,
        roles: &RoleLookup,
        media_url: Option<String>,
    ) -> Result<Executive, PropertyError> {
        transform::executive_from_record(record, props, roles, media_url)
    }

    fn order(&self, entities: Vec<Executive>) -> Vec<Executive> {
        transform::order_executives(entities)
    }
}

#[derive(Debug, Clone)]
pub struct EventsPipeline {
    events_db: String,
}

impl EventsPipeline {
    pub fn new(events_db: impl Into<String>) -> Self {
        Self {
            events_db: events_db.into(),
        }
    }
}

#[async_trait]
impl Pipeline for EventsPipeline {
    type Entity = Event;
    type Context = ();

    fn domain(&self) -> Domain {
        Domain::Events
    }

    fn containers(&self) -> Vec<String> {
        vec![self.events_db.clone()]
    }

    fn records_container(&self) -> &str {
        &self.events_db
    }

    fn media_field(&self) -> &'static str {
        event_fields::THUMBNAIL
    }

    async fn prepare(&self, _source: &dyn RemoteSource) -> Result<(), SyncError> {
        Ok(())
    }

    fn build(
        &self,
        record: &RawRecord,
        props: &Properties,
        _ctx: &(),
        media_url: Option<String>,
    ) -> Result<Event, PropertyError> {
        transform::event_from_record(record, props, media_url)
    }

    fn order(&self, entities: Vec<Event>) -> Vec<Event> {
        transform::order_events(entities)
    }
}
