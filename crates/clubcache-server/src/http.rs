//! Read-only HTTP surface over the published snapshots and media.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use clubcache_core::{CacheManager, Domain, Event, Executive, Snapshot};

#[derive(Clone)]
pub struct AppState {
    cache: CacheManager,
}

pub fn build_router(cache: CacheManager) -> Router {
    Router::new()
        .route("/executives/all", get(executives_all))
        .route("/executives/active", get(executives_active))
        .route("/executives/retired", get(executives_retired))
        .route("/executives/images/:filename", get(executive_image))
        .route("/events/all", get(events_all))
        .route("/events/images/:filename", get(event_image))
        .route("/status", get(status))
        .with_state(AppState { cache })
}

#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            HttpError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            HttpError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            HttpError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

fn load<E: serde::de::DeserializeOwned>(cache: &CacheManager, domain: Domain) -> Result<Snapshot<E>, HttpError> {
    match cache.load::<E>(domain) {
        Ok(Some(snapshot)) => Ok(snapshot),
        Ok(None) => Err(HttpError::NotFound(format!("no {} snapshot published yet", domain))),
        Err(e) => {
            error!(%domain, error = %e, "Failed to read snapshot");
            Err(HttpError::Internal(format!("{} snapshot is unreadable", domain)))
        }
    }
}

async fn executives_all(State(state): State<AppState>) -> Result<Json<Vec<Executive>>, HttpError> {
    Ok(Json(load::<Executive>(&state.cache, Domain::Executives)?.entities))
}

async fn executives_active(State(state): State<AppState>) -> Result<Json<Vec<Executive>>, HttpError> {
    let snapshot = load::<Executive>(&state.cache, Domain::Executives)?;
    Ok(Json(snapshot.entities.into_iter().filter(|e| !e.is_retired()).collect()))
}

async fn executives_retired(State(state): State<AppState>) -> Result<Json<Vec<Executive>>, HttpError> {
    let snapshot = load::<Executive>(&state.cache, Domain::Executives)?;
    Ok(Json(snapshot.entities.into_iter().filter(|e| e.is_retired()).collect()))
}

async fn events_all(State(state): State<AppState>) -> Result<Json<Vec<Event>>, HttpError> {
    Ok(Json(load::<Event>(&state.cache, Domain::Events)?.entities))
}

async fn executive_image(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, HttpError> {
    serve_media(&state.cache, Domain::Executives, &filename).await
}

async fn event_image(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, HttpError> {
    serve_media(&state.cache, Domain::Events, &filename).await
}

fn content_type(filename: &str) -> &'static str {
    let ext = filename.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// A bare file name: one normal path component, no separators.
fn is_plain_file_name(filename: &str) -> bool {
    let mut components = Path::new(filename).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !filename.contains(['/', '\\'])
}

async fn serve_media(cache: &CacheManager, domain: Domain, filename: &str) -> Result<Response, HttpError> {
    if !is_plain_file_name(filename) {
        warn!(%domain, filename, "Rejected media path");
        return Err(HttpError::BadRequest("invalid file name".to_string()));
    }

    let root = cache.media_dir(domain);
    let path = root.join(filename);
    let canonical = match path.canonicalize() {
        Ok(p) => p,
        Err(_) => return Err(HttpError::NotFound(format!("{} not found", filename))),
    };
    let root = root.canonicalize().unwrap_or(root);
    if !canonical.starts_with(&root) {
        warn!(%domain, filename, "Rejected media path outside media directory");
        return Err(HttpError::BadRequest("invalid file name".to_string()));
    }

    match tokio::fs::read(&canonical).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, content_type(filename))], bytes).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(HttpError::NotFound(format!("{} not found", filename)))
        }
        Err(e) => {
            error!(%domain, filename, error = %e, "Failed to read media");
            Err(HttpError::Internal("media is unreadable".to_string()))
        }
    }
}

#[derive(Debug, Serialize)]
struct DomainStatus {
    last_checked: DateTime<Utc>,
    age: String,
    entities: usize,
    containers: BTreeMap<String, String>,
}

fn domain_status<E: serde::de::DeserializeOwned>(cache: &CacheManager, domain: Domain) -> Option<DomainStatus> {
    match cache.load::<E>(domain) {
        Ok(Some(snapshot)) => Some(DomainStatus {
            age: snapshot.metadata.age_display(),
            last_checked: snapshot.metadata.last_checked,
            entities: snapshot.entities.len(),
            containers: snapshot.metadata.containers,
        }),
        Ok(None) => None,
        Err(e) => {
            warn!(%domain, error = %e, "Failed to load snapshot for status");
            None
        }
    }
}

async fn status(State(state): State<AppState>) -> Json<BTreeMap<String, Option<DomainStatus>>> {
    let mut out = BTreeMap::new();
    out.insert(
        Domain::Executives.to_string(),
        domain_status::<Executive>(&state.cache, Domain::Executives),
    );
    out.insert(
        Domain::Events.to_string(),
        domain_status::<Event>(&state.cache, Domain::Events),
    );
    Json(out)
}
