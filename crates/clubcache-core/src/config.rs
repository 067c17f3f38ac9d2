//! Process configuration management.
//!
//! Configuration comes from environment variables (optionally seeded from a
//! `.env` file by the binary). The integration token and the public API URL
//! are required; everything else has a default.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::models::Domain;
use crate::utils::join_url;

/// Default data directory (relative to the working directory)
const DEFAULT_DATA_DIR: &str = "data";

/// Default address the HTTP layer binds to
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Default minutes between passes of each pipeline
const DEFAULT_REFRESH_MINUTES: u64 = 5;

/// Production database IDs
const DEFAULT_EXECUTIVES_DB_ID: &str = "23dbd8f8f9d84739aaf9c1f98c7cc842";
const DEFAULT_ROLES_DB_ID: &str = "64911354b5e24d639c00c3d39e54276c";
const DEFAULT_EVENTS_DB_ID: &str = "0260157bf43c4c96aefec1764d428030";

#[derive(Debug, Clone)]
pub struct Config {
    pub notion_token: String,
    pub api_url: String,
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub executives_refresh: Duration,
    pub events_refresh: Duration,
    pub executives_db_id: String,
    pub roles_db_id: String,
    pub events_db_id: String,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| anyhow!("{} must be set in the environment", key))
        };
        let minutes = |key: &str| -> Result<Duration> {
            match get(key) {
                None => Ok(Duration::from_secs(DEFAULT_REFRESH_MINUTES * 60)),
                Some(raw) => {
                    let value: u64 = raw
                        .parse()
                        .with_context(|| format!("{} must be a whole number of minutes", key))?;
                    if value == 0 {
                        bail!("{} must be at least 1", key);
                    }
                    let secs = value
                        .checked_mul(60)
                        .ok_or_else(|| anyhow!("{} is too large", key))?;
                    Ok(Duration::from_secs(secs))
                }
            }
        };

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse()
            .with_context(|| format!("BIND_ADDR `{}` is not a socket address", bind_raw))?;

        Ok(Self {
            notion_token: required("NOTION_API_TOKEN")?,
            api_url: required("API_URL")?,
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            bind_addr,
            executives_refresh: minutes("EXECUTIVES_REFRESH_MINUTES")?,
            events_refresh: minutes("EVENTS_REFRESH_MINUTES")?,
            executives_db_id: get("EXECUTIVES_DB_ID").unwrap_or_else(|| DEFAULT_EXECUTIVES_DB_ID.to_string()),
            roles_db_id: get("ROLES_DB_ID").unwrap_or_else(|| DEFAULT_ROLES_DB_ID.to_string()),
            events_db_id: get("EVENTS_DB_ID").unwrap_or_else(|| DEFAULT_EVENTS_DB_ID.to_string()),
            log_dir: get("LOG_DIR").map(PathBuf::from),
        })
    }

    /// Public URL a media file of `domain` is served from.
    pub fn media_url(&self, domain: Domain, filename: &str) -> String {
        media_url(&self.api_url, domain, filename)
    }
}

/// Public URL of a media file given the API root.
pub fn media_url(api_url: &str, domain: Domain, filename: &str) -> String {
    join_url(api_url, &format!("{}/{}", domain.media_route(), filename))
}
