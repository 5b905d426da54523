//! Optional side-store handle.
//!
//! The service never reads from or writes to the store on its query path. At
//! startup it only checks that the configured endpoint is reachable and keeps
//! the outcome as an explicit value, which `/health` reports. With
//! `required = true` an unreachable store aborts startup instead.

use std::time::Duration;

use serde::Deserialize;
use tokio::net::TcpStream;

const MONGODB_DEFAULT_PORT: u16 = 27017;

fn default_database() -> String {
    "backend_db".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoreConfig {
    /// e.g. `mongodb://localhost:27017`; unset means "run without a store".
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            database: default_database(),
            required: false,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideStore {
    Connected { endpoint: String, database: String },
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("side store is required but unavailable: {0}")]
    Required(String),
}

impl SideStore {
    pub async fn connect(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let outcome = match cfg.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            None => Err("no store url configured".to_string()),
            Some(url) => probe(url, Duration::from_secs(cfg.connect_timeout_secs)).await,
        };

        match outcome {
            Ok(endpoint) => {
                tracing::info!(%endpoint, database = %cfg.database, "side store reachable");
                Ok(SideStore::Connected {
                    endpoint,
                    database: cfg.database.clone(),
                })
            }
            Err(reason) if cfg.required => {
                tracing::error!(%reason, "side store unavailable and required");
                Err(StoreError::Required(reason))
            }
            Err(reason) => {
                tracing::warn!(%reason, "running without side store");
                Ok(SideStore::Unavailable { reason })
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SideStore::Connected { .. })
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            SideStore::Connected { .. } => "connected",
            SideStore::Unavailable { .. } => "unavailable",
        }
    }
}

/// TCP reachability check. Returns `host:port` (never credentials).
async fn probe(url: &str, timeout: Duration) -> Result<String, String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| format!("invalid store url: {e}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| "store url has no host".to_string())?;
    let endpoint = format!("{}:{}", host, parsed.port().unwrap_or(MONGODB_DEFAULT_PORT));

    match tokio::time::timeout(timeout, TcpStream::connect(endpoint.as_str())).await {
        Ok(Ok(_)) => Ok(endpoint),
        Ok(Err(e)) => Err(format!("{endpoint}: {e}")),
        Err(_) => Err(format!("{endpoint}: connect timed out after {timeout:?}")),
    }
}
