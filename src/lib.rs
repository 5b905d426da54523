// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregate;
pub mod api;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod ingest;
pub mod store;
pub mod telemetry;

use std::sync::Arc;

use anyhow::Result;

pub use crate::api::{router, AppState};
use crate::catalog::Catalog;
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::ingest::fetch::HttpSiteFetcher;
use crate::ingest::parse::RecordParser;
use crate::ingest::scheduler::SyncScheduler;
use crate::ingest::types::SiteFetcher;
use crate::store::SideStore;

/// Everything the binary needs to serve and sync, sharing one fetcher, parser
/// and catalog.
pub struct Service {
    pub state: AppState,
    /// `None` when `[sync] enabled = false`.
    pub scheduler: Option<SyncScheduler>,
}

/// Wire the service against the real upstream and wall clock.
pub fn build_service(cfg: &AppConfig, store: SideStore) -> Result<Service> {
    let fetcher = HttpSiteFetcher::new(
        &cfg.upstream.base_url,
        &cfg.upstream.api_key,
        cfg.connect_timeout(),
    )?;
    Ok(build_service_with(
        cfg,
        Arc::new(fetcher),
        Arc::new(SystemClock),
        store,
    ))
}

/// Same as [`build_service`] with the fetcher and clock supplied by the caller.
pub fn build_service_with(
    cfg: &AppConfig,
    fetcher: Arc<dyn SiteFetcher>,
    clock: Arc<dyn Clock>,
    store: SideStore,
) -> Service {
    let catalog = Arc::new(Catalog::builtin());
    let parser = Arc::new(RecordParser::new(cfg.parser.clone()));

    let scheduler = cfg.sync.enabled.then(|| {
        SyncScheduler::new(
            Arc::clone(&catalog),
            Arc::clone(&fetcher),
            Arc::clone(&parser),
            clock,
            cfg.scheduler_cfg(),
        )
    });

    let state = AppState::new(
        catalog,
        fetcher,
        parser,
        store,
        cfg.aggregation.max_concurrent_fetches,
        cfg.query_timeout(),
    );

    Service { state, scheduler }
}
