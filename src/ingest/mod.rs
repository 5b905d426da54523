// src/ingest/mod.rs
pub mod fetch;
pub mod parse;
pub mod scheduler;
pub mod types;

use std::time::Duration;

use crate::ingest::parse::RecordParser;
use crate::ingest::types::{FetchError, SeriesPair, SiteFetcher, TimeWindow};

/// One bounded fetch followed by a parse. Shared by single-site queries, city
/// aggregation and the sync loop.
///
/// `timeout` is handed to the fetcher and also enforced here, so fetchers that
/// ignore it are still cut off.
pub async fn fetch_series(
    fetcher: &dyn SiteFetcher,
    parser: &RecordParser,
    site_id: &str,
    window: &TimeWindow,
    timeout: Duration,
) -> Result<SeriesPair, FetchError> {
    let raw = tokio::time::timeout(timeout, fetcher.fetch(site_id, window, timeout))
        .await
        .map_err(|_| FetchError::Timeout)??;
    Ok(parser.parse(&raw))
}
