// src/ingest/fetch.rs
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::Client;

use crate::ingest::types::{FetchError, SiteFetcher, TimeWindow};

/// Both pollutants, 15-minute averages, gaps emitted as `NaN` rows.
const SERIES_PARAMS: &str = "params/pm2.5cnc,pm10cnc";
const SERIES_SHAPE: &str = "ts/mm/avg/15";
const GAP_QUERY: &str = "gaps=1&gap_value=NaN";

/// Fetches raw CSV series from the upstream device-data API.
#[derive(Clone)]
pub struct HttpSiteFetcher {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpSiteFetcher {
    pub fn new(base_url: &str, api_key: &str, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("air-quality-proxy/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .build()
            .context("building upstream http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn request_url(&self, site_id: &str, window: &TimeWindow) -> String {
        self.url_with_key(site_id, window, &self.api_key)
    }

    // for logs: never print the key
    fn redacted_url(&self, site_id: &str, window: &TimeWindow) -> String {
        self.url_with_key(site_id, window, "***")
    }

    fn url_with_key(&self, site_id: &str, window: &TimeWindow, key: &str) -> String {
        format!(
            "{}/imei/{}/{}/startdate/{}/enddate/{}/{}/api/{}?{}",
            self.base_url,
            site_id,
            SERIES_PARAMS,
            window.start(),
            window.end(),
            SERIES_SHAPE,
            key,
            GAP_QUERY
        )
    }
}

#[async_trait]
impl SiteFetcher for HttpSiteFetcher {
    async fn fetch(
        &self,
        site_id: &str,
        window: &TimeWindow,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let t0 = Instant::now();
        tracing::debug!(
            target: "fetch",
            site_id,
            url = %self.redacted_url(site_id, window),
            "requesting series"
        );

        let result = async {
            let resp = self
                .client
                .get(self.request_url(site_id, window))
                .timeout(timeout)
                .send()
                .await
                .map_err(classify)?;

            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Upstream {
                    status: status.as_u16(),
                });
            }
            resp.text().await.map_err(classify)
        }
        .await;

        histogram!("aq_upstream_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        match &result {
            Ok(body) => {
                counter!("aq_upstream_requests_total", "outcome" => "ok").increment(1);
                tracing::debug!(target: "fetch", site_id, bytes = body.len(), "series fetched");
            }
            Err(e) => {
                counter!("aq_upstream_requests_total", "outcome" => e.kind()).increment(1);
                tracing::warn!(target: "fetch", site_id, error = %e, "upstream fetch failed");
            }
        }
        result
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        // the url carries the api key
        FetchError::Network {
            detail: e.without_url().to_string(),
        }
    }
}
