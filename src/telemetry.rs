//! Logging and Prometheus wiring.

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str =
    "air_quality_proxy=info,fetch=info,aggregate=info,sync=info,api=info,warn";

/// Install the global tracing subscriber.
/// `RUST_LOG` overrides the default filter; `AQ_LOG_JSON=1` switches to JSON lines.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json = std::env::var("AQ_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        // already installed (tests, embedding)
        tracing::debug!("tracing subscriber already set");
    }
}

/// One-time metric descriptions (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "aq_upstream_requests_total",
            "Upstream series requests by outcome (ok, timeout, upstream, network)."
        );
        describe_histogram!("aq_upstream_fetch_ms", "Upstream request latency in milliseconds.");
        describe_counter!(
            "aq_city_aggregations_total",
            "City aggregation calls by outcome (ok, no_data, not_found)."
        );
        describe_counter!("aq_sync_passes_total", "Completed sync passes.");
        describe_counter!(
            "aq_sync_sites_failed_total",
            "Site fetches that failed during sync passes."
        );
        describe_gauge!("aq_sync_last_pass_ts", "Unix ts when the last sync pass finished.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Only one recorder may exist per process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
