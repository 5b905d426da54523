// src/ingest/scheduler.rs
//! Periodic upstream sync.
//!
//! Every `interval` the scheduler walks the whole catalog once (a "pass"),
//! fetching and parsing the trailing window for each site, strictly one site
//! at a time with a fixed pause in between. Nothing is stored; the pass exists
//! to verify upstream freshness and to log it. Errors never end the loop, and
//! shutdown is observed during every sleep and pause.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use metrics::{counter, gauge};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::ingest::fetch_series;
use crate::ingest::parse::RecordParser;
use crate::ingest::types::{FetchError, SiteFetcher, TimeWindow};

#[derive(Clone, Copy, Debug)]
pub struct SyncSchedulerCfg {
    pub interval: Duration,
    pub lookback_minutes: i64,
    pub pause_between_requests: Duration,
    pub request_timeout: Duration,
}

impl Default for SyncSchedulerCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            lookback_minutes: 30,
            pause_between_requests: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub attempted: usize,
    pub success_count: usize,
    pub fail_count: usize,
    /// Shutdown arrived before the pass covered every site.
    pub interrupted: bool,
}

pub struct SyncScheduler {
    catalog: Arc<Catalog>,
    fetcher: Arc<dyn SiteFetcher>,
    parser: Arc<RecordParser>,
    clock: Arc<dyn Clock>,
    cfg: SyncSchedulerCfg,
}

impl SyncScheduler {
    pub fn new(
        catalog: Arc<Catalog>,
        fetcher: Arc<dyn SiteFetcher>,
        parser: Arc<RecordParser>,
        clock: Arc<dyn Clock>,
        cfg: SyncSchedulerCfg,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            parser,
            clock,
            cfg,
        }
    }

    /// One sequential sweep over the de-duplicated site catalog.
    pub async fn run_pass(&self, shutdown: &mut watch::Receiver<bool>) -> PassSummary {
        let site_ids = self.catalog.all_site_ids();
        let total = site_ids.len();
        let mut summary = PassSummary::default();

        tracing::info!(target: "sync", sites = total, "starting sync pass");
        for city in self.catalog.cities() {
            tracing::debug!(
                target: "sync",
                city = %city,
                sites = self.catalog.city_sites(&city).len(),
                "city breakdown"
            );
        }

        for (i, site_id) in site_ids.iter().enumerate() {
            if *shutdown.borrow() {
                summary.interrupted = true;
                break;
            }
            let pause = self.cfg.pause_between_requests;
            if i > 0 && sleep_or_shutdown(self.clock.as_ref(), pause, shutdown).await {
                summary.interrupted = true;
                break;
            }

            summary.attempted += 1;
            let window = TimeWindow::trailing(self.clock.now(), self.cfg.lookback_minutes);
            let site_name = self
                .catalog
                .site(site_id)
                .map(|s| s.name.as_str())
                .unwrap_or(site_id.as_str());

            match self.sync_site(site_id, &window).await {
                Ok((pm25, pm10)) => {
                    summary.success_count += 1;
                    tracing::info!(
                        target: "sync",
                        n = i + 1,
                        total,
                        %site_id,
                        site = site_name,
                        pm25,
                        pm10,
                        "synced"
                    );
                }
                Err(e) => {
                    summary.fail_count += 1;
                    tracing::warn!(
                        target: "sync",
                        n = i + 1,
                        total,
                        %site_id,
                        site = site_name,
                        kind = e.kind(),
                        error = %e,
                        "sync failed"
                    );
                }
            }
        }
        summary
    }

    async fn sync_site(
        &self,
        site_id: &str,
        window: &TimeWindow,
    ) -> Result<(usize, usize), FetchError> {
        let series = fetch_series(
            self.fetcher.as_ref(),
            &self.parser,
            site_id,
            window,
            self.cfg.request_timeout,
        )
        .await?;
        Ok((series.pm25.len(), series.pm10.len()))
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            target: "sync",
            interval_secs = self.cfg.interval.as_secs(),
            "sync scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Own task so a panic inside the pass is contained. Dropping the
            // set (e.g. when this task is aborted) aborts the pass with it.
            let mut pass = JoinSet::new();
            let this = Arc::clone(&self);
            let mut pass_rx = shutdown.clone();
            pass.spawn(async move { this.run_pass(&mut pass_rx).await });

            let mut interrupted = false;
            match pass.join_next().await {
                Some(Ok(summary)) => {
                    counter!("aq_sync_passes_total").increment(1);
                    counter!("aq_sync_sites_failed_total").increment(summary.fail_count as u64);
                    gauge!("aq_sync_last_pass_ts").set(self.clock.now().timestamp() as f64);
                    tracing::info!(
                        target: "sync",
                        success_count = summary.success_count,
                        fail_count = summary.fail_count,
                        interrupted = summary.interrupted,
                        "sync pass completed"
                    );
                    interrupted = summary.interrupted;
                }
                Some(Err(e)) => {
                    tracing::error!(target: "sync", error = %e, "sync pass aborted");
                }
                None => {}
            }
            if interrupted {
                break;
            }

            let next = self.clock.now()
                + TimeDelta::from_std(self.cfg.interval).unwrap_or(TimeDelta::zero());
            tracing::info!(
                target: "sync",
                next_sync = %next.format("%Y-%m-%d %H:%M:%S UTC"),
                "sleeping until next sync"
            );
            if sleep_or_shutdown(self.clock.as_ref(), self.cfg.interval, &mut shutdown).await {
                break;
            }
        }

        tracing::info!(target: "sync", "sync scheduler stopped");
    }
}

/// Sleep on `clock`, returning early (with `true`) when shutdown is requested
/// or the shutdown sender is gone.
async fn sleep_or_shutdown(
    clock: &dyn Clock,
    dur: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    let sleep = clock.sleep(dur);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Loop observed the signal and exited on its own.
    Stopped,
    /// Grace period elapsed; the task (and any in-flight fetch) was aborted.
    Abandoned,
}

/// Owner of a running scheduler. Dropping it also stops the loop at its next
/// sleep or pause.
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait up to `grace` for the loop to exit.
    pub async fn shutdown(mut self, grace: Duration) -> ShutdownOutcome {
        let _ = self.shutdown.send(true);
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => ShutdownOutcome::Stopped,
            Ok(Err(e)) => {
                tracing::error!(target: "sync", error = %e, "sync scheduler task failed");
                ShutdownOutcome::Stopped
            }
            Err(_) => {
                self.task.abort();
                tracing::warn!(
                    target: "sync",
                    grace_secs = grace.as_secs(),
                    "sync scheduler did not stop in time; in-flight work abandoned"
                );
                ShutdownOutcome::Abandoned
            }
        }
    }
}

/// Spawn the scheduler on the current tokio runtime. The first pass starts
/// immediately.
pub fn spawn_sync_scheduler(scheduler: SyncScheduler) -> SyncHandle {
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(Arc::new(scheduler).run(rx));
    SyncHandle { shutdown: tx, task }
}
