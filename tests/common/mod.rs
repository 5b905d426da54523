// tests/common/mod.rs
//
// Shared fixtures: a scripted in-memory SiteFetcher and a manual Clock.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use air_quality_proxy::clock::Clock;
use air_quality_proxy::ingest::types::{FetchError, SiteFetcher, TimeWindow};

pub const HEADER: &str = "timestamp,pm2.5cnc,pm10cnc";

/// CSV body from `(timestamp, pm25, pm10)` rows; cells are written verbatim.
pub fn csv(rows: &[(&str, &str, &str)]) -> String {
    let mut out = String::from(HEADER);
    for (ts, pm25, pm10) in rows {
        out.push('\n');
        out.push_str(&format!("{ts},{pm25},{pm10}"));
    }
    out
}

#[derive(Clone)]
pub enum Reply {
    Body(String),
    Fail(FetchError),
    /// Never completes; only a timeout gets the caller out.
    Hang,
    Panic,
}

/// Scripted fetcher. Unknown sites get `default`.
pub struct StubFetcher {
    replies: HashMap<String, Reply>,
    default: Reply,
    delay: Duration,
    calls: Mutex<Vec<(String, TimeWindow)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubFetcher {
    pub fn new(default: Reply) -> Self {
        Self {
            replies: HashMap::new(),
            default,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, site_id: &str, reply: Reply) -> Self {
        self.replies.insert(site_id.to_string(), reply);
        self
    }

    /// Hold every call for `delay` (tokio time) before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(String, TimeWindow)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_sites(&self) -> Vec<String> {
        self.calls().into_iter().map(|(s, _)| s).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SiteFetcher for StubFetcher {
    async fn fetch(
        &self,
        site_id: &str,
        window: &TimeWindow,
        _timeout: Duration,
    ) -> Result<String, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((site_id.to_string(), window.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.replies.get(site_id).unwrap_or(&self.default).clone() {
            Reply::Body(b) => Ok(b),
            Reply::Fail(e) => Err(e),
            Reply::Hang => std::future::pending().await,
            Reply::Panic => panic!("stub fetcher panic for {site_id}"),
        }
    }
}

/// Clock whose `now` advances only by the sleeps it is asked to perform.
/// Every sleep is recorded and yields once so other tasks can run.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
    /// Sleeps at least this long block forever (until shutdown wins the race).
    block_from: Option<Duration>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
            block_from: None,
        }
    }

    pub fn blocking_from(mut self, dur: Duration) -> Self {
        self.block_from = Some(dur);
        self
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, dur: Duration) {
        self.sleeps.lock().unwrap().push(dur);
        if self.block_from.is_some_and(|b| dur >= b) {
            std::future::pending::<()>().await;
        }
        {
            let mut now = self.now.lock().unwrap();
            *now += TimeDelta::from_std(dur).unwrap();
        }
        tokio::task::yield_now().await;
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
}

pub fn arc<T>(v: T) -> Arc<T> {
    Arc::new(v)
}
