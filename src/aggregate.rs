//! # City aggregation
//! Fans a query out over every site in a city, merges the per-site series by
//! timestamp and reduces each timestamp to mean/min/max across sites.
//!
//! Site fetches run concurrently under a shared semaphore, each in its own
//! task, so a slow, failing or panicking site only removes itself from the
//! result. Per-site results are merged in site-id order, which keeps the
//! output identical regardless of which fetch finished first.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::catalog::Catalog;
use crate::ingest::fetch_series;
use crate::ingest::parse::{round2, RecordParser};
use crate::ingest::types::{FetchError, SeriesPair, SiteFetcher, TimeWindow};

/// Cross-site summary for one pollutant at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedPoint {
    pub timestamp: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub sites_reporting: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CityFetchResult {
    /// Lowercase catalog key.
    pub city: String,
    pub site_ids_requested: BTreeSet<String>,
    /// Sites that returned at least one observation.
    pub site_ids_successful: BTreeSet<String>,
    pub pm25: Vec<AggregatedPoint>,
    pub pm10: Vec<AggregatedPoint>,
}

impl CityFetchResult {
    pub fn total_points(&self) -> usize {
        self.pm25.len() + self.pm10.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    #[error("City '{city}' not found. Available cities: {}", available_cities.join(", "))]
    NotFound {
        city: String,
        available_cities: Vec<String>,
    },
    #[error("No data available from any site in {city} for the specified time range")]
    NoData { city: String },
}

pub struct CityAggregator {
    catalog: Arc<Catalog>,
    fetcher: Arc<dyn SiteFetcher>,
    parser: Arc<RecordParser>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl CityAggregator {
    /// `max_concurrent` bounds upstream requests across all aggregation calls
    /// sharing this aggregator (minimum 1).
    pub fn new(
        catalog: Arc<Catalog>,
        fetcher: Arc<dyn SiteFetcher>,
        parser: Arc<RecordParser>,
        max_concurrent: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            parser,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub async fn aggregate(
        &self,
        city: &str,
        window: &TimeWindow,
    ) -> Result<CityFetchResult, AggregateError> {
        let key = city.trim().to_ascii_lowercase();
        let site_ids = self.catalog.city_sites(&key);
        if site_ids.is_empty() {
            counter!("aq_city_aggregations_total", "outcome" => "not_found").increment(1);
            return Err(AggregateError::NotFound {
                city: city.to_string(),
                available_cities: self.catalog.cities(),
            });
        }

        tracing::info!(
            target: "aggregate",
            city = %key,
            sites = site_ids.len(),
            start = window.start(),
            end = window.end(),
            "aggregating city"
        );

        let per_site = self.fetch_all(site_ids, window).await;

        if per_site.is_empty() {
            counter!("aq_city_aggregations_total", "outcome" => "no_data").increment(1);
            tracing::warn!(target: "aggregate", city = %key, "no site returned data");
            return Err(AggregateError::NoData { city: key });
        }

        let (pm25, pm10) = merge_series(per_site.values());
        let result = CityFetchResult {
            city: key,
            site_ids_requested: site_ids.iter().cloned().collect(),
            site_ids_successful: per_site.into_keys().collect(),
            pm25,
            pm10,
        };

        counter!("aq_city_aggregations_total", "outcome" => "ok").increment(1);
        tracing::info!(
            target: "aggregate",
            city = %result.city,
            succeeded = result.site_ids_successful.len(),
            requested = result.site_ids_requested.len(),
            points = result.total_points(),
            "aggregated city"
        );
        Ok(result)
    }

    /// Fetch + parse every site concurrently. Returns only sites with data,
    /// keyed (and therefore ordered) by site id.
    async fn fetch_all(
        &self,
        site_ids: &[String],
        window: &TimeWindow,
    ) -> BTreeMap<String, SeriesPair> {
        let mut tasks = JoinSet::new();
        let mut site_of = HashMap::with_capacity(site_ids.len());

        for site_id in site_ids {
            let fetcher = Arc::clone(&self.fetcher);
            let parser = Arc::clone(&self.parser);
            let permits = Arc::clone(&self.permits);
            let window = window.clone();
            let timeout = self.timeout;
            let id = site_id.clone();

            let handle = tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| FetchError::Network {
                        detail: "fetch pool closed".to_string(),
                    })?;
                fetch_series(fetcher.as_ref(), &parser, &id, &window, timeout).await
            });
            site_of.insert(handle.id(), site_id.clone());
        }

        let mut per_site = BTreeMap::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((task_id, Ok(series))) => {
                    let site_id = site_of.remove(&task_id).unwrap_or_default();
                    if series.is_empty() {
                        tracing::debug!(
                            target: "aggregate",
                            %site_id,
                            "site returned no observations"
                        );
                        continue;
                    }
                    per_site.insert(site_id, series);
                }
                Ok((task_id, Err(e))) => {
                    let site_id = site_of.remove(&task_id).unwrap_or_default();
                    tracing::warn!(
                        target: "aggregate",
                        %site_id,
                        kind = e.kind(),
                        error = %e,
                        "skipping site"
                    );
                }
                Err(join_err) => {
                    let site_id = site_of.remove(&join_err.id()).unwrap_or_default();
                    tracing::error!(
                        target: "aggregate",
                        %site_id,
                        error = %join_err,
                        "site task aborted; skipping site"
                    );
                }
            }
        }
        per_site
    }
}

/// Merge per-site series by timestamp and summarize each pollutant. Output is
/// sorted ascending by timestamp.
pub fn merge_series<'a, I>(per_site: I) -> (Vec<AggregatedPoint>, Vec<AggregatedPoint>)
where
    I: IntoIterator<Item = &'a SeriesPair>,
{
    let mut pm25: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut pm10: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for series in per_site {
        for o in &series.pm25 {
            pm25.entry(o.timestamp.clone()).or_default().push(o.value);
        }
        for o in &series.pm10 {
            pm10.entry(o.timestamp.clone()).or_default().push(o.value);
        }
    }
    (summarize(pm25), summarize(pm10))
}

fn summarize(by_ts: BTreeMap<String, Vec<f64>>) -> Vec<AggregatedPoint> {
    by_ts
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(timestamp, values)| {
            let n = values.len();
            let sum: f64 = values.iter().sum();
            // huge readings can overflow the sum; average piecewise then
            let mean = if sum.is_finite() {
                sum / n as f64
            } else {
                values.iter().map(|v| v / n as f64).sum()
            };
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            AggregatedPoint {
                timestamp,
                mean: round2(mean),
                min: round2(min),
                max: round2(max),
                sites_reporting: n,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Observation;

    fn series(pm25: &[(&str, f64)], pm10: &[(&str, f64)]) -> SeriesPair {
        let obs = |v: &[(&str, f64)]| {
            v.iter()
                .map(|(ts, value)| Observation {
                    timestamp: ts.to_string(),
                    value: *value,
                })
                .collect()
        };
        SeriesPair {
            pm25: obs(pm25),
            pm10: obs(pm10),
        }
    }

    #[test]
    fn two_sites_same_timestamp_are_averaged() {
        let a = series(&[("2024-03-10 00:00:00", 40.0)], &[]);
        let b = series(&[("2024-03-10 00:00:00", 60.0)], &[]);
        let (pm25, pm10) = merge_series([&a, &b]);
        assert!(pm10.is_empty());
        assert_eq!(
            pm25,
            vec![AggregatedPoint {
                timestamp: "2024-03-10 00:00:00".into(),
                mean: 50.0,
                min: 40.0,
                max: 60.0,
                sites_reporting: 2,
            }]
        );
    }

    #[test]
    fn output_is_sorted_by_timestamp() {
        let a = series(&[("2024-03-10 00:30:00", 1.0), ("2024-03-10 00:00:00", 2.0)], &[]);
        let b = series(&[("2024-03-10 00:15:00", 3.0)], &[]);
        let (pm25, _) = merge_series([&a, &b]);
        let ts: Vec<_> = pm25.iter().map(|p| p.timestamp.as_str()).collect();
        assert_eq!(
            ts,
            vec!["2024-03-10 00:00:00", "2024-03-10 00:15:00", "2024-03-10 00:30:00"]
        );
    }

    #[test]
    fn merge_order_does_not_change_result() {
        let a = series(&[("t1", 10.1), ("t2", 3.33)], &[("t1", 7.0)]);
        let b = series(&[("t1", 20.2)], &[("t1", 8.0), ("t3", 1.0)]);
        let c = series(&[("t1", 30.3), ("t2", 4.44)], &[]);
        let forward = merge_series([&a, &b, &c]);
        let backward = merge_series([&c, &b, &a]);
        let shuffled = merge_series([&b, &a, &c]);
        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn mean_lies_between_min_and_max() {
        let sites: Vec<_> = [12.34, 0.01, 99.99, 45.67, 45.68]
            .iter()
            .map(|v| series(&[("t", *v)], &[("t", v * 2.0)]))
            .collect();
        let (pm25, pm10) = merge_series(sites.iter());
        for p in pm25.iter().chain(pm10.iter()) {
            assert!(p.min <= p.mean && p.mean <= p.max, "{p:?}");
            assert_eq!(p.sites_reporting, 5);
        }
    }

    #[test]
    fn huge_readings_do_not_overflow_the_mean() {
        let a = series(&[("t", 1e308)], &[]);
        let b = series(&[("t", 1e308)], &[]);
        let (pm25, _) = merge_series([&a, &b]);
        assert!(pm25[0].mean.is_finite());
        assert!(pm25[0].min <= pm25[0].mean && pm25[0].mean <= pm25[0].max);
    }

    #[test]
    fn mean_is_rounded_after_averaging() {
        let a = series(&[("t", 1.0)], &[]);
        let b = series(&[("t", 1.0)], &[]);
        let c = series(&[("t", 2.0)], &[]);
        let (pm25, _) = merge_series([&a, &b, &c]);
        assert_eq!(pm25[0].mean, 1.33);
    }
}
