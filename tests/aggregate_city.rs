// tests/aggregate_city.rs
//
// City fan-out against a scripted fetcher: partial failure, isolation,
// concurrency bound and per-site timeouts.

mod common;

use std::sync::Arc;
use std::time::Duration;

use air_quality_proxy::aggregate::{AggregateError, CityAggregator};
use air_quality_proxy::catalog::{Catalog, SiteInfo};
use air_quality_proxy::ingest::parse::RecordParser;
use air_quality_proxy::ingest::types::{FetchError, TimeWindow};

use common::{csv, Reply, StubFetcher};

fn window() -> TimeWindow {
    TimeWindow::parse("2024-03-10T00:00", "2024-03-10T23:59").unwrap()
}

fn info(name: &str) -> SiteInfo {
    SiteInfo {
        name: name.to_string(),
        city: "Testville".to_string(),
        lat: 0.0,
        lon: 0.0,
    }
}

/// One city ("testville") with sites s1..=sn.
fn small_catalog(n: usize) -> Arc<Catalog> {
    let ids: Vec<String> = (1..=n).map(|i| format!("s{i}")).collect();
    Arc::new(Catalog::from_parts(
        ids.iter().map(|id| (id.clone(), info(id))),
        [("Testville".to_string(), ids.clone())],
    ))
}

fn aggregator(
    catalog: Arc<Catalog>,
    fetcher: Arc<StubFetcher>,
    max_concurrent: usize,
    timeout: Duration,
) -> CityAggregator {
    CityAggregator::new(
        catalog,
        fetcher,
        Arc::new(RecordParser::default()),
        max_concurrent,
        timeout,
    )
}

#[tokio::test]
async fn unknown_city_lists_available_cities() {
    let fetcher = Arc::new(StubFetcher::new(Reply::Body(String::new())));
    let agg = aggregator(
        Arc::new(Catalog::builtin()),
        fetcher.clone(),
        4,
        Duration::from_secs(5),
    );

    let err = agg.aggregate("atlantis", &window()).await.unwrap_err();
    assert_eq!(
        err,
        AggregateError::NotFound {
            city: "atlantis".into(),
            available_cities: vec![
                "delhi".into(),
                "bengaluru".into(),
                "hyderabad".into(),
                "kolkata".into(),
                "mumbai".into(),
            ],
        }
    );
    assert!(
        err.to_string().contains("delhi, bengaluru, hyderabad, kolkata, mumbai"),
        "message should list cities: {err}"
    );
    assert!(fetcher.calls().is_empty(), "no upstream calls for unknown city");
}

#[tokio::test]
async fn all_sites_empty_is_no_data() {
    let fetcher = Arc::new(StubFetcher::new(Reply::Body(common::HEADER.to_string())));
    let agg = aggregator(
        Arc::new(Catalog::builtin()),
        fetcher.clone(),
        8,
        Duration::from_secs(5),
    );

    let err = agg.aggregate("Delhi", &window()).await.unwrap_err();
    assert_eq!(err, AggregateError::NoData { city: "delhi".into() });
    assert_eq!(fetcher.calls().len(), 33, "every delhi site is attempted once");
}

#[tokio::test]
async fn two_sites_same_timestamp_are_summarized() {
    let fetcher = Arc::new(
        StubFetcher::new(Reply::Body(common::HEADER.to_string()))
            .with("s1", Reply::Body(csv(&[("2024-03-10 00:00:00", "40", "NaN")])))
            .with("s2", Reply::Body(csv(&[("2024-03-10 00:00:00", "60", "")]))),
    );
    let agg = aggregator(small_catalog(2), fetcher, 2, Duration::from_secs(5));

    let res = agg.aggregate("testville", &window()).await.unwrap();
    assert_eq!(res.pm25.len(), 1);
    let p = &res.pm25[0];
    assert_eq!(p.timestamp, "2024-03-10 00:00:00");
    assert_eq!((p.mean, p.min, p.max, p.sites_reporting), (50.0, 40.0, 60.0, 2));
    assert!(res.pm10.is_empty());
    assert_eq!(res.total_points(), 1);
}

#[tokio::test]
async fn partial_failure_keeps_healthy_sites() {
    let body = csv(&[
        ("2024-03-10 00:00:00", "10", "20"),
        ("2024-03-10 00:15:00", "12", "22"),
    ]);
    let fetcher = Arc::new(
        StubFetcher::new(Reply::Body(body))
            .with("s2", Reply::Fail(FetchError::Upstream { status: 500 }))
            .with("s3", Reply::Fail(FetchError::Network { detail: "refused".into() }))
            .with("s4", Reply::Body(common::HEADER.to_string())),
    );
    let agg = aggregator(small_catalog(4), fetcher, 4, Duration::from_secs(5));

    let res = agg.aggregate("testville", &window()).await.unwrap();
    assert_eq!(
        res.site_ids_requested.iter().cloned().collect::<Vec<_>>(),
        vec!["s1", "s2", "s3", "s4"]
    );
    assert_eq!(
        res.site_ids_successful.iter().cloned().collect::<Vec<_>>(),
        vec!["s1"]
    );
    assert!(res.site_ids_successful.is_subset(&res.site_ids_requested));
    assert!(res.pm25.iter().all(|p| p.sites_reporting == 1));
    assert_eq!(res.total_points(), 4);
}

#[tokio::test]
async fn panicking_site_is_isolated() {
    let fetcher = Arc::new(
        StubFetcher::new(Reply::Body(csv(&[("2024-03-10 00:00:00", "30", "50")])))
            .with("s2", Reply::Panic),
    );
    let agg = aggregator(small_catalog(3), fetcher, 3, Duration::from_secs(5));

    let res = agg.aggregate("testville", &window()).await.unwrap();
    assert_eq!(
        res.site_ids_successful.iter().cloned().collect::<Vec<_>>(),
        vec!["s1", "s3"]
    );
    assert_eq!(res.pm25[0].sites_reporting, 2);
}

#[tokio::test(start_paused = true)]
async fn slow_site_times_out_without_sinking_the_city() {
    let fetcher = Arc::new(
        StubFetcher::new(Reply::Body(csv(&[("2024-03-10 00:00:00", "5", "6")])))
            .with("s1", Reply::Hang),
    );
    let agg = aggregator(small_catalog(3), fetcher, 3, Duration::from_secs(2));

    let started = tokio::time::Instant::now();
    let res = agg.aggregate("testville", &window()).await.unwrap();
    assert!(started.elapsed() <= Duration::from_secs(3));
    assert!(!res.site_ids_successful.contains("s1"));
    assert_eq!(res.site_ids_successful.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn in_flight_requests_never_exceed_bound() {
    let fetcher = Arc::new(
        StubFetcher::new(Reply::Body(csv(&[("2024-03-10 00:00:00", "1", "2")])))
            .with_delay(Duration::from_millis(50)),
    );
    let agg = aggregator(small_catalog(12), fetcher.clone(), 3, Duration::from_secs(5));

    let res = agg.aggregate("testville", &window()).await.unwrap();
    assert_eq!(res.site_ids_successful.len(), 12);
    assert_eq!(fetcher.calls().len(), 12);
    assert!(
        fetcher.max_in_flight() <= 3,
        "max in flight = {}",
        fetcher.max_in_flight()
    );
}

#[tokio::test]
async fn bound_is_shared_across_concurrent_calls() {
    let fetcher = Arc::new(
        StubFetcher::new(Reply::Body(csv(&[("2024-03-10 00:00:00", "1", "2")])))
            .with_delay(Duration::from_millis(20)),
    );
    let agg = Arc::new(aggregator(
        small_catalog(6),
        fetcher.clone(),
        2,
        Duration::from_secs(5),
    ));

    let w = window();
    let (a, b) = tokio::join!(
        agg.aggregate("testville", &w),
        agg.aggregate("TESTVILLE", &w)
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(fetcher.calls().len(), 12);
    assert!(fetcher.max_in_flight() <= 2);
}

#[tokio::test]
async fn every_site_receives_the_same_window() {
    let fetcher = Arc::new(StubFetcher::new(Reply::Body(csv(&[(
        "2024-03-10 00:00:00",
        "1",
        "2",
    )]))));
    let agg = aggregator(small_catalog(5), fetcher.clone(), 5, Duration::from_secs(5));
    agg.aggregate("testville", &window()).await.unwrap();

    let w = window();
    assert!(fetcher.calls().iter().all(|(_, cw)| *cw == w));
}
