use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::aggregate::{AggregateError, AggregatedPoint, CityAggregator};
use crate::catalog::{title_case, Catalog, Coordinates, SiteInfo};
use crate::ingest::fetch_series;
use crate::ingest::parse::RecordParser;
use crate::ingest::types::{FetchError, Observation, SiteFetcher, TimeWindow, WindowError};
use crate::store::SideStore;

#[derive(Clone)]
pub struct AppState {
    catalog: Arc<Catalog>,
    fetcher: Arc<dyn SiteFetcher>,
    parser: Arc<RecordParser>,
    aggregator: Arc<CityAggregator>,
    store: Arc<SideStore>,
    query_timeout: Duration,
}

impl AppState {
    pub fn new(
        catalog: Arc<Catalog>,
        fetcher: Arc<dyn SiteFetcher>,
        parser: Arc<RecordParser>,
        store: SideStore,
        max_concurrent_fetches: usize,
        query_timeout: Duration,
    ) -> Self {
        let aggregator = CityAggregator::new(
            Arc::clone(&catalog),
            Arc::clone(&fetcher),
            Arc::clone(&parser),
            max_concurrent_fetches,
            query_timeout,
        );
        Self {
            catalog,
            fetcher,
            parser,
            aggregator: Arc::new(aggregator),
            store: Arc::new(store),
            query_timeout,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/site-data", get(site_data))
        .route("/api/city-data", get(city_data))
        .route("/api/cities", get(list_cities))
        .route("/api/sites", get(list_sites))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Handler failures. Bodies are `{"detail": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    InvalidWindow(#[from] WindowError),
    #[error("{}", .0.body_text())]
    InvalidQuery(#[from] QueryRejection),
    #[error("Error connecting to air quality API: {0}")]
    UpstreamDown(String),
    #[error("Air quality API did not respond in time")]
    UpstreamTimeout,
    #[error("Failed to fetch data from external API: {status}")]
    Upstream { status: u16 },
}

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Timeout => ApiError::UpstreamTimeout,
            FetchError::Upstream { status } => ApiError::Upstream { status },
            FetchError::Network { detail } => ApiError::UpstreamDown(detail),
        }
    }
}

impl From<AggregateError> for ApiError {
    fn from(e: AggregateError) -> Self {
        ApiError::NotFound(e.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidWindow(_) | ApiError::InvalidQuery(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::UpstreamDown(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            // pass upstream 5xx through; anything else is our gateway's problem
            ApiError::Upstream { status } => StatusCode::from_u16(*status)
                .ok()
                .filter(StatusCode::is_server_error)
                .unwrap_or(StatusCode::BAD_GATEWAY),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Query endpoints
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SiteDataQuery {
    site_id: String,
    start: String,
    end: String,
}

#[derive(Serialize)]
struct SiteDataResponse {
    site_id: String,
    site_name: String,
    city: String,
    coordinates: Coordinates,
    start: String,
    end: String,
    pm25_data: Vec<Observation>,
    pm10_data: Vec<Observation>,
    data_points: usize,
    timestamp: DateTime<Utc>,
}

async fn site_data(
    State(state): State<AppState>,
    query: Result<Query<SiteDataQuery>, QueryRejection>,
) -> Result<Json<SiteDataResponse>, ApiError> {
    let Query(q) = query?;
    tracing::info!(
        target: "api",
        site_id = %q.site_id,
        start = %q.start,
        end = %q.end,
        "site data request"
    );
    let window = TimeWindow::parse(&q.start, &q.end)?;

    let info = state.catalog.site(&q.site_id).ok_or_else(|| {
        ApiError::NotFound(format!(
            "Site '{}' not found. Use /api/sites to see available sites.",
            q.site_id
        ))
    })?;

    let series = fetch_series(
        state.fetcher.as_ref(),
        &state.parser,
        &q.site_id,
        &window,
        state.query_timeout,
    )
    .await?;
    if series.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No data found for {} ({}) in the specified time range",
            q.site_id, info.name
        )));
    }

    let data_points = series.len();
    Ok(Json(SiteDataResponse {
        site_id: q.site_id,
        site_name: info.name.clone(),
        city: info.city.clone(),
        coordinates: info.coordinates(),
        start: window.start().to_string(),
        end: window.end().to_string(),
        pm25_data: series.pm25,
        pm10_data: series.pm10,
        data_points,
        timestamp: Utc::now(),
    }))
}

#[derive(Deserialize)]
struct CityDataQuery {
    city: String,
    start: String,
    end: String,
}

#[derive(Serialize)]
struct CityDataResponse {
    city: String,
    start: String,
    end: String,
    sites_count: usize,
    sites_requested: Vec<String>,
    sites_included: Vec<String>,
    pm25_aggregated: Vec<AggregatedPoint>,
    pm10_aggregated: Vec<AggregatedPoint>,
    total_data_points: usize,
    timestamp: DateTime<Utc>,
}

async fn city_data(
    State(state): State<AppState>,
    query: Result<Query<CityDataQuery>, QueryRejection>,
) -> Result<Json<CityDataResponse>, ApiError> {
    let Query(q) = query?;
    tracing::info!(
        target: "api",
        city = %q.city,
        start = %q.start,
        end = %q.end,
        "city data request"
    );
    let window = TimeWindow::parse(&q.start, &q.end)?;
    let result = state.aggregator.aggregate(&q.city, &window).await?;

    let total_data_points = result.total_points();
    Ok(Json(CityDataResponse {
        city: title_case(&result.city),
        start: window.start().to_string(),
        end: window.end().to_string(),
        sites_count: result.site_ids_requested.len(),
        sites_requested: result.site_ids_requested.into_iter().collect(),
        sites_included: result.site_ids_successful.into_iter().collect(),
        pm25_aggregated: result.pm25,
        pm10_aggregated: result.pm10,
        total_data_points,
        timestamp: Utc::now(),
    }))
}

// ---------------------------------------------------------------------------
// Catalog endpoints
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SiteSummary<'a> {
    site_id: &'a str,
    name: &'a str,
    coordinates: Coordinates,
}

#[derive(Serialize)]
struct CityListing<'a> {
    city: String,
    sites_count: usize,
    sites: Vec<SiteSummary<'a>>,
}

async fn list_cities(State(state): State<AppState>) -> Response {
    let catalog = &state.catalog;
    let cities: Vec<CityListing<'_>> = catalog
        .cities()
        .into_iter()
        .map(|city| {
            let sites: Vec<SiteSummary<'_>> = catalog
                .city_sites(&city)
                .iter()
                .filter_map(|id| {
                    catalog.site(id).map(|info| SiteSummary {
                        site_id: id.as_str(),
                        name: info.name.as_str(),
                        coordinates: info.coordinates(),
                    })
                })
                .collect();
            CityListing {
                city: title_case(&city),
                sites_count: catalog.city_sites(&city).len(),
                sites,
            }
        })
        .collect();
    let total_sites: usize = cities.iter().map(|c| c.sites_count).sum();

    Json(json!({
        "cities": cities,
        "total_cities": cities.len(),
        "total_sites": total_sites,
    }))
    .into_response()
}

#[derive(Deserialize)]
struct SitesQuery {
    city: Option<String>,
}

#[derive(Serialize)]
struct SiteRow<'a> {
    site_id: &'a str,
    #[serde(flatten)]
    info: &'a SiteInfo,
}

async fn list_sites(
    State(state): State<AppState>,
    query: Result<Query<SitesQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(q) = query?;
    let catalog = &state.catalog;
    match q.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(city) => {
            let ids = catalog.city_sites(city);
            if ids.is_empty() {
                return Err(ApiError::NotFound(format!("City '{city}' not found")));
            }
            let sites: Vec<SiteRow<'_>> = ids
                .iter()
                .filter_map(|id| catalog.site(id).map(|info| SiteRow { site_id: id, info }))
                .collect();
            Ok(Json(json!({
                "city": title_case(city),
                "count": sites.len(),
                "sites": sites,
            }))
            .into_response())
        }
        None => {
            let sites: Vec<SiteRow<'_>> = catalog
                .sites()
                .map(|(site_id, info)| SiteRow { site_id, info })
                .collect();
            Ok(Json(json!({
                "count": sites.len(),
                "sites": sites,
            }))
            .into_response())
        }
    }
}

// ---------------------------------------------------------------------------
// Service endpoints
// ---------------------------------------------------------------------------

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Air Quality Proxy API",
        "status": "running",
        "timestamp": Utc::now().to_rfc3339(),
        "endpoints": {
            "site_data": "/api/site-data",
            "city_data": "/api/city-data",
            "cities": "/api/cities",
            "sites": "/api/sites",
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "database": state.store.status_label(),
    }))
}
