// src/ingest/types.rs
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::Serialize;

/// Upstream and query bounds use minute precision, e.g. `2024-03-10T00:00`.
pub const WINDOW_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// One reading of one pollutant. `value` is always finite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub timestamp: String, // opaque, as emitted upstream
    pub value: f64,
}

/// Parsed output of one site fetch, in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesPair {
    pub pm25: Vec<Observation>,
    pub pm10: Vec<Observation>,
}

impl SeriesPair {
    pub fn is_empty(&self) -> bool {
        self.pm25.is_empty() && self.pm10.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pm25.len() + self.pm10.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("invalid {field} '{value}': expected YYYY-MM-DDTHH:MM")]
    Format { field: &'static str, value: String },
    #[error("start {start} is after end {end}")]
    Inverted { start: String, end: String },
}

/// Inclusive `[start, end]` query window in [`WINDOW_FORMAT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    start: String,
    end: String,
}

impl TimeWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self, WindowError> {
        let s = parse_bound("start", start)?;
        let e = parse_bound("end", end)?;
        if s > e {
            return Err(WindowError::Inverted {
                start: start.trim().to_string(),
                end: end.trim().to_string(),
            });
        }
        Ok(Self {
            start: s.format(WINDOW_FORMAT).to_string(),
            end: e.format(WINDOW_FORMAT).to_string(),
        })
    }

    /// The last `minutes` up to `now`.
    pub fn trailing(now: DateTime<Utc>, minutes: i64) -> Self {
        let start = now - TimeDelta::minutes(minutes.max(0));
        Self {
            start: start.format(WINDOW_FORMAT).to_string(),
            end: now.format(WINDOW_FORMAT).to_string(),
        }
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }
}

fn parse_bound(field: &'static str, raw: &str) -> Result<NaiveDateTime, WindowError> {
    NaiveDateTime::parse_from_str(raw.trim(), WINDOW_FORMAT).map_err(|_| WindowError::Format {
        field,
        value: raw.to_string(),
    })
}

/// Why a single site fetch produced no body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream returned HTTP {status}")]
    Upstream { status: u16 },
    #[error("network error: {detail}")]
    Network { detail: String },
}

impl FetchError {
    /// Short label for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::Upstream { .. } => "upstream",
            FetchError::Network { .. } => "network",
        }
    }
}

/// Source of raw per-site series text. One call = one upstream request;
/// implementations never retry.
#[async_trait::async_trait]
pub trait SiteFetcher: Send + Sync {
    async fn fetch(
        &self,
        site_id: &str,
        window: &TimeWindow,
        timeout: Duration,
    ) -> Result<String, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_accepts_minute_precision_bounds() {
        let w = TimeWindow::parse("2024-03-10T00:00", " 2024-03-15T23:59 ").unwrap();
        assert_eq!(w.start(), "2024-03-10T00:00");
        assert_eq!(w.end(), "2024-03-15T23:59");
    }

    #[test]
    fn window_rejects_bad_format_and_inversion() {
        assert!(matches!(
            TimeWindow::parse("2024-03-10", "2024-03-15T23:59"),
            Err(WindowError::Format { field: "start", .. })
        ));
        assert!(matches!(
            TimeWindow::parse("2024-03-10T00:00", "2024-03-10 01:00"),
            Err(WindowError::Format { field: "end", .. })
        ));
        assert!(matches!(
            TimeWindow::parse("2024-03-15T00:00", "2024-03-10T00:00"),
            Err(WindowError::Inverted { .. })
        ));
    }

    #[test]
    fn trailing_window_ends_at_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 7, 31).unwrap();
        let w = TimeWindow::trailing(now, 30);
        assert_eq!(w.start(), "2024-03-10T11:37");
        assert_eq!(w.end(), "2024-03-10T12:07");
    }

    #[test]
    fn trailing_window_crosses_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 10, 0).unwrap();
        let w = TimeWindow::trailing(now, 30);
        assert_eq!(w.start(), "2024-03-09T23:40");
    }
}
