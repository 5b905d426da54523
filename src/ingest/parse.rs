// src/ingest/parse.rs
//! CSV series parser.
//!
//! The upstream API answers with one row per 15-minute bucket:
//!
//! ```text
//! timestamp,pm2.5cnc,pm10cnc
//! 2024-03-10 00:00:00,45.2,78.5
//! 2024-03-10 00:15:00,NaN,79.2
//! ```
//!
//! Gap-filled buckets carry a sentinel (`NaN`) instead of being omitted, so the
//! sentinel must read as "absent" and never as zero. A bad cell costs one
//! value, never the whole response.

use serde::{Deserialize, Serialize};

use crate::ingest::types::{Observation, SeriesPair};

fn default_absent_tokens() -> Vec<String> {
    vec!["nan".to_string(), "null".to_string()]
}
fn default_timestamp_field() -> String {
    "timestamp".to_string()
}
fn default_pm25_field() -> String {
    "pm2.5cnc".to_string()
}
fn default_pm10_field() -> String {
    "pm10cnc".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Cell values (case-insensitive) that mean "no reading".
    #[serde(default = "default_absent_tokens")]
    pub absent_tokens: Vec<String>,
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    #[serde(default = "default_pm25_field")]
    pub pm25_field: String,
    #[serde(default = "default_pm10_field")]
    pub pm10_field: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            absent_tokens: default_absent_tokens(),
            timestamp_field: default_timestamp_field(),
            pm25_field: default_pm25_field(),
            pm10_field: default_pm10_field(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordParser {
    cfg: ParserConfig,
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

impl RecordParser {
    pub fn new(mut cfg: ParserConfig) -> Self {
        cfg.absent_tokens = cfg
            .absent_tokens
            .iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { cfg }
    }

    /// Empty cells and configured sentinels carry no reading.
    pub fn is_absent(&self, cell: &str) -> bool {
        let cell = cell.trim();
        cell.is_empty()
            || self
                .cfg
                .absent_tokens
                .iter()
                .any(|t| t.eq_ignore_ascii_case(cell))
    }

    /// Present, numeric and finite cell -> value rounded to 2 dp.
    fn value_of(&self, cell: &str) -> Option<f64> {
        if self.is_absent(cell) {
            return None;
        }
        cell.trim()
            .parse::<f64>()
            .ok()
            .map(round2)
            .filter(|v| v.is_finite())
    }

    /// Split a raw response into per-pollutant observation lists. Never fails;
    /// structural problems show up as empty lists.
    pub fn parse(&self, raw: &str) -> SeriesPair {
        let mut out = SeriesPair::default();

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(raw.as_bytes());

        let headers = match rdr.headers() {
            Ok(h) => h.clone(),
            Err(e) => {
                tracing::debug!(target: "parse", error = %e, "unreadable header row");
                return out;
            }
        };

        let Some(ts_idx) = column(&headers, &self.cfg.timestamp_field) else {
            tracing::debug!(
                target: "parse",
                headers = ?headers.iter().collect::<Vec<_>>(),
                "no timestamp column; treating as no data"
            );
            return out;
        };
        let pm25_idx = column(&headers, &self.cfg.pm25_field);
        let pm10_idx = column(&headers, &self.cfg.pm10_field);

        let mut skipped_rows = 0usize;
        for rec in rdr.records() {
            let rec = match rec {
                Ok(r) => r,
                Err(_) => {
                    skipped_rows += 1;
                    continue;
                }
            };
            let ts = rec.get(ts_idx).map(str::trim).unwrap_or_default();

            if let Some(v) = pm25_idx.and_then(|i| rec.get(i)).and_then(|c| self.value_of(c)) {
                out.pm25.push(Observation {
                    timestamp: ts.to_string(),
                    value: v,
                });
            }
            if let Some(v) = pm10_idx.and_then(|i| rec.get(i)).and_then(|c| self.value_of(c)) {
                out.pm10.push(Observation {
                    timestamp: ts.to_string(),
                    value: v,
                });
            }
        }

        tracing::debug!(
            target: "parse",
            pm25 = out.pm25.len(),
            pm10 = out.pm10.len(),
            skipped_rows,
            "parsed series"
        );
        out
    }
}

fn column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
}

/// Round to 2 decimal places, exact ties to even (`0.125` -> `0.12`).
/// Magnitudes too large to scale are returned unchanged.
pub fn round2(v: f64) -> f64 {
    let scaled = v * 100.0;
    if !scaled.is_finite() {
        return v;
    }
    scaled.round_ties_even() / 100.0
}
