// src/config/app.rs
use std::str::FromStr;
use std::time::Duration;
use std::{env, fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::ingest::parse::ParserConfig;
use crate::ingest::scheduler::SyncSchedulerCfg;
use crate::store::StoreConfig;

pub const ENV_API_BASE_URL: &str = "AQ_API_BASE_URL";
pub const ENV_API_KEY: &str = "AQ_API_KEY";
pub const ENV_SYNC_INTERVAL_SECS: &str = "AQ_SYNC_INTERVAL_SECS";
pub const ENV_SYNC_ENABLED: &str = "AQ_SYNC_ENABLED";
pub const ENV_MAX_CONCURRENT_FETCHES: &str = "AQ_MAX_CONCURRENT_FETCHES";
pub const ENV_BIND: &str = "AQ_BIND";
pub const ENV_STORE_URL: &str = "MONGODB_URL";
pub const ENV_STORE_REQUIRED: &str = "MONGODB_REQUIRED";
pub const ENV_STORE_DATABASE: &str = "DATABASE_NAME";

fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_query_timeout_secs() -> u64 {
    60
}
fn default_sync_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_max_concurrent_fetches() -> usize {
    8
}
fn default_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    15 * 60
}
fn default_lookback_minutes() -> i64 {
    30
}
fn default_pause_ms() -> u64 {
    2_000
}
fn default_shutdown_grace_secs() -> u64 {
    10
}
fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub base_url: String,
    /// "ENV" means: read from AQ_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: default_api_key(),
            query_timeout_secs: default_query_timeout_secs(),
            sync_timeout_secs: default_sync_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: i64,
    #[serde(default = "default_pause_ms")]
    pub pause_between_requests_ms: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            lookback_minutes: default_lookback_minutes(),
            pause_between_requests_ms: default_pause_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing air quality config toml")
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// Overlay environment variables on top of file values.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_string(ENV_API_BASE_URL) {
            self.upstream.base_url = v;
        }
        if let Some(v) = env_string(ENV_API_KEY) {
            self.upstream.api_key = v;
        } else if self.upstream.api_key.trim().eq_ignore_ascii_case("env") {
            bail!("Missing {ENV_API_KEY} env var");
        }
        if let Some(v) = env_parse::<u64>(ENV_SYNC_INTERVAL_SECS)? {
            self.sync.interval_secs = v;
        }
        if let Some(v) = env_string(ENV_SYNC_ENABLED) {
            self.sync.enabled = parse_flag(&v);
        }
        if let Some(v) = env_parse::<usize>(ENV_MAX_CONCURRENT_FETCHES)? {
            self.aggregation.max_concurrent_fetches = v;
        }
        if let Some(v) = env_string(ENV_BIND) {
            self.server.bind = v;
        }
        if let Some(v) = env_string(ENV_STORE_URL) {
            self.store.url = Some(v);
        }
        if let Some(v) = env_string(ENV_STORE_REQUIRED) {
            self.store.required = parse_flag(&v);
        }
        if let Some(v) = env_string(ENV_STORE_DATABASE) {
            self.store.database = v;
        }
        Ok(())
    }

    /// Reject unusable upstream settings; reset out-of-range numbers to defaults.
    pub fn validate(&mut self) -> Result<()> {
        self.upstream.base_url = self.upstream.base_url.trim().to_string();
        if self.upstream.base_url.is_empty() {
            bail!("upstream.base_url is not set (config file or {ENV_API_BASE_URL})");
        }
        if self.upstream.api_key.trim().is_empty() {
            bail!("upstream.api_key is empty");
        }

        if self.upstream.query_timeout_secs == 0 {
            self.upstream.query_timeout_secs = default_query_timeout_secs();
        }
        if self.upstream.sync_timeout_secs == 0 {
            self.upstream.sync_timeout_secs = default_sync_timeout_secs();
        }
        if self.aggregation.max_concurrent_fetches == 0 {
            self.aggregation.max_concurrent_fetches = default_max_concurrent_fetches();
        }
        if self.sync.interval_secs == 0 {
            self.sync.interval_secs = default_interval_secs();
        }
        if self.sync.lookback_minutes <= 0 {
            self.sync.lookback_minutes = default_lookback_minutes();
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.query_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.connect_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.sync.shutdown_grace_secs)
    }

    pub fn scheduler_cfg(&self) -> SyncSchedulerCfg {
        SyncSchedulerCfg {
            interval: Duration::from_secs(self.sync.interval_secs),
            lookback_minutes: self.sync.lookback_minutes,
            pause_between_requests: Duration::from_millis(self.sync.pause_between_requests_ms),
            request_timeout: Duration::from_secs(self.upstream.sync_timeout_secs),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_string(name)
        .map(|v| v.parse::<T>().with_context(|| format!("invalid {name}='{v}'")))
        .transpose()
}

fn parse_flag(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.upstream.query_timeout_secs, 60);
        assert_eq!(cfg.upstream.sync_timeout_secs, 30);
        assert_eq!(cfg.sync.interval_secs, 900);
        assert_eq!(cfg.parser.absent_tokens, vec!["nan", "null"]);
        assert!(!cfg.store.required);
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [upstream]
            base_url = "http://upstream.test/v4"
            api_key = "abc"

            [aggregation]
            max_concurrent_fetches = 3

            [sync]
            interval_secs = 60
            pause_between_requests_ms = 0

            [parser]
            absent_tokens = ["nan", "null", "-999"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.upstream.api_key, "abc");
        assert_eq!(cfg.aggregation.max_concurrent_fetches, 3);
        let sched = cfg.scheduler_cfg();
        assert_eq!(sched.interval, Duration::from_secs(60));
        assert_eq!(sched.pause_between_requests, Duration::ZERO);
        assert_eq!(sched.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.parser.absent_tokens.len(), 3);
        assert_eq!(cfg.parser.pm25_field, "pm2.5cnc");
    }

    #[test]
    fn validate_requires_base_url_and_key() {
        let mut cfg = AppConfig::default();
        assert!(cfg.validate().is_err());

        cfg.upstream.base_url = " http://upstream.test ".into();
        cfg.upstream.api_key = "  ".into();
        assert!(cfg.validate().is_err());

        cfg.upstream.api_key = "k".into();
        cfg.aggregation.max_concurrent_fetches = 0;
        cfg.sync.interval_secs = 0;
        cfg.validate().unwrap();
        assert_eq!(cfg.upstream.base_url, "http://upstream.test");
        assert_eq!(cfg.aggregation.max_concurrent_fetches, 8);
        assert_eq!(cfg.sync.interval_secs, 900);
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("nope"));
    }
}
