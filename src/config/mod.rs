// src/config/mod.rs
pub mod app;

use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub use app::AppConfig;

pub const ENV_CONFIG_PATH: &str = "AQ_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/air_quality.toml";

/// Load configuration using env var + fallbacks, then apply env overrides:
/// 1) $AQ_CONFIG_PATH
/// 2) config/air_quality.toml
/// 3) built-in defaults
pub fn load_default() -> Result<AppConfig> {
    let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        AppConfig::load_from_file(&pb)?
    } else {
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            AppConfig::load_from_file(&default_p)?
        } else {
            AppConfig::default()
        }
    };

    cfg.apply_env()?;
    cfg.validate()?;
    Ok(cfg)
}
