//! Daemon configuration, read once from the environment at startup.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sheetsync_engine::rate_limiter::{DEFAULT_CAPACITY, DEFAULT_WINDOW};
use sheetsync_engine::sheets_api::DEFAULT_BASE_URL;

use crate::error::DaemonError;
use crate::paths::{data_dir, DATA_DIR_ENV};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(300_000);

/// Shortest accepted full-sync interval.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub port: u16,
    pub sync_interval: Duration,
    pub auto_start: bool,
    pub rate_limit_capacity: u32,
    pub rate_limit_window: Duration,
    pub data_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub sheets_api_base_url: String,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    /// Defaults rooted at `home`, as if no variable were set.
    pub fn defaults(home: &Path) -> Self {
        Self {
            port: DEFAULT_PORT,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            auto_start: false,
            rate_limit_capacity: DEFAULT_CAPACITY,
            rate_limit_window: DEFAULT_WINDOW,
            data_dir: data_dir(home),
            static_dir: None,
            sheets_api_base_url: DEFAULT_BASE_URL.to_string(),
            log_format: LogFormat::Text,
        }
    }

    pub fn from_env(home: &Path) -> Result<Self, DaemonError> {
        Self::from_lookup(home, |key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup. Unset and blank
    /// variables fall back to defaults; malformed ones are rejected.
    pub fn from_lookup<F>(home: &Path, lookup: F) -> Result<Self, DaemonError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::defaults(home);

        if let Some(port) = get("PORT") {
            config.port = parse("PORT", &port)?;
        }
        if let Some(ms) = get("FULL_SYNC_INTERVAL_MS") {
            config.sync_interval = Duration::from_millis(parse("FULL_SYNC_INTERVAL_MS", &ms)?);
            if config.sync_interval < MIN_SYNC_INTERVAL {
                return Err(DaemonError::Config(format!(
                    "FULL_SYNC_INTERVAL_MS must be at least {}",
                    MIN_SYNC_INTERVAL.as_millis()
                )));
            }
        }
        if let Some(flag) = get("SYNC_AUTO_START") {
            config.auto_start = parse_bool("SYNC_AUTO_START", &flag)?;
        }
        if let Some(capacity) = get("RATE_LIMIT_MAX_OPS_PER_100S") {
            config.rate_limit_capacity = parse("RATE_LIMIT_MAX_OPS_PER_100S", &capacity)?;
        }
        if let Some(ms) = get("RATE_LIMIT_WINDOW_MS") {
            let ms: u64 = parse("RATE_LIMIT_WINDOW_MS", &ms)?;
            if ms == 0 {
                return Err(DaemonError::Config("RATE_LIMIT_WINDOW_MS must be positive".to_string()));
            }
            config.rate_limit_window = Duration::from_millis(ms);
        }
        if let Some(dir) = get(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        config.static_dir = get("SHEETSYNC_STATIC_DIR").map(PathBuf::from);
        if let Some(url) = get("SHEETS_API_BASE_URL") {
            config.sheets_api_base_url = url;
        }
        if let Some(format) = get("LOG_FORMAT") {
            config.log_format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" | "pretty" => LogFormat::Text,
                other => return Err(DaemonError::Config(format!("unknown LOG_FORMAT '{other}'"))),
            };
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, DaemonError> {
    value
        .trim()
        .parse()
        .map_err(|_| DaemonError::Config(format!("{key}: cannot parse '{value}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, DaemonError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DaemonError::Config(format!("{key}: expected a boolean, got '{value}'"))),
    }
}
