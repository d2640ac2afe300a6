use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "ArogyaSahayak";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of recent submissions kept for the acting hospital.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// Per-disease total above which a location raises an outbreak alert.
pub const DEFAULT_OUTBREAK_THRESHOLD: u64 = 150;

const DEFAULT_TABLE: &str = "case_reports";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_DRAIN_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;

/// Get the application data directory
/// ~/ArogyaSahayak/ on all platforms, falling back to the working directory
/// when no home directory can be resolved.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the durable pending-report queue.
pub fn queue_db_path() -> PathBuf {
    app_data_dir().join("pending_reports.db")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "arogya_sync=info"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime configuration for the sync pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the hosted report store, e.g. `https://xyz.supabase.co`.
    pub supabase_url: String,
    /// Anonymous API key sent as both `apikey` and bearer token.
    pub supabase_anon_key: String,
    #[serde(default = "default_table")]
    pub table: String,
    /// Bounded wait for every remote call. Expiry counts as a remote failure.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_drain_interval")]
    pub drain_interval_secs: u64,
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_outbreak_threshold")]
    pub outbreak_threshold: u64,
    /// Remote column holding the client reference. When set, replays are
    /// deduplicated by the store instead of producing duplicate rows.
    #[serde(default)]
    pub idempotency_column: Option<String>,
    #[serde(default = "queue_db_path")]
    pub queue_db: PathBuf,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_drain_interval() -> u64 {
    DEFAULT_DRAIN_INTERVAL_SECS
}

fn default_probe_interval() -> u64 {
    DEFAULT_PROBE_INTERVAL_SECS
}

fn default_outbreak_threshold() -> u64 {
    DEFAULT_OUTBREAK_THRESHOLD
}

impl SyncConfig {
    /// Config with defaults for everything except the remote endpoint.
    pub fn new(supabase_url: impl Into<String>, supabase_anon_key: impl Into<String>) -> Self {
        Self {
            supabase_url: supabase_url.into(),
            supabase_anon_key: supabase_anon_key.into(),
            table: default_table(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            drain_interval_secs: DEFAULT_DRAIN_INTERVAL_SECS,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            outbreak_threshold: DEFAULT_OUTBREAK_THRESHOLD,
            idempotency_column: None,
            queue_db: queue_db_path(),
        }
    }

    /// Load from `AROGYA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment, test map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("AROGYA_SUPABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("AROGYA_SUPABASE_URL"))?;
        let key = lookup("AROGYA_SUPABASE_ANON_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("AROGYA_SUPABASE_ANON_KEY"))?;

        let mut config = Self::new(url, key);

        if let Some(v) = lookup("AROGYA_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_positive("AROGYA_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("AROGYA_HISTORY_LIMIT") {
            config.history_limit = parse_positive("AROGYA_HISTORY_LIMIT", &v)? as usize;
        }
        if let Some(v) = lookup("AROGYA_DRAIN_INTERVAL_SECS") {
            config.drain_interval_secs = parse_positive("AROGYA_DRAIN_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("AROGYA_PROBE_INTERVAL_SECS") {
            config.probe_interval_secs = parse_positive("AROGYA_PROBE_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("AROGYA_OUTBREAK_THRESHOLD") {
            config.outbreak_threshold = v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "AROGYA_OUTBREAK_THRESHOLD",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("AROGYA_IDEMPOTENCY_COLUMN") {
            let v = v.trim();
            if !v.is_empty() {
                config.idempotency_column = Some(v.to_string());
            }
        }
        if let Some(v) = lookup("AROGYA_QUEUE_DB") {
            config.queue_db = PathBuf::from(v);
        }

        Ok(config)
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}
