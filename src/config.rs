use std::time::Duration;

use crate::error::{AppError, Result};

pub const STEAMDT_BASE_URL: &str = "https://open.steamdt.com";

/// Slice length for the pause-wait and inter-window delay loops. Pause, resume
/// and stop are observed within one slice.
pub const POLL_SLICE: Duration = Duration::from_millis(200);

/// How long `stop()` waits for the background loop to exit before forcing idle.
pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The batch price endpoint accepts 1..=100 names per call.
pub const MAX_BATCH_NAMES: usize = 100;

/// Request timeouts for the pricing API (seconds).
pub const READ_TIMEOUT_SECS: u64 = 30;
pub const BATCH_TIMEOUT_SECS: u64 = 60;

/// `update_time` values below this are seconds, not milliseconds.
pub const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Offset of the human-readable `update_time_text` rendering (UTC+8).
pub const DISPLAY_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Look-back window of the admin price average.
pub const AVERAGE_WINDOW_DAYS: i64 = 7;

/// Rows backfilled per boot by the price repair pass.
pub const REPAIR_ROW_LIMIT: i64 = 5000;

/// SQLite busy timeout for concurrent writers (both jobs share one file).
pub const DB_BUSY_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub base_url: String,
    /// Credential for the single job and the catalog/proxy endpoints (STEAMDT_API_KEY)
    pub api_key: Option<String>,
    /// Dual job credential 1 (STEAMDT_API_KEY_1, falls back to STEAMDT_API_KEY_A)
    pub api_key_1: Option<String>,
    /// Dual job credential 2 (STEAMDT_API_KEY_2, falls back to STEAMDT_API_KEY_B)
    pub api_key_2: Option<String>,
    pub job: JobDefaults,
    pub dual_job: JobDefaults,
}

/// Window size and interval used when `start()` is called without overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDefaults {
    pub batch_size: i64,
    pub interval_secs: u64,
}

impl JobDefaults {
    pub fn new(batch_size: i64, interval_secs: u64) -> Self {
        Self {
            batch_size: batch_size.max(1),
            interval_secs: interval_secs.max(1),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "data/app.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            base_url: std::env::var("STEAMDT_BASE_URL")
                .unwrap_or_else(|_| STEAMDT_BASE_URL.to_string()),
            api_key: non_empty_var("STEAMDT_API_KEY"),
            api_key_1: non_empty_var("STEAMDT_API_KEY_1").or_else(|| non_empty_var("STEAMDT_API_KEY_A")),
            api_key_2: non_empty_var("STEAMDT_API_KEY_2").or_else(|| non_empty_var("STEAMDT_API_KEY_B")),
            job: JobDefaults::new(
                parse_var("JOB_BATCH_SIZE", 100)?,
                parse_var("JOB_INTERVAL_SECS", 60)?,
            ),
            dual_job: JobDefaults::new(
                parse_var("DUAL_JOB_BATCH_SIZE", 100)?,
                parse_var("DUAL_JOB_INTERVAL_SECS", 30)?,
            ),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match non_empty_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} must be a positive integer, got {raw:?}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_defaults_clamp_to_one() {
        let d = JobDefaults::new(0, 0);
        assert_eq!(d.batch_size, 1);
        assert_eq!(d.interval_secs, 1);

        let d = JobDefaults::new(-5, 30);
        assert_eq!(d.batch_size, 1);
        assert_eq!(d.interval_secs, 30);
    }

    #[test]
    fn parse_var_falls_back_when_unset() {
        let v: u64 = parse_var("SKIN_INGEST_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(v, 42);
    }
}
