//! Centralized runtime constants plus the typed environment configuration.
//!
//! Tunable intervals and ratios that are not meant to be operator-configurable
//! live here as plain constants, exactly as the constant-table this module
//! started from did. Everything that *is* operator-configurable is loaded
//! once at process start into [`EnvConfig`].

use crate::error::AppError;
use std::time::Duration;

/// How often a DynamicQueue's shrink monitor wakes to reconsider capacity.
pub const SHRINK_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum time since the last expand before a shrink is considered.
pub const SHRINK_TIMEOUT: Duration = Duration::from_secs(15);

/// Fraction of capacity below which a shrink check can fire.
pub const SHRINK_THRESHOLD_RATIO: f64 = 0.6;

/// Fraction of capacity above which a DynamicQueue expands.
pub const EXPAND_THRESHOLD_RATIO: f64 = 0.8;

/// How often a DynamicQueue's metrics monitor samples load.
pub const METRICS_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Rolling window length (in samples) kept by queue and consumer metrics.
pub const METRICS_WINDOW_LEN: usize = 100;

/// Swap-threshold ratio used by the default size-based buffer strategy.
/// Must stay strictly below `EXPAND_THRESHOLD_RATIO` or the inner queue may
/// try to expand before a swap can relieve pressure.
pub const SWAP_THRESHOLD_RATIO: f64 = 0.75;

/// Poll timeout for the double-buffer swap-monitor thread.
pub const SWAP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Consumer coordinator's metrics-emission interval.
pub const CONSUMER_METRICS_INTERVAL: Duration = Duration::from_secs(5);

/// Consumer coordinator's poll granularity while assembling a batch.
pub const CONSUMER_POLL_GRANULARITY: Duration = Duration::from_millis(50);

/// Maximum packets drained from the capture handle per dispatch.
pub const CAPTURE_BATCH_SIZE: usize = 128;

/// Sleep applied by the capture thread when no packets are waiting.
pub const CAPTURE_IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Pause applied between stop and start during a producer restart.
pub const PRODUCER_RESTART_PAUSE: Duration = Duration::from_millis(500);

/// Default page size used when an HTTP caller omits `page_size`.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Upper bound enforced on `page_size` regardless of caller input.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Operator-configurable values, loaded once at process start from the
/// environment (and, if present, a local `.env` file). Immutable afterward.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub database_uri: String,
    pub database_name: String,
    pub capture_interface: String,
    pub min_queue_size: usize,
    pub max_queue_size: usize,
    pub max_workers: usize,
    pub start_batch_size: usize,
    pub growth_factor: f64,
    pub shrink_factor: f64,
    pub backend_host: String,
    pub backend_port: u16,
    pub jwt_secret_key: String,
    pub jwt_algorithm: String,
    pub jwt_expire_minutes: i64,
    pub operator_username: String,
    pub operator_password_hash: String,
    pub backend_cors_origins: Vec<String>,
    pub maxmind_license_key: Option<String>,
    pub geoip_db_abs_path: String,
    pub log_level: String,
}

impl EnvConfig {
    /// Loads configuration from the process environment, reading a local
    /// `.env` file first if one is present. Missing required values produce
    /// a `Config` error at boot rather than a panic deep in a background
    /// thread.
    pub fn load() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(EnvConfig {
            database_uri: env_or("DATABASE_URI", "mongodb://localhost:27017")?,
            database_name: env_or("DATABASE_NAME", "netguard")?,
            capture_interface: env_or("CAPTURE_INTERFACE", "eth0")?,
            min_queue_size: env_parse_or("MIN_QUEUE_SIZE", 64)?,
            max_queue_size: env_parse_or("MAX_QUEUE_SIZE", 8192)?,
            max_workers: env_parse_or("MAX_WORKERS", 4)?,
            start_batch_size: env_parse_or("START_BATCH_SIZE", 32)?,
            growth_factor: env_parse_or("GROWTH_FACTOR", 1.5)?,
            shrink_factor: env_parse_or("SHRINK_FACTOR", 0.5)?,
            backend_host: env_or("BACKEND_HOST", "0.0.0.0")?,
            backend_port: env_parse_or("BACKEND_PORT", 8000)?,
            jwt_secret_key: env_or("JWT_SECRET_KEY", "change-me")?,
            jwt_algorithm: env_or("JWT_ALGORITHM", "HS256")?,
            jwt_expire_minutes: env_parse_or("JWT_EXPIRE_MINUTES", 60)?,
            operator_username: env_or("OPERATOR_USERNAME", "admin")?,
            operator_password_hash: env_or("OPERATOR_PASSWORD_HASH", "")?,
            backend_cors_origins: env_or("BACKEND_CORS_ORIGINS", "*")?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            maxmind_license_key: std::env::var("MAXMIND_LICENSE_KEY").ok(),
            geoip_db_abs_path: env_or("GEOIP_DB_ABSOLUTE_PATH", "./data/GeoLite2-Country.mmdb")?,
            log_level: env_or("LOG_LEVEL", "info")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> Result<String, AppError> {
    Ok(std::env::var(key).unwrap_or_else(|_| default.to_string()))
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{key} is not a valid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shrink_below_expand_threshold() {
        assert!(SWAP_THRESHOLD_RATIO < EXPAND_THRESHOLD_RATIO);
    }

    #[test]
    fn test_all_intervals_positive() {
        assert!(SHRINK_CHECK_INTERVAL.as_secs() > 0);
        assert!(SHRINK_TIMEOUT.as_secs() > 0);
        assert!(METRICS_SAMPLE_INTERVAL.as_secs() > 0);
        assert!(METRICS_WINDOW_LEN > 0);
        assert!(CONSUMER_METRICS_INTERVAL.as_secs() > 0);
    }

    #[test]
    fn test_env_or_falls_back_to_default_when_unset() {
        std::env::remove_var("NETGUARD_TEST_KEY_UNSET");
        assert_eq!(env_or("NETGUARD_TEST_KEY_UNSET", "fallback").unwrap(), "fallback");
    }

    #[test]
    fn test_env_parse_or_rejects_invalid_values() {
        std::env::set_var("NETGUARD_TEST_KEY_BADNUM", "not-a-number");
        let result: Result<u16, AppError> = env_parse_or("NETGUARD_TEST_KEY_BADNUM", 0);
        assert!(result.is_err());
        std::env::remove_var("NETGUARD_TEST_KEY_BADNUM");
    }

    #[test]
    fn test_page_size_bounds_sane() {
        assert!(DEFAULT_PAGE_SIZE > 0 && DEFAULT_PAGE_SIZE <= MAX_PAGE_SIZE);
    }
}
