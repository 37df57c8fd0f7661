//! Pipeline configuration, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::notify::DEFAULT_HISTORY_RETENTION;

/// Settings shared by every component of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub gateway_port: u16,
    pub stock_port: u16,
    pub kitchen_port: u16,
    pub notify_port: u16,
    /// Directory holding the redb files. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// HS256 secret used to verify bearer tokens
    pub jwt_secret: String,
    /// Shared cache / idempotency store. In-process cache when absent.
    pub redis_url: Option<String>,
    /// Base URL of the relay's `POST /notify`. In-process bus when absent.
    pub notify_url: Option<String>,
    pub stock_cache_ttl: Duration,
    pub gateway_cache_ttl: Duration,
    pub dependency_timeout: Duration,
    pub notify_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub prep_time_min: Duration,
    pub prep_time_max: Duration,
    pub idempotency_ttl: Duration,
    pub history_cap: usize,
    /// How long an offline student's history outlives their last event.
    pub history_retention: Duration,
    pub heartbeat_interval: Duration,
    pub register_timeout: Duration,
    pub log_level: String,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            gateway_port: env_or("GATEWAY_PORT", 3000),
            stock_port: env_or("STOCK_PORT", 3002),
            kitchen_port: env_or("KITCHEN_PORT", 3003),
            notify_port: env_or("NOTIFY_PORT", 3004),
            data_dir: Some(PathBuf::from(
                std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()),
            )),
            jwt_secret: std::env::var("JWT_SECRET")
                .unwrap_or_else(|_| "dev-JWT_SECRET-not-for-production".into()),
            redis_url: env_opt("REDIS_URL"),
            notify_url: env_opt("NOTIFY_URL"),
            stock_cache_ttl: Duration::from_secs(env_or("STOCK_CACHE_TTL_SECS", 30)),
            gateway_cache_ttl: Duration::from_secs(env_or("GATEWAY_CACHE_TTL_SECS", 30)),
            dependency_timeout: Duration::from_millis(env_or("DEPENDENCY_TIMEOUT_MS", 5000)),
            notify_timeout: Duration::from_millis(env_or("NOTIFY_TIMEOUT_MS", 3000)),
            max_retries: env_or("MAX_RETRIES", 3),
            retry_delay: Duration::from_millis(env_or("RETRY_DELAY_MS", 2000)),
            reconnect_attempts: env_or("RECONNECT_ATTEMPTS", 10),
            reconnect_delay: Duration::from_millis(env_or("RECONNECT_DELAY_MS", 3000)),
            prep_time_min: Duration::from_millis(env_or("PREP_TIME_MIN_MS", 3000)),
            prep_time_max: Duration::from_millis(env_or("PREP_TIME_MAX_MS", 7000)),
            idempotency_ttl: Duration::from_secs(env_or("IDEMPOTENCY_TTL_SECS", 86_400)),
            history_cap: env_or("HISTORY_CAP", 20),
            history_retention: Duration::from_secs(env_or("HISTORY_RETENTION_SECS", DEFAULT_HISTORY_RETENTION.as_secs())),
            heartbeat_interval: Duration::from_secs(env_or("HEARTBEAT_INTERVAL_SECS", 30)),
            register_timeout: Duration::from_secs(env_or("REGISTER_TIMEOUT_SECS", 10)),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }

    /// In-memory stores, no external services, millisecond timings.
    pub fn for_tests() -> Self {
        Self {
            gateway_port: 0,
            stock_port: 0,
            kitchen_port: 0,
            notify_port: 0,
            data_dir: None,
            jwt_secret: "test-secret".into(),
            redis_url: None,
            notify_url: None,
            stock_cache_ttl: Duration::from_secs(30),
            gateway_cache_ttl: Duration::from_secs(30),
            dependency_timeout: Duration::from_secs(2),
            notify_timeout: Duration::from_millis(500),
            max_retries: 3,
            retry_delay: Duration::from_millis(20),
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_millis(10),
            prep_time_min: Duration::from_millis(5),
            prep_time_max: Duration::from_millis(10),
            idempotency_ttl: Duration::from_secs(86_400),
            history_cap: 20,
            history_retention: Duration::from_secs(3600),
            heartbeat_interval: Duration::from_secs(30),
            register_timeout: Duration::from_secs(10),
            log_level: "debug".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("CAFETERIA_TEST_PORT", "not-a-port");
        assert_eq!(env_or::<u16>("CAFETERIA_TEST_PORT", 7), 7);
        std::env::set_var("CAFETERIA_TEST_PORT", "8081");
        assert_eq!(env_or::<u16>("CAFETERIA_TEST_PORT", 7), 8081);
        std::env::remove_var("CAFETERIA_TEST_PORT");
    }

    #[test]
    fn test_empty_optional_is_none() {
        std::env::set_var("CAFETERIA_TEST_URL", "");
        assert_eq!(env_opt("CAFETERIA_TEST_URL"), None);
        std::env::remove_var("CAFETERIA_TEST_URL");
    }
}
