//! Environment-driven service configuration

use std::env;
use tracing::warn;

/// Full node configuration, assembled once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Shared coordination store
    pub redis_url: String,
    /// Durable instrument registry
    pub database_url: String,
    pub catalog: CatalogConfig,
    pub feed: FeedSettings,
    pub sync: SyncSettings,
    pub liveness: LivenessSettings,
    /// Bound on pub/sub delivery latency
    pub listener_poll_interval_ms: u64,
    /// Lifetime of instrument cache sets; registry rows never expire
    pub cache_ttl_secs: i64,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub ws_url: String,
    /// Delay before retrying a failed connection attempt
    pub reconnect_delay_ms: u64,
    /// Capacity of the feed command channel
    pub command_buffer: usize,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub underlying_interval_secs: u64,
    pub derivative_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LivenessSettings {
    /// Must stay comfortably above the expected quote/ping frequency
    pub heartbeat_timeout_secs: i64,
    pub check_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379/0".to_string(),
            database_url: "postgresql://localhost:5432/instruments".to_string(),
            catalog: CatalogConfig {
                base_url: "https://prototype.sbulltech.com/api".to_string(),
                request_timeout_secs: 10,
            },
            feed: FeedSettings {
                ws_url: "wss://prototype.sbulltech.com/api/ws".to_string(),
                reconnect_delay_ms: 1000,
                command_buffer: 64,
            },
            sync: SyncSettings {
                underlying_interval_secs: 300,
                derivative_interval_secs: 60,
            },
            liveness: LivenessSettings {
                heartbeat_timeout_secs: 60,
                check_interval_secs: 30,
            },
            listener_poll_interval_ms: 1000,
            cache_ttl_secs: 120 * 60,
        }
    }
}

impl AppConfig {
    /// Build from the environment, falling back to defaults per variable
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: env_or("REDIS_URL", defaults.redis_url),
            database_url: env_or("DATABASE_URL", defaults.database_url),
            catalog: CatalogConfig {
                base_url: env_or("CATALOG_BASE_URL", defaults.catalog.base_url),
                request_timeout_secs: env_or_parsed(
                    "CATALOG_TIMEOUT_SECS",
                    defaults.catalog.request_timeout_secs,
                ),
            },
            feed: FeedSettings {
                ws_url: env_or("FEED_WS_URL", defaults.feed.ws_url),
                reconnect_delay_ms: env_or_parsed(
                    "FEED_RECONNECT_DELAY_MS",
                    defaults.feed.reconnect_delay_ms,
                ),
                command_buffer: defaults.feed.command_buffer,
            },
            sync: SyncSettings {
                underlying_interval_secs: env_or_parsed(
                    "SYNC_UNDERLYING_INTERVAL_SECS",
                    defaults.sync.underlying_interval_secs,
                ),
                derivative_interval_secs: env_or_parsed(
                    "SYNC_DERIVATIVE_INTERVAL_SECS",
                    defaults.sync.derivative_interval_secs,
                ),
            },
            liveness: LivenessSettings {
                heartbeat_timeout_secs: env_or_parsed(
                    "HEARTBEAT_TIMEOUT_SECS",
                    defaults.liveness.heartbeat_timeout_secs,
                ),
                check_interval_secs: env_or_parsed(
                    "LIVENESS_CHECK_INTERVAL_SECS",
                    defaults.liveness.check_interval_secs,
                ),
            },
            listener_poll_interval_ms: env_or_parsed(
                "LISTENER_POLL_INTERVAL_MS",
                defaults.listener_poll_interval_ms,
            ),
            cache_ttl_secs: env_or_parsed("INSTRUMENT_CACHE_TTL_SECS", defaults.cache_ttl_secs),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_or_parsed<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("unparseable {key}={raw}, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_heartbeat_timeout_above_liveness_interval() {
        let config = AppConfig::default();
        assert!(config.liveness.heartbeat_timeout_secs > 0);
        assert!(
            config.liveness.heartbeat_timeout_secs as u64 > config.liveness.check_interval_secs
        );
    }

    #[test]
    fn cache_ttl_defaults_to_two_hours() {
        assert_eq!(AppConfig::default().cache_ttl_secs, 7200);
    }
}
