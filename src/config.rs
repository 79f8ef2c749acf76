use std::env;
use std::str::FromStr;

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub luma: LumaConfig,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
    pub rate_limit: RateLimitConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origin.
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// `redis://...` or `memory://` for an in-process store.
    pub url: String,
    /// Key prefix environment (`dev`, `prod`, ...). Keys become `<env>-<key>`.
    pub env: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LumaConfig {
    pub url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a cache entry is served before a reload.
    pub duration: chrono::Duration,
    /// Total attempts for a cache read against the store.
    pub retry_max_attempts: u32,
    /// Linear backoff step between attempts (milliseconds).
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Whether the background scheduled sync worker runs with `serve`.
    pub enabled: bool,
    /// Minimum time between two scheduled syncs.
    pub interval: chrono::Duration,
    /// How often the worker checks whether a sync is due.
    pub check_interval: std::time::Duration,
    /// Expiry applied to newly stored events.
    pub event_ttl: std::time::Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Seconds to replenish one request (per IP) for the manual sync trigger
    pub sync_per_second: u32,
    /// Burst size for the manual sync trigger
    pub sync_burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// `APP_ENV`; `production` guards destructive commands.
    pub app_env: String,
    /// `FORCE_CLEAR`; required to run `clear` in production.
    pub force_clear: bool,
}

impl AdminConfig {
    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}

/// Accepts "true"/"false", "1"/"0", "yes"/"no".
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Seconds as a signed duration; values chrono cannot represent are rejected.
fn checked_seconds(name: &str, seconds: u64) -> Result<chrono::Duration, ConfigError> {
    i64::try_from(seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| ConfigError::InvalidValue(name.to_string()))
}

fn env_seconds(name: &str, default: chrono::Duration) -> Result<chrono::Duration, ConfigError> {
    match env::var(name).ok().and_then(|v| v.trim().parse::<u64>().ok()) {
        Some(seconds) => checked_seconds(name, seconds),
        None => Ok(default),
    }
}

fn env_std_seconds(
    name: &str,
    default: std::time::Duration,
) -> Result<std::time::Duration, ConfigError> {
    // Shares the signed range so the value can be added to timestamps.
    env_seconds(name, checked_seconds(name, default.as_secs())?)?
        .to_std()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        let redis_url = env::var("REDIS_URL").unwrap_or(defaults.redis.url);
        if !redis_url.starts_with("redis://")
            && !redis_url.starts_with("rediss://")
            && !redis_url.starts_with("memory://")
        {
            return Err(ConfigError::InvalidValue("REDIS_URL".to_string()));
        }

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or(defaults.server.host),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL").unwrap_or(defaults.server.frontend_url),
            },
            redis: RedisConfig {
                url: redis_url,
                env: env::var("REDIS_ENV").ok().filter(|v| !v.trim().is_empty()),
            },
            luma: LumaConfig {
                url: env::var("LUMA_CALENDAR_URL").unwrap_or(defaults.luma.url),
                timeout_seconds: env_or("LUMA_TIMEOUT_SECONDS", defaults.luma.timeout_seconds),
                user_agent: env::var("LUMA_USER_AGENT").unwrap_or(defaults.luma.user_agent),
            },
            cache: CacheConfig {
                duration: env_seconds("EVENTS_CACHE_DURATION_SECONDS", defaults.cache.duration)?,
                retry_max_attempts: env_or(
                    "EVENTS_CACHE_RETRY_ATTEMPTS",
                    defaults.cache.retry_max_attempts,
                ),
                retry_base_delay_ms: env_or(
                    "EVENTS_CACHE_RETRY_DELAY_MS",
                    defaults.cache.retry_base_delay_ms,
                ),
            },
            sync: SyncConfig {
                enabled: env_bool("SYNC_ENABLED", defaults.sync.enabled),
                interval: env_seconds("SYNC_INTERVAL_SECONDS", defaults.sync.interval)?,
                check_interval: env_std_seconds(
                    "SYNC_CHECK_INTERVAL_SECONDS",
                    defaults.sync.check_interval,
                )?,
                event_ttl: env_std_seconds("EVENT_TTL_SECONDS", defaults.sync.event_ttl)?,
            },
            rate_limit: RateLimitConfig {
                sync_per_second: env_or(
                    "RATE_LIMIT_SYNC_PER_SECOND",
                    defaults.rate_limit.sync_per_second,
                ),
                sync_burst: env_or("RATE_LIMIT_SYNC_BURST", defaults.rate_limit.sync_burst),
            },
            admin: AdminConfig {
                app_env: env::var("APP_ENV").unwrap_or(defaults.admin.app_env),
                force_clear: env_bool("FORCE_CLEAR", false),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379".to_string(),
                env: None,
            },
            luma: LumaConfig {
                url: "https://lu.ma/kaiachain".to_string(),
                timeout_seconds: 30,
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            },
            cache: CacheConfig {
                duration: chrono::Duration::minutes(5),
                retry_max_attempts: 3,
                retry_base_delay_ms: 1000,
            },
            sync: SyncConfig {
                enabled: true,
                interval: chrono::Duration::hours(6),
                check_interval: std::time::Duration::from_secs(5 * 60),
                event_ttl: std::time::Duration::from_secs(30 * 24 * 60 * 60),
            },
            rate_limit: RateLimitConfig {
                sync_per_second: 30,
                sync_burst: 2,
            },
            admin: AdminConfig {
                app_env: "development".to_string(),
                force_clear: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_values_follow_common_spellings() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.cache.duration, chrono::Duration::seconds(300));
        assert_eq!(config.sync.interval, chrono::Duration::hours(6));
        assert_eq!(
            config.sync.event_ttl,
            std::time::Duration::from_secs(2_592_000)
        );
        assert!(!config.admin.is_production());
    }

    #[test]
    fn env_seconds_rejects_values_chrono_cannot_hold() {
        std::env::set_var("LUMA_EVENTS_TEST_HUGE_SECONDS", "10000000000000000");
        let result = env_seconds("LUMA_EVENTS_TEST_HUGE_SECONDS", chrono::Duration::minutes(5));
        std::env::remove_var("LUMA_EVENTS_TEST_HUGE_SECONDS");
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));

        assert_eq!(
            env_seconds("LUMA_EVENTS_TEST_UNSET_SECONDS", chrono::Duration::minutes(5)).unwrap(),
            chrono::Duration::minutes(5)
        );
    }

    #[test]
    fn out_of_range_seconds_are_rejected() {
        assert_eq!(
            checked_seconds("EVENTS_CACHE_DURATION_SECONDS", 300).unwrap(),
            chrono::Duration::minutes(5)
        );

        for seconds in [10_000_000_000_000_000, u64::MAX] {
            let err = checked_seconds("EVENTS_CACHE_DURATION_SECONDS", seconds).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue(ref name) if name == "EVENTS_CACHE_DURATION_SECONDS"
            ));
        }
    }
}
